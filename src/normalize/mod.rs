pub mod timestamp;

use crate::table::{Table, Value};

use self::timestamp::{day_of_week, hour_of, parse_timestamp};

/// Vendor field names and the canonical name each one maps to.
///
/// The first group is the extended streaming history export, the second the
/// older account-data export (`StreamingHistory*.json`).
pub const RENAMES: &[(&str, &str)] = &[
    ("master_metadata_track_name", "track_name"),
    ("master_metadata_album_artist_name", "artist_name"),
    ("master_metadata_album_album_name", "album_name"),
    ("trackName", "track_name"),
    ("artistName", "artist_name"),
    ("msPlayed", "ms_played"),
];

/// Timestamp sources in priority order. Only the first present one is used.
pub const TIMESTAMP_SOURCES: &[&str] = &["ts", "endTime"];

/// Podcast and audiobook descriptive fields, always removed.
pub const DROPPED_COLUMNS: &[&str] = &[
    "episode_name",
    "episode_show_name",
    "spotify_episode_uri",
    "audiobook_title",
    "audiobook_uri",
    "audiobook_chapter_uri",
    "audiobook_chapter_title",
];

pub const TS: &str = "ts";
pub const TRACK_NAME: &str = "track_name";
pub const ARTIST_NAME: &str = "artist_name";
pub const ALBUM_NAME: &str = "album_name";
pub const MS_PLAYED: &str = "ms_played";
pub const MINUTES_PLAYED: &str = "minutes_played";
pub const HOUR: &str = "hour";
pub const DAY_OF_WEEK: &str = "day_of_week";
pub const SKIPPED: &str = "skipped";

const MS_PER_MINUTE: f64 = 60_000.0;

/// Clean a raw ingested table.
///
/// Renames vendor columns to canonical ones, parses the timestamp into `ts`
/// and derives `hour`/`day_of_week` from it, derives `minutes_played` from
/// `ms_played`, and drops podcast/audiobook columns. Every step is
/// best-effort: a missing source column skips the step, an unparseable cell
/// becomes null. Applying it to its own output changes nothing.
pub fn normalize(mut table: Table) -> Table {
    for (from, to) in RENAMES {
        table.rename_column(from, to);
    }
    derive_time_fields(&mut table);
    derive_minutes_played(&mut table);
    for name in DROPPED_COLUMNS {
        table.drop_column(name);
    }
    table
}

fn derive_time_fields(table: &mut Table) {
    let Some(source) = TIMESTAMP_SOURCES.iter().find(|s| table.has_column(s)) else {
        return;
    };
    let Some(values) = table.column(source) else {
        return;
    };

    let parsed: Vec<_> = values.iter().map(parse_timestamp).collect();

    let hours = parsed
        .iter()
        .map(|ts| ts.as_ref().map_or(Value::Null, |t| Value::Int(hour_of(t))))
        .collect();
    let days = parsed
        .iter()
        .map(|ts| {
            ts.as_ref()
                .map_or(Value::Null, |t| Value::Text(day_of_week(t).to_string()))
        })
        .collect();
    let stamps = parsed
        .into_iter()
        .map(|ts| ts.map_or(Value::Null, Value::Timestamp))
        .collect();

    table.set_column(TS, stamps);
    table.set_column(HOUR, hours);
    table.set_column(DAY_OF_WEEK, days);
}

fn derive_minutes_played(table: &mut Table) {
    let Some(values) = table.column(MS_PLAYED) else {
        return;
    };
    let minutes = values
        .iter()
        .map(|v| {
            millis(v).map_or(Value::Null, |ms| Value::Float(ms / MS_PER_MINUTE))
        })
        .collect();
    table.set_column(MINUTES_PLAYED, minutes);
}

/// Numeric playback duration. Numeric text is accepted, anything else is null.
fn millis(value: &Value) -> Option<f64> {
    match value {
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|ms| ms.is_finite()),
        other => other.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest;
    use crate::ingest::tests::make_zip;
    use chrono::NaiveDate;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn row(fields: &[(&str, Value)]) -> Vec<(String, Value)> {
        fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn extended_table() -> Table {
        let mut t = Table::new();
        t.push_row(row(&[
            ("ts", text("2023-01-01T10:00:00Z")),
            ("ms_played", Value::Int(30000)),
            ("master_metadata_track_name", text("A")),
            ("master_metadata_album_artist_name", text("Artist")),
            ("master_metadata_album_album_name", text("Album")),
            ("skipped", Value::Bool(false)),
            ("ip_addr", text("10.0.0.1")),
        ]));
        t.push_row(row(&[
            ("ts", text("not-a-date")),
            ("ms_played", Value::Int(90000)),
            ("episode_name", text("Ep 1")),
            ("episode_show_name", text("Show")),
            ("spotify_episode_uri", text("spotify:episode:x")),
        ]));
        t.push_row(row(&[
            ("ts", text("2023-01-04T23:15:00Z")),
            ("audiobook_title", text("Book")),
            ("audiobook_chapter_title", text("Ch 1")),
        ]));
        t
    }

    #[test]
    fn test_two_file_scenario() {
        let bytes = make_zip(&[
            (
                "Streaming_History_Audio_2023_0.json",
                r#"[{"ts":"2023-01-01T10:00:00Z","ms_played":30000,"master_metadata_track_name":"A"}]"#,
            ),
            (
                "Streaming_History_Audio_2023_1.json",
                r#"[{"ts":"2023-01-01T11:30:00Z","ms_played":90000,"master_metadata_track_name":"B"}]"#,
            ),
        ]);
        let table = normalize(ingest(&bytes).unwrap());

        assert_eq!(table.len(), 2);
        assert_eq!(table.column(TRACK_NAME).unwrap(), &[text("A"), text("B")]);
        assert_eq!(
            table.column(MINUTES_PLAYED).unwrap(),
            &[Value::Float(0.5), Value::Float(1.5)]
        );
        assert_eq!(table.column(HOUR).unwrap(), &[Value::Int(10), Value::Int(11)]);
        assert!(!table.has_column("master_metadata_track_name"));
    }

    #[test]
    fn test_renames_applied() {
        let t = normalize(extended_table());
        assert_eq!(t.get(0, TRACK_NAME), Some(&text("A")));
        assert_eq!(t.get(0, ARTIST_NAME), Some(&text("Artist")));
        assert_eq!(t.get(0, ALBUM_NAME), Some(&text("Album")));
        for (vendor, _) in RENAMES {
            assert!(!t.has_column(vendor), "{vendor} should be renamed");
        }
    }

    #[test]
    fn test_missing_vendor_fields_stay_absent() {
        let mut t = Table::new();
        t.push_row(row(&[("ts", text("2023-01-01T10:00:00Z"))]));
        let t = normalize(t);
        assert!(!t.has_column(TRACK_NAME));
        assert!(!t.has_column(ARTIST_NAME));
        assert!(!t.has_column(ALBUM_NAME));
        assert!(!t.has_column(MINUTES_PLAYED));
    }

    #[test]
    fn test_unparseable_timestamp_keeps_row() {
        let t = normalize(extended_table());
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(1, TS), Some(&Value::Null));
        assert_eq!(t.get(1, HOUR), Some(&Value::Null));
        assert_eq!(t.get(1, DAY_OF_WEEK), Some(&Value::Null));
        // the row's other data survives
        assert_eq!(t.get(1, MINUTES_PLAYED), Some(&Value::Float(1.5)));
    }

    #[test]
    fn test_time_fields_derived() {
        let t = normalize(extended_table());
        let expected = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(t.get(0, TS), Some(&Value::Timestamp(expected)));
        assert_eq!(t.get(0, HOUR), Some(&Value::Int(10)));
        assert_eq!(t.get(0, DAY_OF_WEEK), Some(&text("Sunday")));
        assert_eq!(t.get(2, HOUR), Some(&Value::Int(23)));
        assert_eq!(t.get(2, DAY_OF_WEEK), Some(&text("Wednesday")));
    }

    #[test]
    fn test_derived_fields_consistent() {
        let t = normalize(extended_table());
        for i in 0..t.len() {
            match t.get(i, TS).and_then(Value::as_timestamp) {
                Some(_) => {
                    let hour = t.get(i, HOUR).and_then(|v| v.as_f64()).unwrap();
                    assert!((0.0..=23.0).contains(&hour));
                    let day = t.get(i, DAY_OF_WEEK).and_then(Value::as_str).unwrap();
                    assert!(timestamp::WEEKDAY_NAMES.contains(&day));
                }
                None => {
                    assert_eq!(t.get(i, HOUR), Some(&Value::Null));
                    assert_eq!(t.get(i, DAY_OF_WEEK), Some(&Value::Null));
                }
            }
            match t.get(i, MS_PLAYED).and_then(Value::as_f64) {
                Some(ms) => {
                    let minutes = t.get(i, MINUTES_PLAYED).and_then(Value::as_f64).unwrap();
                    assert!((minutes - ms / 60000.0).abs() < 1e-9);
                }
                None => assert_eq!(t.get(i, MINUTES_PLAYED), Some(&Value::Null)),
            }
        }
    }

    #[test]
    fn test_podcast_columns_dropped_rows_kept() {
        let t = normalize(extended_table());
        assert_eq!(t.len(), 3);
        for name in DROPPED_COLUMNS {
            assert!(!t.has_column(name), "{name} should be dropped");
        }
        // untouched fields survive
        assert!(t.has_column("skipped"));
        assert!(t.has_column("ip_addr"));
    }

    #[test]
    fn test_end_time_fallback() {
        let mut t = Table::new();
        t.push_row(row(&[
            ("endTime", text("2021-03-15 08:45")),
            ("artistName", text("Legacy Artist")),
            ("trackName", text("Legacy Track")),
            ("msPlayed", Value::Int(120000)),
        ]));
        let t = normalize(t);

        assert_eq!(t.get(0, HOUR), Some(&Value::Int(8)));
        assert_eq!(t.get(0, DAY_OF_WEEK), Some(&text("Monday")));
        assert_eq!(t.get(0, TRACK_NAME), Some(&text("Legacy Track")));
        assert_eq!(t.get(0, ARTIST_NAME), Some(&text("Legacy Artist")));
        assert_eq!(t.get(0, MINUTES_PLAYED), Some(&Value::Float(2.0)));
        // the legacy source column is left in place
        assert!(t.has_column("endTime"));
    }

    #[test]
    fn test_ts_preferred_over_end_time() {
        let mut t = Table::new();
        t.push_row(row(&[
            ("ts", text("2023-01-01T10:00:00Z")),
            ("endTime", text("2021-03-15 08:45")),
        ]));
        let t = normalize(t);
        assert_eq!(t.get(0, HOUR), Some(&Value::Int(10)));
    }

    #[test]
    fn test_no_timestamp_source_no_time_fields() {
        let mut t = Table::new();
        t.push_row(row(&[("ms_played", Value::Int(60000))]));
        let t = normalize(t);
        assert!(!t.has_column(TS));
        assert!(!t.has_column(HOUR));
        assert!(!t.has_column(DAY_OF_WEEK));
    }

    #[test]
    fn test_bad_duration_is_null() {
        let mut t = Table::new();
        t.push_row(row(&[("ms_played", text("1500"))]));
        t.push_row(row(&[("ms_played", text("lots"))]));
        t.push_row(row(&[("ms_played", Value::Bool(true))]));
        t.push_row(row(&[("ms_played", Value::Float(6000.0))]));
        let t = normalize(t);
        assert_eq!(
            t.column(MINUTES_PLAYED).unwrap(),
            &[
                Value::Float(0.025),
                Value::Null,
                Value::Null,
                Value::Float(0.1)
            ]
        );
    }

    #[test]
    fn test_canonical_and_vendor_coalesce() {
        let mut t = Table::new();
        t.push_row(row(&[("master_metadata_track_name", text("Extended"))]));
        t.push_row(row(&[("trackName", text("Legacy"))]));
        let t = normalize(t);
        assert_eq!(
            t.column(TRACK_NAME).unwrap(),
            &[text("Extended"), text("Legacy")]
        );
        assert_eq!(t.width(), 1);
    }

    #[test]
    fn test_idempotent() {
        let once = normalize(extended_table());
        let twice = normalize(once.clone());
        assert_eq!(once, twice);

        let mut legacy = Table::new();
        legacy.push_row(row(&[
            ("endTime", text("2021-03-15 08:45")),
            ("msPlayed", Value::Int(120000)),
        ]));
        let once = normalize(legacy);
        assert_eq!(normalize(once.clone()), once);
    }

    #[test]
    fn test_empty_table() {
        let t = normalize(Table::new());
        assert!(t.is_empty());
        assert_eq!(t.width(), 0);
    }
}
