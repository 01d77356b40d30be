pub mod filter;

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::normalize::{ALBUM_NAME, ARTIST_NAME, MS_PLAYED, SKIPPED, TRACK_NAME, TS};
use crate::table::{Table, Value};

pub use filter::{apply_filters, distinct_text, unmatched_selections, years_present, ArtistMode, Filters};

/// Columns never shown in row previews.
pub const PRIVATE_COLUMNS: &[&str] = &["ip_addr", "offline_timestamp"];

const MS_PER_MINUTE: f64 = 60_000.0;

/// Headline numbers for a (filtered) table.
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub plays: usize,
    /// `None` when the table has no duration column.
    pub total_minutes: Option<f64>,
    pub distinct_tracks: Option<usize>,
    pub distinct_artists: Option<usize>,
    pub first_played: Option<NaiveDateTime>,
    pub last_played: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackCount {
    pub track_name: String,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub plays: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistCount {
    pub artist_name: String,
    pub plays: usize,
    pub minutes: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlbumCount {
    pub album_name: String,
    pub artist_name: Option<String>,
    pub plays: usize,
    /// Plays per track on this album, most played first.
    pub tracks: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkipRate {
    pub track_name: String,
    pub artist_name: Option<String>,
    pub plays: usize,
    pub skips: usize,
    pub skip_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkipReport {
    pub most_skipped: Vec<SkipRate>,
    pub least_skipped: Vec<SkipRate>,
}

/// An artist that topped at least one calendar month by time listened.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTop {
    pub artist_name: String,
    pub months_as_top: usize,
    pub song_count: usize,
    pub minutes: i64,
}

/// Counts keyed by first appearance, so ties keep encounter order after a
/// stable sort.
struct Tally<K, V> {
    index: HashMap<K, usize>,
    entries: Vec<(K, V)>,
}

impl<K, V> Default for Tally<K, V> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Default> Tally<K, V> {
    fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, key: &K) -> &mut V {
        let idx = match self.index.get(key) {
            Some(&i) => i,
            None => {
                self.entries.push((key.clone(), V::default()));
                self.index.insert(key.clone(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    fn into_entries(self) -> Vec<(K, V)> {
        self.entries
    }
}

fn text_at(values: &[Value], i: usize) -> Option<&str> {
    values.get(i).and_then(Value::as_str)
}

/// Milliseconds played for row `i`; null counts as zero in sums.
fn ms_at(values: &[Value], i: usize) -> f64 {
    values.get(i).and_then(Value::as_f64).unwrap_or(0.0)
}

/// First non-null value of `column` per distinct `key` column value.
fn first_by(table: &Table, key: &str, column: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let (Some(keys), Some(values)) = (table.column(key), table.column(column)) else {
        return out;
    };
    for (k, v) in keys.iter().zip(values) {
        if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
            out.entry(k.to_string()).or_insert_with(|| v.to_string());
        }
    }
    out
}

pub fn overview(table: &Table) -> Overview {
    let total_minutes = table.column(MS_PLAYED).map(|values| {
        values.iter().filter_map(Value::as_f64).sum::<f64>() / MS_PER_MINUTE
    });
    let distinct = |name: &str| {
        table.column(name).map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .collect::<std::collections::HashSet<_>>()
                .len()
        })
    };
    let timestamps: Vec<NaiveDateTime> = table
        .column(TS)
        .map(|values| values.iter().filter_map(Value::as_timestamp).collect())
        .unwrap_or_default();

    Overview {
        plays: table.len(),
        total_minutes,
        distinct_tracks: distinct(TRACK_NAME),
        distinct_artists: distinct(ARTIST_NAME),
        first_played: timestamps.iter().min().copied(),
        last_played: timestamps.iter().max().copied(),
    }
}

/// Most played tracks by play count. Empty without a `track_name` column.
pub fn top_tracks(table: &Table, n: usize) -> Vec<TrackCount> {
    let Some(tracks) = table.column(TRACK_NAME) else {
        return Vec::new();
    };
    let mut tally: Tally<String, usize> = Tally::new();
    for v in tracks {
        if let Some(name) = v.as_str() {
            *tally.entry(&name.to_string()) += 1;
        }
    }
    let artists = first_by(table, TRACK_NAME, ARTIST_NAME);
    let albums = first_by(table, TRACK_NAME, ALBUM_NAME);

    let mut counts = tally.into_entries();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(n);
    counts
        .into_iter()
        .map(|(track_name, plays)| TrackCount {
            artist_name: artists.get(&track_name).cloned(),
            album_name: albums.get(&track_name).cloned(),
            track_name,
            plays,
        })
        .collect()
}

/// Most played artists by play count, with total minutes.
/// Needs `artist_name` and `ms_played`.
pub fn top_artists(table: &Table, n: usize) -> Vec<ArtistCount> {
    let (Some(artists), Some(ms)) = (table.column(ARTIST_NAME), table.column(MS_PLAYED)) else {
        return Vec::new();
    };
    let mut tally: Tally<String, (usize, f64)> = Tally::new();
    for i in 0..table.len() {
        if let Some(artist) = text_at(artists, i) {
            let e = tally.entry(&artist.to_string());
            e.0 += 1;
            e.1 += ms_at(ms, i);
        }
    }
    let mut counts = tally.into_entries();
    counts.sort_by(|a, b| b.1.0.cmp(&a.1.0));
    counts.truncate(n);
    counts
        .into_iter()
        .map(|(artist_name, (plays, ms))| ArtistCount {
            artist_name,
            plays,
            minutes: ms / MS_PER_MINUTE,
        })
        .collect()
}

/// Most played albums with their per-track breakdown.
/// Needs `album_name`, `track_name` and `artist_name`.
pub fn top_albums(table: &Table, n: usize) -> Vec<AlbumCount> {
    let (Some(albums), Some(tracks), true) = (
        table.column(ALBUM_NAME),
        table.column(TRACK_NAME),
        table.has_column(ARTIST_NAME),
    ) else {
        return Vec::new();
    };
    let mut tally: Tally<String, (usize, Tally<String, usize>)> = Tally::new();
    for i in 0..table.len() {
        if let Some(album) = text_at(albums, i) {
            let e = tally.entry(&album.to_string());
            e.0 += 1;
            if let Some(track) = text_at(tracks, i) {
                *e.1.entry(&track.to_string()) += 1;
            }
        }
    }
    let artists = first_by(table, ALBUM_NAME, ARTIST_NAME);

    let mut counts = tally.into_entries();
    counts.sort_by(|a, b| b.1.0.cmp(&a.1.0));
    counts.truncate(n);
    counts
        .into_iter()
        .map(|(album_name, (plays, per_track))| {
            let mut tracks = per_track.into_entries();
            tracks.sort_by(|a, b| b.1.cmp(&a.1));
            AlbumCount {
                artist_name: artists.get(&album_name).cloned(),
                album_name,
                plays,
                tracks,
            }
        })
        .collect()
}

/// Most and least skipped tracks among those played at least `min_plays`
/// times. Ties on rate go to the track with more plays.
/// `None` without `track_name` and `skipped` columns.
pub fn skip_rates(table: &Table, min_plays: usize, n: usize) -> Option<SkipReport> {
    let tracks = table.column(TRACK_NAME)?;
    let skipped = table.column(SKIPPED)?;

    let mut tally: Tally<String, (usize, usize)> = Tally::new();
    for i in 0..table.len() {
        if let Some(track) = text_at(tracks, i) {
            let e = tally.entry(&track.to_string());
            e.0 += 1;
            if skipped[i].as_bool() == Some(true) {
                e.1 += 1;
            }
        }
    }
    let artists = first_by(table, TRACK_NAME, ARTIST_NAME);

    let rates: Vec<SkipRate> = tally
        .into_entries()
        .into_iter()
        .filter(|(_, (plays, _))| *plays >= min_plays && *plays > 0)
        .map(|(track_name, (plays, skips))| SkipRate {
            artist_name: artists.get(&track_name).cloned(),
            track_name,
            plays,
            skips,
            skip_rate: skips as f64 / plays as f64,
        })
        .collect();

    let mut most = rates.clone();
    most.sort_by(|a, b| {
        b.skip_rate
            .total_cmp(&a.skip_rate)
            .then(b.plays.cmp(&a.plays))
    });
    most.truncate(n);

    let mut least = rates;
    least.sort_by(|a, b| {
        a.skip_rate
            .total_cmp(&b.skip_rate)
            .then(b.plays.cmp(&a.plays))
    });
    least.truncate(n);

    Some(SkipReport {
        most_skipped: most,
        least_skipped: least,
    })
}

/// For every calendar month, the artist with the most time listened; then
/// per artist, how many months they topped. Sorted by months as top.
/// Needs `ts`, `artist_name`, `ms_played` and `track_name`.
pub fn monthly_top_artists(table: &Table) -> Vec<MonthlyTop> {
    let (Some(ts), Some(artists), Some(ms), Some(tracks)) = (
        table.column(TS),
        table.column(ARTIST_NAME),
        table.column(MS_PLAYED),
        table.column(TRACK_NAME),
    ) else {
        return Vec::new();
    };

    // (year, month) -> artist -> (ms, songs)
    let mut months: Tally<(i32, u32), Tally<String, (f64, usize)>> = Tally::new();
    for i in 0..table.len() {
        let (Some(when), Some(artist)) = (ts[i].as_timestamp(), text_at(artists, i)) else {
            continue;
        };
        let e = months
            .entry(&(when.year(), when.month()))
            .entry(&artist.to_string());
        e.0 += ms_at(ms, i);
        if !tracks[i].is_null() {
            e.1 += 1;
        }
    }

    let mut month_list = months.into_entries();
    month_list.sort_by_key(|(ym, _)| *ym);

    let mut per_artist: Tally<String, (usize, f64, usize)> = Tally::new();
    for (_, by_artist) in month_list {
        let winner = by_artist
            .into_entries()
            .into_iter()
            .reduce(|best, next| if next.1.0 > best.1.0 { next } else { best });
        if let Some((artist, (ms, songs))) = winner {
            let e = per_artist.entry(&artist);
            e.0 += 1;
            e.1 += ms;
            e.2 += songs;
        }
    }

    let mut out: Vec<MonthlyTop> = per_artist
        .into_entries()
        .into_iter()
        .map(|(artist_name, (months_as_top, ms, song_count))| MonthlyTop {
            artist_name,
            months_as_top,
            song_count,
            minutes: (ms / MS_PER_MINUTE).round() as i64,
        })
        .collect();
    out.sort_by(|a, b| b.months_as_top.cmp(&a.months_as_top));
    out
}

/// Rows with a timestamp, paired with their duration in ms.
fn timed_plays(table: &Table) -> Option<Vec<(NaiveDateTime, f64)>> {
    let ts = table.column(TS)?;
    let ms = table.column(MS_PLAYED)?;
    Some(
        ts.iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_timestamp().map(|t| (t, ms_at(ms, i))))
            .collect(),
    )
}

/// Minutes listened per hour of day, index 0-23.
pub fn minutes_by_hour(table: &Table) -> Option<[f64; 24]> {
    let mut buckets = [0.0; 24];
    for (ts, ms) in timed_plays(table)? {
        buckets[ts.hour() as usize] += ms / MS_PER_MINUTE;
    }
    Some(buckets)
}

/// Minutes listened per weekday, Monday first.
pub fn minutes_by_weekday(table: &Table) -> Option<[f64; 7]> {
    let mut buckets = [0.0; 7];
    for (ts, ms) in timed_plays(table)? {
        buckets[ts.weekday().num_days_from_monday() as usize] += ms / MS_PER_MINUTE;
    }
    Some(buckets)
}

/// Minutes listened by hour (rows) and weekday (columns, Monday first).
pub fn hour_weekday_grid(table: &Table) -> Option<[[f64; 7]; 24]> {
    let mut grid = [[0.0; 7]; 24];
    for (ts, ms) in timed_plays(table)? {
        grid[ts.hour() as usize][ts.weekday().num_days_from_monday() as usize] +=
            ms / MS_PER_MINUTE;
    }
    Some(grid)
}

/// Column names suitable for a row preview (private columns removed).
pub fn preview_columns(table: &Table) -> Vec<&str> {
    table
        .column_names()
        .into_iter()
        .filter(|name| !PRIVATE_COLUMNS.contains(name))
        .collect()
}
