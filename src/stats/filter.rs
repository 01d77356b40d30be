use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::normalize::{ARTIST_NAME, MS_PLAYED, TS};
use crate::table::{Table, Value};

/// Whether the artist list keeps or removes matching rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtistMode {
    #[default]
    Include,
    Exclude,
}

/// Row filters applied to a cleaned table before reporting.
/// Empty fields disable the corresponding filter. The play threshold always
/// applies, so even a zero threshold drops plays with no duration.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    /// Drop plays shorter than this many milliseconds.
    pub min_ms_played: u64,
    /// Keep only plays from these calendar years.
    pub years: Vec<i32>,
    /// Inclusive first day.
    pub start: Option<NaiveDate>,
    /// Inclusive last day.
    pub end: Option<NaiveDate>,
    pub artists: Vec<String>,
    pub artist_mode: ArtistMode,
}

/// Apply `filters` to a cleaned table. Filters whose column is missing are
/// skipped; rows with a null in a filtered column are dropped, except under
/// artist exclusion.
pub fn apply_filters(table: &Table, filters: &Filters) -> Table {
    let ms_played = table.column(MS_PLAYED);
    let timestamps = table
        .column(TS)
        .filter(|_| !filters.years.is_empty() || filters.start.is_some() || filters.end.is_some());
    let artists = table.column(ARTIST_NAME).filter(|_| !filters.artists.is_empty());
    let artist_set: HashSet<&str> = filters.artists.iter().map(String::as_str).collect();

    let start = filters.start.and_then(|d| d.and_hms_opt(0, 0, 0));
    // Exclusive upper bound: midnight after the last day.
    let end = filters
        .end
        .and_then(|d| d.succ_opt())
        .and_then(|d| d.and_hms_opt(0, 0, 0));

    table.filter_rows(|i| {
        if let Some(values) = ms_played {
            match values[i].as_f64() {
                Some(ms) if ms >= filters.min_ms_played as f64 => {}
                _ => return false,
            }
        }

        if let Some(values) = timestamps {
            let Some(ts) = values[i].as_timestamp() else {
                return false;
            };
            if !in_range(&ts, &filters.years, start, end) {
                return false;
            }
        }

        if let Some(values) = artists {
            let listed = values[i].as_str().is_some_and(|a| artist_set.contains(a));
            let keep = match filters.artist_mode {
                ArtistMode::Include => listed,
                ArtistMode::Exclude => !listed,
            };
            if !keep {
                return false;
            }
        }

        true
    })
}

fn in_range(
    ts: &NaiveDateTime,
    years: &[i32],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> bool {
    if !years.is_empty() && !years.contains(&ts.year()) {
        return false;
    }
    if start.is_some_and(|s| *ts < s) {
        return false;
    }
    if end.is_some_and(|e| *ts >= e) {
        return false;
    }
    true
}

/// Selected years and artists that match no play in `table`.
pub fn unmatched_selections(table: &Table, filters: &Filters) -> (Vec<i32>, Vec<String>) {
    let years = if table.has_column(TS) {
        let present = years_present(table);
        filters
            .years
            .iter()
            .filter(|y| !present.contains(y))
            .copied()
            .collect()
    } else {
        Vec::new()
    };
    let artists = if table.has_column(ARTIST_NAME) {
        let present = distinct_text(table, ARTIST_NAME);
        filters
            .artists
            .iter()
            .filter(|a| !present.contains(a))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    (years, artists)
}

/// Distinct non-null values of a text column, sorted.
pub fn distinct_text(table: &Table, column: &str) -> Vec<String> {
    let mut values: Vec<String> = table
        .column(column)
        .map(|vals| {
            vals.iter()
                .filter_map(Value::as_str)
                .collect::<HashSet<_>>()
                .into_iter()
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    values.sort();
    values
}

/// Distinct years with at least one play, ascending.
pub fn years_present(table: &Table) -> Vec<i32> {
    let mut years: Vec<i32> = table
        .column(TS)
        .map(|vals| {
            vals.iter()
                .filter_map(Value::as_timestamp)
                .map(|ts| ts.year())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect()
        })
        .unwrap_or_default();
    years.sort_unstable();
    years
}
