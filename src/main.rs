use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use spinback::normalize::timestamp::WEEKDAY_NAMES;
use spinback::pipeline::{load_archive, LogObserver};
use spinback::stats::{self, ArtistMode, Filters};
use spinback::table::Table;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "spinback", version, about = "Streaming history analyzer")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what an export archive contains after cleaning
    Inspect {
        /// Export archive (.zip) or a directory containing one
        archive: Option<PathBuf>,

        /// Number of rows to preview
        #[arg(long, default_value = "5")]
        head: usize,
    },

    /// Print a listening report for an export archive
    Report {
        /// Export archive (.zip) or a directory containing one (defaults to config data_dir)
        archive: Option<PathBuf>,

        /// Ignore plays shorter than this many seconds
        #[arg(long)]
        min_seconds: Option<u64>,

        /// Only include these years (repeatable)
        #[arg(long = "year")]
        years: Vec<i32>,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Only include these artists (repeatable)
        #[arg(long = "artist")]
        artists: Vec<String>,

        /// Exclude the listed artists instead of keeping only them
        #[arg(long)]
        exclude_artists: bool,

        /// Rows per top list
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Write the cleaned table to stdout as JSON lines
    Export {
        /// Export archive (.zip) or a directory containing one
        archive: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = spinback::config::AppConfig::load();

    match cli.command {
        Commands::Inspect { archive, head } => {
            let path = resolve_archive(archive, config.data_dir.as_deref())?;
            let Some(table) = load(&path)? else {
                return Ok(());
            };

            println!("Archive: {}", path.display());
            println!("Rows:    {}", table.len());
            println!("Columns: {}", table.width());
            println!();
            for name in table.column_names() {
                let values = table.column(name).unwrap_or_default();
                let present = values.iter().filter(|v| !v.is_null()).count();
                println!("  {:<40} {:>8} non-null", name, present);
            }

            if head > 0 {
                println!();
                println!("First {} rows:", head.min(table.len()));
                let columns = stats::preview_columns(&table);
                for i in 0..head.min(table.len()) {
                    let fields: Vec<String> = columns
                        .iter()
                        .filter_map(|c| table.get(i, c).map(|v| (c, v)))
                        .filter(|(_, v)| !v.is_null())
                        .map(|(c, v)| format!("{c}={v}"))
                        .collect();
                    println!("  {}", fields.join("  "));
                }
            }
        }

        Commands::Report {
            archive,
            min_seconds,
            years,
            start,
            end,
            artists,
            exclude_artists,
            limit,
        } => {
            let path = resolve_archive(archive, config.data_dir.as_deref())?;
            let Some(table) = load(&path)? else {
                return Ok(());
            };

            let filters = Filters {
                min_ms_played: min_seconds.unwrap_or(config.min_play_seconds) * 1000,
                years,
                start,
                end,
                artists,
                artist_mode: if exclude_artists {
                    ArtistMode::Exclude
                } else {
                    ArtistMode::Include
                },
            };
            let (unknown_years, unknown_artists) = stats::unmatched_selections(&table, &filters);
            if !unknown_years.is_empty() {
                log::warn!(
                    "No plays in {:?}; years present: {:?}",
                    unknown_years,
                    stats::years_present(&table)
                );
            }
            for artist in &unknown_artists {
                log::warn!("No plays by artist '{}'", artist);
            }

            let filtered = stats::apply_filters(&table, &filters);
            let limit = limit.unwrap_or(config.top_n);

            if filtered.is_empty() {
                println!("No plays match the given filters.");
                return Ok(());
            }

            print_report(&filtered, limit, config.min_plays_for_skip_rate);
        }

        Commands::Export { archive } => {
            let path = resolve_archive(archive, config.data_dir.as_deref())?;
            let Some(table) = load(&path)? else {
                return Ok(());
            };

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for i in 0..table.len() {
                let row: serde_json::Map<String, serde_json::Value> = table
                    .row(i)
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect();
                serde_json::to_writer(&mut out, &row).context("Failed to write row")?;
                writeln!(out).context("Failed to write row")?;
            }
        }
    }

    Ok(())
}

/// Read and clean an archive. `None` (after telling the user) when it holds no records.
fn load(path: &Path) -> Result<Option<Table>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let table = load_archive(&bytes, &LogObserver)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    if table.is_empty() {
        println!("No streaming history found in {}.", path.display());
        return Ok(None);
    }
    Ok(Some(table))
}

/// Resolve the archive to read: CLI path > config data_dir.
/// A directory resolves to the first `.zip` inside it.
fn resolve_archive(arg: Option<PathBuf>, data_dir: Option<&Path>) -> Result<PathBuf> {
    let path = match arg {
        Some(p) => p,
        None => match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => anyhow::bail!(
                "No archive given. Pass a .zip path or set data_dir in config."
            ),
        },
    };

    if !path.is_dir() {
        return Ok(path);
    }

    let mut archives: Vec<PathBuf> = WalkDir::new(&path)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case(spinback::ARCHIVE_EXTENSION))
        })
        .map(|e| e.into_path())
        .collect();
    archives.sort();

    match archives.len() {
        0 => anyhow::bail!("No .zip archive found in {}", path.display()),
        1 => {}
        n => log::warn!(
            "{} archives found in {}, using {}",
            n,
            path.display(),
            archives[0].display()
        ),
    }
    Ok(archives.swap_remove(0))
}

fn print_report(table: &Table, limit: usize, min_plays_for_skip_rate: usize) {
    let overview = stats::overview(table);
    println!("Listening Overview");
    println!("==================");
    println!("Plays:            {}", overview.plays);
    if let Some(minutes) = overview.total_minutes {
        println!("Minutes played:   {:.2}", minutes);
    }
    if let Some(n) = overview.distinct_tracks {
        println!("Distinct tracks:  {}", n);
    }
    if let Some(n) = overview.distinct_artists {
        println!("Distinct artists: {}", n);
    }
    if let (Some(first), Some(last)) = (overview.first_played, overview.last_played) {
        println!("Period:           {} to {}", first.date(), last.date());
    }
    let years = stats::years_present(table);
    if !years.is_empty() {
        let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        println!("Years:            {}", years.join(", "));
    }
    println!();

    let tracks = stats::top_tracks(table, limit);
    if !tracks.is_empty() {
        println!("Top {} tracks by plays:", tracks.len());
        println!("{:<35} {:<25} {:>6}", "Track", "Artist", "Plays");
        println!("{}", "-".repeat(68));
        for t in &tracks {
            println!(
                "{:<35} {:<25} {:>6}",
                truncate(&t.track_name, 35),
                truncate(t.artist_name.as_deref().unwrap_or(""), 25),
                t.plays
            );
        }
        println!();
    }

    let artists = stats::top_artists(table, limit);
    if !artists.is_empty() {
        println!("Top {} artists by plays:", artists.len());
        println!("{:<35} {:>6} {:>9}", "Artist", "Plays", "Minutes");
        println!("{}", "-".repeat(52));
        for a in &artists {
            println!(
                "{:<35} {:>6} {:>9.0}",
                truncate(&a.artist_name, 35),
                a.plays,
                a.minutes
            );
        }
        println!();
    }

    let albums = stats::top_albums(table, limit);
    if !albums.is_empty() {
        println!("Top {} albums by plays:", albums.len());
        for a in &albums {
            println!(
                "  {} - {} ({} plays)",
                a.artist_name.as_deref().unwrap_or("?"),
                a.album_name,
                a.plays
            );
            for (track, plays) in a.tracks.iter().take(limit) {
                println!("      {:<40} {:>5}", truncate(track, 40), plays);
            }
        }
        println!();
    }

    if let Some(skips) = stats::skip_rates(table, min_plays_for_skip_rate, limit) {
        for (title, rows) in [
            ("Most skipped", &skips.most_skipped),
            ("Least skipped", &skips.least_skipped),
        ] {
            if rows.is_empty() {
                continue;
            }
            println!("{} (min {} plays):", title, min_plays_for_skip_rate);
            println!("{:<35} {:>6} {:>6} {:>7}", "Track", "Plays", "Skips", "Rate");
            println!("{}", "-".repeat(57));
            for s in rows.iter() {
                println!(
                    "{:<35} {:>6} {:>6} {:>6.1}%",
                    truncate(&s.track_name, 35),
                    s.plays,
                    s.skips,
                    s.skip_rate * 100.0
                );
            }
            println!();
        }
    }

    let monthly = stats::monthly_top_artists(table);
    if !monthly.is_empty() {
        println!("Artists topping a month:");
        println!("{:<35} {:>7} {:>6} {:>9}", "Artist", "Months", "Songs", "Minutes");
        println!("{}", "-".repeat(60));
        for m in monthly.iter().take(limit) {
            println!(
                "{:<35} {:>7} {:>6} {:>9}",
                truncate(&m.artist_name, 35),
                m.months_as_top,
                m.song_count,
                m.minutes
            );
        }
        println!();
    }

    if let Some(hours) = stats::minutes_by_hour(table) {
        println!("Minutes by hour of day:");
        print_bars(hours.iter().enumerate().map(|(h, m)| (format!("{:02}", h), *m)));
        println!();
    }

    if let Some(days) = stats::minutes_by_weekday(table) {
        println!("Minutes by day of week:");
        print_bars(WEEKDAY_NAMES.iter().zip(days).map(|(d, m)| (d.to_string(), m)));
        println!();
    }

    if let Some(grid) = stats::hour_weekday_grid(table) {
        println!("Minutes by hour and day of week:");
        print!("  {:<4}", "Hour");
        for day in WEEKDAY_NAMES {
            print!(" {:>6}", &day[..3]);
        }
        println!();
        for (hour, row) in grid.iter().enumerate() {
            print!("  {:<4}", format!("{:02}", hour));
            for minutes in row {
                print!(" {:>6.0}", minutes);
            }
            println!();
        }
    }
}

/// Print labelled values with a proportional bar.
fn print_bars(rows: impl Iterator<Item = (String, f64)>) {
    let rows: Vec<_> = rows.collect();
    let max = rows.iter().map(|(_, m)| *m).fold(0.0, f64::max);
    for (label, minutes) in &rows {
        let width = if max > 0.0 { (minutes / max * 40.0).round() as usize } else { 0 };
        println!("  {:<10} {:>9.0} {}", label, minutes, "#".repeat(width));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}
