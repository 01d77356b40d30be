pub mod config;
pub mod ingest;
pub mod normalize;
pub mod pipeline;
pub mod stats;
pub mod table;

/// Extension of archive entries that hold playback records
pub const RECORD_EXTENSION: &str = "json";

/// Extension of the export archive itself
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Application name for XDG paths
pub const APP_NAME: &str = "spinback";
