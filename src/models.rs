// Common data models for the orchestration core

use serde::{Deserialize, Serialize};

/// Post-processing directive handed to the engine. Applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Postprocessor {
    /// Extract the audio track and transcode it to the given codec.
    ExtractAudio { codec: String, quality: String },
    /// Repackage the download into a different container without re-encoding.
    Remux { container: String },
    /// Embed the fetched thumbnail into the output file.
    EmbedThumbnail,
}

/// Everything the engine needs to run one fetch job.
///
/// Built once per submission and handed to the worker by value; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub urls: Vec<String>,
    /// Output path template, e.g. `/home/me/Downloads/%(title)s.%(ext)s`.
    pub output_template: String,
    /// Format selection expression in the engine's syntax.
    pub format: String,
    pub geo_bypass: bool,
    /// Set together with `geo_bypass`, never on its own.
    pub geo_country: Option<String>,
    pub write_subtitles: bool,
    pub subtitle_language: Option<String>,
    /// Fetch the raw thumbnail asset. Required before embedding can run.
    pub write_thumbnail: bool,
    /// Capture livestreams from their start instead of the live edge.
    pub live_from_start: bool,
    /// Compact range string like "1-3,5-7,10"; `None` means every item.
    pub playlist_items: Option<String>,
    pub postprocessors: Vec<Postprocessor>,
}

/// Severity of an engine log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// One engine progress tick, relayed to the foreground as-is.
///
/// Percentages are best-effort and not guaranteed monotonic: the engine
/// may restart a sub-stage (e.g. separate video and audio transfers).
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        /// 0.0–100.0; 0.0 when the engine supplied nothing parseable.
        percent: f32,
        /// Human-readable transfer rate, e.g. "420.30KiB/s".
        rate: String,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        /// Human-readable time remaining, empty when unknown.
        eta: String,
        /// Title of the item currently transferring.
        title: String,
    },
    /// Transfer done for this item. Post-processing may still follow, so
    /// this is "processing", not a terminal signal.
    Finished { title: String },
    /// The engine reported a mid-stream problem; the job keeps running.
    /// Termination is signalled only through `JobOutcome`.
    Error { message: String },
}

/// Terminal result of one job. Emitted exactly once per submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded(String),
    Cancelled,
    Failed(String),
}

/// Shallow playlist entry from a flat probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
    /// Seconds, when the listing carries it.
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub title: String,
    pub entries: Vec<PlaylistEntry>,
}

/// Metadata for a single item probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub title: String,
    pub duration: Option<f64>,
    pub uploader: String,
    pub thumbnail: Option<String>,
    /// Raw thumbnail bytes, fetched best-effort after the probe.
    #[serde(skip)]
    pub thumbnail_data: Option<Vec<u8>>,
}

/// Result of a metadata probe. A non-empty entries collection in the
/// engine's response classifies the source as a playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaInfo {
    Playlist(PlaylistInfo),
    Single(ItemInfo),
}

impl MediaInfo {
    pub fn title(&self) -> &str {
        match self {
            MediaInfo::Playlist(p) => &p.title,
            MediaInfo::Single(i) => &i.title,
        }
    }
}
