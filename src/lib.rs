// Job orchestration core for yt-dlp: options building, background
// workers with cooperative cancellation, progress relay, and metadata
// probing. The GUI/CLI on top only builds options, submits jobs, and
// drains events.

pub mod config;
pub mod engine;
pub mod errors;
pub mod models;
pub mod options;
pub mod probe;
pub mod range;
pub mod tools;
pub mod worker;
pub mod ytdlp;

pub use config::{AppConfig, OutputFormat};
pub use engine::{Engine, EventSink, HookAction};
pub use errors::FetchError;
pub use models::{FetchOptions, JobOutcome, LogLevel, MediaInfo, ProgressEvent};
pub use options::{build_fetch_options, build_format_string, validate_submission};
pub use probe::{spawn_probe, ProbeEvent, ProbeHandle};
pub use range::{decode_selection, encode_selection, validate_range_expr, PlaylistRange};
pub use worker::{CancelToken, JobEvent, JobHandle, JobWorker};
pub use ytdlp::YtdlpEngine;
