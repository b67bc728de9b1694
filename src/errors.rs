// Error types for the orchestration core

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No download folder configured. Rejected before submission.
    EmptyDestination,

    /// Playlist selection is empty. Rejected before submission.
    EmptySelection,

    /// yt-dlp (or another required tool) is not installed.
    ToolNotFound(String),

    /// The engine process could not be launched.
    Spawn(String),

    /// Failed to parse engine output.
    Parse(String),

    /// The engine ran and reported a failure. The message is shown to
    /// the user as-is.
    Engine(String),

    /// The in-flight engine call was aborted from the progress hook.
    /// Not a failure: the worker maps this to `JobOutcome::Cancelled`.
    Cancelled,

    /// Anything else.
    Unknown(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDestination => write!(f, "Download folder is not set"),
            Self::EmptySelection => write!(f, "No playlist items selected"),
            Self::ToolNotFound(tool) => write!(f, "Tool not found: {}", tool),
            Self::Spawn(msg) => write!(f, "Failed to launch engine: {}", msg),
            Self::Parse(msg) => write!(f, "Parse error: {}", msg),
            Self::Engine(msg) => write!(f, "{}", msg),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

// Classify raw engine/stderr text into something more specific than
// Unknown where the text allows it.
impl From<String> for FetchError {
    fn from(s: String) -> Self {
        if s.starts_with("ERROR:") || s.contains("Unsupported URL") || s.contains("HTTP Error") {
            return Self::Engine(s);
        }

        if s.contains("No such file") || s.contains("command not found") || s.contains("not found")
        {
            return Self::ToolNotFound(s);
        }

        if s.contains("JSON") || s.contains("parse") {
            return Self::Parse(s);
        }

        Self::Unknown(s)
    }
}
