// Engine seam
//
// The orchestration core drives an opaque retrieval engine through this
// trait and receives all progress/log traffic through EventSink. The
// concrete binding lives in `ytdlp`.

use async_trait::async_trait;

use crate::errors::FetchError;
use crate::models::{FetchOptions, LogLevel, MediaInfo, ProgressEvent};

/// Verdict returned from a progress hook.
///
/// `Abort` tells the adapter to stop the in-flight transfer through
/// whatever mechanism the binding supports. The hook is invoked on every
/// engine tick, so this is the cancellation poll point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    Abort,
}

/// Callback surface injected into the engine for one job.
///
/// Logging is a single (message, severity) method rather than one method
/// per severity; the capability is the same with a smaller surface.
pub trait EventSink: Send {
    fn on_progress(&mut self, event: ProgressEvent) -> HookAction;
    fn on_log(&mut self, message: &str, level: LogLevel);
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Name of the engine binding (for diagnostics).
    fn name(&self) -> &'static str;

    /// Run one transfer to completion. Resolves only when the engine is
    /// done, aborted, or failed; an abort requested through the sink
    /// surfaces as `FetchError::Cancelled`.
    async fn fetch(
        &self,
        options: &FetchOptions,
        sink: &mut dyn EventSink,
    ) -> Result<(), FetchError>;

    /// Metadata-only query. Never transfers media.
    async fn probe(&self, url: &str) -> Result<MediaInfo, FetchError>;
}
