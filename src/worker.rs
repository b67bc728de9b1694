// JobWorker: one background execution slot per submitted job
//
// The worker runs the engine call on a background task and relays every
// progress/log event onto an ordered channel the foreground drains. The
// cancellation flag is the only other state crossing the thread
// boundary; it is polled on every progress tick, so cancellation lands
// within one callback of being requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::engine::{Engine, EventSink, HookAction};
use crate::errors::FetchError;
use crate::models::{FetchOptions, JobOutcome, LogLevel, ProgressEvent};

/// Everything the foreground observes about one job, in emission order.
/// `Done` arrives exactly once and is always last.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress(ProgressEvent),
    Log { message: String, level: LogLevel },
    Done(JobOutcome),
}

/// Cloneable cancellation trigger. Safe to fire from any thread, at any
/// time, any number of times; firing after the job is terminal is a
/// no-op.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct JobWorker {
    engine: Arc<dyn Engine>,
}

impl JobWorker {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Start one job on a background task. The returned handle is the
    /// only way to observe or cancel it; the caller's context is never
    /// blocked.
    pub fn submit(&self, options: FetchOptions) -> JobHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        let engine = Arc::clone(&self.engine);
        let flag = Arc::clone(&cancelled);
        let events = tx.clone();

        let job = tokio::spawn(async move {
            // Cancelled before we even reached the engine.
            if flag.load(Ordering::SeqCst) {
                return JobOutcome::Cancelled;
            }

            let mut relay = EventRelay {
                events,
                cancelled: Arc::clone(&flag),
            };

            match engine.fetch(&options, &mut relay).await {
                Ok(()) => {
                    // A cancel that raced with engine completion still
                    // counts as cancelled, never as success.
                    if flag.load(Ordering::SeqCst) {
                        JobOutcome::Cancelled
                    } else {
                        JobOutcome::Succeeded("Download finished successfully".to_string())
                    }
                }
                Err(FetchError::Cancelled) => JobOutcome::Cancelled,
                Err(e) => JobOutcome::Failed(e.to_string()),
            }
        });

        // Supervisor: converts a panicked job into a Failed outcome and
        // guarantees exactly one terminal event.
        tokio::spawn(async move {
            let outcome = match job.await {
                Ok(outcome) => outcome,
                Err(e) => JobOutcome::Failed(format!("Unexpected worker failure: {}", e)),
            };
            let _ = tx.send(JobEvent::Done(outcome));
        });

        JobHandle {
            cancelled,
            events: rx,
        }
    }
}

/// Engine-facing hook: forwards events one-to-one and polls the
/// cancellation flag on every progress tick.
struct EventRelay {
    events: UnboundedSender<JobEvent>,
    cancelled: Arc<AtomicBool>,
}

impl EventSink for EventRelay {
    fn on_progress(&mut self, event: ProgressEvent) -> HookAction {
        if self.cancelled.load(Ordering::SeqCst) {
            return HookAction::Abort;
        }
        let _ = self.events.send(JobEvent::Progress(event));
        HookAction::Continue
    }

    fn on_log(&mut self, message: &str, level: LogLevel) {
        // Verbose diagnostic-only lines are suppressed by default.
        if level == LogLevel::Debug && message.starts_with("[debug]") {
            return;
        }
        let _ = self.events.send(JobEvent::Log {
            message: message.to_string(),
            level,
        });
    }
}

/// Foreground handle to one in-flight job.
pub struct JobHandle {
    cancelled: Arc<AtomicBool>,
    events: UnboundedReceiver<JobEvent>,
}

impl JobHandle {
    /// Request cancellation. Idempotent; a no-op once the job is
    /// terminal. The engine is stopped at its next progress tick.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// A trigger that can be moved to another thread or task (e.g. a
    /// signal handler) while the handle itself is being drained.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Next event, in emission order. Returns `None` once the terminal
    /// event has been consumed.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Drain events into callbacks until the job is terminal. The
    /// callbacks run on the calling context, never on the background
    /// task.
    pub async fn forward<P, L, D>(mut self, mut on_progress: P, mut on_log: L, on_done: D)
    where
        P: FnMut(ProgressEvent),
        L: FnMut(String, LogLevel),
        D: FnOnce(JobOutcome),
    {
        while let Some(event) = self.recv().await {
            match event {
                JobEvent::Progress(progress) => on_progress(progress),
                JobEvent::Log { message, level } => on_log(message, level),
                JobEvent::Done(outcome) => {
                    on_done(outcome);
                    return;
                }
            }
        }
    }
}
