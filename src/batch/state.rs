//! Run state machine and cooperative cancellation token.
//!
//! [`RunPhase`] tracks one run through its lifecycle; [`CancelToken`] is the
//! set-once flag a caller uses to request that the worker stop at its next
//! checkpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// RunPhase
// ---------------------------------------------------------------------------

/// States of one batch run.
///
/// ```text
/// Idle ──execution starts──▶ Running
/// Running ──all jobs done──▶ Completed
/// Running ──token observed─▶ Cancelled   (partial results still delivered)
/// Running ──client init err▶ Failed      (no results delivered)
/// ```
///
/// `Running` is the only state in which cancellation is observed; the
/// terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    /// No execution has started yet.
    #[default]
    Idle,
    /// The worker is iterating jobs and rows.
    Running,
    /// Every job was processed; full results were delivered.
    Completed,
    /// The cancellation token was observed at a checkpoint; accumulated
    /// results were delivered.
    Cancelled,
    /// The run could not be set up at all; nothing was delivered.
    Failed,
}

impl RunPhase {
    /// Returns `true` once the run can no longer make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::Cancelled | RunPhase::Failed
        )
    }

    /// A short human-readable label suitable for status display.
    pub fn label(&self) -> &'static str {
        match self {
            RunPhase::Idle => "Idle",
            RunPhase::Running => "Running",
            RunPhase::Completed => "Completed",
            RunPhase::Cancelled => "Cancelled",
            RunPhase::Failed => "Failed",
        }
    }
}

/// Thread-safe handle to a run's current phase.
///
/// Cheap to clone (`Arc` clone).  Lock with `.lock().unwrap()` for a short
/// critical section; do **not** hold the lock across `.await` points.
pub type SharedPhase = Arc<Mutex<RunPhase>>;

/// Construct a new [`SharedPhase`] starting at [`RunPhase::Idle`].
pub fn new_shared_phase() -> SharedPhase {
    Arc::new(Mutex::new(RunPhase::Idle))
}

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared between a caller and one worker.
///
/// Monotonic: once set it is never reset.  The worker observes it only at
/// its defined checkpoints, so cancellation latency is bounded by the time
/// to finish the in-flight synthesis call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.  Safe to call from any thread, any number of
    /// times.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
