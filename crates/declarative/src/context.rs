//! Collaborator traits
//!
//! The engine orchestrates phases but never does the underlying work itself.
//! Attempts, notification delivery, progress display and state persistence
//! are injected through these traits so the crate carries no I/O of its own.

use crate::types::{ExecutionResult, Phase, Resource};
use anyhow::Result;

/// Outcome of a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed { reason: String },
}

/// Performs the work behind one attempt of a phase
///
/// Attempts are not cancellable; the executor checks for cancellation
/// between them.
pub trait AttemptPolicy: Send + Sync {
    /// Run attempt number `attempt` (1-based) of `phase`
    fn attempt(&self, phase: &Phase, attempt: u32) -> AttemptOutcome;
}

/// Policy whose first attempt always succeeds
pub struct AlwaysSucceed;

impl AttemptPolicy for AlwaysSucceed {
    fn attempt(&self, _phase: &Phase, _attempt: u32) -> AttemptOutcome {
        AttemptOutcome::Succeeded
    }
}

/// Delivers handler notifications
pub trait NotificationSink: Send + Sync {
    /// Notify `target` over `channel`
    ///
    /// # Arguments
    /// * `channel` - Notify key of the handler, e.g. `slack`
    /// * `target` - Configured target, e.g. `#ops`
    /// * `message` - Outcome summary of the phase
    fn notify(&self, channel: &str, target: &str, message: &str);
}

/// Sink that records notifications to the log only
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, channel: &str, target: &str, message: &str) {
        log::info!("notify {channel} -> {target}: {message}");
    }
}

/// Progress callback for plan execution
///
/// Implement this trait to receive progress updates during execution.
/// Phases of one level run concurrently, so completions are reported
/// after the level joins.
pub trait ProgressCallback: Send {
    /// Called when a dependency level starts
    fn on_level_start(&mut self, level: usize, count: usize);

    /// Called for each phase of the level before it is dispatched
    fn on_phase_start(&mut self, id: &str, name: &str);

    /// Called when a phase has a result (including skipped phases)
    fn on_phase_complete(&mut self, id: &str, result: &ExecutionResult);

    /// Called when a level has fully joined
    fn on_level_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_level_start(&mut self, _level: usize, _count: usize) {}
    fn on_phase_start(&mut self, _id: &str, _name: &str) {}
    fn on_phase_complete(&mut self, _id: &str, _result: &ExecutionResult) {}
    fn on_level_complete(&mut self) {}
}

/// Storage for the last-applied resource collection
pub trait StateStore: Send + Sync {
    /// Load the last-applied resources, empty when nothing was stored
    fn load(&self) -> Result<Vec<Resource>>;

    /// Replace the stored resources
    fn save(&self, resources: &[Resource]) -> Result<()>;
}
