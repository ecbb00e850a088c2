//! The judging engine: project assignment and judgement bookkeeping.
//!
//! [`Comparisons`] tracks how densely every pair of projects has been seen
//! together, and the scheduler functions ([`pick_next_project`],
//! [`skip_current_project`], [`score_current_project`]) move judges through
//! the event while holding the assignment invariants: no two active judges
//! hold the same project, no judge sees a project twice, and a project's
//! `seen` count always equals picks minus unscored releases.

mod comparisons;
mod scheduler;

pub use comparisons::Comparisons;
pub use scheduler::*;

use thiserror::Error;

/// Failure taxonomy for the judging and ranking layers.
///
/// "No project available" is deliberately not represented here; it is the
/// `Ok(None)` result of a pick, not an error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller sent something malformed: unknown judge or project,
    /// wrong batch size, scores outside the configured rubric. Never
    /// retried; reported back as a client failure.
    #[error("{0}")]
    Validation(String),

    /// A pick kept losing races against concurrent writers and exhausted
    /// its retry budget.
    #[error("assignment conflicted with concurrent picks after {0} attempts")]
    Conflict(u32),

    /// The persistence layer failed. Not retried at this level.
    #[error("storage error: {0}")]
    Store(#[source] anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Store(err)
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Store(err.into())
    }
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}
