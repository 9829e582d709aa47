//! Record store seam shared by the grading and escalation workflows.

mod memory;

pub use memory::InMemoryStore;

/// Error raised by repository implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// The record already exists, or a conditional write's guard no longer holds.
    #[error("record conflict")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale version: expected {expected}, found {actual}")]
    StaleVersion { expected: u64, actual: u64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
