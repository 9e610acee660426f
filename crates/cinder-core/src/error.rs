//! Error types for the core engine.

use thiserror::Error;

/// The operation was attempted on a key holding a value of the wrong
/// kind. For example, running ZADD against a plain string key.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Key holds wrong type")]
pub struct WrongType;

/// Errors returned when talking to the database task.
#[derive(Debug, Error)]
pub enum DbError {
    /// The db task is no longer running (channel closed).
    #[error("database task unavailable")]
    Unavailable,
}
