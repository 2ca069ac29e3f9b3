//! Errors raised while building an ordered task set.

use thiserror::Error;

/// Error returned by [`crate::OrderedTaskSet::insert`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskSetError {
    /// A task is already stored under this key. The set keeps the first task.
    #[error("duplicate task key; key={key}")]
    DuplicateKey { key: String },
}

impl TaskSetError {
    /// The offending key, rendered with its `Display` implementation.
    pub fn key(&self) -> &str {
        match self {
            TaskSetError::DuplicateKey { key } => key,
        }
    }
}
