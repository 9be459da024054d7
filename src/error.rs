//! Error types for the concurrent stream engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors the engine can surface to a consumer driving [`crate::pull`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// A step raised an error, or a worker's step panicked and was caught at the thread
    /// boundary and converted into this variant.
    #[error("worker step failed: {0}")]
    Worker(String),

    /// `std::thread::Builder::spawn` failed when forking a worker.
    #[error("failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// Both thread sets were empty while the output queue still held a non-`Stop` event.
    /// Impossible under invariants C1/C2; surfacing it means the engine itself has a bug.
    #[error("drain invariant violated: {0}")]
    DrainInvariant(String),
}

impl EngineError {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "worker panicked with a non-string payload".to_string()
        };
        EngineError::Worker(message)
    }
}
