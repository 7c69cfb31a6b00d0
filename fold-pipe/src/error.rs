use instance_pipes::{PayloadKind, PipeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FoldError {
    #[error(transparent)]
    Pipe(#[from] PipeError),
    #[error("fold count must be at least 2, got {0}")]
    InvalidFolds(usize),
    #[error("chunk size must be at least 1")]
    InvalidChunkSize,
    #[error("pipeline must end in instances, but it produces {0}")]
    NotInstances(PayloadKind),
}
