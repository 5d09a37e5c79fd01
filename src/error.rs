use crate::merge::ValidationError;
use crate::spreadsheet::SpreadsheetError;
use crate::writer::WriteError;
use thiserror::Error;

/// Error of a merge job, aggregating the errors of each stage.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error(transparent)]
    SpreadsheetError(#[from] SpreadsheetError),

    #[error(transparent)]
    ValidationError(#[from] ValidationError),

    #[error(transparent)]
    WriteError(#[from] WriteError),

    #[error("Merge cancelled")]
    Cancelled,

    #[error("Merge worker stopped unexpectedly")]
    WorkerError,
}

impl MergeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Extension trait for adding context to error messages
pub(crate) trait ResultMessage {
    /// Prefixes the error message, unless it already names its file
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SpreadsheetError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|error| {
            if error.is_contextual() {
                error
            } else {
                SpreadsheetError::WithContextError(format!("{message}: {error}"))
            }
        })
    }
}
