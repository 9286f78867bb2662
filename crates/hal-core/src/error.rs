use hal_graph::GraphError;
use hal_io::DriverError;
use thiserror::Error;

/// Error categories reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request or unknown id. Nothing was changed.
    IllegalArgument,
    /// Well-formed request rejected because of the current state. Nothing was changed.
    IllegalState,
    /// A driver call failed.
    Driver,
    /// The graph invariants are broken.
    Internal,
}

#[derive(Debug, Error)]
pub enum HalError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("driver failure: {0}")]
    Driver(#[from] DriverError),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl HalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HalError::IllegalArgument(_) => ErrorKind::IllegalArgument,
            HalError::IllegalState(_) => ErrorKind::IllegalState,
            HalError::Driver(_) => ErrorKind::Driver,
            HalError::Internal(_) => ErrorKind::Internal,
            HalError::Graph(err) if err.is_state_error() => ErrorKind::IllegalState,
            HalError::Graph(_) => ErrorKind::IllegalArgument,
        }
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        HalError::IllegalArgument(message.into())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        HalError::IllegalState(message.into())
    }
}

pub type Result<T> = std::result::Result<T, HalError>;
