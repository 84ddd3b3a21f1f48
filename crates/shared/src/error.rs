use std::{error::Error as StdError, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Aborted,
    Timeout,
    Operation,
}

/// Failure recorded in a controller's state.
///
/// `Aborted` and `Timeout` are synthesized by this workspace. `Operation` carries whatever the
/// wrapped operation failed with, shared so that the copy kept in state and the copy handed
/// back to a caller are the same error.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    #[error("Aborted")]
    Aborted,
    #[error("Timeout")]
    Timeout,
    #[error(transparent)]
    Operation(Arc<dyn StdError + Send + Sync + 'static>),
}

impl OperationError {
    pub fn operation<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Operation(Arc::new(error))
    }

    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::from(anyhow::Error::msg(message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Aborted => ErrorKind::Aborted,
            Self::Timeout => ErrorKind::Timeout,
            Self::Operation(_) => ErrorKind::Operation,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Operation(cause) => Some(cause.as_ref()),
            Self::Aborted | Self::Timeout => None,
        }
    }
}

/// Two operation errors are equal only when they share the same cause.
impl PartialEq for OperationError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Aborted, Self::Aborted) | (Self::Timeout, Self::Timeout) => true,
            (Self::Operation(left), Self::Operation(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(value: anyhow::Error) -> Self {
        Self::from(BoxError::from(value))
    }
}

impl From<BoxError> for OperationError {
    fn from(value: BoxError) -> Self {
        Self::Operation(Arc::from(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&OperationError> for ErrorReport {
    fn from(value: &OperationError) -> Self {
        Self {
            kind: value.kind(),
            message: value.message(),
        }
    }
}
