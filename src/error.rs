use serde::Serialize;
use thiserror::Error;

/// Machine-matchable failure category carried in every error envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    MissingArgument,
    TargetNotFound,
    TypeMismatch,
    UnsupportedOperation,
    CompilationTimeout,
    HostRejected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MissingArgument => "MissingArgument",
            ErrorKind::TargetNotFound => "TargetNotFound",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::UnsupportedOperation => "UnsupportedOperation",
            ErrorKind::CompilationTimeout => "CompilationTimeout",
            ErrorKind::HostRejected => "HostRejected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Compilation did not finish within {waited_seconds:.2}s")]
    CompilationTimeout { waited_seconds: f64 },

    #[error("Host rejected the operation: {0}")]
    HostRejected(String),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::MissingArgument(_) => ErrorKind::MissingArgument,
            BridgeError::TargetNotFound(_) => ErrorKind::TargetNotFound,
            BridgeError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            BridgeError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            BridgeError::CompilationTimeout { .. } => ErrorKind::CompilationTimeout,
            BridgeError::HostRejected(_) => ErrorKind::HostRejected,
        }
    }

    pub fn missing(msg: impl Into<String>) -> Self {
        BridgeError::MissingArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BridgeError::TargetNotFound(msg.into())
    }

    pub fn mismatch(msg: impl Into<String>) -> Self {
        BridgeError::TypeMismatch(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        BridgeError::HostRejected(msg.into())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
