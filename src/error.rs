//! Error types for rowgate

use std::fmt;

/// Result type alias for rowgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for rowgate
#[derive(Debug)]
pub enum Error {
    /// Connection-level failure, surfaced to the caller verbatim
    Transport(String),
    /// Push-query concurrency limit reached
    QuotaExceeded { max: usize },
    /// No alive host can serve the requested partition
    NoHealthyReplica { store: String, partition: u32 },
    /// Subscriber fell behind its bounded buffer and was terminated
    BufferOverrun { query_id: String },
    /// A push query id was registered twice; indicates a caller defect
    DuplicateRegistration(String),
    /// Request rejected before reaching routing or fan-out logic
    MalformedRequest(String),
    /// Configuration errors
    Config(String),
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
    /// Internal error
    Internal(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::QuotaExceeded { max } => {
                write!(
                    f,
                    "Push query quota exceeded: at most {} concurrent push queries",
                    max
                )
            }
            Error::NoHealthyReplica { store, partition } => {
                write!(f, "No healthy replica for store {} partition {}", store, partition)
            }
            Error::BufferOverrun { query_id } => {
                write!(f, "Subscriber buffer overrun, query {} terminated", query_id)
            }
            Error::DuplicateRegistration(id) => {
                write!(f, "Push query id {} is already registered", id)
            }
            Error::MalformedRequest(msg) => write!(f, "Malformed request: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
