// Error types and error handling

use std::fmt;
use std::io;

use super::types::WaitPhase;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Bind { addr: String, source: io::Error },
    NotFound(String),
    Timeout(WaitPhase),
    Transport(String),
    InvalidRequest(String),
    InvalidState(String),
    Config(String),
}

impl Error {
    /// True for the error kinds a socket read timeout surfaces as.
    pub fn is_timeout_io(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Bind { addr, source } => write!(f, "Cannot bind {}: {}", addr, source),
            Error::NotFound(name) => write!(f, "File not found on server: {}", name),
            Error::Timeout(phase) => write!(f, "Timed out waiting for {}", phase),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            Error::InvalidState(e) => write!(f, "Invalid state: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
