// Common type definitions and constants

use std::fmt;
use std::time::Duration;

/// Client-side lifecycle of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    Idle,
    RequestSent,
    AwaitingControl,
    Streaming,
    Complete,
    NotFound,
    Timeout,
    TransportError,
}

impl ReceiveState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReceiveState::Complete
                | ReceiveState::NotFound
                | ReceiveState::Timeout
                | ReceiveState::TransportError
        )
    }
}

/// Which blocking wait ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    Control,
    Chunk,
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPhase::Control => write!(f, "control reply"),
            WaitPhase::Chunk => write!(f, "next chunk"),
        }
    }
}

// Network defaults
pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_SERVER_BIND: &str = "0.0.0.0:9999";
pub const DEFAULT_SERVER_TARGET: &str = "127.0.0.1:9999";
pub const DEFAULT_CLIENT_BIND: &str = "0.0.0.0:0";

// Chunking
pub const MIN_CHUNK_SIZE: usize = 1000;
pub const MAX_CHUNK_SIZE: usize = 2000;
pub const MAX_DATAGRAM_SIZE: usize = 65_507; // largest UDP payload over IPv4

// Pacing
pub const DEFAULT_PACING: Duration = Duration::from_millis(50);
pub const DEFAULT_CONTROL_SETTLE: Duration = Duration::from_millis(100);

// Timeouts
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(5);
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

// Buffers
pub const REQUEST_BUFFER_SIZE: usize = 2048;
pub const RECEIVE_BUFFER_SIZE: usize = MAX_DATAGRAM_SIZE;

// Client playback
pub const DEFAULT_PLAYBACK_THRESHOLD: u64 = 10_000;
pub const DEFAULT_OUTPUT_PREFIX: &str = "streaming_";

// Server admission
pub const DEFAULT_MAX_SESSIONS: usize = 32;
pub const DEFAULT_BACKLOG: usize = 64;
pub const MAX_BACKLOG: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        let terminal = [
            ReceiveState::Complete,
            ReceiveState::NotFound,
            ReceiveState::Timeout,
            ReceiveState::TransportError,
        ];
        assert!(terminal.iter().all(|s| s.is_terminal()));
        assert!(!ReceiveState::Streaming.is_terminal());
        assert!(!ReceiveState::Idle.is_terminal());
    }

    #[test]
    fn test_receive_buffer_fits_largest_chunk() {
        assert!(RECEIVE_BUFFER_SIZE >= MAX_CHUNK_SIZE);
        assert!(MIN_CHUNK_SIZE <= MAX_CHUNK_SIZE);
        assert!(DEFAULT_BACKLOG <= MAX_BACKLOG);
    }
}
