// Status events handed from the receive engine to a display sink

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::common::types::WaitPhase;

/// Progress and outcome notifications for one request.
///
/// Every session ends with exactly one terminal event: `Complete`,
/// `NotFound`, `Timeout` or `TransportError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Requested { filename: String },
    AwaitingResponse,
    StreamingStarted,
    Progress { bytes_received: u64 },
    PlaybackReady { threshold: u64, path: PathBuf },
    Complete { path: PathBuf, bytes: u64 },
    NotFound { filename: String },
    Timeout { phase: WaitPhase, after: Duration },
    TransportError { message: String },
}

impl StatusEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusEvent::Complete { .. }
                | StatusEvent::NotFound { .. }
                | StatusEvent::Timeout { .. }
                | StatusEvent::TransportError { .. }
        )
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Requested { filename } => write!(f, "You requested: {}", filename),
            StatusEvent::AwaitingResponse => write!(f, "Waiting for server response..."),
            StatusEvent::StreamingStarted => write!(f, "Streaming started..."),
            StatusEvent::Progress { bytes_received } => {
                write!(f, "Received: {} bytes", bytes_received)
            }
            StatusEvent::PlaybackReady { threshold, path } => write!(
                f,
                "Buffer reached {} bytes. You can now play: {}",
                threshold,
                path.display()
            ),
            StatusEvent::Complete { path, bytes } => write!(
                f,
                "Streaming complete! {} bytes saved to {}",
                bytes,
                path.display()
            ),
            StatusEvent::NotFound { filename } => {
                write!(f, "Error: File not found on server: {}", filename)
            }
            StatusEvent::Timeout { phase, after } => write!(
                f,
                "Stream timeout! No {} within {:.1}s",
                phase,
                after.as_secs_f64()
            ),
            StatusEvent::TransportError { message } => write!(f, "Error: {}", message),
        }
    }
}

pub type StatusSender = Sender<StatusEvent>;
pub type StatusReceiver = Receiver<StatusEvent>;

/// Unbounded so the network side never blocks on a slow sink.
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    unbounded()
}
