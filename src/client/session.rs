// Client receive session: request, control handshake, chunk loop

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use super::receiver::OutputSink;
use super::status::{StatusEvent, StatusSender};
use crate::common::config::ClientConfig;
use crate::common::error::{Error, Result};
use crate::common::types::{ReceiveState, WaitPhase, RECEIVE_BUFFER_SIZE};
use crate::protocol::messages::{ControlReply, Request, StreamMessage};
use crate::transport::{send_datagram, DatagramSocket};

/// Result of a completed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub filename: String,
    pub output_path: PathBuf,
    pub bytes: u64,
    pub chunks: u64,
    pub digest: String,
}

/// Drives a single request from `Idle` to a terminal state.
///
/// Bytes land in the output file in arrival order. The transport gives no
/// ordering or delivery guarantee and nothing here reorders or detects loss.
pub struct ReceiveSession<S: DatagramSocket> {
    socket: S,
    config: ClientConfig,
    status: StatusSender,
    filename: String,
    state: ReceiveState,
    sink: Option<OutputSink>,
    output_path: PathBuf,
    bytes_received: u64,
    chunks_received: u64,
    playback_ready: bool,
}

impl<S: DatagramSocket> ReceiveSession<S> {
    pub fn new(socket: S, config: ClientConfig, status: StatusSender) -> Self {
        Self {
            socket,
            config,
            status,
            filename: String::new(),
            state: ReceiveState::Idle,
            sink: None,
            output_path: PathBuf::new(),
            bytes_received: 0,
            chunks_received: 0,
            playback_ready: false,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks_received
    }

    pub fn playback_ready(&self) -> bool {
        self.playback_ready
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Submit, wait for the control reply, then stream to completion.
    pub fn run(mut self, filename: &str) -> Result<TransferSummary> {
        self.submit(filename)?;
        self.await_control()?;
        self.stream_loop()
    }

    /// Open the output file and send the request datagram.
    pub fn submit(&mut self, filename: &str) -> Result<()> {
        self.expect_state(ReceiveState::Idle, "submit")?;
        self.config.validate()?;

        let filename = filename.trim();
        if filename.is_empty() {
            return Err(Error::InvalidRequest("empty filename".to_string()));
        }

        self.filename = filename.to_string();
        self.bytes_received = 0;
        self.chunks_received = 0;
        self.playback_ready = false;
        self.output_path = self.config.output_path_for(filename);
        self.emit(StatusEvent::Requested {
            filename: self.filename.clone(),
        });

        match OutputSink::create(&self.output_path) {
            Ok(sink) => self.sink = Some(sink),
            Err(e) => {
                let path = self.output_path.display().to_string();
                return Err(self.fail(Error::Transport(format!(
                    "cannot open output {}: {}",
                    path, e
                ))));
            }
        }

        let payload = Request::encode(filename);
        if let Err(e) = send_datagram(&self.socket, &payload, self.config.server_addr) {
            return Err(self.fail(e));
        }
        self.state = ReceiveState::RequestSent;
        info!("Requested {} from {}", self.filename, self.config.server_addr);

        self.emit(StatusEvent::AwaitingResponse);
        self.state = ReceiveState::AwaitingControl;
        Ok(())
    }

    /// Block for the control reply. Anything but `OK` means "not available".
    pub fn await_control(&mut self) -> Result<()> {
        self.expect_state(ReceiveState::AwaitingControl, "await control reply")?;

        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        let len = match self.recv(&mut buf, WaitPhase::Control) {
            Ok(len) => len,
            Err(e) => return Err(self.fail(e)),
        };

        match ControlReply::classify(&buf[..len]) {
            ControlReply::Found => {
                self.state = ReceiveState::Streaming;
                self.emit(StatusEvent::StreamingStarted);
                Ok(())
            }
            reply => {
                if reply == ControlReply::Unexpected {
                    warn!("Unexpected control reply ({} bytes) for {}", len, self.filename);
                }
                let filename = self.filename.clone();
                Err(self.fail(Error::NotFound(filename)))
            }
        }
    }

    /// Receive chunks until `EOF`, a timeout or a transport failure.
    pub fn stream_loop(&mut self) -> Result<TransferSummary> {
        self.expect_state(ReceiveState::Streaming, "stream")?;

        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        loop {
            let len = match self.recv(&mut buf, WaitPhase::Chunk) {
                Ok(len) => len,
                Err(e) => return Err(self.fail(e)),
            };

            match StreamMessage::classify(&buf[..len]) {
                StreamMessage::End => return self.complete(),
                StreamMessage::Data(chunk) => {
                    if let Err(e) = self.accept_chunk(chunk) {
                        return Err(self.fail(e));
                    }
                }
            }
        }
    }

    fn accept_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::InvalidState("output sink is closed".to_string()))?;
        sink.write_chunk(chunk)?;

        self.bytes_received += chunk.len() as u64;
        self.chunks_received += 1;
        debug!("Received {} bytes (total {})", chunk.len(), self.bytes_received);
        self.emit(StatusEvent::Progress {
            bytes_received: self.bytes_received,
        });

        if !self.playback_ready && self.bytes_received >= self.config.playback_threshold {
            self.playback_ready = true;
            info!(
                "Playback buffer reached for {} at {} bytes",
                self.filename, self.bytes_received
            );
            self.emit(StatusEvent::PlaybackReady {
                threshold: self.config.playback_threshold,
                path: self.output_path.clone(),
            });
        }
        Ok(())
    }

    fn complete(&mut self) -> Result<TransferSummary> {
        let digest = match self.sink.take() {
            Some(sink) => match sink.finish() {
                Ok(digest) => digest,
                Err(e) => return Err(self.fail(e)),
            },
            None => return Err(self.fail(Error::InvalidState("output sink is closed".to_string()))),
        };

        self.state = ReceiveState::Complete;
        info!(
            "Streaming complete for {}: {} bytes in {} chunks (blake3 {})",
            self.filename,
            self.bytes_received,
            self.chunks_received,
            &digest[..16]
        );
        self.emit(StatusEvent::Complete {
            path: self.output_path.clone(),
            bytes: self.bytes_received,
        });

        Ok(TransferSummary {
            filename: self.filename.clone(),
            output_path: self.output_path.clone(),
            bytes: self.bytes_received,
            chunks: self.chunks_received,
            digest,
        })
    }

    fn recv(&self, buf: &mut [u8], phase: WaitPhase) -> Result<usize> {
        let timeout = self.timeout_for(phase);
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| Error::Transport(format!("cannot set read timeout: {}", e)))?;

        match self.socket.recv_from(buf) {
            Ok((len, from)) => {
                if from != self.config.server_addr {
                    debug!("Datagram from {} (expected {})", from, self.config.server_addr);
                }
                Ok(len)
            }
            Err(e) if Error::is_timeout_io(&e) => Err(Error::Timeout(phase)),
            Err(e) => Err(Error::Transport(format!("receive failed: {}", e))),
        }
    }

    fn timeout_for(&self, phase: WaitPhase) -> Duration {
        match phase {
            WaitPhase::Control => self.config.control_timeout,
            WaitPhase::Chunk => self.config.chunk_timeout,
        }
    }

    /// Move to the terminal state matching `err` and report it once.
    /// The output file is closed as-is.
    fn fail(&mut self, err: Error) -> Error {
        let (state, event) = match &err {
            Error::NotFound(name) => (
                ReceiveState::NotFound,
                StatusEvent::NotFound {
                    filename: name.clone(),
                },
            ),
            Error::Timeout(phase) => (
                ReceiveState::Timeout,
                StatusEvent::Timeout {
                    phase: *phase,
                    after: self.timeout_for(*phase),
                },
            ),
            other => (
                ReceiveState::TransportError,
                StatusEvent::TransportError {
                    message: other.to_string(),
                },
            ),
        };

        warn!("Request for {} ended: {}", self.filename, err);
        self.sink = None;
        self.state = state;
        self.emit(event);
        err
    }

    fn expect_state(&self, expected: ReceiveState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "cannot {} in state {:?}",
                action, self.state
            )));
        }
        Ok(())
    }

    fn emit(&self, event: StatusEvent) {
        // A closed sink only means nobody is watching.
        let _ = self.status.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::status::{status_channel, StatusReceiver};
    use crate::protocol::messages::{END_OF_STREAM, FOUND, NOT_FOUND};
    use crate::transport::scripted::ScriptedSocket;
    use std::net::SocketAddr;
    use tempfile::TempDir;

    fn server() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    fn setup(dir: &TempDir, threshold: u64) -> (ReceiveSession<ScriptedSocket>, StatusReceiver) {
        let config = ClientConfig::new(server())
            .with_output_dir(dir.path().to_path_buf())
            .with_playback_threshold(threshold)
            .with_control_timeout(Duration::from_millis(100))
            .unwrap()
            .with_chunk_timeout(Duration::from_millis(100))
            .unwrap();
        let (tx, rx) = status_channel();
        (ReceiveSession::new(ScriptedSocket::new(server()), config, tx), rx)
    }

    fn events(rx: &StatusReceiver) -> Vec<StatusEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_full_stream_writes_output() {
        let dir = TempDir::new().unwrap();
        let (session, rx) = setup(&dir, 10_000);
        session.socket.push(FOUND);
        session.socket.push(&[1u8; 1500]);
        session.socket.push(&[2u8; 1200]);
        session.socket.push(END_OF_STREAM);

        let summary = session.run("clip.mp4").unwrap();
        assert_eq!(summary.bytes, 2700);
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.output_path, dir.path().join("streaming_clip.mp4"));

        let mut expected = vec![1u8; 1500];
        expected.extend_from_slice(&[2u8; 1200]);
        assert_eq!(std::fs::read(&summary.output_path).unwrap(), expected);
        assert_eq!(summary.digest, hex::encode(blake3::hash(&expected).as_bytes()));

        let events = events(&rx);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(events.last(), Some(StatusEvent::Complete { bytes: 2700, .. })));
        assert!(!events.iter().any(|e| matches!(e, StatusEvent::PlaybackReady { .. })));
    }

    #[test]
    fn test_request_payload_and_state() {
        let dir = TempDir::new().unwrap();
        let (mut session, _rx) = setup(&dir, 10_000);

        session.submit("  18.mp4 ").unwrap();
        assert_eq!(session.state(), ReceiveState::AwaitingControl);
        assert_eq!(session.socket.sent(), vec![(b"18.mp4".to_vec(), server())]);
        assert!(dir.path().join("streaming_18.mp4").exists());

        assert!(matches!(session.submit("other"), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_zero_timeout_refused_before_request() {
        let dir = TempDir::new().unwrap();
        let (mut session, rx) = setup(&dir, 10_000);
        session.config.control_timeout = Duration::ZERO;

        assert!(matches!(session.submit("18.mp4"), Err(Error::Config(_))));
        assert_eq!(session.state(), ReceiveState::Idle);
        assert!(session.socket.sent().is_empty());
        assert!(events(&rx).is_empty());
    }

    #[test]
    fn test_playback_ready_fires_once() {
        let dir = TempDir::new().unwrap();
        let (mut session, rx) = setup(&dir, 3000);
        session.socket.push(FOUND);
        // Second chunk jumps well past the threshold in one receive.
        session.socket.push(&[0u8; 1000]);
        session.socket.push(&[0u8; 9000]);
        session.socket.push(&[0u8; 2000]);
        session.socket.push(END_OF_STREAM);

        session.submit("movie.mp4").unwrap();
        session.await_control().unwrap();
        session.stream_loop().unwrap();
        assert!(session.playback_ready());
        assert_eq!(session.state(), ReceiveState::Complete);

        let events = events(&rx);
        let ready: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, StatusEvent::PlaybackReady { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(ready.len(), 1);
        assert_eq!(
            events[ready[0] - 1],
            StatusEvent::Progress { bytes_received: 10_000 }
        );
    }

    #[test]
    fn test_not_found_reply_is_terminal() {
        let dir = TempDir::new().unwrap();
        let (mut session, rx) = setup(&dir, 10_000);
        session.socket.push(NOT_FOUND);
        session.socket.push(&[9u8; 1500]);

        session.submit("missing.mp4").unwrap();
        assert!(matches!(session.await_control(), Err(Error::NotFound(_))));
        assert_eq!(session.state(), ReceiveState::NotFound);
        assert_eq!(session.bytes_received(), 0);
        // The trailing datagram is never consumed.
        assert_eq!(session.socket.pending(), 1);
        assert!(matches!(session.stream_loop(), Err(Error::InvalidState(_))));

        let events = events(&rx);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(events.last(), Some(StatusEvent::NotFound { .. })));
    }

    #[test]
    fn test_unexpected_control_reply_means_not_available() {
        let dir = TempDir::new().unwrap();
        let (session, rx) = setup(&dir, 10_000);
        session.socket.push(&[0u8; 1500]);

        assert!(matches!(session.run("clip.mp4"), Err(Error::NotFound(_))));
        assert!(matches!(events(&rx).last(), Some(StatusEvent::NotFound { .. })));
    }

    #[test]
    fn test_control_timeout_is_terminal() {
        let dir = TempDir::new().unwrap();
        let (mut session, rx) = setup(&dir, 10_000);

        session.submit("slow.mp4").unwrap();
        assert!(matches!(
            session.await_control(),
            Err(Error::Timeout(WaitPhase::Control))
        ));
        assert_eq!(session.state(), ReceiveState::Timeout);
        assert_eq!(session.socket.timeouts(), vec![Some(Duration::from_millis(100))]);

        let events = events(&rx);
        let timeouts = events
            .iter()
            .filter(|e| matches!(e, StatusEvent::Timeout { .. }))
            .count();
        assert_eq!(timeouts, 1);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(!events.iter().any(|e| matches!(e, StatusEvent::Progress { .. })));
    }

    #[test]
    fn test_chunk_timeout_keeps_partial_output() {
        let dir = TempDir::new().unwrap();
        let (session, rx) = setup(&dir, 10_000);
        session.socket.push(FOUND);
        session.socket.push(&[5u8; 1800]);

        let result = session.run("cut.mp4");
        assert!(matches!(result, Err(Error::Timeout(WaitPhase::Chunk))));

        let partial = std::fs::read(dir.path().join("streaming_cut.mp4")).unwrap();
        assert_eq!(partial, vec![5u8; 1800]);
        assert!(matches!(
            events(&rx).last(),
            Some(StatusEvent::Timeout { phase: WaitPhase::Chunk, .. })
        ));
    }

    #[test]
    fn test_dropped_status_receiver_is_ignored() {
        let dir = TempDir::new().unwrap();
        let (session, rx) = setup(&dir, 10);
        drop(rx);
        session.socket.push(FOUND);
        session.socket.push(b"payload");
        session.socket.push(END_OF_STREAM);

        assert_eq!(session.run("a.bin").unwrap().bytes, 7);
    }
}
