// Server-side transfer session: one file streamed to one peer

use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::common::config::ServerConfig;
use crate::common::error::Result;
use crate::protocol::chunk::ChunkSizer;
use crate::protocol::messages::{Request, END_OF_STREAM, FOUND, NOT_FOUND};
use crate::transport::{send_datagram, DatagramSocket};

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Served {
        bytes: u64,
        chunks: u64,
        digest: String,
    },
    NotFound,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub peer: SocketAddr,
    pub filename: String,
    pub outcome: SessionOutcome,
}

/// Streams one requested file to the peer that asked for it.
///
/// Sends exactly one control reply (`OK` or `ERROR`). After `OK` come the data
/// chunks, then exactly one `EOF`. The socket is shared with sibling sessions
/// and only used for sending.
pub struct TransferSession<S: DatagramSocket> {
    socket: Arc<S>,
    request: Request,
    root_dir: PathBuf,
    sizer: ChunkSizer,
    pacing: Duration,
    control_settle: Duration,
    bytes_sent: u64,
    chunks_sent: u64,
}

impl<S: DatagramSocket> TransferSession<S> {
    pub fn new(socket: Arc<S>, request: Request, config: &ServerConfig) -> Result<Self> {
        Ok(Self {
            socket,
            request,
            root_dir: config.root_dir.clone(),
            sizer: ChunkSizer::new(config.min_chunk, config.max_chunk)?,
            pacing: config.pacing,
            control_settle: config.control_settle,
            bytes_sent: 0,
            chunks_sent: 0,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.request.peer
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    /// Resolve the request, then either refuse it or stream the file.
    pub fn run(mut self) -> Result<SessionReport> {
        let file = match self.open_requested() {
            Some(file) => file,
            None => {
                send_datagram(&*self.socket, NOT_FOUND, self.request.peer)?;
                info!("File not found: {} (requested by {})", self.request.filename, self.request.peer);
                return Ok(self.report(SessionOutcome::NotFound));
            }
        };

        let outcome = self.stream_from(file)?;
        Ok(self.report(outcome))
    }

    /// Send `OK`, then the reader's bytes in randomly sized chunks, then `EOF`.
    pub fn stream_from<R: Read>(&mut self, mut reader: R) -> Result<SessionOutcome> {
        let peer = self.request.peer;
        send_datagram(&*self.socket, FOUND, peer)?;
        pause(self.control_settle);

        let mut hasher = blake3::Hasher::new();
        let mut chunk = Vec::with_capacity(self.sizer.bounds().1);

        loop {
            if let Err(e) = self.next_chunk(&mut reader, &mut chunk) {
                warn!(
                    "Read failed streaming {} to {} after {} bytes: {}",
                    self.request.filename, peer, self.bytes_sent, e
                );
                self.try_terminate();
                return Err(e);
            }
            if chunk.is_empty() {
                break;
            }

            if let Err(e) = send_datagram(&*self.socket, &chunk, peer) {
                warn!(
                    "Send failed streaming {} to {} after {} bytes: {}",
                    self.request.filename, peer, self.bytes_sent, e
                );
                self.try_terminate();
                return Err(e);
            }
            hasher.update(&chunk);
            self.bytes_sent += chunk.len() as u64;
            self.chunks_sent += 1;
            debug!("Sent {} bytes to {} (total {})", chunk.len(), peer, self.bytes_sent);

            pause(self.pacing);
        }

        send_datagram(&*self.socket, END_OF_STREAM, peer)?;

        let digest = hex::encode(hasher.finalize().as_bytes());
        info!(
            "Streaming complete for {} to {}: {} bytes in {} chunks (blake3 {})",
            self.request.filename,
            peer,
            self.bytes_sent,
            self.chunks_sent,
            &digest[..16]
        );

        Ok(SessionOutcome::Served {
            bytes: self.bytes_sent,
            chunks: self.chunks_sent,
            digest,
        })
    }

    /// Refill `chunk` with the next randomly sized read; empty means end of file.
    fn next_chunk<R: Read>(&self, reader: &mut R, chunk: &mut Vec<u8>) -> Result<()> {
        let size = self.sizer.next_size()?;
        chunk.clear();
        reader.take(size as u64).read_to_end(chunk)?;
        Ok(())
    }

    fn open_requested(&self) -> Option<File> {
        let path = resolve_path(&self.root_dir, &self.request.filename)?;
        if !path.is_file() {
            return None;
        }
        match File::open(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Cannot open {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Best-effort `EOF` after a failure so the peer stops waiting.
    fn try_terminate(&self) {
        if let Err(e) = send_datagram(&*self.socket, END_OF_STREAM, self.request.peer) {
            debug!("Could not deliver terminator to {}: {}", self.request.peer, e);
        }
    }

    fn report(&self, outcome: SessionOutcome) -> SessionReport {
        SessionReport {
            peer: self.request.peer,
            filename: self.request.filename.clone(),
            outcome,
        }
    }
}

/// Map a requested name into `root`, refusing anything that could escape it.
pub fn resolve_path(root: &Path, name: &str) -> Option<PathBuf> {
    let requested = Path::new(name);
    let mut resolved = root.to_path_buf();
    for component in requested.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                warn!("Refusing path outside the served directory: {}", name);
                return None;
            }
        }
    }
    if resolved == root {
        return None;
    }
    Some(resolved)
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
