// Server module - UDP dispatcher and per-request transfer sessions

mod session;

pub use session::{resolve_path, SessionOutcome, SessionReport, TransferSession};

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::common::config::ServerConfig;
use crate::common::error::{Error, Result};
use crate::common::types::{REQUEST_BUFFER_SIZE, SHUTDOWN_POLL_INTERVAL};
use crate::protocol::messages::{Request, NOT_FOUND};
use crate::transport::{send_datagram, DatagramSocket};

/// Owns the listening socket and hands each request to a worker.
///
/// Sessions run on a fixed pool of `max_sessions` threads fed through a
/// bounded queue of `backlog` requests. A request arriving while the queue is
/// full is refused with `ERROR` instead of spawning more work.
pub struct Server {
    config: ServerConfig,
    socket: Arc<UdpSocket>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Bind the listening socket. Failure here is fatal for the operator.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).map_err(|source| Error::Bind {
            addr: config.bind_addr.to_string(),
            source,
        })?;
        info!("UDP streaming server listening on {}", socket.local_addr()?);

        Ok(Self {
            config,
            socket: Arc::new(socket),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Setting the flag stops `run` within one poll interval.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Receive requests until shutdown. Queued requests are still served
    /// before this returns.
    pub fn run(&self) -> Result<()> {
        let (tx, rx) = bounded::<Request>(self.config.backlog);
        let workers = self.spawn_workers(rx)?;

        DatagramSocket::set_read_timeout(&*self.socket, Some(SHUTDOWN_POLL_INTERVAL))?;
        let mut buf = [0u8; REQUEST_BUFFER_SIZE];

        while !self.shutdown.load(Ordering::Relaxed) {
            let (len, peer) = match DatagramSocket::recv_from(&*self.socket, &mut buf) {
                Ok(v) => v,
                Err(e) if Error::is_timeout_io(&e) => continue,
                Err(e) => {
                    // ICMP errors from earlier sends can surface here; keep serving.
                    warn!("Server: receive error: {}", e);
                    continue;
                }
            };
            self.dispatch(&tx, peer, &buf[..len]);
        }

        info!("Server: shutting down, waiting for active sessions");
        drop(tx);
        for handle in workers {
            if handle.join().is_err() {
                error!("Server: session worker panicked");
            }
        }
        Ok(())
    }

    fn dispatch(&self, queue: &Sender<Request>, peer: SocketAddr, payload: &[u8]) {
        let request = match Request::parse(peer, payload) {
            Ok(r) => r,
            Err(e) => {
                warn!("Server: dropping request: {}", e);
                return;
            }
        };

        info!("Client {} requested: {}", request.peer, request.filename);

        match queue.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                warn!(
                    "Server: backlog full, refusing {} for {}",
                    request.filename, request.peer
                );
                if let Err(e) = send_datagram(&*self.socket, NOT_FOUND, request.peer) {
                    debug!("Server: could not refuse {}: {}", request.peer, e);
                }
            }
            Err(TrySendError::Disconnected(request)) => {
                error!(
                    "Server: no workers available for {} from {}",
                    request.filename, request.peer
                );
            }
        }
    }

    fn spawn_workers(&self, rx: Receiver<Request>) -> Result<Vec<JoinHandle<()>>> {
        let mut workers = Vec::with_capacity(self.config.max_sessions);
        for id in 0..self.config.max_sessions {
            let rx = rx.clone();
            let socket = Arc::clone(&self.socket);
            let config = self.config.clone();
            let handle = thread::Builder::new()
                .name(format!("session-{}", id))
                .spawn(move || session_worker(socket, rx, config))?;
            workers.push(handle);
        }
        debug!("Server: started {} session workers", workers.len());
        Ok(workers)
    }
}

fn session_worker<S: DatagramSocket>(socket: Arc<S>, rx: Receiver<Request>, config: ServerConfig) {
    for request in rx.iter() {
        let peer = request.peer;
        let filename = request.filename.clone();

        let session = match TransferSession::new(Arc::clone(&socket), request, &config) {
            Ok(s) => s,
            Err(e) => {
                error!("Server: cannot start session for {} ({}): {}", peer, filename, e);
                continue;
            }
        };

        match session.run() {
            Ok(report) => debug!("Server: session finished: {:?}", report.outcome),
            Err(e) => error!("Server: session for {} ({}) aborted: {}", peer, filename, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bind_conflict_is_bind_error() {
        let first = Server::bind(ServerConfig::new("127.0.0.1:0".parse().unwrap())).unwrap();
        let taken = first.local_addr().unwrap();

        match Server::bind(ServerConfig::new(taken)) {
            Err(Error::Bind { addr, .. }) => assert_eq!(addr, taken.to_string()),
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_shutdown_stops_run() {
        let server = Server::bind(ServerConfig::new("127.0.0.1:0".parse().unwrap())).unwrap();
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run());

        thread::sleep(Duration::from_millis(50));
        shutdown.store(true, Ordering::Relaxed);
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_blank_request_gets_not_found() {
        let server = Server::bind(ServerConfig::new("127.0.0.1:0".parse().unwrap())).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run());

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        client.send_to(b" \n", addr).unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], NOT_FOUND);

        // Nothing follows the refusal.
        client.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
        assert!(client.recv_from(&mut buf).is_err());

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_non_utf8_request_gets_no_reply() {
        let server = Server::bind(ServerConfig::new("127.0.0.1:0".parse().unwrap())).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run());

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
        client.send_to(&[0xff, 0xfe], addr).unwrap();

        let mut buf = [0u8; 64];
        assert!(client.recv_from(&mut buf).is_err());

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }
}
