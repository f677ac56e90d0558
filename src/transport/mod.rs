// Transport layer - datagram socket abstraction

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::common::error::{Error, Result};

/// Boundary-preserving, connectionless socket.
///
/// Each `send_to` must go out as one datagram; concurrent senders sharing a
/// socket never interleave partial payloads.
pub trait DatagramSocket: Send + Sync {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize>;
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl DatagramSocket for UdpSocket {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, peer)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UdpSocket::set_read_timeout(self, timeout)
    }
}

/// Send one whole datagram, treating a short write as a transport failure.
pub fn send_datagram<S: DatagramSocket + ?Sized>(
    socket: &S,
    payload: &[u8],
    peer: SocketAddr,
) -> Result<()> {
    let written = socket
        .send_to(payload, peer)
        .map_err(|e| Error::Transport(format!("send to {} failed: {}", peer, e)))?;
    if written != payload.len() {
        return Err(Error::Transport(format!(
            "short send to {}: {} of {} bytes",
            peer,
            written,
            payload.len()
        )));
    }
    Ok(())
}
