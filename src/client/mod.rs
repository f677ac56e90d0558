// Client module - request/receive engine

mod receiver;
mod session;
mod status;

pub use receiver::OutputSink;
pub use session::{ReceiveSession, TransferSummary};
pub use status::{status_channel, StatusEvent, StatusReceiver, StatusSender};

use std::net::UdpSocket;
use std::thread::{self, JoinHandle};

use crate::common::config::ClientConfig;
use crate::common::error::{Error, Result};

/// Main client interface
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch `filename` on the calling thread over a fresh socket.
    ///
    /// Status events go to `status`; the returned result mirrors the terminal
    /// event.
    pub fn fetch(&self, filename: &str, status: StatusSender) -> Result<TransferSummary> {
        let socket = match UdpSocket::bind(self.config.bind_addr) {
            Ok(s) => s,
            Err(source) => {
                let err = Error::Bind {
                    addr: self.config.bind_addr.to_string(),
                    source,
                };
                let _ = status.send(StatusEvent::TransportError {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        ReceiveSession::new(socket, self.config.clone(), status).run(filename)
    }

    /// Run `fetch` on its own thread so the caller (e.g. an input loop) is
    /// never blocked by network waits.
    pub fn spawn_fetch(
        &self,
        filename: String,
        status: StatusSender,
    ) -> JoinHandle<Result<TransferSummary>> {
        let client = self.clone();
        thread::spawn(move || client.fetch(&filename, status))
    }
}
