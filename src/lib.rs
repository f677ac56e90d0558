//! UDP file streaming: a dispatcher that streams requested files as randomly
//! sized datagrams, and a client that writes them to disk and signals when
//! enough has arrived to start playback.

pub mod client;
pub mod common;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{Client, StatusEvent, TransferSummary};
pub use common::{ClientConfig, Error, Result, ServerConfig};
pub use server::Server;
