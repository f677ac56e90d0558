// Protocol module - wire messages and chunk sizing

pub mod chunk;
pub mod messages;

pub use chunk::ChunkSizer;
pub use messages::{ControlReply, Request, StreamMessage, END_OF_STREAM, FOUND, NOT_FOUND};
