// Wire messages exchanged over the datagram channel
//
// There is no header or length prefix: one datagram is one message, and
// control messages are recognised by exact byte equality with a sentinel.

use std::net::SocketAddr;

use crate::common::error::{Error, Result};

/// Server reply: the requested file exists and a stream follows.
pub const FOUND: &[u8] = b"OK";
/// Server reply: the requested file does not exist; nothing follows.
pub const NOT_FOUND: &[u8] = b"ERROR";
/// End of stream marker sent after the last data chunk.
pub const END_OF_STREAM: &[u8] = b"EOF";

/// A file request received by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub peer: SocketAddr,
    pub filename: String,
}

impl Request {
    /// Decode a request datagram: UTF-8 filename with surrounding whitespace trimmed.
    ///
    /// A blank name is still a request; it names no file and is answered
    /// with `ERROR`. Only a payload that is not UTF-8 is rejected.
    pub fn parse(peer: SocketAddr, payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|e| {
            Error::InvalidRequest(format!("filename from {} is not UTF-8: {}", peer, e))
        })?;

        Ok(Self {
            peer,
            filename: text.trim().to_string(),
        })
    }

    /// Encode a filename as a request payload.
    pub fn encode(filename: &str) -> Vec<u8> {
        filename.trim().as_bytes().to_vec()
    }
}

/// First datagram a client expects after sending a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    Found,
    NotFound,
    Unexpected,
}

impl ControlReply {
    pub fn classify(payload: &[u8]) -> Self {
        if payload == FOUND {
            ControlReply::Found
        } else if payload == NOT_FOUND {
            ControlReply::NotFound
        } else {
            ControlReply::Unexpected
        }
    }
}

/// Datagram received while streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMessage<'a> {
    Data(&'a [u8]),
    End,
}

impl<'a> StreamMessage<'a> {
    pub fn classify(payload: &'a [u8]) -> Self {
        if payload == END_OF_STREAM {
            StreamMessage::End
        } else {
            StreamMessage::Data(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[test]
    fn test_request_is_trimmed() {
        let req = Request::parse(peer(), b"  18.mp4\r\n").unwrap();
        assert_eq!(req.filename, "18.mp4");
        assert_eq!(req.peer, peer());
        assert_eq!(Request::encode(" clip.mp4 "), b"clip.mp4".to_vec());
    }

    #[test]
    fn test_blank_request_kept_and_invalid_rejected() {
        assert_eq!(Request::parse(peer(), b"   \n").unwrap().filename, "");
        assert!(matches!(
            Request::parse(peer(), &[0xff, 0xfe, 0x00]),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_control_reply_exact_match() {
        assert_eq!(ControlReply::classify(b"OK"), ControlReply::Found);
        assert_eq!(ControlReply::classify(b"ERROR"), ControlReply::NotFound);
        assert_eq!(ControlReply::classify(b"OK "), ControlReply::Unexpected);
        assert_eq!(ControlReply::classify(b"ok"), ControlReply::Unexpected);
        assert_eq!(ControlReply::classify(b""), ControlReply::Unexpected);
    }

    #[test]
    fn test_stream_message_sentinel() {
        assert_eq!(StreamMessage::classify(b"EOF"), StreamMessage::End);
        assert_eq!(
            StreamMessage::classify(b"EOF\n"),
            StreamMessage::Data(b"EOF\n")
        );
        let chunk = vec![7u8; 1500];
        assert_eq!(StreamMessage::classify(&chunk), StreamMessage::Data(&chunk[..]));
    }
}
