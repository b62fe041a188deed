//! The unit of data moved by the relay.

use bytes::Bytes;
use std::fmt;

/// One discrete message exchanged on a streaming connection.
///
/// A frame carries nothing but its payload and whether that payload is binary
/// (raw audio) or text (JSON control/event messages, opaque to the relay).
/// Frames are never merged or split: each one read from a source endpoint is
/// handed to the destination endpoint as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Bytes),
    Text(String),
}

impl Frame {
    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Frame::Binary(data) => data.len(),
            Frame::Text(text) => text.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Binary(_) => FrameKind::Binary,
            Frame::Text(_) => FrameKind::Text,
        }
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Frame::Binary(data)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Frame::Binary(Bytes::from(data))
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_string())
    }
}

/// Payload type of a [`Frame`], used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Binary,
    Text,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Binary => write!(f, "binary"),
            FrameKind::Text => write!(f, "text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len_and_kind() {
        let binary = Frame::from(vec![1u8, 2, 3]);
        assert_eq!(binary.len(), 3);
        assert_eq!(binary.kind(), FrameKind::Binary);

        let text = Frame::from("ping");
        assert_eq!(text.len(), 4);
        assert_eq!(text.kind(), FrameKind::Text);
        assert!(!text.is_empty());
    }

    #[test]
    fn test_empty_frames() {
        assert!(Frame::Binary(Bytes::new()).is_empty());
        assert!(Frame::Text(String::new()).is_empty());
    }

    #[test]
    fn test_binary_and_text_with_same_bytes_differ() {
        assert_ne!(Frame::from(b"ping".to_vec()), Frame::from("ping"));
    }

    #[test]
    fn test_frame_kind_display() {
        assert_eq!(FrameKind::Binary.to_string(), "binary");
        assert_eq!(FrameKind::Text.to_string(), "text");
    }
}
