//! The duplex endpoint contract shared by the client-facing and
//! provider-facing sides of a relay session.
//!
//! The relay session never touches a transport directly. It only sees
//! [`DuplexEndpoint`]s, so the same orchestration runs over a live WebSocket
//! pair in production and over in-memory endpoints in tests.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::frame::Frame;

// =============================================================================
// Error Types
// =============================================================================

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// The peer completed a close handshake, or we closed the endpoint ourselves.
    Graceful,
    /// The connection went away without a close handshake.
    Abnormal,
}

impl fmt::Display for CloseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseKind::Graceful => write!(f, "graceful"),
            CloseKind::Abnormal => write!(f, "abnormal"),
        }
    }
}

/// Errors surfaced by [`DuplexEndpoint`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// No more frames will arrive and none can be sent.
    #[error("Endpoint closed ({0})")]
    Closed(CloseKind),

    /// The transport rejected an outgoing frame.
    #[error("Send failed: {0}")]
    SendFailure(String),

    /// The transport failed while waiting for an incoming frame.
    #[error("Receive failed: {0}")]
    ReceiveFailure(String),

    /// The transport delivered something that is neither binary nor text.
    /// Not fatal: the caller logs it and keeps receiving.
    #[error("Unrecognized frame type: {0}")]
    FrameTypeUnrecognized(String),
}

impl EndpointError {
    /// Whether the endpoint can still be used after this error.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EndpointError::FrameTypeUnrecognized(_))
    }
}

/// Result type for endpoint operations.
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Errors raised while establishing the provider-facing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// No credential is configured for the provider.
    #[error("Missing provider credential: {0}")]
    MissingCredential(String),

    /// The connection request could not be built.
    #[error("Invalid connection request: {0}")]
    InvalidRequest(String),

    /// The provider answered the handshake with a non-upgrade status.
    #[error("Provider rejected connection with HTTP {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// Network or handshake failure.
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    /// Establishment did not finish within the configured bound.
    #[error("Connection attempt timed out after {0}s")]
    Timeout(u64),
}

// =============================================================================
// Endpoint Contract
// =============================================================================

/// Which side of the relay an endpoint sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Client-facing connection.
    Inbound,
    /// Provider-facing connection.
    Outbound,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Inbound => write!(f, "inbound"),
            Side::Outbound => write!(f, "outbound"),
        }
    }
}

/// One side of a duplex relay.
///
/// All operations take `&self` so an endpoint can be shared between the task
/// that reads from it and the task that writes to it. Implementations keep
/// their read half and write half independent: a task suspended in
/// [`receive`](Self::receive) never blocks a concurrent [`send`](Self::send).
///
/// At most one task calls `receive` and at most one task calls `send` on a
/// given endpoint at a time. `close` may be called from anywhere, any number
/// of times.
#[async_trait]
pub trait DuplexEndpoint: Send + Sync {
    /// Which side of the relay this endpoint serves.
    fn side(&self) -> Side;

    /// Wait for the next frame.
    ///
    /// Returns [`EndpointError::Closed`] once no more frames will arrive,
    /// including when [`close`](Self::close) is called while waiting.
    async fn receive(&self) -> EndpointResult<Frame>;

    /// Hand a frame to the transport.
    ///
    /// Completes once the transport accepted the frame, not when the peer
    /// acknowledged it. Returns [`EndpointError::Closed`] if the endpoint is
    /// already closed or is closed while the send is pending.
    async fn send(&self, frame: Frame) -> EndpointResult<()>;

    /// Close the endpoint. Idempotent.
    ///
    /// After this returns, every `receive`/`send` fails with
    /// [`EndpointError::Closed`], and any call suspended on the endpoint has
    /// been released.
    async fn close(&self);

    /// Whether [`close`](Self::close) has been called or the transport ended.
    fn is_closed(&self) -> bool;
}

/// Opens the provider-facing endpoint for a new session.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Establish one upstream connection. Called exactly once per session;
    /// failures are never retried.
    async fn connect(&self) -> Result<Arc<dyn DuplexEndpoint>, ConnectError>;
}
