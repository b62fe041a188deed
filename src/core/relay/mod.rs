//! Realtime bidirectional relay.
//!
//! Bridges one client connection to one provider connection. The session
//! logic only depends on the [`DuplexEndpoint`] contract; concrete transports
//! are WebSocket-backed [`SocketEndpoint`]s in production and
//! [`MemoryEndpoint`]s in tests.

pub mod endpoint;
pub mod frame;
pub mod memory;
pub mod session;
pub mod socket;

pub use endpoint::{
    CloseKind, ConnectError, DuplexEndpoint, EndpointError, EndpointResult, Side, UpstreamConnector,
};
pub use frame::{Frame, FrameKind};
pub use memory::{MemoryConnector, MemoryEndpoint, MemoryPeer};
pub use session::{
    DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, Direction, DirectionStats, RelayLimits,
    RelaySession, SessionReport, SessionState, TerminationCause, TerminationSignal,
};
pub use socket::{SocketEndpoint, Wire, WireMessage};
