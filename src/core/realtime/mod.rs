//! Realtime provider connection.
//!
//! Opens the provider side of a relay session: a WebSocket to the OpenAI
//! Realtime API authenticated with a bearer key and the realtime beta header.
//! Payloads are relayed opaquely; nothing here parses realtime events.

pub mod config;
pub mod upstream;

pub use config::{
    DEFAULT_REALTIME_MODEL, OPENAI_BETA_HEADER, OPENAI_REALTIME_URL, RealtimeUpstreamConfig,
};
pub use upstream::{OutboundEndpoint, RealtimeConnector, UpstreamSocket};
