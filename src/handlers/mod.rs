//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check
//! - `auth` - Signup, login with one-time code, token refresh
//! - `user` - User settings
//! - `history` - Conversation history
//! - `assistant` - Chat, translation, transcription, text chat
//! - `tts` - Text to speech
//! - `realtime` - Realtime relay WebSocket
//! - `ws` - Diagnostic echo WebSockets

pub mod api;
pub mod assistant;
pub mod auth;
pub mod history;
pub mod realtime;
pub mod response;
pub mod tts;
pub mod user;
pub mod ws;

pub use realtime::realtime_relay_handler;
