pub mod client;
pub mod config;
pub mod messages;

pub use client::OpenAIClient;
pub use config::OpenAIConfig;
