pub mod email;
pub mod openai;
pub mod providers;
pub mod realtime;
pub mod relay;
pub mod storage;

// Re-export commonly used types for convenience
pub use providers::{
    ChatTurn, LanguageModel, ProviderError, ProviderResult, SpeechSynthesizer, Transcriber,
};

pub use realtime::{RealtimeConnector, RealtimeUpstreamConfig};

pub use relay::{
    CloseKind, ConnectError, DuplexEndpoint, EndpointError, Frame, RelayLimits, RelaySession,
    SessionReport, SessionState, Side, TerminationCause, UpstreamConnector,
};

pub use email::{EmailError, EmailSender};
pub use storage::{AudioUploader, StorageError};
