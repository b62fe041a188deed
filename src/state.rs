use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{AuthService, JwtCodec};
use crate::config::ServerConfig;
use crate::core::email::{EmailSender, HttpEmailSender, LogEmailSender};
use crate::core::openai::{OpenAIClient, OpenAIConfig};
use crate::core::providers::{LanguageModel, SpeechSynthesizer, Transcriber};
use crate::core::realtime::RealtimeConnector;
use crate::core::relay::UpstreamConnector;
use crate::core::storage::{AudioUploader, ObjectStoreUploader};
use crate::store::{ConversationStore, MemoryStore, UserStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP connection limit reached")]
    PerIpLimitReached,
}

/// Shared application state.
pub struct AppState {
    pub config: ServerConfig,
    pub users: Arc<dyn UserStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub auth: AuthService,
    pub language_model: Arc<dyn LanguageModel>,
    pub transcriber: Arc<dyn Transcriber>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// `None` when storage is not configured
    pub uploader: Option<Arc<dyn AudioUploader>>,
    pub connector: Arc<dyn UpstreamConnector>,
    /// Root token; every relay session runs on a child of it.
    pub shutdown: CancellationToken,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// State with every collaborator built from `config`.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        AppStateBuilder::new(config).build()
    }

    pub fn builder(config: ServerConfig) -> AppStateBuilder {
        AppStateBuilder::new(config)
    }

    /// Reserve a streaming connection slot for `ip`.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let per_ip_limit = self.config.max_connections_per_ip;
        match self.ip_connections.entry(ip) {
            Entry::Occupied(mut entry) => {
                if *entry.get() >= per_ip_limit {
                    return Err(ConnectionLimitError::PerIpLimitReached);
                }
                *entry.get_mut() += 1;
            }
            Entry::Vacant(entry) => {
                if per_ip_limit == 0 {
                    return Err(ConnectionLimitError::PerIpLimitReached);
                }
                entry.insert(1);
            }
        }

        let acquired = match self.config.max_websocket_connections {
            Some(max) => self
                .ws_connections
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < max).then_some(current + 1)
                })
                .is_ok(),
            None => {
                self.ws_connections.fetch_add(1, Ordering::AcqRel);
                true
            }
        };

        if !acquired {
            self.release_ip(ip);
            return Err(ConnectionLimitError::GlobalLimitReached);
        }
        Ok(())
    }

    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
        self.release_ip(ip);
    }

    fn release_ip(&self, ip: IpAddr) {
        if let Entry::Occupied(mut entry) = self.ip_connections.entry(ip) {
            if *entry.get() <= 1 {
                entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }
}

/// Builds [`AppState`], defaulting every collaborator not supplied explicitly.
pub struct AppStateBuilder {
    config: ServerConfig,
    users: Option<Arc<dyn UserStore>>,
    conversations: Option<Arc<dyn ConversationStore>>,
    email: Option<Arc<dyn EmailSender>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    uploader: Option<Arc<dyn AudioUploader>>,
    connector: Option<Arc<dyn UpstreamConnector>>,
    shutdown: Option<CancellationToken>,
}

impl AppStateBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            users: None,
            conversations: None,
            email: None,
            language_model: None,
            transcriber: None,
            speech: None,
            uploader: None,
            connector: None,
            shutdown: None,
        }
    }

    pub fn with_store<S>(mut self, store: Arc<S>) -> Self
    where
        S: UserStore + ConversationStore + 'static,
    {
        let users: Arc<dyn UserStore> = store.clone();
        let conversations: Arc<dyn ConversationStore> = store;
        self.users = Some(users);
        self.conversations = Some(conversations);
        self
    }

    pub fn with_email(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = Some(email);
        self
    }

    /// Use one provider for chat, transcription and speech.
    pub fn with_provider<P>(mut self, provider: Arc<P>) -> Self
    where
        P: LanguageModel + Transcriber + SpeechSynthesizer + 'static,
    {
        let language_model: Arc<dyn LanguageModel> = provider.clone();
        let transcriber: Arc<dyn Transcriber> = provider.clone();
        let speech: Arc<dyn SpeechSynthesizer> = provider;
        self.language_model = Some(language_model);
        self.transcriber = Some(transcriber);
        self.speech = Some(speech);
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn AudioUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn UpstreamConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Result<Arc<AppState>, Box<dyn std::error::Error>> {
        let config = self.config;

        let (users, conversations) = match (self.users, self.conversations) {
            (Some(users), Some(conversations)) => (users, conversations),
            _ => {
                let store = Arc::new(MemoryStore::new());
                let users: Arc<dyn UserStore> = store.clone();
                let conversations: Arc<dyn ConversationStore> = store;
                (users, conversations)
            }
        };

        let email: Arc<dyn EmailSender> = match (self.email, &config.email) {
            (Some(email), _) => email,
            (None, Some(email_config)) => Arc::new(HttpEmailSender::new(email_config.clone())?),
            (None, None) => {
                warn!("Email API not configured, login codes will only be logged");
                Arc::new(LogEmailSender)
            }
        };

        let (language_model, transcriber, speech) =
            match (self.language_model, self.transcriber, self.speech) {
                (Some(lm), Some(tr), Some(sp)) => (lm, tr, sp),
                _ => {
                    if config.openai_api_key.is_none() {
                        warn!("OPENAI_API_KEY not set, provider calls will fail");
                    }
                    let client = Arc::new(OpenAIClient::new(OpenAIConfig::new(
                        config.openai_api_key.clone().unwrap_or_default(),
                        config.openai_base_url.clone(),
                    ))?);
                    let lm: Arc<dyn LanguageModel> = client.clone();
                    let tr: Arc<dyn Transcriber> = client.clone();
                    let sp: Arc<dyn SpeechSynthesizer> = client;
                    (lm, tr, sp)
                }
            };

        let uploader: Option<Arc<dyn AudioUploader>> = match (self.uploader, &config.storage) {
            (Some(uploader), _) => Some(uploader),
            (None, Some(storage)) => Some(Arc::new(ObjectStoreUploader::from_config(storage)?)),
            (None, None) => {
                info!("Object storage not configured, audio upload routes disabled");
                None
            }
        };

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(RealtimeConnector::new(config.realtime_upstream())));

        let auth = AuthService::new(
            users.clone(),
            email,
            JwtCodec::new(&config.jwt_secret, config.access_token_expire_minutes),
            config.otp_expire_minutes,
        );

        Ok(Arc::new(AppState {
            config,
            users,
            conversations,
            auth,
            language_model,
            transcriber,
            speech,
            uploader,
            connector,
            shutdown: self.shutdown.unwrap_or_default(),
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn state_with_limits(global: Option<usize>, per_ip: u32) -> Arc<AppState> {
        let mut config = ServerConfig::for_testing();
        config.max_websocket_connections = global;
        config.max_connections_per_ip = per_ip;
        AppState::new(config).unwrap()
    }

    #[test]
    fn test_per_ip_limit() {
        let state = state_with_limits(Some(10), 3);
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 100).into();

        for expected in 1..=3 {
            assert!(state.try_acquire_connection(ip).is_ok());
            assert_eq!(state.ip_connection_count(&ip), expected);
        }
        assert_eq!(
            state.try_acquire_connection(ip),
            Err(ConnectionLimitError::PerIpLimitReached)
        );

        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 2);
        assert!(state.try_acquire_connection(ip).is_ok());
    }

    #[test]
    fn test_global_limit_rolls_back_ip_count() {
        let state = state_with_limits(Some(2), 10);
        let ips: Vec<IpAddr> = (1..=3).map(|i| Ipv4Addr::new(10, 0, 0, i).into()).collect();

        assert!(state.try_acquire_connection(ips[0]).is_ok());
        assert!(state.try_acquire_connection(ips[1]).is_ok());
        assert_eq!(
            state.try_acquire_connection(ips[2]),
            Err(ConnectionLimitError::GlobalLimitReached)
        );
        assert_eq!(state.ip_connection_count(&ips[2]), 0);

        state.release_connection(ips[0]);
        assert!(state.try_acquire_connection(ips[2]).is_ok());
        assert_eq!(state.ip_connection_count(&ips[0]), 0);
    }

    #[test]
    fn test_release_never_underflows() {
        let state = state_with_limits(None, 5);
        let ip: IpAddr = Ipv4Addr::LOCALHOST.into();
        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 0);
    }

    #[test]
    fn test_defaults_without_storage() {
        let state = AppState::new(ServerConfig::for_testing()).unwrap();
        assert!(state.uploader.is_none());
        assert!(!state.shutdown.is_cancelled());
    }
}
