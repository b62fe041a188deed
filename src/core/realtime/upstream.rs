//! Provider-facing relay endpoint over `tokio-tungstenite`.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message, protocol::WebSocketConfig};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use super::config::{OPENAI_BETA_HEADER, RealtimeUpstreamConfig};
use crate::core::relay::{
    ConnectError, DuplexEndpoint, Frame, Side, SocketEndpoint, UpstreamConnector, Wire,
    WireMessage,
};

/// Client WebSocket to the provider.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Provider-facing endpoint of a relay session.
pub type OutboundEndpoint =
    SocketEndpoint<SplitSink<UpstreamSocket, Message>, SplitStream<UpstreamSocket>, Message>;

impl WireMessage for Message {
    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Binary(data) => Message::Binary(data),
            Frame::Text(text) => Message::Text(text.into()),
        }
    }

    fn into_wire(self) -> Wire {
        match self {
            Message::Binary(data) => Wire::Data(Frame::Binary(data)),
            Message::Text(text) => Wire::Data(Frame::Text(text.as_str().to_owned())),
            Message::Ping(_) | Message::Pong(_) => Wire::Control,
            Message::Close(_) => Wire::Close,
            Message::Frame(_) => Wire::Unrecognized("raw frame".to_string()),
        }
    }

    fn close_frame() -> Self {
        Message::Close(None)
    }
}

/// Opens authenticated connections to the OpenAI Realtime API.
#[derive(Debug, Clone)]
pub struct RealtimeConnector {
    config: RealtimeUpstreamConfig,
}

impl RealtimeConnector {
    pub fn new(config: RealtimeUpstreamConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RealtimeUpstreamConfig {
        &self.config
    }

    /// Full connection URL including the `model` query parameter.
    pub fn endpoint_url(&self) -> Result<Url, ConnectError> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| ConnectError::InvalidRequest(format!("invalid realtime URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model", &self.config.model);
        Ok(url)
    }

    /// Build the upgrade request with the bearer and beta headers.
    pub fn build_request(&self) -> Result<http::Request<()>, ConnectError> {
        if self.config.api_key.is_empty() {
            return Err(ConnectError::MissingCredential(
                "OPENAI_API_KEY is not configured".to_string(),
            ));
        }

        let url = self.endpoint_url()?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ConnectError::InvalidRequest(
                    "realtime URL has no host".to_string(),
                ));
            }
        };

        http::Request::builder()
            .uri(url.as_str())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("OpenAI-Beta", OPENAI_BETA_HEADER)
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| ConnectError::InvalidRequest(e.to_string()))
    }

    fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(Some(self.config.max_message_bytes))
            .max_frame_size(Some(self.config.max_message_bytes))
    }
}

fn map_handshake_error(error: tungstenite::Error) -> ConnectError {
    match error {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            let reason = response
                .body()
                .as_deref()
                .map(|body| String::from_utf8_lossy(body).into_owned())
                .filter(|body| !body.is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            ConnectError::Rejected {
                status: status.as_u16(),
                reason,
            }
        }
        tungstenite::Error::Url(e) => ConnectError::InvalidRequest(e.to_string()),
        other => ConnectError::Unreachable(other.to_string()),
    }
}

#[async_trait]
impl UpstreamConnector for RealtimeConnector {
    async fn connect(&self) -> Result<Arc<dyn DuplexEndpoint>, ConnectError> {
        let request = self.build_request()?;
        debug!(url = %request.uri(), model = %self.config.model, "Connecting to realtime provider");

        let (socket, response) = tokio_tungstenite::connect_async_with_config(
            request,
            Some(self.websocket_config()),
            false,
        )
        .await
        .map_err(map_handshake_error)?;

        info!(
            status = response.status().as_u16(),
            model = %self.config.model,
            "Connected to realtime provider"
        );

        let (sink, stream) = socket.split();
        let endpoint: OutboundEndpoint =
            SocketEndpoint::new(Side::Outbound, sink, stream, self.config.close_timeout);
        Ok(Arc::new(endpoint))
    }
}
