//! Diagnostic WebSocket routes for checking client connectivity, plus raw
//! audio capture to disk.

use std::io;
use std::path::Path;
use std::sync::Arc;

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use time::OffsetDateTime;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::middleware::ConnectionSlot;
use crate::state::AppState;

/// `/ws/echo`: every data frame is sent back unchanged.
pub async fn echo_handler(
    ws: WebSocketUpgrade,
    slot: Option<Extension<ConnectionSlot>>,
) -> Response {
    let slot = slot.map(|Extension(slot)| slot);
    ws.on_upgrade(move |socket| async move {
        serve(socket, |message| match message {
            Message::Binary(_) | Message::Text(_) => Some(message),
            _ => None,
        })
        .await;
        drop(slot);
    })
}

/// `/ws/text`: each text frame is answered with `Echo: <text>`.
pub async fn text_handler(
    ws: WebSocketUpgrade,
    slot: Option<Extension<ConnectionSlot>>,
) -> Response {
    let slot = slot.map(|Extension(slot)| slot);
    ws.on_upgrade(move |socket| async move {
        serve(socket, |message| match message {
            Message::Text(text) => Some(Message::Text(format!("Echo: {}", text.as_str()).into())),
            _ => None,
        })
        .await;
        drop(slot);
    })
}

/// `/ws/audio`: binary frames are appended to a new `audio_<timestamp>.webm`
/// file under the configured capture directory until the socket closes.
/// Text frames are ignored.
pub async fn audio_capture_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    slot: Option<Extension<ConnectionSlot>>,
) -> Response {
    let slot = slot.map(|Extension(slot)| slot);
    let dir = state.config.audio_capture_dir.clone();
    let max_message_bytes = state.config.relay.max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .max_frame_size(max_message_bytes)
        .on_upgrade(move |socket| async move {
            let path = dir.join(capture_file_name(OffsetDateTime::now_utc()));
            match capture(socket, &path).await {
                Ok(bytes) => info!(path = %path.display(), bytes, "Audio capture finished"),
                Err(e) => warn!(path = %path.display(), "Audio capture failed: {e}"),
            }
            drop(slot);
        })
}

/// `audio_2024-05-01_09-30-00_1a2b3c4d.webm`; the suffix keeps captures
/// started within the same second apart.
pub fn capture_file_name(now: OffsetDateTime) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "audio_{:04}-{:02}-{:02}_{:02}-{:02}-{:02}_{}.webm",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        &id[..8]
    )
}

async fn capture(socket: WebSocket, path: &Path) -> io::Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(path).await?;
    info!(path = %path.display(), "Audio capture started");

    let (_sender, mut receiver) = socket.split();
    let mut written = 0u64;
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Binary(data)) => {
                file.write_all(&data).await?;
                written += data.len() as u64;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Audio capture socket closed: {e}");
                break;
            }
        }
    }
    file.flush().await?;
    Ok(written)
}

async fn serve<F>(socket: WebSocket, reply: F)
where
    F: Fn(Message) -> Option<Message>,
{
    let (mut sender, mut receiver) = socket.split();
    while let Some(result) = receiver.next().await {
        let message = match result {
            Ok(Message::Close(_)) => break,
            Ok(message) => message,
            Err(e) => {
                debug!("Diagnostic socket closed: {e}");
                break;
            }
        };
        if let Some(response) = reply(message) {
            if let Err(e) = sender.send(response).await {
                debug!("Diagnostic socket send failed: {e}");
                break;
            }
        }
    }
}
