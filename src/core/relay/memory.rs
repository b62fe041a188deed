//! In-memory endpoints for exercising relay sessions without a network.
//!
//! A [`MemoryEndpoint`] is handed to the session under test; the matching
//! [`MemoryPeer`] plays the remote party. The peer scripts what the endpoint
//! will receive (frames, unrecognized frames, closes, failures) and observes
//! every frame the session sends through it.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::endpoint::{
    CloseKind, ConnectError, DuplexEndpoint, EndpointError, EndpointResult, Side, UpstreamConnector,
};
use super::frame::Frame;

/// One scripted event on the receive path.
#[derive(Debug)]
enum Scripted {
    Frame(Frame),
    Unrecognized(String),
    Close(CloseKind),
    ReceiveFailure(String),
}

/// State shared between an endpoint and its peer.
struct Shared {
    closed: AtomicBool,
    close_calls: AtomicUsize,
    close_effects: AtomicUsize,
    shutdown: CancellationToken,
    send_failure: SyncMutex<Option<String>>,
    stalled: watch::Sender<bool>,
}

/// Scripted in-memory [`DuplexEndpoint`].
pub struct MemoryEndpoint {
    side: Side,
    inbox: Mutex<mpsc::UnboundedReceiver<Scripted>>,
    outbox: mpsc::UnboundedSender<Frame>,
    shared: Arc<Shared>,
}

/// The remote party of a [`MemoryEndpoint`].
pub struct MemoryPeer {
    inbox: mpsc::UnboundedSender<Scripted>,
    outbox: mpsc::UnboundedReceiver<Frame>,
    shared: Arc<Shared>,
}

impl MemoryEndpoint {
    /// Create a connected endpoint/peer pair.
    pub fn pair(side: Side) -> (Arc<MemoryEndpoint>, MemoryPeer) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (stalled, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            close_effects: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            send_failure: SyncMutex::new(None),
            stalled,
        });

        let endpoint = Arc::new(MemoryEndpoint {
            side,
            inbox: Mutex::new(inbox_rx),
            outbox: outbox_tx,
            shared: shared.clone(),
        });
        let peer = MemoryPeer {
            inbox: inbox_tx,
            outbox: outbox_rx,
            shared,
        };
        (endpoint, peer)
    }

    fn closed_error() -> EndpointError {
        EndpointError::Closed(CloseKind::Graceful)
    }

    async fn wait_unstalled(&self) {
        let mut stalled = self.shared.stalled.subscribe();
        // The sender lives in `shared`, so the channel never closes under us.
        let _ = stalled.wait_for(|stalled| !*stalled).await;
    }
}

#[async_trait]
impl DuplexEndpoint for MemoryEndpoint {
    fn side(&self) -> Side {
        self.side
    }

    async fn receive(&self) -> EndpointResult<Frame> {
        if self.is_closed() {
            return Err(Self::closed_error());
        }

        let mut inbox = tokio::select! {
            biased;
            _ = self.shared.shutdown.cancelled() => return Err(Self::closed_error()),
            guard = self.inbox.lock() => guard,
        };

        let next = tokio::select! {
            biased;
            _ = self.shared.shutdown.cancelled() => return Err(Self::closed_error()),
            next = inbox.recv() => next,
        };

        match next {
            Some(Scripted::Frame(frame)) => Ok(frame),
            Some(Scripted::Unrecognized(kind)) => Err(EndpointError::FrameTypeUnrecognized(kind)),
            Some(Scripted::Close(kind)) => {
                self.shared.closed.store(true, Ordering::SeqCst);
                Err(EndpointError::Closed(kind))
            }
            Some(Scripted::ReceiveFailure(reason)) => {
                self.shared.closed.store(true, Ordering::SeqCst);
                Err(EndpointError::ReceiveFailure(reason))
            }
            // Peer dropped without closing.
            None => {
                self.shared.closed.store(true, Ordering::SeqCst);
                Err(EndpointError::Closed(CloseKind::Abnormal))
            }
        }
    }

    async fn send(&self, frame: Frame) -> EndpointResult<()> {
        if self.is_closed() {
            return Err(Self::closed_error());
        }

        tokio::select! {
            biased;
            _ = self.shared.shutdown.cancelled() => return Err(Self::closed_error()),
            _ = self.wait_unstalled() => {}
        }

        if let Some(reason) = self.shared.send_failure.lock().take() {
            return Err(EndpointError::SendFailure(reason));
        }

        self.outbox
            .send(frame)
            .map_err(|_| EndpointError::Closed(CloseKind::Abnormal))
    }

    async fn close(&self) {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.closed.store(true, Ordering::SeqCst);
        if self.shared.shutdown.is_cancelled() {
            return;
        }
        self.shared.shutdown.cancel();
        self.shared.close_effects.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl MemoryPeer {
    /// Deliver a frame to the endpoint's next `receive`.
    pub fn send(&self, frame: impl Into<Frame>) {
        let _ = self.inbox.send(Scripted::Frame(frame.into()));
    }

    /// Deliver something that is neither binary nor text.
    pub fn send_unrecognized(&self, kind: &str) {
        let _ = self.inbox.send(Scripted::Unrecognized(kind.to_string()));
    }

    /// Close from the remote side.
    pub fn close(&self, kind: CloseKind) {
        let _ = self.inbox.send(Scripted::Close(kind));
    }

    /// Make the endpoint's next `receive` fail at the transport level.
    pub fn fail_receive(&self, reason: &str) {
        let _ = self.inbox.send(Scripted::ReceiveFailure(reason.to_string()));
    }

    /// Make the endpoint's next `send` fail at the transport level.
    pub fn fail_next_send(&self, reason: &str) {
        *self.shared.send_failure.lock() = Some(reason.to_string());
    }

    /// Hold every `send` until released, simulating a peer that stopped reading.
    pub fn stall_sends(&self, stalled: bool) {
        self.shared.stalled.send_replace(stalled);
    }

    /// Wait for the next frame the endpoint sent.
    ///
    /// Returns `None` once the endpoint has been dropped and everything it
    /// sent has been drained.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.outbox.recv().await
    }

    /// Everything sent so far that has not been read yet.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbox.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Resolves once the endpoint's `close()` has been called.
    pub async fn closed(&self) {
        self.shared.shutdown.cancelled().await;
    }

    /// Whether the endpoint considers itself closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// How many times `close()` was called.
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    /// How many times `close()` actually tore the endpoint down.
    pub fn close_count(&self) -> usize {
        self.shared.close_effects.load(Ordering::SeqCst)
    }
}

/// [`UpstreamConnector`] that hands out a prepared endpoint or a scripted failure.
pub enum MemoryConnector {
    Ready(SyncMutex<Option<Arc<dyn DuplexEndpoint>>>),
    Fail(ConnectError),
    /// Never completes; exercises the connect timeout.
    Hang,
}

impl MemoryConnector {
    pub fn ready(endpoint: Arc<dyn DuplexEndpoint>) -> Self {
        MemoryConnector::Ready(SyncMutex::new(Some(endpoint)))
    }

    pub fn failing(error: ConnectError) -> Self {
        MemoryConnector::Fail(error)
    }
}

#[async_trait]
impl UpstreamConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn DuplexEndpoint>, ConnectError> {
        match self {
            MemoryConnector::Ready(slot) => slot
                .lock()
                .take()
                .ok_or_else(|| ConnectError::Unreachable("endpoint already taken".to_string())),
            MemoryConnector::Fail(error) => Err(error.clone()),
            MemoryConnector::Hang => std::future::pending().await,
        }
    }
}
