//! Generic [`DuplexEndpoint`] over a split WebSocket transport.
//!
//! Both the client-facing socket (axum) and the provider-facing socket
//! (tokio-tungstenite) are `Sink + Stream` pairs after `split()`. They only
//! differ in their message type, which is adapted through [`WireMessage`].

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::endpoint::{CloseKind, DuplexEndpoint, EndpointError, EndpointResult, Side};
use super::frame::Frame;

/// What a transport message means to the relay.
#[derive(Debug, PartialEq, Eq)]
pub enum Wire {
    /// A binary or text payload to forward.
    Data(Frame),
    /// Transport housekeeping (ping/pong), handled by the transport itself.
    Control,
    /// The peer started the close handshake.
    Close,
    /// Anything else; reported as [`EndpointError::FrameTypeUnrecognized`].
    Unrecognized(String),
}

/// Adapts a transport's message type to relay frames.
pub trait WireMessage: Send + Sized + 'static {
    /// Wrap an outgoing frame, preserving its payload type.
    fn from_frame(frame: Frame) -> Self;

    /// Classify an incoming message.
    fn into_wire(self) -> Wire;

    /// The message that starts a normal close handshake.
    fn close_frame() -> Self;
}

/// A duplex endpoint built from the two halves of a split socket.
///
/// The write half and the read half sit behind separate locks. Each lock is
/// only ever taken by one forwarding task, so neither is contended on the data
/// path; they exist so the endpoint can be shared through `&self`.
pub struct SocketEndpoint<Tx, Rx, M> {
    side: Side,
    sink: Mutex<Tx>,
    stream: Mutex<Rx>,
    /// Set once the endpoint can no longer carry frames.
    closed: AtomicBool,
    /// Set by the first `close()` call; guards the close handshake.
    closing: AtomicBool,
    /// Releases any `receive`/`send` suspended on this endpoint.
    shutdown: CancellationToken,
    close_timeout: Duration,
    _message: PhantomData<fn() -> M>,
}

impl<Tx, Rx, M> SocketEndpoint<Tx, Rx, M> {
    /// Build an endpoint from an already split socket.
    ///
    /// `close_timeout` bounds the best-effort close handshake performed by
    /// [`DuplexEndpoint::close`]; the relay never waits on the peer longer
    /// than that.
    pub fn new(side: Side, sink: Tx, stream: Rx, close_timeout: Duration) -> Self {
        Self {
            side,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            close_timeout,
            _message: PhantomData,
        }
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl<Tx, Rx, M, E> DuplexEndpoint for SocketEndpoint<Tx, Rx, M>
where
    M: WireMessage,
    Tx: Sink<M> + Unpin + Send,
    Tx::Error: Display,
    Rx: Stream<Item = Result<M, E>> + Unpin + Send,
    E: Display,
{
    fn side(&self) -> Side {
        self.side
    }

    async fn receive(&self) -> EndpointResult<Frame> {
        if self.is_closed() {
            return Err(EndpointError::Closed(CloseKind::Graceful));
        }

        let mut stream = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(EndpointError::Closed(CloseKind::Graceful)),
            guard = self.stream.lock() => guard,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Err(EndpointError::Closed(CloseKind::Graceful));
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(message)) => match message.into_wire() {
                    Wire::Data(frame) => return Ok(frame),
                    Wire::Control => continue,
                    Wire::Close => {
                        debug!(side = %self.side, "Close frame received from peer");
                        self.mark_closed();
                        return Err(EndpointError::Closed(CloseKind::Graceful));
                    }
                    Wire::Unrecognized(kind) => {
                        return Err(EndpointError::FrameTypeUnrecognized(kind));
                    }
                },
                Some(Err(e)) => {
                    self.mark_closed();
                    return Err(EndpointError::ReceiveFailure(e.to_string()));
                }
                None => {
                    debug!(side = %self.side, "Stream ended without close frame");
                    self.mark_closed();
                    return Err(EndpointError::Closed(CloseKind::Abnormal));
                }
            }
        }
    }

    async fn send(&self, frame: Frame) -> EndpointResult<()> {
        if self.is_closed() {
            return Err(EndpointError::Closed(CloseKind::Graceful));
        }

        let mut sink = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(EndpointError::Closed(CloseKind::Graceful)),
            guard = self.sink.lock() => guard,
        };

        let message = M::from_frame(frame);
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(EndpointError::Closed(CloseKind::Graceful)),
            result = sink.send(message) => {
                result.map_err(|e| EndpointError::SendFailure(e.to_string()))
            }
        }
    }

    async fn close(&self) {
        self.mark_closed();
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        // Release whichever task is parked on this endpoint before taking the
        // write half for the close handshake.
        self.shutdown.cancel();

        let side = self.side;
        let handshake = async {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(M::close_frame()).await {
                debug!(side = %side, error = %e, "Close frame not delivered");
            }
            if let Err(e) = sink.close().await {
                debug!(side = %side, error = %e, "Transport close reported an error");
            }
        };

        if tokio::time::timeout(self.close_timeout, handshake)
            .await
            .is_err()
        {
            warn!(
                side = %side,
                timeout_ms = self.close_timeout.as_millis() as u64,
                "Close handshake timed out, dropping transport"
            );
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use std::convert::Infallible;

    /// Minimal message type standing in for a real WebSocket message.
    #[derive(Debug, Clone, PartialEq)]
    enum TestMessage {
        Binary(Vec<u8>),
        Text(String),
        Ping,
        Close,
        Raw,
    }

    impl WireMessage for TestMessage {
        fn from_frame(frame: Frame) -> Self {
            match frame {
                Frame::Binary(data) => TestMessage::Binary(data.to_vec()),
                Frame::Text(text) => TestMessage::Text(text),
            }
        }

        fn into_wire(self) -> Wire {
            match self {
                TestMessage::Binary(data) => Wire::Data(Frame::from(data)),
                TestMessage::Text(text) => Wire::Data(Frame::Text(text)),
                TestMessage::Ping => Wire::Control,
                TestMessage::Close => Wire::Close,
                TestMessage::Raw => Wire::Unrecognized("raw".to_string()),
            }
        }

        fn close_frame() -> Self {
            TestMessage::Close
        }
    }

    type TestEndpoint = SocketEndpoint<
        mpsc::UnboundedSender<TestMessage>,
        mpsc::UnboundedReceiver<Result<TestMessage, Infallible>>,
        TestMessage,
    >;

    fn endpoint() -> (
        TestEndpoint,
        mpsc::UnboundedSender<Result<TestMessage, Infallible>>,
        mpsc::UnboundedReceiver<TestMessage>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded();
        let (in_tx, in_rx) = mpsc::unbounded();
        let endpoint = SocketEndpoint::new(Side::Outbound, out_tx, in_rx, Duration::from_secs(1));
        (endpoint, in_tx, out_rx)
    }

    #[tokio::test]
    async fn test_receive_skips_control_messages() {
        let (endpoint, peer_tx, _peer_rx) = endpoint();
        peer_tx.unbounded_send(Ok(TestMessage::Ping)).unwrap();
        peer_tx
            .unbounded_send(Ok(TestMessage::Text("hello".to_string())))
            .unwrap();

        assert_eq!(endpoint.receive().await.unwrap(), Frame::from("hello"));
    }

    #[tokio::test]
    async fn test_receive_reports_unrecognized_and_continues() {
        let (endpoint, peer_tx, _peer_rx) = endpoint();
        peer_tx.unbounded_send(Ok(TestMessage::Raw)).unwrap();
        peer_tx
            .unbounded_send(Ok(TestMessage::Binary(vec![7])))
            .unwrap();

        assert!(matches!(
            endpoint.receive().await,
            Err(EndpointError::FrameTypeUnrecognized(_))
        ));
        assert_eq!(endpoint.receive().await.unwrap(), Frame::from(vec![7u8]));
        assert!(!endpoint.is_closed());
    }

    #[tokio::test]
    async fn test_peer_close_frame_is_graceful() {
        let (endpoint, peer_tx, _peer_rx) = endpoint();
        peer_tx.unbounded_send(Ok(TestMessage::Close)).unwrap();

        assert_eq!(
            endpoint.receive().await,
            Err(EndpointError::Closed(CloseKind::Graceful))
        );
        assert!(endpoint.is_closed());
    }

    #[tokio::test]
    async fn test_stream_end_is_abnormal() {
        let (endpoint, peer_tx, _peer_rx) = endpoint();
        drop(peer_tx);

        assert_eq!(
            endpoint.receive().await,
            Err(EndpointError::Closed(CloseKind::Abnormal))
        );
    }

    #[tokio::test]
    async fn test_send_preserves_payload_type() {
        let (endpoint, _peer_tx, mut peer_rx) = endpoint();
        endpoint.send(Frame::from(vec![1u8, 2])).await.unwrap();
        endpoint.send(Frame::from("ping")).await.unwrap();

        assert_eq!(peer_rx.next().await, Some(TestMessage::Binary(vec![1, 2])));
        assert_eq!(
            peer_rx.next().await,
            Some(TestMessage::Text("ping".to_string()))
        );
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_receive() {
        let (endpoint, _peer_tx, _peer_rx) = endpoint();
        let endpoint = std::sync::Arc::new(endpoint);

        let reader = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.receive().await })
        };
        tokio::task::yield_now().await;

        endpoint.close().await;
        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("receive should be released by close")
            .unwrap();
        assert_eq!(result, Err(EndpointError::Closed(CloseKind::Graceful)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_sends_one_close_frame() {
        let (endpoint, _peer_tx, mut peer_rx) = endpoint();
        endpoint.close().await;
        endpoint.close().await;

        assert_eq!(peer_rx.next().await, Some(TestMessage::Close));
        // The sink was closed after the single close frame.
        assert_eq!(peer_rx.next().await, None);
        assert_eq!(
            endpoint.send(Frame::from("late")).await,
            Err(EndpointError::Closed(CloseKind::Graceful))
        );
    }
}
