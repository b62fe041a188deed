//! Relay session orchestration.
//!
//! A [`RelaySession`] owns one client-facing endpoint, opens one
//! provider-facing endpoint, and forwards frames in both directions until
//! either side ends. Shutdown is coordinated through a single
//! [`TerminationSignal`]: the first task to observe the end of the session
//! records the cause and cancels the shared token, which releases every other
//! task. All tasks are joined before the session reports `Closed`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::endpoint::{CloseKind, ConnectError, DuplexEndpoint, EndpointError, Side, UpstreamConnector};

// =============================================================================
// Limits
// =============================================================================

/// Default bound on the best-effort close handshake.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on establishing the provider connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-session limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayLimits {
    /// Largest frame forwarded in either direction.
    pub max_message_bytes: usize,
    /// End the session when no frame moved in either direction for this long.
    /// `None` leaves idle detection to the transports.
    pub idle_timeout: Option<Duration>,
    pub close_timeout: Duration,
    pub connect_timeout: Duration,
}

impl RelayLimits {
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            max_message_bytes,
            idle_timeout: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }
}

// =============================================================================
// State and termination
// =============================================================================

/// Lifecycle of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Establishing,
    Relaying,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Establishing => write!(f, "establishing"),
            SessionState::Relaying => write!(f, "relaying"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    /// The provider connection could not be established.
    ConnectFailure(String),
    /// One side stopped delivering frames.
    Closed { side: Side, kind: CloseKind },
    SendFailure { side: Side, reason: String },
    ReceiveFailure { side: Side, reason: String },
    /// No frame moved in either direction within the configured idle timeout.
    IdleTimeout,
    /// The session was cancelled from outside, e.g. server shutdown.
    Cancelled,
    /// A forwarding task panicked or was aborted.
    TaskFailed(String),
}

impl TerminationCause {
    /// Whether the session ended through a clean close by one of the peers.
    pub fn is_graceful(&self) -> bool {
        matches!(
            self,
            TerminationCause::Closed {
                kind: CloseKind::Graceful,
                ..
            }
        )
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::ConnectFailure(reason) => write!(f, "connect failure: {reason}"),
            TerminationCause::Closed { side, kind } => write!(f, "{side} closed ({kind})"),
            TerminationCause::SendFailure { side, reason } => {
                write!(f, "send to {side} failed: {reason}")
            }
            TerminationCause::ReceiveFailure { side, reason } => {
                write!(f, "receive from {side} failed: {reason}")
            }
            TerminationCause::IdleTimeout => write!(f, "idle timeout"),
            TerminationCause::Cancelled => write!(f, "cancelled"),
            TerminationCause::TaskFailed(reason) => write!(f, "task failed: {reason}"),
        }
    }
}

/// Set-once termination cause plus the token that announces it.
///
/// The first `record` wins; later causes are logged and discarded. Cancelling
/// the token from outside (without a cause) also ends the session, and is
/// reported as [`TerminationCause::Cancelled`].
#[derive(Debug)]
pub struct TerminationSignal {
    cause: OnceLock<TerminationCause>,
    token: CancellationToken,
}

impl TerminationSignal {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            cause: OnceLock::new(),
            token,
        }
    }

    /// Record `cause` if none was recorded yet, then cancel the token.
    /// Returns whether this call won.
    pub fn record(&self, cause: TerminationCause) -> bool {
        match self.cause.set(cause) {
            Ok(()) => {
                self.token.cancel();
                true
            }
            Err(discarded) => {
                debug!(cause = %discarded, "Secondary termination cause discarded");
                false
            }
        }
    }

    pub fn cause(&self) -> Option<&TerminationCause> {
        self.cause.get()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }
}

// =============================================================================
// Counters and report
// =============================================================================

/// Direction of travel through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "client_to_upstream"),
            Direction::UpstreamToClient => write!(f, "upstream_to_client"),
        }
    }
}

/// Frames and payload bytes forwarded in one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionStats {
    pub frames: u64,
    pub bytes: u64,
}

#[derive(Debug, Default)]
struct DirectionCounter {
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl DirectionCounter {
    fn record(&self, len: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DirectionStats {
        DirectionStats {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Summary returned when a session reaches `Closed`.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: Uuid,
    pub started_at: OffsetDateTime,
    pub duration: Duration,
    pub cause: TerminationCause,
    pub client_to_upstream: DirectionStats,
    pub upstream_to_client: DirectionStats,
}

// =============================================================================
// Session
// =============================================================================

/// State shared by the forwarding tasks of one session.
struct Shared {
    id: Uuid,
    signal: TerminationSignal,
    max_message_bytes: usize,
    client_to_upstream: DirectionCounter,
    upstream_to_client: DirectionCounter,
    origin: Instant,
    last_activity_ms: AtomicU64,
}

impl Shared {
    fn counter(&self, direction: Direction) -> &DirectionCounter {
        match direction {
            Direction::ClientToUpstream => &self.client_to_upstream,
            Direction::UpstreamToClient => &self.upstream_to_client,
        }
    }

    fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_activity_ms.store(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }
}

/// One client connection bridged to one provider connection.
pub struct RelaySession {
    shared: Arc<Shared>,
    started_at: OffsetDateTime,
    inbound: Arc<dyn DuplexEndpoint>,
    limits: RelayLimits,
    state: watch::Sender<SessionState>,
}

impl RelaySession {
    /// Create a session for an accepted client connection.
    ///
    /// The session ends early if `shutdown` is cancelled.
    pub fn new(
        inbound: Arc<dyn DuplexEndpoint>,
        limits: RelayLimits,
        shutdown: &CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Establishing);
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            signal: TerminationSignal::new(shutdown.child_token()),
            max_message_bytes: limits.max_message_bytes,
            client_to_upstream: DirectionCounter::default(),
            upstream_to_client: DirectionCounter::default(),
            origin: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        });

        Self {
            shared,
            started_at: OffsetDateTime::now_utc(),
            inbound,
            limits,
            state,
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run the session to completion.
    ///
    /// Opens the provider connection through `connector` (once, no retry),
    /// relays until either side ends, closes both endpoints and joins every
    /// task before returning.
    pub async fn serve(self, connector: &dyn UpstreamConnector) -> SessionReport {
        info!(session_id = %self.shared.id, "Relay session establishing");

        let outbound = self.establish(connector).await;
        if let Some(outbound) = &outbound {
            self.relay(outbound.clone()).await;
        }

        self.finish(outbound).await
    }

    async fn establish(&self, connector: &dyn UpstreamConnector) -> Option<Arc<dyn DuplexEndpoint>> {
        let timeout = self.limits.connect_timeout;
        let attempt = tokio::time::timeout(timeout, connector.connect());

        let result = tokio::select! {
            biased;
            _ = self.shared.signal.token().cancelled() => return None,
            result = attempt => result,
        };

        let error = match result {
            Ok(Ok(outbound)) => return Some(outbound),
            Ok(Err(e)) => e,
            Err(_) => ConnectError::Timeout(timeout.as_secs()),
        };

        warn!(session_id = %self.shared.id, error = %error, "Upstream connection failed");
        self.shared
            .signal
            .record(TerminationCause::ConnectFailure(error.to_string()));
        None
    }

    async fn relay(&self, outbound: Arc<dyn DuplexEndpoint>) {
        self.state.send_replace(SessionState::Relaying);
        self.shared.touch();
        info!(session_id = %self.shared.id, "Relay session relaying");

        let client_to_upstream = tokio::spawn(forward(
            Direction::ClientToUpstream,
            self.inbound.clone(),
            outbound.clone(),
            self.shared.clone(),
        ));
        let upstream_to_client = tokio::spawn(forward(
            Direction::UpstreamToClient,
            outbound.clone(),
            self.inbound.clone(),
            self.shared.clone(),
        ));
        let watchdog = self
            .limits
            .idle_timeout
            .map(|idle| tokio::spawn(idle_watchdog(idle, self.shared.clone())));

        let signal = &self.shared.signal;
        let joined = |handle: tokio::task::JoinHandle<()>| async move {
            if let Err(e) = handle.await {
                signal.record(TerminationCause::TaskFailed(e.to_string()));
            }
        };

        // Closing both endpoints as soon as the session is terminated, rather
        // than after the join, releases any peer still waiting on us.
        let closer = async {
            signal.token().cancelled().await;
            self.state.send_replace(SessionState::Closing);
            tokio::join!(self.inbound.close(), outbound.close());
        };

        let watchdog = async {
            if let Some(handle) = watchdog {
                joined(handle).await;
            }
        };

        tokio::join!(
            joined(client_to_upstream),
            joined(upstream_to_client),
            watchdog,
            closer
        );
    }

    async fn finish(self, outbound: Option<Arc<dyn DuplexEndpoint>>) -> SessionReport {
        self.state.send_replace(SessionState::Closing);
        match &outbound {
            Some(outbound) => {
                tokio::join!(self.inbound.close(), outbound.close());
            }
            None => self.inbound.close().await,
        }
        self.state.send_replace(SessionState::Closed);

        let cause = self
            .shared
            .signal
            .cause()
            .cloned()
            .unwrap_or(TerminationCause::Cancelled);
        let report = SessionReport {
            id: self.shared.id,
            started_at: self.started_at,
            duration: self.shared.origin.elapsed(),
            cause,
            client_to_upstream: self.shared.client_to_upstream.snapshot(),
            upstream_to_client: self.shared.upstream_to_client.snapshot(),
        };

        if report.cause.is_graceful() || report.cause == TerminationCause::Cancelled {
            info!(
                session_id = %report.id,
                cause = %report.cause,
                duration_ms = report.duration.as_millis() as u64,
                client_to_upstream_frames = report.client_to_upstream.frames,
                upstream_to_client_frames = report.upstream_to_client.frames,
                "Relay session closed"
            );
        } else {
            warn!(
                session_id = %report.id,
                cause = %report.cause,
                duration_ms = report.duration.as_millis() as u64,
                client_to_upstream_frames = report.client_to_upstream.frames,
                upstream_to_client_frames = report.upstream_to_client.frames,
                "Relay session closed with error"
            );
        }

        report
    }
}

/// Move frames from `source` to `destination` until the session terminates.
async fn forward(
    direction: Direction,
    source: Arc<dyn DuplexEndpoint>,
    destination: Arc<dyn DuplexEndpoint>,
    shared: Arc<Shared>,
) {
    let token = shared.signal.token().clone();
    let counter = shared.counter(direction);

    loop {
        let received = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            received = source.receive() => received,
        };

        let frame = match received {
            Ok(frame) => frame,
            Err(EndpointError::FrameTypeUnrecognized(kind)) => {
                warn!(
                    session_id = %shared.id,
                    direction = %direction,
                    frame_type = %kind,
                    "Skipping unrecognized frame"
                );
                continue;
            }
            Err(EndpointError::Closed(kind)) => {
                shared.signal.record(TerminationCause::Closed {
                    side: source.side(),
                    kind,
                });
                return;
            }
            Err(EndpointError::ReceiveFailure(reason) | EndpointError::SendFailure(reason)) => {
                shared.signal.record(TerminationCause::ReceiveFailure {
                    side: source.side(),
                    reason,
                });
                return;
            }
        };

        let len = frame.len();
        if len > shared.max_message_bytes {
            shared.signal.record(TerminationCause::ReceiveFailure {
                side: source.side(),
                reason: format!(
                    "frame of {len} bytes exceeds limit of {} bytes",
                    shared.max_message_bytes
                ),
            });
            return;
        }
        let kind = frame.kind();

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            sent = destination.send(frame) => sent,
        };

        match sent {
            Ok(()) => {
                counter.record(len);
                shared.touch();
                trace!(
                    session_id = %shared.id,
                    direction = %direction,
                    frame_type = %kind,
                    len,
                    "Frame forwarded"
                );
            }
            Err(EndpointError::Closed(kind)) => {
                shared.signal.record(TerminationCause::Closed {
                    side: destination.side(),
                    kind,
                });
                return;
            }
            Err(e) => {
                shared.signal.record(TerminationCause::SendFailure {
                    side: destination.side(),
                    reason: e.to_string(),
                });
                return;
            }
        }
    }
}

/// End the session once no frame has moved for `idle`.
async fn idle_watchdog(idle: Duration, shared: Arc<Shared>) {
    let token = shared.signal.token().clone();
    loop {
        let idle_for = shared.idle_for();
        if idle_for >= idle {
            debug!(session_id = %shared.id, idle_ms = idle_for.as_millis() as u64, "Session idle");
            shared.signal.record(TerminationCause::IdleTimeout);
            return;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(idle - idle_for) => {}
        }
    }
}
