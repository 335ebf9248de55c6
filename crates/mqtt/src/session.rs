//! The broker session: one driver task that owns the event loop, plus a
//! cheap handle the rest of the node publishes through.
//!
//! Lifecycle, as seen by the broker:
//!
//! 1. CONNECT carries the retained offline last will (registered at build).
//! 2. On CONNACK the driver subscribes to the command topic, *then*
//!    publishes the retained "online" birth status. Subscribers therefore
//!    never see a node online that is not yet accepting commands.
//! 3. On link loss the driver flips the state to Disconnected, sleeps per
//!    the backoff schedule, and lets the next poll reconnect, indefinitely
//!    unless an attempt limit is configured. Fatal errors (bad credentials,
//!    TLS misconfiguration, protocol violations) stop the driver instead of
//!    retrying.
//! 4. `shutdown` publishes the retained "offline" death status, waits for
//!    in-flight publishes to drain, and disconnects cleanly, which
//!    suppresses the last will.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Packet, QoS,
};
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::{
    backoff::Backoff,
    client::SessionBuilder,
    config::Config,
    error::SessionError,
    payload::{now_millis, Command, DataPayload, NodeIdentity, NodeStatus, StatusPayload, TopicSet},
    state::SessionState,
};

/// Commands queued between the driver task and the poll loop. Sized for a
/// device that is told to do something a few times a minute, not a firehose.
pub const COMMAND_QUEUE_CAPACITY: usize = 16;

/// How long shutdown waits for in-flight publishes before giving up.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Counts in-flight publishes so shutdown can wait for the tail end of a
/// cycle instead of cutting the socket under it.
struct PublishDrain {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl PublishDrain {
    fn new() -> Self {
        PublishDrain {
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    fn guard(&self) -> DrainGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        DrainGuard { drain: self }
    }

    async fn wait_idle(&self, timeout: Duration) {
        let wait = async {
            while self.in_flight.load(Ordering::Acquire) > 0 {
                self.idle.notified().await;
            }
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            warn!("publish drain timed out with messages still in flight");
        }
    }
}

struct DrainGuard<'a> {
    drain: &'a PublishDrain,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.drain.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drain.idle.notify_waiters();
        }
    }
}

/// Handle to a running broker session.
///
/// Clone-free by design: the scheduler owns it, the driver task owns the
/// event loop, and the two meet through the watch channel and the atomic
/// connected flag.
pub struct TransportSession {
    client: AsyncClient,
    identity: NodeIdentity,
    topics: TopicSet,
    state_rx: watch::Receiver<SessionState>,
    is_connected: Arc<AtomicBool>,
    connect_timeout: Duration,
    cancel: CancellationToken,
    drain: Arc<PublishDrain>,
}

impl TransportSession {
    /// Validates the configuration, builds the client and spawns the driver
    /// task. Returns the session handle plus the receiving end of the
    /// command queue. No broker traffic has happened yet when this returns;
    /// call [`wait_connected`](Self::wait_connected) to block for CONNACK.
    pub fn start(
        config: &Config,
        identity: NodeIdentity,
    ) -> Result<(Self, mpsc::Receiver<Command>), SessionError> {
        config.validate()?;

        let builder = SessionBuilder::from_config(config, &identity, now_millis())?;
        let (client, event_loop) = builder.build();

        let topics = TopicSet::for_node(&identity.node_id);
        let (state_tx, state_rx) =
            watch::channel(SessionState::Disconnected("not started".to_string()));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let is_connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let drain = Arc::new(PublishDrain::new());

        let driver = SessionDriver {
            client: client.clone(),
            event_loop,
            identity: identity.clone(),
            topics: topics.clone(),
            state_tx,
            is_connected: is_connected.clone(),
            backoff: config.backoff(),
            command_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(driver.run());

        Ok((
            TransportSession {
                client,
                identity,
                topics,
                state_rx,
                is_connected,
                connect_timeout: config.connect_timeout(),
                cancel,
                drain,
            },
            command_rx,
        ))
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Cheap connectivity probe for the scheduler's per-tick edge check.
    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// A watch receiver for callers that want to react to every transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Blocks until the session reaches Connected, up to the configured
    /// connect timeout.
    pub async fn wait_connected(&self) -> Result<(), SessionError> {
        self.wait_connected_for(self.connect_timeout).await
    }

    pub async fn wait_connected_for(&self, timeout: Duration) -> Result<(), SessionError> {
        let mut rx = self.state_rx.clone();
        let became_connected = async move {
            loop {
                if rx.borrow_and_update().is_connected() {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };

        match tokio::time::timeout(timeout, became_connected).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SessionError::Setup("session driver stopped".to_string())),
            Err(_) => Err(SessionError::ConnectTimeout {
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Publishes a retained status announcement (QoS 1).
    pub async fn publish_status(&self, status: NodeStatus) -> Result<(), SessionError> {
        let payload = match status {
            NodeStatus::Online => StatusPayload::birth(&self.identity, now_millis()),
            NodeStatus::Offline => StatusPayload::death(&self.identity, now_millis()),
        };
        let bytes = serde_json::to_vec(&payload)?;

        let _guard = self.drain.guard();
        self.client
            .publish(&self.topics.status, QoS::AtLeastOnce, true, bytes)
            .await?;
        debug!(status = status.as_str(), "status published");
        Ok(())
    }

    /// Publishes one aggregated metrics snapshot (QoS 0, not retained).
    /// Sensor data is perishable; a snapshot lost to an outage is simply
    /// superseded by the next cycle.
    pub async fn publish_data(&self, payload: &DataPayload) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec(payload)?;

        let _guard = self.drain.guard();
        self.client
            .publish(&self.topics.data, QoS::AtMostOnce, false, bytes)
            .await?;
        debug!(metrics = payload.len(), "data snapshot published");
        Ok(())
    }

    /// Orderly teardown: death status, drain, DISCONNECT, stop the driver.
    /// A clean disconnect tells the broker to discard the last will, so the
    /// retained status subscribers see is the death we just published.
    pub async fn shutdown(self) {
        if self.is_connected() {
            if let Err(e) = self.publish_status(NodeStatus::Offline).await {
                warn!("death status publish failed: {e}");
            }
        }

        self.drain.wait_idle(DRAIN_TIMEOUT).await;

        if let Err(e) = self.client.disconnect().await {
            warn!("disconnect request failed: {e}");
        }
        // Let the event loop flush the DISCONNECT before we stop polling it.
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.cancel.cancel();
        info!("transport session closed");
    }
}

/// The task that owns the event loop. Everything broker-facing that is not
/// an explicit publish call happens here.
struct SessionDriver {
    client: AsyncClient,
    event_loop: EventLoop,
    identity: NodeIdentity,
    topics: TopicSet,
    state_tx: watch::Sender<SessionState>,
    is_connected: Arc<AtomicBool>,
    backoff: Backoff,
    command_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl SessionDriver {
    async fn run(mut self) {
        self.set_state(SessionState::Connecting);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.is_connected.store(false, Ordering::Release);
                    self.set_state(SessionState::Disconnected("shutdown".to_string()));
                    debug!("session driver stopped");
                    return;
                }

                polled = self.event_loop.poll() => match polled {
                    Ok(event) => self.handle_event(event).await,
                    Err(err) => {
                        if !self.handle_link_error(err).await {
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!(host = "broker", "session established");
                    self.backoff.reset();
                    self.is_connected.store(true, Ordering::Release);

                    // Command intake first, then the online announcement.
                    if let Err(e) = self
                        .client
                        .subscribe(&self.topics.command, QoS::AtLeastOnce)
                        .await
                    {
                        warn!("command subscribe failed: {e}");
                    }
                    if let Err(e) = self.publish_birth().await {
                        warn!("birth status publish failed: {e}");
                    }

                    self.set_state(SessionState::Connected);
                }
                // Refused CONNACKs surface as poll errors, not here.
            }
            Event::Incoming(Packet::Publish(publish)) => {
                if publish.topic == self.topics.command {
                    self.intake_command(&publish.payload);
                } else {
                    debug!(topic = %publish.topic, "ignoring publish on unexpected topic");
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                self.is_connected.store(false, Ordering::Release);
                self.set_state(SessionState::Disconnected(
                    "broker sent DISCONNECT".to_string(),
                ));
            }
            // Acks, pings and outgoing notifications need no action.
            _ => {}
        }
    }

    /// Returns false when the driver should stop.
    async fn handle_link_error(&mut self, err: ConnectionError) -> bool {
        self.is_connected.store(false, Ordering::Release);
        let reason = root_cause(&err);

        if is_fatal(&err) {
            error!("fatal link error, stopping session driver: {reason}");
            self.set_state(SessionState::Disconnected(reason));
            return false;
        }

        match self.backoff.next_delay() {
            Ok(delay) => {
                warn!(
                    attempt = self.backoff.attempt(),
                    "link lost ({reason}), retrying in {:.1}s",
                    delay.as_secs_f64()
                );
                self.set_state(SessionState::Disconnected(reason));

                tokio::select! {
                    _ = self.cancel.cancelled() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
                self.set_state(SessionState::Connecting);
                true
            }
            Err(budget) => {
                error!("giving up on the broker: {budget}");
                self.set_state(SessionState::Disconnected(budget.to_string()));
                false
            }
        }
    }

    // &mut so the future only captures fields it names; a shared borrow of
    // the whole driver held across the await would require Sync, which the
    // event loop is not.
    async fn publish_birth(&mut self) -> Result<(), SessionError> {
        let birth = StatusPayload::birth(&self.identity, now_millis());
        self.client
            .publish(
                &self.topics.status,
                QoS::AtLeastOnce,
                true,
                serde_json::to_vec(&birth)?,
            )
            .await?;
        Ok(())
    }

    fn intake_command(&self, bytes: &[u8]) {
        match serde_json::from_slice::<Command>(bytes) {
            Ok(command) => {
                debug!(action = %command.action, "command received");
                if self.command_tx.try_send(command).is_err() {
                    warn!("command queue full, dropping command");
                }
            }
            Err(e) => {
                // Malformed input from the wire is dropped, never fatal.
                let decode = SessionError::CommandDecode {
                    topic: self.topics.command.clone(),
                    reason: e.to_string(),
                };
                warn!("{decode}");
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let changed = *self.state_tx.borrow() != state;
        if changed {
            info!(state = state.as_str(), details = state.details(), "session state");
            // Send can only fail with no receivers, which is fine late in
            // shutdown.
            let _ = self.state_tx.send(state);
        }
    }
}

/// Errors where retrying cannot help: broken local configuration, refused
/// credentials, protocol violations.
fn is_fatal(err: &ConnectionError) -> bool {
    match err {
        ConnectionError::Tls(_) => true,
        ConnectionError::MqttState(_) => true,
        ConnectionError::NotConnAck(_) => true,
        ConnectionError::RequestsDone => true,
        ConnectionError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::AddrInUse
                | std::io::ErrorKind::PermissionDenied
                | std::io::ErrorKind::InvalidInput
                | std::io::ErrorKind::InvalidData
        ),
        ConnectionError::ConnectionRefused(code) => matches!(
            code,
            ConnectReturnCode::RefusedProtocolVersion
                | ConnectReturnCode::BadClientId
                | ConnectReturnCode::BadUserNamePassword
                | ConnectReturnCode::NotAuthorized
        ),
        _ => false,
    }
}

/// Innermost message of an error chain, for log lines that should name the
/// root cause rather than three layers of wrappers.
fn root_cause(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}
