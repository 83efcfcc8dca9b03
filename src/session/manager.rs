//! Connection manager: the single owner of session state and transport calls
//!
//! State, the subscription registry and the disconnected buffer live together
//! behind one mutex. Transport events are pumped from a channel on a background
//! task; caller operations return immediately with a [`Dispatch`] and report
//! their network outcome through [`NotificationActions`].

use super::actions::NotificationActions;
use super::buffer::{BufferOptions, BufferOutcome, DisconnectedBuffer, OutboundOperation};
use super::registry::SubscriptionRegistry;
use super::state::{Dispatch, SessionState};
use crate::credentials::Credential;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{short_topic_name, TopicError, TopicName};
use crate::transport::{ConnectOptions, QoS, Transport, TransportError, TransportEvent};
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Fixed prefix of every client identifier
pub const CLIENT_NAME: &str = "PushSessionClient";

/// Delivery level for every subscribe and publish
pub const DELIVERY_QOS: QoS = QoS::AtMostOnce;

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// `<name>/<epoch-millis>/<uuid>`, unique per session
pub fn generate_client_id() -> String {
    format!(
        "{CLIENT_NAME}/{}/{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4()
    )
}

/// Caller-chosen session parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub broker_uri: String,
    pub initial_topic: String,
    pub keep_alive: Duration,
}

impl SessionSettings {
    pub fn new(broker_uri: impl Into<String>, initial_topic: impl Into<String>) -> Self {
        Self {
            broker_uri: broker_uri.into(),
            initial_topic: initial_topic.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }

    /// Connect options with the fixed durable, auto-reconnecting profile
    pub fn connect_options(&self, client_id: &str, credential: &Credential) -> ConnectOptions {
        ConnectOptions {
            broker_uri: self.broker_uri.clone(),
            client_id: client_id.to_string(),
            username: credential.username().to_string(),
            password: credential.password().to_string(),
            automatic_reconnect: true,
            clean_session: false,
            keep_alive: self.keep_alive,
        }
    }
}

/// An accepted operation and the unsubscribe generation of its topic at the
/// moment it was accepted
#[derive(Debug)]
struct Ticket {
    op: OutboundOperation,
    generation: u64,
}

#[derive(Debug)]
struct SessionCore {
    state: SessionState,
    ever_connected: bool,
    registry: SubscriptionRegistry,
    buffer: DisconnectedBuffer<Ticket>,
    /// Accepted unsubscribes per short topic name
    unsubscribes: HashMap<String, u64>,
    /// Link loss reported while the initial connect was still pending
    early_loss: Option<String>,
    early_recovery: bool,
}

impl SessionCore {
    fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            ever_connected: false,
            registry: SubscriptionRegistry::new(),
            buffer: DisconnectedBuffer::new(),
            unsubscribes: HashMap::new(),
            early_loss: None,
            early_recovery: false,
        }
    }

    fn generation(&self, topic: &str) -> u64 {
        self.unsubscribes.get(topic).copied().unwrap_or(0)
    }

    fn ticket(&self, op: OutboundOperation) -> Ticket {
        let generation = self.generation(op.topic().short());
        Ticket { op, generation }
    }

    /// Drop a topic from the registry and invalidate subscribes still in flight
    fn withdraw(&mut self, topic: &str) {
        self.registry.remove(topic);
        *self.unsubscribes.entry(topic.to_string()).or_insert(0) += 1;
    }

    /// Registry entries in order, then the buffered operations oldest first
    fn replay(&mut self) -> Vec<Ticket> {
        let mut replay = Vec::with_capacity(self.registry.len() + self.buffer.len());
        for topic in self.registry.list() {
            match TopicName::new(&topic) {
                Ok(name) => replay.push(self.ticket(OutboundOperation::Subscribe(name))),
                Err(e) => warn!("Skipping unrestorable topic {}: {}", topic, e),
            }
        }
        replay.extend(self.buffer.drain());
        replay
    }

    /// Record a confirmed subscribe unless an unsubscribe was accepted since
    fn confirm(&mut self, topic: &str, generation: u64) -> bool {
        if self.generation(topic) != generation {
            return false;
        }
        self.registry.add(topic);
        true
    }
}

/// Where an operation goes once the lock is released
enum Route {
    Issue(Ticket),
    Report(OutboundOperation, TransportError, Dispatch),
    Done(Dispatch),
}

struct Shared<T: Transport> {
    transport: Arc<T>,
    actions: Arc<dyn NotificationActions>,
    core: Mutex<SessionCore>,
    runtime: Handle,
    broker_uri: String,
    client_id: String,
    initial_topic: TopicName,
}

/// A push notification session bound to one broker connection
pub struct Session<T: Transport> {
    shared: Arc<Shared<T>>,
    event_pump: JoinHandle<()>,
}

impl<T: Transport> Session<T> {
    /// Create the session and start connecting in the background
    ///
    /// Must be called from within a tokio runtime. Fails synchronously only
    /// when the initial topic is invalid or no runtime is available.
    pub fn start(
        settings: SessionSettings,
        credential: &Credential,
        transport: Arc<T>,
        actions: Arc<dyn NotificationActions>,
    ) -> SessionResult<Self> {
        let initial_topic = TopicName::new(&settings.initial_topic)?;
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let client_id = generate_client_id();
        let options = settings.connect_options(&client_id, credential);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        transport.set_event_sender(event_tx);

        let shared = Arc::new(Shared {
            transport,
            actions,
            core: Mutex::new(SessionCore::new()),
            runtime,
            broker_uri: settings.broker_uri,
            client_id,
            initial_topic,
        });

        let event_pump = shared.runtime.spawn(Shared::pump_events(shared.clone(), event_rx));

        info!(
            broker = %shared.broker_uri,
            client_id = %shared.client_id,
            "Starting push session"
        );
        let connecting = shared.clone();
        shared.runtime.spawn(async move {
            let result = connecting.transport.connect(&options).await;
            connecting.on_connect_result(result);
        });

        Ok(Self { shared, event_pump })
    }

    /// Subscribe to a short topic name
    ///
    /// The only synchronous failure is an invalid topic name.
    pub fn subscribe(&self, topic: &str) -> Result<Dispatch, TopicError> {
        let topic = TopicName::new(topic)?;
        Ok(self.shared.submit(OutboundOperation::Subscribe(topic)))
    }

    /// Unsubscribe from a short topic name; the registry entry is removed
    /// immediately, before the broker confirms
    pub fn unsubscribe(&self, topic: &str) -> Result<Dispatch, TopicError> {
        let topic = TopicName::new(topic)?;
        Ok(self.shared.submit(OutboundOperation::Unsubscribe(topic)))
    }

    /// Publish a payload to a short topic name at most once, not retained
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<Dispatch, TopicError> {
        let topic = TopicName::new(topic)?;
        Ok(self.shared.submit(OutboundOperation::Publish {
            topic,
            payload: payload.into(),
        }))
    }

    /// Close the broker connection
    pub fn disconnect(&self) -> Dispatch {
        self.shared.disconnect()
    }

    pub fn state(&self) -> SessionState {
        self.shared.core().state
    }

    /// True once the first connection completed and until disconnect
    pub fn is_ready(&self) -> bool {
        let core = self.shared.core();
        core.ever_connected
            && matches!(
                core.state,
                SessionState::Connected | SessionState::Reconnecting
            )
    }

    /// Registry snapshot in subscription order
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.shared.core().registry.list()
    }

    /// Operations waiting in the disconnected buffer
    pub fn buffered_operations(&self) -> usize {
        self.shared.core().buffer.len()
    }

    pub fn client_id(&self) -> &str {
        &self.shared.client_id
    }

    pub fn broker_uri(&self) -> &str {
        &self.shared.broker_uri
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.event_pump.abort();
        debug!(client_id = %self.shared.client_id, "Push session dropped");
    }
}

impl<T: Transport> Shared<T> {
    fn core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pump_events(shared: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            shared.handle_transport_event(event);
        }
        debug!("Transport event channel closed");
    }

    fn on_connect_result(self: &Arc<Self>, result: Result<(), TransportError>) {
        match result {
            Ok(()) => {
                let (early_loss, early_recovery) = {
                    let mut core = self.core();
                    if core.state != SessionState::Connecting {
                        warn!(state = %core.state, "Connect completed in unexpected state");
                    }
                    core.state = SessionState::Connected;
                    core.ever_connected = true;
                    core.buffer.configure(BufferOptions::default());
                    (
                        core.early_loss.take(),
                        std::mem::take(&mut core.early_recovery),
                    )
                };
                info!(broker = %self.broker_uri, "Push session connected");

                self.actions.on_connection_complete();
                // A loss seen during the connect puts the initial subscribe in the buffer
                if let Some(reason) = early_loss {
                    self.handle_transport_event(TransportEvent::ConnectionLost(reason));
                }
                self.submit(OutboundOperation::Subscribe(self.initial_topic.clone()));
                if early_recovery {
                    self.handle_transport_event(TransportEvent::ReconnectComplete);
                }
            }
            Err(e) => {
                {
                    let mut core = self.core();
                    core.state = SessionState::Disconnected;
                    core.early_loss = None;
                    core.early_recovery = false;
                }
                warn!(broker = %self.broker_uri, "Failed to connect push session: {}", e);
                self.actions.on_connection_failed(&e);
            }
        }
    }

    fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionLost(reason) => {
                let lost = {
                    let mut core = self.core();
                    let state = core.state;
                    match state {
                        SessionState::Connected => {
                            core.state = SessionState::Reconnecting;
                            true
                        }
                        SessionState::Connecting => {
                            debug!("Connection lost before the connect result, deferring");
                            core.early_loss = Some(reason.clone());
                            core.early_recovery = false;
                            false
                        }
                        _ => {
                            debug!(state = %state, "Ignoring connection loss");
                            false
                        }
                    }
                };

                if lost {
                    warn!("Push session connection lost: {}", reason);
                    self.actions
                        .on_connection_lost(&TransportError::ConnectionLost(reason));
                }
            }
            TransportEvent::ReconnectComplete => {
                let replay = {
                    let mut core = self.core();
                    let state = core.state;
                    match state {
                        SessionState::Reconnecting => {
                            core.state = SessionState::Connected;
                            core.buffer.configure(BufferOptions::default());
                            Some(core.replay())
                        }
                        SessionState::Connecting if core.early_loss.is_some() => {
                            core.early_recovery = true;
                            None
                        }
                        _ => {
                            debug!(state = %state, "Ignoring reconnect completion");
                            None
                        }
                    }
                };

                let Some(replay) = replay else {
                    return;
                };

                info!(
                    operations = replay.len(),
                    "Push session reconnected, restoring subscriptions"
                );
                self.issue_in_order(replay);
                self.actions.on_connection_complete();
            }
            TransportEvent::MessageArrived { topic, payload } => {
                let name = short_topic_name(&topic).unwrap_or(&topic);
                debug!(topic = name, bytes = payload.len(), "Message arrived");
                self.actions.on_message_received(name, &payload);
            }
        }
    }

    fn submit(self: &Arc<Self>, op: OutboundOperation) -> Dispatch {
        let route = {
            let mut core = self.core();
            let state = core.state;
            match state {
                SessionState::Connected => {
                    let ticket = core.ticket(op);
                    if let OutboundOperation::Unsubscribe(topic) = &ticket.op {
                        core.withdraw(topic.short());
                    }
                    Route::Issue(ticket)
                }
                SessionState::Reconnecting => {
                    let unsubscribing = match &op {
                        OutboundOperation::Unsubscribe(topic) => Some(topic.short().to_string()),
                        _ => None,
                    };
                    let capacity = core.buffer.capacity();
                    let ticket = core.ticket(op);

                    match core.buffer.push(ticket) {
                        BufferOutcome::Queued => {
                            if let Some(topic) = unsubscribing {
                                core.withdraw(&topic);
                            }
                            Route::Done(Dispatch::Buffered)
                        }
                        BufferOutcome::QueuedEvicting(evicted) => {
                            if let Some(topic) = unsubscribing {
                                core.withdraw(&topic);
                            }
                            Route::Report(
                                evicted.op,
                                TransportError::BufferFull { capacity },
                                Dispatch::Buffered,
                            )
                        }
                        BufferOutcome::Rejected(ticket) => Route::Report(
                            ticket.op,
                            TransportError::BufferFull { capacity },
                            Dispatch::Rejected,
                        ),
                    }
                }
                SessionState::Connecting | SessionState::Disconnected
                    if !core.ever_connected =>
                {
                    Route::Done(Dispatch::NotReady)
                }
                SessionState::Connecting
                | SessionState::Disconnected
                | SessionState::Disconnecting => {
                    Route::Report(op, TransportError::NotConnected, Dispatch::Closed)
                }
            }
        };

        match route {
            Route::Issue(ticket) => {
                self.issue(ticket);
                Dispatch::Issued
            }
            Route::Report(op, error, dispatch) => {
                warn!(topic = %op.topic(), "Operation not sent: {}", error);
                self.report_failure(&op, &error);
                dispatch
            }
            Route::Done(dispatch) => {
                if dispatch == Dispatch::NotReady {
                    debug!("Session not ready: operations are only accepted after the first connection completes");
                }
                dispatch
            }
        }
    }

    fn report_failure(&self, op: &OutboundOperation, error: &TransportError) {
        match op {
            OutboundOperation::Subscribe(_) | OutboundOperation::Publish { .. } => {
                self.actions.on_connection_failed(error)
            }
            OutboundOperation::Unsubscribe(_) => self.actions.on_disconnect_failed(error),
        }
    }

    /// Hand an operation to the transport on a worker task
    fn issue(self: &Arc<Self>, ticket: Ticket) {
        let span = crate::session_span!(kind = ticket.op.kind(), topic = %ticket.op.topic());
        self.runtime.spawn(self.clone().execute(ticket).instrument(span));
    }

    /// Issue operations one after another on a single worker task
    ///
    /// A failed operation does not stop the ones after it.
    fn issue_in_order(self: &Arc<Self>, tickets: Vec<Ticket>) {
        if tickets.is_empty() {
            return;
        }
        let span = crate::session_span!(kind = "replay", operations = tickets.len());
        let shared = self.clone();
        let task = async move {
            for ticket in tickets {
                shared.clone().execute(ticket).await;
            }
        };
        self.runtime.spawn(task.instrument(span));
    }

    async fn execute(self: Arc<Self>, ticket: Ticket) {
        let Ticket { op, generation } = ticket;
        match op {
            OutboundOperation::Subscribe(topic) => {
                match self.transport.subscribe(topic.full(), DELIVERY_QOS).await {
                    Ok(()) => {
                        if self.core().confirm(topic.short(), generation) {
                            info!(topic = topic.full(), broker = %self.broker_uri, "Subscribed");
                        } else {
                            info!(
                                topic = topic.full(),
                                "Subscribed, but the topic was unsubscribed meanwhile"
                            );
                        }
                        self.actions.on_connection_complete();
                    }
                    Err(e) => {
                        warn!(topic = topic.full(), "Failed to subscribe: {}", e);
                        self.actions.on_connection_failed(&e);
                    }
                }
            }
            OutboundOperation::Unsubscribe(topic) => {
                match self.transport.unsubscribe(topic.full()).await {
                    Ok(()) => debug!(topic = topic.full(), "Unsubscribed"),
                    Err(e) => {
                        warn!(topic = topic.full(), "Failed to unsubscribe: {}", e);
                        self.actions.on_disconnect_failed(&e);
                    }
                }
            }
            OutboundOperation::Publish { topic, payload } => {
                match self
                    .transport
                    .publish(topic.full(), payload, DELIVERY_QOS)
                    .await
                {
                    Ok(()) => debug!(topic = topic.full(), "Published"),
                    Err(e) => {
                        warn!(topic = topic.full(), "Failed to publish: {}", e);
                        self.actions.on_connection_failed(&e);
                    }
                }
            }
        }
    }

    fn disconnect(self: &Arc<Self>) -> Dispatch {
        let previous = {
            let mut core = self.core();
            let state = core.state;
            match state {
                SessionState::Connected | SessionState::Reconnecting => {
                    core.state = SessionState::Disconnecting;
                    state
                }
                SessionState::Connecting | SessionState::Disconnected if !core.ever_connected => {
                    debug!("Session not ready: disconnect ignored before the first connection completes");
                    return Dispatch::NotReady;
                }
                _ => {
                    drop(core);
                    self.actions
                        .on_disconnect_failed(&TransportError::NotConnected);
                    return Dispatch::Closed;
                }
            }
        };

        info!(broker = %self.broker_uri, "Disconnecting push session");
        let shared = self.clone();
        self.runtime.spawn(async move {
            match shared.transport.disconnect().await {
                Ok(()) => {
                    let dropped = {
                        let mut core = shared.core();
                        core.state = SessionState::Disconnected;
                        core.buffer.drain().len()
                    };
                    if dropped > 0 {
                        warn!(dropped, "Discarded buffered operations on disconnect");
                    }
                    info!("Push session disconnected");
                }
                Err(e) => {
                    {
                        let mut core = shared.core();
                        if core.state == SessionState::Disconnecting {
                            core.state = previous;
                        }
                    }
                    warn!("Failed to disconnect push session: {}", e);
                    shared.actions.on_disconnect_failed(&e);
                }
            }
        });

        Dispatch::Issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_format() {
        let id = generate_client_id();
        let parts: Vec<&str> = id.split('/').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], CLIENT_NAME);
        assert!(parts[1].parse::<i64>().unwrap() > 0);
        assert!(Uuid::parse_str(parts[2]).is_ok());
    }

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(generate_client_id(), generate_client_id());
    }

    #[test]
    fn test_connect_options_are_fixed() {
        let store = crate::credentials::MemoryStore::new();
        let device = crate::credentials::DeviceId::new("device-1").unwrap();
        let credential = crate::credentials::derive_credential(&device, &store).unwrap();

        let settings = SessionSettings::new("tcp://h:1883", "alerts");
        let options = settings.connect_options("client", &credential);

        assert!(options.automatic_reconnect);
        assert!(!options.clean_session);
        assert_eq!(options.username, "device-1");
        assert_eq!(options.password, credential.password());
        assert_eq!(options.broker_uri, "tcp://h:1883");
        assert_eq!(options.keep_alive, DEFAULT_KEEP_ALIVE);
    }

    #[test]
    fn test_confirm_skips_topics_withdrawn_since_issue() {
        let mut core = SessionCore::new();
        let alerts = || OutboundOperation::Subscribe(TopicName::new("alerts").unwrap());

        let stale = core.ticket(alerts());
        core.withdraw("alerts");
        assert!(!core.confirm("alerts", stale.generation));
        assert!(core.registry.is_empty());

        let fresh = core.ticket(alerts());
        assert!(core.confirm("alerts", fresh.generation));
        assert_eq!(core.registry.list(), vec!["alerts"]);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let store = crate::credentials::MemoryStore::new();
        let device = crate::credentials::DeviceId::new("device-1").unwrap();
        let credential = crate::credentials::derive_credential(&device, &store).unwrap();

        let result = Session::start(
            SessionSettings::new("tcp://h:1883", "alerts"),
            &credential,
            Arc::new(crate::testing::MockTransport::new()),
            Arc::new(super::super::actions::LoggingActions),
        );
        assert!(matches!(result, Err(SessionError::NoRuntime)));
    }
}
