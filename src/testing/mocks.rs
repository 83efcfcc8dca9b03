//! Mock implementations for testing
//!
//! Provides a scripted [`Transport`] and a recording [`NotificationActions`]
//! sink so sessions can be exercised without a broker.

use crate::session::NotificationActions;
use crate::transport::{ConnectOptions, QoS, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};

pub type PublishedMessage = (String, Bytes, QoS);

/// Mock transport for testing
///
/// Every call is recorded. Outcomes are scripted: connect can fail or wait
/// for [`MockTransport::release_connect`], individual topics can be made to
/// fail, and subscribes can be held until released.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub connects: Arc<Mutex<Vec<ConnectOptions>>>,
    pub subscribes: Arc<Mutex<Vec<(String, QoS)>>>,
    pub unsubscribes: Arc<Mutex<Vec<String>>>,
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub disconnects: Arc<Mutex<usize>>,
    pub should_fail_connect: bool,
    fail_disconnect: AtomicBool,
    failing_topics: StdMutex<HashSet<String>>,
    connect_gate: Option<Semaphore>,
    subscribe_gate: Option<Semaphore>,
    event_sender: StdMutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_failure() -> Self {
        Self {
            should_fail_connect: true,
            ..Default::default()
        }
    }

    /// Connect does not resolve until [`MockTransport::release_connect`]
    pub fn with_gated_connect(mut self) -> Self {
        self.connect_gate = Some(Semaphore::new(0));
        self
    }

    /// Each subscribe waits for a permit from [`MockTransport::release_subscribes`]
    pub fn with_gated_subscribes(mut self) -> Self {
        self.subscribe_gate = Some(Semaphore::new(0));
        self
    }

    pub fn release_connect(&self) {
        if let Some(gate) = &self.connect_gate {
            gate.add_permits(1);
        }
    }

    pub fn release_subscribes(&self, count: usize) {
        if let Some(gate) = &self.subscribe_gate {
            gate.add_permits(count);
        }
    }

    /// Make every later operation on this fully qualified topic fail
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_string());
    }

    pub fn set_disconnect_failure(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// Deliver an unsolicited event to the installed sender
    ///
    /// Returns false when no sender is installed or the receiver is gone.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let sender = self
            .event_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn has_event_sender(&self) -> bool {
        self.event_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub async fn get_connects(&self) -> Vec<ConnectOptions> {
        self.connects.lock().await.clone()
    }

    /// Fully qualified topics in call order
    pub async fn get_subscribed_topics(&self) -> Vec<String> {
        self.subscribes
            .lock()
            .await
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    pub async fn get_subscribes(&self) -> Vec<(String, QoS)> {
        self.subscribes.lock().await.clone()
    }

    pub async fn get_unsubscribes(&self) -> Vec<String> {
        self.unsubscribes.lock().await.clone()
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn get_disconnect_count(&self) -> usize {
        *self.disconnects.lock().await
    }

    pub async fn clear_history(&self) {
        self.connects.lock().await.clear();
        self.subscribes.lock().await.clear();
        self.unsubscribes.lock().await.clear();
        self.published_messages.lock().await.clear();
        *self.disconnects.lock().await = 0;
    }

    fn topic_fails(&self, topic: &str) -> bool {
        self.failing_topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(topic)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        self.connects.lock().await.push(options.clone());

        if let Some(gate) = &self.connect_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.should_fail_connect {
            return Err(TransportError::ConnectionFailed(
                "Mock connection failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.subscribes.lock().await.push((topic.to_string(), qos));

        if let Some(gate) = &self.subscribe_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.topic_fails(topic) {
            return Err(TransportError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: "Mock subscribe failure".to_string(),
            });
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.unsubscribes.lock().await.push(topic.to_string());

        if self.topic_fails(topic) {
            return Err(TransportError::UnsubscribeFailed {
                topic: topic.to_string(),
                reason: "Mock unsubscribe failure".to_string(),
            });
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), TransportError> {
        self.published_messages
            .lock()
            .await
            .push((topic.to_string(), payload, qos));

        if self.topic_fails(topic) {
            return Err(TransportError::PublishFailed {
                topic: topic.to_string(),
                reason: "Mock publish failure".to_string(),
            });
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        *self.disconnects.lock().await += 1;

        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(TransportError::DisconnectFailed(
                "Mock disconnect failure".to_string(),
            ));
        }
        Ok(())
    }

    fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>) {
        *self
            .event_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sender);
    }
}

/// One callback observed by [`RecordingActions`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    MessageReceived { topic: String, payload: Vec<u8> },
    ConnectionComplete,
    ConnectionLost(TransportError),
    ConnectionFailed(TransportError),
    DisconnectFailed(TransportError),
}

/// Notification sink that records every callback and streams it to the test
#[derive(Debug)]
pub struct RecordingActions {
    events: StdMutex<Vec<SinkEvent>>,
    sender: mpsc::UnboundedSender<SinkEvent>,
    receiver: Mutex<mpsc::UnboundedReceiver<SinkEvent>>,
}

impl Default for RecordingActions {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            events: StdMutex::new(Vec::new()),
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in callback order
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&SinkEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(e))
            .count()
    }

    /// Next streamed event, or None once the timeout elapses
    pub async fn next_event(&self, timeout: Duration) -> Option<SinkEvent> {
        let mut receiver = self.receiver.lock().await;
        tokio::time::timeout(timeout, receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Skip streamed events until one matches
    pub async fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&SinkEvent) -> bool,
    ) -> Option<SinkEvent> {
        let mut receiver = self.receiver.lock().await;
        tokio::time::timeout(timeout, async {
            while let Some(event) = receiver.recv().await {
                if predicate(&event) {
                    return Some(event);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    fn record(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        let _ = self.sender.send(event);
    }
}

impl NotificationActions for RecordingActions {
    fn on_message_received(&self, topic: &str, payload: &[u8]) {
        self.record(SinkEvent::MessageReceived {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    fn on_connection_complete(&self) {
        self.record(SinkEvent::ConnectionComplete);
    }

    fn on_connection_lost(&self, cause: &TransportError) {
        self.record(SinkEvent::ConnectionLost(cause.clone()));
    }

    fn on_connection_failed(&self, cause: &TransportError) {
        self.record(SinkEvent::ConnectionFailed(cause.clone()));
    }

    fn on_disconnect_failed(&self, cause: &TransportError) {
        self.record(SinkEvent::DisconnectFailed(cause.clone()));
    }
}
