//! Impure I/O operations for the MQTT transport
//!
//! This module owns the rumqttc client and event loop: it opens the
//! connection, drives the event loop on a background task, reconnects after
//! network errors, and resolves request completions from broker acks.

use super::connection::{configure_mqtt_options, LinkTracker, ReconnectConfig};
use super::message_handler::{EventRoute, MessageHandler};
use super::pending::{PendingRequests, RequestKind};
use crate::transport::{ConnectOptions, QoS, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, EventLoop};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the rumqttc request channel
const REQUEST_CHANNEL_CAPACITY: usize = 64;

type SharedPending = Arc<StdMutex<PendingRequests>>;

/// MQTT transport backed by rumqttc
pub struct MqttTransport {
    client: Mutex<Option<AsyncClient>>,
    pending: SharedPending,
    event_tx: StdMutex<Option<mpsc::Sender<TransportEvent>>>,
    shutdown_tx: StdMutex<Option<watch::Sender<bool>>>,
    driver_handle: StdMutex<Option<JoinHandle<()>>>,
    reconnect_config: ReconnectConfig,
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttTransport {
    pub fn new() -> Self {
        Self::with_reconnect_config(ReconnectConfig::default())
    }

    pub fn with_reconnect_config(reconnect_config: ReconnectConfig) -> Self {
        Self {
            client: Mutex::new(None),
            pending: Arc::new(StdMutex::new(PendingRequests::new())),
            event_tx: StdMutex::new(None),
            shutdown_tx: StdMutex::new(None),
            driver_handle: StdMutex::new(None),
            reconnect_config,
        }
    }

    fn with_pending<R>(pending: &SharedPending, f: impl FnOnce(&mut PendingRequests) -> R) -> R {
        let mut guard = pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    /// Poll until the first ConnAck; any error before it fails the connect
    async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), TransportError> {
        loop {
            match event_loop.poll().await {
                Ok(event) => {
                    if MessageHandler::route_mqtt_event(&event)
                        == EventRoute::ConnectionAcknowledged
                    {
                        return Ok(());
                    }
                }
                Err(e) => return Err(TransportError::ConnectionFailed(e.to_string())),
            }
        }
    }

    /// Hand a subscribe/unsubscribe to the client and wait for the broker's answer
    async fn tracked_request(&self, kind: RequestKind, topic: &str, qos: QoS) -> Result<(), TransportError> {
        let (completion_tx, completion_rx) = oneshot::channel();

        {
            // Client lock keeps queue order identical to request order
            let client_guard = self.client.lock().await;
            let client = client_guard.as_ref().ok_or(TransportError::NotConnected)?;

            Self::with_pending(&self.pending, |p| p.enqueue(kind, topic, completion_tx));

            let request = match kind {
                RequestKind::Subscribe => client.subscribe(topic, qos).await,
                RequestKind::Unsubscribe => client.unsubscribe(topic).await,
            };

            if let Err(e) = request {
                Self::with_pending(&self.pending, |p| p.withdraw_last(kind));
                let reason = e.to_string();
                return Err(match kind {
                    RequestKind::Subscribe => TransportError::SubscriptionFailed {
                        topic: topic.to_string(),
                        reason,
                    },
                    RequestKind::Unsubscribe => TransportError::UnsubscribeFailed {
                        topic: topic.to_string(),
                        reason,
                    },
                });
            }
        }

        completion_rx
            .await
            .unwrap_or_else(|_| Err(TransportError::ConnectionLost("transport stopped".to_string())))
    }

    /// Event loop driver with automatic reconnection and graceful shutdown
    async fn drive_event_loop(
        mut event_loop: EventLoop,
        pending: SharedPending,
        events: Option<mpsc::Sender<TransportEvent>>,
        mut shutdown_rx: watch::Receiver<bool>,
        reconnect_config: ReconnectConfig,
        automatic_reconnect: bool,
    ) {
        let mut link = LinkTracker::online(reconnect_config);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT event loop");
                        break;
                    }
                }

                polled = event_loop.poll() => match polled {
                    Ok(event) => {
                        let route = MessageHandler::route_mqtt_event(&event);
                        if !Self::process_event_route(route, &mut link, &pending, events.as_ref()).await {
                            break;
                        }
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        let failure = link.on_error();

                        if failure.newly_lost {
                            warn!("MQTT connection lost: {}", reason);
                            Self::with_pending(&pending, |p| p.fail_in_flight(&reason));
                            Self::emit(events.as_ref(), TransportEvent::ConnectionLost(reason)).await;
                        } else {
                            debug!("Reconnection attempt failed: {}", reason);
                        }

                        if !automatic_reconnect {
                            info!("Automatic reconnect disabled, stopping MQTT event loop");
                            break;
                        }

                        // rumqttc reconnects on the next poll
                        tokio::select! {
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() || *shutdown_rx.borrow() {
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(Duration::from_millis(failure.delay_ms)) => {}
                        }
                    }
                }
            }
        }

        Self::with_pending(&pending, |p| p.fail_all("transport stopped"));
        info!("MQTT event loop stopped");
    }

    /// Returns true to continue the loop, false to stop
    async fn process_event_route(
        route: EventRoute,
        link: &mut LinkTracker,
        pending: &SharedPending,
        events: Option<&mpsc::Sender<TransportEvent>>,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                if link.on_connack() {
                    info!("MQTT reconnection successful");
                    Self::emit(events, TransportEvent::ReconnectComplete).await;
                }
            }
            EventRoute::MessageReceived { topic, payload } => {
                debug!(target: "mqtt_transport", "Received MQTT message on topic: {}", topic);
                Self::emit(events, TransportEvent::MessageArrived { topic, payload }).await;
            }
            EventRoute::SubscribeSent(pkid) => {
                Self::with_pending(pending, |p| p.sent(RequestKind::Subscribe, pkid));
            }
            EventRoute::SubscribeAcknowledged { pkid, outcome } => {
                Self::with_pending(pending, |p| {
                    p.acknowledged(RequestKind::Subscribe, pkid, outcome)
                });
            }
            EventRoute::UnsubscribeSent(pkid) => {
                Self::with_pending(pending, |p| p.sent(RequestKind::Unsubscribe, pkid));
            }
            EventRoute::UnsubscribeAcknowledged(pkid) => {
                Self::with_pending(pending, |p| {
                    p.acknowledged(RequestKind::Unsubscribe, pkid, Ok(()))
                });
            }
            EventRoute::DisconnectSent => {
                info!("Disconnect sent to broker");
                return false;
            }
            EventRoute::Infrastructure => {}
        }
        true
    }

    async fn emit(events: Option<&mpsc::Sender<TransportEvent>>, event: TransportEvent) {
        match events {
            Some(sender) => {
                if sender.send(event).await.is_err() {
                    debug!("Transport event receiver dropped");
                }
            }
            None => debug!("No event sender installed, dropping {:?}", event),
        }
    }

    fn stop_driver(&self) {
        if let Ok(mut shutdown) = self.shutdown_tx.lock() {
            if let Some(tx) = shutdown.take() {
                let _ = tx.send(true);
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        let mqtt_options = configure_mqtt_options(options)?;
        let (client, mut event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        info!(broker = %options.broker_uri, client_id = %options.client_id, "Connecting to MQTT broker");
        Self::wait_for_connack(&mut event_loop).await.map_err(|e| {
            error!("Failed to connect to MQTT broker: {}", e);
            e
        })?;

        *self.client.lock().await = Some(client);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let events = self.event_tx.lock().ok().and_then(|tx| tx.clone());
        let handle = tokio::spawn(Self::drive_event_loop(
            event_loop,
            self.pending.clone(),
            events,
            shutdown_rx,
            self.reconnect_config.clone(),
            options.automatic_reconnect,
        ));

        self.stop_driver();
        if let Ok(mut slot) = self.shutdown_tx.lock() {
            *slot = Some(shutdown_tx);
        }
        if let Ok(mut slot) = self.driver_handle.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }

        info!("MQTT connection established");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.tracked_request(RequestKind::Subscribe, topic, qos).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.tracked_request(RequestKind::Unsubscribe, topic, QoS::AtMostOnce)
            .await
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), TransportError> {
        let client_guard = self.client.lock().await;
        let client = client_guard.as_ref().ok_or(TransportError::NotConnected)?;

        client
            .publish(topic, qos, false, payload.to_vec())
            .await
            .map_err(|e| TransportError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let client = self
            .client
            .lock()
            .await
            .take()
            .ok_or(TransportError::NotConnected)?;

        client
            .disconnect()
            .await
            .map_err(|e| TransportError::DisconnectFailed(e.to_string()))?;

        info!("MQTT disconnect requested");
        Ok(())
    }

    fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>) {
        if let Ok(mut slot) = self.event_tx.lock() {
            *slot = Some(sender);
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.stop_driver();
    }
}
