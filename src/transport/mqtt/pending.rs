//! Completion tracking for subscribe and unsubscribe requests
//!
//! rumqttc accepts a request long before the broker answers it. Requests are
//! queued here in the order they were handed to the client; the event loop
//! assigns packet ids in that same order, so the outgoing notification pairs
//! the oldest queued request with its packet id and the broker's ack resolves it.

use crate::transport::TransportError;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;
use tracing::warn;

pub type Completion = oneshot::Sender<Result<(), TransportError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug)]
struct Pending {
    topic: String,
    completion: Completion,
}

#[derive(Debug, Default)]
struct Lane {
    queued: VecDeque<Pending>,
    in_flight: HashMap<u16, Pending>,
}

/// Requests waiting for a packet id or a broker acknowledgment
#[derive(Debug, Default)]
pub struct PendingRequests {
    subscribes: Lane,
    unsubscribes: Lane,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&mut self, kind: RequestKind) -> &mut Lane {
        match kind {
            RequestKind::Subscribe => &mut self.subscribes,
            RequestKind::Unsubscribe => &mut self.unsubscribes,
        }
    }

    /// Queue a request that is about to be handed to the client
    pub fn enqueue(&mut self, kind: RequestKind, topic: &str, completion: Completion) {
        self.lane(kind).queued.push_back(Pending {
            topic: topic.to_string(),
            completion,
        });
    }

    /// Drop the most recently queued request after the client refused it
    pub fn withdraw_last(&mut self, kind: RequestKind) {
        self.lane(kind).queued.pop_back();
    }

    /// The event loop wrote a request with this packet id
    pub fn sent(&mut self, kind: RequestKind, pkid: u16) {
        let lane = self.lane(kind);
        match lane.queued.pop_front() {
            Some(pending) => {
                lane.in_flight.insert(pkid, pending);
            }
            None => warn!(?kind, pkid, "Outgoing request with no queued completion"),
        }
    }

    /// The broker acknowledged a packet id
    pub fn acknowledged(&mut self, kind: RequestKind, pkid: u16, outcome: Result<(), String>) {
        let Some(pending) = self.lane(kind).in_flight.remove(&pkid) else {
            warn!(?kind, pkid, "Acknowledgment for unknown packet id");
            return;
        };

        let result = outcome.map_err(|reason| match kind {
            RequestKind::Subscribe => TransportError::SubscriptionFailed {
                topic: pending.topic.clone(),
                reason,
            },
            RequestKind::Unsubscribe => TransportError::UnsubscribeFailed {
                topic: pending.topic.clone(),
                reason,
            },
        });
        let _ = pending.completion.send(result);
    }

    /// Fail everything already on the wire; queued requests are resent by the
    /// client after reconnecting and stay pending
    pub fn fail_in_flight(&mut self, reason: &str) {
        for kind in [RequestKind::Subscribe, RequestKind::Unsubscribe] {
            let drained: Vec<(u16, Pending)> = self.lane(kind).in_flight.drain().collect();
            for (_, pending) in drained {
                let error = TransportError::ConnectionLost(reason.to_string());
                let _ = pending.completion.send(Err(error));
            }
        }
    }

    /// Fail every request, queued or in flight
    pub fn fail_all(&mut self, reason: &str) {
        self.fail_in_flight(reason);
        for kind in [RequestKind::Subscribe, RequestKind::Unsubscribe] {
            let drained: Vec<Pending> = self.lane(kind).queued.drain(..).collect();
            for pending in drained {
                let _ = pending
                    .completion
                    .send(Err(TransportError::ConnectionLost(reason.to_string())));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscribes.queued.len()
            + self.subscribes.in_flight.len()
            + self.unsubscribes.queued.len()
            + self.unsubscribes.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_resolves_matching_request() {
        let mut pending = PendingRequests::new();
        let (tx_a, mut rx_a) = oneshot::channel();
        let (tx_b, mut rx_b) = oneshot::channel();

        pending.enqueue(RequestKind::Subscribe, "push/notification/a", tx_a);
        pending.enqueue(RequestKind::Subscribe, "push/notification/b", tx_b);
        pending.sent(RequestKind::Subscribe, 7);
        pending.sent(RequestKind::Subscribe, 8);

        pending.acknowledged(RequestKind::Subscribe, 8, Err("not authorized".to_string()));
        pending.acknowledged(RequestKind::Subscribe, 7, Ok(()));

        assert_eq!(rx_a.try_recv().unwrap(), Ok(()));
        assert_eq!(
            rx_b.try_recv().unwrap(),
            Err(TransportError::SubscriptionFailed {
                topic: "push/notification/b".to_string(),
                reason: "not authorized".to_string()
            })
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn test_lanes_are_independent() {
        let mut pending = PendingRequests::new();
        let (tx_sub, _rx_sub) = oneshot::channel();
        let (tx_unsub, mut rx_unsub) = oneshot::channel();

        pending.enqueue(RequestKind::Subscribe, "s", tx_sub);
        pending.enqueue(RequestKind::Unsubscribe, "u", tx_unsub);
        pending.sent(RequestKind::Unsubscribe, 1);
        pending.acknowledged(RequestKind::Unsubscribe, 1, Ok(()));

        assert_eq!(rx_unsub.try_recv().unwrap(), Ok(()));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_connection_loss_fails_only_in_flight() {
        let mut pending = PendingRequests::new();
        let (tx_sent, mut rx_sent) = oneshot::channel();
        let (tx_queued, mut rx_queued) = oneshot::channel();

        pending.enqueue(RequestKind::Subscribe, "sent", tx_sent);
        pending.sent(RequestKind::Subscribe, 1);
        pending.enqueue(RequestKind::Subscribe, "queued", tx_queued);

        pending.fail_in_flight("network down");

        assert!(matches!(
            rx_sent.try_recv().unwrap(),
            Err(TransportError::ConnectionLost(_))
        ));
        assert!(rx_queued.try_recv().is_err());
        assert_eq!(pending.len(), 1);

        pending.fail_all("shutdown");
        assert!(rx_queued.try_recv().unwrap().is_err());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_withdraw_last() {
        let mut pending = PendingRequests::new();
        let (tx, _rx) = oneshot::channel();
        pending.enqueue(RequestKind::Unsubscribe, "t", tx);
        pending.withdraw_last(RequestKind::Unsubscribe);
        assert!(pending.is_empty());
    }
}
