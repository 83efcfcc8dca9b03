//! Pure routing of rumqttc events
//!
//! Maps raw event loop output to the handful of cases the transport driver
//! acts on.

use bytes::Bytes;
use rumqttc::{Event, Outgoing, Packet, SubscribeReasonCode};

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Bytes },
    /// Subscribe request written with this packet id
    SubscribeSent(u16),
    /// Broker answered a subscribe request
    SubscribeAcknowledged {
        pkid: u16,
        outcome: Result<(), String>,
    },
    /// Unsubscribe request written with this packet id
    UnsubscribeSent(u16),
    /// Broker answered an unsubscribe request
    UnsubscribeAcknowledged(u16),
    /// Our disconnect packet went out
    DisconnectSent,
    /// Pings, publish acks and similar traffic
    Infrastructure,
}

pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                },
                Packet::SubAck(suback) => EventRoute::SubscribeAcknowledged {
                    pkid: suback.pkid,
                    outcome: Self::validate_subscription_success(&suback.return_codes),
                },
                Packet::UnsubAck(unsuback) => EventRoute::UnsubscribeAcknowledged(unsuback.pkid),
                _ => EventRoute::Infrastructure,
            },
            Event::Outgoing(outgoing) => match outgoing {
                Outgoing::Subscribe(pkid) => EventRoute::SubscribeSent(*pkid),
                Outgoing::Unsubscribe(pkid) => EventRoute::UnsubscribeSent(*pkid),
                Outgoing::Disconnect => EventRoute::DisconnectSent,
                _ => EventRoute::Infrastructure,
            },
        }
    }

    /// A subscribe succeeds only when every filter was granted
    pub fn validate_subscription_success(return_codes: &[SubscribeReasonCode]) -> Result<(), String> {
        if return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            Err(format!("Broker refused subscription: {return_codes:?}"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish, QoS, SubAck, UnsubAck};

    #[test]
    fn test_route_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            true,
        )));
        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::ConnectionAcknowledged
        );
    }

    #[test]
    fn test_route_publish() {
        let publish = Publish::new("push/notification/alerts", QoS::AtMostOnce, "hello");
        let event = Event::Incoming(Packet::Publish(publish));

        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::MessageReceived {
                topic: "push/notification/alerts".to_string(),
                payload: Bytes::from_static(b"hello"),
            }
        );
    }

    #[test]
    fn test_route_suback() {
        let granted = Event::Incoming(Packet::SubAck(SubAck::new(
            3,
            vec![SubscribeReasonCode::Success(QoS::AtMostOnce)],
        )));
        assert_eq!(
            MessageHandler::route_mqtt_event(&granted),
            EventRoute::SubscribeAcknowledged {
                pkid: 3,
                outcome: Ok(())
            }
        );

        let refused = Event::Incoming(Packet::SubAck(SubAck::new(
            4,
            vec![SubscribeReasonCode::Failure],
        )));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&refused),
            EventRoute::SubscribeAcknowledged {
                pkid: 4,
                outcome: Err(_)
            }
        ));
    }

    #[test]
    fn test_route_outgoing() {
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Subscribe(9))),
            EventRoute::SubscribeSent(9)
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Unsubscribe(10))),
            EventRoute::UnsubscribeSent(10)
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::Disconnect)),
            EventRoute::DisconnectSent
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::Infrastructure
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::UnsubAck(UnsubAck::new(
                10
            )))),
            EventRoute::UnsubscribeAcknowledged(10)
        );
    }
}
