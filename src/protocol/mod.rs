//! Wire-level naming rules for push notification traffic

pub mod topics;

pub use topics::{
    full_topic_name, short_topic_name, validate_short_topic, TopicError, TopicName, TOPIC_BASE,
    TOPIC_SEPARATOR,
};
