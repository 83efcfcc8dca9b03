//! Topic namespacing for push notification subscriptions
//!
//! Callers pick short topic names; everything that goes over the wire lives
//! under a fixed base segment so notification traffic never collides with
//! unrelated topics on a shared broker.

use thiserror::Error;

/// Base segment every notification topic is published under
pub const TOPIC_BASE: &str = "push/notification";

/// Separator between topic levels
pub const TOPIC_SEPARATOR: char = '/';

const WILDCARDS: [char; 2] = ['+', '#'];

/// Build the fully qualified broker topic for a short topic name
///
/// Rejects names that would escape the namespace: empty names, names containing
/// the level separator, and names containing broker wildcards.
pub fn full_topic_name(short_topic: &str) -> Result<String, TopicError> {
    validate_short_topic(short_topic)?;
    Ok(format!("{TOPIC_BASE}{TOPIC_SEPARATOR}{short_topic}"))
}

/// Map a broker topic back to the caller's short name
///
/// Returns `None` when the topic is outside the namespace or nested below it.
pub fn short_topic_name(full_topic: &str) -> Option<&str> {
    let rest = full_topic.strip_prefix(TOPIC_BASE)?;
    let short = rest.strip_prefix(TOPIC_SEPARATOR)?;
    validate_short_topic(short).ok().map(|_| short)
}

pub fn validate_short_topic(short_topic: &str) -> Result<(), TopicError> {
    if short_topic.is_empty() {
        return Err(TopicError::Empty);
    }

    if short_topic.contains(TOPIC_SEPARATOR) {
        return Err(TopicError::ContainsSeparator(short_topic.to_string()));
    }

    if let Some(ch) = short_topic.chars().find(|c| WILDCARDS.contains(c)) {
        return Err(TopicError::ContainsWildcard {
            topic: short_topic.to_string(),
            wildcard: ch,
        });
    }

    Ok(())
}

/// A short topic name that has passed validation, paired with its wire form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicName {
    short: String,
    full: String,
}

impl TopicName {
    pub fn new(short_topic: &str) -> Result<Self, TopicError> {
        let full = full_topic_name(short_topic)?;
        Ok(Self {
            short: short_topic.to_string(),
            full,
        })
    }

    pub fn short(&self) -> &str {
        &self.short
    }

    pub fn full(&self) -> &str {
        &self.full
    }
}

impl std::fmt::Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.short)
    }
}

/// Topic validation errors, raised synchronously to the caller
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TopicError {
    #[error("Topic name cannot be empty")]
    Empty,
    #[error("Invalid topic name '{0}': must not contain '/'")]
    ContainsSeparator(String),
    #[error("Invalid topic name '{topic}': must not contain wildcard '{wildcard}'")]
    ContainsWildcard { topic: String, wildcard: char },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn full_topic_name_is_deterministic(topic in "[a-zA-Z0-9._-]{1,32}") {
            let first = full_topic_name(&topic).unwrap();
            let second = full_topic_name(&topic).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn full_topic_name_is_injective(
            a in "[a-zA-Z0-9._-]{1,16}",
            b in "[a-zA-Z0-9._-]{1,16}",
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(full_topic_name(&a).unwrap(), full_topic_name(&b).unwrap());
        }

        #[test]
        fn separator_is_always_rejected(
            head in "[a-z]{0,8}",
            tail in "[a-z]{0,8}",
        ) {
            let topic = format!("{head}/{tail}");
            prop_assert!(matches!(
                full_topic_name(&topic),
                Err(TopicError::ContainsSeparator(_))
            ));
        }

        #[test]
        fn short_name_round_trips_through_namespace(topic in "[a-zA-Z0-9._-]{1,32}") {
            let full = full_topic_name(&topic).unwrap();
            prop_assert_eq!(short_topic_name(&full), Some(topic.as_str()));
        }
    }

    #[test]
    fn test_full_topic_format() {
        assert_eq!(full_topic_name("alerts").unwrap(), "push/notification/alerts");
        assert_eq!(
            full_topic_name("user.42").unwrap(),
            "push/notification/user.42"
        );
    }

    #[test]
    fn test_rejected_names() {
        assert_eq!(full_topic_name(""), Err(TopicError::Empty));
        assert_eq!(
            full_topic_name("a/b"),
            Err(TopicError::ContainsSeparator("a/b".to_string()))
        );
        assert_eq!(
            full_topic_name("all+"),
            Err(TopicError::ContainsWildcard {
                topic: "all+".to_string(),
                wildcard: '+'
            })
        );
        assert!(full_topic_name("#").is_err());
    }

    #[test]
    fn test_topic_name_pairs_short_and_full() {
        let name = TopicName::new("alerts").unwrap();
        assert_eq!(name.short(), "alerts");
        assert_eq!(name.full(), "push/notification/alerts");
        assert_eq!(name.to_string(), "alerts");
        assert!(TopicName::new("a/b").is_err());
    }

    #[test]
    fn test_short_topic_name_outside_namespace() {
        assert_eq!(short_topic_name("other/alerts"), None);
        assert_eq!(short_topic_name("push/notification"), None);
        assert_eq!(short_topic_name("push/notification/a/b"), None);
        assert_eq!(short_topic_name("push/notificationx/a"), None);
    }
}
