//! Outbound operations held while the broker link is down
//!
//! The buffer is disabled until the session applies its options after the
//! first successful connect. Nothing here is persisted: queued operations die
//! with the process.

use crate::protocol::TopicName;
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::warn;

pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    pub capacity: usize,
    /// Evict the oldest entry when full instead of refusing the newest
    pub delete_oldest: bool,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_CAPACITY,
            delete_oldest: false,
        }
    }
}

/// An operation the caller issued
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundOperation {
    Subscribe(TopicName),
    Unsubscribe(TopicName),
    Publish { topic: TopicName, payload: Bytes },
}

impl OutboundOperation {
    pub fn topic(&self) -> &TopicName {
        match self {
            Self::Subscribe(topic) | Self::Unsubscribe(topic) => topic,
            Self::Publish { topic, .. } => topic,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Publish { .. } => "publish",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BufferOutcome<T = OutboundOperation> {
    Queued,
    /// Queued after evicting the returned oldest entry
    QueuedEvicting(T),
    /// Not queued; the entry is handed back
    Rejected(T),
}

/// Bounded FIFO of entries waiting for the link to come back
///
/// Entries are usually [`OutboundOperation`]s; the session stores them with
/// extra bookkeeping attached.
#[derive(Debug)]
pub struct DisconnectedBuffer<T = OutboundOperation> {
    options: Option<BufferOptions>,
    queue: VecDeque<T>,
}

impl<T> Default for DisconnectedBuffer<T> {
    fn default() -> Self {
        Self {
            options: None,
            queue: VecDeque::new(),
        }
    }
}

impl<T> DisconnectedBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the buffer with the given policy
    ///
    /// Entries beyond a smaller capacity are trimmed according to the policy.
    pub fn configure(&mut self, options: BufferOptions) {
        let excess = self.queue.len().saturating_sub(options.capacity);
        if excess > 0 {
            if options.delete_oldest {
                self.queue.drain(..excess);
            } else {
                self.queue.truncate(options.capacity);
            }
            warn!(dropped = excess, "Dropping buffered operations after capacity change");
        }
        self.options = Some(options);
    }

    pub fn is_enabled(&self) -> bool {
        self.options.is_some()
    }

    pub fn options(&self) -> Option<BufferOptions> {
        self.options
    }

    pub fn capacity(&self) -> usize {
        self.options.map_or(0, |o| o.capacity)
    }

    pub fn push(&mut self, op: T) -> BufferOutcome<T> {
        let Some(options) = self.options else {
            return BufferOutcome::Rejected(op);
        };

        if options.capacity == 0 {
            return BufferOutcome::Rejected(op);
        }

        if self.queue.len() < options.capacity {
            self.queue.push_back(op);
            return BufferOutcome::Queued;
        }

        if options.delete_oldest {
            let evicted = self.queue.pop_front();
            self.queue.push_back(op);
            match evicted {
                Some(old) => BufferOutcome::QueuedEvicting(old),
                None => BufferOutcome::Queued,
            }
        } else {
            BufferOutcome::Rejected(op)
        }
    }

    /// Take every queued operation, oldest first
    pub fn drain(&mut self) -> Vec<T> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
