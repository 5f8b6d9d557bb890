//! Outbound write channels.
//!
//! Writes to the record services never happen inline. Each one is captured as
//! a [`WriteIntent`] and published to the channel named after its resource
//! (`output-posts`, `output-reactions`, ...). Publishing only acknowledges the
//! enqueue; delivery to the record service happens elsewhere.

use crate::errors::{CompositeError, Result};
use crate::metrics_defs::INTENTS_PUBLISHED;
use crate::types::{Comment, Image, Post, PostId, Reaction, ResourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared::counter;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Delete,
}

/// Record carried by a create intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Post(Post),
    Reaction(Reaction),
    Comment(Comment),
    Image(Image),
}

impl Payload {
    pub fn resource(&self) -> ResourceKind {
        match self {
            Payload::Post(_) => ResourceKind::Post,
            Payload::Reaction(_) => ResourceKind::Reaction,
            Payload::Comment(_) => ResourceKind::Comment,
            Payload::Image(_) => ResourceKind::Image,
        }
    }

    pub fn post_id(&self) -> PostId {
        match self {
            Payload::Post(p) => p.post_id,
            Payload::Reaction(r) => r.post_id,
            Payload::Comment(c) => c.post_id,
            Payload::Image(i) => i.post_id,
        }
    }
}

/// A requested create or delete, handed over to a channel by value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteIntent {
    #[serde(rename = "type")]
    pub operation: Operation,
    pub key: PostId,
    pub resource: ResourceKind,
    pub payload: Option<Payload>,
    pub created_at: DateTime<Utc>,
}

impl WriteIntent {
    pub fn create(payload: Payload) -> Self {
        Self {
            operation: Operation::Create,
            key: payload.post_id(),
            resource: payload.resource(),
            payload: Some(payload),
            created_at: Utc::now(),
        }
    }

    /// Delete every record of `resource` attached to `key`.
    pub fn delete(resource: ResourceKind, key: PostId) -> Self {
        Self {
            operation: Operation::Delete,
            key,
            resource,
            payload: None,
            created_at: Utc::now(),
        }
    }

    pub fn channel(&self) -> &'static str {
        self.resource.channel()
    }
}

/// Outbound queue abstraction. `publish` returns once the intent is
/// enqueued; it never waits for the record service.
#[async_trait]
pub trait IntentPublisher: Send + Sync {
    async fn publish(&self, intent: WriteIntent) -> Result<()>;
}

/// An intent as recorded by [`InMemoryChannels`].
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedIntent {
    /// Position in the global publish order, starting at 0
    pub sequence: u64,
    pub intent: WriteIntent,
}

/// Records every published intent in memory, in publish order.
#[derive(Debug, Default)]
pub struct InMemoryChannels {
    published: Mutex<Vec<PublishedIntent>>,
}

impl InMemoryChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// All intents published so far, in publish order.
    pub fn published(&self) -> Vec<PublishedIntent> {
        self.published.lock().clone()
    }

    /// Intents published to a single channel, in publish order.
    pub fn channel(&self, name: &str) -> Vec<PublishedIntent> {
        self.published
            .lock()
            .iter()
            .filter(|p| p.intent.channel() == name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

#[async_trait]
impl IntentPublisher for InMemoryChannels {
    async fn publish(&self, intent: WriteIntent) -> Result<()> {
        let mut published = self.published.lock();
        let sequence = published.len() as u64;
        counter!(INTENTS_PUBLISHED, "channel" => intent.channel()).increment(1);
        published.push(PublishedIntent { sequence, intent });
        Ok(())
    }
}

/// Bounded in-process queues, one per resource. The receiving halves are
/// handed to the delivery workers.
pub struct QueuePublisher {
    senders: HashMap<ResourceKind, mpsc::Sender<WriteIntent>>,
}

impl QueuePublisher {
    pub fn new(capacity: usize) -> (Self, HashMap<ResourceKind, mpsc::Receiver<WriteIntent>>) {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();

        for kind in ResourceKind::ALL {
            let (tx, rx) = mpsc::channel(capacity);
            senders.insert(kind, tx);
            receivers.insert(kind, rx);
        }

        (Self { senders }, receivers)
    }
}

#[async_trait]
impl IntentPublisher for QueuePublisher {
    async fn publish(&self, intent: WriteIntent) -> Result<()> {
        let channel = intent.channel();
        let sender = self.senders.get(&intent.resource).ok_or_else(|| {
            CompositeError::EnqueueFailed(format!("no channel configured for {channel}"))
        })?;

        sender.try_send(intent).map_err(|e| match e {
            TrySendError::Full(_) => CompositeError::EnqueueFailed(format!("{channel} is full")),
            TrySendError::Closed(_) => {
                CompositeError::EnqueueFailed(format!("{channel} is closed"))
            }
        })?;

        counter!(INTENTS_PUBLISHED, "channel" => channel).increment(1);
        Ok(())
    }
}
