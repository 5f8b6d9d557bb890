//! Consumers of the outbound write channels.
//!
//! One worker per resource drains its channel in order and applies each
//! intent to the owning record service. Failures never travel back to the
//! request that produced the intent.

const BASE_DELAY: u64 = 500;
const MAX_DELAY: u64 = 30_000;

use crate::channels::{Operation, WriteIntent};
use crate::clients::WriteTarget;
use crate::errors::CompositeError;
use crate::metrics_defs::INTENT_DELIVERY_FAILED;
use crate::types::ResourceKind;
use shared::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Duration, sleep};

/// Spawns a worker for every channel that has a matching target. Workers
/// exit once all senders of their channel are dropped and the backlog is
/// drained.
pub fn spawn_workers(
    receivers: HashMap<ResourceKind, mpsc::Receiver<WriteIntent>>,
    targets: &HashMap<ResourceKind, Arc<dyn WriteTarget>>,
    delivery_retries: u32,
) -> JoinSet<()> {
    let mut join_set = JoinSet::new();

    for (kind, receiver) in receivers {
        let Some(target) = targets.get(&kind).cloned() else {
            tracing::error!(resource = %kind, "No delivery target, channel left unconsumed");
            continue;
        };
        join_set.spawn(run_worker(kind, receiver, target, delivery_retries));
    }

    join_set
}

async fn run_worker(
    kind: ResourceKind,
    mut receiver: mpsc::Receiver<WriteIntent>,
    target: Arc<dyn WriteTarget>,
    delivery_retries: u32,
) {
    tracing::info!(channel = kind.channel(), "Delivery worker started");
    while let Some(intent) = receiver.recv().await {
        deliver(target.as_ref(), &intent, delivery_retries).await;
    }
    tracing::info!(channel = kind.channel(), "Delivery worker stopped");
}

/// Applies one intent, retrying transient failures with exponential backoff.
/// Returns whether the intent was applied.
pub async fn deliver(
    target: &dyn WriteTarget,
    intent: &WriteIntent,
    delivery_retries: u32,
) -> bool {
    let mut retries = 0;

    loop {
        match target.apply(intent).await {
            Ok(()) => {
                tracing::debug!(channel = intent.channel(), key = intent.key, "Intent applied");
                return true;
            }
            // Nothing left to delete
            Err(CompositeError::NotFound(_)) if intent.operation == Operation::Delete => {
                return true;
            }
            Err(e) if e.is_retryable() && retries < delivery_retries => {
                let retry_millis = backoff_millis(retries);
                tracing::debug!(
                    channel = intent.channel(),
                    key = intent.key,
                    retries,
                    error = %e,
                    "Delivery failed, backing off"
                );
                sleep(Duration::from_millis(retry_millis)).await;
                retries += 1;
            }
            Err(e) => {
                tracing::error!(
                    channel = intent.channel(),
                    key = intent.key,
                    operation = ?intent.operation,
                    error = %e,
                    "Dropping write intent"
                );
                counter!(INTENT_DELIVERY_FAILED, "channel" => intent.channel()).increment(1);
                return false;
            }
        }
    }
}

/// Delay before retry number `retries + 1`, doubling from `BASE_DELAY` up to
/// `MAX_DELAY`.
fn backoff_millis(retries: u32) -> u64 {
    2_u64
        .checked_pow(retries)
        .map_or(MAX_DELAY, |factor| BASE_DELAY.saturating_mul(factor))
        .min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{IntentPublisher, Payload, QueuePublisher};
    use crate::errors::Result;
    use crate::testutils::post;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Records applied intents after failing a scripted number of times.
    #[derive(Default)]
    struct FlakyTarget {
        failures: Mutex<VecDeque<CompositeError>>,
        attempts: Mutex<Vec<tokio::time::Instant>>,
        applied: Mutex<Vec<(Operation, i64)>>,
    }

    impl FlakyTarget {
        fn failing(failures: Vec<CompositeError>) -> Self {
            Self {
                failures: Mutex::new(failures.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl WriteTarget for FlakyTarget {
        async fn apply(&self, intent: &WriteIntent) -> Result<()> {
            self.attempts.lock().push(tokio::time::Instant::now());
            let failure = self.failures.lock().pop_front();
            match failure {
                Some(e) => Err(e),
                None => {
                    self.applied.lock().push((intent.operation, intent.key));
                    Ok(())
                }
            }
        }
    }

    fn unavailable() -> CompositeError {
        CompositeError::DependencyUnavailable("connection refused".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_then_success() {
        let target = FlakyTarget::failing(vec![unavailable(), unavailable()]);
        let intent = WriteIntent::create(Payload::Post(post(1)));

        assert!(deliver(&target, &intent, 3).await);

        let attempts = target.attempts.lock().clone();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[1] - attempts[0], Duration::from_millis(500));
        assert_eq!(attempts[2] - attempts[1], Duration::from_millis(1000));
        assert_eq!(*target.applied.lock(), vec![(Operation::Create, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retries() {
        let target = FlakyTarget::failing(vec![unavailable(); 5]);
        let intent = WriteIntent::delete(ResourceKind::Comment, 2);

        assert!(!deliver(&target, &intent, 2).await);
        assert_eq!(target.attempts.lock().len(), 3);
        assert!(target.applied.lock().is_empty());
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_millis(0), 500);
        assert_eq!(backoff_millis(5), 16_000);
        assert_eq!(backoff_millis(6), MAX_DELAY);
        assert_eq!(backoff_millis(55), MAX_DELAY);
        assert_eq!(backoff_millis(u32::MAX), MAX_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_retries_wait_at_most_max_delay() {
        let target = FlakyTarget::failing(vec![unavailable(); 70]);
        let intent = WriteIntent::delete(ResourceKind::Reaction, 3);

        assert!(!deliver(&target, &intent, 64).await);

        let attempts = target.attempts.lock().clone();
        assert_eq!(attempts.len(), 65);
        let longest = attempts.windows(2).map(|w| w[1] - w[0]).max().unwrap();
        assert_eq!(longest, Duration::from_millis(MAX_DELAY));
    }

    #[tokio::test]
    async fn test_rejected_intent_is_not_retried() {
        let target = FlakyTarget::failing(vec![CompositeError::InvalidInput("bad".into())]);
        let intent = WriteIntent::create(Payload::Post(post(1)));

        assert!(!deliver(&target, &intent, 3).await);
        assert_eq!(target.attempts.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_missing_record_succeeds() {
        let target = FlakyTarget::failing(vec![CompositeError::NotFound("gone".into())]);
        let intent = WriteIntent::delete(ResourceKind::Post, 4);

        assert!(deliver(&target, &intent, 3).await);
        assert_eq!(target.attempts.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_workers_drain_channels_in_order() {
        let (publisher, receivers) = QueuePublisher::new(16);
        let posts = Arc::new(FlakyTarget::default());
        let images = Arc::new(FlakyTarget::default());

        let mut targets: HashMap<ResourceKind, Arc<dyn WriteTarget>> = HashMap::new();
        targets.insert(ResourceKind::Post, posts.clone());
        targets.insert(ResourceKind::Image, images.clone());
        let mut workers = spawn_workers(receivers, &targets, 0);
        // Reaction and comment channels have no target
        assert_eq!(workers.len(), 2);

        publisher
            .publish(WriteIntent::create(Payload::Post(post(1))))
            .await
            .unwrap();
        publisher
            .publish(WriteIntent::delete(ResourceKind::Post, 1))
            .await
            .unwrap();
        publisher
            .publish(WriteIntent::delete(ResourceKind::Image, 1))
            .await
            .unwrap();

        // Closing the channels lets the workers finish their backlog and exit
        drop(publisher);
        while let Some(result) = workers.join_next().await {
            result.unwrap();
        }

        assert_eq!(
            *posts.applied.lock(),
            vec![(Operation::Create, 1), (Operation::Delete, 1)]
        );
        assert_eq!(*images.applied.lock(), vec![(Operation::Delete, 1)]);
    }
}
