use crate::assembler::assemble;
use crate::clients::{CriticalClient, FetchHints, OptionalClient};
use crate::errors::{CompositeError, Result};
use crate::metrics_defs::AGGREGATE_REQUEST_DURATION;
use crate::resilience::{ResiliencePolicy, fail_open};
use crate::types::{
    Comment, Image, PostAggregate, PostId, Reaction, SubRecord, validate_post_id,
};
use shared::histogram;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// The record services an aggregate is built from.
#[derive(Clone)]
pub struct Dependencies {
    pub post: Arc<dyn CriticalClient>,
    pub reactions: Arc<dyn OptionalClient<Reaction>>,
    pub comments: Arc<dyn OptionalClient<Comment>>,
    pub images: Arc<dyn OptionalClient<Image>>,
}

/// Reads a post and its sub-resources concurrently and assembles the result.
///
/// The post read goes through the resilience policy and decides the outcome.
/// The sub-resource reads fail open and can only ever make the aggregate
/// smaller.
#[derive(Clone)]
pub struct Aggregator {
    dependencies: Dependencies,
    policy: Arc<ResiliencePolicy>,
    service_address: String,
}

impl Aggregator {
    pub fn new(
        dependencies: Dependencies,
        policy: Arc<ResiliencePolicy>,
        service_address: String,
    ) -> Self {
        Self {
            dependencies,
            policy,
            service_address,
        }
    }

    pub fn policy(&self) -> &Arc<ResiliencePolicy> {
        &self.policy
    }

    pub async fn get_aggregate(&self, post_id: PostId, hints: FetchHints) -> Result<PostAggregate> {
        validate_post_id(post_id)?;
        let started = Instant::now();
        tracing::debug!(post_id, "Reading composite aggregate");

        let reactions = spawn_optional(self.dependencies.reactions.clone(), post_id);
        let comments = spawn_optional(self.dependencies.comments.clone(), post_id);
        let images = spawn_optional(self.dependencies.images.clone(), post_id);

        let post = self
            .policy
            .call(|| self.dependencies.post.fetch_one(post_id, hints));

        let (post, reactions, comments, images) =
            tokio::join!(post, settle(reactions), settle(comments), settle(images));

        let result = match post {
            Ok(post) => Ok(assemble(
                post,
                reactions,
                comments,
                images,
                &self.service_address,
            )),
            Err(CompositeError::Timeout(timeout)) => Err(CompositeError::DependencyUnavailable(
                format!("post service did not answer within {timeout:?}"),
            )),
            Err(e) => Err(e),
        };

        let outcome = if result.is_ok() { "success" } else { "failure" };
        histogram!(AGGREGATE_REQUEST_DURATION, "outcome" => outcome)
            .record(started.elapsed().as_secs_f64());

        result
    }
}

fn spawn_optional<T>(client: Arc<dyn OptionalClient<T>>, post_id: PostId) -> JoinHandle<Vec<T>>
where
    T: SubRecord + Send + 'static,
{
    tokio::spawn(async move { fail_open(T::KIND, client.fetch_many(post_id)).await })
}

async fn settle<T>(handle: JoinHandle<Vec<T>>) -> Vec<T> {
    match handle.await {
        Ok(records) => records,
        Err(e) => {
            tracing::error!("Task panicked: {}", e);
            Vec::new()
        }
    }
}
