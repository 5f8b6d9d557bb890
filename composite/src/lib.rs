//! Composite service for posts.
//!
//! Reads assemble a post with its reactions, comments and images from four
//! independent record services. The post is critical and guarded by retry,
//! circuit breaker and timeout; the others fail open. Writes are split into
//! per-resource intents and delivered asynchronously.

pub mod aggregator;
pub mod api;
pub mod assembler;
pub mod channels;
pub mod clients;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod errors;
pub mod metrics_defs;
pub mod resilience;
pub mod types;

#[cfg(test)]
mod testutils;

use crate::aggregator::{Aggregator, Dependencies};
use crate::api::ApiError;
use crate::channels::QueuePublisher;
use crate::clients::{HttpRecordClient, WriteTarget};
use crate::config::Config;
use crate::dispatcher::WriteDispatcher;
use crate::errors::CompositeError;
use crate::resilience::ResiliencePolicy;
use crate::resilience::breaker::BreakerState;
use crate::types::ResourceKind;
use shared::admin_service::{AdminService, Readiness};
use shared::http::{bind, run_http_service};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("API server error: {0}")]
    ApiError(#[from] ApiError),
    #[error("could not create record service client: {0}")]
    ClientError(#[from] CompositeError),
}

/// Runs the aggregate API, the admin listener and the delivery workers until
/// `shutdown` resolves. Intents still queued at shutdown are delivered before
/// returning.
pub async fn run<F>(config: Config, shutdown: F) -> Result<(), RunError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let client =
        |kind| HttpRecordClient::new(kind, config.downstreams.get(kind)).map(Arc::new);
    let post = client(ResourceKind::Post)?;
    let reaction = client(ResourceKind::Reaction)?;
    let comment = client(ResourceKind::Comment)?;
    let image = client(ResourceKind::Image)?;

    let policy = Arc::new(ResiliencePolicy::new("post", &config.resilience));
    let dependencies = Dependencies {
        post: post.clone(),
        reactions: reaction.clone(),
        comments: comment.clone(),
        images: image.clone(),
    };
    let aggregator = Aggregator::new(dependencies, policy.clone(), config.service_address());

    let (publisher, receivers) = QueuePublisher::new(config.channels.capacity);
    let targets: HashMap<ResourceKind, Arc<dyn WriteTarget>> = HashMap::from([
        (ResourceKind::Post, post as Arc<dyn WriteTarget>),
        (ResourceKind::Reaction, reaction as Arc<dyn WriteTarget>),
        (ResourceKind::Comment, comment as Arc<dyn WriteTarget>),
        (ResourceKind::Image, image as Arc<dyn WriteTarget>),
    ]);
    let mut workers =
        delivery::spawn_workers(receivers, &targets, config.channels.delivery_retries);
    let dispatcher = WriteDispatcher::new(Arc::new(publisher));

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        shutdown.await;
        tracing::info!("Shutting down");
        let _ = shutdown_tx.send(());
    });

    let api_listener = bind(&config.listener.host, config.listener.port).await?;
    let admin_listener = bind(&config.admin_listener.host, config.admin_listener.port).await?;
    tracing::info!(
        listener = %api_listener.local_addr()?,
        admin_listener = %admin_listener.local_addr()?,
        "Composite service started"
    );

    let app = api::router(aggregator, dispatcher);
    let admin = AdminService::new(move || readiness(&policy));

    tokio::try_join!(
        async {
            api::serve(api_listener, app, wait_for(shutdown_rx.clone()))
                .await
                .map_err(RunError::from)
        },
        async {
            run_http_service(admin_listener, admin, wait_for(shutdown_rx.clone()))
                .await
                .map_err(RunError::from)
        },
    )?;

    // The API router owned the last publisher handle, so the channels are
    // closed now and the workers exit after draining them.
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            tracing::error!("Task panicked: {}", e);
        }
    }

    Ok(())
}

fn readiness(policy: &ResiliencePolicy) -> Readiness {
    match policy.breaker_state() {
        BreakerState::Open => Readiness::NotReady("post circuit breaker is open".into()),
        BreakerState::Closed | BreakerState::HalfOpen => Readiness::Ready,
    }
}

async fn wait_for(mut shutdown: watch::Receiver<()>) {
    // Also returns when the sender is gone
    let _ = shutdown.changed().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResilienceConfig;

    #[tokio::test(start_paused = true)]
    async fn test_readiness_follows_breaker() {
        let policy = ResiliencePolicy::new(
            "post",
            &ResilienceConfig {
                retry_attempts: 1,
                breaker_failure_threshold: 1,
                ..Default::default()
            },
        );
        assert_eq!(readiness(&policy), Readiness::Ready);

        let result: errors::Result<()> = policy
            .call(|| async {
                Err(CompositeError::DependencyUnavailable(
                    "connection refused".into(),
                ))
            })
            .await;
        assert!(result.is_err());
        assert!(matches!(readiness(&policy), Readiness::NotReady(_)));

        // Ready again once a probe may be let through
        tokio::time::advance(std::time::Duration::from_secs(10)).await;
        assert_eq!(readiness(&policy), Readiness::Ready);
    }
}
