use crate::aggregator::Aggregator;
use crate::clients::FetchHints;
use crate::dispatcher::WriteDispatcher;
use crate::errors::CompositeError;
use crate::types::{PostAggregate, PostId};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::future::Future;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    aggregator: Aggregator,
    dispatcher: WriteDispatcher,
}

pub fn router(aggregator: Aggregator, dispatcher: WriteDispatcher) -> Router {
    Router::new()
        .route("/aggregate", post(create_aggregate))
        .route(
            "/aggregate/{post_id}",
            get(get_aggregate).delete(delete_aggregate),
        )
        .with_state(AppState {
            aggregator,
            dispatcher,
        })
}

/// Serves the aggregate API until `shutdown` resolves, then lets in-flight
/// requests finish.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), ApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn create_aggregate(
    State(state): State<AppState>,
    Json(body): Json<PostAggregate>,
) -> Result<StatusCode, CompositeError> {
    state.dispatcher.create_aggregate(body).await?;
    Ok(StatusCode::OK)
}

async fn get_aggregate(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Query(hints): Query<FetchHints>,
) -> Result<Json<PostAggregate>, CompositeError> {
    state
        .aggregator
        .get_aggregate(post_id, hints)
        .await
        .map(Json)
}

async fn delete_aggregate(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
) -> Result<StatusCode, CompositeError> {
    state.dispatcher.delete_aggregate(post_id).await?;
    Ok(StatusCode::OK)
}

#[derive(Serialize)]
struct ApiErrorResponse {
    message: String,
}

impl IntoResponse for CompositeError {
    fn into_response(self) -> Response {
        let status = match self {
            CompositeError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CompositeError::NotFound(_) => StatusCode::NOT_FOUND,
            CompositeError::DependencyUnavailable(_) | CompositeError::EnqueueFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CompositeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };

        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "Aggregate request failed");
        }

        let body = Json(ApiErrorResponse {
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}
