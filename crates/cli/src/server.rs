//! HTTP front door
//!
//! `POST /produce` enqueues one record on the producer topic and answers
//! before the broker acknowledges it. Delivery results are only logged.

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{ContractError, RecordMetadata, RecordPublisher};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::CliError;

#[derive(Clone)]
pub struct AppState {
    publisher: Arc<dyn RecordPublisher>,
}

/// Body of a produce request
#[derive(Debug, Deserialize)]
pub struct ProduceRequest {
    pub key: String,
    pub message: String,
}

pub fn router(publisher: Arc<dyn RecordPublisher>) -> Router {
    Router::new()
        .route("/produce", post(produce))
        .route("/_liveness", get(liveness))
        .with_state(AppState { publisher })
}

/// Serve `router` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), CliError> {
    let addr = listener
        .local_addr()
        .map_err(|e| CliError::server(e.to_string()))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| CliError::server(e.to_string()))
}

async fn liveness() -> &'static str {
    "ok"
}

async fn produce(
    State(state): State<AppState>,
    payload: Result<Json<ProduceRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            debug!(error = %rejection, "Rejected produce request");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid input" })),
            );
        }
    };

    let published = state.publisher.publish(
        request.key.as_bytes(),
        request.message.as_bytes(),
        Box::new(report_delivery),
    );

    match published {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "message": "Message produced successfully!" })),
        ),
        Err(e) => {
            error!(error = %e, "Failed to enqueue record");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

fn report_delivery(result: Result<RecordMetadata, ContractError>) {
    match result {
        Ok(meta) => {
            info!(
                topic = %meta.topic,
                partition = meta.partition,
                offset = meta.offset,
                "Record produced"
            );
            observability::record_produce(true);
        }
        Err(e) => {
            warn!(error = %e, "Record had a produce error");
            observability::record_produce(false);
        }
    }
}
