use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{info, warn};
use reconciler::{HubApi, SelfHealer, TargetRef, TargetStatus};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct TargetEntry {
    target: TargetRef,
    status: TargetStatus,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn error_response(code: StatusCode, message: String) -> Response {
    (code, Json(ErrorBody { message })).into_response()
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn targets_handler<H: HubApi + 'static>(
    State(healer): State<Arc<SelfHealer<H>>>,
) -> Response {
    let entries: Vec<TargetEntry> = healer
        .statuses()
        .await
        .into_iter()
        .map(|(target, status)| TargetEntry { target, status })
        .collect();
    Json(entries).into_response()
}

async fn bundle_handler<H: HubApi + 'static>(
    State(healer): State<Arc<SelfHealer<H>>>,
    Path(cluster): Path<String>,
) -> Response {
    let target = TargetRef::new(cluster, &healer.settings().addon_name);
    match healer.live_bundle(&target).await {
        Ok(Some(work)) => Json(work).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("no bundle for {}", target),
        ),
        Err(e) => {
            warn!("Failed to read the bundle for {}: {}", target, e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn status_handler<H: HubApi + 'static>(
    State(healer): State<Arc<SelfHealer<H>>>,
    Path(cluster): Path<String>,
) -> Response {
    let target = TargetRef::new(cluster, &healer.settings().addon_name);
    match healer.status(&target).await {
        Some(status) => Json(status).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("{} has not been reconciled yet", target),
        ),
    }
}

pub fn create_status_router<H: HubApi + 'static>(healer: Arc<SelfHealer<H>>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/targets", get(targets_handler::<H>))
        .route("/targets/{cluster}/bundle", get(bundle_handler::<H>))
        .route("/targets/{cluster}/status", get(status_handler::<H>))
        .with_state(healer)
}

pub async fn start_status_server<H: HubApi + 'static>(
    healer: Arc<SelfHealer<H>>,
    port: u16,
) -> anyhow::Result<()> {
    let app = create_status_router(healer);
    let addr = format!("0.0.0.0:{}", port);

    info!("Starting status server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
