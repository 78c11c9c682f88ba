//! Render and cancel endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use listcast_core::{CancelReason, JobOutcome, JobReport, RenderRequest};
use listcast_scheduler::CancelOutcome;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/render", post(render))
        .route("/cancel", post(cancel))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderResponse {
    ok: bool,
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_url: Option<String>,
    listing_id: u64,
    variant: String,
}

/// Run a render and hold the request open until it finishes.
///
/// If the client goes away first, this future is dropped, which drops the
/// render session and cancels the job.
async fn render(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let orchestrator = &state.orchestrator;

    // Reject early so a busy server does not bother validating.
    if orchestrator.is_busy() {
        return Err(ApiError::Busy);
    }

    let body = parse_body(&body)?;
    let request = RenderRequest::from_json(&body, orchestrator.default_variant())?;

    let session = orchestrator.submit(request).await?;
    let report = session.wait().await?;
    report_response(report)
}

fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

fn report_response(report: JobReport) -> Result<Response, ApiError> {
    let listing_id = report.listing_id.get();
    let variant = report.variant.to_string();

    match report.outcome {
        JobOutcome::Succeeded {
            output,
            external_url,
        } => Ok(Json(RenderResponse {
            ok: true,
            output,
            external_url,
            listing_id,
            variant,
        })
        .into_response()),
        JobOutcome::Failed { exit_code, logs } => Err(ApiError::PipelineFailed {
            code: exit_code,
            logs,
        }),
        JobOutcome::TimedOut => Err(ApiError::Timeout),
        JobOutcome::Cancelled {
            reason: CancelReason::Requested,
        } => Ok(Json(json!({
            "ok": true,
            "cancelled": true,
            "listingId": listing_id,
            "variant": variant
        }))
        .into_response()),
        JobOutcome::Cancelled { reason } => {
            warn!(job_id = %report.job_id, %reason, "Render cancelled while a client was still waiting");
            Err(ApiError::Internal(format!("render cancelled ({reason})")))
        }
    }
}

async fn cancel(State(state): State<AppState>) -> Json<Value> {
    match state.orchestrator.cancel().await {
        CancelOutcome::Cancelled => Json(json!({ "ok": true, "cancelled": true })),
        CancelOutcome::NoActiveJob => {
            Json(json!({ "ok": true, "cancelled": false, "message": "No active job" }))
        }
        CancelOutcome::AlreadyFinished => Json(json!({
            "ok": true,
            "cancelled": false,
            "message": "Job already finished"
        })),
    }
}
