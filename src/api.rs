//! HTTP API handlers for riskpulse.
//!
//! Every handler evaluates at the moment the request arrives and returns the
//! serde form of the engine result. Engine errors map to status codes:
//!
//! - configuration (blank patient id) → `400 Bad Request`
//! - unknown patient → `404 Not Found`
//! - anything else → `500 Internal Server Error`
//!
//! A failed computation is logged and reported for that request only.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::aggregation::{
    RosterReport, RosterSummary, compute_combined_risk, compute_roster_risk,
};
use crate::deterioration::compute_deterioration;
use crate::engagement::compute_engagement;
use crate::error::AnalyticsError;
use crate::model::{CombinedRiskResult, DeteriorationResult, EngagementResult};
use crate::refresh::LatestRoster;
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,

    /// Last roster report, from the refresh task or `GET /roster`.
    pub latest_roster: LatestRoster,
}

impl AppState {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            latest_roster: LatestRoster::default(),
        }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/patients/:id/deterioration", get(get_deterioration))
        .route("/patients/:id/engagement", get(get_engagement))
        .route("/patients/:id/risk", get(get_combined_risk))
        .route("/roster", get(get_roster))
        .route("/roster/summary", get(get_roster_summary))
        .route("/roster/latest", get(get_latest_roster))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_status(error: &AnalyticsError) -> StatusCode {
    match error {
        AnalyticsError::Configuration(_) => StatusCode::BAD_REQUEST,
        AnalyticsError::UnknownPatient(_) => StatusCode::NOT_FOUND,
        AnalyticsError::DataAccess(_) | AnalyticsError::DataQuality(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /patients/:id/deterioration - Health deterioration score.
#[instrument(skip(state))]
pub async fn get_deterioration(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<DeteriorationResult>, StatusCode> {
    compute_deterioration(&state.storage, &patient_id, Utc::now())
        .await
        .map(Json)
        .map_err(|e| {
            warn!(patient_id = %patient_id, error = %e, "Failed to compute deterioration");
            error_status(&e)
        })
}

/// GET /patients/:id/engagement - Engagement momentum score.
#[instrument(skip(state))]
pub async fn get_engagement(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<EngagementResult>, StatusCode> {
    compute_engagement(&state.storage, &patient_id, Utc::now())
        .await
        .map(Json)
        .map_err(|e| {
            warn!(patient_id = %patient_id, error = %e, "Failed to compute engagement");
            error_status(&e)
        })
}

/// GET /patients/:id/risk - Combined risk with recommended actions.
///
/// Returns `404` when the patient is not in the store.
#[instrument(skip(state))]
pub async fn get_combined_risk(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<CombinedRiskResult>, StatusCode> {
    compute_combined_risk(&state.storage, &patient_id, Utc::now())
        .await
        .map(Json)
        .map_err(|e| {
            warn!(patient_id = %patient_id, error = %e, "Failed to compute combined risk");
            error_status(&e)
        })
}

/// GET /roster - Fresh roster report, highest combined risk first.
///
/// The report also replaces the cached one served by `/roster/latest`.
///
/// # Response
///
/// ```json
/// {
///     "computed_at": "2024-06-01T12:00:00Z",
///     "summary": { "total_patients": 2, "critical_count": 1, ... },
///     "entries": [ { "patient": { "id": "p7", ... }, "combined_score": 74, ... } ],
///     "failures": [ { "patient_id": "p3", "message": "..." } ]
/// }
/// ```
#[instrument(skip(state))]
pub async fn get_roster(
    State(state): State<AppState>,
) -> Result<Json<RosterReport>, StatusCode> {
    match compute_roster_risk(&state.storage, Utc::now()).await {
        Ok(report) => {
            info!(
                patients = report.summary.total_patients,
                failed = report.summary.failed_count,
                "Roster queried"
            );
            *state.latest_roster.write().await = Some(report.clone());
            Ok(Json(report))
        }
        Err(e) => {
            warn!(error = %e, "Failed to compute roster");
            Err(error_status(&e))
        }
    }
}

/// GET /roster/summary - Just the roster summary counts.
#[instrument(skip(state))]
pub async fn get_roster_summary(
    State(state): State<AppState>,
) -> Result<Json<RosterSummary>, StatusCode> {
    match compute_roster_risk(&state.storage, Utc::now()).await {
        Ok(report) => {
            info!(
                patients = report.summary.total_patients,
                critical_count = report.summary.critical_count,
                "Roster summary queried"
            );
            Ok(Json(report.summary))
        }
        Err(e) => {
            warn!(error = %e, "Failed to compute roster summary");
            Err(error_status(&e))
        }
    }
}

/// GET /roster/latest - Cached roster report.
///
/// Returns `503` until a report has been computed.
#[instrument(skip(state))]
pub async fn get_latest_roster(
    State(state): State<AppState>,
) -> Result<Json<RosterReport>, StatusCode> {
    state
        .latest_roster
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or_else(|| {
            warn!("No roster report computed yet");
            StatusCode::SERVICE_UNAVAILABLE
        })
}
