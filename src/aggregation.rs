//! Combined risk for one patient and for the whole roster.
//!
//! The combined score blends deterioration with inverted engagement:
//!
//! ```text
//! combined = round(deterioration * 0.6 + (100 - engagement) * 0.4)
//! ```
//!
//! Roster mode scores every patient in its own task. A patient whose
//! computation fails is reported in [`RosterReport::failures`] and the rest of
//! the roster is still returned.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::deterioration::compute_deterioration;
use crate::engagement::compute_engagement;
use crate::error::{AnalyticsError, require_patient_id};
use crate::model::{
    CombinedRiskResult, DeteriorationResult, DisengagementRisk, EngagementResult, PatientRecord,
    RiskLevel,
};
use crate::recommendations::generate_recommendations;
use crate::storage::Storage;

const DETERIORATION_WEIGHT: f64 = 0.6;
const DISENGAGEMENT_WEIGHT: f64 = 0.4;

/// Blend a deterioration score with an engagement score.
pub fn combine_scores(deterioration: u32, engagement: u32) -> u32 {
    let disengagement = 100u32.saturating_sub(engagement);
    let blended = f64::from(deterioration) * DETERIORATION_WEIGHT
        + f64::from(disengagement) * DISENGAGEMENT_WEIGHT;
    blended.round() as u32
}

/// Assemble a combined result from the two component scores.
pub fn combine_results(
    patient: PatientRecord,
    deterioration: DeteriorationResult,
    engagement: EngagementResult,
    now: DateTime<Utc>,
) -> CombinedRiskResult {
    let combined_score = combine_scores(deterioration.score, engagement.score);
    let recommended_actions = generate_recommendations(&deterioration, &engagement, &patient);

    CombinedRiskResult {
        patient,
        deterioration,
        engagement,
        combined_score,
        combined_level: RiskLevel::from_score(combined_score),
        recommended_actions,
        computed_at: now,
    }
}

/// Compute the combined risk for a single patient.
///
/// # Arguments
///
/// * `storage` - Record store
/// * `patient_id` - Patient to assess; must exist in the store
/// * `now` - Evaluation instant shared by both component scores
#[instrument(skip(storage))]
pub async fn compute_combined_risk(
    storage: &Storage,
    patient_id: &str,
    now: DateTime<Utc>,
) -> Result<CombinedRiskResult, AnalyticsError> {
    require_patient_id(patient_id)?;

    let patient = storage
        .get_patient(patient_id)
        .await?
        .items
        .into_iter()
        .next()
        .ok_or_else(|| AnalyticsError::UnknownPatient(patient_id.to_string()))?;

    let result = assess_patient(storage, patient, now).await?;

    info!(
        patient_id,
        combined_score = result.combined_score,
        level = result.combined_level.label(),
        actions = result.recommended_actions.len(),
        "Combined risk computed"
    );

    Ok(result)
}

async fn assess_patient(
    storage: &Storage,
    patient: PatientRecord,
    now: DateTime<Utc>,
) -> Result<CombinedRiskResult, AnalyticsError> {
    let deterioration = compute_deterioration(storage, &patient.id, now).await?;
    let engagement = compute_engagement(storage, &patient.id, now).await?;

    Ok(combine_results(patient, deterioration, engagement, now))
}

/// A patient whose analytics could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterFailure {
    pub patient_id: String,
    pub message: String,
}

/// Headline counts for a roster report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RosterSummary {
    /// Patients with a result.
    pub total_patients: usize,

    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,

    /// Patients whose analytics are unavailable.
    pub failed_count: usize,

    /// Patients predicted to disengage within weeks.
    pub imminent_disengagement_count: usize,
}

impl RosterSummary {
    /// Count results by combined level.
    pub fn from_results(results: &[CombinedRiskResult], failed_count: usize) -> Self {
        let mut summary = Self {
            total_patients: results.len(),
            failed_count,
            ..Self::default()
        };

        for result in results {
            match result.combined_level {
                RiskLevel::Critical => summary.critical_count += 1,
                RiskLevel::High => summary.high_count += 1,
                RiskLevel::Medium => summary.medium_count += 1,
                RiskLevel::Low => summary.low_count += 1,
            }

            if result.engagement.prediction.risk == DisengagementRisk::Imminent {
                summary.imminent_disengagement_count += 1;
            }
        }

        summary
    }
}

/// Combined risk for every patient on the roster.
#[derive(Debug, Clone, Serialize)]
pub struct RosterReport {
    pub computed_at: DateTime<Utc>,

    pub summary: RosterSummary,

    /// Highest combined score first; ties keep roster order.
    pub entries: Vec<CombinedRiskResult>,

    pub failures: Vec<RosterFailure>,
}

/// Compute combined risk for every patient on the roster.
///
/// Only a failure to read the roster itself is returned as an error.
#[instrument(skip(storage))]
pub async fn compute_roster_risk(
    storage: &Storage,
    now: DateTime<Utc>,
) -> Result<RosterReport, AnalyticsError> {
    let roster = storage.get_patient_roster().await?;

    let mut failures: Vec<RosterFailure> = roster
        .issues
        .into_iter()
        .map(|issue| RosterFailure {
            patient_id: issue.record_id.clone(),
            message: AnalyticsError::DataQuality(issue).to_string(),
        })
        .collect();

    let tasks: Vec<_> = roster
        .items
        .into_iter()
        .map(|patient| {
            let storage = storage.clone();
            let patient_id = patient.id.clone();
            let handle =
                tokio::spawn(async move { assess_patient(&storage, patient, now).await });
            (patient_id, handle)
        })
        .collect();

    let mut entries = Vec::with_capacity(tasks.len());
    for (patient_id, handle) in tasks {
        match handle.await {
            Ok(Ok(result)) => entries.push(result),
            Ok(Err(e)) => {
                warn!(patient_id = %patient_id, error = %e, "Patient analytics unavailable");
                failures.push(RosterFailure {
                    patient_id,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!(patient_id = %patient_id, error = %e, "Patient scoring task failed");
                failures.push(RosterFailure {
                    patient_id,
                    message: format!("Scoring task failed: {e}"),
                });
            }
        }
    }

    rank_by_combined_score(&mut entries);

    let summary = RosterSummary::from_results(&entries, failures.len());

    info!(
        patients = summary.total_patients,
        failed = summary.failed_count,
        critical = summary.critical_count,
        "Roster risk computed"
    );

    Ok(RosterReport {
        computed_at: now,
        summary,
        entries,
        failures,
    })
}

/// Sort highest combined score first. `sort_by` is stable, so ties keep
/// their roster order.
fn rank_by_combined_score(entries: &mut [CombinedRiskResult]) {
    entries.sort_by(|a, b| b.combined_score.cmp(&a.combined_score));
}
