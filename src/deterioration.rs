//! Health deterioration scoring.
//!
//! The score starts at 0 and accumulates points from five independent signal
//! groups. Every group is evaluated (no early exit) and the sum is capped at
//! 100:
//!
//! | Group        | Ceiling | Source                                      |
//! |--------------|---------|---------------------------------------------|
//! | Adherence    | 30      | dose-check events, last 30 days             |
//! | Appointments | 20      | missed appointments, last 90 days           |
//! | Vitals       | 50      | most recent sample (or its absence)         |
//! | Labs         | 15      | clinician analyses, once 2+ reports exist   |
//! | Discharge    | 10      | days since discharge                        |

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

use crate::error::{AnalyticsError, DataQualityIssue, require_patient_id};
use crate::model::{
    AdherenceEvent, AppointmentRecord, AppointmentStatus, DeteriorationResult,
    DoctorAnalysisRecord, Factor, FactorCategory, LabReportRecord, PatientRecord, RiskLevel,
    VitalsSample,
};
use crate::storage::Storage;

const ADHERENCE_WINDOW_DAYS: i64 = 30;
const APPOINTMENT_WINDOW_DAYS: i64 = 90;

/// Heart rates outside this band (inclusive) are abnormal.
const HEART_RATE_NORMAL: (f64, f64) = (50.0, 110.0);
const OXYGEN_SATURATION_FLOOR: f64 = 92.0;
const VITALS_STALE_DAYS: i64 = 7;

/// Keywords in a clinician analysis that mark a lab result as concerning.
const CONCERN_KEYWORDS: &[&str] = &["abnormal", "concern", "elevated", "low"];

/// Everything the deterioration score reads for one patient.
#[derive(Debug, Clone, Default)]
pub struct DeteriorationInputs {
    pub patient: Option<PatientRecord>,

    /// Adherence events from the last 30 days.
    pub adherence: Vec<AdherenceEvent>,

    pub appointments: Vec<AppointmentRecord>,

    pub vitals: Vec<VitalsSample>,

    pub lab_reports: Vec<LabReportRecord>,

    pub analyses: Vec<DoctorAnalysisRecord>,

    /// Records the accessors excluded.
    pub data_quality: Vec<DataQualityIssue>,
}

impl DeteriorationInputs {
    /// Read the inputs for one patient from the store.
    pub async fn load(
        storage: &Storage,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, AnalyticsError> {
        let patient = storage.get_patient(patient_id).await?;
        let adherence = storage
            .get_adherence_events(patient_id, ADHERENCE_WINDOW_DAYS, now)
            .await?;
        let appointments = storage.get_appointments(patient_id).await?;
        let vitals = storage.get_vitals_samples(patient_id).await?;
        let lab_reports = storage.get_lab_reports(patient_id).await?;
        let analyses = storage.get_doctor_analyses(patient_id).await?;

        let mut data_quality = patient.issues;
        data_quality.extend(adherence.issues);
        data_quality.extend(appointments.issues);
        data_quality.extend(vitals.issues);
        data_quality.extend(lab_reports.issues);
        data_quality.extend(analyses.issues);

        Ok(Self {
            patient: patient.items.into_iter().next(),
            adherence: adherence.items,
            appointments: appointments.items,
            vitals: vitals.items,
            lab_reports: lab_reports.items,
            analyses: analyses.items,
            data_quality,
        })
    }
}

/// Compute the health deterioration score for a patient.
///
/// # Arguments
///
/// * `storage` - Record store
/// * `patient_id` - Patient to score
/// * `now` - Evaluation instant; every window derives from it
#[instrument(skip(storage))]
pub async fn compute_deterioration(
    storage: &Storage,
    patient_id: &str,
    now: DateTime<Utc>,
) -> Result<DeteriorationResult, AnalyticsError> {
    require_patient_id(patient_id)?;

    let inputs = DeteriorationInputs::load(storage, patient_id, now).await?;
    let result = score_deterioration(&inputs, now);

    info!(
        patient_id,
        score = result.score,
        level = result.level.label(),
        factors = result.factors.len(),
        "Deterioration computed"
    );

    Ok(result)
}

/// Score already-loaded inputs. Pure; `now` is the only clock.
pub fn score_deterioration(
    inputs: &DeteriorationInputs,
    now: DateTime<Utc>,
) -> DeteriorationResult {
    let mut factors = Vec::new();

    let adherence_rate = adherence_signal(&inputs.adherence, &mut factors);
    appointment_signal(&inputs.appointments, now, &mut factors);
    vitals_signal(&inputs.vitals, now, &mut factors);
    lab_signal(&inputs.lab_reports, &inputs.analyses, &mut factors);
    if let Some(patient) = &inputs.patient {
        discharge_signal(patient, now, &mut factors);
    }

    for factor in &factors {
        debug!(
            category = ?factor.category,
            weight = factor.weight,
            message = %factor.message,
            "Deterioration factor"
        );
    }

    let score = factors.iter().map(|f| f.weight).sum::<u32>().min(100);

    DeteriorationResult {
        score,
        level: RiskLevel::from_score(score),
        factors,
        adherence_rate,
        data_quality: inputs.data_quality.clone(),
        computed_at: now,
    }
}

fn push(
    factors: &mut Vec<Factor>,
    kind: RiskLevel,
    weight: u32,
    category: FactorCategory,
    message: String,
) {
    factors.push(Factor {
        kind,
        message,
        weight,
        category,
    });
}

/// Returns the adherence rate. No events means nothing was due: 100%, no factor.
fn adherence_signal(events: &[AdherenceEvent], factors: &mut Vec<Factor>) -> u32 {
    if events.is_empty() {
        return 100;
    }

    let taken = events.iter().filter(|e| e.medication_taken).count();
    let rate = (taken as f64 / events.len() as f64 * 100.0).round() as u32;

    let (kind, weight, message) = if rate < 50 {
        (
            RiskLevel::Critical,
            30,
            format!("Critical medication adherence: {rate}%"),
        )
    } else if rate < 70 {
        (
            RiskLevel::High,
            20,
            format!("Poor medication adherence: {rate}%"),
        )
    } else if rate < 90 {
        (
            RiskLevel::Medium,
            10,
            format!("Below target adherence: {rate}%"),
        )
    } else {
        return rate;
    };

    push(factors, kind, weight, FactorCategory::Adherence, message);
    rate
}

fn appointment_signal(
    appointments: &[AppointmentRecord],
    now: DateTime<Utc>,
    factors: &mut Vec<Factor>,
) {
    let cutoff = now - Duration::days(APPOINTMENT_WINDOW_DAYS);

    // Anything past its date and not completed counts, whatever its status.
    let missed = appointments
        .iter()
        .filter(|a| a.date >= cutoff)
        .filter(|a| {
            a.status == AppointmentStatus::Missed
                || (a.status != AppointmentStatus::Completed && a.date < now)
        })
        .count();

    let (kind, weight, message) = match missed {
        0 => return,
        1 => (RiskLevel::Low, 8, format!("{missed} missed appointment")),
        2 => (
            RiskLevel::Medium,
            15,
            format!("{missed} missed appointments recently"),
        ),
        _ => (
            RiskLevel::High,
            20,
            format!("{missed} missed appointments in last 90 days"),
        ),
    };

    push(factors, kind, weight, FactorCategory::Appointments, message);
}

fn vitals_signal(vitals: &[VitalsSample], now: DateTime<Utc>, factors: &mut Vec<Factor>) {
    let Some(latest) = VitalsSample::latest(vitals) else {
        push(
            factors,
            RiskLevel::High,
            15,
            FactorCategory::Vitals,
            "No vital signs data available".to_string(),
        );
        return;
    };

    // A stored zero means the device did not report that reading.
    if let Some(heart_rate) = latest.data.heart_rate.filter(|&hr| hr > 0.0) {
        let (min, max) = HEART_RATE_NORMAL;
        if heart_rate < min || heart_rate > max {
            push(
                factors,
                RiskLevel::Critical,
                15,
                FactorCategory::Vitals,
                format!("Abnormal heart rate: {heart_rate} bpm"),
            );
        }
    }

    if let Some(spo2) = latest.data.oxygen_saturation.filter(|&spo2| spo2 > 0.0) {
        if spo2 < OXYGEN_SATURATION_FLOOR {
            push(
                factors,
                RiskLevel::Critical,
                25,
                FactorCategory::Vitals,
                format!("Low oxygen saturation: {spo2}%"),
            );
        }
    }

    let days_since_sync = (now - latest.timestamp).num_days();
    if days_since_sync > VITALS_STALE_DAYS {
        push(
            factors,
            RiskLevel::Medium,
            10,
            FactorCategory::Vitals,
            format!("No health data sync in {days_since_sync} days"),
        );
    }
}

/// Flat bonus once: multiple concerning analyses do not stack.
fn lab_signal(
    reports: &[LabReportRecord],
    analyses: &[DoctorAnalysisRecord],
    factors: &mut Vec<Factor>,
) {
    if reports.len() < 2 {
        return;
    }

    let concerning = analyses.iter().any(|a| {
        let text = a.analysis_text.to_lowercase();
        CONCERN_KEYWORDS.iter().any(|keyword| text.contains(keyword))
    });

    if concerning {
        push(
            factors,
            RiskLevel::High,
            15,
            FactorCategory::Labs,
            "Concerning lab result patterns detected".to_string(),
        );
    }
}

fn discharge_signal(patient: &PatientRecord, now: DateTime<Utc>, factors: &mut Vec<Factor>) {
    let Some(discharged) = patient.discharge_date else {
        return;
    };

    let days = (now - discharged).num_days();
    if days <= 7 {
        push(
            factors,
            RiskLevel::Medium,
            10,
            FactorCategory::Discharge,
            format!("{days} days post-discharge (high-risk window)"),
        );
    } else if days <= 30 {
        push(
            factors,
            RiskLevel::Low,
            5,
            FactorCategory::Discharge,
            format!("{days} days post-discharge"),
        );
    }
}
