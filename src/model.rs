//! Data models for riskpulse.
//!
//! Two families of types live here:
//!
//! - **Records**: immutable per-call snapshots read from the record store
//!   (patients, adherence events, appointments, vitals, labs, messages,
//!   sessions, reminders). The engine never mutates them.
//! - **Results**: the scores, factors, alerts, trends, predictions and
//!   recommendations the engine derives from those records.
//!
//! Every classification that used to be a free-form string is a closed enum,
//! serialized in lowercase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataQualityIssue;

// ============================================================================
// Records
// ============================================================================

/// A patient on the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Stable patient identifier used by every other collection.
    pub id: String,

    /// Display name.
    pub name: String,

    /// When the patient was discharged, if they were.
    pub discharge_date: Option<DateTime<Utc>>,
}

/// One expected dose-check, logged by the patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdherenceEvent {
    pub patient_id: String,
    pub timestamp: DateTime<Utc>,
    pub medication_taken: bool,
}

/// Lifecycle state of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Missed,
    Cancelled,
    /// Any status the store knows about that the engine does not.
    Other,
}

impl AppointmentStatus {
    /// Parse the stored status string. Unknown values map to `Other`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" => AppointmentStatus::Scheduled,
            "completed" => AppointmentStatus::Completed,
            "missed" => AppointmentStatus::Missed,
            "cancelled" | "canceled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Missed => "missed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub patient_id: String,
    pub date: DateTime<Utc>,
    pub status: AppointmentStatus,
}

/// Measurements carried by one vitals sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalsData {
    /// Beats per minute.
    pub heart_rate: Option<f64>,

    /// SpO2 percentage.
    pub oxygen_saturation: Option<f64>,
}

/// One vitals sync from a patient device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsSample {
    pub patient_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: VitalsData,
}

impl VitalsSample {
    /// The most recent sample; the first one wins on equal timestamps.
    pub fn latest(samples: &[VitalsSample]) -> Option<&VitalsSample> {
        samples
            .iter()
            .reduce(|best, s| if s.timestamp > best.timestamp { s } else { best })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabReportRecord {
    pub patient_id: String,
    pub timestamp: DateTime<Utc>,
    pub title: String,
}

/// A clinician's free-text reading of a lab report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorAnalysisRecord {
    pub patient_id: String,
    pub analysis_text: String,
}

/// A message in the patient's conversation thread, sent by either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub patient_id: String,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
}

/// One portal login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A daily medication reminder. Each active reminder expects one log per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub patient_id: String,
    pub active: bool,
}

// ============================================================================
// Deterioration
// ============================================================================

/// Four-step risk scale shared by factors, deterioration, and combined risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a 0-100 score.
    ///
    /// # Thresholds
    ///
    /// - `critical`: score >= 70
    /// - `high`: 50 <= score < 70
    /// - `medium`: 30 <= score < 50
    /// - `low`: score < 30
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            RiskLevel::Critical
        } else if score >= 50 {
            RiskLevel::High
        } else if score >= 30 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Signal group a deterioration factor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorCategory {
    Adherence,
    Appointments,
    Vitals,
    Labs,
    Discharge,
}

/// One contribution to the deterioration score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Factor {
    #[serde(rename = "type")]
    pub kind: RiskLevel,
    pub message: String,
    /// Points added to the score.
    pub weight: u32,
    pub category: FactorCategory,
}

/// Health deterioration score for one patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeteriorationResult {
    /// Accumulated score, 0-100.
    pub score: u32,

    pub level: RiskLevel,

    /// Contributing factors in evaluation order.
    pub factors: Vec<Factor>,

    /// Percentage of doses taken over the last 30 days (100 with no events).
    pub adherence_rate: u32,

    /// Records excluded from the inputs.
    pub data_quality: Vec<DataQualityIssue>,

    /// The evaluation instant.
    pub computed_at: DateTime<Utc>,
}

// ============================================================================
// Engagement
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Critical,
    Declining,
    Good,
    Excellent,
}

impl EngagementLevel {
    /// Bucket a 0-100 engagement score: >=80 excellent, >=60 good,
    /// >=40 declining, else critical.
    pub fn from_score(score: u32) -> Self {
        if score >= 80 {
            EngagementLevel::Excellent
        } else if score >= 60 {
            EngagementLevel::Good
        } else if score >= 40 {
            EngagementLevel::Declining
        } else {
            EngagementLevel::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Medium,
    High,
    Critical,
}

/// What an engagement alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    NoCommunication,
    CommunicationDrop,
    VeryLowPortalActivity,
    LowPortalActivity,
    DisengagementSpiral,
    SyncStopped,
    IrregularSync,
    SyncDropping,
    NoSync,
    SevereLoggingGaps,
    LoggingInconsistency,
    LoggingDeteriorating,
    RapidDisengagement,
}

impl AlertKind {
    /// Alerts about the patient's messaging activity.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            AlertKind::NoCommunication | AlertKind::CommunicationDrop
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub message: String,
}

/// Direction of a week-over-week comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Stable,
    Declining,
    Worsening,
    Unknown,
}

impl Trend {
    pub fn is_negative(&self) -> bool {
        matches!(self, Trend::Declining | Trend::Worsening)
    }
}

/// The engagement signals that produce trend entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementMetric {
    MessageActivity,
    PortalActivity,
    HealthTracking,
    MedicationTracking,
}

impl EngagementMetric {
    pub fn label(&self) -> &'static str {
        match self {
            EngagementMetric::MessageActivity => "Message Activity",
            EngagementMetric::PortalActivity => "Portal Activity",
            EngagementMetric::HealthTracking => "Health Tracking",
            EngagementMetric::MedicationTracking => "Medication Tracking",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendMetric {
    pub metric: EngagementMetric,
    /// Normalized activity for the metric, roughly 0-100.
    pub score: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisengagementRisk {
    Low,
    Likely,
    Imminent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub risk: DisengagementRisk,
    pub timeframe: String,
    /// 0-100.
    pub confidence: u32,
}

/// Engagement momentum score for one patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementResult {
    /// 100 minus penalties, floored at 0.
    pub score: u32,

    pub level: EngagementLevel,

    /// Alerts in evaluation order; a rapid-disengagement alert is always first.
    pub alerts: Vec<Alert>,

    pub trend_data: Vec<TrendMetric>,

    pub prediction: Prediction,

    pub data_quality: Vec<DataQualityIssue>,

    pub computed_at: DateTime<Utc>,
}

// ============================================================================
// Recommendations and combined risk
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationCategory {
    Clinical,
    Engagement,
    Intervention,
    Adherence,
    Appointments,
    Vitals,
    Communication,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub action: String,
    pub reason: String,
    pub category: RecommendationCategory,
}

/// Deterioration and engagement blended into one ranking score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedRiskResult {
    pub patient: PatientRecord,
    pub deterioration: DeteriorationResult,
    pub engagement: EngagementResult,
    /// `round(deterioration * 0.6 + (100 - engagement) * 0.4)`.
    pub combined_score: u32,
    pub combined_level: RiskLevel,
    pub recommended_actions: Vec<Recommendation>,
    pub computed_at: DateTime<Utc>,
}
