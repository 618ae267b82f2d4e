//! Engagement momentum scoring and disengagement prediction.
//!
//! Momentum starts at 100 and loses points across four cadence signals, each
//! comparing the most recent 7 days against the 7 days before:
//!
//! - **Messaging**: is the patient talking to their care team at all, and is
//!   the thread slowing down?
//! - **Portal logins**: how often, and is it falling off a cliff?
//! - **Vitals sync**: how stale is the latest sample, and is sync volume
//!   dropping?
//! - **Medication logging**: logs versus what active reminders expect.
//!
//! Each signal records a [`TrendMetric`]. When momentum is already below 40
//! and three or more trends point down, a rapid-disengagement alert is put at
//! the head of the alert list.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::error::{AnalyticsError, DataQualityIssue, require_patient_id};
use crate::model::{
    AdherenceEvent, Alert, AlertKind, AlertSeverity, DisengagementRisk, EngagementLevel,
    EngagementMetric, EngagementResult, MessageRecord, Prediction, ReminderRecord, SessionRecord,
    Trend, TrendMetric, VitalsSample,
};
use crate::storage::Storage;

/// Two comparison weeks.
const LOOKBACK_DAYS: i64 = 14;
const WEEK_DAYS: i64 = 7;

/// Everything the engagement score reads for one patient.
#[derive(Debug, Clone, Default)]
pub struct EngagementInputs {
    pub patient_id: String,

    /// Conversation messages from the last 14 days, either direction.
    pub messages: Vec<MessageRecord>,

    /// Portal logins from the last 14 days.
    pub sessions: Vec<SessionRecord>,

    pub vitals: Vec<VitalsSample>,

    /// Medication logs from the last 14 days.
    pub adherence: Vec<AdherenceEvent>,

    pub reminders: Vec<ReminderRecord>,

    pub data_quality: Vec<DataQualityIssue>,
}

impl EngagementInputs {
    pub async fn load(
        storage: &Storage,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, AnalyticsError> {
        let messages = storage.get_messages(patient_id, LOOKBACK_DAYS, now).await?;
        let sessions = storage.get_sessions(patient_id, LOOKBACK_DAYS, now).await?;
        let vitals = storage.get_vitals_samples(patient_id).await?;
        let adherence = storage
            .get_adherence_events(patient_id, LOOKBACK_DAYS, now)
            .await?;
        let reminders = storage.get_reminders(patient_id).await?;

        let mut data_quality = messages.issues;
        data_quality.extend(sessions.issues);
        data_quality.extend(vitals.issues);
        data_quality.extend(adherence.issues);
        data_quality.extend(reminders.issues);

        Ok(Self {
            patient_id: patient_id.to_string(),
            messages: messages.items,
            sessions: sessions.items,
            vitals: vitals.items,
            adherence: adherence.items,
            reminders: reminders.items,
            data_quality,
        })
    }
}

/// Compute the engagement momentum score for a patient.
#[instrument(skip(storage))]
pub async fn compute_engagement(
    storage: &Storage,
    patient_id: &str,
    now: DateTime<Utc>,
) -> Result<EngagementResult, AnalyticsError> {
    require_patient_id(patient_id)?;

    let inputs = EngagementInputs::load(storage, patient_id, now).await?;
    let result = score_engagement(&inputs, now);

    info!(
        patient_id,
        score = result.score,
        level = ?result.level,
        alerts = result.alerts.len(),
        risk = ?result.prediction.risk,
        "Engagement computed"
    );

    Ok(result)
}

/// Running penalty total plus the alerts and trends that explain it.
struct Momentum {
    score: i32,
    alerts: Vec<Alert>,
    trends: Vec<TrendMetric>,
}

impl Momentum {
    fn penalize(&mut self, points: i32, severity: AlertSeverity, kind: AlertKind, message: String) {
        self.score -= points;
        self.alerts.push(Alert {
            severity,
            kind,
            message,
        });
    }

    fn trend(&mut self, metric: EngagementMetric, score: f64, trend: Trend) {
        self.trends.push(TrendMetric {
            metric,
            score,
            trend,
        });
    }
}

/// Score already-loaded inputs. Pure; `now` is the only clock.
pub fn score_engagement(inputs: &EngagementInputs, now: DateTime<Utc>) -> EngagementResult {
    let weeks = Weeks::ending_at(now);
    let mut momentum = Momentum {
        score: 100,
        alerts: Vec::new(),
        trends: Vec::new(),
    };

    messaging_signal(inputs, &weeks, &mut momentum);
    login_signal(&inputs.sessions, &weeks, &mut momentum);
    vitals_sync_signal(&inputs.vitals, &weeks, now, &mut momentum);
    medication_logging_signal(inputs, &weeks, &mut momentum);

    let declining = declining_trend_count(&momentum.trends);
    if momentum.score < 40 && declining >= 3 {
        momentum.alerts.insert(
            0,
            Alert {
                severity: AlertSeverity::Critical,
                kind: AlertKind::RapidDisengagement,
                message: "RAPID DISENGAGEMENT DETECTED - Immediate intervention recommended"
                    .to_string(),
            },
        );
    }

    let score = momentum.score.max(0) as u32;

    EngagementResult {
        score,
        level: EngagementLevel::from_score(score),
        prediction: predict_disengagement(score, &momentum.trends),
        alerts: momentum.alerts,
        trend_data: momentum.trends,
        data_quality: inputs.data_quality.clone(),
        computed_at: now,
    }
}

/// Predict disengagement from the momentum score and its trends.
///
/// - `imminent` (2-3 weeks, 85%): score < 40 with 3+ declining trends
/// - `likely` (4-6 weeks, 70%): score < 60 with 2+ declining trends
/// - `low` otherwise (90%)
pub fn predict_disengagement(score: u32, trends: &[TrendMetric]) -> Prediction {
    let declining = declining_trend_count(trends);

    let (risk, timeframe, confidence) = if score < 40 && declining >= 3 {
        (DisengagementRisk::Imminent, "2-3 weeks", 85)
    } else if score < 60 && declining >= 2 {
        (DisengagementRisk::Likely, "4-6 weeks", 70)
    } else {
        (DisengagementRisk::Low, "Not predicted", 90)
    };

    Prediction {
        risk,
        timeframe: timeframe.to_string(),
        confidence,
    }
}

fn declining_trend_count(trends: &[TrendMetric]) -> usize {
    trends.iter().filter(|t| t.trend.is_negative()).count()
}

/// The two comparison weeks ending at the evaluation instant.
struct Weeks {
    last_start: DateTime<Utc>,
    previous_start: DateTime<Utc>,
}

impl Weeks {
    fn ending_at(now: DateTime<Utc>) -> Self {
        Self {
            last_start: now - Duration::days(WEEK_DAYS),
            previous_start: now - Duration::days(LOOKBACK_DAYS),
        }
    }

    /// Count timestamps in (last week, previous week).
    fn split(&self, timestamps: impl Iterator<Item = DateTime<Utc>>) -> (usize, usize) {
        timestamps.fold((0, 0), |(last, previous), ts| {
            if ts >= self.last_start {
                (last + 1, previous)
            } else if ts >= self.previous_start {
                (last, previous + 1)
            } else {
                (last, previous)
            }
        })
    }
}

/// True when `last` fell below `ratio` of a non-empty `previous`.
fn dropped(last: usize, previous: usize, ratio: f64) -> bool {
    previous > 0 && (last as f64) < previous as f64 * ratio
}

fn messaging_signal(inputs: &EngagementInputs, weeks: &Weeks, momentum: &mut Momentum) {
    let sent_by_patient = inputs
        .messages
        .iter()
        .filter(|m| m.sender_id == inputs.patient_id)
        .count();

    if sent_by_patient == 0 {
        momentum.penalize(
            25,
            AlertSeverity::Critical,
            AlertKind::NoCommunication,
            "No communication activity detected".to_string(),
        );
        momentum.trend(EngagementMetric::MessageActivity, 0.0, Trend::Declining);
        return;
    }

    // Cadence is measured over the whole thread, not only the patient's side.
    let (last, previous) = weeks.split(inputs.messages.iter().map(|m| m.timestamp));

    if dropped(last, previous, 0.5) {
        momentum.penalize(
            20,
            AlertSeverity::High,
            AlertKind::CommunicationDrop,
            "Significant drop in communication activity".to_string(),
        );
        momentum.trend(
            EngagementMetric::MessageActivity,
            last as f64 / previous.max(1) as f64 * 100.0,
            Trend::Declining,
        );
    } else {
        momentum.trend(
            EngagementMetric::MessageActivity,
            (last as f64 / WEEK_DAYS as f64 * 100.0).min(100.0),
            Trend::Stable,
        );
    }
}

fn login_signal(sessions: &[SessionRecord], weeks: &Weeks, momentum: &mut Momentum) {
    let logins = sessions.len();
    let (last, previous) = weeks.split(sessions.iter().map(|s| s.timestamp));

    if logins < 2 {
        momentum.penalize(
            20,
            AlertSeverity::High,
            AlertKind::VeryLowPortalActivity,
            "Very low portal engagement - less than 2 logins in 14 days".to_string(),
        );
    } else if logins < 5 {
        momentum.penalize(
            10,
            AlertSeverity::Medium,
            AlertKind::LowPortalActivity,
            "Below average portal activity".to_string(),
        );
    }

    if dropped(last, previous, 0.5) {
        momentum.penalize(
            15,
            AlertSeverity::High,
            AlertKind::DisengagementSpiral,
            "Entering disengagement spiral - declining login pattern".to_string(),
        );
        momentum.trend(
            EngagementMetric::PortalActivity,
            last as f64 / WEEK_DAYS as f64 * 100.0,
            Trend::Declining,
        );
    } else {
        momentum.trend(
            EngagementMetric::PortalActivity,
            logins as f64 / LOOKBACK_DAYS as f64 * 100.0,
            Trend::Stable,
        );
    }
}

fn vitals_sync_signal(
    vitals: &[VitalsSample],
    weeks: &Weeks,
    now: DateTime<Utc>,
    momentum: &mut Momentum,
) {
    let Some(latest) = VitalsSample::latest(vitals) else {
        momentum.penalize(
            20,
            AlertSeverity::Critical,
            AlertKind::NoSync,
            "No health data syncing detected".to_string(),
        );
        momentum.trend(EngagementMetric::HealthTracking, 0.0, Trend::Declining);
        return;
    };

    let days_since_sync = (now - latest.timestamp).num_days();
    if days_since_sync > 5 {
        momentum.penalize(
            20,
            AlertSeverity::High,
            AlertKind::SyncStopped,
            format!("Health data sync stopped ({days_since_sync} days ago)"),
        );
        momentum.trend(EngagementMetric::HealthTracking, 20.0, Trend::Declining);
    } else if days_since_sync > 2 {
        momentum.penalize(
            10,
            AlertSeverity::Medium,
            AlertKind::IrregularSync,
            "Irregular health data syncing".to_string(),
        );
        momentum.trend(EngagementMetric::HealthTracking, 60.0, Trend::Declining);
    } else {
        momentum.trend(EngagementMetric::HealthTracking, 95.0, Trend::Stable);
    }

    let (last, previous) = weeks.split(vitals.iter().map(|v| v.timestamp));
    if dropped(last, previous, 0.5) {
        momentum.penalize(
            15,
            AlertSeverity::High,
            AlertKind::SyncDropping,
            "Health tracking engagement dropping rapidly".to_string(),
        );
    }
}

fn medication_logging_signal(inputs: &EngagementInputs, weeks: &Weeks, momentum: &mut Momentum) {
    let active_reminders = inputs.reminders.iter().filter(|r| r.active).count();
    let expected_logs = active_reminders * LOOKBACK_DAYS as usize;

    if expected_logs == 0 {
        momentum.trend(EngagementMetric::MedicationTracking, 0.0, Trend::Unknown);
        return;
    }

    let actual_logs = inputs.adherence.len();
    let consistency = (actual_logs as f64 / expected_logs as f64 * 100.0).round();

    if consistency < 50.0 {
        momentum.penalize(
            20,
            AlertSeverity::Critical,
            AlertKind::SevereLoggingGaps,
            format!("Severe medication logging gaps ({consistency}% logged)"),
        );
    } else if consistency < 70.0 {
        momentum.penalize(
            12,
            AlertSeverity::High,
            AlertKind::LoggingInconsistency,
            format!("Medication logging inconsistency ({consistency}% logged)"),
        );
    }

    let (last, previous) = weeks.split(inputs.adherence.iter().map(|e| e.timestamp));
    if dropped(last, previous, 0.7) {
        momentum.penalize(
            15,
            AlertSeverity::Critical,
            AlertKind::LoggingDeteriorating,
            "Medication adherence tracking pattern deteriorating".to_string(),
        );
        momentum.trend(
            EngagementMetric::MedicationTracking,
            consistency,
            Trend::Worsening,
        );
    } else {
        momentum.trend(
            EngagementMetric::MedicationTracking,
            consistency,
            Trend::Stable,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VitalsData;
    use chrono::TimeZone;

    const PATIENT: &str = "patient-1";
    const DOCTOR: &str = "doctor-1";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn at(days_ago: i64) -> DateTime<Utc> {
        fixed_now() - Duration::days(days_ago) + Duration::hours(1)
    }

    fn message(sender: &str, days_ago: i64) -> MessageRecord {
        MessageRecord {
            patient_id: PATIENT.to_string(),
            sender_id: sender.to_string(),
            timestamp: at(days_ago),
        }
    }

    fn session(days_ago: i64) -> SessionRecord {
        SessionRecord {
            user_id: PATIENT.to_string(),
            timestamp: at(days_ago),
        }
    }

    fn sample(days_ago: i64) -> VitalsSample {
        VitalsSample {
            patient_id: PATIENT.to_string(),
            timestamp: at(days_ago),
            data: VitalsData {
                heart_rate: Some(72.0),
                oxygen_saturation: Some(98.0),
            },
        }
    }

    fn log(days_ago: i64) -> AdherenceEvent {
        AdherenceEvent {
            patient_id: PATIENT.to_string(),
            timestamp: at(days_ago),
            medication_taken: true,
        }
    }

    fn reminder(active: bool) -> ReminderRecord {
        ReminderRecord {
            patient_id: PATIENT.to_string(),
            active,
        }
    }

    /// An engaged patient: steady messages, daily logins and syncs, full logs.
    fn engaged_inputs() -> EngagementInputs {
        EngagementInputs {
            patient_id: PATIENT.to_string(),
            messages: (0..14).map(|d| message(PATIENT, d)).collect(),
            sessions: (0..14).map(session).collect(),
            vitals: (0..14).map(sample).collect(),
            adherence: (0..14).map(log).collect(),
            reminders: vec![reminder(true)],
            data_quality: vec![],
        }
    }

    fn trend_of(result: &EngagementResult, metric: EngagementMetric) -> &TrendMetric {
        result
            .trend_data
            .iter()
            .find(|t| t.metric == metric)
            .expect("trend recorded")
    }

    #[test]
    fn test_engaged_patient_keeps_full_momentum() {
        let result = score_engagement(&engaged_inputs(), fixed_now());

        assert_eq!(result.score, 100);
        assert_eq!(result.level, EngagementLevel::Excellent);
        assert!(result.alerts.is_empty());
        assert_eq!(result.trend_data.len(), 4);
        assert!(result.trend_data.iter().all(|t| t.trend == Trend::Stable));
        assert_eq!(result.prediction.risk, DisengagementRisk::Low);
    }

    #[test]
    fn test_silent_patient_with_reminders() {
        let inputs = EngagementInputs {
            patient_id: PATIENT.to_string(),
            reminders: vec![reminder(true)],
            ..Default::default()
        };

        let result = score_engagement(&inputs, fixed_now());

        // 100 - 25 messaging - 20 logins - 20 vitals - 20 logging
        assert_eq!(result.score, 15);
        assert_eq!(result.level, EngagementLevel::Critical);

        // Messaging and vitals decline; logins and logging have no baseline.
        assert_eq!(declining_trend_count(&result.trend_data), 2);
        assert!(
            result
                .alerts
                .iter()
                .all(|a| a.kind != AlertKind::RapidDisengagement)
        );
        assert_eq!(result.prediction.risk, DisengagementRisk::Likely);
        assert_eq!(result.prediction.timeframe, "4-6 weeks");
        assert_eq!(result.prediction.confidence, 70);
    }

    #[test]
    fn test_rapid_disengagement_alert_is_first() {
        let inputs = EngagementInputs {
            patient_id: PATIENT.to_string(),
            // Only the care team is writing.
            messages: vec![message(DOCTOR, 1), message(DOCTOR, 9)],
            // 1 login this week, 4 the week before.
            sessions: vec![session(2), session(8), session(9), session(10), session(11)],
            // Last sync 8 days ago.
            vitals: vec![sample(8), sample(9)],
            ..Default::default()
        };

        let result = score_engagement(&inputs, fixed_now());

        // 100 - 25 messaging - 15 spiral - 20 stale sync - 15 sync drop
        assert_eq!(result.score, 25);
        assert_eq!(result.alerts[0].kind, AlertKind::RapidDisengagement);
        assert_eq!(result.alerts[0].severity, AlertSeverity::Critical);
        assert!(
            result
                .alerts
                .iter()
                .any(|a| a.kind == AlertKind::DisengagementSpiral)
        );
        assert_eq!(result.prediction.risk, DisengagementRisk::Imminent);
        assert_eq!(result.prediction.confidence, 85);
    }

    #[test]
    fn test_message_drop_uses_whole_thread() {
        let mut inputs = engaged_inputs();
        inputs.messages = vec![
            message(PATIENT, 1),
            message(DOCTOR, 8),
            message(DOCTOR, 9),
            message(PATIENT, 10),
            message(PATIENT, 11),
        ];

        let result = score_engagement(&inputs, fixed_now());

        assert_eq!(result.score, 80);
        assert_eq!(result.alerts[0].kind, AlertKind::CommunicationDrop);
        let trend = trend_of(&result, EngagementMetric::MessageActivity);
        assert_eq!(trend.trend, Trend::Declining);
        assert_eq!(trend.score, 25.0);
    }

    #[test]
    fn test_login_frequency_penalties() {
        let mut inputs = engaged_inputs();

        inputs.sessions = vec![session(1)];
        assert_eq!(score_engagement(&inputs, fixed_now()).score, 80);

        inputs.sessions = vec![session(1), session(2), session(3)];
        let result = score_engagement(&inputs, fixed_now());
        assert_eq!(result.score, 90);
        let trend = trend_of(&result, EngagementMetric::PortalActivity);
        assert_eq!(trend.trend, Trend::Stable);
        assert!((trend.score - 3.0 / 14.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_vitals_sync_staleness() {
        let mut inputs = engaged_inputs();

        // 3 whole days stale, and this week holds fewer than half of last week's syncs.
        inputs.vitals = vec![sample(4), sample(8), sample(9), sample(10)];
        let result = score_engagement(&inputs, fixed_now());
        assert_eq!(result.score, 75);
        assert_eq!(
            trend_of(&result, EngagementMetric::HealthTracking).score,
            60.0
        );

        // Recent sync with a steady cadence costs nothing.
        inputs.vitals = vec![sample(0), sample(8)];
        let result = score_engagement(&inputs, fixed_now());
        assert_eq!(result.score, 100);
        assert_eq!(
            trend_of(&result, EngagementMetric::HealthTracking).trend,
            Trend::Stable
        );
    }

    #[test]
    fn test_medication_logging() {
        let mut inputs = engaged_inputs();
        inputs.reminders = vec![reminder(true), reminder(false)];

        // 8 of 14 expected logs, evenly split across the weeks.
        inputs.adherence = vec![log(1), log(2), log(3), log(4), log(8), log(9), log(10), log(11)];
        let result = score_engagement(&inputs, fixed_now());
        assert_eq!(result.score, 88);
        assert_eq!(
            result.alerts[0].message,
            "Medication logging inconsistency (57% logged)"
        );

        // Logs dry up this week.
        inputs.adherence = vec![log(1), log(8), log(9), log(10), log(11), log(12)];
        let result = score_engagement(&inputs, fixed_now());
        assert_eq!(result.score, 65);
        let trend = trend_of(&result, EngagementMetric::MedicationTracking);
        assert_eq!(trend.trend, Trend::Worsening);
        assert_eq!(trend.score, 43.0);
    }

    #[test]
    fn test_no_active_reminders_is_unknown() {
        let mut inputs = engaged_inputs();
        inputs.reminders = vec![reminder(false)];
        inputs.adherence.clear();

        let result = score_engagement(&inputs, fixed_now());

        assert_eq!(result.score, 100);
        assert_eq!(
            trend_of(&result, EngagementMetric::MedicationTracking).trend,
            Trend::Unknown
        );
    }

    #[test]
    fn test_score_never_negative() {
        let inputs = EngagementInputs {
            patient_id: PATIENT.to_string(),
            sessions: vec![session(9), session(10)],
            vitals: vec![sample(8), sample(9), sample(10)],
            adherence: vec![log(9), log(10)],
            reminders: vec![reminder(true); 3],
            ..Default::default()
        };

        let result = score_engagement(&inputs, fixed_now());

        // 100 - 25 - 10 - 15 - 20 - 15 - 20 - 15 = -20 before the floor.
        assert_eq!(result.score, 0);
        assert_eq!(result.level, EngagementLevel::Critical);
        assert_eq!(result.alerts[0].kind, AlertKind::RapidDisengagement);
    }

    #[test]
    fn test_prediction_thresholds() {
        let trend = |trend| TrendMetric {
            metric: EngagementMetric::PortalActivity,
            score: 0.0,
            trend,
        };
        let three_down = vec![
            trend(Trend::Declining),
            trend(Trend::Worsening),
            trend(Trend::Declining),
        ];
        let two_down = vec![trend(Trend::Declining), trend(Trend::Stable), trend(Trend::Worsening)];

        assert_eq!(
            predict_disengagement(39, &three_down).risk,
            DisengagementRisk::Imminent
        );
        assert_eq!(
            predict_disengagement(40, &three_down).risk,
            DisengagementRisk::Likely
        );
        assert_eq!(
            predict_disengagement(59, &two_down).risk,
            DisengagementRisk::Likely
        );
        assert_eq!(
            predict_disengagement(60, &two_down).risk,
            DisengagementRisk::Low
        );

        let low = predict_disengagement(10, &[]);
        assert_eq!(low.risk, DisengagementRisk::Low);
        assert_eq!(low.timeframe, "Not predicted");
        assert_eq!(low.confidence, 90);
    }

    #[tokio::test]
    async fn test_compute_engagement_is_idempotent() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = fixed_now();

        storage.insert_session(&session(1)).await.unwrap();
        storage.insert_message(&message(PATIENT, 2)).await.unwrap();
        storage.insert_vitals_sample(&sample(4)).await.unwrap();

        let first = compute_engagement(&storage, PATIENT, now).await.unwrap();
        let second = compute_engagement(&storage, PATIENT, now).await.unwrap();

        assert_eq!(first, second);
        // 100 - 20 logins - 10 irregular sync
        assert_eq!(first.score, 70);
    }

    #[tokio::test]
    async fn test_malformed_message_is_excluded_and_reported() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = fixed_now();

        sqlx::query(
            r#"
            INSERT INTO messages (patient_id, sender_id, ts)
            VALUES ('patient-1', 'patient-1', 'garbage')
            "#,
        )
        .execute(storage.pool())
        .await
        .unwrap();
        storage.insert_message(&message(DOCTOR, 1)).await.unwrap();

        let result = compute_engagement(&storage, PATIENT, now).await.unwrap();

        // The patient's only message is unreadable, so they sent nothing.
        assert_eq!(result.alerts[0].kind, AlertKind::NoCommunication);
        // 100 - 25 messaging - 20 logins - 20 no sync
        assert_eq!(result.score, 35);
        assert_eq!(result.data_quality.len(), 1);
        assert_eq!(result.data_quality[0].collection, "messages");
        assert_eq!(result.data_quality[0].record_id, "1");
    }
}
