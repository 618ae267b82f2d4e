//! SQLite record store and the read-only record accessors.
//!
//! Each collection lives in its own table. Timestamps are stored as TEXT and
//! parsed on read, so a malformed value is caught per record: the record is
//! excluded from its collection and reported as a [`DataQualityIssue`]
//! instead of failing the whole query.
//!
//! Accessors are never memoized. Every scoring pass re-reads current state.
//! The `insert_*` methods exist for seeding fixtures; the analytics engine
//! itself only reads.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Decode, Row, Type};
use tracing::warn;

use crate::error::{AnalyticsError, DataQualityIssue};
use crate::model::{
    AdherenceEvent, AppointmentRecord, AppointmentStatus, DoctorAnalysisRecord, LabReportRecord,
    MessageRecord, PatientRecord, ReminderRecord, SessionRecord, VitalsData, VitalsSample,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS patients (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        discharge_date TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS adherence_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id TEXT NOT NULL,
        ts TEXT NOT NULL,
        medication_taken INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS appointments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id TEXT NOT NULL,
        date TEXT NOT NULL,
        status TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vitals_samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id TEXT NOT NULL,
        ts TEXT NOT NULL,
        heart_rate REAL,
        oxygen_saturation REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lab_reports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id TEXT NOT NULL,
        ts TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doctor_analyses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id TEXT NOT NULL,
        analysis TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        ts TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        ts TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reminders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id TEXT NOT NULL,
        active INTEGER
    )
    "#,
];

/// Plausible bounds for stored vitals; anything outside is a bad reading.
const HEART_RATE_RANGE: (f64, f64) = (0.0, 300.0);
const OXYGEN_SATURATION_RANGE: (f64, f64) = (0.0, 100.0);

/// Records read from one collection.
#[derive(Debug, Clone)]
pub struct Records<T> {
    /// Valid records in store order.
    pub items: Vec<T>,

    /// Records that were excluded, one issue each.
    pub issues: Vec<DataQualityIssue>,
}

impl<T> Records<T> {
    /// Keep only items at or after `now - window_days`.
    fn within_days(
        mut self,
        window_days: i64,
        now: DateTime<Utc>,
        timestamp: impl Fn(&T) -> DateTime<Utc>,
    ) -> Self {
        let cutoff = now - Duration::days(window_days);
        self.items.retain(|item| timestamp(item) >= cutoff);
        self
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Connect and create the schema if needed.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string, e.g. "sqlite:riskpulse.db" or
    ///   "sqlite::memory:"
    pub async fn new(database_url: &str) -> Result<Self, AnalyticsError> {
        // Every connection to `:memory:` is its own database, so pin the pool
        // to one long-lived connection.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<std::time::Duration>)
                .max_lifetime(None::<std::time::Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(database_url).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), AnalyticsError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Look up a single patient; `items` holds at most one record.
    ///
    /// An unparseable discharge date is dropped and reported in `issues`.
    /// The patient itself is still returned.
    pub async fn get_patient(
        &self,
        patient_id: &str,
    ) -> Result<Records<PatientRecord>, AnalyticsError> {
        let row = sqlx::query("SELECT id, name, discharge_date FROM patients WHERE id = ?")
            .bind(patient_id)
            .fetch_optional(&self.pool)
            .await?;

        let mut records = Records {
            items: Vec::new(),
            issues: Vec::new(),
        };

        if let Some(row) = row {
            let (patient, issue) = decode_patient(&row)?;
            if let Some(issue) = issue {
                warn!(
                    collection = issue.collection,
                    record_id = %issue.record_id,
                    reason = %issue.reason,
                    "Ignoring malformed patient field"
                );
                records.issues.push(issue);
            }
            records.items.push(patient);
        }

        Ok(records)
    }

    /// All patients in insertion order.
    ///
    /// Field-level problems such as a bad discharge date do not exclude a
    /// patient; they surface when that patient is scored.
    pub async fn get_patient_roster(&self) -> Result<Records<PatientRecord>, AnalyticsError> {
        let rows = sqlx::query("SELECT id, name, discharge_date FROM patients ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        collect("patients", &rows, |row| decode_patient(row).map(|(patient, _)| patient))
    }

    /// Adherence events logged in the trailing `window_days`.
    pub async fn get_adherence_events(
        &self,
        patient_id: &str,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Records<AdherenceEvent>, AnalyticsError> {
        let rows = sqlx::query(
            r#"
            SELECT id, patient_id, ts, medication_taken
            FROM adherence_events
            WHERE patient_id = ?
            ORDER BY id
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(collect("adherence_events", &rows, |row| {
            let id = record_id(row)?;
            let raw: String = column(row, "adherence_events", &id, "ts")?;
            let taken: i64 = column(row, "adherence_events", &id, "medication_taken")?;
            Ok(AdherenceEvent {
                patient_id: column(row, "adherence_events", &id, "patient_id")?,
                timestamp: timestamp_field("adherence_events", &id, "ts", &raw)?,
                medication_taken: taken != 0,
            })
        })?
        .within_days(window_days, now, |e| e.timestamp))
    }

    pub async fn get_appointments(
        &self,
        patient_id: &str,
    ) -> Result<Records<AppointmentRecord>, AnalyticsError> {
        let rows = sqlx::query(
            r#"
            SELECT id, patient_id, date, status
            FROM appointments
            WHERE patient_id = ?
            ORDER BY id
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        collect("appointments", &rows, |row| {
            let id = record_id(row)?;
            let raw: String = column(row, "appointments", &id, "date")?;
            let status: String = column(row, "appointments", &id, "status")?;
            Ok(AppointmentRecord {
                patient_id: column(row, "appointments", &id, "patient_id")?,
                date: timestamp_field("appointments", &id, "date", &raw)?,
                status: AppointmentStatus::parse(&status),
            })
        })
    }

    /// Vitals samples, most recent first.
    pub async fn get_vitals_samples(
        &self,
        patient_id: &str,
    ) -> Result<Records<VitalsSample>, AnalyticsError> {
        let rows = sqlx::query(
            r#"
            SELECT id, patient_id, ts, heart_rate, oxygen_saturation
            FROM vitals_samples
            WHERE patient_id = ?
            ORDER BY id
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = collect("vitals_samples", &rows, |row| {
            let id = record_id(row)?;
            let raw: String = column(row, "vitals_samples", &id, "ts")?;
            let heart_rate: Option<f64> = column(row, "vitals_samples", &id, "heart_rate")?;
            let oxygen_saturation: Option<f64> =
                column(row, "vitals_samples", &id, "oxygen_saturation")?;
            Ok(VitalsSample {
                patient_id: column(row, "vitals_samples", &id, "patient_id")?,
                timestamp: timestamp_field("vitals_samples", &id, "ts", &raw)?,
                data: VitalsData {
                    heart_rate: in_range(&id, "heart_rate", heart_rate, HEART_RATE_RANGE)?,
                    oxygen_saturation: in_range(
                        &id,
                        "oxygen_saturation",
                        oxygen_saturation,
                        OXYGEN_SATURATION_RANGE,
                    )?,
                },
            })
        })?;

        // Stable: samples sharing a timestamp keep store order.
        records.items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    pub async fn get_lab_reports(
        &self,
        patient_id: &str,
    ) -> Result<Records<LabReportRecord>, AnalyticsError> {
        let rows = sqlx::query(
            "SELECT id, patient_id, ts, title FROM lab_reports WHERE patient_id = ? ORDER BY id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        collect("lab_reports", &rows, |row| {
            let id = record_id(row)?;
            let raw: String = column(row, "lab_reports", &id, "ts")?;
            Ok(LabReportRecord {
                patient_id: column(row, "lab_reports", &id, "patient_id")?,
                timestamp: timestamp_field("lab_reports", &id, "ts", &raw)?,
                title: column(row, "lab_reports", &id, "title")?,
            })
        })
    }

    pub async fn get_doctor_analyses(
        &self,
        patient_id: &str,
    ) -> Result<Records<DoctorAnalysisRecord>, AnalyticsError> {
        let rows = sqlx::query(
            "SELECT id, patient_id, analysis FROM doctor_analyses WHERE patient_id = ? ORDER BY id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        collect("doctor_analyses", &rows, |row| {
            let id = record_id(row)?;
            let text: Option<String> = column(row, "doctor_analyses", &id, "analysis")?;
            Ok(DoctorAnalysisRecord {
                patient_id: column(row, "doctor_analyses", &id, "patient_id")?,
                analysis_text: text.unwrap_or_default(),
            })
        })
    }

    /// Messages in the patient's conversation over the trailing `window_days`.
    pub async fn get_messages(
        &self,
        patient_id: &str,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Records<MessageRecord>, AnalyticsError> {
        let rows = sqlx::query(
            "SELECT id, patient_id, sender_id, ts FROM messages WHERE patient_id = ? ORDER BY id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(collect("messages", &rows, |row| {
            let id = record_id(row)?;
            let raw: String = column(row, "messages", &id, "ts")?;
            Ok(MessageRecord {
                patient_id: column(row, "messages", &id, "patient_id")?,
                sender_id: column(row, "messages", &id, "sender_id")?,
                timestamp: timestamp_field("messages", &id, "ts", &raw)?,
            })
        })?
        .within_days(window_days, now, |m| m.timestamp))
    }

    /// Portal logins over the trailing `window_days`.
    pub async fn get_sessions(
        &self,
        patient_id: &str,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Records<SessionRecord>, AnalyticsError> {
        let rows = sqlx::query("SELECT id, user_id, ts FROM sessions WHERE user_id = ? ORDER BY id")
            .bind(patient_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(collect("sessions", &rows, |row| {
            let id = record_id(row)?;
            let raw: String = column(row, "sessions", &id, "ts")?;
            Ok(SessionRecord {
                user_id: column(row, "sessions", &id, "user_id")?,
                timestamp: timestamp_field("sessions", &id, "ts", &raw)?,
            })
        })?
        .within_days(window_days, now, |s| s.timestamp))
    }

    pub async fn get_reminders(
        &self,
        patient_id: &str,
    ) -> Result<Records<ReminderRecord>, AnalyticsError> {
        let rows = sqlx::query(
            "SELECT id, patient_id, active FROM reminders WHERE patient_id = ? ORDER BY id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        collect("reminders", &rows, |row| {
            let id = record_id(row)?;
            let active: Option<i64> = column(row, "reminders", &id, "active")?;
            Ok(ReminderRecord {
                patient_id: column(row, "reminders", &id, "patient_id")?,
                // Only an explicit false deactivates a reminder.
                active: active.is_none_or(|flag| flag != 0),
            })
        })
    }

    // ------------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------------

    pub async fn insert_patient(&self, patient: &PatientRecord) -> Result<(), AnalyticsError> {
        sqlx::query("INSERT INTO patients (id, name, discharge_date) VALUES (?, ?, ?)")
            .bind(&patient.id)
            .bind(&patient.name)
            .bind(patient.discharge_date.map(|d| d.to_rfc3339()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_adherence_event(
        &self,
        event: &AdherenceEvent,
    ) -> Result<(), AnalyticsError> {
        sqlx::query(
            "INSERT INTO adherence_events (patient_id, ts, medication_taken) VALUES (?, ?, ?)",
        )
        .bind(&event.patient_id)
        .bind(event.timestamp.to_rfc3339())
        .bind(i64::from(event.medication_taken))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_appointment(
        &self,
        appointment: &AppointmentRecord,
    ) -> Result<(), AnalyticsError> {
        sqlx::query("INSERT INTO appointments (patient_id, date, status) VALUES (?, ?, ?)")
            .bind(&appointment.patient_id)
            .bind(appointment.date.to_rfc3339())
            .bind(appointment.status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_vitals_sample(&self, sample: &VitalsSample) -> Result<(), AnalyticsError> {
        sqlx::query(
            r#"
            INSERT INTO vitals_samples (patient_id, ts, heart_rate, oxygen_saturation)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&sample.patient_id)
        .bind(sample.timestamp.to_rfc3339())
        .bind(sample.data.heart_rate)
        .bind(sample.data.oxygen_saturation)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_lab_report(&self, report: &LabReportRecord) -> Result<(), AnalyticsError> {
        sqlx::query("INSERT INTO lab_reports (patient_id, ts, title) VALUES (?, ?, ?)")
            .bind(&report.patient_id)
            .bind(report.timestamp.to_rfc3339())
            .bind(&report.title)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_doctor_analysis(
        &self,
        analysis: &DoctorAnalysisRecord,
    ) -> Result<(), AnalyticsError> {
        sqlx::query("INSERT INTO doctor_analyses (patient_id, analysis) VALUES (?, ?)")
            .bind(&analysis.patient_id)
            .bind(&analysis.analysis_text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_message(&self, message: &MessageRecord) -> Result<(), AnalyticsError> {
        sqlx::query("INSERT INTO messages (patient_id, sender_id, ts) VALUES (?, ?, ?)")
            .bind(&message.patient_id)
            .bind(&message.sender_id)
            .bind(message.timestamp.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_session(&self, session: &SessionRecord) -> Result<(), AnalyticsError> {
        sqlx::query("INSERT INTO sessions (user_id, ts) VALUES (?, ?)")
            .bind(&session.user_id)
            .bind(session.timestamp.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_reminder(&self, reminder: &ReminderRecord) -> Result<(), AnalyticsError> {
        sqlx::query("INSERT INTO reminders (patient_id, active) VALUES (?, ?)")
            .bind(&reminder.patient_id)
            .bind(i64::from(reminder.active))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Row decoding
// ============================================================================

/// Decode every row, moving data-quality failures into `issues`. Any other
/// error aborts the read.
fn collect<T>(
    collection: &'static str,
    rows: &[SqliteRow],
    decode: impl Fn(&SqliteRow) -> Result<T, AnalyticsError>,
) -> Result<Records<T>, AnalyticsError> {
    let mut items = Vec::with_capacity(rows.len());
    let mut issues = Vec::new();

    for row in rows {
        match decode(row) {
            Ok(item) => items.push(item),
            Err(AnalyticsError::DataQuality(issue)) => {
                warn!(
                    collection,
                    record_id = %issue.record_id,
                    reason = %issue.reason,
                    "Excluding malformed record"
                );
                issues.push(issue);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Records { items, issues })
}

/// Decode a patient row. An unparseable discharge date is returned as an
/// issue alongside the patient rather than as an error.
fn decode_patient(
    row: &SqliteRow,
) -> Result<(PatientRecord, Option<DataQualityIssue>), AnalyticsError> {
    let id: String = row.try_get("id")?;
    let name: String = column(row, "patients", &id, "name")?;
    let raw: Option<String> = column(row, "patients", &id, "discharge_date")?;

    let (discharge_date, issue) = match raw.as_deref().map(str::trim) {
        None | Some("") => (None, None),
        Some(raw) => match parse_timestamp(raw) {
            Some(ts) => (Some(ts), None),
            None => (
                None,
                Some(DataQualityIssue::new(
                    "patients",
                    id.as_str(),
                    format!("unparseable discharge_date '{raw}'"),
                )),
            ),
        },
    };

    let patient = PatientRecord {
        id,
        name,
        discharge_date,
    };

    Ok((patient, issue))
}

fn record_id(row: &SqliteRow) -> Result<String, AnalyticsError> {
    let id: i64 = row.try_get("id")?;
    Ok(id.to_string())
}

/// Read a column, treating a value of the wrong storage type as a data-quality
/// problem with this record rather than a store failure.
fn column<'r, T>(
    row: &'r SqliteRow,
    collection: &'static str,
    record_id: &str,
    name: &str,
) -> Result<T, AnalyticsError>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name).map_err(|e| match e {
        sqlx::Error::ColumnDecode { source, .. } => AnalyticsError::DataQuality(
            DataQualityIssue::new(collection, record_id, format!("{name}: {source}")),
        ),
        other => AnalyticsError::DataAccess(other),
    })
}

fn timestamp_field(
    collection: &'static str,
    record_id: &str,
    name: &str,
    raw: &str,
) -> Result<DateTime<Utc>, AnalyticsError> {
    parse_timestamp(raw).ok_or_else(|| {
        AnalyticsError::DataQuality(DataQualityIssue::new(
            collection,
            record_id,
            format!("unparseable {name} '{raw}'"),
        ))
    })
}

fn in_range(
    record_id: &str,
    name: &str,
    value: Option<f64>,
    (min, max): (f64, f64),
) -> Result<Option<f64>, AnalyticsError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(AnalyticsError::DataQuality(
            DataQualityIssue::new(
                "vitals_samples",
                record_id,
                format!("{name} {v} outside {min}-{max}"),
            ),
        )),
        _ => Ok(value),
    }
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC), and
/// plain `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    async fn setup_test_storage() -> Storage {
        Storage::new("sqlite::memory:").await.unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap();

        assert_eq!(parse_timestamp("2024-05-20T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-20T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-20T00:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-20"), Some(expected));
        assert_eq!(parse_timestamp("last tuesday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[tokio::test]
    async fn test_missing_collections_are_empty() {
        let storage = setup_test_storage().await;
        let now = fixed_now();

        assert!(storage.get_patient("nobody").await.unwrap().items.is_empty());
        assert!(storage.get_patient_roster().await.unwrap().items.is_empty());
        assert!(
            storage
                .get_adherence_events("nobody", 30, now)
                .await
                .unwrap()
                .items
                .is_empty()
        );
        assert!(storage.get_vitals_samples("nobody").await.unwrap().items.is_empty());
        assert!(storage.get_reminders("nobody").await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_window_filter_is_inclusive() {
        let storage = setup_test_storage().await;
        let now = fixed_now();

        for days_ago in [0, 7, 14, 15] {
            storage
                .insert_message(&MessageRecord {
                    patient_id: "p1".to_string(),
                    sender_id: "p1".to_string(),
                    timestamp: now - Duration::days(days_ago),
                })
                .await
                .unwrap();
        }

        let messages = storage.get_messages("p1", 14, now).await.unwrap();

        // Exactly 14 days ago is still inside the window.
        assert_eq!(messages.items.len(), 3);
        assert!(messages.issues.is_empty());
    }

    #[tokio::test]
    async fn test_vitals_sorted_most_recent_first() {
        let storage = setup_test_storage().await;
        let now = fixed_now();

        for days_ago in [5, 1, 3] {
            storage
                .insert_vitals_sample(&VitalsSample {
                    patient_id: "p1".to_string(),
                    timestamp: now - Duration::days(days_ago),
                    data: VitalsData {
                        heart_rate: Some(70.0 + days_ago as f64),
                        oxygen_saturation: Some(97.0),
                    },
                })
                .await
                .unwrap();
        }

        let vitals = storage.get_vitals_samples("p1").await.unwrap();

        let heart_rates: Vec<_> = vitals
            .items
            .iter()
            .map(|v| v.data.heart_rate.unwrap())
            .collect();
        assert_eq!(heart_rates, vec![71.0, 73.0, 75.0]);
    }

    #[tokio::test]
    async fn test_malformed_timestamp_excluded_and_reported() {
        let storage = setup_test_storage().await;
        let now = fixed_now();

        storage
            .insert_session(&SessionRecord {
                user_id: "p1".to_string(),
                timestamp: now - Duration::days(1),
            })
            .await
            .unwrap();
        sqlx::query("INSERT INTO sessions (user_id, ts) VALUES ('p1', 'not a date')")
            .execute(&storage.pool)
            .await
            .unwrap();

        let sessions = storage.get_sessions("p1", 14, now).await.unwrap();

        assert_eq!(sessions.items.len(), 1);
        assert_eq!(sessions.issues.len(), 1);
        assert_eq!(sessions.issues[0].collection, "sessions");
        assert_eq!(sessions.issues[0].record_id, "2");
        assert!(sessions.issues[0].reason.contains("not a date"));
    }

    #[tokio::test]
    async fn test_out_of_range_vitals_excluded() {
        let storage = setup_test_storage().await;

        sqlx::query(
            r#"
            INSERT INTO vitals_samples (patient_id, ts, heart_rate, oxygen_saturation)
            VALUES ('p1', '2024-05-31T08:00:00Z', 72, 140),
                   ('p1', '2024-05-30T08:00:00Z', 'fast', 97),
                   ('p1', '2024-05-29T08:00:00Z', 68, 98)
            "#,
        )
        .execute(&storage.pool)
        .await
        .unwrap();

        let vitals = storage.get_vitals_samples("p1").await.unwrap();

        assert_eq!(vitals.items.len(), 1);
        assert_eq!(vitals.items[0].data.heart_rate, Some(68.0));
        assert_eq!(vitals.issues.len(), 2);
    }

    #[tokio::test]
    async fn test_reminder_active_defaults_to_true() {
        let storage = setup_test_storage().await;

        sqlx::query(
            "INSERT INTO reminders (patient_id, active) VALUES ('p1', NULL), ('p1', 0), ('p1', 1)",
        )
        .execute(&storage.pool)
        .await
        .unwrap();

        let reminders = storage.get_reminders("p1").await.unwrap();
        let flags: Vec<_> = reminders.items.iter().map(|r| r.active).collect();

        assert_eq!(flags, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_patient_with_bad_discharge_date() {
        let storage = setup_test_storage().await;

        sqlx::query(
            r#"
            INSERT INTO patients (id, name, discharge_date)
            VALUES ('p1', 'Ada', 'soon'), ('p2', 'Ben', NULL)
            "#,
        )
        .execute(&storage.pool)
        .await
        .unwrap();

        let lookup = storage.get_patient("p1").await.unwrap();
        assert_eq!(lookup.items.len(), 1);
        assert_eq!(lookup.items[0].name, "Ada");
        assert_eq!(lookup.items[0].discharge_date, None);
        assert_eq!(lookup.issues.len(), 1);
        assert_eq!(lookup.issues[0].collection, "patients");
        assert_eq!(lookup.issues[0].record_id, "p1");
        assert!(lookup.issues[0].reason.contains("discharge_date"));

        // The roster keeps the patient; the issue is reported when it is scored.
        let roster = storage.get_patient_roster().await.unwrap();
        let ids: Vec<_> = roster.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert!(roster.issues.is_empty());
    }

    #[tokio::test]
    async fn test_roster_preserves_insertion_order() {
        let storage = setup_test_storage().await;

        for id in ["zed", "amy", "max"] {
            storage
                .insert_patient(&PatientRecord {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                    discharge_date: None,
                })
                .await
                .unwrap();
        }

        let roster = storage.get_patient_roster().await.unwrap();
        let ids: Vec<_> = roster.items.iter().map(|p| p.id.as_str()).collect();

        assert_eq!(ids, vec!["zed", "amy", "max"]);
    }
}
