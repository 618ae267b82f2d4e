//! Error taxonomy for the analytics engine.
//!
//! Three kinds of failure are distinguished:
//!
//! - [`AnalyticsError::DataAccess`]: the record store could not be read. This
//!   aborts the computation for one patient but never a roster-wide batch.
//! - [`AnalyticsError::DataQuality`]: a record carries a value that cannot be
//!   interpreted (unparseable timestamp, out-of-range vital). Accessors turn
//!   these into [`DataQualityIssue`]s and exclude the record from its signal
//!   group rather than failing the whole score.
//! - [`AnalyticsError::Configuration`]: a required identifier is missing.

use std::fmt;

use serde::Serialize;

/// Errors surfaced by the analytics engine.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Data access error: {0}")]
    DataAccess(#[from] sqlx::Error),

    #[error("Data quality error: {0}")]
    DataQuality(DataQualityIssue),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown patient: {0}")]
    UnknownPatient(String),
}

/// A record that was excluded (or partially ignored) because one of its
/// fields could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataQualityIssue {
    /// Collection the record was read from, e.g. `"vitals_samples"`.
    pub collection: &'static str,

    /// Store identifier of the offending record.
    pub record_id: String,

    /// What was wrong with it.
    pub reason: String,
}

impl DataQualityIssue {
    pub fn new(
        collection: &'static str,
        record_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            collection,
            record_id: record_id.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} record {}: {}",
            self.collection, self.record_id, self.reason
        )
    }
}

/// Reject blank patient identifiers before touching the store.
pub fn require_patient_id(patient_id: &str) -> Result<(), AnalyticsError> {
    if patient_id.trim().is_empty() {
        return Err(AnalyticsError::Configuration(
            "patient id must not be empty".to_string(),
        ));
    }
    Ok(())
}
