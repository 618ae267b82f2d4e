//! Periodic roster re-evaluation.
//!
//! The engine itself has no timers; this task is the caller-side schedule
//! that keeps [`LatestRoster`] warm for `GET /roster/latest`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::aggregation::{RosterReport, compute_roster_risk};
use crate::storage::Storage;

/// Most recent roster report, shared between the refresh task and handlers.
pub type LatestRoster = Arc<RwLock<Option<RosterReport>>>;

/// Recompute the roster once and store the result.
///
/// A failed computation leaves the previous report in place.
pub async fn refresh_roster(storage: &Storage, latest: &LatestRoster) {
    match compute_roster_risk(storage, Utc::now()).await {
        Ok(report) => {
            debug!(
                patients = report.summary.total_patients,
                failed = report.summary.failed_count,
                "Roster cache refreshed"
            );
            *latest.write().await = Some(report);
        }
        Err(e) => warn!(error = %e, "Roster refresh failed"),
    }
}

/// Spawn a task that refreshes the roster every `period`, starting
/// immediately.
pub fn spawn_roster_refresh(
    storage: Storage,
    latest: LatestRoster,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            refresh_roster(&storage, &latest).await;
        }
    })
}
