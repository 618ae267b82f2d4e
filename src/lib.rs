//! Riskpulse - patient risk analytics for care teams.
//!
//! # Overview
//!
//! Riskpulse reads a patient's recent clinical and behavioral records and
//! produces two independent 0-100 scores:
//!
//! - a **health deterioration** score (medication adherence, missed
//!   appointments, vital signs, lab analyses, time since discharge), and
//! - an **engagement momentum** score (messaging, portal logins, device
//!   syncing, medication logging, week-over-week trends),
//!
//! blended into one **combined risk** score with prioritized recommended
//! actions. Roster mode ranks every patient by combined risk so the most
//! urgent appear first.
//!
//! Every computation takes an explicit evaluation instant and only reads the
//! record store, so results are reproducible and patients can be scored
//! concurrently.
//!
//! # Modules
//!
//! - [`model`]: Record and result types
//! - [`error`]: Error taxonomy and data-quality issues
//! - [`storage`]: SQLite record store and read accessors
//! - [`deterioration`]: Health deterioration scoring
//! - [`engagement`]: Engagement momentum scoring and disengagement prediction
//! - [`recommendations`]: Recommended care-team actions
//! - [`aggregation`]: Combined risk and roster ranking
//! - [`config`]: Environment configuration
//! - [`refresh`]: Periodic roster re-evaluation
//! - [`api`]: HTTP API handlers

pub mod aggregation;
pub mod api;
pub mod config;
pub mod deterioration;
pub mod engagement;
pub mod error;
pub mod model;
pub mod recommendations;
pub mod refresh;
pub mod storage;
