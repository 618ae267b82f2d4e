//! Recommended care-team actions.
//!
//! Checks run in a fixed order and each one that fires appends its
//! recommendation; nothing suppresses anything else. The list order is the
//! check order, not a priority sort.

use crate::model::{
    AlertKind, DeteriorationResult, EngagementResult, Factor, FactorCategory, PatientRecord,
    Priority, Recommendation, RecommendationCategory, RiskLevel,
};

pub fn generate_recommendations(
    deterioration: &DeteriorationResult,
    engagement: &EngagementResult,
    _patient: &PatientRecord,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    let mut recommend = |priority, action: &str, reason: String, category| {
        recommendations.push(Recommendation {
            priority,
            action: action.to_string(),
            reason,
            category,
        });
    };

    if deterioration.score >= 50 {
        recommend(
            Priority::Urgent,
            "Schedule immediate clinical assessment",
            format!("High health deterioration risk ({}/100)", deterioration.score),
            RecommendationCategory::Clinical,
        );
    }

    if engagement.score < 40 {
        recommend(
            Priority::Urgent,
            "Initiate immediate patient outreach call",
            format!("Critical engagement decline ({}/100)", engagement.score),
            RecommendationCategory::Engagement,
        );
    }

    if engagement
        .alerts
        .iter()
        .any(|a| a.kind == AlertKind::DisengagementSpiral)
    {
        recommend(
            Priority::Urgent,
            "Activate care coordinator intervention",
            "Patient entering disengagement pattern - early intervention critical".to_string(),
            RecommendationCategory::Intervention,
        );
    }

    if let Some(factor) =
        first_factor(deterioration, FactorCategory::Adherence, Some(RiskLevel::Critical))
    {
        recommend(
            Priority::High,
            "Review medication barriers with patient",
            factor.message.clone(),
            RecommendationCategory::Adherence,
        );
    }

    if let Some(factor) = first_factor(deterioration, FactorCategory::Appointments, None) {
        recommend(
            Priority::High,
            "Address appointment attendance barriers",
            factor.message.clone(),
            RecommendationCategory::Appointments,
        );
    }

    if let Some(factor) =
        first_factor(deterioration, FactorCategory::Vitals, Some(RiskLevel::Critical))
    {
        recommend(
            Priority::Urgent,
            "Emergency vital signs assessment required",
            factor.message.clone(),
            RecommendationCategory::Vitals,
        );
    }

    if engagement.alerts.iter().any(|a| a.kind.is_communication()) {
        recommend(
            Priority::Medium,
            "Re-establish communication channels",
            "Patient communication frequency declining".to_string(),
            RecommendationCategory::Communication,
        );
    }

    recommendations
}

/// First factor of `category`, optionally restricted to one severity.
fn first_factor(
    deterioration: &DeteriorationResult,
    category: FactorCategory,
    kind: Option<RiskLevel>,
) -> Option<&Factor> {
    deterioration
        .factors
        .iter()
        .filter(|f| f.category == category)
        .find(|f| kind.is_none_or(|k| f.kind == k))
}
