//! Report shapes and the small scoring rules each routine applies.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use opsgraph_common::{Edge, Node};

/// Incidents newer than this are flagged as recent.
pub const RECENT_INCIDENT_DAYS: i64 = 30;

/// Above this many required env vars a service's rollout risk is raised.
pub const ENV_VAR_RISK_THRESHOLD: usize = 5;

/// Above this many env vars a dependency report carries a sprawl note.
pub const ENV_VAR_NOTE_THRESHOLD: usize = 10;

/// Cause bucket for incidents without a `cause` property.
pub const UNKNOWN_CAUSE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s < 20 => RiskLevel::Low,
            s if s < 50 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub priority: Priority,
    pub action: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blocker {
    pub severity: Priority,
    pub env_var: String,
    pub message: String,
}

/// Per-service blast radius: how many services and env vars sit one hop away.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReach {
    pub service: String,
    pub connected_services: usize,
    pub connected_env_vars: usize,
    pub blast_radius: usize,
}

// --- Reports ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutBlockersReport {
    pub service: Node,
    pub required_env_vars: Vec<Node>,
    pub related_incidents: Vec<Node>,
    pub risk_factors: Vec<Edge>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingEnvVarsReport {
    pub service: String,
    pub required: Vec<String>,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub missing_details: Vec<Node>,
    /// `None` when the service requires nothing.
    pub completion_percentage: Option<f64>,
    pub blockers: Vec<Blocker>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedIncidentsReport {
    pub service: String,
    pub total_incidents: usize,
    pub incidents: Vec<Node>,
    /// Incident ids keyed by cause.
    pub incidents_by_cause: BTreeMap<String, Vec<String>>,
    pub recent_incidents: Vec<String>,
    pub required_env_var_count: usize,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceImpactsReport {
    pub incident: Node,
    pub directly_impacted: Vec<Node>,
    pub extended_impact: Vec<ServiceReach>,
    pub total_blast_radius: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependenciesReport {
    pub service: String,
    pub env_vars: Vec<Node>,
    pub incidents: Vec<Node>,
    pub services: Vec<Node>,
    pub health: Health,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Analysis {
    RolloutBlockers(RolloutBlockersReport),
    MissingEnvVars(MissingEnvVarsReport),
    RelatedIncidents(RelatedIncidentsReport),
    ServiceImpacts(ServiceImpactsReport),
    Dependencies(DependenciesReport),
}

// --- Rules ---

pub fn risk_score(incident_count: usize, required_env_var_count: usize) -> u32 {
    let incidents = u32::try_from(incident_count).unwrap_or(u32::MAX / 10);
    let env_penalty = if required_env_var_count > ENV_VAR_RISK_THRESHOLD {
        20
    } else {
        0
    };
    incidents.saturating_mul(10).saturating_add(env_penalty)
}

pub fn completion_percentage(present: usize, required: usize) -> Option<f64> {
    if required == 0 {
        return None;
    }
    Some(present as f64 / required as f64 * 100.0)
}

pub fn group_by_cause(incidents: &[Node]) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for incident in incidents {
        let cause = incident
            .property_str("cause")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNKNOWN_CAUSE);
        groups
            .entry(cause.to_string())
            .or_default()
            .push(incident.identifier().to_string());
    }
    groups
}

pub fn recent_incidents(incidents: &[Node], now: DateTime<Utc>) -> Vec<String> {
    let cutoff = now - Duration::days(RECENT_INCIDENT_DAYS);
    incidents
        .iter()
        .filter(|n| n.created_at >= cutoff)
        .map(|n| n.identifier().to_string())
        .collect()
}

pub fn rollout_recommendations(
    service: &str,
    env_var_keys: &[String],
    incident_ids: &[String],
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    if !env_var_keys.is_empty() {
        recommendations.push(Recommendation {
            priority: Priority::High,
            action: "Verify environment variables".to_string(),
            details: format!(
                "Confirm {} required variables are set for {service}: {}",
                env_var_keys.len(),
                env_var_keys.join(", ")
            ),
        });
    }
    if !incident_ids.is_empty() {
        recommendations.push(Recommendation {
            priority: Priority::Medium,
            action: "Review related incidents".to_string(),
            details: format!(
                "{} incidents touch {service} or its dependencies: {}",
                incident_ids.len(),
                incident_ids.join(", ")
            ),
        });
    }
    recommendations
}

pub fn missing_env_var_blockers(service: &str, missing: &[String]) -> Vec<Blocker> {
    missing
        .iter()
        .map(|key| Blocker {
            severity: Priority::High,
            env_var: key.clone(),
            message: format!("{service} requires {key}, which is not set"),
        })
        .collect()
}
