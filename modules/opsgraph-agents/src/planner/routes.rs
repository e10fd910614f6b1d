//! Keyword routing for planner questions. First matching rule wins.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Routine {
    RolloutBlockers,
    MissingEnvVars,
    RelatedIncidents,
    ServiceImpacts,
    Dependencies,
}

impl Routine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Routine::RolloutBlockers => "rollout-blockers",
            Routine::MissingEnvVars => "missing-env-vars",
            Routine::RelatedIncidents => "related-incidents",
            Routine::ServiceImpacts => "service-impacts",
            Routine::Dependencies => "dependencies",
        }
    }
}

impl std::fmt::Display for Routine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Routine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rollout-blockers" => Ok(Routine::RolloutBlockers),
            "missing-env-vars" => Ok(Routine::MissingEnvVars),
            "related-incidents" => Ok(Routine::RelatedIncidents),
            "service-impacts" => Ok(Routine::ServiceImpacts),
            "dependencies" => Ok(Routine::Dependencies),
            other => Err(format!("Unknown analysis '{other}'")),
        }
    }
}

fn asks_rollout_blockers(q: &str) -> bool {
    q.contains("blocking") && q.contains("rollout")
}

fn asks_missing_env(q: &str) -> bool {
    q.contains("missing") && q.contains("env")
}

fn asks_related_incidents(q: &str) -> bool {
    q.contains("incidents") && q.contains("related")
}

fn asks_service_impact(q: &str) -> bool {
    q.contains("impact") && q.contains("service")
}

fn asks_dependencies(q: &str) -> bool {
    q.contains("dependencies") || q.contains("requires")
}

/// Evaluated in order against the lower-cased, trimmed question.
pub const ROUTES: &[(fn(&str) -> bool, Routine)] = &[
    (asks_rollout_blockers, Routine::RolloutBlockers),
    (asks_missing_env, Routine::MissingEnvVars),
    (asks_related_incidents, Routine::RelatedIncidents),
    (asks_service_impact, Routine::ServiceImpacts),
    (asks_dependencies, Routine::Dependencies),
];

pub fn route(question: &str) -> Option<Routine> {
    let normalized = question.trim().to_lowercase();
    ROUTES
        .iter()
        .find(|(matches, _)| matches(&normalized))
        .map(|(_, routine)| *routine)
}
