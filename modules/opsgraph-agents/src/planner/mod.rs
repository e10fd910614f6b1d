//! Answers fixed question shapes from graph content alone.
//!
//! The planner holds an `EntitySchema` and nothing else: no extractor and no
//! source text, so every answer is explainable in terms of stored nodes and
//! edges. Routines report validation and lookup failures as
//! `{success: false, error}` answers; only storage failures surface as `Err`.

pub mod analysis;
pub mod routes;

use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use opsgraph_common::{Node, NodeKind};
use opsgraph_graph::{env_var_key, EntitySchema, GraphError};

use analysis::{
    completion_percentage, group_by_cause, missing_env_var_blockers, recent_incidents,
    risk_score, rollout_recommendations, Analysis, DependenciesReport, Health,
    MissingEnvVarsReport, RelatedIncidentsReport, RiskLevel, RolloutBlockersReport,
    ServiceImpactsReport, ServiceReach, ENV_VAR_NOTE_THRESHOLD,
};
pub use routes::{route, Routine, ROUTES};

const DEPENDENCY_HOPS: u32 = 2;

#[derive(Debug, thiserror::Error)]
enum PlannerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("pattern not recognized")]
    Unrecognized,

    #[error(transparent)]
    Storage(#[from] GraphError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionContext {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub present_env_vars: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerAnswer {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine: Option<Routine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
}

impl PlannerAnswer {
    fn answered(routine: Routine, analysis: Analysis) -> Self {
        Self {
            success: true,
            routine: Some(routine),
            error: None,
            analysis: Some(analysis),
        }
    }

    fn failed(routine: Option<Routine>, error: String) -> Self {
        Self {
            success: false,
            routine,
            error: Some(error),
            analysis: None,
        }
    }
}

/// Turns a routine result into an answer, letting storage failures escape.
fn settle(
    routine: Routine,
    result: Result<Analysis, PlannerError>,
) -> Result<PlannerAnswer, GraphError> {
    match result {
        Ok(analysis) => Ok(PlannerAnswer::answered(routine, analysis)),
        Err(PlannerError::Storage(e)) => Err(e),
        Err(e) => {
            debug!(routine = %routine, error = %e, "Planner declined");
            Ok(PlannerAnswer::failed(Some(routine), e.to_string()))
        }
    }
}

/// Empty and whitespace-only values count as absent.
fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, PlannerError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PlannerError::Validation(format!("{field} is required")))
}

#[derive(Clone)]
pub struct Planner {
    schema: EntitySchema,
}

impl Planner {
    pub fn new(schema: EntitySchema) -> Self {
        Self { schema }
    }

    pub async fn answer_question(
        &self,
        question: &str,
        context: &QuestionContext,
    ) -> Result<PlannerAnswer, GraphError> {
        let Some(routine) = route(question) else {
            info!(question, "No planner route matched");
            return Ok(PlannerAnswer::failed(
                None,
                PlannerError::Unrecognized.to_string(),
            ));
        };
        info!(question, routine = %routine, "Routing planner question");
        self.run(routine, context).await
    }

    /// Run one routine directly, bypassing question routing.
    pub async fn run(
        &self,
        routine: Routine,
        context: &QuestionContext,
    ) -> Result<PlannerAnswer, GraphError> {
        let service = context.service_name.as_deref();
        match routine {
            Routine::RolloutBlockers => self.analyze_rollout_blockers(service).await,
            Routine::MissingEnvVars => {
                self.find_missing_env_vars(service, &context.present_env_vars)
                    .await
            }
            Routine::RelatedIncidents => self.find_related_incidents(service).await,
            Routine::ServiceImpacts => {
                self.analyze_service_impacts(context.incident_id.as_deref())
                    .await
            }
            Routine::Dependencies => self.analyze_dependencies(service).await,
        }
    }

    pub async fn analyze_rollout_blockers(
        &self,
        service_name: Option<&str>,
    ) -> Result<PlannerAnswer, GraphError> {
        let result = self.rollout_blockers(service_name).await;
        settle(Routine::RolloutBlockers, result)
    }

    pub async fn find_missing_env_vars(
        &self,
        service_name: Option<&str>,
        present_env_vars: &[String],
    ) -> Result<PlannerAnswer, GraphError> {
        let result = self.missing_env_vars(service_name, present_env_vars).await;
        settle(Routine::MissingEnvVars, result)
    }

    pub async fn find_related_incidents(
        &self,
        service_name: Option<&str>,
    ) -> Result<PlannerAnswer, GraphError> {
        let result = self.related_incidents(service_name).await;
        settle(Routine::RelatedIncidents, result)
    }

    pub async fn analyze_service_impacts(
        &self,
        incident_id: Option<&str>,
    ) -> Result<PlannerAnswer, GraphError> {
        let result = self.service_impacts(incident_id).await;
        settle(Routine::ServiceImpacts, result)
    }

    pub async fn analyze_dependencies(
        &self,
        service_name: Option<&str>,
    ) -> Result<PlannerAnswer, GraphError> {
        let result = self.dependencies(service_name).await;
        settle(Routine::Dependencies, result)
    }

    // --- Routines ---

    async fn existing_service(&self, service_name: Option<&str>) -> Result<Node, PlannerError> {
        let name = required(service_name, "serviceName")?;
        self.schema
            .get_service(name)
            .await?
            .ok_or_else(|| PlannerError::NotFound(format!("Service '{name}' not found in graph")))
    }

    async fn rollout_blockers(&self, service_name: Option<&str>) -> Result<Analysis, PlannerError> {
        let service = self.existing_service(service_name).await?;
        let name = service.identifier().to_string();

        let required_env_vars = self.schema.get_required_env_vars_for_service(&name).await?;
        let risks = self
            .schema
            .get_incidents_related_to_rollout_risks(&name)
            .await?;

        let env_keys: Vec<String> = required_env_vars.iter().map(env_var_key).collect();
        let incident_ids: Vec<String> = risks
            .incidents
            .iter()
            .map(|n| n.identifier().to_string())
            .collect();

        Ok(Analysis::RolloutBlockers(RolloutBlockersReport {
            recommendations: rollout_recommendations(&name, &env_keys, &incident_ids),
            service,
            required_env_vars,
            related_incidents: risks.incidents,
            risk_factors: risks.risk_factors,
        }))
    }

    async fn missing_env_vars(
        &self,
        service_name: Option<&str>,
        present_env_vars: &[String],
    ) -> Result<Analysis, PlannerError> {
        let service = self.existing_service(service_name).await?;
        let name = service.identifier();

        let partition = self
            .schema
            .find_missing_env_vars_for_rollout(name, present_env_vars)
            .await?;

        Ok(Analysis::MissingEnvVars(MissingEnvVarsReport {
            service: name.to_string(),
            completion_percentage: completion_percentage(
                partition.present.len(),
                partition.required.len(),
            ),
            blockers: missing_env_var_blockers(name, &partition.missing),
            required: partition.required,
            present: partition.present,
            missing: partition.missing,
            missing_details: partition.missing_nodes,
        }))
    }

    async fn related_incidents(&self, service_name: Option<&str>) -> Result<Analysis, PlannerError> {
        let service = self.existing_service(service_name).await?;
        let name = service.identifier();

        let incidents = self.schema.get_incidents_for_service(name).await?;
        let required_env_var_count = self
            .schema
            .get_required_env_vars_for_service(name)
            .await?
            .len();
        let score = risk_score(incidents.len(), required_env_var_count);

        Ok(Analysis::RelatedIncidents(RelatedIncidentsReport {
            service: name.to_string(),
            total_incidents: incidents.len(),
            incidents_by_cause: group_by_cause(&incidents),
            recent_incidents: recent_incidents(&incidents, Utc::now()),
            incidents,
            required_env_var_count,
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
        }))
    }

    async fn service_impacts(&self, incident_id: Option<&str>) -> Result<Analysis, PlannerError> {
        let id = required(incident_id, "incidentId")?;
        let incident = self
            .schema
            .get_incident(id)
            .await?
            .ok_or_else(|| PlannerError::NotFound(format!("Incident '{id}' not found in graph")))?;

        let directly_impacted = self
            .schema
            .get_services_impacted_by_incident(incident.identifier())
            .await?;

        let extended_impact = try_join_all(
            directly_impacted
                .iter()
                .map(|service| self.service_reach(service.identifier())),
        )
        .await?;
        let total_blast_radius = extended_impact.iter().map(|r| r.blast_radius).sum();

        Ok(Analysis::ServiceImpacts(ServiceImpactsReport {
            incident,
            directly_impacted,
            extended_impact,
            total_blast_radius,
        }))
    }

    async fn service_reach(&self, service: &str) -> Result<ServiceReach, GraphError> {
        let neighbors = self
            .schema
            .get_neighborhood(NodeKind::Service, service, 1)
            .await?;
        let count = |kind: NodeKind| neighbors.iter().filter(|n| n.node.kind == kind).count();
        let connected_services = count(NodeKind::Service);
        let connected_env_vars = count(NodeKind::EnvVar);
        Ok(ServiceReach {
            service: service.to_string(),
            connected_services,
            connected_env_vars,
            blast_radius: connected_services + connected_env_vars,
        })
    }

    async fn dependencies(&self, service_name: Option<&str>) -> Result<Analysis, PlannerError> {
        let service = self.existing_service(service_name).await?;
        let name = service.identifier();

        let neighbors = self
            .schema
            .get_neighborhood(NodeKind::Service, name, DEPENDENCY_HOPS)
            .await?;

        let mut env_vars = Vec::new();
        let mut incidents = Vec::new();
        let mut services = Vec::new();
        for neighbor in neighbors {
            match neighbor.node.kind {
                NodeKind::EnvVar => env_vars.push(neighbor.node),
                NodeKind::Incident => incidents.push(neighbor.node),
                NodeKind::Service => services.push(neighbor.node),
            }
        }

        let health = if incidents.is_empty() {
            Health::Healthy
        } else {
            Health::Warning
        };
        let mut notes = Vec::new();
        if env_vars.len() > ENV_VAR_NOTE_THRESHOLD {
            notes.push(format!(
                "{name} depends on {} environment variables; consider consolidating configuration",
                env_vars.len()
            ));
        }

        Ok(Analysis::Dependencies(DependenciesReport {
            service: name.to_string(),
            env_vars,
            incidents,
            services,
            health,
            notes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_context_values_are_missing() {
        assert!(matches!(
            required(None, "serviceName"),
            Err(PlannerError::Validation(m)) if m == "serviceName is required"
        ));
        assert!(required(Some("   "), "serviceName").is_err());
        assert_eq!(required(Some(" crm7 "), "serviceName").unwrap(), "crm7");
    }

    #[test]
    fn failed_answer_omits_analysis() {
        let answer = PlannerAnswer::failed(None, "pattern not recognized".into());
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "pattern not recognized");
        assert!(json.get("analysis").is_none());
        assert!(json.get("routine").is_none());
    }
}
