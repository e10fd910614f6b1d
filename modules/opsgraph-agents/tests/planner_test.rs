//! Planner routines over fixture graphs on the in-memory store.

use std::sync::Arc;

use serde_json::{json, Value};

use opsgraph_agents::testing::{
    add_incident, crm7_schema, fixture_source, memory_schema, FailingStore,
};
use opsgraph_agents::{Planner, PlannerAnswer, QuestionContext, Routine};
use opsgraph_common::Properties;
use opsgraph_graph::{EntitySchema, GraphError};

fn service_context(service: &str) -> QuestionContext {
    QuestionContext {
        service_name: Some(service.to_string()),
        ..Default::default()
    }
}

/// The answer as the HTTP layer would see it.
fn body(answer: &PlannerAnswer) -> Value {
    serde_json::to_value(answer).unwrap()
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn missing_env_question_routes_and_partitions() {
    let planner = Planner::new(crm7_schema().await);
    let context = QuestionContext {
        service_name: Some("crm7".into()),
        present_env_vars: vec!["SUPABASE_URL".into()],
        ..Default::default()
    };

    let answer = planner
        .answer_question("what's missing for crm7 env setup", &context)
        .await
        .unwrap();

    assert!(answer.success);
    assert_eq!(answer.routine, Some(Routine::MissingEnvVars));
    let json = body(&answer);
    assert_eq!(json["analysis"]["missing"], json!(["SUPABASE_ANON_KEY"]));
    assert_eq!(json["analysis"]["present"], json!(["SUPABASE_URL"]));
    assert_eq!(json["analysis"]["completionPercentage"], json!(50.0));
    assert_eq!(json["analysis"]["blockers"][0]["severity"], "high");
    assert_eq!(json["analysis"]["blockers"][0]["envVar"], "SUPABASE_ANON_KEY");
}

#[tokio::test]
async fn unrecognized_question_is_an_error_value() {
    let planner = Planner::new(crm7_schema().await);

    let answer = planner
        .answer_question("how tall is the server rack?", &service_context("crm7"))
        .await
        .unwrap();

    assert!(!answer.success);
    assert_eq!(answer.error.as_deref(), Some("pattern not recognized"));
    assert!(answer.routine.is_none());
}

#[tokio::test]
async fn routed_question_without_context_fails_validation() {
    let planner = Planner::new(crm7_schema().await);

    let answer = planner
        .answer_question("What is blocking the rollout?", &QuestionContext::default())
        .await
        .unwrap();
    assert!(!answer.success);
    assert_eq!(answer.routine, Some(Routine::RolloutBlockers));
    assert_eq!(answer.error.as_deref(), Some("serviceName is required"));

    let answer = planner
        .answer_question(
            "which service did this impact",
            &QuestionContext {
                incident_id: Some("".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(answer.error.as_deref(), Some("incidentId is required"));
}

// =========================================================================
// Rollout blockers
// =========================================================================

#[tokio::test]
async fn rollout_blockers_for_unknown_service() {
    let planner = Planner::new(crm7_schema().await);

    let answer = planner
        .analyze_rollout_blockers(Some("nonexistent-service"))
        .await
        .unwrap();

    assert!(!answer.success);
    assert_eq!(
        answer.error.as_deref(),
        Some("Service 'nonexistent-service' not found in graph")
    );
    assert!(answer.analysis.is_none());
}

#[tokio::test]
async fn rollout_blockers_recommend_env_check_and_incident_review() {
    let schema = crm7_schema().await;
    add_incident(&schema, "INC-101", "crm7", "missing env var").await;
    let planner = Planner::new(schema);

    let answer = planner.analyze_rollout_blockers(Some("crm7")).await.unwrap();
    assert!(answer.success);

    let json = body(&answer);
    let analysis = &json["analysis"];
    assert_eq!(analysis["service"]["id"], "svc:crm7");
    assert_eq!(analysis["requiredEnvVars"].as_array().unwrap().len(), 2);
    assert_eq!(analysis["relatedIncidents"][0]["id"], "inc:INC-101");
    assert_eq!(analysis["riskFactors"].as_array().unwrap().len(), 3);
    assert_eq!(analysis["recommendations"][0]["priority"], "high");
    assert_eq!(analysis["recommendations"][1]["priority"], "medium");
}

#[tokio::test]
async fn rollout_blockers_for_bare_service_recommend_nothing() {
    let schema = memory_schema();
    schema
        .create_service("static-site", Properties::new(), &fixture_source())
        .await
        .unwrap();
    let planner = Planner::new(schema);

    let answer = planner
        .analyze_rollout_blockers(Some("static-site"))
        .await
        .unwrap();
    let json = body(&answer);
    assert_eq!(json["analysis"]["recommendations"], json!([]));
}

// =========================================================================
// Missing env vars
// =========================================================================

#[tokio::test]
async fn missing_env_vars_without_requirements_has_no_percentage() {
    let schema = memory_schema();
    schema
        .create_service("static-site", Properties::new(), &fixture_source())
        .await
        .unwrap();
    let planner = Planner::new(schema);

    let answer = planner
        .find_missing_env_vars(Some("static-site"), &[])
        .await
        .unwrap();
    assert!(answer.success);
    let json = body(&answer);
    assert_eq!(json["analysis"]["completionPercentage"], Value::Null);
    assert_eq!(json["analysis"]["blockers"], json!([]));
}

#[tokio::test]
async fn missing_env_vars_with_nothing_present() {
    let planner = Planner::new(crm7_schema().await);

    let answer = planner.find_missing_env_vars(Some("crm7"), &[]).await.unwrap();
    let json = body(&answer);
    assert_eq!(
        json["analysis"]["missing"],
        json!(["SUPABASE_ANON_KEY", "SUPABASE_URL"])
    );
    assert_eq!(json["analysis"]["completionPercentage"], json!(0.0));
    assert_eq!(json["analysis"]["blockers"].as_array().unwrap().len(), 2);
}

// =========================================================================
// Related incidents
// =========================================================================

#[tokio::test]
async fn related_incidents_score_one_incident_as_low() {
    let schema = crm7_schema().await;
    add_incident(&schema, "INC-101", "crm7", "missing env var").await;
    let planner = Planner::new(schema);

    let answer = planner.find_related_incidents(Some("crm7")).await.unwrap();
    assert!(answer.success);

    let json = body(&answer);
    let analysis = &json["analysis"];
    assert_eq!(analysis["totalIncidents"], 1);
    assert_eq!(analysis["riskScore"], 10);
    assert_eq!(analysis["riskLevel"], "low");
    assert_eq!(analysis["incidentsByCause"]["missing env var"], json!(["INC-101"]));
    // Created just now, so inside the recent window.
    assert_eq!(analysis["recentIncidents"], json!(["INC-101"]));
}

#[tokio::test]
async fn related_incidents_penalize_env_sprawl() {
    let schema = memory_schema();
    let source = fixture_source();
    schema
        .create_service("monolith", Properties::new(), &source)
        .await
        .unwrap();
    for i in 0..6 {
        let key = format!("MONOLITH_VAR_{i}");
        schema
            .create_env_var(&key, Properties::new(), &source)
            .await
            .unwrap();
        schema
            .link_service_requires_env_var("monolith", &key, Properties::new(), &source)
            .await
            .unwrap();
    }
    add_incident(&schema, "INC-1", "monolith", "timeout").await;
    add_incident(&schema, "INC-2", "monolith", "timeout").await;
    let planner = Planner::new(schema);

    let answer = planner
        .find_related_incidents(Some("monolith"))
        .await
        .unwrap();
    let json = body(&answer);
    assert_eq!(json["analysis"]["riskScore"], 40);
    assert_eq!(json["analysis"]["riskLevel"], "medium");
    assert_eq!(
        json["analysis"]["incidentsByCause"]["timeout"],
        json!(["INC-1", "INC-2"])
    );
}

// =========================================================================
// Service impacts
// =========================================================================

#[tokio::test]
async fn service_impacts_count_blast_radius() {
    let schema = crm7_schema().await;
    add_incident(&schema, "INC-101", "crm7", "missing env var").await;
    let planner = Planner::new(schema);

    let answer = planner
        .analyze_service_impacts(Some("INC-101"))
        .await
        .unwrap();
    assert!(answer.success);

    let json = body(&answer);
    let analysis = &json["analysis"];
    assert_eq!(analysis["directlyImpacted"][0]["id"], "svc:crm7");
    // crm7's one-hop neighbors: two env vars and the incident itself.
    assert_eq!(analysis["extendedImpact"][0]["connectedEnvVars"], 2);
    assert_eq!(analysis["extendedImpact"][0]["connectedServices"], 0);
    assert_eq!(analysis["extendedImpact"][0]["blastRadius"], 2);
    assert_eq!(analysis["totalBlastRadius"], 2);
}

#[tokio::test]
async fn service_impacts_for_unknown_incident() {
    let planner = Planner::new(crm7_schema().await);

    let answer = planner
        .analyze_service_impacts(Some("INC-404"))
        .await
        .unwrap();
    assert!(!answer.success);
    assert_eq!(
        answer.error.as_deref(),
        Some("Incident 'INC-404' not found in graph")
    );
}

// =========================================================================
// Dependencies
// =========================================================================

#[tokio::test]
async fn dependencies_partition_two_hop_neighborhood() {
    let schema = crm7_schema().await;
    let source = fixture_source();
    // billing shares SUPABASE_URL, so it sits two hops from crm7.
    schema
        .create_service("billing", Properties::new(), &source)
        .await
        .unwrap();
    schema
        .link_service_requires_env_var("billing", "SUPABASE_URL", Properties::new(), &source)
        .await
        .unwrap();
    let planner = Planner::new(schema);

    let answer = planner
        .answer_question("what does crm7 require? list dependencies", &service_context("crm7"))
        .await
        .unwrap();
    assert_eq!(answer.routine, Some(Routine::Dependencies));

    let json = body(&answer);
    let analysis = &json["analysis"];
    assert_eq!(analysis["envVars"].as_array().unwrap().len(), 2);
    assert_eq!(analysis["services"][0]["id"], "svc:billing");
    assert_eq!(analysis["incidents"], json!([]));
    assert_eq!(analysis["health"], "healthy");
    assert_eq!(analysis["notes"], json!([]));
}

#[tokio::test]
async fn dependencies_warn_when_incidents_present() {
    let schema = crm7_schema().await;
    add_incident(&schema, "INC-101", "crm7", "missing env var").await;
    let planner = Planner::new(schema);

    let answer = planner.analyze_dependencies(Some("crm7")).await.unwrap();
    let json = body(&answer);
    assert_eq!(json["analysis"]["health"], "warning");
    assert_eq!(json["analysis"]["incidents"][0]["id"], "inc:INC-101");
}

#[tokio::test]
async fn storage_failure_is_an_error_not_a_decline() {
    let store = Arc::new(FailingStore::new().fail_on("svc:crm7"));
    let planner = Planner::new(EntitySchema::new(store));

    let err = planner
        .find_related_incidents(Some("crm7"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Storage(_)));

    let routed = planner
        .answer_question("Any incidents related to crm7?", &service_context("crm7"))
        .await;
    assert!(routed.is_err());
}
