use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use ai_client::truncate_to_char_boundary;
use opsgraph_common::{Edge, EdgeKind, Node, NodeKind, Properties, SourceInfo};
use opsgraph_graph::{EntitySchema, GraphError};

use crate::extractor::{
    build_extraction_prompt, parse_extraction, ExtractedEntity, ExtractedRelationship,
    TextExtractor,
};

/// Longest source excerpt kept in provenance, in bytes.
pub const ORIGINAL_TEXT_LIMIT: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The extractor failed or returned something that is not an extraction.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Storage(#[from] GraphError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOptions {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Entity,
    Relationship,
}

/// One extracted item that could not be written. Siblings are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub kind: ItemKind,
    /// Position of the item in the extraction's list.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub success: bool,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub errors: Vec<ItemError>,
    pub source_info: SourceInfo,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ingest {}: {} nodes, {} edges, {} item errors",
            self.source_info.run_id,
            self.nodes.len(),
            self.edges.len(),
            self.errors.len(),
        )
    }
}

/// Turns free text into graph writes: extract, parse, then upsert item by item.
pub struct Ingestor {
    schema: EntitySchema,
    extractor: Arc<dyn TextExtractor>,
}

impl Ingestor {
    pub fn new(schema: EntitySchema, extractor: Arc<dyn TextExtractor>) -> Self {
        Self { schema, extractor }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub async fn ingest(
        &self,
        text: &str,
        options: IngestOptions,
    ) -> Result<IngestReport, IngestError> {
        let source_info = stamp_source(text, options);
        let run_id = source_info.run_id.clone();

        let prompt = build_extraction_prompt(text);
        debug!(run_id = %run_id, prompt_bytes = prompt.len(), "Requesting extraction");
        let raw = self.extractor.extract(&prompt).await.map_err(|e| {
            warn!(run_id = %run_id, error = %e, "Extractor call failed");
            IngestError::Extraction(format!("extractor call failed: {e}"))
        })?;

        let extraction = parse_extraction(&raw).map_err(|e| {
            warn!(run_id = %run_id, error = %e, "Unusable extraction response");
            IngestError::Extraction(e)
        })?;
        debug!(
            run_id = %run_id,
            entities = extraction.entities.len(),
            relationships = extraction.relationships.len(),
            "Extraction parsed"
        );

        let source = source_info.to_properties();
        let mut report = IngestReport {
            success: true,
            nodes: Vec::new(),
            edges: Vec::new(),
            errors: Vec::new(),
            source_info,
        };

        // Entities first so relationships can resolve their endpoints.
        for (index, item) in extraction.entities.into_iter().enumerate() {
            self.ingest_entity(index, item, &source, &mut report).await?;
        }
        for (index, item) in extraction.relationships.into_iter().enumerate() {
            self.ingest_relationship(index, item, &source, &mut report)
                .await?;
        }

        info!(
            run_id = %run_id,
            nodes = report.nodes.len(),
            edges = report.edges.len(),
            errors = report.errors.len(),
            "Ingest complete"
        );
        Ok(report)
    }

    pub async fn ingest_deployment_info(
        &self,
        text: &str,
        service_name: &str,
    ) -> Result<IngestReport, IngestError> {
        let service_name = service_name.trim();
        let options = IngestOptions {
            run_id: Some(format!(
                "deployment-{service_name}-{}",
                Utc::now().timestamp_millis()
            )),
            source_file: Some(format!("deployments/{service_name}")),
            line_number: None,
        };
        self.ingest(text, options).await
    }

    pub async fn ingest_incident_info(
        &self,
        text: &str,
        incident_id: &str,
    ) -> Result<IngestReport, IngestError> {
        let incident_id = incident_id.trim();
        let options = IngestOptions {
            run_id: Some(format!(
                "incident-{incident_id}-{}",
                Utc::now().timestamp_millis()
            )),
            source_file: Some(format!("incidents/{incident_id}")),
            line_number: None,
        };
        self.ingest(text, options).await
    }

    async fn ingest_entity(
        &self,
        index: usize,
        item: Value,
        source: &Properties,
        report: &mut IngestReport,
    ) -> Result<(), GraphError> {
        let item_type = declared_type(&item);
        let reject = |message: String| ItemError {
            kind: ItemKind::Entity,
            index,
            item_type: item_type.clone(),
            message,
        };

        let entity: ExtractedEntity = match serde_json::from_value(item) {
            Ok(entity) => entity,
            Err(e) => {
                report.reject(reject(format!("malformed entity: {e}")));
                return Ok(());
            }
        };
        let kind: NodeKind = match entity.kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                report.reject(reject(format!("{e}")));
                return Ok(());
            }
        };

        let written = match kind {
            NodeKind::Service => {
                self.schema
                    .create_service(&entity.identifier, entity.properties, source)
                    .await
            }
            NodeKind::EnvVar => {
                self.schema
                    .create_env_var(&entity.identifier, entity.properties, source)
                    .await
            }
            NodeKind::Incident => {
                self.schema
                    .create_incident(&entity.identifier, entity.properties, source)
                    .await
            }
        };

        match written {
            Ok(node) => {
                debug!(node_id = %node.id, "Upserted node");
                report.nodes.push(node);
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                report.reject(reject(e.to_string()));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn ingest_relationship(
        &self,
        index: usize,
        item: Value,
        source: &Properties,
        report: &mut IngestReport,
    ) -> Result<(), GraphError> {
        let item_type = declared_type(&item);
        let reject = |message: String| ItemError {
            kind: ItemKind::Relationship,
            index,
            item_type: item_type.clone(),
            message,
        };

        let relationship: ExtractedRelationship = match serde_json::from_value(item) {
            Ok(relationship) => relationship,
            Err(e) => {
                report.reject(reject(format!("malformed relationship: {e}")));
                return Ok(());
            }
        };
        let kind: EdgeKind = match relationship.kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                report.reject(reject(format!("{e}")));
                return Ok(());
            }
        };

        let (from_kind, to_kind) = kind.endpoints();
        let from = natural_identifier(from_kind, &relationship.from);
        let to = natural_identifier(to_kind, &relationship.to);

        let written = match kind {
            EdgeKind::ServiceRequiresEnvVar => {
                self.schema
                    .link_service_requires_env_var(from, to, relationship.properties, source)
                    .await
            }
            EdgeKind::IncidentImpactsService => {
                self.schema
                    .link_incident_impacts_service(from, to, relationship.properties, source)
                    .await
            }
        };

        match written {
            Ok(edge) => {
                debug!(edge_id = edge.id, edge_type = %edge.kind, "Upserted edge");
                report.edges.push(edge);
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                report.reject(reject(e.to_string()));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl IngestReport {
    fn reject(&mut self, error: ItemError) {
        warn!(
            run_id = %self.source_info.run_id,
            item = ?error.kind,
            index = error.index,
            error = %error.message,
            "Skipping extracted item"
        );
        self.errors.push(error);
    }
}

fn stamp_source(text: &str, options: IngestOptions) -> SourceInfo {
    let run_id = options
        .run_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("ingest-{}", Utc::now().timestamp_millis()));
    let mut info = SourceInfo::new(run_id);
    info.source_file = options.source_file;
    info.line_number = options.line_number;
    info.original_text = Some(truncate_to_char_boundary(text, ORIGINAL_TEXT_LIMIT).to_string());
    info
}

fn declared_type(item: &Value) -> Option<String> {
    item.get("type").and_then(Value::as_str).map(str::to_string)
}

/// Relationship endpoints sometimes arrive as full node ids (`svc:crm7`) or
/// with the lowercased kind name (`service:crm7`).
fn natural_identifier(kind: NodeKind, raw: &str) -> &str {
    let raw = raw.trim();
    match raw.split_once(':') {
        Some((head, rest))
            if head == kind.id_prefix() || head.eq_ignore_ascii_case(kind.as_str()) =>
        {
            rest.trim()
        }
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_run_id_is_timestamped() {
        let info = stamp_source("crm7", IngestOptions::default());
        assert!(info.run_id.starts_with("ingest-"));
        assert!(info.run_id["ingest-".len()..].parse::<i64>().is_ok());
        assert_eq!(info.original_text.as_deref(), Some("crm7"));
    }

    #[test]
    fn supplied_options_are_kept() {
        let info = stamp_source(
            "crm7",
            IngestOptions {
                run_id: Some("nightly".into()),
                source_file: Some("docs/deploy.md".into()),
                line_number: Some(12),
            },
        );
        assert_eq!(info.run_id, "nightly");
        assert_eq!(info.source_file.as_deref(), Some("docs/deploy.md"));
        assert_eq!(info.line_number, Some(12));
    }

    #[test]
    fn original_text_is_truncated() {
        let text = "é".repeat(ORIGINAL_TEXT_LIMIT);
        let info = stamp_source(&text, IngestOptions::default());
        let kept = info.original_text.unwrap();
        assert!(kept.len() <= ORIGINAL_TEXT_LIMIT);
        assert!(text.starts_with(&kept));
    }

    #[test]
    fn endpoint_prefix_is_stripped_only_for_matching_kind() {
        assert_eq!(natural_identifier(NodeKind::Service, "svc:crm7"), "crm7");
        assert_eq!(natural_identifier(NodeKind::Service, " crm7 "), "crm7");
        assert_eq!(
            natural_identifier(NodeKind::EnvVar, "svc:crm7"),
            "svc:crm7"
        );
    }

    #[test]
    fn kind_name_prefix_is_stripped() {
        assert_eq!(natural_identifier(NodeKind::Service, "service:crm7"), "crm7");
        assert_eq!(
            natural_identifier(NodeKind::EnvVar, "envvar:SUPABASE_URL"),
            "SUPABASE_URL"
        );
        assert_eq!(
            natural_identifier(NodeKind::Incident, "incident:INC-7"),
            "INC-7"
        );
        assert_eq!(
            natural_identifier(NodeKind::Service, "incident:INC-7"),
            "incident:INC-7"
        );
    }

    #[test]
    fn item_error_serializes_camel_case() {
        let error = ItemError {
            kind: ItemKind::Entity,
            index: 2,
            item_type: Some("Database".into()),
            message: "Unknown node type 'Database'".into(),
        };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["kind"], "entity");
        assert_eq!(json["itemType"], "Database");
    }
}
