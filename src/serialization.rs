//! Saving and loading diagrams as JSON documents.
//!
//! Only layout is stored: node ids, geometry, visible attributes, link
//! endpoints, vertices and relationship inclusion flags. Node content is
//! re-derived from live metadata on load, so a saved diagram picks up
//! metadata changes.

use crate::geometry::{Point, Size};
use crate::measure::TextMetrics;
use crate::metadata::{Catalog, Entity};
use crate::model::{
    DiagramGraph, DiagramKind, ENTITY_ELEMENT_TYPE, Endpoint, ExcludedLink, Node,
    SELECTION_ELEMENT_TYPE, new_cell_id,
};
use crate::relationships::relationships_between;
use crate::viewport::{Viewport, ViewportOptions};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DIAGRAM_VERSION: &str = "1.0.0";

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Invalid diagram file format")]
    InvalidFormat,
    #[error("Unsupported diagram version: {0}")]
    UnsupportedVersion(String),
    #[error("Failed to parse diagram file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to read diagram file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramMetadata {
    pub zoom: f64,
    pub translate: Point,
    pub canvas_size: Size,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub cell_type: String,
    pub position: Point,
    pub size: Size,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    /// Absent in files that predate the field; those get the default rows.
    /// An empty list means every optional row was hidden.
    #[serde(default)]
    pub visible_attributes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRelationship {
    pub schema_name: String,
    #[serde(default = "included")]
    pub is_included: bool,
}

fn included() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedLink {
    pub id: String,
    pub source_id: String,
    pub source_schema_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    pub target_id: String,
    pub target_schema_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
    #[serde(default)]
    pub vertices: Vec<Point>,
    #[serde(default)]
    pub relationships: Vec<SerializedRelationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramDocument {
    pub id: String,
    pub name: String,
    pub version: String,
    pub created_at: String,
    pub updated_at: String,
    pub metadata: DiagramMetadata,
    #[serde(default)]
    pub diagram_type: DiagramKind,
    pub entities: Vec<SerializedEntity>,
    #[serde(default)]
    pub links: Vec<SerializedLink>,
    #[serde(default)]
    pub excluded_links: Vec<ExcludedLink>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Capture the graph and view as a new document with a fresh id.
pub fn serialize_diagram(graph: &DiagramGraph, viewport: &Viewport, name: &str) -> DiagramDocument {
    let timestamp = now();
    DiagramDocument {
        id: new_cell_id(),
        name: name.to_string(),
        version: DIAGRAM_VERSION.to_string(),
        created_at: timestamp.clone(),
        updated_at: timestamp,
        metadata: DiagramMetadata {
            zoom: viewport.zoom(),
            translate: viewport.translate(),
            canvas_size: viewport.canvas_size(),
        },
        diagram_type: graph.kind(),
        entities: graph.entity_nodes().filter_map(serialize_entity).collect(),
        links: serialize_links(graph),
        excluded_links: graph.excluded_links().to_vec(),
    }
}

/// Re-save a loaded document: id, name and creation time carry over.
pub fn serialize_with_identity(
    graph: &DiagramGraph,
    viewport: &Viewport,
    previous: &DiagramDocument,
) -> DiagramDocument {
    DiagramDocument {
        id: previous.id.clone(),
        created_at: previous.created_at.clone(),
        ..serialize_diagram(graph, viewport, &previous.name)
    }
}

fn serialize_entity(node: &Node) -> Option<SerializedEntity> {
    let entity = node.entity()?;
    Some(SerializedEntity {
        id: node.id.clone(),
        cell_type: ENTITY_ELEMENT_TYPE.to_string(),
        position: node.position,
        size: node.size,
        label: entity.display_name.clone(),
        schema_name: Some(entity.schema_name.clone()),
        visible_attributes: Some(entity.visible_attribute_names()),
    })
}

fn serialize_links(graph: &DiagramGraph) -> Vec<SerializedLink> {
    graph
        .links()
        .iter()
        .filter_map(|link| {
            let source = graph.node(&link.source.id)?.schema_name()?;
            let target = graph.node(&link.target.id)?.schema_name()?;
            Some(SerializedLink {
                id: link.id.clone(),
                source_id: link.source.id.clone(),
                source_schema_name: source.to_string(),
                source_port: link.source.port.clone(),
                target_id: link.target.id.clone(),
                target_schema_name: target.to_string(),
                target_port: link.target.port.clone(),
                vertices: link.vertices.clone(),
                relationships: link
                    .relationships
                    .iter()
                    .map(|r| SerializedRelationship {
                        schema_name: r.relationship_schema_name.clone(),
                        is_included: r.is_included,
                    })
                    .collect(),
                label: link.label.clone().map(serde_json::Value::String),
            })
        })
        .collect()
}

pub fn to_json(doc: &DiagramDocument) -> Result<String, SerializationError> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Parse and validate a document. `id`, `entities` and `metadata` are
/// required; files without links or exclusions load with none.
pub fn parse_diagram(json: &str) -> Result<DiagramDocument, SerializationError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let present = |key: &str| value.get(key).is_some_and(|v| !v.is_null());
    if !(present("id") && present("entities") && present("metadata")) {
        return Err(SerializationError::InvalidFormat);
    }
    let doc: DiagramDocument = serde_json::from_value(value)?;
    if doc.version.split('.').next() != DIAGRAM_VERSION.split('.').next() {
        return Err(SerializationError::UnsupportedVersion(doc.version));
    }
    Ok(doc)
}

pub fn load_diagram(path: impl AsRef<Path>) -> Result<DiagramDocument, SerializationError> {
    let json = std::fs::read_to_string(path)?;
    parse_diagram(&json)
}

/// Entity by schema name, or by display name for files that only carry
/// a label.
fn resolve_entity<'a>(catalog: &'a Catalog, saved: &SerializedEntity) -> Option<&'a Entity> {
    match &saved.schema_name {
        Some(schema) => catalog.entity(schema),
        None => catalog
            .entity(&saved.label)
            .or_else(|| catalog.entities().find(|e| e.display_name == saved.label)),
    }
}

/// Rebuild a graph and view from a document.
///
/// Entities missing from the metadata are skipped, and so are links whose
/// ends did not survive. Saved inclusion flags are applied to the
/// relationships the metadata currently has between the two entities.
pub fn deserialize_diagram(
    doc: &DiagramDocument,
    catalog: &Catalog,
    options: ViewportOptions,
) -> (DiagramGraph, Viewport) {
    deserialize_diagram_with_metrics(doc, catalog, options, TextMetrics::default())
}

/// [`deserialize_diagram`] measuring nodes with the given metrics.
pub fn deserialize_diagram_with_metrics(
    doc: &DiagramDocument,
    catalog: &Catalog,
    options: ViewportOptions,
    metrics: TextMetrics,
) -> (DiagramGraph, Viewport) {
    let mut graph = DiagramGraph::with_metrics(doc.diagram_type, metrics);

    for saved in &doc.entities {
        if saved.cell_type == SELECTION_ELEMENT_TYPE {
            continue;
        }
        if saved.cell_type != ENTITY_ELEMENT_TYPE {
            tracing::warn!(cell = %saved.id, kind = %saved.cell_type, "unknown cell type, skipped");
            continue;
        }
        let Some(entity) = resolve_entity(catalog, saved) else {
            tracing::warn!(cell = %saved.id, label = %saved.label, "entity not in metadata, skipped");
            continue;
        };
        let visible = saved.visible_attributes.as_deref();
        if graph
            .insert_entity(saved.id.clone(), entity, visible, saved.position)
            .is_none()
        {
            tracing::warn!(entity = %entity.schema_name, "entity listed twice, skipped");
        }
    }

    for saved in &doc.links {
        restore_link(&mut graph, catalog, saved);
    }
    for excluded in &doc.excluded_links {
        graph.exclude_pair(&excluded.source_schema_name, &excluded.target_schema_name);
    }
    graph.drain_events();

    let viewport = Viewport::restore(doc.metadata.zoom, doc.metadata.translate, options);
    (graph, viewport)
}

fn restore_link(graph: &mut DiagramGraph, catalog: &Catalog, saved: &SerializedLink) {
    let node_id = |id: &str, schema: &str| -> Option<String> {
        graph
            .node(id)
            .filter(|n| n.schema_name().is_some_and(|s| s.eq_ignore_ascii_case(schema)))
            .or_else(|| graph.node_by_schema(schema))
            .map(|n| n.id.clone())
    };
    let (Some(source_id), Some(target_id)) = (
        node_id(&saved.source_id, &saved.source_schema_name),
        node_id(&saved.target_id, &saved.target_schema_name),
    ) else {
        tracing::warn!(link = %saved.id, "link endpoint missing, dropped");
        return;
    };
    let (Some(source), Some(target)) = (
        catalog.entity(&saved.source_schema_name),
        catalog.entity(&saved.target_schema_name),
    ) else {
        return;
    };

    let mut relationships = relationships_between(source, target);
    for rel in relationships.iter_mut() {
        if let Some(flag) = saved
            .relationships
            .iter()
            .find(|r| r.schema_name == rel.relationship_schema_name)
        {
            rel.is_included = flag.is_included;
        }
    }
    if relationships.is_empty() {
        tracing::warn!(link = %saved.id, "entities are no longer related, link dropped");
        return;
    }

    let endpoint = |node: String, port: &Option<String>| -> Endpoint {
        let port = port.clone().filter(|p| {
            graph
                .node(&node)
                .and_then(|n| n.entity())
                .is_some_and(|e| e.port(p).is_some())
        });
        Endpoint { id: node, port }
    };
    let source_end = endpoint(source_id, &saved.source_port);
    let target_end = endpoint(target_id, &saved.target_port);

    if let Err(err) = graph.insert_link(
        saved.id.clone(),
        source_end,
        target_end,
        relationships,
        saved.vertices.clone(),
    ) {
        tracing::warn!(link = %saved.id, %err, "link not restored");
    }
}

/// Download name: `<name>_<timestamp>.json` with `:` and `.` in the
/// timestamp replaced by `-`.
pub fn suggested_file_name(doc: &DiagramDocument) -> String {
    let timestamp = now().replace([':', '.'], "-");
    format!("{}_{}.json", doc.name, timestamp)
}
