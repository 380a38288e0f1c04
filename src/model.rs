//! The diagram graph: entity nodes with per-attribute ports, relationship
//! links between them, and the transient selection container.
//!
//! Every mutation that matters for edge routing (cells added or removed,
//! element geometry, link endpoints and vertices) is written to a journal the
//! routing bridge drains. Changes that come back from the router are applied
//! with [`ChangeOrigin::Router`] and are not journaled, so routed results never
//! feed back into the router.

use crate::geometry::{Point, Rect, Size};
use crate::layout::Placement;
use crate::measure::TextMetrics;
use crate::metadata::{Catalog, Entity, Group};
use crate::relationships::{RelationshipInformation, lookup_targets_between, relationships_between};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ENTITY_ELEMENT_TYPE: &str = "diagram.EntityElement";
pub const SELECTION_ELEMENT_TYPE: &str = "selection.SelectionElement";
pub const RELATIONSHIP_LINK_TYPE: &str = "diagram.RelationshipLink";

const ENTITY_Z: i32 = 10;

pub type NodeId = String;
pub type LinkId = String;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelError {
    #[error("Entity not in diagram: {0}")]
    UnknownEntity(String),
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Link not found: {0}")]
    LinkNotFound(String),
    #[error("Attribute {attribute} not found on {entity}")]
    AttributeNotFound { entity: String, attribute: String },
    #[error("Cannot embed {child} into {parent}: it would contain itself")]
    EmbedCycle { parent: String, child: String },
}

pub fn new_cell_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// How entity nodes are drawn across the whole diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramKind {
    Simple,
    #[default]
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub side: PortSide,
    /// Offset from the node's top edge.
    pub y: f64,
}

pub fn port_id(attribute_schema: &str) -> String {
    format!("port-{}", attribute_schema.to_lowercase())
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibleAttribute {
    pub schema_name: String,
    pub display_name: String,
    pub type_label: String,
    pub is_primary_key: bool,
    pub is_lookup: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityNode {
    pub schema_name: String,
    pub display_name: String,
    pub attributes: Vec<VisibleAttribute>,
    pub ports: Vec<Port>,
    pub relationship_count: usize,
}

impl EntityNode {
    /// Derive the node content from live metadata. The primary key, when
    /// the entity has one, is always the first row and always has a port.
    pub fn build(
        entity: &Entity,
        visible: &[String],
        kind: DiagramKind,
        metrics: &TextMetrics,
    ) -> (Self, Size) {
        let is_visible = |schema: &str| visible.iter().any(|v| v.eq_ignore_ascii_case(schema));

        let mut attributes: Vec<VisibleAttribute> = Vec::new();
        if let Some(pk) = entity.primary_key() {
            attributes.push(VisibleAttribute {
                schema_name: pk.schema_name.clone(),
                display_name: pk.display_name.clone(),
                type_label: pk.type_label().to_string(),
                is_primary_key: true,
                is_lookup: pk.is_lookup(),
            });
        }
        attributes.extend(
            entity
                .attributes
                .iter()
                .filter(|a| !a.is_primary_id && is_visible(&a.schema_name))
                .map(|a| VisibleAttribute {
                    schema_name: a.schema_name.clone(),
                    display_name: a.display_name.clone(),
                    type_label: a.type_label().to_string(),
                    is_primary_key: false,
                    is_lookup: a.is_lookup(),
                }),
        );

        let (ports, size) = match kind {
            DiagramKind::Detailed => {
                let ports = attributes
                    .iter()
                    .enumerate()
                    .filter_map(|(i, a)| {
                        let side = if a.is_lookup {
                            PortSide::Right
                        } else if a.is_primary_key {
                            PortSide::Left
                        } else {
                            return None;
                        };
                        Some(Port {
                            id: port_id(&a.schema_name),
                            side,
                            y: metrics.row_y(i),
                        })
                    })
                    .collect();
                let rows: Vec<(String, String)> = attributes
                    .iter()
                    .map(|a| (a.display_name.clone(), a.type_label.clone()))
                    .collect();
                let (w, h) = metrics.detailed_size(&entity.display_name, &rows);
                (ports, Size::new(w, h))
            }
            DiagramKind::Simple => {
                let (w, h) = metrics.simple_size(&entity.display_name);
                (Vec::new(), Size::new(w, h))
            }
        };

        (
            EntityNode {
                schema_name: entity.schema_name.clone(),
                display_name: entity.display_name.clone(),
                attributes,
                ports,
                relationship_count: entity.relationship_count(),
            },
            size,
        )
    }

    pub fn visible_attribute_names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.schema_name.clone()).collect()
    }

    pub fn port(&self, id: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == id)
    }

    pub fn primary_key_port(&self) -> Option<&Port> {
        self.attributes
            .first()
            .filter(|a| a.is_primary_key)
            .and_then(|a| self.port(&port_id(&a.schema_name)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Entity(EntityNode),
    Selection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Point,
    pub size: Size,
    pub z: i32,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn bbox(&self) -> Rect {
        Rect::from_parts(self.position, self.size)
    }

    pub fn entity(&self) -> Option<&EntityNode> {
        match &self.kind {
            NodeKind::Entity(e) => Some(e),
            NodeKind::Selection => None,
        }
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.entity().map(|e| e.schema_name.as_str())
    }

    pub fn is_selection(&self) -> bool {
        matches!(self.kind, NodeKind::Selection)
    }

    /// Absolute position of a port, or the node centre without one.
    pub fn anchor(&self, port: Option<&str>) -> Point {
        let port = port.and_then(|id| self.entity().and_then(|e| e.port(id)));
        match port {
            Some(p) => match p.side {
                PortSide::Left => Point::new(self.position.x, self.position.y + p.y),
                PortSide::Right => {
                    Point::new(self.position.x + self.size.width, self.position.y + p.y)
                }
            },
            None => self.bbox().center(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl Endpoint {
    pub fn node(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            port: None,
        }
    }

    pub fn port(id: impl Into<NodeId>, port: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            port: Some(port.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: LinkId,
    pub source: Endpoint,
    pub target: Endpoint,
    pub vertices: Vec<Point>,
    pub relationships: Vec<RelationshipInformation>,
    pub label: Option<String>,
}

impl Link {
    pub fn connects(&self, node: &str) -> bool {
        self.source.id == node || self.target.id == node
    }
}

/// A relationship pair the user removed from the diagram; automatic linking
/// skips it until it is included again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedLink {
    pub source_schema_name: String,
    pub target_schema_name: String,
}

impl ExcludedLink {
    fn matches(&self, a: &str, b: &str) -> bool {
        (self.source_schema_name.eq_ignore_ascii_case(a)
            && self.target_schema_name.eq_ignore_ascii_case(b))
            || (self.source_schema_name.eq_ignore_ascii_case(b)
                && self.target_schema_name.eq_ignore_ascii_case(a))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub id: String,
    pub position: Point,
    pub size: Size,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl ElementSnapshot {
    pub fn bbox(&self) -> Rect {
        Rect::from_parts(self.position, self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub id: String,
    pub source: Endpoint,
    pub target: Endpoint,
    #[serde(default)]
    pub vertices: Vec<Point>,
}

/// Serializable view of one cell, as exchanged with the routing worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CellSnapshot {
    #[serde(rename = "diagram.EntityElement")]
    Entity(ElementSnapshot),
    #[serde(rename = "selection.SelectionElement")]
    Selection(ElementSnapshot),
    #[serde(rename = "diagram.RelationshipLink")]
    Link(LinkSnapshot),
}

impl CellSnapshot {
    pub fn id(&self) -> &str {
        match self {
            CellSnapshot::Entity(e) | CellSnapshot::Selection(e) => &e.id,
            CellSnapshot::Link(l) => &l.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    Add(String),
    Change(String),
    Remove(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    User,
    Router,
}

#[derive(Debug, Clone)]
pub struct DiagramGraph {
    kind: DiagramKind,
    metrics: TextMetrics,
    nodes: Vec<Node>,
    links: Vec<Link>,
    /// lowercase schema name -> node id
    schema_index: HashMap<String, NodeId>,
    excluded: Vec<ExcludedLink>,
    journal: Vec<GraphEvent>,
}

impl Default for DiagramGraph {
    fn default() -> Self {
        Self::new(DiagramKind::default())
    }
}

impl DiagramGraph {
    pub fn new(kind: DiagramKind) -> Self {
        Self::with_metrics(kind, TextMetrics::default())
    }

    pub fn with_metrics(kind: DiagramKind, metrics: TextMetrics) -> Self {
        Self {
            kind,
            metrics,
            nodes: Vec::new(),
            links: Vec::new(),
            schema_index: HashMap::new(),
            excluded: Vec::new(),
            journal: Vec::new(),
        }
    }

    pub fn kind(&self) -> DiagramKind {
        self.kind
    }

    pub fn metrics(&self) -> &TextMetrics {
        &self.metrics
    }

    // --- Queries -------------------------------------------------------------

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn node_by_schema(&self, schema_name: &str) -> Option<&Node> {
        let id = self.schema_index.get(&schema_name.to_lowercase())?;
        self.node(id)
    }

    pub fn contains_entity(&self, schema_name: &str) -> bool {
        self.schema_index.contains_key(&schema_name.to_lowercase())
    }

    pub fn entity_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.is_selection())
    }

    pub fn entity_count(&self) -> usize {
        self.schema_index.len()
    }

    pub fn connected_links(&self, node: &str) -> Vec<&Link> {
        self.links.iter().filter(|l| l.connects(node)).collect()
    }

    pub fn entity_bboxes(&self) -> Vec<Rect> {
        self.entity_nodes().map(Node::bbox).collect()
    }

    /// Bounds of every cell, link vertices included.
    pub fn bbox(&self) -> Option<Rect> {
        let mut rects: Vec<Rect> = self.nodes.iter().map(Node::bbox).collect();
        rects.extend(
            self.links
                .iter()
                .flat_map(|l| l.vertices.iter())
                .map(|v| Rect::new(v.x, v.y, 0.0, 0.0)),
        );
        Rect::union_all(&rects)
    }

    /// Is there a link between the two nodes, in either direction? A self
    /// link only matches when both ids are the same node.
    pub fn link_exists_between(&self, a: &str, b: &str) -> bool {
        self.links.iter().any(|l| {
            if a == b {
                l.source.id == a && l.target.id == b
            } else {
                (l.source.id == a && l.target.id == b) || (l.source.id == b && l.target.id == a)
            }
        })
    }

    pub fn excluded_links(&self) -> &[ExcludedLink] {
        &self.excluded
    }

    pub fn is_excluded(&self, a: &str, b: &str) -> bool {
        self.excluded.iter().any(|e| e.matches(a, b))
    }

    pub fn embedded(&self, parent: &str) -> &[NodeId] {
        self.node(parent)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    // --- Journal -------------------------------------------------------------

    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.journal)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.journal.is_empty()
    }

    fn record(&mut self, event: GraphEvent, origin: ChangeOrigin) {
        if origin == ChangeOrigin::User {
            self.journal.push(event);
        }
    }

    pub fn cell_snapshot(&self, id: &str) -> Option<CellSnapshot> {
        if let Some(node) = self.node(id) {
            let element = ElementSnapshot {
                id: node.id.clone(),
                position: node.position,
                size: node.size,
                ports: node.entity().map(|e| e.ports.clone()).unwrap_or_default(),
                parent: node.parent.clone(),
            };
            return Some(match node.kind {
                NodeKind::Entity(_) => CellSnapshot::Entity(element),
                NodeKind::Selection => CellSnapshot::Selection(element),
            });
        }
        self.link(id).map(|l| {
            CellSnapshot::Link(LinkSnapshot {
                id: l.id.clone(),
                source: l.source.clone(),
                target: l.target.clone(),
                vertices: l.vertices.clone(),
            })
        })
    }

    /// Full graph state, elements first.
    pub fn snapshot(&self) -> Vec<CellSnapshot> {
        self.nodes
            .iter()
            .map(|n| n.id.as_str())
            .chain(self.links.iter().map(|l| l.id.as_str()))
            .filter_map(|id| self.cell_snapshot(id))
            .collect()
    }

    // --- Entities ------------------------------------------------------------

    /// Add an entity node. Adding an entity that is already in the diagram
    /// is a no-op and returns `None`.
    pub fn add_entity(
        &mut self,
        entity: &Entity,
        visible: Option<&[String]>,
        position: Point,
    ) -> Option<NodeId> {
        self.insert_entity(new_cell_id(), entity, visible, position)
    }

    /// Same as [`add_entity`](Self::add_entity) with a caller-chosen id.
    pub fn insert_entity(
        &mut self,
        id: NodeId,
        entity: &Entity,
        visible: Option<&[String]>,
        position: Point,
    ) -> Option<NodeId> {
        let key = entity.schema_name.to_lowercase();
        if self.schema_index.contains_key(&key) || self.node(&id).is_some() {
            return None;
        }

        let default_visible;
        let visible = match visible {
            Some(v) => v,
            None => {
                default_visible = entity.default_visible_attributes();
                &default_visible
            }
        };
        let (content, size) = EntityNode::build(entity, visible, self.kind, &self.metrics);

        self.nodes.push(Node {
            id: id.clone(),
            kind: NodeKind::Entity(content),
            position,
            size,
            z: ENTITY_Z,
            parent: None,
            children: Vec::new(),
        });
        self.schema_index.insert(key, id.clone());
        self.record(GraphEvent::Add(id.clone()), ChangeOrigin::User);
        tracing::debug!(entity = %entity.schema_name, node = %id, "entity added");
        Some(id)
    }

    /// Add every entity that is not in the diagram yet, positioned by
    /// `placement` around the existing nodes.
    pub fn add_entities<P: Placement + ?Sized>(
        &mut self,
        entities: &[&Entity],
        placement: &P,
    ) -> Vec<NodeId> {
        let mut fresh: Vec<&Entity> = Vec::new();
        for entity in entities {
            let seen = fresh
                .iter()
                .any(|e| e.schema_name.eq_ignore_ascii_case(&entity.schema_name));
            if !seen && !self.contains_entity(&entity.schema_name) {
                fresh.push(*entity);
            }
        }
        if fresh.is_empty() {
            return Vec::new();
        }

        let sizes: Vec<Size> = fresh
            .iter()
            .map(|e| {
                let visible = e.default_visible_attributes();
                EntityNode::build(e, &visible, self.kind, &self.metrics).1
            })
            .collect();
        let positions = placement.place(&sizes, &self.entity_bboxes());

        fresh
            .iter()
            .zip(positions)
            .filter_map(|(entity, position)| self.add_entity(entity, None, position))
            .collect()
    }

    pub fn add_group<P: Placement + ?Sized>(&mut self, group: &Group, placement: &P) -> Vec<NodeId> {
        let entities: Vec<&Entity> = group.entities.iter().collect();
        self.add_entities(&entities, placement)
    }

    /// Remove an entity node and every link connected to it.
    pub fn remove_entity(&mut self, schema_name: &str) -> bool {
        let Some(id) = self.schema_index.get(&schema_name.to_lowercase()).cloned() else {
            return false;
        };
        self.remove_node(&id).is_ok()
    }

    /// Remove any node; connected links go with it, embedded children are
    /// released first.
    pub fn remove_node(&mut self, id: &str) -> Result<Node, ModelError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| ModelError::NodeNotFound(id.to_string()))?;

        let connected: Vec<LinkId> = self
            .links
            .iter()
            .filter(|l| l.connects(id))
            .map(|l| l.id.clone())
            .collect();
        for link_id in connected {
            self.links.retain(|l| l.id != link_id);
            self.record(GraphEvent::Remove(link_id), ChangeOrigin::User);
        }

        let children = self.nodes[index].children.clone();
        for child in &children {
            if let Some(c) = self.nodes.iter_mut().find(|n| &n.id == child) {
                c.parent = None;
            }
        }
        if let Some(parent) = self.nodes[index].parent.clone() {
            if let Some(p) = self.nodes.iter_mut().find(|n| n.id == parent) {
                p.children.retain(|c| c != id);
            }
        }

        let node = self.nodes.remove(index);
        if let Some(schema) = node.schema_name() {
            self.schema_index.remove(&schema.to_lowercase());
        }
        self.record(GraphEvent::Remove(node.id.clone()), ChangeOrigin::User);
        Ok(node)
    }

    /// Show one more attribute on an entity node. Returns false when it was
    /// already visible.
    pub fn add_visible_attribute(
        &mut self,
        entity: &Entity,
        attribute: &str,
    ) -> Result<bool, ModelError> {
        let attr = entity
            .attribute(attribute)
            .ok_or_else(|| ModelError::AttributeNotFound {
                entity: entity.schema_name.clone(),
                attribute: attribute.to_string(),
            })?;
        let mut visible = self.visible_attributes_of(&entity.schema_name)?;
        if visible.iter().any(|v| v.eq_ignore_ascii_case(&attr.schema_name)) {
            return Ok(false);
        }
        visible.push(attr.schema_name.clone());
        self.rebuild_entity(entity, &visible)?;
        Ok(true)
    }

    /// Hide an attribute. The primary key cannot be hidden.
    pub fn remove_visible_attribute(
        &mut self,
        entity: &Entity,
        attribute: &str,
    ) -> Result<bool, ModelError> {
        if entity
            .primary_key()
            .is_some_and(|pk| pk.schema_name.eq_ignore_ascii_case(attribute))
        {
            return Ok(false);
        }
        let mut visible = self.visible_attributes_of(&entity.schema_name)?;
        let before = visible.len();
        visible.retain(|v| !v.eq_ignore_ascii_case(attribute));
        if visible.len() == before {
            return Ok(false);
        }
        self.rebuild_entity(entity, &visible)?;
        Ok(true)
    }

    fn visible_attributes_of(&self, schema_name: &str) -> Result<Vec<String>, ModelError> {
        self.node_by_schema(schema_name)
            .and_then(Node::entity)
            .map(EntityNode::visible_attribute_names)
            .ok_or_else(|| ModelError::UnknownEntity(schema_name.to_string()))
    }

    fn rebuild_entity(&mut self, entity: &Entity, visible: &[String]) -> Result<(), ModelError> {
        let id = self
            .schema_index
            .get(&entity.schema_name.to_lowercase())
            .cloned()
            .ok_or_else(|| ModelError::UnknownEntity(entity.schema_name.clone()))?;
        let (content, size) = EntityNode::build(entity, visible, self.kind, &self.metrics);
        let ports: Vec<String> = content.ports.iter().map(|p| p.id.clone()).collect();

        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| ModelError::NodeNotFound(id.clone()))?;
        node.kind = NodeKind::Entity(content);
        node.size = size;
        self.record(GraphEvent::Change(id.clone()), ChangeOrigin::User);

        // links whose port vanished fall back to the node itself
        let mut changed = Vec::new();
        for link in self.links.iter_mut() {
            let mut touched = false;
            for end in [&mut link.source, &mut link.target] {
                if end.id == id && end.port.as_ref().is_some_and(|p| !ports.contains(p)) {
                    end.port = None;
                    touched = true;
                }
            }
            if touched {
                changed.push(link.id.clone());
            }
        }
        for link_id in changed {
            self.record(GraphEvent::Change(link_id), ChangeOrigin::User);
        }
        Ok(())
    }

    // --- Links ---------------------------------------------------------------

    pub fn add_link(
        &mut self,
        source: Endpoint,
        target: Endpoint,
        relationships: Vec<RelationshipInformation>,
    ) -> Result<LinkId, ModelError> {
        self.insert_link(new_cell_id(), source, target, relationships, Vec::new())
    }

    pub fn insert_link(
        &mut self,
        id: LinkId,
        source: Endpoint,
        target: Endpoint,
        relationships: Vec<RelationshipInformation>,
        vertices: Vec<Point>,
    ) -> Result<LinkId, ModelError> {
        for end in [&source, &target] {
            if self.node(&end.id).is_none() {
                return Err(ModelError::NodeNotFound(end.id.clone()));
            }
        }
        let label = relationships
            .iter()
            .find(|r| r.is_included)
            .map(|r| r.kind.as_str().to_string());
        self.links.push(Link {
            id: id.clone(),
            source,
            target,
            vertices,
            relationships,
            label,
        });
        self.record(GraphEvent::Add(id.clone()), ChangeOrigin::User);
        Ok(id)
    }

    /// Link an entity node to every other entity in the diagram it has a
    /// relationship with, unless they are linked already or the pair was
    /// excluded. Returns the new links.
    pub fn link_entity(&mut self, schema_name: &str, catalog: &Catalog) -> Result<Vec<LinkId>, ModelError> {
        let entity = catalog
            .entity(schema_name)
            .ok_or_else(|| ModelError::UnknownEntity(schema_name.to_string()))?;
        let node_id = self
            .node_by_schema(schema_name)
            .map(|n| n.id.clone())
            .ok_or_else(|| ModelError::UnknownEntity(schema_name.to_string()))?;

        let others: Vec<(NodeId, String)> = self
            .entity_nodes()
            .filter_map(|n| n.schema_name().map(|s| (n.id.clone(), s.to_string())))
            .collect();

        let mut created = Vec::new();
        for (other_id, other_schema) in others {
            let Some(other) = catalog.entity(&other_schema) else {
                continue;
            };
            if self.link_exists_between(&node_id, &other_id)
                || self.is_excluded(&entity.schema_name, &other.schema_name)
            {
                continue;
            }
            if relationships_between(entity, other).is_empty() {
                continue;
            }
            let (source, target) = self.link_endpoints(entity, &node_id, other, &other_id);
            // relationships are read from the source end, as on load
            let relationships = if source.id == node_id {
                relationships_between(entity, other)
            } else {
                relationships_between(other, entity)
            };
            created.push(self.add_link(source, target, relationships)?);
        }
        Ok(created)
    }

    /// Link every entity pair in the diagram.
    pub fn link_all(&mut self, catalog: &Catalog) -> Vec<LinkId> {
        let schemas: Vec<String> = self
            .entity_nodes()
            .filter_map(|n| n.schema_name().map(str::to_string))
            .collect();
        let mut created = Vec::new();
        for schema in schemas {
            match self.link_entity(&schema, catalog) {
                Ok(ids) => created.extend(ids),
                Err(err) => tracing::warn!(entity = %schema, %err, "entity not linked"),
            }
        }
        created
    }

    /// The side holding a visible lookup becomes the source, attached to the
    /// lookup's port; the target attaches to its primary key port.
    fn link_endpoints(
        &self,
        a: &Entity,
        a_id: &str,
        b: &Entity,
        b_id: &str,
    ) -> (Endpoint, Endpoint) {
        let lookup_port = |from: &Entity, from_id: &str, to: &Entity| -> Option<String> {
            let node = self.node(from_id)?.entity()?;
            lookup_targets_between(from, to)
                .into_iter()
                .map(|attr| port_id(&attr.schema_name))
                .find(|port| node.port(port).is_some())
        };
        let pk_port = |id: &str| -> Option<String> {
            self.node(id)?
                .entity()?
                .primary_key_port()
                .map(|p| p.id.clone())
        };

        if let Some(port) = lookup_port(a, a_id, b) {
            (
                Endpoint::port(a_id, port),
                Endpoint {
                    id: b_id.to_string(),
                    port: pk_port(b_id),
                },
            )
        } else if let Some(port) = lookup_port(b, b_id, a) {
            (
                Endpoint::port(b_id, port),
                Endpoint {
                    id: a_id.to_string(),
                    port: pk_port(a_id),
                },
            )
        } else {
            (Endpoint::node(a_id), Endpoint::node(b_id))
        }
    }

    /// Remove a link and remember the pair as excluded.
    pub fn remove_link(&mut self, id: &str) -> Result<Link, ModelError> {
        let index = self
            .links
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| ModelError::LinkNotFound(id.to_string()))?;
        let link = self.links.remove(index);

        let schema_of = |node: &str| self.node(node).and_then(Node::schema_name).map(str::to_string);
        if let (Some(source), Some(target)) = (schema_of(&link.source.id), schema_of(&link.target.id)) {
            if !self.is_excluded(&source, &target) {
                self.excluded.push(ExcludedLink {
                    source_schema_name: source,
                    target_schema_name: target,
                });
            }
        }
        self.record(GraphEvent::Remove(link.id.clone()), ChangeOrigin::User);
        Ok(link)
    }

    pub fn exclude_pair(&mut self, source_schema: &str, target_schema: &str) {
        if !self.is_excluded(source_schema, target_schema) {
            self.excluded.push(ExcludedLink {
                source_schema_name: source_schema.to_string(),
                target_schema_name: target_schema.to_string(),
            });
        }
    }

    /// Allow automatic linking of a previously excluded pair again.
    pub fn include_pair(&mut self, a: &str, b: &str) -> bool {
        let before = self.excluded.len();
        self.excluded.retain(|e| !e.matches(a, b));
        self.excluded.len() != before
    }

    pub fn set_relationship_included(
        &mut self,
        link: &str,
        relationship_schema: &str,
        included: bool,
    ) -> Result<bool, ModelError> {
        let link = self
            .links
            .iter_mut()
            .find(|l| l.id == link)
            .ok_or_else(|| ModelError::LinkNotFound(link.to_string()))?;
        let Some(rel) = link
            .relationships
            .iter_mut()
            .find(|r| r.relationship_schema_name == relationship_schema)
        else {
            return Ok(false);
        };
        rel.is_included = included;
        link.label = link
            .relationships
            .iter()
            .find(|r| r.is_included)
            .map(|r| r.kind.as_str().to_string());
        Ok(true)
    }

    pub fn set_vertices(
        &mut self,
        link: &str,
        vertices: Vec<Point>,
        origin: ChangeOrigin,
    ) -> Result<(), ModelError> {
        let l = self
            .links
            .iter_mut()
            .find(|l| l.id == link)
            .ok_or_else(|| ModelError::LinkNotFound(link.to_string()))?;
        if l.vertices == vertices {
            return Ok(());
        }
        l.vertices = vertices;
        self.record(GraphEvent::Change(link.to_string()), origin);
        Ok(())
    }

    /// Re-attach a link end; `router` changes skip the journal.
    pub fn set_endpoints(
        &mut self,
        link: &str,
        source: Endpoint,
        target: Endpoint,
        origin: ChangeOrigin,
    ) -> Result<(), ModelError> {
        for end in [&source, &target] {
            if self.node(&end.id).is_none() {
                return Err(ModelError::NodeNotFound(end.id.clone()));
            }
        }
        let l = self
            .links
            .iter_mut()
            .find(|l| l.id == link)
            .ok_or_else(|| ModelError::LinkNotFound(link.to_string()))?;
        if l.source == source && l.target == target {
            return Ok(());
        }
        l.source = source;
        l.target = target;
        self.record(GraphEvent::Change(link.to_string()), origin);
        Ok(())
    }

    // --- Geometry ------------------------------------------------------------

    fn node_mut(&mut self, id: &str) -> Result<&mut Node, ModelError> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| ModelError::NodeNotFound(id.to_string()))
    }

    pub fn set_position(&mut self, id: &str, position: Point) -> Result<(), ModelError> {
        let current = self
            .node(id)
            .ok_or_else(|| ModelError::NodeNotFound(id.to_string()))?
            .position;
        self.translate_node(id, position.x - current.x, position.y - current.y)
    }

    /// Move a node by an offset. Embedded children move along.
    pub fn translate_node(&mut self, id: &str, dx: f64, dy: f64) -> Result<(), ModelError> {
        if dx == 0.0 && dy == 0.0 {
            return Ok(());
        }
        let node = self.node_mut(id)?;
        node.position.x += dx;
        node.position.y += dy;
        let children = node.children.clone();
        self.record(GraphEvent::Change(id.to_string()), ChangeOrigin::User);
        for child in children {
            self.translate_node(&child, dx, dy)?;
        }
        Ok(())
    }

    pub fn resize(&mut self, id: &str, size: Size) -> Result<(), ModelError> {
        let node = self.node_mut(id)?;
        if node.size == size {
            return Ok(());
        }
        node.size = size;
        self.record(GraphEvent::Change(id.to_string()), ChangeOrigin::User);
        Ok(())
    }

    /// Place a node behind every other node.
    pub fn to_back(&mut self, id: &str) -> Result<(), ModelError> {
        let min_z = self
            .nodes
            .iter()
            .filter(|n| n.id != id)
            .map(|n| n.z)
            .min()
            .unwrap_or(0);
        let node = self.node_mut(id)?;
        node.z = node.z.min(min_z - 1);
        Ok(())
    }

    // --- Embedding -----------------------------------------------------------

    pub fn add_selection_container(&mut self, bounds: Rect) -> NodeId {
        let id = new_cell_id();
        self.nodes.push(Node {
            id: id.clone(),
            kind: NodeKind::Selection,
            position: bounds.origin(),
            size: Size::new(bounds.width, bounds.height),
            z: ENTITY_Z,
            parent: None,
            children: Vec::new(),
        });
        self.record(GraphEvent::Add(id.clone()), ChangeOrigin::User);
        id
    }

    /// Embed `child` into `parent`. A node cannot end up inside itself.
    pub fn embed(&mut self, parent: &str, child: &str) -> Result<(), ModelError> {
        if self.node(parent).is_none() {
            return Err(ModelError::NodeNotFound(parent.to_string()));
        }
        if self.node(child).is_none() {
            return Err(ModelError::NodeNotFound(child.to_string()));
        }
        if self.is_within(parent, child) {
            return Err(ModelError::EmbedCycle {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        self.unembed(child)?;
        self.node_mut(child)?.parent = Some(parent.to_string());
        self.node_mut(parent)?.children.push(child.to_string());
        Ok(())
    }

    /// Is `id` the node `ancestor` or nested somewhere inside it?
    fn is_within(&self, id: &str, ancestor: &str) -> bool {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.node(node).and_then(|n| n.parent.as_deref());
        }
        false
    }

    pub fn unembed(&mut self, child: &str) -> Result<(), ModelError> {
        let previous = self.node_mut(child)?.parent.take();
        if let Some(parent) = previous {
            if let Ok(p) = self.node_mut(&parent) {
                p.children.retain(|c| c != child);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::grid::GridLayout;
    use crate::metadata::fixtures::sample_catalog;

    fn graph_with(schemas: &[&str]) -> (DiagramGraph, Catalog) {
        let catalog = sample_catalog();
        let mut graph = DiagramGraph::new(DiagramKind::Detailed);
        for (i, schema) in schemas.iter().enumerate() {
            let entity = catalog.entity(schema).unwrap();
            graph
                .add_entity(entity, None, Point::new(i as f64 * 600.0, 0.0))
                .unwrap();
        }
        (graph, catalog)
    }

    #[test]
    fn test_add_entity_is_idempotent() {
        let (mut graph, catalog) = graph_with(&["account"]);
        let account = catalog.entity("account").unwrap();
        assert!(graph.add_entity(account, None, Point::default()).is_none());
        assert_eq!(graph.entity_count(), 1);
        assert_eq!(graph.nodes().len(), 1);
    }

    #[test]
    fn test_primary_key_first_with_port() {
        let catalog = sample_catalog();
        let account = catalog.entity("account").unwrap();
        let mut graph = DiagramGraph::default();
        // visible list without the primary key and in reverse order
        let visible = vec!["name".to_string(), "primarycontactid".to_string()];
        let id = graph.add_entity(account, Some(&visible), Point::default()).unwrap();
        let node = graph.node(&id).unwrap().entity().unwrap();

        assert!(node.attributes[0].is_primary_key);
        assert_eq!(node.attributes[0].schema_name, "accountid");
        assert_eq!(node.primary_key_port().unwrap().side, PortSide::Left);
        // lookup gets a right port, plain text gets none
        assert_eq!(node.ports.len(), 2);
        assert_eq!(node.port("port-primarycontactid").unwrap().side, PortSide::Right);
        assert!(node.port("port-name").is_none());
    }

    #[test]
    fn test_simple_nodes_have_no_ports() {
        let catalog = sample_catalog();
        let mut graph = DiagramGraph::new(DiagramKind::Simple);
        let id = graph
            .add_entity(catalog.entity("account").unwrap(), None, Point::default())
            .unwrap();
        let node = graph.node(&id).unwrap();
        assert!(node.entity().unwrap().ports.is_empty());
        assert_eq!(node.size, Size::new(200.0, 80.0));
    }

    #[test]
    fn test_link_entity_uses_lookup_and_key_ports() {
        let (mut graph, catalog) = graph_with(&["account", "contact"]);
        let links = graph.link_entity("account", &catalog).unwrap();
        assert_eq!(links.len(), 1);

        let link = graph.link(&links[0]).unwrap();
        let account = graph.node_by_schema("account").unwrap();
        let contact = graph.node_by_schema("contact").unwrap();
        assert_eq!(link.source, Endpoint::port(&account.id, "port-primarycontactid"));
        assert_eq!(link.target, Endpoint::port(&contact.id, "port-contactid"));
        assert_eq!(link.relationships.len(), 2);

        // linking again from the other side finds the existing link
        assert!(graph.link_entity("contact", &catalog).unwrap().is_empty());
    }

    #[test]
    fn test_relationships_follow_link_direction() {
        // contact starts the linking, but only account shows a lookup
        let (mut graph, catalog) = graph_with(&["account"]);
        let contact = catalog.entity("contact").unwrap();
        let key_only = vec!["contactid".to_string()];
        graph
            .add_entity(contact, Some(&key_only), Point::new(600.0, 0.0))
            .unwrap();
        let links = graph.link_entity("contact", &catalog).unwrap();
        let link = graph.link(&links[0]).unwrap();
        let account = graph.node_by_schema("account").unwrap();
        assert_eq!(link.source.id, account.id);
        for rel in &link.relationships {
            assert_eq!(rel.source_entity_schema_name, "account");
        }
        let first = &link.relationships[0];
        assert_eq!(first.relationship_schema_name, "contact_customer_accounts");
        assert_eq!(first.kind.as_str(), "1:N");
        assert_eq!(link.label.as_deref(), Some("1:N"));
    }

    #[test]
    fn test_embed_rejects_cycles() {
        let (mut graph, _) = graph_with(&["account"]);
        let account = graph.node_by_schema("account").unwrap().id.clone();
        let outer = graph.add_selection_container(Rect::new(0.0, 0.0, 100.0, 100.0));
        let inner = graph.add_selection_container(Rect::new(0.0, 0.0, 50.0, 50.0));

        assert!(matches!(
            graph.embed(&account, &account),
            Err(ModelError::EmbedCycle { .. })
        ));
        graph.embed(&outer, &inner).unwrap();
        graph.embed(&inner, &account).unwrap();
        assert!(matches!(
            graph.embed(&account, &outer),
            Err(ModelError::EmbedCycle { .. })
        ));
        // the rejected embed leaves the tree untouched
        assert!(graph.node(&outer).unwrap().parent.is_none());
        graph.translate_node(&outer, 5.0, 5.0).unwrap();
        assert_eq!(graph.node(&account).unwrap().position, Point::new(5.0, 5.0));
    }

    #[test]
    fn test_remove_entity_removes_connected_links() {
        let (mut graph, catalog) = graph_with(&["account", "contact", "task"]);
        graph.link_all(&catalog);
        assert_eq!(graph.links().len(), 1);
        let link_id = graph.links()[0].id.clone();
        graph.drain_events();

        assert!(graph.remove_entity("contact"));
        assert!(graph.links().is_empty());
        assert!(!graph.contains_entity("contact"));
        let events = graph.drain_events();
        assert_eq!(events[0], GraphEvent::Remove(link_id));
        assert!(matches!(events[1], GraphEvent::Remove(_)));
        assert!(!graph.remove_entity("contact"));
    }

    #[test]
    fn test_removed_link_is_excluded_from_relinking() {
        let (mut graph, catalog) = graph_with(&["account", "contact"]);
        let links = graph.link_all(&catalog);
        graph.remove_link(&links[0]).unwrap();
        assert_eq!(graph.excluded_links().len(), 1);
        assert!(graph.link_all(&catalog).is_empty());

        assert!(graph.include_pair("contact", "account"));
        assert_eq!(graph.link_all(&catalog).len(), 1);
    }

    #[test]
    fn test_hiding_lookup_detaches_link_port() {
        let (mut graph, catalog) = graph_with(&["account", "contact"]);
        let links = graph.link_all(&catalog);
        let account = catalog.entity("account").unwrap();

        assert!(!graph.remove_visible_attribute(account, "accountid").unwrap());
        assert!(graph.remove_visible_attribute(account, "primarycontactid").unwrap());
        let link = graph.link(&links[0]).unwrap();
        assert_eq!(link.source.port, None);

        assert!(graph.add_visible_attribute(account, "name").unwrap());
        assert!(!graph.add_visible_attribute(account, "name").unwrap());
        assert!(matches!(
            graph.add_visible_attribute(account, "missing"),
            Err(ModelError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn test_router_changes_are_not_journaled() {
        let (mut graph, catalog) = graph_with(&["account", "contact"]);
        let links = graph.link_all(&catalog);
        graph.drain_events();

        graph
            .set_vertices(&links[0], vec![Point::new(1.0, 2.0)], ChangeOrigin::Router)
            .unwrap();
        assert!(!graph.has_pending_events());

        graph
            .set_vertices(&links[0], vec![Point::new(3.0, 4.0)], ChangeOrigin::User)
            .unwrap();
        assert_eq!(graph.drain_events(), vec![GraphEvent::Change(links[0].clone())]);
    }

    #[test]
    fn test_translating_container_moves_children() {
        let (mut graph, _) = graph_with(&["account", "contact"]);
        let ids: Vec<NodeId> = graph.nodes().iter().map(|n| n.id.clone()).collect();
        let container = graph.add_selection_container(Rect::new(0.0, 0.0, 1200.0, 200.0));
        for id in &ids {
            graph.embed(&container, id).unwrap();
        }
        graph.translate_node(&container, 10.0, 20.0).unwrap();
        assert_eq!(graph.node(&ids[1]).unwrap().position, Point::new(610.0, 20.0));

        graph.remove_node(&container).unwrap();
        assert!(graph.node(&ids[0]).unwrap().parent.is_none());
    }

    #[test]
    fn test_add_group_places_only_new_entities() {
        let (mut graph, catalog) = graph_with(&["account"]);
        let sales = catalog.group("Sales").unwrap();
        let added = graph.add_group(sales, &GridLayout::default());
        assert_eq!(added.len(), 1);
        let boxes = graph.entity_bboxes();
        assert!(!boxes[0].intersects(&boxes[1]));
    }

    #[test]
    fn test_snapshot_types() {
        let (mut graph, catalog) = graph_with(&["account", "contact"]);
        graph.link_all(&catalog);
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.len(), 3);
        let json = serde_json::to_value(&snapshot[2]).unwrap();
        assert_eq!(json["type"], RELATIONSHIP_LINK_TYPE);
        let json = serde_json::to_value(&snapshot[0]).unwrap();
        assert_eq!(json["type"], ENTITY_ELEMENT_TYPE);
    }
}
