//! Relationship information between pairs of entities, normalized to one
//! direction.

use crate::metadata::{Attribute, AttributeKind, CascadeSummary, Entity};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    #[serde(rename = "1:N")]
    OneToMany,
    #[serde(rename = "N:1")]
    ManyToOne,
    #[serde(rename = "N:N")]
    ManyToMany,
    #[serde(rename = "SELF")]
    SelfReferencing,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::OneToMany => "1:N",
            RelationshipKind::ManyToOne => "N:1",
            RelationshipKind::ManyToMany => "N:N",
            RelationshipKind::SelfReferencing => "SELF",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipInformation {
    pub source_entity_schema_name: String,
    pub source_entity_display_name: String,
    pub target_entity_schema_name: String,
    pub target_entity_display_name: String,
    pub relationship_schema_name: String,
    pub kind: RelationshipKind,
    pub cascade: Option<String>,
    pub is_included: bool,
}

/// Every relationship between `source` and `target`, seen from `source`.
///
/// Relationships declared on `source` pointing at `target` keep their own
/// kind. Relationships declared on `target` pointing back at `source` are
/// flipped to `N:1` (many-to-many stays many-to-many). Many-to-many
/// relationships show up on both sides and are reported once.
pub fn relationships_between(source: &Entity, target: &Entity) -> Vec<RelationshipInformation> {
    let is_self = source.schema_name == target.schema_name;
    let mut seen_many_to_many: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    let mut push = |rel: &crate::metadata::Relationship, kind: RelationshipKind| {
        if kind == RelationshipKind::ManyToMany
            && !seen_many_to_many.insert(rel.relationship_schema.clone())
        {
            return;
        }
        let cascade = match rel.cascade_summary() {
            CascadeSummary::None => None,
            summary => Some(summary.to_string()),
        };
        out.push(RelationshipInformation {
            source_entity_schema_name: source.schema_name.clone(),
            source_entity_display_name: source.display_name.clone(),
            target_entity_schema_name: target.schema_name.clone(),
            target_entity_display_name: target.display_name.clone(),
            relationship_schema_name: rel.relationship_schema.clone(),
            kind,
            cascade,
            is_included: true,
        });
    };

    for rel in &source.relationships {
        if !rel.table_schema.eq_ignore_ascii_case(&target.schema_name) {
            continue;
        }
        let kind = if rel.is_many_to_many {
            RelationshipKind::ManyToMany
        } else if is_self {
            RelationshipKind::SelfReferencing
        } else {
            RelationshipKind::OneToMany
        };
        push(rel, kind);
    }

    if !is_self {
        for rel in &target.relationships {
            if !rel.table_schema.eq_ignore_ascii_case(&source.schema_name) {
                continue;
            }
            let kind = if rel.is_many_to_many {
                RelationshipKind::ManyToMany
            } else {
                RelationshipKind::ManyToOne
            };
            push(rel, kind);
        }
    }

    out
}

/// Lookup attributes on `source` that reference `target`.
pub fn lookup_targets_between<'a>(source: &'a Entity, target: &Entity) -> Vec<&'a Attribute> {
    source
        .attributes
        .iter()
        .filter(|a| match &a.kind {
            AttributeKind::Lookup { targets } => targets
                .iter()
                .any(|t| t.name.eq_ignore_ascii_case(&target.schema_name)),
            _ => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fixtures::{entity, pk, rel, sample_catalog};

    #[test]
    fn test_relationships_both_directions() {
        let catalog = sample_catalog();
        let account = catalog.entity("account").unwrap();
        let contact = catalog.entity("contact").unwrap();

        let rels = relationships_between(account, contact);
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].kind, RelationshipKind::OneToMany);
        assert_eq!(rels[0].relationship_schema_name, "contact_customer_accounts");
        assert_eq!(rels[1].kind, RelationshipKind::ManyToOne);
        assert!(rels.iter().all(|r| r.source_entity_schema_name == "account"));
        assert!(rels.iter().all(|r| r.is_included));
    }

    #[test]
    fn test_many_to_many_reported_once() {
        let a = entity("a", vec![pk("aid")], vec![rel("a_b", "b", true)]);
        let b = entity("b", vec![pk("bid")], vec![rel("a_b", "a", true)]);
        let rels = relationships_between(&a, &b);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].kind, RelationshipKind::ManyToMany);
    }

    #[test]
    fn test_self_referencing() {
        let a = entity("account", vec![pk("accountid")], vec![rel("account_parent", "Account", false)]);
        let rels = relationships_between(&a, &a);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].kind, RelationshipKind::SelfReferencing);
    }

    #[test]
    fn test_unrelated_entities() {
        let catalog = sample_catalog();
        let account = catalog.entity("account").unwrap();
        let task = catalog.entity("task").unwrap();
        assert!(relationships_between(account, task).is_empty());
    }

    #[test]
    fn test_lookup_targets_between() {
        let catalog = sample_catalog();
        let account = catalog.entity("account").unwrap();
        let contact = catalog.entity("contact").unwrap();
        let lookups = lookup_targets_between(account, contact);
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].schema_name, "primarycontactid");
    }

    #[test]
    fn test_kind_serializes_as_label() {
        let json = serde_json::to_string(&RelationshipKind::ManyToOne).unwrap();
        assert_eq!(json, "\"N:1\"");
    }
}
