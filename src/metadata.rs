//! Dataverse metadata as exported by the generator: entities, attributes,
//! relationships, security roles and keys, grouped for navigation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read metadata: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Declares a fieldless enum that travels as its integer value.
macro_rules! int_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub enum $name {
            $($variant),+
        }

        impl TryFrom<i64> for $name {
            type Error = String;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(format!("invalid {} value: {}", stringify!($name), other)),
                }
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> i64 {
                match value {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

int_enum!(OwnershipType {
    None = 0,
    UserOwned = 1,
    TeamOwned = 2,
    BusinessOwned = 4,
    OrganizationOwned = 8,
    BusinessParented = 16,
});

int_enum!(RequiredLevel {
    None = 0,
    SystemRequired = 1,
    ApplicationRequired = 2,
    Recommended = 3,
});

int_enum!(
    /// Behaviour applied to related records when the parent record changes.
    CascadeType {
        None = 0,
        Cascade = 1,
        Active = 2,
        UserOwned = 3,
        RemoveLink = 4,
        Restrict = 5,
    }
);

int_enum!(PrivilegeDepth {
    Basic = 0,
    Local = 1,
    Deep = 2,
    Global = 3,
});

impl Default for OwnershipType {
    fn default() -> Self {
        Self::None
    }
}

impl Default for RequiredLevel {
    fn default() -> Self {
        Self::None
    }
}

impl Default for CascadeType {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for CascadeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entity {
    pub display_name: String,
    pub schema_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub is_audit_enabled: bool,
    #[serde(default)]
    pub is_activity: bool,
    #[serde(default)]
    pub is_notes_enabled: bool,
    #[serde(default)]
    pub ownership: OwnershipType,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub security_roles: Vec<SecurityRole>,
    #[serde(default)]
    pub keys: Vec<Key>,
    #[serde(default)]
    pub icon_base64: Option<String>,
}

impl Entity {
    pub fn primary_key(&self) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_primary_id)
    }

    pub fn attribute(&self, schema_name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.schema_name.eq_ignore_ascii_case(schema_name))
    }

    /// Primary key (when present) followed by the custom lookups.
    pub fn default_visible_attributes(&self) -> Vec<String> {
        self.primary_key()
            .into_iter()
            .chain(
                self.attributes
                    .iter()
                    .filter(|a| a.is_lookup() && a.is_custom_attribute && !a.is_primary_id),
            )
            .map(|a| a.schema_name.clone())
            .collect()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Attribute {
    pub display_name: String,
    pub schema_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required_level: RequiredLevel,
    #[serde(default)]
    pub is_audit_enabled: bool,
    #[serde(default)]
    pub is_column_secured: bool,
    #[serde(default)]
    pub is_primary_id: bool,
    #[serde(default)]
    pub is_primary_name: bool,
    #[serde(default)]
    pub is_custom_attribute: bool,
    #[serde(flatten)]
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn is_lookup(&self) -> bool {
        matches!(self.kind, AttributeKind::Lookup { .. })
    }

    /// Short type label used in node rows.
    pub fn type_label(&self) -> &str {
        match &self.kind {
            AttributeKind::String { .. } => "Text",
            AttributeKind::Integer { .. } => "Whole number",
            AttributeKind::Decimal { kind, .. } => match kind {
                DecimalKind::Money => "Currency",
                DecimalKind::Decimal => "Decimal",
            },
            AttributeKind::DateTime { .. } => "Date and time",
            AttributeKind::Boolean { .. } => "Yes/No",
            AttributeKind::Choice { kind, .. } => match kind {
                ChoiceKind::Single => "Choice",
                ChoiceKind::Multi => "Choices",
            },
            AttributeKind::Lookup { .. } => "Lookup",
            AttributeKind::File { .. } => "File",
            AttributeKind::Status { .. } => "Status",
            AttributeKind::Generic { typ } => typ.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "AttributeType")]
pub enum AttributeKind {
    #[serde(rename = "StringAttribute", rename_all = "PascalCase")]
    String {
        #[serde(default)]
        format: String,
        #[serde(default)]
        max_length: i64,
    },
    #[serde(rename = "IntegerAttribute", rename_all = "PascalCase")]
    Integer {
        #[serde(default)]
        format: String,
        #[serde(default)]
        min_value: i64,
        #[serde(default)]
        max_value: i64,
    },
    #[serde(rename = "DecimalAttribute", rename_all = "PascalCase")]
    Decimal {
        #[serde(rename = "Type")]
        kind: DecimalKind,
        #[serde(default)]
        precision: i64,
        #[serde(default)]
        min_value: f64,
        #[serde(default)]
        max_value: f64,
    },
    #[serde(rename = "DateTimeAttribute", rename_all = "PascalCase")]
    DateTime {
        #[serde(default)]
        format: String,
        #[serde(default)]
        behavior: String,
    },
    #[serde(rename = "BooleanAttribute", rename_all = "PascalCase")]
    Boolean {
        #[serde(default)]
        true_label: String,
        #[serde(default)]
        false_label: String,
        #[serde(default)]
        default_value: bool,
    },
    #[serde(rename = "ChoiceAttribute", rename_all = "PascalCase")]
    Choice {
        #[serde(rename = "Type")]
        kind: ChoiceKind,
        #[serde(default)]
        default_value: Option<i64>,
        #[serde(default)]
        options: Vec<ChoiceOption>,
    },
    #[serde(rename = "LookupAttribute", rename_all = "PascalCase")]
    Lookup {
        #[serde(default)]
        targets: Vec<LookupTarget>,
    },
    #[serde(rename = "FileAttribute", rename_all = "PascalCase")]
    File {
        #[serde(default)]
        max_size: i64,
    },
    #[serde(rename = "StatusAttribute", rename_all = "PascalCase")]
    Status {
        #[serde(default)]
        options: Vec<StatusOption>,
    },
    #[serde(rename = "GenericAttribute")]
    Generic {
        #[serde(rename = "Type", default)]
        typ: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecimalKind {
    Money,
    Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChoiceKind {
    Single,
    Multi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChoiceOption {
    pub name: String,
    pub value: i64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusOption {
    pub name: String,
    pub value: i64,
    #[serde(default)]
    pub state: String,
}

/// Target table of a lookup. Older exports list bare schema names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "LookupTargetRepr")]
#[serde(rename_all = "PascalCase")]
pub struct LookupTarget {
    pub name: String,
    pub is_in_solution: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LookupTargetRepr {
    Name(String),
    #[serde(rename_all = "PascalCase")]
    Full {
        name: String,
        #[serde(default)]
        is_in_solution: bool,
    },
}

impl From<LookupTargetRepr> for LookupTarget {
    fn from(repr: LookupTargetRepr) -> Self {
        match repr {
            LookupTargetRepr::Name(name) => LookupTarget {
                name,
                is_in_solution: true,
            },
            LookupTargetRepr::Full {
                name,
                is_in_solution,
            } => LookupTarget {
                name,
                is_in_solution,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relationship {
    pub name: String,
    pub table_schema: String,
    #[serde(default)]
    pub lookup_display_name: String,
    pub relationship_schema: String,
    #[serde(default)]
    pub is_many_to_many: bool,
    #[serde(default)]
    pub cascade_configuration: Option<CascadeConfiguration>,
}

impl Relationship {
    pub fn cascade_summary(&self) -> CascadeSummary {
        match &self.cascade_configuration {
            Some(config) => config.classify(),
            None => CascadeSummary::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CascadeConfiguration {
    #[serde(default)]
    pub assign: CascadeType,
    #[serde(default)]
    pub delete: CascadeType,
    #[serde(default)]
    pub archive: CascadeType,
    #[serde(default)]
    pub merge: CascadeType,
    #[serde(default)]
    pub reparent: CascadeType,
    #[serde(default)]
    pub share: CascadeType,
    #[serde(default)]
    pub unshare: CascadeType,
    #[serde(default)]
    pub rollup_view: CascadeType,
}

/// Named cascade behaviours recognised in the relationship table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeSummary {
    None,
    Referential,
    ReferentialRestrictDelete,
    Parential,
    Custom(CascadeConfiguration),
}

impl CascadeConfiguration {
    /// Archive and RollupView are not part of the match; any combination that
    /// is not one of the three named behaviours is reported field by field.
    pub fn classify(&self) -> CascadeSummary {
        use CascadeType::{Cascade, None, RemoveLink, Restrict};

        let untouched = self.assign == None
            && self.merge == None
            && self.reparent == None
            && self.share == None
            && self.unshare == None;

        if untouched && self.delete == RemoveLink {
            CascadeSummary::Referential
        } else if untouched && self.delete == Restrict {
            CascadeSummary::ReferentialRestrictDelete
        } else if self.assign == Cascade
            && self.delete == Cascade
            && self.merge == None
            && self.reparent == Cascade
            && self.share == Cascade
            && self.unshare == Cascade
        {
            CascadeSummary::Parential
        } else {
            CascadeSummary::Custom(*self)
        }
    }
}

impl fmt::Display for CascadeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeSummary::None => f.write_str("None"),
            CascadeSummary::Referential => f.write_str("Referential"),
            CascadeSummary::ReferentialRestrictDelete => {
                f.write_str("Referential, Restrict Delete")
            }
            CascadeSummary::Parential => f.write_str("Parential"),
            CascadeSummary::Custom(c) => write!(
                f,
                "Assign: {}, Reparent: {}, Delete: {}, Share: {}, Unshare: {}, Merge: {}",
                c.assign, c.reparent, c.delete, c.share, c.unshare, c.merge
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityRole {
    pub name: String,
    pub logical_name: String,
    #[serde(default)]
    pub create: Option<PrivilegeDepth>,
    #[serde(default)]
    pub read: Option<PrivilegeDepth>,
    #[serde(default)]
    pub write: Option<PrivilegeDepth>,
    #[serde(default)]
    pub delete: Option<PrivilegeDepth>,
    #[serde(default)]
    pub append: Option<PrivilegeDepth>,
    #[serde(default)]
    pub append_to: Option<PrivilegeDepth>,
    #[serde(default)]
    pub assign: Option<PrivilegeDepth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Key {
    pub name: String,
    pub logical_name: String,
    #[serde(default)]
    pub key_attributes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    #[serde(rename_all = "PascalCase")]
    Wrapped { groups: Vec<Group> },
    Bare(Vec<Group>),
}

/// The static dataset, loaded once and indexed by schema name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    groups: Vec<Group>,
    /// lowercase schema name -> (group index, entity index)
    index: HashMap<String, (usize, usize)>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let groups = match serde_json::from_str::<CatalogFile>(json)? {
            CatalogFile::Wrapped { groups } => groups,
            CatalogFile::Bare(groups) => groups,
        };
        Ok(Self::from_groups(groups))
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_groups(groups: Vec<Group>) -> Self {
        let mut index = HashMap::new();
        for (gi, group) in groups.iter().enumerate() {
            for (ei, entity) in group.entities.iter().enumerate() {
                index
                    .entry(entity.schema_name.to_lowercase())
                    .or_insert((gi, ei));
            }
        }
        tracing::debug!(
            groups = groups.len(),
            entities = index.len(),
            "metadata catalog indexed"
        );
        Self { groups, index }
    }

    pub fn entity(&self, schema_name: &str) -> Option<&Entity> {
        let &(gi, ei) = self.index.get(&schema_name.to_lowercase())?;
        self.groups.get(gi)?.entities.get(ei)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Every indexed entity once, in group order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.groups.iter().enumerate().flat_map(move |(gi, g)| {
            g.entities.iter().enumerate().filter_map(move |(ei, e)| {
                (self.index.get(&e.schema_name.to_lowercase()) == Some(&(gi, ei))).then_some(e)
            })
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
