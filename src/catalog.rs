use crate::matching::MatchRule;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The classifiable dimensions of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Correspondent,
    DocumentType,
    Tag,
    StoragePath,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Correspondent => "correspondent",
            EntityKind::DocumentType => "document_type",
            EntityKind::Tag => "tag",
            EntityKind::StoragePath => "storage_path",
        }
    }
}

/// A catalog entity that carries its own match rule. Tags, correspondents,
/// document types, and storage paths all repeat the same rule columns in
/// the database; this is the one place their evaluation contract lives.
pub trait Matchable {
    fn id(&self) -> i64;
    fn name(&self) -> &str;
    fn match_rule(&self) -> &MatchRule;
}

macro_rules! matchable {
    ($type:ty) => {
        impl Matchable for $type {
            fn id(&self) -> i64 {
                self.id
            }
            fn name(&self) -> &str {
                &self.name
            }
            fn match_rule(&self) -> &MatchRule {
                &self.rule
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub rule: MatchRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correspondent {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub rule: MatchRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub rule: MatchRule,
}

/// Templated destination folder for classified documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoragePath {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(flatten)]
    pub rule: MatchRule,
}

matchable!(Tag);
matchable!(Correspondent);
matchable!(DocumentType);
matchable!(StoragePath);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomField {
    pub id: i64,
    pub name: String,
}

/// Read-only snapshot of the configured entities, taken once per run.
/// The engine never writes back to it; administration happens elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub correspondents: Vec<Correspondent>,
    #[serde(default)]
    pub document_types: Vec<DocumentType>,
    #[serde(default)]
    pub storage_paths: Vec<StoragePath>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    /// Known user and group ids, for validating owner/permission targets.
    #[serde(default)]
    pub user_ids: Vec<i64>,
    #[serde(default)]
    pub group_ids: Vec<i64>,
}

impl Catalog {
    pub fn tag(&self, id: i64) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn correspondent(&self, id: i64) -> Option<&Correspondent> {
        self.correspondents.iter().find(|c| c.id == id)
    }

    pub fn document_type(&self, id: i64) -> Option<&DocumentType> {
        self.document_types.iter().find(|d| d.id == id)
    }

    pub fn storage_path(&self, id: i64) -> Option<&StoragePath> {
        self.storage_paths.iter().find(|s| s.id == id)
    }

    pub fn custom_field(&self, id: i64) -> Option<&CustomField> {
        self.custom_fields.iter().find(|f| f.id == id)
    }

    pub fn has_user(&self, id: i64) -> bool {
        self.user_ids.contains(&id)
    }

    pub fn has_group(&self, id: i64) -> bool {
        self.group_ids.contains(&id)
    }

    /// Entity names by id for one dimension, used by template rendering.
    pub fn names(&self, kind: EntityKind) -> HashMap<i64, &str> {
        match kind {
            EntityKind::Tag => self.tags.iter().map(|t| (t.id, t.name.as_str())).collect(),
            EntityKind::Correspondent => self
                .correspondents
                .iter()
                .map(|c| (c.id, c.name.as_str()))
                .collect(),
            EntityKind::DocumentType => self
                .document_types
                .iter()
                .map(|d| (d.id, d.name.as_str()))
                .collect(),
            EntityKind::StoragePath => self
                .storage_paths
                .iter()
                .map(|s| (s.id, s.name.as_str()))
                .collect(),
        }
    }
}
