use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Document lifecycle events, which double as workflow trigger types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Consumption,
    DocumentAdded,
    DocumentUpdated,
    Scheduled,
}

/// Where a consumed document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    ConsumeFolder,
    MailFetch,
    Upload,
    Api,
}

/// In-memory metadata snapshot of one document, as handed to the engine by
/// the persistence layer. Workflow actions mutate this snapshot; the caller
/// persists it afterwards. Set-valued fields are ordered so runs are
/// reproducible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub file_path: String,
    /// Extracted plain text (OCR output plus any native text layer).
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub asn: Option<String>,
    #[serde(default)]
    pub correspondent_id: Option<i64>,
    #[serde(default)]
    pub document_type_id: Option<i64>,
    #[serde(default)]
    pub storage_path_id: Option<i64>,
    #[serde(default)]
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub tag_ids: BTreeSet<i64>,
    #[serde(default)]
    pub custom_values: BTreeMap<i64, String>,
    #[serde(default)]
    pub view_user_ids: BTreeSet<i64>,
    #[serde(default)]
    pub view_group_ids: BTreeSet<i64>,
    #[serde(default)]
    pub change_user_ids: BTreeSet<i64>,
    #[serde(default)]
    pub change_group_ids: BTreeSet<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    /// Document date as extracted from the content (invoice date etc).
    #[serde(default)]
    pub doc_date: Option<NaiveDate>,
}

impl Document {
    /// Text the matching rules run against: title plus extracted content,
    /// the way the consumption pipeline concatenates them.
    pub fn matchable_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.content.len() + 1);
        text.push_str(&self.title);
        if !self.title.is_empty() && !self.content.is_empty() {
            text.push(' ');
        }
        text.push_str(&self.content);
        text
    }
}

/// One lifecycle event being dispatched to the workflow engine.
#[derive(Debug, Clone)]
pub struct DocumentEvent {
    pub event_type: EventType,
    pub source: Option<Source>,
    /// Evaluation clock; injected so scheduled-trigger checks are
    /// deterministic and testable.
    pub now: DateTime<Utc>,
    /// When a scheduled trigger last fired for this document, if ever.
    pub last_run: Option<DateTime<Utc>>,
}

impl DocumentEvent {
    pub fn new(event_type: EventType) -> Self {
        DocumentEvent {
            event_type,
            source: None,
            now: Utc::now(),
            last_run: None,
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}
