use crate::document::{EventType, Source};
use crate::matching::MatchRule;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a trigger's match rule runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMatchSource {
    #[default]
    Content,
    Filename,
}

/// Date anchor for scheduled triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    Created,
    Added,
    Modified,
    DocDate,
    CustomField,
}

/// Schedule for `Scheduled` triggers: fires once `now` passes the anchor
/// date plus the offset; recurring schedules refire every interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(rename = "schedule_date_field")]
    pub date_field: DateField,
    #[serde(rename = "schedule_date_custom_field", default)]
    pub date_custom_field: Option<i64>,
    #[serde(rename = "schedule_offset_days", default)]
    pub offset_days: i64,
    #[serde(rename = "schedule_is_recurring", default)]
    pub is_recurring: bool,
    #[serde(rename = "schedule_recurring_interval_days", default)]
    pub recurring_interval_days: Option<i64>,
}

/// AND-combined trigger filters. Empty dimensions are vacuously true.
/// Field wire names follow the persisted trigger columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(rename = "filter_filename", default)]
    pub filename: Option<String>,
    #[serde(rename = "filter_path", default)]
    pub path: Option<String>,
    /// Document must carry at least one of these tags.
    #[serde(rename = "filter_has_tags", default)]
    pub has_any_tags: Vec<i64>,
    /// Document must carry every one of these tags.
    #[serde(rename = "filter_has_all_tags", default)]
    pub has_all_tags: Vec<i64>,
    /// Document must carry none of these tags.
    #[serde(rename = "filter_has_not_tags", default)]
    pub has_not_tags: Vec<i64>,
    #[serde(rename = "filter_has_correspondent", default)]
    pub has_correspondent: Option<i64>,
    #[serde(rename = "filter_has_not_correspondents", default)]
    pub has_not_correspondents: Vec<i64>,
    #[serde(rename = "filter_has_document_type", default)]
    pub has_document_type: Option<i64>,
    #[serde(rename = "filter_has_not_document_types", default)]
    pub has_not_document_types: Vec<i64>,
    #[serde(rename = "filter_has_storage_path", default)]
    pub has_storage_path: Option<i64>,
    #[serde(rename = "filter_has_not_storage_paths", default)]
    pub has_not_storage_paths: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub trigger_type: EventType,
    /// Optional content/filename match rule; a disabled rule means the
    /// trigger carries no match condition (NULL columns).
    #[serde(flatten)]
    pub match_rule: MatchRule,
    #[serde(default)]
    pub match_source: TriggerMatchSource,
    #[serde(flatten)]
    pub filters: FilterSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleConfig>,
}

impl WorkflowTrigger {
    pub fn new(trigger_type: EventType) -> Self {
        WorkflowTrigger {
            trigger_type,
            match_rule: MatchRule::disabled(),
            match_source: TriggerMatchSource::Content,
            filters: FilterSet::default(),
            schedule: None,
        }
    }
}

/// Assignment payload: every configured sub-assignment is applied
/// independently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentAction {
    pub title: Option<String>,
    pub tags: Vec<i64>,
    pub document_type: Option<i64>,
    pub correspondent: Option<i64>,
    pub storage_path: Option<i64>,
    pub custom_fields: BTreeMap<i64, String>,
    pub owner: Option<i64>,
    pub view_users: Vec<i64>,
    pub view_groups: Vec<i64>,
    pub change_users: Vec<i64>,
    pub change_groups: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovalAction {
    pub tags: Vec<i64>,
    pub all_tags: bool,
    pub correspondents: Vec<i64>,
    pub all_correspondents: bool,
    pub document_types: Vec<i64>,
    pub all_document_types: bool,
    pub storage_paths: Vec<i64>,
    pub all_storage_paths: bool,
    pub custom_fields: Vec<i64>,
    pub all_custom_fields: bool,
    pub owners: Vec<i64>,
    pub all_owners: bool,
    pub view_users: Vec<i64>,
    pub view_groups: Vec<i64>,
    pub change_users: Vec<i64>,
    pub change_groups: Vec<i64>,
    pub all_permissions: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailAction {
    pub subject: String,
    pub body: String,
    /// Comma-separated on the wire; split before sending.
    pub to: String,
    pub include_document: bool,
}

impl EmailAction {
    pub fn recipients(&self) -> Vec<String> {
        self.to
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookAction {
    pub url: String,
    /// Send configured params as query/form data instead of a body.
    pub use_params: bool,
    pub as_json: bool,
    pub params: BTreeMap<String, String>,
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub include_document: bool,
}

/// The four workflow action kinds, each carrying only its own fields.
/// On the wire this stays the flat per-prefix column record
/// ([`ActionRecord`]); in memory the union gives exhaustive dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    Assignment(AssignmentAction),
    Removal(RemovalAction),
    Email(EmailAction),
    Webhook(WebhookAction),
}

impl ActionPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionPayload::Assignment(_) => "assignment",
            ActionPayload::Removal(_) => "removal",
            ActionPayload::Email(_) => "email",
            ActionPayload::Webhook(_) => "webhook",
        }
    }

    fn type_code(&self) -> u8 {
        match self {
            ActionPayload::Assignment(_) => 1,
            ActionPayload::Removal(_) => 2,
            ActionPayload::Email(_) => 3,
            ActionPayload::Webhook(_) => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ActionRecord", into = "ActionRecord")]
pub struct WorkflowAction {
    pub id: i64,
    pub order_index: i32,
    pub payload: ActionPayload,
}

/// Flat nullable action record as persisted (`assign_*`, `remove_*`,
/// `email_*`, `webhook_*` columns keyed by an integer `action_type`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(default)]
    pub id: i64,
    pub action_type: u8,
    #[serde(default)]
    pub order_index: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_tags: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_document_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_correspondent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_storage_path: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_custom_fields_values: Option<BTreeMap<i64, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_owner: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_view_users: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_view_groups: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_change_users: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_change_groups: Option<Vec<i64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_tags: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_all_tags: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_correspondents: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_all_correspondents: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_document_types: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_all_document_types: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_storage_paths: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_all_storage_paths: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_custom_fields: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_all_custom_fields: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_owners: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_all_owners: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_view_users: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_view_groups: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_change_users: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_change_groups: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_all_permissions: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_include_document: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_use_params: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_as_json: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_params: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_include_document: Option<bool>,
}

impl TryFrom<ActionRecord> for WorkflowAction {
    type Error = String;

    fn try_from(record: ActionRecord) -> Result<Self, Self::Error> {
        let payload = match record.action_type {
            1 => ActionPayload::Assignment(AssignmentAction {
                title: record.assign_title,
                tags: record.assign_tags.unwrap_or_default(),
                document_type: record.assign_document_type,
                correspondent: record.assign_correspondent,
                storage_path: record.assign_storage_path,
                custom_fields: record.assign_custom_fields_values.unwrap_or_default(),
                owner: record.assign_owner,
                view_users: record.assign_view_users.unwrap_or_default(),
                view_groups: record.assign_view_groups.unwrap_or_default(),
                change_users: record.assign_change_users.unwrap_or_default(),
                change_groups: record.assign_change_groups.unwrap_or_default(),
            }),
            2 => ActionPayload::Removal(RemovalAction {
                tags: record.remove_tags.unwrap_or_default(),
                all_tags: record.remove_all_tags.unwrap_or_default(),
                correspondents: record.remove_correspondents.unwrap_or_default(),
                all_correspondents: record.remove_all_correspondents.unwrap_or_default(),
                document_types: record.remove_document_types.unwrap_or_default(),
                all_document_types: record.remove_all_document_types.unwrap_or_default(),
                storage_paths: record.remove_storage_paths.unwrap_or_default(),
                all_storage_paths: record.remove_all_storage_paths.unwrap_or_default(),
                custom_fields: record.remove_custom_fields.unwrap_or_default(),
                all_custom_fields: record.remove_all_custom_fields.unwrap_or_default(),
                owners: record.remove_owners.unwrap_or_default(),
                all_owners: record.remove_all_owners.unwrap_or_default(),
                view_users: record.remove_view_users.unwrap_or_default(),
                view_groups: record.remove_view_groups.unwrap_or_default(),
                change_users: record.remove_change_users.unwrap_or_default(),
                change_groups: record.remove_change_groups.unwrap_or_default(),
                all_permissions: record.remove_all_permissions.unwrap_or_default(),
            }),
            3 => ActionPayload::Email(EmailAction {
                // Fallback subject for records saved without one.
                subject: record
                    .email_subject
                    .unwrap_or_else(|| "Document notification".to_string()),
                body: record.email_body.unwrap_or_default(),
                to: record.email_to.unwrap_or_default(),
                include_document: record.email_include_document.unwrap_or_default(),
            }),
            4 => ActionPayload::Webhook(WebhookAction {
                url: record.webhook_url.unwrap_or_default(),
                use_params: record.webhook_use_params.unwrap_or_default(),
                as_json: record.webhook_as_json.unwrap_or(true),
                params: record.webhook_params.unwrap_or_default(),
                body: record.webhook_body,
                headers: record.webhook_headers.unwrap_or_default(),
                include_document: record.webhook_include_document.unwrap_or_default(),
            }),
            other => return Err(format!("unknown action_type code: {other}")),
        };
        Ok(WorkflowAction {
            id: record.id,
            order_index: record.order_index,
            payload,
        })
    }
}

impl From<WorkflowAction> for ActionRecord {
    fn from(action: WorkflowAction) -> ActionRecord {
        let mut record = ActionRecord {
            id: action.id,
            action_type: action.payload.type_code(),
            order_index: action.order_index,
            ..Default::default()
        };
        match action.payload {
            ActionPayload::Assignment(a) => {
                record.assign_title = a.title;
                record.assign_tags = non_empty(a.tags);
                record.assign_document_type = a.document_type;
                record.assign_correspondent = a.correspondent;
                record.assign_storage_path = a.storage_path;
                record.assign_custom_fields_values = if a.custom_fields.is_empty() {
                    None
                } else {
                    Some(a.custom_fields)
                };
                record.assign_owner = a.owner;
                record.assign_view_users = non_empty(a.view_users);
                record.assign_view_groups = non_empty(a.view_groups);
                record.assign_change_users = non_empty(a.change_users);
                record.assign_change_groups = non_empty(a.change_groups);
            }
            ActionPayload::Removal(r) => {
                record.remove_tags = non_empty(r.tags);
                record.remove_all_tags = r.all_tags.then_some(true);
                record.remove_correspondents = non_empty(r.correspondents);
                record.remove_all_correspondents = r.all_correspondents.then_some(true);
                record.remove_document_types = non_empty(r.document_types);
                record.remove_all_document_types = r.all_document_types.then_some(true);
                record.remove_storage_paths = non_empty(r.storage_paths);
                record.remove_all_storage_paths = r.all_storage_paths.then_some(true);
                record.remove_custom_fields = non_empty(r.custom_fields);
                record.remove_all_custom_fields = r.all_custom_fields.then_some(true);
                record.remove_owners = non_empty(r.owners);
                record.remove_all_owners = r.all_owners.then_some(true);
                record.remove_view_users = non_empty(r.view_users);
                record.remove_view_groups = non_empty(r.view_groups);
                record.remove_change_users = non_empty(r.change_users);
                record.remove_change_groups = non_empty(r.change_groups);
                record.remove_all_permissions = r.all_permissions.then_some(true);
            }
            ActionPayload::Email(e) => {
                record.email_subject = Some(e.subject);
                record.email_body = Some(e.body);
                record.email_to = Some(e.to);
                record.email_include_document = Some(e.include_document);
            }
            ActionPayload::Webhook(w) => {
                record.webhook_url = Some(w.url);
                record.webhook_use_params = Some(w.use_params);
                record.webhook_as_json = Some(w.as_json);
                record.webhook_params = if w.params.is_empty() {
                    None
                } else {
                    Some(w.params)
                };
                record.webhook_body = w.body;
                record.webhook_headers = if w.headers.is_empty() {
                    None
                } else {
                    Some(w.headers)
                };
                record.webhook_include_document = Some(w.include_document);
            }
        }
        record
    }
}

fn non_empty(ids: Vec<i64>) -> Option<Vec<i64>> {
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

/// A configured workflow. Read-only at execution time; administration
/// happens in the external backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: i64,
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub triggers: Vec<WorkflowTrigger>,
    #[serde(default)]
    pub actions: Vec<WorkflowAction>,
}

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
    Skipped,
}

/// One run-history row per (workflow, document, event) evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowLog {
    pub workflow_id: i64,
    pub document_id: i64,
    pub status: LogStatus,
    pub message: String,
    pub executed_at: DateTime<Utc>,
}

/// On-disk workflow definitions, loaded the same way the engine config is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinitions {
    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

impl WorkflowDefinitions {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let definitions: WorkflowDefinitions = serde_yaml::from_str(&content)?;
        Ok(definitions)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
