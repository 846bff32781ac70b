use crate::catalog::Catalog;
use crate::document::Document;
use crate::error::EngineError;
use crate::template;
use crate::workflow::{
    ActionPayload, AssignmentAction, EmailAction, RemovalAction, WebhookAction, WorkflowAction,
};

use async_trait::async_trait;
use base64::Engine as _;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as LettreAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Error,
}

/// Per-action outcome. Failures carry the message the administrator sees
/// in the workflow run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub message: String,
}

impl ActionResult {
    pub fn success() -> Self {
        ActionResult {
            status: ActionStatus::Success,
            message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ActionResult {
            status: ActionStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ActionStatus::Error
    }
}

/// A document file fetched for attachment to an email or webhook.
#[derive(Debug, Clone)]
pub struct FileAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Storage collaborator: fetches the original file when an action wants to
/// attach the document.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn fetch(&self, document: &Document) -> Result<FileAttachment, EngineError>;
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<FileAttachment>,
}

/// Mail transport collaborator; the SMTP implementation is
/// [`SmtpMailer`], tests inject a recording fake.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EngineError>;
}

/// What gets POSTed to a webhook URL.
#[derive(Debug, Clone)]
pub enum WebhookBody {
    Json(serde_json::Value),
    Multipart {
        fields: Vec<(String, String)>,
        file: FileAttachment,
    },
}

#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: WebhookBody,
}

/// Webhook delivery collaborator; [`HttpWebhook`] is the reqwest
/// implementation. No retries here: redelivery policy belongs to the
/// caller's queue.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn deliver(&self, request: WebhookRequest) -> Result<(), EngineError>;
}

/// reqwest-based webhook delivery. Non-2xx responses are failures.
pub struct HttpWebhook {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpWebhook {
    pub fn new(timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("docflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::TransportFailure(e.to_string()))?;
        Ok(HttpWebhook { client, timeout })
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhook {
    async fn deliver(&self, request: WebhookRequest) -> Result<(), EngineError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match request.body {
            WebhookBody::Json(value) => builder.json(&value),
            WebhookBody::Multipart { fields, file } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                let part = reqwest::multipart::Part::bytes(file.content)
                    .file_name(file.filename)
                    .mime_str(&file.content_type)
                    .map_err(|e| EngineError::TransportFailure(e.to_string()))?;
                form = form.part("document", part);
                builder.multipart(form)
            }
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::ExternalTimeout {
                    what: "webhook",
                    seconds: self.timeout.as_secs(),
                }
            } else {
                EngineError::TransportFailure(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::TransportFailure(format!(
                "webhook returned {status} for {}",
                request.url
            )));
        }
        log::debug!("webhook delivered to {} ({status})", request.url);
        Ok(())
    }
}

/// SMTP settings for the default mail transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    #[serde(default = "default_true")]
    pub starttls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

/// lettre-based mail transport.
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, EngineError> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| EngineError::TransportFailure(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let builder = builder.port(config.port);
        let builder = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            _ => builder,
        };
        log::info!("SMTP mailer initialized ({}:{})", config.host, config.port);
        Ok(SmtpMailer {
            mailer: builder.build(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EngineError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| EngineError::ConfigurationInvalid(format!("invalid smtp from: {e}")))?;

        let mut builder = Message::builder().from(from).subject(&message.subject);
        for recipient in &message.to {
            let mailbox: Mailbox = recipient.parse().map_err(|e| {
                EngineError::ConfigurationInvalid(format!("invalid recipient '{recipient}': {e}"))
            })?;
            builder = builder.to(mailbox);
        }

        let email = match &message.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .unwrap_or(ContentType::TEXT_PLAIN);
                builder
                    .multipart(
                        MultiPart::mixed()
                            .singlepart(
                                SinglePart::builder()
                                    .header(ContentType::TEXT_PLAIN)
                                    .body(message.body.clone()),
                            )
                            .singlepart(
                                LettreAttachment::new(attachment.filename.clone())
                                    .body(attachment.content.clone(), content_type),
                            ),
                    )
                    .map_err(|e| EngineError::TransportFailure(e.to_string()))?
            }
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.body.clone())
                .map_err(|e| EngineError::TransportFailure(e.to_string()))?,
        };

        self.mailer
            .send(email)
            .await
            .map_err(|e| EngineError::TransportFailure(e.to_string()))?;
        log::info!("notification email sent to {} recipients", message.to.len());
        Ok(())
    }
}

/// Applies one workflow action to a document.
///
/// Metadata mutations happen on the in-memory snapshot so later actions in
/// the same run observe them; email and webhook delivery go through the
/// injected collaborators under a timeout. One action's failure never
/// aborts its siblings.
pub struct ActionExecutor {
    catalog: Arc<Catalog>,
    mailer: Option<Arc<dyn Mailer>>,
    webhook: Option<Arc<dyn WebhookTransport>>,
    files: Option<Arc<dyn FileStore>>,
    delivery_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        ActionExecutor {
            catalog,
            mailer: None,
            webhook: None,
            files: None,
            delivery_timeout: Duration::from_secs(DEFAULT_DELIVERY_TIMEOUT_SECS),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_webhook(mut self, webhook: Arc<dyn WebhookTransport>) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn with_file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub async fn execute(&self, action: &WorkflowAction, document: &mut Document) -> ActionResult {
        let result = match &action.payload {
            ActionPayload::Assignment(assignment) => self.execute_assignment(assignment, document),
            ActionPayload::Removal(removal) => self.execute_removal(removal, document),
            ActionPayload::Email(email) => self.execute_email(email, document).await,
            ActionPayload::Webhook(webhook) => self.execute_webhook(webhook, document).await,
        };
        if result.is_error() {
            log::warn!(
                "{} action failed on document {}: {}",
                action.payload.kind(),
                document.id,
                result.message
            );
        }
        result
    }

    /// Every configured sub-assignment is attempted; failures are collected
    /// and the rest still take effect.
    fn execute_assignment(
        &self,
        assignment: &AssignmentAction,
        document: &mut Document,
    ) -> ActionResult {
        let mut errors: Vec<String> = Vec::new();

        if let Some(title) = &assignment.title {
            document.title = template::render(title, document, &self.catalog);
        }

        for &tag_id in &assignment.tags {
            if self.catalog.tag(tag_id).is_some() {
                document.tag_ids.insert(tag_id);
            } else {
                errors.push(EngineError::UnknownEntityReference {
                    kind: "tag",
                    id: tag_id,
                }
                .to_string());
            }
        }

        if let Some(type_id) = assignment.document_type {
            if self.catalog.document_type(type_id).is_some() {
                document.document_type_id = Some(type_id);
            } else {
                errors.push(EngineError::UnknownEntityReference {
                    kind: "document type",
                    id: type_id,
                }
                .to_string());
            }
        }

        if let Some(correspondent_id) = assignment.correspondent {
            if self.catalog.correspondent(correspondent_id).is_some() {
                document.correspondent_id = Some(correspondent_id);
            } else {
                errors.push(EngineError::UnknownEntityReference {
                    kind: "correspondent",
                    id: correspondent_id,
                }
                .to_string());
            }
        }

        if let Some(path_id) = assignment.storage_path {
            if self.catalog.storage_path(path_id).is_some() {
                document.storage_path_id = Some(path_id);
            } else {
                errors.push(EngineError::UnknownEntityReference {
                    kind: "storage path",
                    id: path_id,
                }
                .to_string());
            }
        }

        for (&field_id, value) in &assignment.custom_fields {
            if self.catalog.custom_field(field_id).is_some() {
                let rendered = template::render(value, document, &self.catalog);
                document.custom_values.insert(field_id, rendered);
            } else {
                errors.push(EngineError::UnknownEntityReference {
                    kind: "custom field",
                    id: field_id,
                }
                .to_string());
            }
        }

        if let Some(owner_id) = assignment.owner {
            if self.catalog.has_user(owner_id) {
                document.owner_id = Some(owner_id);
            } else {
                errors.push(EngineError::UnknownEntityReference {
                    kind: "user",
                    id: owner_id,
                }
                .to_string());
            }
        }

        assign_principals(
            &assignment.view_users,
            &mut document.view_user_ids,
            |id| self.catalog.has_user(id),
            "user",
            &mut errors,
        );
        assign_principals(
            &assignment.view_groups,
            &mut document.view_group_ids,
            |id| self.catalog.has_group(id),
            "group",
            &mut errors,
        );
        assign_principals(
            &assignment.change_users,
            &mut document.change_user_ids,
            |id| self.catalog.has_user(id),
            "user",
            &mut errors,
        );
        assign_principals(
            &assignment.change_groups,
            &mut document.change_group_ids,
            |id| self.catalog.has_group(id),
            "group",
            &mut errors,
        );

        if errors.is_empty() {
            ActionResult::success()
        } else {
            ActionResult::error(errors.join("; "))
        }
    }

    fn execute_removal(&self, removal: &RemovalAction, document: &mut Document) -> ActionResult {
        if removal.all_tags {
            document.tag_ids.clear();
        } else {
            for tag_id in &removal.tags {
                document.tag_ids.remove(tag_id);
            }
        }

        if removal.all_correspondents
            || document
                .correspondent_id
                .is_some_and(|id| removal.correspondents.contains(&id))
        {
            document.correspondent_id = None;
        }

        if removal.all_document_types
            || document
                .document_type_id
                .is_some_and(|id| removal.document_types.contains(&id))
        {
            document.document_type_id = None;
        }

        if removal.all_storage_paths
            || document
                .storage_path_id
                .is_some_and(|id| removal.storage_paths.contains(&id))
        {
            document.storage_path_id = None;
        }

        if removal.all_custom_fields {
            document.custom_values.clear();
        } else {
            for field_id in &removal.custom_fields {
                document.custom_values.remove(field_id);
            }
        }

        if removal.all_owners
            || document
                .owner_id
                .is_some_and(|id| removal.owners.contains(&id))
        {
            document.owner_id = None;
        }

        if removal.all_permissions {
            document.view_user_ids.clear();
            document.view_group_ids.clear();
            document.change_user_ids.clear();
            document.change_group_ids.clear();
        } else {
            for id in &removal.view_users {
                document.view_user_ids.remove(id);
            }
            for id in &removal.view_groups {
                document.view_group_ids.remove(id);
            }
            for id in &removal.change_users {
                document.change_user_ids.remove(id);
            }
            for id in &removal.change_groups {
                document.change_group_ids.remove(id);
            }
        }

        ActionResult::success()
    }

    async fn execute_email(&self, email: &EmailAction, document: &Document) -> ActionResult {
        let recipients = email.recipients();
        if recipients.is_empty() {
            return ActionResult::error(
                EngineError::ConfigurationInvalid("email action has no recipients".to_string())
                    .to_string(),
            );
        }
        let mailer = match &self.mailer {
            Some(mailer) => mailer,
            None => {
                return ActionResult::error(
                    EngineError::ConfigurationInvalid(
                        "no mail transport configured".to_string(),
                    )
                    .to_string(),
                )
            }
        };

        let attachment = if email.include_document {
            match self.fetch_attachment(document).await {
                Ok(attachment) => Some(attachment),
                Err(err) => return ActionResult::error(err.to_string()),
            }
        } else {
            None
        };

        let message = EmailMessage {
            to: recipients,
            subject: template::render(&email.subject, document, &self.catalog),
            body: template::render(&email.body, document, &self.catalog),
            attachment,
        };

        match tokio::time::timeout(self.delivery_timeout, mailer.send(&message)).await {
            Ok(Ok(())) => ActionResult::success(),
            Ok(Err(err)) => ActionResult::error(err.to_string()),
            Err(_) => ActionResult::error(
                EngineError::ExternalTimeout {
                    what: "email",
                    seconds: self.delivery_timeout.as_secs(),
                }
                .to_string(),
            ),
        }
    }

    async fn execute_webhook(&self, webhook: &WebhookAction, document: &Document) -> ActionResult {
        if let Err(err) = url::Url::parse(&webhook.url) {
            return ActionResult::error(
                EngineError::ConfigurationInvalid(format!(
                    "webhook URL '{}' is invalid: {err}",
                    webhook.url
                ))
                .to_string(),
            );
        }
        if !webhook.use_params && webhook.body.is_none() {
            return ActionResult::error(
                EngineError::ConfigurationInvalid(
                    "webhook action has neither params nor body".to_string(),
                )
                .to_string(),
            );
        }
        let transport = match &self.webhook {
            Some(transport) => transport,
            None => {
                return ActionResult::error(
                    EngineError::ConfigurationInvalid(
                        "no webhook transport configured".to_string(),
                    )
                    .to_string(),
                )
            }
        };

        let request = match self.build_webhook_request(webhook, document).await {
            Ok(request) => request,
            Err(err) => return ActionResult::error(err.to_string()),
        };

        match tokio::time::timeout(self.delivery_timeout, transport.deliver(request)).await {
            Ok(Ok(())) => ActionResult::success(),
            Ok(Err(err)) => ActionResult::error(err.to_string()),
            Err(_) => ActionResult::error(
                EngineError::ExternalTimeout {
                    what: "webhook",
                    seconds: self.delivery_timeout.as_secs(),
                }
                .to_string(),
            ),
        }
    }

    async fn build_webhook_request(
        &self,
        webhook: &WebhookAction,
        document: &Document,
    ) -> Result<WebhookRequest, EngineError> {
        // Every payload starts from the same document summary.
        let mut data = serde_json::Map::new();
        data.insert("document_id".into(), document.id.into());
        data.insert("title".into(), document.title.clone().into());
        data.insert(
            "correspondent".into(),
            document
                .correspondent_id
                .and_then(|id| self.catalog.correspondent(id))
                .map(|c| c.name.clone())
                .into(),
        );
        data.insert(
            "document_type".into(),
            document
                .document_type_id
                .and_then(|id| self.catalog.document_type(id))
                .map(|d| d.name.clone())
                .into(),
        );
        data.insert(
            "created_at".into(),
            document.created_at.map(|d| d.to_rfc3339()).into(),
        );
        data.insert(
            "original_filename".into(),
            document.original_filename.clone().into(),
        );

        let attachment = if webhook.include_document {
            Some(self.fetch_attachment(document).await?)
        } else {
            None
        };

        let body = if webhook.use_params {
            for (key, value) in &webhook.params {
                data.insert(
                    key.clone(),
                    template::render(value, document, &self.catalog).into(),
                );
            }
            match attachment {
                Some(file) if webhook.as_json => {
                    // Embedded reference: base64 document inside the JSON payload.
                    data.insert(
                        "document".into(),
                        base64::engine::general_purpose::STANDARD
                            .encode(&file.content)
                            .into(),
                    );
                    data.insert("document_filename".into(), file.filename.into());
                    WebhookBody::Json(serde_json::Value::Object(data))
                }
                Some(file) => WebhookBody::Multipart {
                    fields: data
                        .into_iter()
                        .map(|(k, v)| (k, json_to_form_value(v)))
                        .collect(),
                    file,
                },
                None => WebhookBody::Json(serde_json::Value::Object(data)),
            }
        } else {
            let raw = webhook.body.as_deref().unwrap_or_default();
            let rendered = template::render(raw, document, &self.catalog);
            // A custom JSON object merges into the base payload; anything
            // else rides along under "body".
            match serde_json::from_str::<serde_json::Value>(&rendered) {
                Ok(serde_json::Value::Object(custom)) => data.extend(custom),
                _ => {
                    data.insert("body".into(), rendered.into());
                }
            }
            match attachment {
                Some(file) if webhook.as_json => {
                    data.insert(
                        "document".into(),
                        base64::engine::general_purpose::STANDARD
                            .encode(&file.content)
                            .into(),
                    );
                    data.insert("document_filename".into(), file.filename.into());
                    WebhookBody::Json(serde_json::Value::Object(data))
                }
                Some(file) => WebhookBody::Multipart {
                    fields: data
                        .into_iter()
                        .map(|(k, v)| (k, json_to_form_value(v)))
                        .collect(),
                    file,
                },
                None => WebhookBody::Json(serde_json::Value::Object(data)),
            }
        };

        Ok(WebhookRequest {
            url: webhook.url.clone(),
            headers: webhook.headers.clone(),
            body,
        })
    }

    async fn fetch_attachment(&self, document: &Document) -> Result<FileAttachment, EngineError> {
        match &self.files {
            Some(files) => files.fetch(document).await,
            None => Err(EngineError::ConfigurationInvalid(
                "document attachment requested but no file store configured".to_string(),
            )),
        }
    }
}

fn assign_principals(
    requested: &[i64],
    target: &mut std::collections::BTreeSet<i64>,
    exists: impl Fn(i64) -> bool,
    kind: &'static str,
    errors: &mut Vec<String>,
) {
    for &id in requested {
        if exists(id) {
            target.insert(id);
        } else {
            errors.push(EngineError::UnknownEntityReference { kind, id }.to_string());
        }
    }
}

fn json_to_form_value(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Correspondent, CustomField, DocumentType, StoragePath, Tag};
    use crate::matching::MatchRule;
    use crate::workflow::ActionRecord;
    use std::sync::Mutex;

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog {
            tags: vec![
                Tag {
                    id: 1,
                    name: "invoice".to_string(),
                    rule: MatchRule::disabled(),
                },
                Tag {
                    id: 2,
                    name: "paid".to_string(),
                    rule: MatchRule::disabled(),
                },
            ],
            correspondents: vec![Correspondent {
                id: 10,
                name: "ACME".to_string(),
                rule: MatchRule::disabled(),
            }],
            document_types: vec![DocumentType {
                id: 20,
                name: "Invoice".to_string(),
                rule: MatchRule::disabled(),
            }],
            storage_paths: vec![StoragePath {
                id: 30,
                name: "Invoices".to_string(),
                path: String::new(),
                rule: MatchRule::disabled(),
            }],
            custom_fields: vec![CustomField {
                id: 40,
                name: "due".to_string(),
            }],
            user_ids: vec![100],
            group_ids: vec![200],
        })
    }

    fn assignment_action(payload: AssignmentAction) -> WorkflowAction {
        WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Assignment(payload),
        }
    }

    #[tokio::test]
    async fn assignment_applies_all_configured_fields() {
        let executor = ActionExecutor::new(catalog());
        let mut doc = Document {
            correspondent_id: Some(10),
            ..Default::default()
        };
        let action = assignment_action(AssignmentAction {
            title: Some("{correspondent} filed".to_string()),
            tags: vec![1, 2],
            document_type: Some(20),
            storage_path: Some(30),
            owner: Some(100),
            ..Default::default()
        });

        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Success);
        assert_eq!(doc.title, "ACME filed");
        assert!(doc.tag_ids.contains(&1) && doc.tag_ids.contains(&2));
        assert_eq!(doc.document_type_id, Some(20));
        assert_eq!(doc.owner_id, Some(100));
    }

    #[tokio::test]
    async fn assignment_partial_failure_still_applies_the_rest() {
        let executor = ActionExecutor::new(catalog());
        let mut doc = Document::default();
        let action = assignment_action(AssignmentAction {
            tags: vec![1, 42, 2], // 42 was deleted from the catalog
            correspondent: Some(10),
            ..Default::default()
        });

        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Error);
        assert!(result.message.contains("tag"));
        assert!(result.message.contains("42"));
        // The valid tags and the correspondent still landed.
        assert!(doc.tag_ids.contains(&1) && doc.tag_ids.contains(&2));
        assert_eq!(doc.correspondent_id, Some(10));
    }

    #[tokio::test]
    async fn removal_listed_and_remove_all_semantics() {
        let executor = ActionExecutor::new(catalog());
        let mut doc = Document {
            tag_ids: [1, 2].into(),
            correspondent_id: Some(10),
            document_type_id: Some(20),
            ..Default::default()
        };

        let action = WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Removal(RemovalAction {
                tags: vec![1],
                correspondents: vec![99], // not the current one: no-op
                all_document_types: true,
                ..Default::default()
            }),
        };
        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Success);
        assert!(!doc.tag_ids.contains(&1) && doc.tag_ids.contains(&2));
        assert_eq!(doc.correspondent_id, Some(10));
        assert_eq!(doc.document_type_id, None);
    }

    #[tokio::test]
    async fn remove_all_permissions_clears_all_four_lists() {
        let executor = ActionExecutor::new(catalog());
        let mut doc = Document {
            view_user_ids: [100].into(),
            view_group_ids: [200].into(),
            change_user_ids: [100].into(),
            change_group_ids: [200].into(),
            ..Default::default()
        };
        let action = WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Removal(RemovalAction {
                all_permissions: true,
                ..Default::default()
            }),
        };
        executor.execute(&action, &mut doc).await;
        assert!(doc.view_user_ids.is_empty());
        assert!(doc.view_group_ids.is_empty());
        assert!(doc.change_user_ids.is_empty());
        assert!(doc.change_group_ids.is_empty());
    }

    struct RecordingMailer {
        sent: Mutex<Vec<EmailMessage>>,
        fail_with: Option<String>,
    }

    impl RecordingMailer {
        fn ok() -> Self {
            RecordingMailer {
                sent: Mutex::new(Vec::new()),
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<(), EngineError> {
            if let Some(reason) = &self.fail_with {
                return Err(EngineError::TransportFailure(reason.clone()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn email_renders_templates_and_sends() {
        let mailer = Arc::new(RecordingMailer::ok());
        let executor = ActionExecutor::new(catalog()).with_mailer(mailer.clone());
        let mut doc = Document {
            title: "Invoice 7".to_string(),
            correspondent_id: Some(10),
            ..Default::default()
        };
        let action = WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Email(EmailAction {
                subject: "New document: {title}".to_string(),
                body: "From {correspondent}".to_string(),
                to: "admin@example.org".to_string(),
                include_document: false,
            }),
        };
        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Success);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "New document: Invoice 7");
        assert_eq!(sent[0].body, "From ACME");
    }

    #[tokio::test]
    async fn email_without_recipients_is_a_configuration_error() {
        let executor =
            ActionExecutor::new(catalog()).with_mailer(Arc::new(RecordingMailer::ok()));
        let mut doc = Document::default();
        let action = WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Email(EmailAction::default()),
        };
        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Error);
        assert!(result.message.contains("no recipients"));
    }

    #[tokio::test]
    async fn email_transport_failure_is_captured_not_thrown() {
        let mailer = Arc::new(RecordingMailer {
            sent: Mutex::new(Vec::new()),
            fail_with: Some("connection refused".to_string()),
        });
        let executor = ActionExecutor::new(catalog()).with_mailer(mailer);
        let mut doc = Document::default();
        let action = WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Email(EmailAction {
                to: "admin@example.org".to_string(),
                ..Default::default()
            }),
        };
        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Error);
        assert!(result.message.contains("connection refused"));
    }

    struct RecordingWebhook {
        delivered: Mutex<Vec<WebhookRequest>>,
        fail_with: Option<EngineError>,
    }

    impl RecordingWebhook {
        fn ok() -> Self {
            RecordingWebhook {
                delivered: Mutex::new(Vec::new()),
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl WebhookTransport for RecordingWebhook {
        async fn deliver(&self, request: WebhookRequest) -> Result<(), EngineError> {
            if let Some(err) = &self.fail_with {
                return Err(EngineError::TransportFailure(err.to_string()));
            }
            self.delivered.lock().unwrap().push(request);
            Ok(())
        }
    }

    #[tokio::test]
    async fn webhook_params_build_a_json_payload() {
        let transport = Arc::new(RecordingWebhook::ok());
        let executor = ActionExecutor::new(catalog()).with_webhook(transport.clone());
        let mut doc = Document {
            id: 7,
            title: "Invoice 7".to_string(),
            ..Default::default()
        };
        let action = WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Webhook(WebhookAction {
                url: "https://example.org/hook".to_string(),
                use_params: true,
                as_json: true,
                params: BTreeMap::from([("event".to_string(), "added: {title}".to_string())]),
                ..Default::default()
            }),
        };
        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Success);
        let delivered = transport.delivered.lock().unwrap();
        match &delivered[0].body {
            WebhookBody::Json(value) => {
                assert_eq!(value["document_id"], 7);
                assert_eq!(value["event"], "added: Invoice 7");
            }
            other => panic!("expected json body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn webhook_custom_json_body_merges_into_base_payload() {
        let transport = Arc::new(RecordingWebhook::ok());
        let executor = ActionExecutor::new(catalog()).with_webhook(transport.clone());
        let mut doc = Document {
            id: 7,
            title: "Invoice 7".to_string(),
            original_filename: "scan.pdf".to_string(),
            ..Default::default()
        };
        let action = WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Webhook(WebhookAction {
                url: "https://example.org/hook".to_string(),
                use_params: false,
                body: Some(r#"{"custom": "{title}"}"#.to_string()),
                ..Default::default()
            }),
        };
        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Success);
        let delivered = transport.delivered.lock().unwrap();
        match &delivered[0].body {
            WebhookBody::Json(value) => {
                // The document summary always rides along.
                assert_eq!(value["document_id"], 7);
                assert_eq!(value["original_filename"], "scan.pdf");
                assert_eq!(value["custom"], "Invoice 7");
            }
            other => panic!("expected merged json payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn webhook_non_json_body_is_carried_under_body_key() {
        let transport = Arc::new(RecordingWebhook::ok());
        let executor = ActionExecutor::new(catalog()).with_webhook(transport.clone());
        let mut doc = Document {
            id: 7,
            title: "Invoice 7".to_string(),
            ..Default::default()
        };
        let action = WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Webhook(WebhookAction {
                url: "https://example.org/hook".to_string(),
                use_params: false,
                body: Some("document {title} processed".to_string()),
                ..Default::default()
            }),
        };
        executor.execute(&action, &mut doc).await;
        let delivered = transport.delivered.lock().unwrap();
        match &delivered[0].body {
            WebhookBody::Json(value) => {
                assert_eq!(value["document_id"], 7);
                assert_eq!(value["body"], "document Invoice 7 processed");
            }
            other => panic!("expected json payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn webhook_with_neither_params_nor_body_is_rejected() {
        let executor =
            ActionExecutor::new(catalog()).with_webhook(Arc::new(RecordingWebhook::ok()));
        let mut doc = Document::default();
        let action = WorkflowAction {
            id: 0,
            order_index: 0,
            payload: ActionPayload::Webhook(WebhookAction {
                url: "https://example.org/hook".to_string(),
                use_params: false,
                body: None,
                ..Default::default()
            }),
        };
        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Error);
        assert!(result.message.contains("neither params nor body"));
    }

    #[tokio::test]
    async fn flat_record_email_executes_end_to_end() {
        // Wire-shape action records drive the executor directly.
        let record = ActionRecord {
            action_type: 3,
            email_to: Some("ops@example.org".to_string()),
            email_subject: Some("doc {title}".to_string()),
            ..Default::default()
        };
        let action = WorkflowAction::try_from(record).unwrap();
        let mailer = Arc::new(RecordingMailer::ok());
        let executor = ActionExecutor::new(catalog()).with_mailer(mailer.clone());
        let mut doc = Document {
            title: "X".to_string(),
            ..Default::default()
        };
        let result = executor.execute(&action, &mut doc).await;
        assert_eq!(result.status, ActionStatus::Success);
        assert_eq!(mailer.sent.lock().unwrap()[0].subject, "doc X");
    }
}
