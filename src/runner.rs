use crate::actions::ActionExecutor;
use crate::document::{Document, DocumentEvent};
use crate::trigger::TriggerFilter;
use crate::workflow::{LogStatus, Workflow, WorkflowLog};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Drives one document event through a set of workflows.
///
/// Workflows run in `order_index` order; a workflow is selected when ANY of
/// its triggers applies. Each selected workflow produces exactly one log
/// row, and a failing action never prevents the remaining actions or the
/// remaining workflows from running.
pub struct WorkflowRunner {
    trigger_filter: TriggerFilter,
    executor: ActionExecutor,
    cancel: CancellationToken,
}

impl WorkflowRunner {
    pub fn new(trigger_filter: TriggerFilter, executor: ActionExecutor) -> Self {
        WorkflowRunner {
            trigger_filter,
            executor,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(
        &self,
        workflows: &[Workflow],
        document: &mut Document,
        event: &DocumentEvent,
    ) -> Vec<WorkflowLog> {
        let mut ordered: Vec<&Workflow> = workflows.iter().filter(|w| w.enabled).collect();
        ordered.sort_by_key(|w| (w.order_index, w.id));

        let mut logs = Vec::new();
        for workflow in ordered {
            // Cancellation is only honored at workflow boundaries so a
            // half-applied workflow is never left behind.
            if self.cancel.is_cancelled() {
                logs.push(WorkflowLog {
                    workflow_id: workflow.id,
                    document_id: document.id,
                    status: LogStatus::Skipped,
                    message: "run cancelled before this workflow started".to_string(),
                    executed_at: Utc::now(),
                });
                continue;
            }

            let mut type_matched = false;
            let mut selected = false;
            for trigger in &workflow.triggers {
                if trigger.trigger_type == event.event_type {
                    type_matched = true;
                }
                if self.trigger_filter.applies(trigger, document, event).await {
                    selected = true;
                    break;
                }
            }

            if !selected {
                // A skip is only worth recording when the workflow listens
                // for this event class but its filters excluded the document.
                if type_matched {
                    log::debug!(
                        "workflow {} skipped for document {}: filters did not match",
                        workflow.name,
                        document.id
                    );
                    logs.push(WorkflowLog {
                        workflow_id: workflow.id,
                        document_id: document.id,
                        status: LogStatus::Skipped,
                        message: "trigger filters did not match".to_string(),
                        executed_at: Utc::now(),
                    });
                }
                continue;
            }

            log::info!(
                "running workflow '{}' on document {} ({:?})",
                workflow.name,
                document.id,
                event.event_type
            );
            logs.push(self.run_actions(workflow, document).await);
        }
        logs
    }

    async fn run_actions(&self, workflow: &Workflow, document: &mut Document) -> WorkflowLog {
        let mut actions: Vec<_> = workflow.actions.iter().collect();
        actions.sort_by_key(|a| (a.order_index, a.id));

        let mut errors = Vec::new();
        for action in actions {
            let result = self.executor.execute(action, document).await;
            if result.is_error() {
                errors.push(result.message);
            }
        }

        let (status, message) = if errors.is_empty() {
            (LogStatus::Success, String::new())
        } else {
            (LogStatus::Error, errors.join("\n"))
        };
        WorkflowLog {
            workflow_id: workflow.id,
            document_id: document.id,
            status,
            message,
            executed_at: Utc::now(),
        }
    }
}
