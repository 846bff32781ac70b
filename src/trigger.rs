use crate::document::{Document, DocumentEvent, EventType};
use crate::matching::MatchEvaluator;
use crate::scheduler;
use crate::workflow::{FilterSet, TriggerMatchSource, WorkflowTrigger};

use regex::RegexBuilder;
use std::sync::Arc;

/// Decides whether one workflow trigger applies to a document event.
///
/// Pure given identical trigger config, document state, and event clock;
/// the only external call is the auto scorer when a trigger carries an
/// `Auto` match rule.
pub struct TriggerFilter {
    evaluator: Arc<MatchEvaluator>,
}

impl TriggerFilter {
    pub fn new(evaluator: Arc<MatchEvaluator>) -> Self {
        TriggerFilter { evaluator }
    }

    pub async fn applies(
        &self,
        trigger: &WorkflowTrigger,
        document: &Document,
        event: &DocumentEvent,
    ) -> bool {
        // No partial matches across event classes.
        if trigger.trigger_type != event.event_type {
            return false;
        }

        if trigger.trigger_type == EventType::Scheduled {
            let due = match &trigger.schedule {
                Some(schedule) => {
                    scheduler::is_due(schedule, document, event.now, event.last_run)
                }
                None => {
                    log::warn!("scheduled trigger without schedule config never fires");
                    false
                }
            };
            if !due {
                return false;
            }
            // Scheduled triggers are date-driven; any configured content
            // match rule is ignored, but metadata filters still constrain.
            return filters_pass(&trigger.filters, document, event);
        }

        if !filters_pass(&trigger.filters, document, event) {
            return false;
        }

        if trigger.match_rule.is_enabled() {
            let text;
            let subject = match trigger.match_source {
                TriggerMatchSource::Content => {
                    text = document.matchable_text();
                    text.as_str()
                }
                TriggerMatchSource::Filename => document.original_filename.as_str(),
            };
            match self.evaluator.evaluate_unscoped(&trigger.match_rule, subject).await {
                Ok(outcome) => {
                    if !outcome.matched {
                        return false;
                    }
                }
                Err(err) => {
                    // Broken rules fail closed; surfaced for remediation.
                    log::warn!("trigger match rule failed, treating as no match: {err}");
                    return false;
                }
            }
        }

        true
    }
}

fn filters_pass(filters: &FilterSet, document: &Document, event: &DocumentEvent) -> bool {
    if !filters.sources.is_empty() {
        match event.source {
            Some(source) if filters.sources.contains(&source) => {}
            _ => return false,
        }
    }

    if let Some(pattern) = &filters.filename {
        if !glob_matches(&document.original_filename, pattern) {
            return false;
        }
    }

    if let Some(pattern) = &filters.path {
        if !glob_matches(&document.file_path, pattern) {
            return false;
        }
    }

    if !filters.has_any_tags.is_empty()
        && !filters
            .has_any_tags
            .iter()
            .any(|id| document.tag_ids.contains(id))
    {
        return false;
    }

    if !filters
        .has_all_tags
        .iter()
        .all(|id| document.tag_ids.contains(id))
    {
        return false;
    }

    if filters
        .has_not_tags
        .iter()
        .any(|id| document.tag_ids.contains(id))
    {
        return false;
    }

    if let Some(required) = filters.has_correspondent {
        if document.correspondent_id != Some(required) {
            return false;
        }
    }
    if let Some(current) = document.correspondent_id {
        if filters.has_not_correspondents.contains(&current) {
            return false;
        }
    }

    if let Some(required) = filters.has_document_type {
        if document.document_type_id != Some(required) {
            return false;
        }
    }
    if let Some(current) = document.document_type_id {
        if filters.has_not_document_types.contains(&current) {
            return false;
        }
    }

    if let Some(required) = filters.has_storage_path {
        if document.storage_path_id != Some(required) {
            return false;
        }
    }
    if let Some(current) = document.storage_path_id {
        if filters.has_not_storage_paths.contains(&current) {
            return false;
        }
    }

    true
}

/// Case-insensitive glob (`*`, `?`) anchored at both ends, the convention
/// the filename/path filters have always used.
fn glob_matches(text: &str, pattern: &str) -> bool {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    match RegexBuilder::new(&format!("^{escaped}$"))
        .case_insensitive(true)
        .build()
    {
        Ok(regex) => regex.is_match(text),
        Err(err) => {
            log::warn!("glob pattern '{pattern}' failed to compile: {err}");
            false
        }
    }
}
