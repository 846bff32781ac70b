use crate::document::Document;
use crate::workflow::{DateField, ScheduleConfig, WorkflowTrigger};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;

/// The anchor date a schedule counts from, for one document.
pub fn anchor_date(schedule: &ScheduleConfig, document: &Document) -> Option<DateTime<Utc>> {
    match schedule.date_field {
        DateField::Created => document.created_at,
        DateField::Added => document.added_at.or(document.created_at),
        DateField::Modified => document.modified_at,
        DateField::DocDate => document.doc_date.map(start_of_day),
        DateField::CustomField => {
            let field_id = schedule.date_custom_field?;
            let raw = document.custom_values.get(&field_id)?;
            parse_date_value(raw)
        }
    }
}

/// When the schedule should fire next for this document, or `None` when it
/// has no anchor date or is exhausted (non-recurring and already fired).
pub fn next_fire(
    schedule: &ScheduleConfig,
    document: &Document,
    last_run: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let first = anchor_date(schedule, document)? + Duration::days(schedule.offset_days);
    match last_run {
        None => Some(first),
        Some(last) => {
            if !schedule.is_recurring {
                return None;
            }
            let interval = schedule.recurring_interval_days?;
            if interval <= 0 {
                return None;
            }
            Some(last + Duration::days(interval))
        }
    }
}

/// Whether the schedule is due at `now`.
pub fn is_due(
    schedule: &ScheduleConfig,
    document: &Document,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> bool {
    match next_fire(schedule, document, last_run) {
        Some(fire_at) => now >= fire_at,
        None => false,
    }
}

/// The periodic sweep: which of these documents is the scheduled trigger
/// due for right now? `last_runs` maps document id to the trigger's most
/// recent fire for that document.
pub fn due_documents<'a>(
    trigger: &WorkflowTrigger,
    documents: &'a [Document],
    now: DateTime<Utc>,
    last_runs: &HashMap<i64, DateTime<Utc>>,
) -> Vec<&'a Document> {
    let schedule = match &trigger.schedule {
        Some(schedule) => schedule,
        None => {
            log::warn!("scheduled trigger without a schedule config; skipping sweep");
            return Vec::new();
        }
    };

    documents
        .iter()
        .filter(|doc| is_due(schedule, doc, now, last_runs.get(&doc.id).copied()))
        .collect()
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is always valid"))
}

/// Custom field date values arrive as either a plain date or a full
/// timestamp, depending on which form saved them.
fn parse_date_value(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Some(start_of_day(date));
    }
    raw.parse::<DateTime<Utc>>().ok()
}
