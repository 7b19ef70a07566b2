//! Pure reconciliation of the in-memory report list against change events.
//!
//! The list is kept sorted by `created_at`, newest first, and holds at most
//! one entry per report id. Nothing here knows about transports or views;
//! [`crate::report_list`] feeds it events in arrival order.

use fieldreport_shared::protocol::ChangeEvent;
use fieldreport_shared::types::{Report, Scope};

/// Apply one change notification and return the updated list.
///
/// - an insert of an id already present is handled as an update;
/// - an update upserts, and removes the row if it no longer matches `scope`;
/// - a delete removes by id regardless of scope and is a no-op for unknown ids.
pub fn apply_event(mut list: Vec<Report>, scope: &Scope, event: &ChangeEvent) -> Vec<Report> {
    match event {
        ChangeEvent::Insert(record) | ChangeEvent::Update(record) => {
            let existing = list.iter().position(|r| r.id == record.id);
            match (existing, scope.contains(record)) {
                (Some(idx), true) => list[idx] = record.clone(),
                (Some(idx), false) => {
                    list.remove(idx);
                }
                (None, true) => list.insert(0, record.clone()),
                (None, false) => return list,
            }
        }
        ChangeEvent::Delete { id } => match list.iter().position(|r| &r.id == id) {
            Some(idx) => {
                list.remove(idx);
            }
            None => return list,
        },
    }

    sort_newest_first(&mut list);
    list
}

/// Stable sort by `created_at`, newest first.
pub fn sort_newest_first(list: &mut [Report]) {
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Prepare a bulk-fetch result for display: restrict to scope, drop duplicate
/// ids (first occurrence wins) and sort.
pub fn normalize(reports: Vec<Report>, scope: &Scope) -> Vec<Report> {
    let mut seen = std::collections::HashSet::new();
    let mut list: Vec<Report> = reports
        .into_iter()
        .filter(|r| scope.contains(r) && seen.insert(r.id.clone()))
        .collect();
    sort_newest_first(&mut list);
    list
}
