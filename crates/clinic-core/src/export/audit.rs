//! Audit trail across all cases for the admin console.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::escape_csv;
use crate::models::{Case, CaseState, Role};

/// One case transition, flattened for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub case_id: String,
    pub subject: String,
    pub at: DateTime<Utc>,
    pub actor: Role,
    pub action: String,
    pub from: CaseState,
    pub to: CaseState,
    pub note: Option<String>,
}

/// Every history entry of every case, oldest first.
///
/// Entries with the same timestamp keep their per-case order.
pub fn audit_trail(cases: &[Case]) -> Vec<AuditEntry> {
    let mut entries: Vec<AuditEntry> = cases
        .iter()
        .flat_map(|case| {
            case.history().iter().map(move |e| AuditEntry {
                case_id: case.id().to_string(),
                subject: case.subject().to_string(),
                at: e.at,
                actor: e.actor,
                action: e.action.clone(),
                from: e.from,
                to: e.to,
                note: e.note.clone(),
            })
        })
        .collect();
    entries.sort_by_key(|e| e.at);
    entries
}

pub fn audit_to_csv(entries: &[AuditEntry]) -> String {
    let mut csv = String::new();

    csv.push_str("at,case_id,subject,actor,action,from,to,note\n");

    for e in entries {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            e.at.to_rfc3339(),
            escape_csv(&e.case_id),
            escape_csv(&e.subject),
            e.actor,
            e.action,
            e.from,
            e.to,
            escape_csv(e.note.as_deref().unwrap_or_default()),
        ));
    }

    csv
}
