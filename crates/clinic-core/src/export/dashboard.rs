//! Admin dashboard statistics.

use serde::{Deserialize, Serialize};

use crate::models::{Band, Case, CaseState, Slip, Visit, VisitState};

/// Aggregate counts over all stored cases, visits and slips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_cases: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Cases without a current triage result
    pub untriaged: usize,
    pub follow_up: usize,
    pub referred: usize,
    pub resolved: usize,
    pub closed: usize,
    /// Visits requested or accepted but not yet started
    pub pending_visits: usize,
    pub active_visits: usize,
    pub slips_issued: usize,
}

impl DashboardStats {
    pub fn compute(cases: &[Case], visits: &[Visit], slips: &[Slip]) -> Self {
        let mut stats = DashboardStats {
            total_cases: cases.len(),
            slips_issued: slips.len(),
            ..Default::default()
        };

        for case in cases {
            match case.current_triage().map(|t| t.band()) {
                Some(Band::Critical) => stats.critical += 1,
                Some(Band::High) => stats.high += 1,
                Some(Band::Medium) => stats.medium += 1,
                Some(Band::Low) => stats.low += 1,
                None => stats.untriaged += 1,
            }
            match case.state() {
                CaseState::FollowUp => stats.follow_up += 1,
                CaseState::Referred => stats.referred += 1,
                CaseState::Resolved => stats.resolved += 1,
                CaseState::Closed => stats.closed += 1,
                _ => {}
            }
        }

        for visit in visits {
            match visit.state() {
                VisitState::Requested | VisitState::Accepted => stats.pending_visits += 1,
                VisitState::Active => stats.active_visits += 1,
                _ => {}
            }
        }

        stats
    }

    /// Cases in the two urgent bands.
    pub fn urgent(&self) -> usize {
        self.critical + self.high
    }

    /// Export to JSON format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
