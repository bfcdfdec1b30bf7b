//! Case models: one student intake episode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::Role;
use super::triage::TriageResult;
use super::vitals::VitalsRecord;

/// Lifecycle state of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseState {
    /// Created, not yet submitted
    Draft,
    /// Submitted, awaiting triage
    Open,
    /// Has a current triage result
    Triaged,
    /// A virtual visit has been requested
    VisitRequested,
    /// The linked visit is running
    VisitActive,
    /// Followed up inside the school (e.g. after declined consent)
    FollowUp,
    Resolved,
    Referred,
    /// Forced close by an administrator
    Closed,
}

impl CaseState {
    pub const ALL: [CaseState; 9] = [
        CaseState::Draft,
        CaseState::Open,
        CaseState::Triaged,
        CaseState::VisitRequested,
        CaseState::VisitActive,
        CaseState::FollowUp,
        CaseState::Resolved,
        CaseState::Referred,
        CaseState::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseState::Draft => "DRAFT",
            CaseState::Open => "OPEN",
            CaseState::Triaged => "TRIAGED",
            CaseState::VisitRequested => "VISIT_REQUESTED",
            CaseState::VisitActive => "VISIT_ACTIVE",
            CaseState::FollowUp => "FOLLOW_UP",
            CaseState::Resolved => "RESOLVED",
            CaseState::Referred => "REFERRED",
            CaseState::Closed => "CLOSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaseState::Resolved | CaseState::Referred | CaseState::Closed
        )
    }

    /// States in which a linked visit may exist and consent may be flagged.
    pub fn is_visit_stage(&self) -> bool {
        matches!(self, CaseState::VisitRequested | CaseState::VisitActive)
    }
}

impl std::fmt::Display for CaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parental consent attached to a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentState {
    #[default]
    #[serde(rename = "NONE")]
    NotRequired,
    Required,
    Granted,
    Declined,
}

impl ConsentState {
    pub const ALL: [ConsentState; 4] = [
        ConsentState::NotRequired,
        ConsentState::Required,
        ConsentState::Granted,
        ConsentState::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentState::NotRequired => "NONE",
            ConsentState::Required => "REQUIRED",
            ConsentState::Granted => "GRANTED",
            ConsentState::Declined => "DECLINED",
        }
    }

    /// Whether a visit may go ahead under this consent state.
    pub fn permits_visit(&self) -> bool {
        matches!(self, ConsentState::NotRequired | ConsentState::Granted)
    }
}

impl std::fmt::Display for ConsentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a case's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEvent {
    pub at: DateTime<Utc>,
    pub actor: Role,
    pub action: String,
    pub from: CaseState,
    pub to: CaseState,
    pub note: Option<String>,
}

/// A student intake episode.
///
/// Fields are only mutated by [`crate::lifecycle::CaseLifecycle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub(crate) id: String,
    pub(crate) created_at: DateTime<Utc>,
    /// Display name or external reference
    pub(crate) subject: String,
    pub(crate) complaint_text: String,
    pub(crate) vitals: VitalsRecord,
    pub(crate) current_triage: Option<TriageResult>,
    /// Superseded or invalidated triage results, oldest first
    pub(crate) triage_history: Vec<TriageResult>,
    pub(crate) state: CaseState,
    pub(crate) consent: ConsentState,
    /// Linked visit, if one was requested
    pub(crate) visit_id: Option<String>,
    pub(crate) history: Vec<StateEvent>,
}

impl Case {
    /// Create a new case in `DRAFT`.
    pub fn draft(
        subject: String,
        complaint_text: String,
        vitals: VitalsRecord,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at,
            subject,
            complaint_text,
            vitals,
            current_triage: None,
            triage_history: Vec::new(),
            state: CaseState::Draft,
            consent: ConsentState::NotRequired,
            visit_id: None,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn complaint_text(&self) -> &str {
        &self.complaint_text
    }

    pub fn vitals(&self) -> &VitalsRecord {
        &self.vitals
    }

    pub fn current_triage(&self) -> Option<&TriageResult> {
        self.current_triage.as_ref()
    }

    pub fn triage_history(&self) -> &[TriageResult] {
        &self.triage_history
    }

    pub fn state(&self) -> CaseState {
        self.state
    }

    pub fn consent(&self) -> ConsentState {
        self.consent
    }

    pub fn visit_id(&self) -> Option<&str> {
        self.visit_id.as_deref()
    }

    pub fn history(&self) -> &[StateEvent] {
        &self.history
    }

    /// Whether the consent flag is raised and still unanswered.
    pub fn awaiting_consent(&self) -> bool {
        self.consent == ConsentState::Required
    }

    /// Whether the intake carries anything to triage.
    pub fn has_intake(&self) -> bool {
        !self.complaint_text.trim().is_empty() || self.vitals.has_any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_case_is_draft() {
        let case = Case::draft(
            "Sara".into(),
            "كحة".into(),
            VitalsRecord::default(),
            Utc::now(),
        );
        assert_eq!(case.state(), CaseState::Draft);
        assert_eq!(case.consent(), ConsentState::NotRequired);
        assert!(case.current_triage().is_none());
        assert_eq!(case.id().len(), 36);
        assert!(case.has_intake());
    }

    #[test]
    fn test_blank_intake() {
        let case = Case::draft("Sara".into(), "   ".into(), VitalsRecord::default(), Utc::now());
        assert!(!case.has_intake());
    }

    #[test]
    fn test_case_json_shape() {
        let case = Case::draft("Sara".into(), "صداع".into(), VitalsRecord::default(), Utc::now());
        let json = serde_json::to_value(&case).unwrap();

        assert_eq!(json["state"], "DRAFT");
        assert_eq!(json["consent"], "NONE");
        assert_eq!(json["complaintText"], "صداع");
        assert!(json["currentTriage"].is_null());
        assert!(json["createdAt"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = CaseState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![CaseState::Resolved, CaseState::Referred, CaseState::Closed]
        );
    }
}
