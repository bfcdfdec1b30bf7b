//! Virtual visit models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::Role;

/// Maximum number of notes kept on a visit.
pub const MAX_VISIT_NOTES: usize = 60;

/// Lifecycle state of a visit.
///
/// A case with no visit is represented by the absence of a `Visit`, so
/// there is no `NONE` variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitState {
    Requested,
    Accepted,
    Rejected,
    Active,
    Ended,
    /// Withdrawn before it started
    Canceled,
}

impl VisitState {
    pub const ALL: [VisitState; 6] = [
        VisitState::Requested,
        VisitState::Accepted,
        VisitState::Rejected,
        VisitState::Active,
        VisitState::Ended,
        VisitState::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitState::Requested => "REQUESTED",
            VisitState::Accepted => "ACCEPTED",
            VisitState::Rejected => "REJECTED",
            VisitState::Active => "ACTIVE",
            VisitState::Ended => "ENDED",
            VisitState::Canceled => "CANCELED",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            VisitState::Rejected | VisitState::Ended | VisitState::Canceled
        )
    }
}

impl std::fmt::Display for VisitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a visit's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEvent {
    pub at: DateTime<Utc>,
    /// `None` for system actions such as inactivity expiry
    pub actor: Option<Role>,
    pub action: String,
    pub from: VisitState,
    pub to: VisitState,
    pub note: Option<String>,
}

/// Free-text note added during a visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitNote {
    pub at: DateTime<Utc>,
    pub role: Role,
    pub text: String,
}

/// Who has joined the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participants {
    pub student_joined: bool,
    pub doctor_joined: bool,
    pub parent_joined: bool,
}

impl Participants {
    pub fn has_joined(&self, role: Role) -> bool {
        match role {
            Role::Student => self.student_joined,
            Role::Doctor => self.doctor_joined,
            Role::Parent => self.parent_joined,
            Role::Admin => false,
        }
    }

    pub(crate) fn mark_joined(&mut self, role: Role) {
        match role {
            Role::Student => self.student_joined = true,
            Role::Doctor => self.doctor_joined = true,
            Role::Parent => self.parent_joined = true,
            Role::Admin => {}
        }
    }
}

/// A virtual session linked 1:1 to a case.
///
/// Fields are only mutated by [`crate::lifecycle::VisitLifecycle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub(crate) id: String,
    pub(crate) case_id: String,
    pub(crate) state: VisitState,
    pub(crate) allow_parent_join: bool,
    pub(crate) timeline: Vec<VisitEvent>,
    pub(crate) room_code: String,
    pub(crate) participants: Participants,
    /// Newest first
    pub(crate) notes: Vec<VisitNote>,
    pub(crate) reject_reason: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_activity_at: DateTime<Utc>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
}

impl Visit {
    pub(crate) fn requested(case_id: String, requested_by: Role, at: DateTime<Utc>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let room_code = room_code_for(&id);
        Self {
            id,
            case_id,
            state: VisitState::Requested,
            allow_parent_join: false,
            timeline: vec![VisitEvent {
                at,
                actor: Some(requested_by),
                action: "request".into(),
                from: VisitState::Requested,
                to: VisitState::Requested,
                note: None,
            }],
            room_code,
            participants: Participants::default(),
            notes: Vec::new(),
            reject_reason: None,
            created_at: at,
            last_activity_at: at,
            ended_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn state(&self) -> VisitState {
        self.state
    }

    pub fn allow_parent_join(&self) -> bool {
        self.allow_parent_join
    }

    pub fn timeline(&self) -> &[VisitEvent] {
        &self.timeline
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn participants(&self) -> &Participants {
        &self.participants
    }

    pub fn notes(&self) -> &[VisitNote] {
        &self.notes
    }

    pub fn reject_reason(&self) -> Option<&str> {
        self.reject_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }
}

/// Short code shown to participants: last six characters of the id.
fn room_code_for(id: &str) -> String {
    super::id_suffix(id, 6).to_uppercase()
}
