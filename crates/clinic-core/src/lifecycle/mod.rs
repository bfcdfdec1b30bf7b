//! Case and visit state machines.
//!
//! Every change to a [`Case`] or [`Visit`] goes through
//! [`CaseLifecycle::apply`] or [`VisitLifecycle::apply`]. Both take the
//! current entity by reference and return a new one, so a rejected
//! transition leaves the input untouched. Side effects are returned as
//! [`DomainEvent`]s for the caller to dispatch.

mod case;
mod visit;

pub use case::*;
pub use visit::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Band, Case, CaseState, DecisionCode, Role, Visit};

/// Inputs shared by all case transitions.
#[derive(Debug, Clone, Copy)]
pub struct CaseContext<'a> {
    pub role: Role,
    pub now: DateTime<Utc>,
    /// The case's linked visit, when the transition depends on it
    pub visit: Option<&'a Visit>,
}

impl<'a> CaseContext<'a> {
    pub fn new(role: Role, now: DateTime<Utc>) -> Self {
        Self {
            role,
            now,
            visit: None,
        }
    }

    pub fn with_visit(mut self, visit: &'a Visit) -> Self {
        self.visit = Some(visit);
        self
    }
}

/// Inputs shared by all visit transitions.
#[derive(Debug, Clone, Copy)]
pub struct VisitContext {
    /// `None` for system actions (inactivity expiry, cancellation on a
    /// declined consent)
    pub actor: Option<Role>,
    pub now: DateTime<Utc>,
}

impl VisitContext {
    pub fn by(role: Role, now: DateTime<Utc>) -> Self {
        Self {
            actor: Some(role),
            now,
        }
    }

    pub fn system(now: DateTime<Utc>) -> Self {
        Self { actor: None, now }
    }
}

/// Outcome of a case transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub case: Case,
    /// Visit created by this transition, if any
    pub visit: Option<Visit>,
    pub events: Vec<DomainEvent>,
}

/// Outcome of a visit transition.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitTransition {
    pub visit: Visit,
    pub events: Vec<DomainEvent>,
}

/// Notification-worthy facts produced by transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    CaseOpened {
        case_id: String,
    },
    CaseTriaged {
        case_id: String,
        score: u8,
        band: Band,
        decision_code: DecisionCode,
    },
    RedFlagsRaised {
        case_id: String,
        red_flags: Vec<String>,
    },
    RecheckRequested {
        case_id: String,
    },
    ReadingRecorded {
        case_id: String,
    },
    VisitRequested {
        case_id: String,
        visit_id: String,
    },
    ConsentRequested {
        case_id: String,
    },
    ConsentGranted {
        case_id: String,
    },
    ConsentDeclined {
        case_id: String,
        visit_id: Option<String>,
    },
    CaseVisitStarted {
        case_id: String,
        visit_id: String,
    },
    CaseConcluded {
        case_id: String,
        outcome: CaseState,
    },
    CaseClosed {
        case_id: String,
        reason: String,
    },
    VisitAccepted {
        visit_id: String,
        room_code: String,
    },
    VisitRejected {
        visit_id: String,
        reason: Option<String>,
    },
    ParentInvited {
        visit_id: String,
    },
    ParticipantJoined {
        visit_id: String,
        role: Role,
    },
    VisitStarted {
        visit_id: String,
        case_id: String,
    },
    VisitNoteAdded {
        visit_id: String,
        role: Role,
    },
    VisitEnded {
        visit_id: String,
        case_id: String,
        timed_out: bool,
    },
    VisitCanceled {
        visit_id: String,
        reason: Option<String>,
    },
}
