//! Case state machine.
//!
//! ```text
//! DRAFT → OPEN → TRIAGED → VISIT_REQUESTED → VISIT_ACTIVE → RESOLVED | REFERRED
//!           ↑       │  ↑          │  (consent flag)            ↑
//!           └─recheck  └─ FOLLOW_UP ←─ consent declined ────────┘
//! any state → CLOSED (admin override)
//! ```

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{CaseContext, DomainEvent, TransitionResult};
use crate::access::PermissionGate;
use crate::models::{
    Case, CaseState, ConsentState, Permission, Role, StateEvent, TriageResult, Visit, VisitState,
    VitalsRecord,
};
use crate::{ClinicError, ClinicResult};

/// How a case concludes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Resolved,
    Referred,
}

impl Disposition {
    pub fn state(&self) -> CaseState {
        match self {
            Disposition::Resolved => CaseState::Resolved,
            Disposition::Referred => CaseState::Referred,
        }
    }
}

impl std::str::FromStr for Disposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESOLVED" => Ok(Disposition::Resolved),
            "REFERRED" => Ok(Disposition::Referred),
            _ => Err(format!("unknown disposition: {}", s)),
        }
    }
}

/// A requested case transition.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseAction {
    /// Submit the draft (student)
    Open,
    /// Replace the intake with a second reading after a re-check
    RecordReading {
        complaint: String,
        vitals: VitalsRecord,
    },
    /// Attach a freshly produced triage result
    RecordTriage(TriageResult),
    /// Send the case back for a second reading, invalidating the current triage
    RequestRecheck { reason: Option<String> },
    /// Ask for a virtual visit; `manual` bypasses the decision-code guard
    RequestVisit { manual: bool },
    /// Raise the parental consent flag (doctor)
    RequireConsent,
    /// Answer the consent flag (parent)
    RecordConsent { granted: bool },
    /// Follow the linked visit into its active session
    StartVisit,
    /// Finish the case (doctor)
    Conclude { disposition: Disposition },
    /// Administrative override into `CLOSED`
    Close { reason: String },
}

/// Payload-free discriminant of [`CaseAction`], used by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseActionKind {
    Open,
    RecordReading,
    RecordTriage,
    RequestRecheck,
    RequestVisit,
    RequireConsent,
    RecordConsent,
    StartVisit,
    Conclude,
    Close,
}

impl CaseActionKind {
    pub const ALL: [CaseActionKind; 10] = [
        CaseActionKind::Open,
        CaseActionKind::RecordReading,
        CaseActionKind::RecordTriage,
        CaseActionKind::RequestRecheck,
        CaseActionKind::RequestVisit,
        CaseActionKind::RequireConsent,
        CaseActionKind::RecordConsent,
        CaseActionKind::StartVisit,
        CaseActionKind::Conclude,
        CaseActionKind::Close,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseActionKind::Open => "open",
            CaseActionKind::RecordReading => "record_reading",
            CaseActionKind::RecordTriage => "record_triage",
            CaseActionKind::RequestRecheck => "request_recheck",
            CaseActionKind::RequestVisit => "request_visit",
            CaseActionKind::RequireConsent => "require_consent",
            CaseActionKind::RecordConsent => "record_consent",
            CaseActionKind::StartVisit => "start_visit",
            CaseActionKind::Conclude => "conclude",
            CaseActionKind::Close => "close",
        }
    }

    pub fn permission(&self) -> Permission {
        match self {
            CaseActionKind::Open => Permission::CaseCreate,
            CaseActionKind::RecordReading => Permission::TriageRun,
            CaseActionKind::RecordTriage => Permission::TriageRun,
            CaseActionKind::RequestRecheck => Permission::CaseRequestRecheck,
            CaseActionKind::RequestVisit => Permission::VisitRequest,
            CaseActionKind::RequireConsent => Permission::ConsentRequest,
            CaseActionKind::RecordConsent => Permission::ConsentManage,
            CaseActionKind::StartVisit => Permission::VisitJoin,
            CaseActionKind::Conclude => Permission::CaseConclude,
            CaseActionKind::Close => Permission::CaseClose,
        }
    }
}

impl CaseAction {
    pub fn kind(&self) -> CaseActionKind {
        match self {
            CaseAction::Open => CaseActionKind::Open,
            CaseAction::RecordReading { .. } => CaseActionKind::RecordReading,
            CaseAction::RecordTriage(_) => CaseActionKind::RecordTriage,
            CaseAction::RequestRecheck { .. } => CaseActionKind::RequestRecheck,
            CaseAction::RequestVisit { .. } => CaseActionKind::RequestVisit,
            CaseAction::RequireConsent => CaseActionKind::RequireConsent,
            CaseAction::RecordConsent { .. } => CaseActionKind::RecordConsent,
            CaseAction::StartVisit => CaseActionKind::StartVisit,
            CaseAction::Conclude { .. } => CaseActionKind::Conclude,
            CaseAction::Close { .. } => CaseActionKind::Close,
        }
    }
}

/// The explicit transition table over `(state, action, role, consent)`.
///
/// Data guards (intake present, triage freshness, decision code, linked
/// visit state) are checked on top of this by [`CaseLifecycle::apply`].
pub fn case_transition_allowed(
    state: CaseState,
    action: CaseActionKind,
    role: Role,
    consent: ConsentState,
) -> bool {
    use CaseState as S;

    match action {
        CaseActionKind::Open => state == S::Draft && role == Role::Student,
        CaseActionKind::RecordReading => {
            state == S::Open && matches!(role, Role::Student | Role::Doctor)
        }
        CaseActionKind::RecordTriage => match state {
            S::Open => matches!(role, Role::Student | Role::Doctor),
            S::Triaged | S::FollowUp => role == Role::Doctor,
            _ => false,
        },
        CaseActionKind::RequestRecheck => {
            matches!(state, S::Triaged | S::FollowUp) && role == Role::Doctor
        }
        CaseActionKind::RequestVisit => {
            matches!(state, S::Triaged | S::FollowUp)
                && matches!(role, Role::Student | Role::Doctor)
        }
        CaseActionKind::RequireConsent => {
            state.is_visit_stage() && role == Role::Doctor && consent == ConsentState::NotRequired
        }
        CaseActionKind::RecordConsent => {
            state.is_visit_stage() && role == Role::Parent && consent == ConsentState::Required
        }
        CaseActionKind::StartVisit => {
            state == S::VisitRequested
                && matches!(role, Role::Student | Role::Doctor | Role::Parent)
                && consent.permits_visit()
        }
        CaseActionKind::Conclude => {
            matches!(
                state,
                S::Triaged | S::FollowUp | S::VisitRequested | S::VisitActive
            ) && role == Role::Doctor
        }
        CaseActionKind::Close => role == Role::Admin,
    }
}

/// Case state machine guarded by a [`PermissionGate`].
#[derive(Debug, Clone)]
pub struct CaseLifecycle<G> {
    gate: G,
}

impl<G: PermissionGate> CaseLifecycle<G> {
    pub fn new(gate: G) -> Self {
        Self { gate }
    }

    /// Apply an action to a case.
    ///
    /// Returns the new case (and a new visit for `RequestVisit`). On error
    /// nothing is mutated.
    pub fn apply(
        &self,
        case: &Case,
        action: CaseAction,
        ctx: &CaseContext<'_>,
    ) -> ClinicResult<TransitionResult> {
        let kind = action.kind();
        let permission = kind.permission();

        if !self.gate.can(ctx.role, permission) {
            warn!(case_id = %case.id, role = %ctx.role, action = kind.as_str(), state = %case.state, "permission denied");
            return Err(ClinicError::PermissionDenied {
                role: ctx.role,
                permission,
                action: kind.as_str().into(),
                state: case.state.to_string(),
            });
        }

        if !case_transition_allowed(case.state, kind, ctx.role, case.consent) {
            let reason = format!("not allowed for {} with consent {}", ctx.role, case.consent);
            return Err(illegal(case, kind, reason));
        }

        let from = case.state;
        let mut next = case.clone();
        let mut created_visit = None;
        let mut events = Vec::new();
        let mut note = None;

        match action {
            CaseAction::Open => {
                if !case.has_intake() {
                    return Err(illegal(case, kind, "complaint and vitals are both empty"));
                }
                next.state = CaseState::Open;
                events.push(DomainEvent::CaseOpened {
                    case_id: case.id.clone(),
                });
            }

            CaseAction::RecordReading { complaint, vitals } => {
                vitals.validate()?;
                let complaint = complaint.trim().to_string();
                if complaint.is_empty() && !vitals.has_any() {
                    return Err(illegal(case, kind, "complaint and vitals are both empty"));
                }
                next.complaint_text = complaint;
                next.vitals = vitals;
                events.push(DomainEvent::ReadingRecorded {
                    case_id: case.id.clone(),
                });
            }

            CaseAction::RecordTriage(result) => {
                let last_change = case.history.last().map_or(case.created_at, |e| e.at);
                if result.produced_at() < last_change {
                    return Err(illegal(case, kind, "triage result predates the last case change"));
                }
                if case.current_triage.as_ref() == Some(&result) {
                    return Err(illegal(case, kind, "triage result already recorded"));
                }

                events.push(DomainEvent::CaseTriaged {
                    case_id: case.id.clone(),
                    score: result.score(),
                    band: result.band(),
                    decision_code: result.decision_code(),
                });
                if !result.red_flags().is_empty() {
                    events.push(DomainEvent::RedFlagsRaised {
                        case_id: case.id.clone(),
                        red_flags: result.red_flags().to_vec(),
                    });
                }
                note = Some(format!("{} {} ({})", result.band(), result.score(), result.decision_code()));

                if let Some(previous) = next.current_triage.replace(result) {
                    next.triage_history.push(previous);
                }
                next.state = CaseState::Triaged;
            }

            CaseAction::RequestRecheck { reason } => {
                if let Some(previous) = next.current_triage.take() {
                    next.triage_history.push(previous);
                }
                next.state = CaseState::Open;
                note = reason;
                events.push(DomainEvent::RecheckRequested {
                    case_id: case.id.clone(),
                });
            }

            CaseAction::RequestVisit { manual } => {
                let warranted = case
                    .current_triage
                    .as_ref()
                    .is_some_and(|t| t.decision_code().warrants_visit());
                if !manual && !warranted {
                    return Err(illegal(
                        case,
                        kind,
                        "decision code does not call for a visit and the request is not manual",
                    ));
                }
                if case.visit_id.is_some() {
                    let previous = linked_visit(case, ctx).map_err(|r| illegal(case, kind, r))?;
                    if !previous.state().is_closed() {
                        return Err(illegal(case, kind, "case already has an open visit"));
                    }
                }

                let visit = Visit::requested(case.id.clone(), ctx.role, ctx.now);
                next.visit_id = Some(visit.id().to_string());
                next.state = CaseState::VisitRequested;

                let mut remarks = Vec::new();
                if manual {
                    remarks.push("manual request");
                }
                // A refusal answers one visit; the next one starts without a consent flag
                if case.consent == ConsentState::Declined {
                    next.consent = ConsentState::NotRequired;
                    remarks.push("previous consent decline cleared");
                }
                note = (!remarks.is_empty()).then(|| remarks.join("; "));
                events.push(DomainEvent::VisitRequested {
                    case_id: case.id.clone(),
                    visit_id: visit.id().to_string(),
                });
                created_visit = Some(visit);
            }

            CaseAction::RequireConsent => {
                next.consent = ConsentState::Required;
                events.push(DomainEvent::ConsentRequested {
                    case_id: case.id.clone(),
                });
            }

            CaseAction::RecordConsent { granted } => {
                if granted {
                    next.consent = ConsentState::Granted;
                    events.push(DomainEvent::ConsentGranted {
                        case_id: case.id.clone(),
                    });
                } else {
                    next.consent = ConsentState::Declined;
                    next.state = CaseState::FollowUp;
                    note = Some("consent declined, follow-up at school".into());
                    events.push(DomainEvent::ConsentDeclined {
                        case_id: case.id.clone(),
                        visit_id: case.visit_id.clone(),
                    });
                }
            }

            CaseAction::StartVisit => {
                let visit = linked_visit(case, ctx).map_err(|r| illegal(case, kind, r))?;
                if visit.state() != VisitState::Active {
                    return Err(illegal(
                        case,
                        kind,
                        format!("linked visit is {}, not ACTIVE", visit.state()),
                    ));
                }
                next.state = CaseState::VisitActive;
                events.push(DomainEvent::CaseVisitStarted {
                    case_id: case.id.clone(),
                    visit_id: visit.id().to_string(),
                });
            }

            CaseAction::Conclude { disposition } => {
                match case.state {
                    CaseState::VisitActive => {
                        let visit = linked_visit(case, ctx).map_err(|r| illegal(case, kind, r))?;
                        if visit.state() != VisitState::Ended {
                            return Err(illegal(
                                case,
                                kind,
                                format!("linked visit is {}, must be ENDED first", visit.state()),
                            ));
                        }
                    }
                    CaseState::VisitRequested => {
                        let visit = linked_visit(case, ctx).map_err(|r| illegal(case, kind, r))?;
                        if !visit.state().is_closed() {
                            return Err(illegal(
                                case,
                                kind,
                                format!("linked visit is still {}", visit.state()),
                            ));
                        }
                    }
                    _ => {}
                }
                next.state = disposition.state();
                events.push(DomainEvent::CaseConcluded {
                    case_id: case.id.clone(),
                    outcome: next.state,
                });
            }

            CaseAction::Close { reason } => {
                let reason = reason.trim().to_string();
                if reason.is_empty() {
                    return Err(ClinicError::Validation(
                        "a forced close must state a reason".into(),
                    ));
                }
                next.state = CaseState::Closed;
                events.push(DomainEvent::CaseClosed {
                    case_id: case.id.clone(),
                    reason: reason.clone(),
                });
                note = Some(reason);
            }
        }

        next.history.push(StateEvent {
            at: ctx.now,
            actor: ctx.role,
            action: kind.as_str().to_string(),
            from,
            to: next.state,
            note,
        });

        info!(case_id = %case.id, action = kind.as_str(), %from, to = %next.state, role = %ctx.role, "case transition");

        Ok(TransitionResult {
            case: next,
            visit: created_visit,
            events,
        })
    }
}

fn illegal(case: &Case, kind: CaseActionKind, reason: impl Into<String>) -> ClinicError {
    let reason = reason.into();
    warn!(case_id = %case.id, action = kind.as_str(), state = %case.state, %reason, "illegal case transition");
    ClinicError::IllegalTransition {
        entity: "case",
        action: kind.as_str().to_string(),
        state: case.state.to_string(),
        reason,
    }
}

/// The visit supplied in the context, checked against the case's link.
fn linked_visit<'a>(case: &Case, ctx: &CaseContext<'a>) -> Result<&'a Visit, String> {
    let expected = case
        .visit_id
        .as_deref()
        .ok_or_else(|| "case has no linked visit".to_string())?;
    let visit = ctx
        .visit
        .ok_or_else(|| "linked visit was not supplied".to_string())?;
    if visit.id() != expected || visit.case_id() != case.id {
        return Err(format!("visit {} is not linked to this case", visit.id()));
    }
    Ok(visit)
}
