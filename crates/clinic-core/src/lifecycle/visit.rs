//! Visit state machine.
//!
//! ```text
//! REQUESTED → ACCEPTED → ACTIVE → ENDED
//!     │           │
//!     ├→ REJECTED └→ CANCELED
//!     └→ CANCELED
//! ```

use chrono::Duration;
use tracing::{info, warn};

use super::{DomainEvent, VisitContext, VisitTransition};
use crate::access::PermissionGate;
use crate::models::{Permission, Role, Visit, VisitEvent, VisitNote, VisitState, MAX_VISIT_NOTES};
use crate::{ClinicError, ClinicResult};

/// A requested visit transition.
#[derive(Debug, Clone, PartialEq)]
pub enum VisitAction {
    Accept,
    Reject { reason: Option<String> },
    /// Enter the session; the first join of an accepted visit activates it
    Join,
    InviteParent,
    AddNote { text: String },
    End,
    /// System action: end an active visit that has been idle for `timeout`
    Expire { timeout: Duration },
    Cancel { reason: Option<String> },
}

/// Payload-free discriminant of [`VisitAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitActionKind {
    Accept,
    Reject,
    Join,
    InviteParent,
    AddNote,
    End,
    Expire,
    Cancel,
}

impl VisitActionKind {
    pub const ALL: [VisitActionKind; 8] = [
        VisitActionKind::Accept,
        VisitActionKind::Reject,
        VisitActionKind::Join,
        VisitActionKind::InviteParent,
        VisitActionKind::AddNote,
        VisitActionKind::End,
        VisitActionKind::Expire,
        VisitActionKind::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitActionKind::Accept => "accept",
            VisitActionKind::Reject => "reject",
            VisitActionKind::Join => "join",
            VisitActionKind::InviteParent => "invite_parent",
            VisitActionKind::AddNote => "add_note",
            VisitActionKind::End => "end",
            VisitActionKind::Expire => "expire",
            VisitActionKind::Cancel => "cancel",
        }
    }

    /// Permission checked for a human actor. `AddNote` and `Expire` carry
    /// none: notes are gated on participation, expiry is system-only.
    pub fn permission(&self) -> Option<Permission> {
        match self {
            VisitActionKind::Accept => Some(Permission::VisitAccept),
            VisitActionKind::Reject => Some(Permission::VisitReject),
            VisitActionKind::Join => Some(Permission::VisitJoin),
            VisitActionKind::InviteParent => Some(Permission::VisitInviteParent),
            VisitActionKind::End => Some(Permission::VisitEnd),
            VisitActionKind::Cancel => Some(Permission::VisitCancel),
            VisitActionKind::AddNote | VisitActionKind::Expire => None,
        }
    }
}

impl VisitAction {
    pub fn kind(&self) -> VisitActionKind {
        match self {
            VisitAction::Accept => VisitActionKind::Accept,
            VisitAction::Reject { .. } => VisitActionKind::Reject,
            VisitAction::Join => VisitActionKind::Join,
            VisitAction::InviteParent => VisitActionKind::InviteParent,
            VisitAction::AddNote { .. } => VisitActionKind::AddNote,
            VisitAction::End => VisitActionKind::End,
            VisitAction::Expire { .. } => VisitActionKind::Expire,
            VisitAction::Cancel { .. } => VisitActionKind::Cancel,
        }
    }
}

/// The explicit visit transition table. `actor == None` is the system.
pub fn visit_transition_allowed(
    state: VisitState,
    action: VisitActionKind,
    actor: Option<Role>,
) -> bool {
    use VisitState as S;

    match action {
        VisitActionKind::Accept | VisitActionKind::Reject => {
            state == S::Requested && actor == Some(Role::Doctor)
        }
        VisitActionKind::Join => {
            matches!(state, S::Accepted | S::Active)
                && matches!(actor, Some(Role::Student | Role::Doctor | Role::Parent))
        }
        VisitActionKind::InviteParent => {
            matches!(state, S::Requested | S::Accepted | S::Active) && actor == Some(Role::Doctor)
        }
        VisitActionKind::AddNote => {
            matches!(state, S::Accepted | S::Active)
                && matches!(actor, Some(Role::Student | Role::Doctor | Role::Parent))
        }
        VisitActionKind::End => {
            state == S::Active && matches!(actor, None | Some(Role::Doctor))
        }
        VisitActionKind::Expire => state == S::Active && actor.is_none(),
        VisitActionKind::Cancel => {
            matches!(state, S::Requested | S::Accepted)
                && matches!(actor, None | Some(Role::Student | Role::Doctor))
        }
    }
}

/// Visit state machine guarded by a [`PermissionGate`].
#[derive(Debug, Clone)]
pub struct VisitLifecycle<G> {
    gate: G,
}

impl<G: PermissionGate> VisitLifecycle<G> {
    pub fn new(gate: G) -> Self {
        Self { gate }
    }

    pub fn apply(
        &self,
        visit: &Visit,
        action: VisitAction,
        ctx: &VisitContext,
    ) -> ClinicResult<VisitTransition> {
        let kind = action.kind();

        if let (Some(role), Some(permission)) = (ctx.actor, kind.permission()) {
            if !self.gate.can(role, permission) {
                warn!(visit_id = %visit.id, %role, action = kind.as_str(), state = %visit.state, "permission denied");
                return Err(ClinicError::PermissionDenied {
                    role,
                    permission,
                    action: kind.as_str().into(),
                    state: visit.state.to_string(),
                });
            }
        }

        if !visit_transition_allowed(visit.state, kind, ctx.actor) {
            let actor = ctx.actor.map_or("system", |r| r.as_str());
            return Err(illegal(visit, kind, format!("not allowed for {}", actor)));
        }

        let from = visit.state;
        let mut next = visit.clone();
        let mut events = Vec::new();
        let mut note = None;

        match action {
            VisitAction::Accept => {
                next.state = VisitState::Accepted;
                events.push(DomainEvent::VisitAccepted {
                    visit_id: visit.id.clone(),
                    room_code: visit.room_code.clone(),
                });
            }

            VisitAction::Reject { reason } => {
                let reason = non_blank(reason);
                next.state = VisitState::Rejected;
                next.reject_reason = reason.clone();
                note = reason.clone();
                events.push(DomainEvent::VisitRejected {
                    visit_id: visit.id.clone(),
                    reason,
                });
            }

            VisitAction::Join => {
                // Checked above
                let role = ctx.actor.unwrap_or(Role::Student);
                if role == Role::Parent && !visit.allow_parent_join {
                    return Err(illegal(visit, kind, "parent has not been invited"));
                }
                next.participants.mark_joined(role);
                events.push(DomainEvent::ParticipantJoined {
                    visit_id: visit.id.clone(),
                    role,
                });
                if visit.state == VisitState::Accepted {
                    next.state = VisitState::Active;
                    events.push(DomainEvent::VisitStarted {
                        visit_id: visit.id.clone(),
                        case_id: visit.case_id.clone(),
                    });
                }
            }

            VisitAction::InviteParent => {
                if visit.allow_parent_join {
                    return Err(illegal(visit, kind, "parent already invited"));
                }
                next.allow_parent_join = true;
                events.push(DomainEvent::ParentInvited {
                    visit_id: visit.id.clone(),
                });
            }

            VisitAction::AddNote { text } => {
                let role = ctx.actor.unwrap_or(Role::Student);
                if !visit.participants.has_joined(role) {
                    return Err(illegal(visit, kind, format!("{} has not joined the visit", role)));
                }
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(ClinicError::Validation("visit note is empty".into()));
                }
                next.notes.insert(
                    0,
                    VisitNote {
                        at: ctx.now,
                        role,
                        text,
                    },
                );
                next.notes.truncate(MAX_VISIT_NOTES);
                events.push(DomainEvent::VisitNoteAdded {
                    visit_id: visit.id.clone(),
                    role,
                });
            }

            VisitAction::End => {
                next.state = VisitState::Ended;
                next.ended_at = Some(ctx.now);
                events.push(DomainEvent::VisitEnded {
                    visit_id: visit.id.clone(),
                    case_id: visit.case_id.clone(),
                    timed_out: false,
                });
            }

            VisitAction::Expire { timeout } => {
                let idle = ctx.now - visit.last_activity_at;
                if idle < timeout {
                    return Err(illegal(
                        visit,
                        kind,
                        format!("idle for {}s, timeout is {}s", idle.num_seconds(), timeout.num_seconds()),
                    ));
                }
                next.state = VisitState::Ended;
                next.ended_at = Some(ctx.now);
                note = Some("inactivity timeout".into());
                events.push(DomainEvent::VisitEnded {
                    visit_id: visit.id.clone(),
                    case_id: visit.case_id.clone(),
                    timed_out: true,
                });
            }

            VisitAction::Cancel { reason } => {
                let reason = non_blank(reason);
                next.state = VisitState::Canceled;
                note = reason.clone();
                events.push(DomainEvent::VisitCanceled {
                    visit_id: visit.id.clone(),
                    reason,
                });
            }
        }

        // Expiry is not activity
        if kind != VisitActionKind::Expire {
            next.last_activity_at = ctx.now;
        }
        next.timeline.push(VisitEvent {
            at: ctx.now,
            actor: ctx.actor,
            action: kind.as_str().to_string(),
            from,
            to: next.state,
            note,
        });

        info!(visit_id = %visit.id, action = kind.as_str(), %from, to = %next.state, "visit transition");

        Ok(VisitTransition {
            visit: next,
            events,
        })
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn illegal(visit: &Visit, kind: VisitActionKind, reason: impl Into<String>) -> ClinicError {
    let reason = reason.into();
    warn!(visit_id = %visit.id, action = kind.as_str(), state = %visit.state, %reason, "illegal visit transition");
    ClinicError::IllegalTransition {
        entity: "visit",
        action: kind.as_str().to_string(),
        state: visit.state.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::RolePermissions;
    use chrono::Utc;

    fn lifecycle() -> VisitLifecycle<RolePermissions> {
        VisitLifecycle::new(RolePermissions)
    }

    fn run(visit: &Visit, action: VisitAction, ctx: VisitContext) -> Visit {
        lifecycle().apply(visit, action, &ctx).unwrap().visit
    }

    fn active_visit() -> Visit {
        let now = Utc::now();
        let visit = Visit::requested("case-1".into(), Role::Student, now);
        let visit = run(&visit, VisitAction::Accept, VisitContext::by(Role::Doctor, now));
        run(&visit, VisitAction::Join, VisitContext::by(Role::Doctor, now))
    }

    #[test]
    fn test_first_join_activates() {
        let visit = active_visit();
        assert_eq!(visit.state(), VisitState::Active);
        assert!(visit.participants().has_joined(Role::Doctor));
        assert!(!visit.participants().has_joined(Role::Student));

        let actions: Vec<_> = visit.timeline().iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["request", "accept", "join"]);
    }

    #[test]
    fn test_student_cannot_accept() {
        let visit = Visit::requested("case-1".into(), Role::Student, Utc::now());
        let err = lifecycle()
            .apply(&visit, VisitAction::Accept, &VisitContext::by(Role::Student, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, ClinicError::PermissionDenied { .. }));
    }

    #[test]
    fn test_parent_needs_invite() {
        let now = Utc::now();
        let visit = active_visit();
        let err = lifecycle()
            .apply(&visit, VisitAction::Join, &VisitContext::by(Role::Parent, now))
            .unwrap_err();
        assert!(matches!(err, ClinicError::IllegalTransition { .. }));

        let invited = run(&visit, VisitAction::InviteParent, VisitContext::by(Role::Doctor, now));
        let joined = run(&invited, VisitAction::Join, VisitContext::by(Role::Parent, now));
        assert!(joined.participants().has_joined(Role::Parent));
        assert_eq!(joined.state(), VisitState::Active);
    }

    #[test]
    fn test_notes_newest_first_and_capped() {
        let now = Utc::now();
        let mut visit = active_visit();
        for i in 0..(MAX_VISIT_NOTES + 5) {
            visit = run(
                &visit,
                VisitAction::AddNote {
                    text: format!("note {}", i),
                },
                VisitContext::by(Role::Doctor, now),
            );
        }
        assert_eq!(visit.notes().len(), MAX_VISIT_NOTES);
        assert_eq!(visit.notes()[0].text, format!("note {}", MAX_VISIT_NOTES + 4));
    }

    #[test]
    fn test_note_requires_participation() {
        let visit = active_visit();
        let err = lifecycle()
            .apply(
                &visit,
                VisitAction::AddNote { text: "hi".into() },
                &VisitContext::by(Role::Student, Utc::now()),
            )
            .unwrap_err();
        assert!(matches!(err, ClinicError::IllegalTransition { .. }));
    }

    #[test]
    fn test_end_stamps_time() {
        let visit = active_visit();
        let at = Utc::now() + Duration::minutes(10);
        let ended = run(&visit, VisitAction::End, VisitContext::by(Role::Doctor, at));
        assert_eq!(ended.state(), VisitState::Ended);
        assert_eq!(ended.ended_at(), Some(at));
    }

    #[test]
    fn test_expire_only_after_timeout() {
        let visit = active_visit();
        let timeout = Duration::minutes(30);
        let start = visit.last_activity_at();

        let err = lifecycle()
            .apply(
                &visit,
                VisitAction::Expire { timeout },
                &VisitContext::system(start + Duration::minutes(29)),
            )
            .unwrap_err();
        assert!(matches!(err, ClinicError::IllegalTransition { .. }));

        let result = lifecycle()
            .apply(
                &visit,
                VisitAction::Expire { timeout },
                &VisitContext::system(start + Duration::minutes(30)),
            )
            .unwrap();
        assert_eq!(result.visit.state(), VisitState::Ended);
        assert_eq!(result.visit.last_activity_at(), start);
        assert!(result.events.iter().any(|e| matches!(
            e,
            DomainEvent::VisitEnded { timed_out: true, .. }
        )));
    }

    #[test]
    fn test_cancel_before_start_only() {
        let visit = active_visit();
        let err = lifecycle()
            .apply(
                &visit,
                VisitAction::Cancel { reason: None },
                &VisitContext::system(Utc::now()),
            )
            .unwrap_err();
        assert!(matches!(err, ClinicError::IllegalTransition { .. }));

        let requested = Visit::requested("case-1".into(), Role::Student, Utc::now());
        let canceled = run(
            &requested,
            VisitAction::Cancel {
                reason: Some("consent declined".into()),
            },
            VisitContext::system(Utc::now()),
        );
        assert_eq!(canceled.state(), VisitState::Canceled);
    }

    #[test]
    fn test_closed_states_accept_nothing() {
        for state in [VisitState::Rejected, VisitState::Ended, VisitState::Canceled] {
            for kind in VisitActionKind::ALL {
                for actor in [None, Some(Role::Student), Some(Role::Doctor), Some(Role::Parent), Some(Role::Admin)] {
                    assert!(!visit_transition_allowed(state, kind, actor));
                }
            }
        }
    }
}
