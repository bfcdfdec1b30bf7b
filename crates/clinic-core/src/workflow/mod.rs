//! Workflow service.
//!
//! Every operation is a read-modify-write transaction: the caller hands in
//! the versioned snapshot it loaded, the lifecycle computes the new entity,
//! and the store accepts the write only if nobody else committed in
//! between. Operations touching two entities commit them as one batch, so
//! a lost race on either surfaces as [`ClinicError::StaleWrite`] and
//! nothing is written.

use tracing::{info, warn};

use crate::access::PermissionGate;
use crate::clock::Clock;
use crate::config::ClinicConfig;
use crate::export::{audit_trail, AuditEntry, CaseSummary, DashboardStats};
use crate::lifecycle::{
    CaseAction, CaseContext, CaseLifecycle, Disposition, DomainEvent, VisitAction, VisitContext,
    VisitLifecycle,
};
use crate::models::{
    Case, CaseState, Permission, RawVitals, Role, Slip, SlipKind, TriageResult, Visit,
    VisitState, VitalsRecord,
};
use crate::store::{Entity, RawWrite, Store, Versioned};
use crate::triage::TriageEngine;
use crate::{ClinicError, ClinicResult};

/// Result of a case-level operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    pub case: Versioned<Case>,
    /// Visit created or updated alongside the case
    pub visit: Option<Versioned<Visit>>,
    pub events: Vec<DomainEvent>,
}

/// Result of a visit-level operation.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitOutcome {
    pub visit: Versioned<Visit>,
    /// Case updated alongside the visit
    pub case: Option<Versioned<Case>>,
    pub events: Vec<DomainEvent>,
}

/// Result of issuing a slip.
#[derive(Debug, Clone, PartialEq)]
pub struct SlipOutcome {
    pub slip: Versioned<Slip>,
    pub case: Versioned<Case>,
    pub events: Vec<DomainEvent>,
}

/// The clinic: triage engine, both lifecycles and a store.
pub struct Clinic<S, G, C> {
    store: S,
    gate: G,
    clock: C,
    engine: TriageEngine,
    cases: CaseLifecycle<G>,
    visits: VisitLifecycle<G>,
    config: ClinicConfig,
}

impl<S: Store, G: PermissionGate + Clone, C: Clock> Clinic<S, G, C> {
    pub fn new(store: S, gate: G, clock: C, config: ClinicConfig) -> Self {
        Self::with_engine(store, gate, clock, config, TriageEngine::new())
    }

    pub fn with_engine(
        store: S,
        gate: G,
        clock: C,
        config: ClinicConfig,
        engine: TriageEngine,
    ) -> Self {
        Self {
            cases: CaseLifecycle::new(gate.clone()),
            visits: VisitLifecycle::new(gate.clone()),
            store,
            gate,
            clock,
            engine,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &TriageEngine {
        &self.engine
    }

    pub fn config(&self) -> &ClinicConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get_case(&self, id: &str) -> ClinicResult<Versioned<Case>> {
        Ok(self.store.read(id)?)
    }

    pub fn get_visit(&self, id: &str) -> ClinicResult<Versioned<Visit>> {
        Ok(self.store.read(id)?)
    }

    pub fn list_cases(&self) -> ClinicResult<Vec<Versioned<Case>>> {
        Ok(self.store.list()?)
    }

    pub fn slips_for_case(&self, case_id: &str) -> ClinicResult<Vec<Slip>> {
        Ok(self
            .store
            .list::<Slip>()?
            .into_iter()
            .map(|v| v.value)
            .filter(|s| s.case_id == case_id)
            .collect())
    }

    /// Run the triage pipeline without touching any case.
    pub fn preview_triage(&self, complaint: &str, raw: &RawVitals) -> (VitalsRecord, TriageResult) {
        self.engine.assess(complaint, raw, self.clock.now())
    }

    // ------------------------------------------------------------------
    // Case operations
    // ------------------------------------------------------------------

    /// Create a `DRAFT` case from raw intake.
    pub fn create_case(
        &self,
        role: Role,
        subject: &str,
        complaint: &str,
        raw: &RawVitals,
    ) -> ClinicResult<Versioned<Case>> {
        self.require(role, Permission::CaseCreate, "create", "NONE")?;

        let subject = subject.trim();
        if subject.is_empty() {
            return Err(ClinicError::Validation("subject cannot be empty".into()));
        }
        let vitals = self.engine.normalize(raw);
        vitals.validate()?;

        let now = self.clock.now();
        let case = Case::draft(subject.to_string(), complaint.trim().to_string(), vitals, now);
        self.commit(case, 0)
    }

    /// Submit a draft.
    pub fn open_case(&self, case: &Versioned<Case>, role: Role) -> ClinicResult<CaseOutcome> {
        self.apply_case(case, role, CaseAction::Open)
    }

    /// Run the triage pipeline on the case's intake and record the result.
    pub fn triage_case(&self, case: &Versioned<Case>, role: Role) -> ClinicResult<CaseOutcome> {
        let result = self.engine.evaluate(
            case.value.complaint_text(),
            case.value.vitals(),
            self.clock.now(),
        );
        self.apply_case(case, role, CaseAction::RecordTriage(result))
    }

    /// Send the case back to `OPEN`, invalidating its triage.
    pub fn request_recheck(
        &self,
        case: &Versioned<Case>,
        role: Role,
        reason: Option<String>,
    ) -> ClinicResult<CaseOutcome> {
        self.apply_case(case, role, CaseAction::RequestRecheck { reason })
    }

    /// Replace the intake of an `OPEN` case with a fresh reading, typically
    /// after a re-check. Triage it afterwards with [`Clinic::triage_case`].
    pub fn record_reading(
        &self,
        case: &Versioned<Case>,
        role: Role,
        complaint: &str,
        raw: &RawVitals,
    ) -> ClinicResult<CaseOutcome> {
        let vitals = self.engine.normalize(raw);
        self.apply_case(
            case,
            role,
            CaseAction::RecordReading {
                complaint: complaint.to_string(),
                vitals,
            },
        )
    }

    /// Request a virtual visit. `manual` bypasses the decision-code guard.
    pub fn request_visit(
        &self,
        case: &Versioned<Case>,
        role: Role,
        manual: bool,
    ) -> ClinicResult<CaseOutcome> {
        let linked = self.linked_visit(&case.value)?;
        let now = self.clock.now();
        let mut ctx = CaseContext::new(role, now);
        if let Some(visit) = &linked {
            ctx = ctx.with_visit(&visit.value);
        }

        let result = self
            .cases
            .apply(&case.value, CaseAction::RequestVisit { manual }, &ctx)?;

        let (committed, visit) =
            self.commit_pair(result.case, case.version, result.visit.map(|v| (v, 0)))?;

        Ok(CaseOutcome {
            case: committed,
            visit,
            events: result.events,
        })
    }

    /// Raise the parental consent flag on a case in a visit stage.
    pub fn require_consent(&self, case: &Versioned<Case>, role: Role) -> ClinicResult<CaseOutcome> {
        self.apply_case(case, role, CaseAction::RequireConsent)
    }

    /// Record the parent's answer.
    ///
    /// A grant while the visit is already running moves the case to
    /// `VISIT_ACTIVE`. A decline moves the case to `FOLLOW_UP` and closes
    /// the visit: canceled if it never started, ended if it did.
    pub fn record_consent(
        &self,
        case: &Versioned<Case>,
        role: Role,
        granted: bool,
    ) -> ClinicResult<CaseOutcome> {
        let now = self.clock.now();
        let linked = self.linked_visit(&case.value)?;
        let mut ctx = CaseContext::new(role, now);
        if let Some(visit) = &linked {
            ctx = ctx.with_visit(&visit.value);
        }

        let mut result = self
            .cases
            .apply(&case.value, CaseAction::RecordConsent { granted }, &ctx)?;
        let mut visit_update = None;

        if let Some(visit) = &linked {
            if granted {
                if visit.value.state() == VisitState::Active
                    && result.case.state() == CaseState::VisitRequested
                {
                    let started = self.cases.apply(&result.case, CaseAction::StartVisit, &ctx)?;
                    result.case = started.case;
                    result.events.extend(started.events);
                }
            } else {
                let action = match visit.value.state() {
                    VisitState::Requested | VisitState::Accepted => Some(VisitAction::Cancel {
                        reason: Some("consent declined".into()),
                    }),
                    VisitState::Active => Some(VisitAction::End),
                    _ => None,
                };
                if let Some(action) = action {
                    let t = self
                        .visits
                        .apply(&visit.value, action, &VisitContext::system(now))?;
                    result.events.extend(t.events);
                    visit_update = Some((t.visit, visit.version));
                }
            }
        }

        let (committed, visit) = self.commit_pair(result.case, case.version, visit_update)?;

        Ok(CaseOutcome {
            case: committed,
            visit,
            events: result.events,
        })
    }

    /// Issue a rest or referral slip and conclude the case accordingly.
    pub fn issue_slip(
        &self,
        case: &Versioned<Case>,
        role: Role,
        kind: SlipKind,
        days: u32,
        notes: &str,
    ) -> ClinicResult<SlipOutcome> {
        self.require(role, Permission::SlipIssue, "issue_slip", case.value.state().as_str())?;

        let disposition = match kind {
            SlipKind::Rest => Disposition::Resolved,
            SlipKind::Referral => Disposition::Referred,
        };
        let linked = self.linked_visit(&case.value)?;
        let now = self.clock.now();
        let mut ctx = CaseContext::new(role, now);
        if let Some(visit) = &linked {
            ctx = ctx.with_visit(&visit.value);
        }
        let result = self
            .cases
            .apply(&case.value, CaseAction::Conclude { disposition }, &ctx)?;

        let slip = Slip::new(
            case.value.id().to_string(),
            kind,
            days,
            notes.trim().to_string(),
            now,
        );
        let (committed, slip) = self.commit_pair(result.case, case.version, Some((slip, 0)))?;
        let slip = slip.ok_or_else(|| ClinicError::Storage("slip write not acknowledged".into()))?;

        Ok(SlipOutcome {
            slip,
            case: committed,
            events: result.events,
        })
    }

    /// Conclude without a slip.
    pub fn conclude_case(
        &self,
        case: &Versioned<Case>,
        role: Role,
        disposition: Disposition,
    ) -> ClinicResult<CaseOutcome> {
        self.apply_case(case, role, CaseAction::Conclude { disposition })
    }

    /// Administrative override into `CLOSED`.
    pub fn close_case(
        &self,
        case: &Versioned<Case>,
        role: Role,
        reason: &str,
    ) -> ClinicResult<CaseOutcome> {
        self.apply_case(
            case,
            role,
            CaseAction::Close {
                reason: reason.to_string(),
            },
        )
    }

    // ------------------------------------------------------------------
    // Visit operations
    // ------------------------------------------------------------------

    pub fn accept_visit(&self, visit: &Versioned<Visit>, role: Role) -> ClinicResult<VisitOutcome> {
        self.apply_visit(visit, VisitAction::Accept, VisitContext::by(role, self.clock.now()))
    }

    pub fn reject_visit(
        &self,
        visit: &Versioned<Visit>,
        role: Role,
        reason: Option<String>,
    ) -> ClinicResult<VisitOutcome> {
        self.apply_visit(
            visit,
            VisitAction::Reject { reason },
            VisitContext::by(role, self.clock.now()),
        )
    }

    pub fn invite_parent(&self, visit: &Versioned<Visit>, role: Role) -> ClinicResult<VisitOutcome> {
        self.apply_visit(visit, VisitAction::InviteParent, VisitContext::by(role, self.clock.now()))
    }

    pub fn add_visit_note(
        &self,
        visit: &Versioned<Visit>,
        role: Role,
        text: &str,
    ) -> ClinicResult<VisitOutcome> {
        self.apply_visit(
            visit,
            VisitAction::AddNote {
                text: text.to_string(),
            },
            VisitContext::by(role, self.clock.now()),
        )
    }

    pub fn end_visit(&self, visit: &Versioned<Visit>, role: Role) -> ClinicResult<VisitOutcome> {
        self.apply_visit(visit, VisitAction::End, VisitContext::by(role, self.clock.now()))
    }

    pub fn cancel_visit(
        &self,
        visit: &Versioned<Visit>,
        role: Role,
        reason: Option<String>,
    ) -> ClinicResult<VisitOutcome> {
        self.apply_visit(
            visit,
            VisitAction::Cancel { reason },
            VisitContext::by(role, self.clock.now()),
        )
    }

    /// Join the session. When the join starts the visit and consent
    /// permits, the linked case moves to `VISIT_ACTIVE` in the same call.
    pub fn join_visit(&self, visit: &Versioned<Visit>, role: Role) -> ClinicResult<VisitOutcome> {
        let now = self.clock.now();
        let t = self
            .visits
            .apply(&visit.value, VisitAction::Join, &VisitContext::by(role, now))?;
        let mut events = t.events;
        let mut case_update = None;

        if t.visit.state() == VisitState::Active && visit.value.state() == VisitState::Accepted {
            let case: Versioned<Case> = self.store.read(t.visit.case_id())?;
            if case.value.state() == CaseState::VisitRequested && case.value.consent().permits_visit() {
                let started = self.cases.apply(
                    &case.value,
                    CaseAction::StartVisit,
                    &CaseContext::new(role, now).with_visit(&t.visit),
                )?;
                events.extend(started.events);
                case_update = Some((started.case, case.version));
            }
        }

        let (committed, case) = self.commit_pair(t.visit, visit.version, case_update)?;

        Ok(VisitOutcome {
            visit: committed,
            case,
            events,
        })
    }

    /// End every active visit idle for longer than the configured timeout.
    ///
    /// A visit touched concurrently is skipped; it will be reconsidered on
    /// the next sweep.
    pub fn expire_stale_visits(&self) -> ClinicResult<Vec<DomainEvent>> {
        let now = self.clock.now();
        let timeout = self.config.visit_inactivity_timeout();
        let mut events = Vec::new();

        for visit in self.store.list::<Visit>()? {
            if visit.value.state() != VisitState::Active
                || now - visit.value.last_activity_at() < timeout
            {
                continue;
            }

            let t = self.visits.apply(
                &visit.value,
                VisitAction::Expire { timeout },
                &VisitContext::system(now),
            )?;
            match self.commit(t.visit, visit.version) {
                Ok(_) => events.extend(t.events),
                Err(ClinicError::StaleWrite { id, .. }) => {
                    warn!(visit_id = %id, "visit changed during expiry sweep, skipped");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(events)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Admin dashboard counters.
    pub fn dashboard(&self, role: Role) -> ClinicResult<DashboardStats> {
        self.require(role, Permission::DashView, "dashboard", "NONE")?;

        let cases: Vec<Case> = self.store.list::<Case>()?.into_iter().map(|v| v.value).collect();
        let visits: Vec<Visit> = self.store.list::<Visit>()?.into_iter().map(|v| v.value).collect();
        let slips: Vec<Slip> = self.store.list::<Slip>()?.into_iter().map(|v| v.value).collect();

        Ok(DashboardStats::compute(&cases, &visits, &slips))
    }

    /// Every case transition across the clinic, oldest first.
    pub fn audit_log(&self, role: Role) -> ClinicResult<Vec<AuditEntry>> {
        self.require(role, Permission::AuditView, "audit_log", "NONE")?;

        let cases: Vec<Case> = self.store.list::<Case>()?.into_iter().map(|v| v.value).collect();
        Ok(audit_trail(&cases))
    }

    /// Portal summary of one case.
    pub fn case_summary(&self, case_id: &str, role: Role) -> ClinicResult<CaseSummary> {
        let viewer = [
            Permission::CaseViewAll,
            Permission::ReportViewSelf,
            Permission::ReportViewChild,
        ];
        let case: Versioned<Case> = self.store.read(case_id)?;
        if !viewer.iter().any(|p| self.gate.can(role, *p)) {
            return Err(ClinicError::PermissionDenied {
                role,
                permission: Permission::CaseViewAll,
                action: "case_summary".into(),
                state: case.value.state().to_string(),
            });
        }

        let slips = self.slips_for_case(case_id)?;
        Ok(CaseSummary::from_case(&case.value, &slips))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn require(&self, role: Role, permission: Permission, action: &str, state: &str) -> ClinicResult<()> {
        if self.gate.can(role, permission) {
            return Ok(());
        }
        warn!(%role, %permission, action, "permission denied");
        Err(ClinicError::PermissionDenied {
            role,
            permission,
            action: action.to_string(),
            state: state.to_string(),
        })
    }

    fn linked_visit(&self, case: &Case) -> ClinicResult<Option<Versioned<Visit>>> {
        match case.visit_id() {
            Some(id) => Ok(Some(self.store.read(id)?)),
            None => Ok(None),
        }
    }

    /// Apply a case action that creates no visit, with the linked visit
    /// loaded as context.
    fn apply_case(
        &self,
        case: &Versioned<Case>,
        role: Role,
        action: CaseAction,
    ) -> ClinicResult<CaseOutcome> {
        let linked = self.linked_visit(&case.value)?;
        let mut ctx = CaseContext::new(role, self.clock.now());
        if let Some(visit) = &linked {
            ctx = ctx.with_visit(&visit.value);
        }

        let result = self.cases.apply(&case.value, action, &ctx)?;
        Ok(CaseOutcome {
            case: self.commit(result.case, case.version)?,
            visit: None,
            events: result.events,
        })
    }

    fn apply_visit(
        &self,
        visit: &Versioned<Visit>,
        action: VisitAction,
        ctx: VisitContext,
    ) -> ClinicResult<VisitOutcome> {
        let t = self.visits.apply(&visit.value, action, &ctx)?;
        Ok(VisitOutcome {
            visit: self.commit(t.visit, visit.version)?,
            case: None,
            events: t.events,
        })
    }

    /// Commit a primary entity and an optional companion in one batch.
    fn commit_pair<A: Entity, B: Entity>(
        &self,
        primary: A,
        expected: u64,
        companion: Option<(B, u64)>,
    ) -> ClinicResult<(Versioned<A>, Option<Versioned<B>>)> {
        let Some((other, other_expected)) = companion else {
            return Ok((self.commit(primary, expected)?, None));
        };

        let at = self.clock.now();
        let writes = vec![
            RawWrite::of(&primary, expected)?,
            RawWrite::of(&other, other_expected)?,
        ];
        let versions = self.store.store_all_raw(writes, at)?;
        let (&first, &second) = match versions.as_slice() {
            [a, b] => (a, b),
            _ => {
                return Err(ClinicError::Storage(format!(
                    "batch of 2 returned {} versions",
                    versions.len()
                )))
            }
        };
        info!(kind = A::KIND, id = primary.id(), version = first, with_kind = B::KIND, with_id = other.id(), with_version = second, "committed");

        Ok((
            Versioned {
                version: first,
                updated_at: at,
                value: primary,
            },
            Some(Versioned {
                version: second,
                updated_at: at,
                value: other,
            }),
        ))
    }

    fn commit<E: Entity>(&self, entity: E, expected: u64) -> ClinicResult<Versioned<E>> {
        let at = self.clock.now();
        let version = self.store.write_if_version(&entity, expected, at)?;
        info!(kind = E::KIND, id = entity.id(), version, "committed");
        Ok(Versioned {
            version,
            updated_at: at,
            value: entity,
        })
    }
}

impl<S, G, C> std::fmt::Debug for Clinic<S, G, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clinic")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
