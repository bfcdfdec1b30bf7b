//! Workflow integration tests: full case/visit flows over both stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use clinic_core::db::Database;
use clinic_core::lifecycle::{Disposition, DomainEvent};
use clinic_core::models::{
    Band, CaseState, ConsentState, RawVitals, Role, SlipKind, VisitState,
};
use clinic_core::store::{
    MemoryStore, RawRecord, RawWrite, Store, StoreError, StoreResult, Versioned,
};
use clinic_core::{Case, Clinic, ClinicConfig, ClinicError, ManualClock, RolePermissions};

type TestClinic<S> = Clinic<S, RolePermissions, Arc<ManualClock>>;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap(),
    ))
}

fn memory_clinic() -> (TestClinic<Arc<MemoryStore>>, Arc<ManualClock>) {
    let clock = clock();
    let clinic = Clinic::new(
        Arc::new(MemoryStore::new()),
        RolePermissions,
        clock.clone(),
        ClinicConfig::default(),
    );
    (clinic, clock)
}

fn high_vitals() -> RawVitals {
    RawVitals::new(128.0, 94.0, 38.9, 130.0, 84.0)
}

/// Create, open and triage a case as the student.
fn triaged_case<S: Store>(clinic: &TestClinic<S>, complaint: &str, raw: RawVitals) -> Versioned<Case> {
    let case = clinic
        .create_case(Role::Student, "Sara", complaint, &raw)
        .unwrap();
    let case = clinic.open_case(&case, Role::Student).unwrap().case;
    clinic.triage_case(&case, Role::Student).unwrap().case
}

#[test]
fn test_draft_cannot_request_visit() {
    let (clinic, _) = memory_clinic();
    let case = clinic
        .create_case(Role::Student, "Sara", "ضيق تنفس", &high_vitals())
        .unwrap();

    let err = clinic.request_visit(&case, Role::Student, true).unwrap_err();
    match err {
        ClinicError::IllegalTransition { action, state, .. } => {
            assert_eq!(action, "request_visit");
            assert_eq!(state, "DRAFT");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let stored = clinic.get_case(case.value.id()).unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.value, case.value);
}

#[test]
fn test_concurrent_writers_memory_store() {
    let clock = clock();
    let store = Arc::new(MemoryStore::new());
    let tab_a = Clinic::new(store.clone(), RolePermissions, clock.clone(), ClinicConfig::default());
    let tab_b = Clinic::new(store.clone(), RolePermissions, clock.clone(), ClinicConfig::default());

    let case = triaged_case(&tab_a, "ضيق تنفس", high_vitals());
    assert_eq!(case.version, 3);

    // Both tabs hold v3
    let seen_by_a = tab_a.get_case(case.value.id()).unwrap();
    let seen_by_b = tab_b.get_case(case.value.id()).unwrap();

    let a = tab_a.request_visit(&seen_by_a, Role::Student, false).unwrap();
    assert_eq!(a.case.version, 4);

    let err = tab_b
        .request_recheck(&seen_by_b, Role::Doctor, Some("second reading".into()))
        .unwrap_err();
    assert!(matches!(
        err,
        ClinicError::StaleWrite {
            expected: 3,
            actual: 4,
            ..
        }
    ));

    let stored = tab_b.get_case(case.value.id()).unwrap();
    assert_eq!(stored.version, 4);
    assert_eq!(stored.value.state(), CaseState::VisitRequested);
    assert!(stored.value.current_triage().is_some());
}

#[test]
fn test_concurrent_writers_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic.db");
    let clock = clock();

    let tab_a = Clinic::new(
        Database::open(&path).unwrap(),
        RolePermissions,
        clock.clone(),
        ClinicConfig::default(),
    );
    let tab_b = Clinic::new(
        Database::open(&path).unwrap(),
        RolePermissions,
        clock.clone(),
        ClinicConfig::default(),
    );

    let case = triaged_case(&tab_a, "ضيق تنفس", high_vitals());
    let seen_by_a = tab_a.get_case(case.value.id()).unwrap();
    let seen_by_b = tab_b.get_case(case.value.id()).unwrap();
    assert_eq!(seen_by_b.version, 3);

    tab_a.request_visit(&seen_by_a, Role::Student, false).unwrap();

    let err = tab_b.request_visit(&seen_by_b, Role::Doctor, true).unwrap_err();
    assert!(matches!(err, ClinicError::StaleWrite { expected: 3, .. }));

    // Writer B left no trace: one case at v4, one visit
    let stored = tab_b.get_case(case.value.id()).unwrap();
    assert_eq!(stored.version, 4);
    assert_eq!(tab_b.store().list::<clinic_core::Visit>().unwrap().len(), 1);
}

#[test]
fn test_declined_consent_falls_back_to_follow_up() {
    let (clinic, _) = memory_clinic();
    let case = triaged_case(&clinic, "ضيق تنفس", high_vitals());

    let requested = clinic.request_visit(&case, Role::Student, false).unwrap();
    let visit_id = requested.visit.as_ref().unwrap().value.id().to_string();

    let flagged = clinic.require_consent(&requested.case, Role::Doctor).unwrap();
    assert_eq!(flagged.case.value.consent(), ConsentState::Required);
    assert_eq!(flagged.case.value.state(), CaseState::VisitRequested);

    let declined = clinic.record_consent(&flagged.case, Role::Parent, false).unwrap();
    assert_eq!(declined.case.value.state(), CaseState::FollowUp);
    assert_eq!(declined.case.value.consent(), ConsentState::Declined);
    assert_eq!(
        declined.visit.as_ref().map(|v| v.value.state()),
        Some(VisitState::Canceled)
    );
    assert!(declined.events.iter().any(|e| matches!(e, DomainEvent::ConsentDeclined { .. })));
    assert!(declined.events.iter().any(|e| matches!(e, DomainEvent::VisitCanceled { .. })));

    let visit = clinic.get_visit(&visit_id).unwrap();
    assert_eq!(visit.value.state(), VisitState::Canceled);

    // Not stuck: the doctor can ask for a fresh visit
    let again = clinic.request_visit(&declined.case, Role::Doctor, true).unwrap();
    assert_eq!(again.case.value.state(), CaseState::VisitRequested);
    assert_ne!(again.case.value.visit_id(), Some(visit_id.as_str()));
    assert_eq!(again.case.value.consent(), ConsentState::NotRequired);

    // The old refusal does not block the new session
    let visit = again.visit.unwrap();
    let visit = clinic.accept_visit(&visit, Role::Doctor).unwrap().visit;
    let joined = clinic.join_visit(&visit, Role::Student).unwrap();
    assert_eq!(joined.visit.value.state(), VisitState::Active);
    let case = joined.case.expect("case follows the visit");
    assert_eq!(case.value.state(), CaseState::VisitActive);
}

#[test]
fn test_consent_granted_after_session_started() {
    let (clinic, _) = memory_clinic();
    let case = triaged_case(&clinic, "ضيق تنفس", high_vitals());
    let requested = clinic.request_visit(&case, Role::Student, false).unwrap();
    let flagged = clinic.require_consent(&requested.case, Role::Doctor).unwrap();

    let visit = requested.visit.unwrap();
    let visit = clinic.accept_visit(&visit, Role::Doctor).unwrap().visit;
    let joined = clinic.join_visit(&visit, Role::Student).unwrap();

    // Session runs, but the case waits for the guardian
    assert_eq!(joined.visit.value.state(), VisitState::Active);
    assert!(joined.case.is_none());
    let waiting = clinic.get_case(flagged.case.value.id()).unwrap();
    assert_eq!(waiting.value.state(), CaseState::VisitRequested);

    let granted = clinic.record_consent(&waiting, Role::Parent, true).unwrap();
    assert_eq!(granted.case.value.state(), CaseState::VisitActive);
    assert_eq!(granted.case.value.consent(), ConsentState::Granted);
    assert!(granted.events.iter().any(|e| matches!(e, DomainEvent::CaseVisitStarted { .. })));
}

#[test]
fn test_full_visit_to_referral() {
    let (clinic, clock) = memory_clinic();
    let case = triaged_case(&clinic, "ضيق تنفس", high_vitals());
    assert_eq!(case.value.current_triage().map(|t| t.score()), Some(70));

    let requested = clinic.request_visit(&case, Role::Student, false).unwrap();
    let visit = requested.visit.unwrap();

    let accepted = clinic.accept_visit(&visit, Role::Doctor).unwrap();
    assert!(matches!(
        accepted.events.as_slice(),
        [DomainEvent::VisitAccepted { .. }]
    ));

    clock.advance(Duration::minutes(2));
    let joined = clinic.join_visit(&accepted.visit, Role::Student).unwrap();
    let case_now = joined.case.expect("case follows the visit");
    assert_eq!(case_now.value.state(), CaseState::VisitActive);

    let visit = clinic.join_visit(&joined.visit, Role::Doctor).unwrap().visit;
    let visit = clinic
        .add_visit_note(&visit, Role::Doctor, "الطالب يحتاج تقييم في المستشفى")
        .unwrap()
        .visit;
    assert_eq!(visit.value.notes().len(), 1);

    // Cannot conclude while the session is still running
    let err = clinic
        .issue_slip(&case_now, Role::Doctor, SlipKind::Referral, 1, "")
        .unwrap_err();
    assert!(matches!(err, ClinicError::IllegalTransition { .. }));

    clock.advance(Duration::minutes(10));
    let ended = clinic.end_visit(&visit, Role::Doctor).unwrap();
    assert_eq!(ended.visit.value.state(), VisitState::Ended);

    let slip = clinic
        .issue_slip(&case_now, Role::Doctor, SlipKind::Referral, 1, "مستشفى الأطفال")
        .unwrap();
    assert_eq!(slip.case.value.state(), CaseState::Referred);
    assert_eq!(slip.slip.value.case_id, case_now.value.id());

    let actions: Vec<&str> = slip
        .case
        .value
        .history()
        .iter()
        .map(|e| e.action.as_str())
        .collect();
    assert_eq!(
        actions,
        vec!["open", "record_triage", "request_visit", "start_visit", "conclude"]
    );

    let stats = clinic.dashboard(Role::Admin).unwrap();
    assert_eq!(stats.total_cases, 1);
    assert_eq!(stats.high, 1);
    assert_eq!(stats.referred, 1);
    assert_eq!(stats.slips_issued, 1);
    assert_eq!(stats.active_visits, 0);

    let summary = clinic.case_summary(case_now.value.id(), Role::Student).unwrap();
    assert_eq!(summary.state, CaseState::Referred);
    assert_eq!(summary.slip, Some((SlipKind::Referral, 1)));
}

#[test]
fn test_idle_visit_expires() {
    let (clinic, clock) = memory_clinic();
    let case = triaged_case(&clinic, "ضيق تنفس", high_vitals());
    let visit = clinic
        .request_visit(&case, Role::Student, false)
        .unwrap()
        .visit
        .unwrap();
    let visit = clinic.accept_visit(&visit, Role::Doctor).unwrap().visit;
    clinic.join_visit(&visit, Role::Student).unwrap();

    clock.advance(Duration::minutes(29));
    assert!(clinic.expire_stale_visits().unwrap().is_empty());

    clock.advance(Duration::minutes(1));
    let events = clinic.expire_stale_visits().unwrap();
    assert!(matches!(
        events.as_slice(),
        [DomainEvent::VisitEnded { timed_out: true, .. }]
    ));

    // The doctor can now wrap up the case
    let case = clinic.get_case(case.value.id()).unwrap();
    assert_eq!(case.value.state(), CaseState::VisitActive);
    let done = clinic
        .conclude_case(&case, Role::Doctor, Disposition::Resolved)
        .unwrap();
    assert_eq!(done.case.value.state(), CaseState::Resolved);
}

#[test]
fn test_recheck_and_retriage() {
    let (clinic, clock) = memory_clinic();
    let case = triaged_case(&clinic, "كحة", RawVitals::new(80.0, 97.0, 37.0, 115.0, 75.0));
    let first = case.value.current_triage().cloned().unwrap();
    assert_eq!(first.band(), Band::Low);

    let reopened = clinic
        .request_recheck(&case, Role::Doctor, Some("قراءة ثانية".into()))
        .unwrap();
    assert_eq!(reopened.case.value.state(), CaseState::Open);
    assert!(reopened.case.value.current_triage().is_none());

    clock.advance(Duration::minutes(5));
    let reading = clinic
        .record_reading(&reopened.case, Role::Student, "ضيق تنفس", &high_vitals())
        .unwrap();
    assert_eq!(reading.case.value.state(), CaseState::Open);
    assert_eq!(reading.case.value.complaint_text(), "ضيق تنفس");
    assert!(reading.events.iter().any(|e| matches!(e, DomainEvent::ReadingRecorded { .. })));

    let retriaged = clinic.triage_case(&reading.case, Role::Doctor).unwrap();
    assert_eq!(retriaged.case.value.state(), CaseState::Triaged);
    assert_eq!(
        retriaged.case.value.current_triage().map(|t| t.band()),
        Some(Band::High)
    );
    assert_eq!(retriaged.case.value.triage_history(), &[first]);
}

#[test]
fn test_reading_needs_open_case() {
    let (clinic, _) = memory_clinic();
    let case = triaged_case(&clinic, "كحة", RawVitals::default());

    let err = clinic
        .record_reading(&case, Role::Student, "ضيق تنفس", &high_vitals())
        .unwrap_err();
    assert!(matches!(err, ClinicError::IllegalTransition { .. }));
    assert_eq!(clinic.get_case(case.value.id()).unwrap().version, case.version);
}

#[test]
fn test_only_admin_closes() {
    let (clinic, _) = memory_clinic();
    let case = triaged_case(&clinic, "كحة", RawVitals::default());

    let err = clinic.close_case(&case, Role::Doctor, "duplicate").unwrap_err();
    assert!(matches!(err, ClinicError::PermissionDenied { .. }));

    let closed = clinic.close_case(&case, Role::Admin, "duplicate").unwrap();
    assert_eq!(closed.case.value.state(), CaseState::Closed);
    assert_eq!(
        closed.case.value.history().last().and_then(|e| e.note.as_deref()),
        Some("duplicate")
    );
}

#[test]
fn test_parent_cannot_create_case() {
    let (clinic, _) = memory_clinic();
    let err = clinic
        .create_case(Role::Parent, "Sara", "كحة", &RawVitals::default())
        .unwrap_err();
    assert!(matches!(err, ClinicError::PermissionDenied { .. }));
    assert!(clinic.list_cases().unwrap().is_empty());
}

#[test]
fn test_audit_log_is_admin_only() {
    let (clinic, _) = memory_clinic();
    let case = triaged_case(&clinic, "ضيق تنفس", high_vitals());
    clinic.request_visit(&case, Role::Student, false).unwrap();

    let err = clinic.audit_log(Role::Doctor).unwrap_err();
    assert!(matches!(err, ClinicError::PermissionDenied { .. }));

    let trail = clinic.audit_log(Role::Admin).unwrap();
    let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["open", "record_triage", "request_visit"]);
    assert!(trail.iter().all(|e| e.case_id == case.value.id()));
}

/// Memory store that lets another writer touch one visit right before the
/// next batch lands.
struct VisitRacer {
    inner: Arc<MemoryStore>,
    visit_id: String,
    armed: AtomicBool,
}

impl VisitRacer {
    fn rewrite_visit(&self, at: DateTime<Utc>) -> StoreResult<u64> {
        let current = self
            .inner
            .load_raw("visit", &self.visit_id)?
            .ok_or_else(|| StoreError::Backend("visit vanished".into()))?;
        self.inner.store_raw(
            RawWrite {
                kind: "visit",
                id: self.visit_id.clone(),
                payload: current.payload,
                expected: current.version,
            },
            at,
        )
    }
}

impl Store for VisitRacer {
    fn load_raw(&self, kind: &'static str, id: &str) -> StoreResult<Option<RawRecord>> {
        self.inner.load_raw(kind, id)
    }

    fn store_all_raw(&self, writes: Vec<RawWrite>, at: DateTime<Utc>) -> StoreResult<Vec<u64>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.rewrite_visit(at)?;
        }
        self.inner.store_all_raw(writes, at)
    }

    fn list_raw(&self, kind: &'static str) -> StoreResult<Vec<RawRecord>> {
        self.inner.list_raw(kind)
    }
}

#[test]
fn test_lost_visit_race_leaves_case_untouched() {
    let clock = clock();
    let seed = Clinic::new(
        Arc::new(MemoryStore::new()),
        RolePermissions,
        clock.clone(),
        ClinicConfig::default(),
    );
    let case = triaged_case(&seed, "ضيق تنفس", high_vitals());
    let requested = seed.request_visit(&case, Role::Student, false).unwrap();
    let flagged = seed.require_consent(&requested.case, Role::Doctor).unwrap().case;
    let visit_id = requested.visit.unwrap().value.id().to_string();

    let racer = VisitRacer {
        inner: seed.store().clone(),
        visit_id: visit_id.clone(),
        armed: AtomicBool::new(true),
    };
    let clinic = Clinic::new(racer, RolePermissions, clock.clone(), ClinicConfig::default());

    // Decline cancels the visit, but another writer bumped it first
    let err = clinic.record_consent(&flagged, Role::Parent, false).unwrap_err();
    match err {
        ClinicError::StaleWrite { id, expected, actual } => {
            assert_eq!(id, visit_id);
            assert_eq!((expected, actual), (1, 2));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let stored_case = clinic.get_case(flagged.value.id()).unwrap();
    assert_eq!(stored_case.version, flagged.version);
    assert_eq!(stored_case.value.state(), CaseState::VisitRequested);
    assert_eq!(stored_case.value.consent(), ConsentState::Required);

    let stored_visit = clinic.get_visit(&visit_id).unwrap();
    assert_eq!(stored_visit.version, 2);
    assert_eq!(stored_visit.value.state(), VisitState::Requested);
}
