//! Clinic Core Library
//!
//! School clinic intake: a triage decision engine plus the case and visit
//! state machines that consume its results.
//!
//! # Architecture
//!
//! ```text
//! Complaint text ──► ComplaintAnalyzer ──┐
//!                                        ├─► RiskScorer ─► TriageClassifier ─► RecommendationBuilder
//! Raw vitals ─────► VitalsNormalizer ────┘                                            │
//!                                                                               TriageResult
//!                                                                                     │
//!                                      ┌──────────────────────────────────────────────▼─┐
//!                                      │ CaseLifecycle ◄──► VisitLifecycle              │
//!                                      │   (PermissionGate, consent, data guards)       │
//!                                      └──────────────────────┬─────────────────────────┘
//!                                                             │
//!                                             Store::write_if_version (optimistic)
//!                                                             │
//!                                           ┌─────────────────┴─────────────────┐
//!                                           ▼                                   ▼
//!                                      MemoryStore                      Database (SQLite)
//! ```
//!
//! # Modules
//!
//! - [`models`]: Domain types (Case, Visit, TriageResult, Role, etc.)
//! - [`triage`]: Pure, total triage pipeline
//! - [`lifecycle`]: Case and visit state machines
//! - [`access`]: Role permission matrix
//! - [`store`]: Versioned storage contract and in-memory backend
//! - [`db`]: SQLite backend
//! - [`workflow`]: Read-modify-write operations over the store
//! - [`export`]: Dashboard statistics and case summaries
//! - [`config`]: Startup configuration

pub mod access;
pub mod clock;
pub mod config;
pub mod db;
pub mod export;
pub mod lifecycle;
pub mod models;
pub mod store;
pub mod triage;
pub mod workflow;

mod error;

pub use error::{ClinicError, ClinicResult};

// Re-export commonly used types
pub use access::{AllowAll, PermissionGate, RolePermissions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClinicConfig;
pub use db::Database;
pub use export::{AuditEntry, CaseSummary, DashboardStats};
pub use lifecycle::{
    CaseAction, CaseContext, CaseLifecycle, Disposition, DomainEvent, VisitAction, VisitContext,
    VisitLifecycle,
};
pub use models::{
    Band, Case, CaseState, ConsentState, DecisionCode, Permission, RawVitals, Role, Slip, SlipKind,
    SymptomFlag, TriageResult, Visit, VisitState, VitalsRecord,
};
pub use store::{MemoryStore, Store, StoreError, Versioned};
pub use triage::TriageEngine;
pub use workflow::{CaseOutcome, Clinic, SlipOutcome, VisitOutcome};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Mutex;
use std::sync::Arc;

use store::Entity;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum FfiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Illegal transition: {0}")]
    IllegalTransition(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Stale write: {0}")]
    StaleWrite(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<ClinicError> for FfiError {
    fn from(e: ClinicError) -> Self {
        let msg = e.to_string();
        match e {
            ClinicError::Validation(_) => FfiError::InvalidInput(msg),
            ClinicError::IllegalTransition { .. } => FfiError::IllegalTransition(msg),
            ClinicError::PermissionDenied { .. } => FfiError::PermissionDenied(msg),
            ClinicError::StaleWrite { .. } => FfiError::StaleWrite(msg),
            ClinicError::NotFound(_) => FfiError::NotFound(msg),
            ClinicError::Storage(_) => FfiError::StorageError(msg),
        }
    }
}

impl From<db::DbError> for FfiError {
    fn from(e: db::DbError) -> Self {
        FfiError::StorageError(e.to_string())
    }
}

impl From<serde_json::Error> for FfiError {
    fn from(e: serde_json::Error) -> Self {
        FfiError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for FfiError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        FfiError::StorageError(format!("Lock poisoned: {}", e))
    }
}

fn parse_role(role: &str) -> Result<Role, FfiError> {
    role.parse().map_err(FfiError::InvalidInput)
}

fn parse_slip_kind(kind: &str) -> Result<SlipKind, FfiError> {
    kind.parse().map_err(FfiError::InvalidInput)
}

fn parse_disposition(disposition: &str) -> Result<Disposition, FfiError> {
    disposition.parse().map_err(FfiError::InvalidInput)
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

type FfiClinic = Clinic<Database, RolePermissions, SystemClock>;

/// Open or create a clinic database at the given path.
#[uniffi::export]
pub fn open_clinic(path: String) -> Result<Arc<ClinicCore>, FfiError> {
    let config = ClinicConfig::new(
        config::DEFAULT_VISIT_TIMEOUT_MINUTES,
        Some(std::path::PathBuf::from(&path)),
    )?;
    let db = Database::open(&path)?;
    Ok(Arc::new(ClinicCore::new(db, config)))
}

/// Create an in-memory clinic (for testing and demos).
#[uniffi::export]
pub fn open_clinic_in_memory() -> Result<Arc<ClinicCore>, FfiError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ClinicCore::new(db, ClinicConfig::default())))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe clinic wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    clinic: Mutex<FfiClinic>,
}

impl ClinicCore {
    fn new(db: Database, config: ClinicConfig) -> Self {
        Self {
            clinic: Mutex::new(Clinic::new(db, RolePermissions, SystemClock, config)),
        }
    }

    /// Load an entity and check the caller's version against the stored one.
    fn snapshot<E: Entity>(
        clinic: &FfiClinic,
        id: &str,
        expected_version: u64,
    ) -> Result<Versioned<E>, FfiError> {
        let current: Versioned<E> = clinic.store().read(id).map_err(ClinicError::from)?;
        if current.version != expected_version {
            return Err(ClinicError::StaleWrite {
                id: id.to_string(),
                expected: expected_version,
                actual: current.version,
            }
            .into());
        }
        Ok(current)
    }
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Triage
    // =========================================================================

    /// Run the triage pipeline without creating a case.
    pub fn run_triage(&self, complaint: String, vitals: FfiVitals) -> Result<FfiTriageResult, FfiError> {
        let clinic = self.clinic.lock()?;
        let (_, result) = clinic.preview_triage(&complaint, &vitals.into());
        Ok(result.into())
    }

    // =========================================================================
    // Case Operations
    // =========================================================================

    /// Create a draft case.
    pub fn create_case(
        &self,
        role: String,
        subject: String,
        complaint: String,
        vitals: FfiVitals,
    ) -> Result<FfiCase, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = clinic.create_case(parse_role(&role)?, &subject, &complaint, &vitals.into())?;
        Ok(case.into())
    }

    /// Submit a draft case.
    pub fn open_case(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
    ) -> Result<FfiCaseOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.open_case(&case, parse_role(&role)?)?;
        outcome.try_into()
    }

    /// Triage a case from its recorded intake.
    pub fn triage_case(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
    ) -> Result<FfiCaseOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.triage_case(&case, parse_role(&role)?)?;
        outcome.try_into()
    }

    /// Request a virtual visit for a case.
    pub fn request_visit(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
        manual: bool,
    ) -> Result<FfiCaseOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.request_visit(&case, parse_role(&role)?, manual)?;
        outcome.try_into()
    }

    /// Send a triaged case back for a fresh reading.
    pub fn request_recheck(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
        reason: Option<String>,
    ) -> Result<FfiCaseOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.request_recheck(&case, parse_role(&role)?, reason)?;
        outcome.try_into()
    }

    /// Replace the intake of an open case.
    pub fn record_reading(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
        complaint: String,
        vitals: FfiVitals,
    ) -> Result<FfiCaseOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.record_reading(&case, parse_role(&role)?, &complaint, &vitals.into())?;
        outcome.try_into()
    }

    /// Flag that a parent has to consent before the visit starts.
    pub fn require_consent(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
    ) -> Result<FfiCaseOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.require_consent(&case, parse_role(&role)?)?;
        outcome.try_into()
    }

    /// Record the parent's consent answer.
    pub fn record_consent(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
        granted: bool,
    ) -> Result<FfiCaseOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.record_consent(&case, parse_role(&role)?, granted)?;
        outcome.try_into()
    }

    /// Issue a `REST` or `REFERRAL` slip, concluding the case.
    pub fn issue_slip(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
        kind: String,
        days: u32,
        notes: String,
    ) -> Result<FfiSlipOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.issue_slip(&case, parse_role(&role)?, parse_slip_kind(&kind)?, days, &notes)?;
        outcome.try_into()
    }

    /// Conclude a case as `RESOLVED` or `REFERRED` without a slip.
    pub fn conclude_case(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
        disposition: String,
    ) -> Result<FfiCaseOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.conclude_case(&case, parse_role(&role)?, parse_disposition(&disposition)?)?;
        outcome.try_into()
    }

    /// Administrative close.
    pub fn close_case(
        &self,
        role: String,
        case_id: String,
        expected_version: u64,
        reason: String,
    ) -> Result<FfiCaseOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let case = Self::snapshot(&clinic, &case_id, expected_version)?;
        let outcome = clinic.close_case(&case, parse_role(&role)?, &reason)?;
        outcome.try_into()
    }

    /// Get a case by ID.
    pub fn get_case(&self, case_id: String) -> Result<Option<FfiCase>, FfiError> {
        let clinic = self.clinic.lock()?;
        match clinic.get_case(&case_id) {
            Ok(case) => Ok(Some(case.into())),
            Err(ClinicError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Visit Operations
    // =========================================================================

    /// Get a visit by ID.
    pub fn get_visit(&self, visit_id: String) -> Result<Option<FfiVisit>, FfiError> {
        let clinic = self.clinic.lock()?;
        match clinic.get_visit(&visit_id) {
            Ok(visit) => Ok(Some(visit.into())),
            Err(ClinicError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn accept_visit(
        &self,
        role: String,
        visit_id: String,
        expected_version: u64,
    ) -> Result<FfiVisitOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let visit = Self::snapshot(&clinic, &visit_id, expected_version)?;
        let outcome = clinic.accept_visit(&visit, parse_role(&role)?)?;
        outcome.try_into()
    }

    pub fn reject_visit(
        &self,
        role: String,
        visit_id: String,
        expected_version: u64,
        reason: Option<String>,
    ) -> Result<FfiVisitOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let visit = Self::snapshot(&clinic, &visit_id, expected_version)?;
        let outcome = clinic.reject_visit(&visit, parse_role(&role)?, reason)?;
        outcome.try_into()
    }

    /// Join the session; the first join after acceptance starts it.
    pub fn join_visit(
        &self,
        role: String,
        visit_id: String,
        expected_version: u64,
    ) -> Result<FfiVisitOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let visit = Self::snapshot(&clinic, &visit_id, expected_version)?;
        let outcome = clinic.join_visit(&visit, parse_role(&role)?)?;
        outcome.try_into()
    }

    pub fn invite_parent(
        &self,
        role: String,
        visit_id: String,
        expected_version: u64,
    ) -> Result<FfiVisitOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let visit = Self::snapshot(&clinic, &visit_id, expected_version)?;
        let outcome = clinic.invite_parent(&visit, parse_role(&role)?)?;
        outcome.try_into()
    }

    pub fn add_visit_note(
        &self,
        role: String,
        visit_id: String,
        expected_version: u64,
        text: String,
    ) -> Result<FfiVisitOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let visit = Self::snapshot(&clinic, &visit_id, expected_version)?;
        let outcome = clinic.add_visit_note(&visit, parse_role(&role)?, &text)?;
        outcome.try_into()
    }

    pub fn end_visit(
        &self,
        role: String,
        visit_id: String,
        expected_version: u64,
    ) -> Result<FfiVisitOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let visit = Self::snapshot(&clinic, &visit_id, expected_version)?;
        let outcome = clinic.end_visit(&visit, parse_role(&role)?)?;
        outcome.try_into()
    }

    pub fn cancel_visit(
        &self,
        role: String,
        visit_id: String,
        expected_version: u64,
        reason: Option<String>,
    ) -> Result<FfiVisitOutcome, FfiError> {
        let clinic = self.clinic.lock()?;
        let visit = Self::snapshot(&clinic, &visit_id, expected_version)?;
        let outcome = clinic.cancel_visit(&visit, parse_role(&role)?, reason)?;
        outcome.try_into()
    }

    /// End idle sessions; returns the emitted events as a JSON array.
    pub fn expire_stale_visits(&self) -> Result<String, FfiError> {
        let clinic = self.clinic.lock()?;
        let events = clinic.expire_stale_visits()?;
        Ok(serde_json::to_string(&events)?)
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Admin dashboard statistics as JSON.
    pub fn dashboard_json(&self, role: String) -> Result<String, FfiError> {
        let clinic = self.clinic.lock()?;
        let stats = clinic.dashboard(parse_role(&role)?)?;
        Ok(stats.to_json()?)
    }

    /// Portal summary of one case as JSON.
    pub fn case_summary_json(&self, role: String, case_id: String) -> Result<String, FfiError> {
        let clinic = self.clinic.lock()?;
        let summary = clinic.case_summary(&case_id, parse_role(&role)?)?;
        Ok(summary.to_json()?)
    }

    /// Every case transition, oldest first, as JSON.
    pub fn audit_log_json(&self, role: String) -> Result<String, FfiError> {
        let clinic = self.clinic.lock()?;
        let entries = clinic.audit_log(parse_role(&role)?)?;
        Ok(serde_json::to_string(&entries)?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe raw vitals.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiVitals {
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    pub temperature_c: Option<f64>,
    pub blood_pressure_systolic: Option<f64>,
    pub blood_pressure_diastolic: Option<f64>,
    pub respiratory_rate: Option<f64>,
}

impl From<FfiVitals> for RawVitals {
    fn from(v: FfiVitals) -> Self {
        RawVitals {
            heart_rate: v.heart_rate,
            spo2: v.spo2,
            temperature_c: v.temperature_c,
            blood_pressure_systolic: v.blood_pressure_systolic,
            blood_pressure_diastolic: v.blood_pressure_diastolic,
            respiratory_rate: v.respiratory_rate,
        }
    }
}

/// FFI-safe triage result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTriageResult {
    pub score: u8,
    pub band: String,
    pub band_label: String,
    pub decision_code: String,
    pub recommendation: Vec<String>,
    pub red_flags: Vec<String>,
    pub flags: Vec<String>,
    pub produced_at: String,
}

impl From<TriageResult> for FfiTriageResult {
    fn from(r: TriageResult) -> Self {
        Self {
            score: r.score(),
            band: r.band().as_str().to_string(),
            band_label: r.band().label().to_string(),
            decision_code: r.decision_code().as_str().to_string(),
            recommendation: r.recommendation().to_vec(),
            red_flags: r.red_flags().to_vec(),
            flags: r.flags().iter().map(|f| f.as_str().to_string()).collect(),
            produced_at: r.produced_at().to_rfc3339(),
        }
    }
}

/// FFI-safe case.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCase {
    pub id: String,
    pub version: u64,
    pub subject: String,
    pub complaint_text: String,
    pub state: String,
    pub consent: String,
    pub visit_id: Option<String>,
    pub current_triage: Option<FfiTriageResult>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Versioned<Case>> for FfiCase {
    fn from(v: Versioned<Case>) -> Self {
        let case = v.value;
        Self {
            id: case.id().to_string(),
            version: v.version,
            subject: case.subject().to_string(),
            complaint_text: case.complaint_text().to_string(),
            state: case.state().as_str().to_string(),
            consent: case.consent().as_str().to_string(),
            visit_id: case.visit_id().map(str::to_string),
            current_triage: case.current_triage().cloned().map(Into::into),
            created_at: case.created_at().to_rfc3339(),
            updated_at: v.updated_at.to_rfc3339(),
        }
    }
}

/// FFI-safe result of a case operation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCaseOutcome {
    pub case: FfiCase,
    pub visit_id: Option<String>,
    pub room_code: Option<String>,
    /// Domain events as a JSON array
    pub events_json: String,
}

impl TryFrom<CaseOutcome> for FfiCaseOutcome {
    type Error = FfiError;

    fn try_from(outcome: CaseOutcome) -> Result<Self, Self::Error> {
        Ok(Self {
            events_json: serde_json::to_string(&outcome.events)?,
            visit_id: outcome.visit.as_ref().map(|v| v.value.id().to_string()),
            room_code: outcome.visit.as_ref().map(|v| v.value.room_code().to_string()),
            case: outcome.case.into(),
        })
    }
}

/// FFI-safe note added during a visit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitNote {
    pub at: String,
    pub role: String,
    pub text: String,
}

/// FFI-safe visit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub id: String,
    pub version: u64,
    pub case_id: String,
    pub state: String,
    pub room_code: String,
    pub allow_parent_join: bool,
    pub student_joined: bool,
    pub doctor_joined: bool,
    pub parent_joined: bool,
    /// Newest first
    pub notes: Vec<FfiVisitNote>,
    pub reject_reason: Option<String>,
    pub last_activity_at: String,
    pub updated_at: String,
}

impl From<Versioned<Visit>> for FfiVisit {
    fn from(v: Versioned<Visit>) -> Self {
        let visit = v.value;
        let joined = visit.participants();
        Self {
            id: visit.id().to_string(),
            version: v.version,
            case_id: visit.case_id().to_string(),
            state: visit.state().as_str().to_string(),
            room_code: visit.room_code().to_string(),
            allow_parent_join: visit.allow_parent_join(),
            student_joined: joined.student_joined,
            doctor_joined: joined.doctor_joined,
            parent_joined: joined.parent_joined,
            notes: visit
                .notes()
                .iter()
                .map(|n| FfiVisitNote {
                    at: n.at.to_rfc3339(),
                    role: n.role.to_string(),
                    text: n.text.clone(),
                })
                .collect(),
            reject_reason: visit.reject_reason().map(str::to_string),
            last_activity_at: visit.last_activity_at().to_rfc3339(),
            updated_at: v.updated_at.to_rfc3339(),
        }
    }
}

/// FFI-safe result of a visit operation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitOutcome {
    pub visit: FfiVisit,
    /// Set when the linked case moved in the same commit
    pub case: Option<FfiCase>,
    pub events_json: String,
}

impl TryFrom<VisitOutcome> for FfiVisitOutcome {
    type Error = FfiError;

    fn try_from(outcome: VisitOutcome) -> Result<Self, Self::Error> {
        Ok(Self {
            events_json: serde_json::to_string(&outcome.events)?,
            visit: outcome.visit.into(),
            case: outcome.case.map(Into::into),
        })
    }
}

/// FFI-safe result of issuing a slip.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSlipOutcome {
    pub slip_id: String,
    pub kind: String,
    pub days: u32,
    pub notes: String,
    pub issued_at: String,
    pub case: FfiCase,
    pub events_json: String,
}

impl TryFrom<SlipOutcome> for FfiSlipOutcome {
    type Error = FfiError;

    fn try_from(outcome: SlipOutcome) -> Result<Self, Self::Error> {
        let slip = outcome.slip.value;
        Ok(Self {
            events_json: serde_json::to_string(&outcome.events)?,
            slip_id: slip.id,
            kind: slip.kind.as_str().to_string(),
            days: slip.days,
            notes: slip.notes,
            issued_at: slip.issued_at.to_rfc3339(),
            case: outcome.case.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vitals(hr: f64, spo2: f64, temp: f64) -> FfiVitals {
        FfiVitals {
            heart_rate: Some(hr),
            spo2: Some(spo2),
            temperature_c: Some(temp),
            blood_pressure_systolic: Some(120.0),
            blood_pressure_diastolic: Some(80.0),
            respiratory_rate: None,
        }
    }

    #[test]
    fn test_ffi_run_triage() {
        let core = open_clinic_in_memory().unwrap();
        let result = core
            .run_triage("ضيق تنفس".into(), vitals(128.0, 94.0, 38.9))
            .unwrap();
        assert_eq!(result.score, 70);
        assert_eq!(result.band, "HIGH");
        assert_eq!(result.flags, vec!["Respiratory".to_string()]);
    }

    #[test]
    fn test_ffi_case_flow() {
        let core = open_clinic_in_memory().unwrap();
        let case = core
            .create_case("student".into(), "Sara".into(), "ضيق تنفس".into(), vitals(150.0, 89.0, 39.8))
            .unwrap();
        assert_eq!(case.state, "DRAFT");
        assert_eq!(case.version, 1);

        let opened = core.open_case("student".into(), case.id.clone(), 1).unwrap();
        assert_eq!(opened.case.state, "OPEN");

        let triaged = core.triage_case("student".into(), case.id.clone(), 2).unwrap();
        assert_eq!(triaged.case.state, "TRIAGED");
        assert!(triaged.events_json.contains("case_triaged"));

        let visit = core
            .request_visit("student".into(), case.id.clone(), 3, false)
            .unwrap();
        assert_eq!(visit.case.state, "VISIT_REQUESTED");
        assert!(visit.visit_id.is_some());
        assert_eq!(visit.room_code.map(|c| c.len()), Some(6));
    }

    #[test]
    fn test_ffi_stale_version() {
        let core = open_clinic_in_memory().unwrap();
        let case = core
            .create_case("student".into(), "Sara".into(), "كحة".into(), FfiVitals::default())
            .unwrap();
        core.open_case("student".into(), case.id.clone(), 1).unwrap();

        let err = core.open_case("student".into(), case.id.clone(), 1).unwrap_err();
        assert!(matches!(err, FfiError::StaleWrite(_)));
    }

    #[test]
    fn test_ffi_errors() {
        let core = open_clinic_in_memory().unwrap();
        assert!(core.get_case("missing".into()).unwrap().is_none());
        assert!(matches!(
            core.dashboard_json("student".into()),
            Err(FfiError::PermissionDenied(_))
        ));
        assert!(matches!(
            core.dashboard_json("janitor".into()),
            Err(FfiError::InvalidInput(_))
        ));
        assert!(core.dashboard_json("admin".into()).unwrap().contains("totalCases"));
    }

    fn referred_case(core: &ClinicCore) -> FfiCaseOutcome {
        let case = core
            .create_case("student".into(), "Omar".into(), "ضيق تنفس".into(), vitals(150.0, 89.0, 39.8))
            .unwrap();
        core.open_case("student".into(), case.id.clone(), 1).unwrap();
        core.triage_case("student".into(), case.id.clone(), 2).unwrap();
        core.request_visit("student".into(), case.id, 3, false).unwrap()
    }

    #[test]
    fn test_ffi_visit_to_referral() {
        let core = open_clinic_in_memory().unwrap();
        let requested = referred_case(&core);
        let case_id = requested.case.id.clone();
        let visit_id = requested.visit_id.unwrap();

        let visit = core.get_visit(visit_id.clone()).unwrap().unwrap();
        assert_eq!(visit.state, "REQUESTED");
        assert_eq!(visit.case_id, case_id);

        let accepted = core.accept_visit("doctor".into(), visit_id.clone(), visit.version).unwrap();
        assert_eq!(accepted.visit.state, "ACCEPTED");
        assert!(accepted.case.is_none());

        let joined = core
            .join_visit("student".into(), visit_id.clone(), accepted.visit.version)
            .unwrap();
        assert_eq!(joined.visit.state, "ACTIVE");
        assert!(joined.visit.student_joined);
        let case = joined.case.unwrap();
        assert_eq!(case.state, "VISIT_ACTIVE");

        let doctor = core
            .join_visit("doctor".into(), visit_id.clone(), joined.visit.version)
            .unwrap();
        assert!(doctor.case.is_none());

        let noted = core
            .add_visit_note("doctor".into(), visit_id.clone(), doctor.visit.version, "تحويل للطوارئ".into())
            .unwrap();
        assert_eq!(noted.visit.notes[0].role, "doctor");

        let ended = core.end_visit("doctor".into(), visit_id, noted.visit.version).unwrap();
        assert_eq!(ended.visit.state, "ENDED");

        let slip = core
            .issue_slip("doctor".into(), case_id.clone(), case.version, "referral".into(), 0, "".into())
            .unwrap();
        assert_eq!(slip.kind, "REFERRAL");
        assert_eq!(slip.days, 1);
        assert_eq!(slip.case.state, "REFERRED");

        let summary = core.case_summary_json("student".into(), case_id).unwrap();
        assert!(summary.contains("REFERRAL"));

        let audit = core.audit_log_json("admin".into()).unwrap();
        assert!(audit.contains("record_triage"));
        assert!(matches!(
            core.audit_log_json("doctor".into()),
            Err(FfiError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_ffi_stale_visit_version() {
        let core = open_clinic_in_memory().unwrap();
        let visit_id = referred_case(&core).visit_id.unwrap();
        let visit = core.get_visit(visit_id.clone()).unwrap().unwrap();
        core.accept_visit("doctor".into(), visit_id.clone(), visit.version).unwrap();

        let err = core
            .reject_visit("doctor".into(), visit_id.clone(), visit.version, None)
            .unwrap_err();
        assert!(matches!(err, FfiError::StaleWrite(_)));
        assert_eq!(core.get_visit(visit_id).unwrap().unwrap().state, "ACCEPTED");
    }

    #[test]
    fn test_ffi_recheck_and_reading() {
        let core = open_clinic_in_memory().unwrap();
        let case = core
            .create_case("student".into(), "Sara".into(), "كحة".into(), vitals(80.0, 97.0, 37.0))
            .unwrap();
        core.open_case("student".into(), case.id.clone(), 1).unwrap();
        let first = core.triage_case("student".into(), case.id.clone(), 2).unwrap();
        assert_eq!(first.case.current_triage.unwrap().band, "LOW");

        let reopened = core
            .request_recheck("doctor".into(), case.id.clone(), 3, Some("worse".into()))
            .unwrap();
        assert_eq!(reopened.case.state, "OPEN");

        let read = core
            .record_reading("student".into(), case.id.clone(), 4, "ضيق تنفس".into(), vitals(128.0, 94.0, 38.9))
            .unwrap();
        assert!(read.events_json.contains("reading_recorded"));

        let second = core.triage_case("student".into(), case.id, 5).unwrap();
        assert_eq!(second.case.current_triage.unwrap().band, "HIGH");
    }

    #[test]
    fn test_ffi_bad_enum_input() {
        let core = open_clinic_in_memory().unwrap();
        let case = referred_case(&core).case;
        assert!(matches!(
            core.issue_slip("doctor".into(), case.id.clone(), case.version, "sick".into(), 2, "".into()),
            Err(FfiError::InvalidInput(_))
        ));
        assert!(matches!(
            core.conclude_case("doctor".into(), case.id, case.version, "cured".into()),
            Err(FfiError::InvalidInput(_))
        ));
        assert_eq!(core.expire_stale_visits().unwrap(), "[]");
    }
}
