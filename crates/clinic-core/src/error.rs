//! Error taxonomy of the workflow layer.
//!
//! Triage functions are total and never produce these; only the state
//! machines and the store do.

use crate::models::{Permission, Role};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("illegal {entity} transition '{action}' from {state}: {reason}")]
    IllegalTransition {
        entity: &'static str,
        action: String,
        state: String,
        reason: String,
    },

    #[error("permission denied: {role} lacks '{permission}' for '{action}' (state {state})")]
    PermissionDenied {
        role: Role,
        permission: Permission,
        action: String,
        state: String,
    },

    #[error("stale write on {id}: expected version {expected}, stored version {actual}")]
    StaleWrite { id: String, expected: u64, actual: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type ClinicResult<T> = Result<T, ClinicError>;

impl From<StoreError> for ClinicError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Stale {
                id,
                expected,
                actual,
                ..
            } => ClinicError::StaleWrite {
                id,
                expected,
                actual,
            },
            StoreError::NotFound { kind, id } => ClinicError::NotFound(format!("{} {}", kind, id)),
            other => ClinicError::Storage(other.to_string()),
        }
    }
}

impl ClinicError {
    /// Short user-facing message for the calling UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            ClinicError::Validation(_) => "البيانات المدخلة غير صالحة",
            ClinicError::IllegalTransition { .. } => "الإجراء غير متاح في حالة الملف الحالية",
            ClinicError::PermissionDenied { .. } => "غير مسموح",
            ClinicError::StaleWrite { .. } => "تم تعديل الحالة من مكان آخر، أعد التحميل",
            ClinicError::NotFound(_) => "غير موجود",
            ClinicError::Storage(_) => "تعذر حفظ البيانات",
        }
    }
}
