//! Actor roles and the capabilities they may be granted.

use serde::{Deserialize, Serialize};

/// Portal role of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Doctor,
    Parent,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Student, Role::Doctor, Role::Parent, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Doctor => "doctor",
            Role::Parent => "parent",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// A capability checked through [`crate::access::PermissionGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    CaseCreate,
    CaseViewAll,
    CaseRequestRecheck,
    CaseConclude,
    CaseClose,
    TriageRun,
    VisitRequest,
    VisitAccept,
    VisitReject,
    VisitJoin,
    VisitInviteParent,
    VisitEnd,
    VisitCancel,
    ConsentRequest,
    ConsentManage,
    SlipIssue,
    DashView,
    AuditView,
    ReportViewSelf,
    ReportViewChild,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::CaseCreate => "case.create",
            Permission::CaseViewAll => "case.viewAll",
            Permission::CaseRequestRecheck => "case.requestRecheck",
            Permission::CaseConclude => "case.conclude",
            Permission::CaseClose => "case.close",
            Permission::TriageRun => "triage.run",
            Permission::VisitRequest => "visit.request",
            Permission::VisitAccept => "visit.accept",
            Permission::VisitReject => "visit.reject",
            Permission::VisitJoin => "visit.join",
            Permission::VisitInviteParent => "visit.inviteParent",
            Permission::VisitEnd => "visit.end",
            Permission::VisitCancel => "visit.cancel",
            Permission::ConsentRequest => "consent.request",
            Permission::ConsentManage => "consent.manage",
            Permission::SlipIssue => "slip.issue",
            Permission::DashView => "dash.view",
            Permission::AuditView => "audit.view",
            Permission::ReportViewSelf => "report.viewSelf",
            Permission::ReportViewChild => "report.viewChild",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
