//! Permission checks consumed by the lifecycles.
//!
//! The lifecycles call [`PermissionGate::can`] before every guarded
//! transition and treat `false` as a hard stop.

use crate::models::{Permission, Role};

/// Pure capability check. No side effects.
pub trait PermissionGate {
    fn can(&self, role: Role, permission: Permission) -> bool;
}

impl<G: PermissionGate + ?Sized> PermissionGate for &G {
    fn can(&self, role: Role, permission: Permission) -> bool {
        (**self).can(role, permission)
    }
}

impl<G: PermissionGate + ?Sized> PermissionGate for std::sync::Arc<G> {
    fn can(&self, role: Role, permission: Permission) -> bool {
        (**self).can(role, permission)
    }
}

/// Default role → permission matrix of the clinic portals.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePermissions;

impl RolePermissions {
    pub fn permissions(role: Role) -> &'static [Permission] {
        match role {
            Role::Student => &[
                Permission::CaseCreate,
                Permission::TriageRun,
                Permission::VisitRequest,
                Permission::VisitJoin,
                Permission::VisitCancel,
                Permission::ReportViewSelf,
            ],
            Role::Doctor => &[
                Permission::CaseViewAll,
                Permission::CaseRequestRecheck,
                Permission::CaseConclude,
                Permission::TriageRun,
                Permission::VisitRequest,
                Permission::VisitAccept,
                Permission::VisitReject,
                Permission::VisitJoin,
                Permission::VisitInviteParent,
                Permission::VisitEnd,
                Permission::VisitCancel,
                Permission::ConsentRequest,
                Permission::SlipIssue,
            ],
            Role::Admin => &[
                Permission::DashView,
                Permission::CaseViewAll,
                Permission::CaseClose,
                Permission::AuditView,
            ],
            Role::Parent => &[
                Permission::ConsentManage,
                Permission::VisitJoin,
                Permission::ReportViewChild,
            ],
        }
    }
}

impl PermissionGate for RolePermissions {
    fn can(&self, role: Role, permission: Permission) -> bool {
        Self::permissions(role).contains(&permission)
    }
}

/// Gate that allows everything. Useful to exercise the transition table
/// on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn can(&self, _role: Role, _permission: Permission) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix() {
        let gate = RolePermissions;
        assert!(gate.can(Role::Student, Permission::CaseCreate));
        assert!(!gate.can(Role::Student, Permission::VisitAccept));
        assert!(gate.can(Role::Doctor, Permission::VisitAccept));
        assert!(gate.can(Role::Parent, Permission::ConsentManage));
        assert!(!gate.can(Role::Doctor, Permission::ConsentManage));
        assert!(gate.can(Role::Admin, Permission::CaseClose));
        assert!(!gate.can(Role::Doctor, Permission::CaseClose));
    }

    #[test]
    fn test_only_admin_may_close() {
        let closers: Vec<_> = Role::ALL
            .into_iter()
            .filter(|r| RolePermissions.can(*r, Permission::CaseClose))
            .collect();
        assert_eq!(closers, vec![Role::Admin]);
    }
}
