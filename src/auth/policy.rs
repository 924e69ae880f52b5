use crate::users::repo::Role;

/// Identity-scoped operations gated at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    View,
    Update,
    Delete,
    ListAll,
    ListDeleted,
    Restore,
    CreateAdmin,
}

impl Operation {
    /// Operations with no self-service case.
    fn admin_only(self) -> bool {
        matches!(
            self,
            Operation::ListAll | Operation::ListDeleted | Operation::Restore | Operation::CreateAdmin
        )
    }
}

/// Self-or-admin access predicate. Pure; the boundary calls it before every
/// identity-scoped service invocation.
pub fn permit(requester_id: i64, requester_role: Role, target: Option<i64>, op: Operation) -> bool {
    if requester_role.is_admin() {
        return true;
    }
    if op.admin_only() {
        return false;
    }
    matches!(target, Some(id) if id == requester_id)
}
