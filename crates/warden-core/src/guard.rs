//! Super-admin invariant rules
//!
//! The administrator pool must always keep at least one active super admin.
//! These functions only decide; stores call them while holding whatever lock
//! or transaction makes the count and the following mutation atomic.

use thiserror::Error;

use crate::{Admin, AdminChanges, AdminRole};

/// Why a guarded admin mutation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuardViolation {
    #[error("At least one active super admin is required")]
    LastSuperAdmin,

    #[error("Cannot delete your own account")]
    SelfDeletion,
}

/// Check a role change.
///
/// `other_active_super_admins` counts active super admins excluding `admin`.
pub fn check_role_change(
    admin: &Admin,
    new_role: AdminRole,
    other_active_super_admins: u64,
) -> Result<(), GuardViolation> {
    let demotes = admin.role == AdminRole::SuperAdmin && new_role != AdminRole::SuperAdmin;
    if demotes && other_active_super_admins == 0 {
        return Err(GuardViolation::LastSuperAdmin);
    }
    Ok(())
}

/// Check an activation flag change.
///
/// Deactivating an active super admin removes it from the counted pool
/// exactly like a demotion does.
pub fn check_deactivation(
    admin: &Admin,
    new_active: bool,
    other_active_super_admins: u64,
) -> Result<(), GuardViolation> {
    if admin.is_active_super_admin() && !new_active && other_active_super_admins == 0 {
        return Err(GuardViolation::LastSuperAdmin);
    }
    Ok(())
}

/// Check every guarded field of a partial update
pub fn check_update(
    admin: &Admin,
    changes: &AdminChanges,
    other_active_super_admins: u64,
) -> Result<(), GuardViolation> {
    if let Some(role) = changes.role {
        check_role_change(admin, role, other_active_super_admins)?;
    }
    if let Some(active) = changes.is_active {
        check_deactivation(admin, active, other_active_super_admins)?;
    }
    Ok(())
}

/// Check a deletion requested by `requester_id`
pub fn check_delete(
    admin: &Admin,
    requester_id: i64,
    other_active_super_admins: u64,
) -> Result<(), GuardViolation> {
    if admin.id == requester_id {
        return Err(GuardViolation::SelfDeletion);
    }
    if admin.role == AdminRole::SuperAdmin && other_active_super_admins == 0 {
        return Err(GuardViolation::LastSuperAdmin);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn admin(id: i64, role: AdminRole, is_active: bool) -> Admin {
        Admin {
            id,
            email: format!("admin{id}@example.com"),
            username: format!("admin{id}"),
            password_hash: String::new(),
            role,
            is_active,
            enable_2fa: false,
            auth_profile_id: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_last_super_admin_cannot_be_demoted() {
        let root = admin(1, AdminRole::SuperAdmin, true);
        assert_eq!(
            check_role_change(&root, AdminRole::Admin, 0),
            Err(GuardViolation::LastSuperAdmin)
        );
        assert_eq!(check_role_change(&root, AdminRole::Admin, 1), Ok(()));
        assert_eq!(check_role_change(&root, AdminRole::SuperAdmin, 0), Ok(()));
    }

    #[test]
    fn test_promotion_and_plain_admin_changes_pass() {
        let plain = admin(2, AdminRole::Admin, true);
        assert_eq!(check_role_change(&plain, AdminRole::SuperAdmin, 0), Ok(()));
        assert_eq!(check_role_change(&plain, AdminRole::Admin, 0), Ok(()));
    }

    #[test]
    fn test_last_super_admin_cannot_be_deactivated() {
        let root = admin(1, AdminRole::SuperAdmin, true);
        assert_eq!(
            check_deactivation(&root, false, 0),
            Err(GuardViolation::LastSuperAdmin)
        );
        assert_eq!(check_deactivation(&root, false, 1), Ok(()));

        // Already inactive super admins are not counted, so toggling them is free
        let dormant = admin(3, AdminRole::SuperAdmin, false);
        assert_eq!(check_deactivation(&dormant, false, 0), Ok(()));
    }

    #[test]
    fn test_inactive_super_admin_demotion_still_guarded_by_count() {
        // An inactive super admin being demoted while no active one exists
        // elsewhere is refused; the rule is evaluated on role alone.
        let dormant = admin(3, AdminRole::SuperAdmin, false);
        assert_eq!(
            check_role_change(&dormant, AdminRole::Admin, 0),
            Err(GuardViolation::LastSuperAdmin)
        );
    }

    #[test]
    fn test_update_checks_every_guarded_field() {
        let root = admin(1, AdminRole::SuperAdmin, true);
        let rename_only = AdminChanges {
            username: Some("renamed".to_string()),
            ..Default::default()
        };
        assert_eq!(check_update(&root, &rename_only, 0), Ok(()));

        let deactivate = AdminChanges {
            is_active: Some(false),
            ..Default::default()
        };
        assert_eq!(
            check_update(&root, &deactivate, 0),
            Err(GuardViolation::LastSuperAdmin)
        );
    }

    #[test]
    fn test_self_deletion_refused_regardless_of_role() {
        let plain = admin(5, AdminRole::Admin, true);
        assert_eq!(check_delete(&plain, 5, 3), Err(GuardViolation::SelfDeletion));

        let root = admin(1, AdminRole::SuperAdmin, true);
        assert_eq!(check_delete(&root, 1, 3), Err(GuardViolation::SelfDeletion));
    }

    #[test]
    fn test_last_super_admin_cannot_be_deleted() {
        let root = admin(1, AdminRole::SuperAdmin, true);
        assert_eq!(check_delete(&root, 2, 0), Err(GuardViolation::LastSuperAdmin));
        assert_eq!(check_delete(&root, 2, 1), Ok(()));

        let plain = admin(4, AdminRole::Admin, true);
        assert_eq!(check_delete(&plain, 1, 0), Ok(()));
    }
}
