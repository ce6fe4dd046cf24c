use crate::{
    check::{Injection, PermissionChecker},
    error::AccessError,
    models::*,
    schema::Schema,
    visibility::{visibility_for, RowFilter},
};
use std::sync::Arc;
use tracing::debug;

/// Core authorization engine
///
/// Evaluation chain for [`authorize`](Self::authorize): admins are allowed
/// everything, otherwise the rule table decides, otherwise deny.
#[derive(Debug, Clone, Default)]
pub struct AccessControlEngine {
    /// Static rule table
    schema: Arc<Schema>,

    /// Object capability checks and ownership injection
    checker: Arc<PermissionChecker>,
}

impl AccessControlEngine {
    pub fn new() -> Self {
        Self {
            schema: Arc::new(Schema::new()),
            checker: Arc::new(PermissionChecker::new()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // =============================================================================
    // Role checks
    // =============================================================================

    /// Decide whether a principal may attempt an action on a resource kind
    pub fn authorize(&self, principal: &Principal, action: Action, kind: ResourceKind) -> Decision {
        if principal.is_admin() {
            return Decision::Allow;
        }

        self.schema
            .rule_for(kind, action.class())
            .map(|rule| rule.permits(principal.role))
            .unwrap_or(false)
            .into()
    }

    /// [`authorize`](Self::authorize), failing with [`AccessError::Forbidden`] on deny
    pub fn require(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> Result<(), AccessError> {
        match self.authorize(principal, action, kind) {
            Decision::Allow => Ok(()),
            Decision::Deny => {
                debug!(
                    user_id = principal.user_id,
                    role = %principal.role,
                    action = %action,
                    resource = %kind,
                    "Authorization denied by rule table"
                );
                Err(AccessError::Forbidden)
            }
        }
    }

    // =============================================================================
    // Object checks
    // =============================================================================

    pub fn check_object(&self, principal: &Principal, action: Action, target: &Snapshot) -> bool {
        self.checker.check_object(principal, action, target)
    }

    /// [`check_object`](Self::check_object), failing with [`AccessError::Forbidden`]
    pub fn require_object(
        &self,
        principal: &Principal,
        action: Action,
        target: &Snapshot,
    ) -> Result<(), AccessError> {
        if self.check_object(principal, action, target) {
            return Ok(());
        }

        debug!(
            user_id = principal.user_id,
            role = %principal.role,
            action = %action,
            resource = %target.kind(),
            "Authorization denied by object check"
        );
        Err(AccessError::Forbidden)
    }

    pub fn injection(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> Result<Injection, AccessError> {
        self.checker.injection(principal, action, kind)
    }

    // =============================================================================
    // Visibility
    // =============================================================================

    pub fn visibility(&self, principal: &Principal, kind: ResourceKind) -> RowFilter {
        visibility_for(principal, kind)
    }

    /// Resolve the profile a `me` request operates on.
    ///
    /// Denied roles get [`AccessError::Forbidden`]; allowed callers without a
    /// profile of the right kind (admins included) get
    /// [`AccessError::ProfileNotFound`].
    pub fn self_profile(
        &self,
        principal: &Principal,
        kind: ResourceKind,
    ) -> Result<ProfileId, AccessError> {
        self.require(principal, Action::Me, kind)?;

        let profile_kind = kind.self_service_kind().ok_or(AccessError::Forbidden)?;
        principal
            .profile(profile_kind)
            .ok_or(AccessError::ProfileNotFound(profile_kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_allowed_everything() {
        let engine = AccessControlEngine::new();
        let admin = Principal::admin(1);
        for kind in ResourceKind::ALL {
            for action in Action::ALL {
                assert_eq!(engine.authorize(&admin, action, kind), Decision::Allow);
            }
        }
    }

    #[test]
    fn test_me_for_students_and_teachers() {
        let engine = AccessControlEngine::new();

        let student = Principal::student(1, Some(10));
        assert_eq!(engine.self_profile(&student, ResourceKind::StudentProfile), Ok(10));
        assert_eq!(
            engine.self_profile(&student, ResourceKind::TeacherProfile),
            Err(AccessError::Forbidden)
        );

        let teacher = Principal::teacher(2, None);
        assert_eq!(
            engine.self_profile(&teacher, ResourceKind::TeacherProfile),
            Err(AccessError::ProfileNotFound(ProfileKind::Teacher))
        );

        assert_eq!(
            engine.self_profile(&Principal::base(3), ResourceKind::StudentProfile),
            Err(AccessError::Forbidden)
        );
    }

    #[test]
    fn test_admin_me_without_profile_is_not_found() {
        let engine = AccessControlEngine::new();
        assert_eq!(
            engine.self_profile(&Principal::admin(1), ResourceKind::StudentProfile),
            Err(AccessError::ProfileNotFound(ProfileKind::Student))
        );
        let admin_with_profile = Principal::admin(1).with_teacher_profile(Some(4));
        assert_eq!(
            engine.self_profile(&admin_with_profile, ResourceKind::TeacherProfile),
            Ok(4)
        );
    }

    #[test]
    fn test_require_object_denies_foreign_course() {
        let engine = AccessControlEngine::new();
        let teacher = Principal::teacher(2, Some(3));
        let target = Snapshot::Grade {
            student: 10,
            course_teacher: Some(8),
            student_enrolled: true,
        };
        assert_eq!(
            engine.require_object(&teacher, Action::Create, &target),
            Err(AccessError::Forbidden)
        );
    }
}
