use crate::{error::AccessError, models::*};

/// How a relationship field of a new or updated row is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// Keep whatever the payload supplied
    PassThrough,
    /// Overwrite the field with the principal's own profile id
    Force(ProfileId),
}

impl Injection {
    /// Resolve the final field value against what the payload asked for
    pub fn apply(&self, requested: Option<ProfileId>) -> Option<ProfileId> {
        match self {
            Injection::PassThrough => requested,
            Injection::Force(pid) => Some(*pid),
        }
    }
}

/// Object-level capability checks and ownership injection
///
/// Both run after the rule table has allowed the action class.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionChecker;

impl PermissionChecker {
    pub fn new() -> Self {
        Self
    }

    /// Object capability for an action the rule table already allowed.
    ///
    /// Only teacher grade writes carry an object-level rule: the course must be
    /// taught by the caller and the student must be enrolled in it.
    pub fn check_object(&self, principal: &Principal, action: Action, target: &Snapshot) -> bool {
        if principal.is_admin() {
            return true;
        }

        match (action, target) {
            (
                Action::Create | Action::Update,
                Snapshot::Grade {
                    course_teacher,
                    student_enrolled,
                    ..
                },
            ) if principal.role == Role::Teacher => match principal.acting_teacher() {
                Some(tid) => *course_teacher == Some(tid) && *student_enrolled,
                None => false,
            },
            _ => true,
        }
    }

    /// Ownership injection for the relationship field a resource kind forces.
    ///
    /// Enrollments created by students, courses created by teachers, and grades
    /// created or updated by teachers get the caller's own profile. A caller
    /// lacking the needed profile gets [`AccessError::ProfileNotFound`].
    pub fn injection(
        &self,
        principal: &Principal,
        action: Action,
        kind: ResourceKind,
    ) -> Result<Injection, AccessError> {
        let needed = match (kind, action, principal.role) {
            (ResourceKind::Enrollment, Action::Create, Role::Student) => ProfileKind::Student,
            (ResourceKind::Course, Action::Create, Role::Teacher) => ProfileKind::Teacher,
            (ResourceKind::Grade, Action::Create | Action::Update, Role::Teacher) => {
                ProfileKind::Teacher
            }
            _ => return Ok(Injection::PassThrough),
        };

        principal
            .profile(needed)
            .map(Injection::Force)
            .ok_or(AccessError::ProfileNotFound(needed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(course_teacher: Option<ProfileId>, student_enrolled: bool) -> Snapshot {
        Snapshot::Grade {
            student: 20,
            course_teacher,
            student_enrolled,
        }
    }

    #[test]
    fn test_teacher_grades_only_enrolled_students_in_own_course() {
        let checker = PermissionChecker::new();
        let teacher = Principal::teacher(1, Some(3));

        assert!(checker.check_object(&teacher, Action::Create, &grade(Some(3), true)));
        assert!(!checker.check_object(&teacher, Action::Create, &grade(Some(3), false)));
        assert!(!checker.check_object(&teacher, Action::Update, &grade(Some(4), true)));
        assert!(!checker.check_object(&teacher, Action::Create, &grade(None, true)));
    }

    #[test]
    fn test_admin_bypasses_object_checks() {
        let checker = PermissionChecker::new();
        assert!(checker.check_object(&Principal::admin(1), Action::Create, &grade(None, false)));
    }

    #[test]
    fn test_injection_forces_caller_profile() {
        let checker = PermissionChecker::new();

        let student = Principal::student(1, Some(10));
        let enroll = checker
            .injection(&student, Action::Create, ResourceKind::Enrollment)
            .unwrap();
        assert_eq!(enroll.apply(Some(99)), Some(10));

        let teacher = Principal::teacher(2, Some(3));
        let course = checker
            .injection(&teacher, Action::Create, ResourceKind::Course)
            .unwrap();
        assert_eq!(course.apply(None), Some(3));

        let admin = checker
            .injection(&Principal::admin(5), Action::Create, ResourceKind::Grade)
            .unwrap();
        assert_eq!(admin, Injection::PassThrough);
        assert_eq!(admin.apply(Some(7)), Some(7));
    }

    #[test]
    fn test_injection_without_profile_is_not_found() {
        let checker = PermissionChecker::new();
        assert_eq!(
            checker.injection(&Principal::teacher(2, None), Action::Update, ResourceKind::Grade),
            Err(AccessError::ProfileNotFound(ProfileKind::Teacher))
        );
        assert_eq!(
            checker.injection(&Principal::student(2, None), Action::Create, ResourceKind::Enrollment),
            Err(AccessError::ProfileNotFound(ProfileKind::Student))
        );
    }

    #[test]
    fn test_course_updates_are_not_injected() {
        let checker = PermissionChecker::new();
        assert_eq!(
            checker.injection(&Principal::teacher(2, Some(3)), Action::Update, ResourceKind::Course),
            Ok(Injection::PassThrough)
        );
    }
}
