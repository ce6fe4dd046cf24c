use serde::Serialize;

use crate::models::*;

/// Row predicate narrowing list and retrieve queries for one principal
///
/// Stores translate the filter into their own query language; [`RowFilter::admits`]
/// is the reference evaluation over a [`Snapshot`]. A filter paired with a
/// resource kind it does not describe admits nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "filter", content = "profile", rename_all = "snake_case")]
pub enum RowFilter {
    All,
    Nothing,
    /// Rows belonging to this student profile
    OwnStudent(ProfileId),
    /// The teacher profile itself
    OwnTeacher(ProfileId),
    /// Rows reachable through a course taught by this teacher profile
    TaughtBy(ProfileId),
    ActiveCourses,
}

impl RowFilter {
    pub fn admits(&self, row: &Snapshot) -> bool {
        match (self, row) {
            (RowFilter::All, _) => true,
            (RowFilter::Nothing, _) => false,

            (RowFilter::OwnStudent(pid), Snapshot::StudentProfile { id, .. }) => id == pid,
            (RowFilter::OwnStudent(pid), Snapshot::Enrollment { student, .. }) => student == pid,
            (RowFilter::OwnStudent(pid), Snapshot::Grade { student, .. }) => student == pid,

            (RowFilter::OwnTeacher(pid), Snapshot::TeacherProfile { id, .. }) => id == pid,

            (RowFilter::TaughtBy(pid), Snapshot::StudentProfile { taught_by, .. }) => {
                taught_by.contains(pid)
            }
            (RowFilter::TaughtBy(pid), Snapshot::Course { teacher, .. }) => {
                *teacher == Some(*pid)
            }
            (RowFilter::TaughtBy(pid), Snapshot::Enrollment { course_teacher, .. })
            | (RowFilter::TaughtBy(pid), Snapshot::Grade { course_teacher, .. }) => {
                *course_teacher == Some(*pid)
            }

            (RowFilter::ActiveCourses, Snapshot::Course { is_active, .. }) => *is_active,

            _ => false,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, RowFilter::All)
    }
}

/// Compute the visibility filter for a principal on a resource kind.
///
/// TeacherProfile and Course fall through to [`RowFilter::All`] for roles
/// without a narrower rule (a base user, or a teacher whose profile is gone).
pub fn visibility_for(principal: &Principal, kind: ResourceKind) -> RowFilter {
    if principal.is_admin() {
        return RowFilter::All;
    }

    let teacher = principal.acting_teacher();
    let student = principal.acting_student();

    match kind {
        ResourceKind::User => RowFilter::Nothing,

        ResourceKind::StudentProfile => match (teacher, student) {
            (Some(tid), _) => RowFilter::TaughtBy(tid),
            (_, Some(sid)) => RowFilter::OwnStudent(sid),
            _ => RowFilter::Nothing,
        },

        ResourceKind::TeacherProfile => match teacher {
            Some(tid) => RowFilter::OwnTeacher(tid),
            None => RowFilter::All,
        },

        ResourceKind::Course => match (teacher, principal.role) {
            (Some(tid), _) => RowFilter::TaughtBy(tid),
            (None, Role::Student) => RowFilter::ActiveCourses,
            _ => RowFilter::All,
        },

        ResourceKind::Enrollment | ResourceKind::Grade => match (teacher, student) {
            (Some(tid), _) => RowFilter::TaughtBy(tid),
            (_, Some(sid)) => RowFilter::OwnStudent(sid),
            _ => RowFilter::Nothing,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(student: ProfileId, course_teacher: Option<ProfileId>) -> Snapshot {
        Snapshot::Grade {
            student,
            course_teacher,
            student_enrolled: true,
        }
    }

    #[test]
    fn test_student_sees_only_own_grades() {
        let filter = visibility_for(&Principal::student(1, Some(10)), ResourceKind::Grade);
        assert_eq!(filter, RowFilter::OwnStudent(10));
        assert!(filter.admits(&grade(10, Some(3))));
        assert!(!filter.admits(&grade(11, Some(3))));
    }

    #[test]
    fn test_teacher_sees_grades_in_taught_courses() {
        let filter = visibility_for(&Principal::teacher(2, Some(3)), ResourceKind::Grade);
        assert!(filter.admits(&grade(10, Some(3))));
        assert!(!filter.admits(&grade(10, Some(4))));
        assert!(!filter.admits(&grade(10, None)));
    }

    #[test]
    fn test_teacher_sees_students_through_enrollments() {
        let filter = visibility_for(&Principal::teacher(2, Some(3)), ResourceKind::StudentProfile);
        let enrolled = Snapshot::StudentProfile {
            id: 10,
            user_id: 1,
            taught_by: vec![5, 3],
        };
        let stranger = Snapshot::StudentProfile {
            id: 11,
            user_id: 4,
            taught_by: vec![5],
        };
        assert!(filter.admits(&enrolled));
        assert!(!filter.admits(&stranger));
    }

    #[test]
    fn test_fall_through_to_all_for_teacher_profiles_and_courses() {
        let base = Principal::base(9);
        assert_eq!(visibility_for(&base, ResourceKind::TeacherProfile), RowFilter::All);
        assert_eq!(visibility_for(&base, ResourceKind::Course), RowFilter::All);

        let orphaned_teacher = Principal::teacher(9, None);
        assert_eq!(visibility_for(&orphaned_teacher, ResourceKind::Course), RowFilter::All);
        assert_eq!(
            visibility_for(&orphaned_teacher, ResourceKind::StudentProfile),
            RowFilter::Nothing
        );
    }

    #[test]
    fn test_student_without_profile_still_sees_active_courses() {
        let filter = visibility_for(&Principal::student(1, None), ResourceKind::Course);
        assert_eq!(filter, RowFilter::ActiveCourses);
        assert!(!filter.admits(&Snapshot::Course {
            teacher: None,
            is_active: false
        }));
        assert_eq!(
            visibility_for(&Principal::student(1, None), ResourceKind::Enrollment),
            RowFilter::Nothing
        );
    }

    #[test]
    fn test_mismatched_filter_admits_nothing() {
        assert!(!RowFilter::OwnTeacher(3).admits(&Snapshot::Course {
            teacher: Some(3),
            is_active: true
        }));
        assert!(!RowFilter::ActiveCourses.admits(&grade(1, None)));
    }
}
