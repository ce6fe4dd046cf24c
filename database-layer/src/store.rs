use access_control::{ProfileId, RowFilter, UserId};
use async_trait::async_trait;

use crate::error::DatabaseResult;
use crate::models::*;
use crate::query::*;

/// Entry point of the entity store
///
/// All reads and writes go through a [`StoreTx`]; nothing is visible to other
/// transactions until [`StoreTx::commit`]. Dropping a transaction rolls it back.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn begin(&self) -> DatabaseResult<Box<dyn StoreTx>>;

    /// Backend name for health reporting
    fn backend(&self) -> &'static str;

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// One store transaction
///
/// Methods taking a [`RowFilter`] return only rows the filter admits; a row
/// that exists but is filtered out is reported exactly like a missing one.
/// Writes enforce uniqueness ([`DatabaseError::UniqueViolation`](crate::DatabaseError))
/// and reference integrity ([`DatabaseError::MissingReference`](crate::DatabaseError)).
#[async_trait]
pub trait StoreTx: Send {
    // Users
    async fn get_user(&mut self, id: UserId) -> DatabaseResult<Option<User>>;
    async fn find_user_by_username(&mut self, username: &str) -> DatabaseResult<Option<User>>;
    async fn list_users(&mut self, visible: &RowFilter, query: &UserQuery) -> DatabaseResult<Page<User>>;
    async fn insert_user(&mut self, user: NewUser) -> DatabaseResult<User>;
    async fn update_user(&mut self, user: &User) -> DatabaseResult<User>;
    /// Cascades to the user's profiles and everything hanging off them
    async fn delete_user(&mut self, id: UserId) -> DatabaseResult<bool>;

    // Student profiles
    async fn get_student(&mut self, id: ProfileId, visible: &RowFilter) -> DatabaseResult<Option<StudentRecord>>;
    async fn student_for_user(&mut self, user_id: UserId) -> DatabaseResult<Option<StudentRecord>>;
    async fn list_students(&mut self, visible: &RowFilter, query: &StudentQuery) -> DatabaseResult<Page<StudentRecord>>;
    async fn insert_student(&mut self, profile: NewStudentProfile) -> DatabaseResult<StudentRecord>;
    async fn update_student(&mut self, profile: &StudentProfile) -> DatabaseResult<StudentRecord>;
    async fn delete_student(&mut self, id: ProfileId) -> DatabaseResult<bool>;

    // Teacher profiles
    async fn get_teacher(&mut self, id: ProfileId, visible: &RowFilter) -> DatabaseResult<Option<TeacherRecord>>;
    async fn teacher_for_user(&mut self, user_id: UserId) -> DatabaseResult<Option<TeacherRecord>>;
    async fn list_teachers(&mut self, visible: &RowFilter, query: &TeacherQuery) -> DatabaseResult<Page<TeacherRecord>>;
    async fn insert_teacher(&mut self, profile: NewTeacherProfile) -> DatabaseResult<TeacherRecord>;
    async fn update_teacher(&mut self, profile: &TeacherProfile) -> DatabaseResult<TeacherRecord>;
    /// Courses and grades referencing the teacher keep existing with a null teacher
    async fn delete_teacher(&mut self, id: ProfileId) -> DatabaseResult<bool>;

    // Courses
    async fn get_course(&mut self, id: i64, visible: &RowFilter) -> DatabaseResult<Option<Course>>;
    async fn list_courses(&mut self, visible: &RowFilter, query: &CourseQuery) -> DatabaseResult<Page<Course>>;
    async fn insert_course(&mut self, course: NewCourse) -> DatabaseResult<Course>;
    async fn update_course(&mut self, course: &Course) -> DatabaseResult<Course>;
    async fn delete_course(&mut self, id: i64) -> DatabaseResult<bool>;

    // Enrollments
    async fn get_enrollment(&mut self, id: i64, visible: &RowFilter) -> DatabaseResult<Option<Enrollment>>;
    async fn is_enrolled(&mut self, student_id: ProfileId, course_id: i64) -> DatabaseResult<bool>;
    async fn list_enrollments(&mut self, visible: &RowFilter, query: &EnrollmentQuery) -> DatabaseResult<Page<Enrollment>>;
    async fn insert_enrollment(&mut self, enrollment: NewEnrollment) -> DatabaseResult<Enrollment>;
    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> DatabaseResult<Enrollment>;
    async fn delete_enrollment(&mut self, id: i64) -> DatabaseResult<bool>;

    // Grades
    async fn get_grade(&mut self, id: i64, visible: &RowFilter) -> DatabaseResult<Option<Grade>>;
    async fn list_grades(&mut self, visible: &RowFilter, query: &GradeQuery) -> DatabaseResult<Page<Grade>>;
    async fn insert_grade(&mut self, grade: NewGrade) -> DatabaseResult<Grade>;
    async fn update_grade(&mut self, grade: &Grade) -> DatabaseResult<Grade>;
    async fn delete_grade(&mut self, id: i64) -> DatabaseResult<bool>;

    // Exports
    async fn grade_export_rows(&mut self, course_id: Option<i64>) -> DatabaseResult<Vec<GradeExportRow>>;

    async fn commit(self: Box<Self>) -> DatabaseResult<()>;
}
