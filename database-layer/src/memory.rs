//! In-memory entity store
//!
//! A transaction holds the store-wide lock for its whole lifetime and works on
//! a private copy of every table. Commit swaps the copy in; dropping the
//! transaction discards it. Two concurrent writers therefore serialize, and the
//! second one sees the first one's rows when it checks uniqueness.

use access_control::{ProfileId, RowFilter, Snapshot, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{messages, DatabaseError, DatabaseResult};
use crate::models::*;
use crate::query::*;
use crate::store::{EntityStore, StoreTx};

#[derive(Debug, Clone, Default)]
struct Sequences {
    users: i64,
    students: i64,
    teachers: i64,
    courses: i64,
    enrollments: i64,
    grades: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    students: BTreeMap<ProfileId, StudentProfile>,
    teachers: BTreeMap<ProfileId, TeacherProfile>,
    courses: BTreeMap<i64, Course>,
    enrollments: BTreeMap<i64, Enrollment>,
    grades: BTreeMap<i64, Grade>,
    sequences: Sequences,
}

/// Transactional in-memory store for development and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn begin(&self) -> DatabaseResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

// =============================================================================
// Sorting, search and pagination helpers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Text(String),
    Time(DateTime<Utc>),
}

fn sort_rows<T, F: SortField>(rows: &mut [T], ordering: &[OrderBy<F>], key: impl Fn(&T, F) -> SortKey) {
    // Rows arrive in id order and the sort is stable, so ties stay ascending by id
    rows.sort_by(|a, b| {
        ordering
            .iter()
            .map(|order| {
                let cmp = key(a, order.field).cmp(&key(b, order.field));
                if order.descending {
                    cmp.reverse()
                } else {
                    cmp
                }
            })
            .find(|cmp| *cmp != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn paginate<T>(rows: Vec<T>, page: Option<PageRequest>) -> Page<T> {
    let total = rows.len() as u64;
    let items = match page {
        Some(page) => {
            let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
            let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
            rows.into_iter().skip(offset).take(limit).collect()
        }
        None => rows,
    };
    Page { items, total }
}

fn text_filter(value: &str, wanted: Option<&String>) -> bool {
    wanted.map_or(true, |w| icontains(value, &w.to_lowercase()))
}

fn eq_filter<T: PartialEq>(value: T, wanted: Option<T>) -> bool {
    wanted.map_or(true, |w| w == value)
}

fn search_any(search: Option<&String>, fields: &[&str]) -> bool {
    search.map_or(true, |s| fields.iter().any(|f| icontains(f, s)))
}

// =============================================================================
// Table-level invariants and snapshots
// =============================================================================

impl Tables {
    fn course_teacher(&self, course_id: i64) -> Option<ProfileId> {
        self.courses.get(&course_id).and_then(|c| c.teacher_id)
    }

    fn enrolled(&self, student_id: ProfileId, course_id: i64) -> bool {
        self.enrollments
            .values()
            .any(|e| e.student_id == student_id && e.course_id == course_id)
    }

    fn student_snapshot(&self, profile: &StudentProfile) -> Snapshot {
        let taught_by = self
            .enrollments
            .values()
            .filter(|e| e.student_id == profile.id)
            .filter_map(|e| self.course_teacher(e.course_id))
            .collect();
        Snapshot::StudentProfile {
            id: profile.id,
            user_id: profile.user_id,
            taught_by,
        }
    }

    fn enrollment_snapshot(&self, enrollment: &Enrollment) -> Snapshot {
        Snapshot::Enrollment {
            student: enrollment.student_id,
            course_teacher: self.course_teacher(enrollment.course_id),
        }
    }

    fn grade_snapshot(&self, grade: &Grade) -> Snapshot {
        Snapshot::Grade {
            student: grade.student_id,
            course_teacher: self.course_teacher(grade.course_id),
            student_enrolled: self.enrolled(grade.student_id, grade.course_id),
        }
    }

    fn user(&self, id: UserId) -> DatabaseResult<&User> {
        self.users.get(&id).ok_or(DatabaseError::NotFound("User"))
    }

    fn student_record(&self, profile: &StudentProfile) -> DatabaseResult<StudentRecord> {
        Ok(StudentRecord {
            profile: profile.clone(),
            user: self.user(profile.user_id)?.clone(),
        })
    }

    fn teacher_record(&self, profile: &TeacherProfile) -> DatabaseResult<TeacherRecord> {
        Ok(TeacherRecord {
            profile: profile.clone(),
            user: self.user(profile.user_id)?.clone(),
        })
    }

    fn require_ref<T>(map: &BTreeMap<i64, T>, id: i64, field: &'static str) -> DatabaseResult<()> {
        if map.contains_key(&id) {
            Ok(())
        } else {
            Err(DatabaseError::MissingReference { field, id })
        }
    }

    fn check_user(&self, id: UserId, username: &str, email: &str) -> DatabaseResult<()> {
        if self.users.values().any(|u| u.id != id && u.username == username) {
            return Err(DatabaseError::unique("username", messages::USERNAME_TAKEN));
        }
        if self.users.values().any(|u| u.id != id && u.email == email) {
            return Err(DatabaseError::unique("email", messages::EMAIL_TAKEN));
        }
        Ok(())
    }

    fn check_student(&self, id: ProfileId, user_id: UserId, enrollment_number: &str) -> DatabaseResult<()> {
        Self::require_ref(&self.users, user_id, "user_id")?;
        if self.students.values().any(|s| s.id != id && s.user_id == user_id) {
            return Err(DatabaseError::unique("user_id", messages::STUDENT_PROFILE_EXISTS));
        }
        if self
            .students
            .values()
            .any(|s| s.id != id && s.enrollment_number == enrollment_number)
        {
            return Err(DatabaseError::unique(
                "enrollment_number",
                messages::ENROLLMENT_NUMBER_TAKEN,
            ));
        }
        Ok(())
    }

    fn check_course(&self, id: i64, code: &str, teacher_id: Option<ProfileId>) -> DatabaseResult<()> {
        if let Some(teacher_id) = teacher_id {
            Self::require_ref(&self.teachers, teacher_id, "teacher_id")?;
        }
        if self.courses.values().any(|c| c.id != id && c.code == code) {
            return Err(DatabaseError::unique("code", messages::COURSE_CODE_TAKEN));
        }
        Ok(())
    }

    fn check_enrollment(&self, id: i64, student_id: ProfileId, course_id: i64) -> DatabaseResult<()> {
        Self::require_ref(&self.students, student_id, "student_id")?;
        Self::require_ref(&self.courses, course_id, "course_id")?;
        if self
            .enrollments
            .values()
            .any(|e| e.id != id && e.student_id == student_id && e.course_id == course_id)
        {
            return Err(DatabaseError::unique("non_field_errors", messages::PAIR_TAKEN));
        }
        Ok(())
    }

    fn check_grade(
        &self,
        id: i64,
        student_id: ProfileId,
        course_id: i64,
        teacher_id: Option<ProfileId>,
    ) -> DatabaseResult<()> {
        Self::require_ref(&self.students, student_id, "student_id")?;
        Self::require_ref(&self.courses, course_id, "course_id")?;
        if let Some(teacher_id) = teacher_id {
            Self::require_ref(&self.teachers, teacher_id, "teacher_id")?;
        }
        if self
            .grades
            .values()
            .any(|g| g.id != id && g.student_id == student_id && g.course_id == course_id)
        {
            return Err(DatabaseError::unique("non_field_errors", messages::PAIR_TAKEN));
        }
        Ok(())
    }

    fn remove_student(&mut self, id: ProfileId) -> bool {
        let removed = self.students.remove(&id).is_some();
        self.enrollments.retain(|_, e| e.student_id != id);
        self.grades.retain(|_, g| g.student_id != id);
        removed
    }

    fn remove_teacher(&mut self, id: ProfileId) -> bool {
        let removed = self.teachers.remove(&id).is_some();
        for course in self.courses.values_mut() {
            if course.teacher_id == Some(id) {
                course.teacher_id = None;
            }
        }
        for grade in self.grades.values_mut() {
            if grade.teacher_id == Some(id) {
                grade.teacher_id = None;
            }
        }
        removed
    }

    fn remove_course(&mut self, id: i64) -> bool {
        let removed = self.courses.remove(&id).is_some();
        self.enrollments.retain(|_, e| e.course_id != id);
        self.grades.retain(|_, g| g.course_id != id);
        removed
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    // =========================================================================
    // Users
    // =========================================================================

    async fn get_user(&mut self, id: UserId) -> DatabaseResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_user_by_username(&mut self, username: &str) -> DatabaseResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&mut self, visible: &RowFilter, query: &UserQuery) -> DatabaseResult<Page<User>> {
        let search = query.search_lower();
        let filter = &query.filter;
        let mut rows: Vec<User> = self
            .working
            .users
            .values()
            .filter(|u| visible.admits(&u.snapshot()))
            .filter(|u| text_filter(&u.username, filter.username.as_ref()))
            .filter(|u| text_filter(&u.email, filter.email.as_ref()))
            .filter(|u| eq_filter(u.role, filter.role))
            .filter(|u| eq_filter(u.is_active, filter.is_active))
            .filter(|u| {
                search_any(
                    search.as_ref(),
                    &[
                        u.username.as_str(),
                        u.email.as_str(),
                        u.first_name.as_str(),
                        u.last_name.as_str(),
                    ],
                )
            })
            .cloned()
            .collect();

        sort_rows(&mut rows, &query.ordering, |u, field| match field {
            UserSort::Username => SortKey::Text(u.username.clone()),
            UserSort::Email => SortKey::Text(u.email.clone()),
            UserSort::DateJoined => SortKey::Time(u.date_joined),
            UserSort::Role => SortKey::Text(u.role.as_str().to_string()),
        });
        Ok(paginate(rows, query.page))
    }

    async fn insert_user(&mut self, user: NewUser) -> DatabaseResult<User> {
        let tables = &mut self.working;
        tables.check_user(0, &user.username, &user.email)?;

        let id = next_id(&mut tables.sequences.users);
        let row = User {
            id,
            username: user.username,
            email: user.email,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            is_active: user.is_active,
            date_joined: Utc::now(),
            password_hash: user.password_hash,
        };
        tables.users.insert(id, row.clone());
        debug!(user_id = id, "Inserted user");
        Ok(row)
    }

    async fn update_user(&mut self, user: &User) -> DatabaseResult<User> {
        let tables = &mut self.working;
        let date_joined = tables.user(user.id)?.date_joined;
        tables.check_user(user.id, &user.username, &user.email)?;

        let row = User {
            date_joined,
            ..user.clone()
        };
        tables.users.insert(user.id, row.clone());
        Ok(row)
    }

    async fn delete_user(&mut self, id: UserId) -> DatabaseResult<bool> {
        let tables = &mut self.working;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }

        let students: Vec<ProfileId> = tables
            .students
            .values()
            .filter(|s| s.user_id == id)
            .map(|s| s.id)
            .collect();
        for student in students {
            tables.remove_student(student);
        }

        let teachers: Vec<ProfileId> = tables
            .teachers
            .values()
            .filter(|t| t.user_id == id)
            .map(|t| t.id)
            .collect();
        for teacher in teachers {
            tables.remove_teacher(teacher);
        }
        Ok(true)
    }

    // =========================================================================
    // Student profiles
    // =========================================================================

    async fn get_student(&mut self, id: ProfileId, visible: &RowFilter) -> DatabaseResult<Option<StudentRecord>> {
        let tables = &self.working;
        match tables.students.get(&id) {
            Some(profile) if visible.admits(&tables.student_snapshot(profile)) => {
                tables.student_record(profile).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn student_for_user(&mut self, user_id: UserId) -> DatabaseResult<Option<StudentRecord>> {
        let tables = &self.working;
        tables
            .students
            .values()
            .find(|s| s.user_id == user_id)
            .map(|profile| tables.student_record(profile))
            .transpose()
    }

    async fn list_students(
        &mut self,
        visible: &RowFilter,
        query: &StudentQuery,
    ) -> DatabaseResult<Page<StudentRecord>> {
        let tables = &self.working;
        let search = query.search_lower();
        let filter = &query.filter;

        let mut rows = Vec::new();
        for profile in tables.students.values() {
            if !visible.admits(&tables.student_snapshot(profile)) {
                continue;
            }
            let record = tables.student_record(profile)?;
            let keep = text_filter(&profile.enrollment_number, filter.enrollment_number.as_ref())
                && text_filter(&record.user.username, filter.username.as_ref())
                && search_any(
                    search.as_ref(),
                    &[
                        profile.enrollment_number.as_str(),
                        record.user.username.as_str(),
                        record.user.email.as_str(),
                    ],
                );
            if keep {
                rows.push(record);
            }
        }

        sort_rows(&mut rows, &query.ordering, |r, field| match field {
            StudentSort::EnrollmentNumber => SortKey::Text(r.profile.enrollment_number.clone()),
            StudentSort::CreatedAt => SortKey::Time(r.profile.created_at),
        });
        Ok(paginate(rows, query.page))
    }

    async fn insert_student(&mut self, profile: NewStudentProfile) -> DatabaseResult<StudentRecord> {
        let tables = &mut self.working;
        tables.check_student(0, profile.user_id, &profile.enrollment_number)?;

        let id = next_id(&mut tables.sequences.students);
        let now = Utc::now();
        let row = StudentProfile {
            id,
            user_id: profile.user_id,
            enrollment_number: profile.enrollment_number,
            date_of_birth: profile.date_of_birth,
            phone_number: profile.phone_number,
            address: profile.address,
            created_at: now,
            updated_at: now,
        };
        tables.students.insert(id, row.clone());
        tables.student_record(&row)
    }

    async fn update_student(&mut self, profile: &StudentProfile) -> DatabaseResult<StudentRecord> {
        let tables = &mut self.working;
        let existing = tables
            .students
            .get(&profile.id)
            .cloned()
            .ok_or(DatabaseError::NotFound("Student profile"))?;
        tables.check_student(profile.id, existing.user_id, &profile.enrollment_number)?;

        let row = StudentProfile {
            user_id: existing.user_id,
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..profile.clone()
        };
        tables.students.insert(row.id, row.clone());
        tables.student_record(&row)
    }

    async fn delete_student(&mut self, id: ProfileId) -> DatabaseResult<bool> {
        Ok(self.working.remove_student(id))
    }

    // =========================================================================
    // Teacher profiles
    // =========================================================================

    async fn get_teacher(&mut self, id: ProfileId, visible: &RowFilter) -> DatabaseResult<Option<TeacherRecord>> {
        let tables = &self.working;
        match tables.teachers.get(&id) {
            Some(profile) if visible.admits(&profile.snapshot()) => tables.teacher_record(profile).map(Some),
            _ => Ok(None),
        }
    }

    async fn teacher_for_user(&mut self, user_id: UserId) -> DatabaseResult<Option<TeacherRecord>> {
        let tables = &self.working;
        tables
            .teachers
            .values()
            .find(|t| t.user_id == user_id)
            .map(|profile| tables.teacher_record(profile))
            .transpose()
    }

    async fn list_teachers(
        &mut self,
        visible: &RowFilter,
        query: &TeacherQuery,
    ) -> DatabaseResult<Page<TeacherRecord>> {
        let tables = &self.working;
        let search = query.search_lower();
        let filter = &query.filter;

        let mut rows = Vec::new();
        for profile in tables.teachers.values() {
            if !visible.admits(&profile.snapshot()) {
                continue;
            }
            let record = tables.teacher_record(profile)?;
            let keep = text_filter(&profile.department, filter.department.as_ref())
                && text_filter(&record.user.username, filter.username.as_ref())
                && search_any(
                    search.as_ref(),
                    &[
                        record.user.username.as_str(),
                        record.user.email.as_str(),
                        profile.department.as_str(),
                    ],
                );
            if keep {
                rows.push(record);
            }
        }

        sort_rows(&mut rows, &query.ordering, |r, field| match field {
            TeacherSort::Department => SortKey::Text(r.profile.department.clone()),
            TeacherSort::CreatedAt => SortKey::Time(r.profile.created_at),
            TeacherSort::Username => SortKey::Text(r.user.username.clone()),
        });
        Ok(paginate(rows, query.page))
    }

    async fn insert_teacher(&mut self, profile: NewTeacherProfile) -> DatabaseResult<TeacherRecord> {
        let tables = &mut self.working;
        Tables::require_ref(&tables.users, profile.user_id, "user_id")?;
        if tables.teachers.values().any(|t| t.user_id == profile.user_id) {
            return Err(DatabaseError::unique("user_id", messages::TEACHER_PROFILE_EXISTS));
        }

        let id = next_id(&mut tables.sequences.teachers);
        let now = Utc::now();
        let row = TeacherProfile {
            id,
            user_id: profile.user_id,
            department: profile.department,
            created_at: now,
            updated_at: now,
        };
        tables.teachers.insert(id, row.clone());
        tables.teacher_record(&row)
    }

    async fn update_teacher(&mut self, profile: &TeacherProfile) -> DatabaseResult<TeacherRecord> {
        let tables = &mut self.working;
        let existing = tables
            .teachers
            .get(&profile.id)
            .cloned()
            .ok_or(DatabaseError::NotFound("Teacher profile"))?;

        let row = TeacherProfile {
            user_id: existing.user_id,
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..profile.clone()
        };
        tables.teachers.insert(row.id, row.clone());
        tables.teacher_record(&row)
    }

    async fn delete_teacher(&mut self, id: ProfileId) -> DatabaseResult<bool> {
        Ok(self.working.remove_teacher(id))
    }

    // =========================================================================
    // Courses
    // =========================================================================

    async fn get_course(&mut self, id: i64, visible: &RowFilter) -> DatabaseResult<Option<Course>> {
        Ok(self
            .working
            .courses
            .get(&id)
            .filter(|c| visible.admits(&c.snapshot()))
            .cloned())
    }

    async fn list_courses(&mut self, visible: &RowFilter, query: &CourseQuery) -> DatabaseResult<Page<Course>> {
        let search = query.search_lower();
        let filter = &query.filter;
        let mut rows: Vec<Course> = self
            .working
            .courses
            .values()
            .filter(|c| visible.admits(&c.snapshot()))
            .filter(|c| text_filter(&c.title, filter.title.as_ref()))
            .filter(|c| text_filter(&c.code, filter.code.as_ref()))
            .filter(|c| filter.teacher.map_or(true, |t| c.teacher_id == Some(t)))
            .filter(|c| eq_filter(c.is_active, filter.is_active))
            .filter(|c| search_any(search.as_ref(), &[c.title.as_str(), c.code.as_str(), c.description.as_str()]))
            .cloned()
            .collect();

        sort_rows(&mut rows, &query.ordering, |c, field| match field {
            CourseSort::Code => SortKey::Text(c.code.clone()),
            CourseSort::Title => SortKey::Text(c.title.clone()),
            CourseSort::CreatedAt => SortKey::Time(c.created_at),
        });
        Ok(paginate(rows, query.page))
    }

    async fn insert_course(&mut self, course: NewCourse) -> DatabaseResult<Course> {
        let tables = &mut self.working;
        tables.check_course(0, &course.code, course.teacher_id)?;

        let id = next_id(&mut tables.sequences.courses);
        let now = Utc::now();
        let row = Course {
            id,
            code: course.code,
            title: course.title,
            description: course.description,
            teacher_id: course.teacher_id,
            is_active: course.is_active,
            created_at: now,
            updated_at: now,
        };
        tables.courses.insert(id, row.clone());
        Ok(row)
    }

    async fn update_course(&mut self, course: &Course) -> DatabaseResult<Course> {
        let tables = &mut self.working;
        let created_at = tables
            .courses
            .get(&course.id)
            .map(|c| c.created_at)
            .ok_or(DatabaseError::NotFound("Course"))?;
        tables.check_course(course.id, &course.code, course.teacher_id)?;

        let row = Course {
            created_at,
            updated_at: Utc::now(),
            ..course.clone()
        };
        tables.courses.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_course(&mut self, id: i64) -> DatabaseResult<bool> {
        Ok(self.working.remove_course(id))
    }

    // =========================================================================
    // Enrollments
    // =========================================================================

    async fn get_enrollment(&mut self, id: i64, visible: &RowFilter) -> DatabaseResult<Option<Enrollment>> {
        let tables = &self.working;
        Ok(tables
            .enrollments
            .get(&id)
            .filter(|e| visible.admits(&tables.enrollment_snapshot(e)))
            .cloned())
    }

    async fn is_enrolled(&mut self, student_id: ProfileId, course_id: i64) -> DatabaseResult<bool> {
        Ok(self.working.enrolled(student_id, course_id))
    }

    async fn list_enrollments(
        &mut self,
        visible: &RowFilter,
        query: &EnrollmentQuery,
    ) -> DatabaseResult<Page<Enrollment>> {
        let tables = &self.working;
        let filter = &query.filter;
        let mut rows: Vec<Enrollment> = tables
            .enrollments
            .values()
            .filter(|e| visible.admits(&tables.enrollment_snapshot(e)))
            .filter(|e| eq_filter(e.student_id, filter.student))
            .filter(|e| eq_filter(e.course_id, filter.course))
            .cloned()
            .collect();

        sort_rows(&mut rows, &query.ordering, |e, field| match field {
            EnrollmentSort::EnrolledAt => SortKey::Time(e.enrolled_at),
        });
        Ok(paginate(rows, query.page))
    }

    async fn insert_enrollment(&mut self, enrollment: NewEnrollment) -> DatabaseResult<Enrollment> {
        let tables = &mut self.working;
        tables.check_enrollment(0, enrollment.student_id, enrollment.course_id)?;

        let id = next_id(&mut tables.sequences.enrollments);
        let now = Utc::now();
        let row = Enrollment {
            id,
            student_id: enrollment.student_id,
            course_id: enrollment.course_id,
            enrolled_at: now,
            created_at: now,
            updated_at: now,
        };
        tables.enrollments.insert(id, row.clone());
        Ok(row)
    }

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> DatabaseResult<Enrollment> {
        let tables = &mut self.working;
        let existing = tables
            .enrollments
            .get(&enrollment.id)
            .cloned()
            .ok_or(DatabaseError::NotFound("Enrollment"))?;
        tables.check_enrollment(enrollment.id, enrollment.student_id, enrollment.course_id)?;

        let row = Enrollment {
            enrolled_at: existing.enrolled_at,
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..enrollment.clone()
        };
        tables.enrollments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_enrollment(&mut self, id: i64) -> DatabaseResult<bool> {
        Ok(self.working.enrollments.remove(&id).is_some())
    }

    // =========================================================================
    // Grades
    // =========================================================================

    async fn get_grade(&mut self, id: i64, visible: &RowFilter) -> DatabaseResult<Option<Grade>> {
        let tables = &self.working;
        Ok(tables
            .grades
            .get(&id)
            .filter(|g| visible.admits(&tables.grade_snapshot(g)))
            .cloned())
    }

    async fn list_grades(&mut self, visible: &RowFilter, query: &GradeQuery) -> DatabaseResult<Page<Grade>> {
        let tables = &self.working;
        let filter = &query.filter;
        let mut rows: Vec<Grade> = tables
            .grades
            .values()
            .filter(|g| visible.admits(&tables.grade_snapshot(g)))
            .filter(|g| eq_filter(g.student_id, filter.student))
            .filter(|g| eq_filter(g.course_id, filter.course))
            .filter(|g| filter.teacher.map_or(true, |t| g.teacher_id == Some(t)))
            .filter(|g| eq_filter(g.value, filter.value))
            .cloned()
            .collect();

        sort_rows(&mut rows, &query.ordering, |g, field| match field {
            GradeSort::GradedAt => SortKey::Time(g.graded_at),
            GradeSort::Value => SortKey::Text(g.value.as_str().to_string()),
        });
        Ok(paginate(rows, query.page))
    }

    async fn insert_grade(&mut self, grade: NewGrade) -> DatabaseResult<Grade> {
        let tables = &mut self.working;
        tables.check_grade(0, grade.student_id, grade.course_id, grade.teacher_id)?;

        let id = next_id(&mut tables.sequences.grades);
        let now = Utc::now();
        let row = Grade {
            id,
            student_id: grade.student_id,
            course_id: grade.course_id,
            teacher_id: grade.teacher_id,
            value: grade.value,
            graded_at: now,
            created_at: now,
            updated_at: now,
        };
        tables.grades.insert(id, row.clone());
        Ok(row)
    }

    async fn update_grade(&mut self, grade: &Grade) -> DatabaseResult<Grade> {
        let tables = &mut self.working;
        let created_at = tables
            .grades
            .get(&grade.id)
            .map(|g| g.created_at)
            .ok_or(DatabaseError::NotFound("Grade"))?;
        tables.check_grade(grade.id, grade.student_id, grade.course_id, grade.teacher_id)?;

        let now = Utc::now();
        let row = Grade {
            graded_at: now,
            created_at,
            updated_at: now,
            ..grade.clone()
        };
        tables.grades.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_grade(&mut self, id: i64) -> DatabaseResult<bool> {
        Ok(self.working.grades.remove(&id).is_some())
    }

    // =========================================================================
    // Exports
    // =========================================================================

    async fn grade_export_rows(&mut self, course_id: Option<i64>) -> DatabaseResult<Vec<GradeExportRow>> {
        let tables = &self.working;
        let mut grades: Vec<&Grade> = tables
            .grades
            .values()
            .filter(|g| eq_filter(g.course_id, course_id))
            .collect();
        grades.sort_by(|a, b| b.graded_at.cmp(&a.graded_at));

        grades
            .into_iter()
            .map(|grade| -> DatabaseResult<GradeExportRow> {
                let student = tables
                    .students
                    .get(&grade.student_id)
                    .ok_or(DatabaseError::NotFound("Student profile"))?;
                let course = tables
                    .courses
                    .get(&grade.course_id)
                    .ok_or(DatabaseError::NotFound("Course"))?;
                let teacher_username = grade
                    .teacher_id
                    .and_then(|tid| tables.teachers.get(&tid))
                    .and_then(|t| tables.users.get(&t.user_id))
                    .map(|u| u.username.clone());

                Ok(GradeExportRow {
                    id: grade.id,
                    student_username: tables.user(student.user_id)?.username.clone(),
                    enrollment_number: student.enrollment_number.clone(),
                    course_code: course.code.clone(),
                    course_title: course.title.clone(),
                    value: grade.value,
                    teacher_username,
                    graded_at: grade.graded_at,
                })
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use access_control::Role;
    use chrono::NaiveDate;

    fn default_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
    }

    fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@school.test"),
            password_hash: String::new(),
            role,
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
        }
    }

    fn new_student(user_id: UserId, number: &str) -> NewStudentProfile {
        NewStudentProfile {
            user_id,
            enrollment_number: number.to_string(),
            date_of_birth: default_date(),
            phone_number: String::new(),
            address: String::new(),
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_user(new_user("ghost", Role::Base)).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_user_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(new_user("ada", Role::Base)).await.unwrap();
        let err = tx.insert_user(new_user("ada", Role::Base)).await.unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation { field: "username", .. }));
    }

    #[tokio::test]
    async fn test_deleting_teacher_nulls_course_teacher() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx.insert_user(new_user("prof", Role::Teacher)).await.unwrap();
        let teacher = tx
            .insert_teacher(NewTeacherProfile {
                user_id: user.id,
                department: "Math".to_string(),
            })
            .await
            .unwrap();
        let course = tx
            .insert_course(NewCourse {
                code: "MA101".to_string(),
                title: "Algebra".to_string(),
                description: String::new(),
                teacher_id: Some(teacher.profile.id),
                is_active: true,
            })
            .await
            .unwrap();

        assert!(tx.delete_user(user.id).await.unwrap());
        let course = tx.get_course(course.id, &RowFilter::All).await.unwrap().unwrap();
        assert_eq!(course.teacher_id, None);
    }

    #[tokio::test]
    async fn test_deleting_course_cascades_to_enrollments_and_grades() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx.insert_user(new_user("stu", Role::Student)).await.unwrap();
        let student = tx.insert_student(new_student(user.id, "ENR000001")).await.unwrap();
        let course = tx
            .insert_course(NewCourse {
                code: "CS101".to_string(),
                title: "Intro".to_string(),
                description: String::new(),
                teacher_id: None,
                is_active: true,
            })
            .await
            .unwrap();
        tx.insert_enrollment(NewEnrollment {
            student_id: student.profile.id,
            course_id: course.id,
        })
        .await
        .unwrap();
        tx.insert_grade(NewGrade {
            student_id: student.profile.id,
            course_id: course.id,
            teacher_id: None,
            value: GradeValue::B,
        })
        .await
        .unwrap();

        assert!(tx.delete_course(course.id).await.unwrap());
        let grades = tx.list_grades(&RowFilter::All, &GradeQuery::default()).await.unwrap();
        let enrollments = tx
            .list_enrollments(&RowFilter::All, &EnrollmentQuery::default())
            .await
            .unwrap();
        assert_eq!(grades.total, 0);
        assert_eq!(enrollments.total, 0);
    }

    #[tokio::test]
    async fn test_missing_reference_names_field() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_enrollment(NewEnrollment {
                student_id: 41,
                course_id: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::MissingReference { field: "student_id", id: 41 }
        ));
    }
}
