//! PostgreSQL-backed entity store
//!
//! Unique and foreign-key constraints are the source of truth; violations are
//! mapped back to input field names by constraint name. Visibility filters are
//! rendered into the WHERE clause so counts and pages never include rows the
//! caller cannot see.

use access_control::{ProfileId, ResourceKind, Role, RowFilter, UserId};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{messages, DatabaseError, DatabaseResult};
use crate::models::*;
use crate::query::*;
use crate::store::{EntityStore, StoreTx};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.role, u.first_name, u.last_name, \
     u.is_active, u.date_joined, u.password_hash";

const PREFIXED_USER_COLUMNS: &str = "u.id AS u_id, u.username AS u_username, u.email AS u_email, \
     u.role AS u_role, u.first_name AS u_first_name, u.last_name AS u_last_name, \
     u.is_active AS u_is_active, u.date_joined AS u_date_joined, u.password_hash AS u_password_hash";

const STUDENT_COLUMNS: &str = "sp.id, sp.user_id, sp.enrollment_number, sp.date_of_birth, \
     sp.phone_number, sp.address, sp.created_at, sp.updated_at";

const TEACHER_COLUMNS: &str = "tp.id, tp.user_id, tp.department, tp.created_at, tp.updated_at";

const STUDENT_FROM: &str = "student_profiles sp JOIN users u ON u.id = sp.user_id";
const TEACHER_FROM: &str = "teacher_profiles tp JOIN users u ON u.id = tp.user_id";

/// PostgreSQL entity store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool from a connection string
    pub async fn connect(connection_string: &str, max_connections: u32) -> DatabaseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(connection_string)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        info!("Database connection pool created successfully");
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> DatabaseResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn begin(&self) -> DatabaseResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Database health check failed: {}", e);
                false
            }
        }
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

// =============================================================================
// Error mapping
// =============================================================================

fn unique_field(constraint: &str) -> Option<(&'static str, &'static str)> {
    let mapped = match constraint {
        "users_username_key" => ("username", messages::USERNAME_TAKEN),
        "users_email_key" => ("email", messages::EMAIL_TAKEN),
        "student_profiles_user_id_key" => ("user_id", messages::STUDENT_PROFILE_EXISTS),
        "student_profiles_enrollment_number_key" => {
            ("enrollment_number", messages::ENROLLMENT_NUMBER_TAKEN)
        }
        "teacher_profiles_user_id_key" => ("user_id", messages::TEACHER_PROFILE_EXISTS),
        "courses_code_key" => ("code", messages::COURSE_CODE_TAKEN),
        "enrollments_student_course_key" | "grades_student_course_key" => {
            ("non_field_errors", messages::PAIR_TAKEN)
        }
        _ => return None,
    };
    Some(mapped)
}

fn reference_field(constraint: &str) -> Option<&'static str> {
    match constraint {
        "student_profiles_user_id_fkey" | "teacher_profiles_user_id_fkey" => Some("user_id"),
        "courses_teacher_id_fkey" | "grades_teacher_id_fkey" => Some("teacher_id"),
        "enrollments_student_id_fkey" | "grades_student_id_fkey" => Some("student_id"),
        "enrollments_course_id_fkey" | "grades_course_id_fkey" => Some("course_id"),
        _ => None,
    }
}

/// Map a failed write; `refs` carries the referenced ids the write supplied
fn write_error(err: sqlx::Error, refs: &[(&'static str, i64)]) -> DatabaseError {
    if let sqlx::Error::Database(db) = &err {
        let constraint = db.constraint().unwrap_or_default();
        match db.code().as_deref() {
            Some("23505") => {
                if let Some((field, message)) = unique_field(constraint) {
                    return DatabaseError::unique(field, message);
                }
            }
            Some("23503") => {
                if let Some(field) = reference_field(constraint) {
                    let id = refs
                        .iter()
                        .find(|(name, _)| *name == field)
                        .map_or(0, |(_, id)| *id);
                    return DatabaseError::MissingReference { field, id };
                }
            }
            _ => {}
        }
    }
    DatabaseError::SqlxError(err)
}

// =============================================================================
// Row decoding
// =============================================================================

fn decode_prefixed_user(row: &PgRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("u_role")?;
    Ok(User {
        id: row.try_get("u_id")?,
        username: row.try_get("u_username")?,
        email: row.try_get("u_email")?,
        role: role
            .parse::<Role>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        first_name: row.try_get("u_first_name")?,
        last_name: row.try_get("u_last_name")?,
        is_active: row.try_get("u_is_active")?,
        date_joined: row.try_get("u_date_joined")?,
        password_hash: row.try_get("u_password_hash")?,
    })
}

fn decode_student(row: &PgRow) -> Result<StudentRecord, sqlx::Error> {
    Ok(StudentRecord {
        profile: StudentProfile::from_row(row)?,
        user: decode_prefixed_user(row)?,
    })
}

fn decode_teacher(row: &PgRow) -> Result<TeacherRecord, sqlx::Error> {
    Ok(TeacherRecord {
        profile: TeacherProfile::from_row(row)?,
        user: decode_prefixed_user(row)?,
    })
}

// =============================================================================
// Query fragments
// =============================================================================

fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_icontains(qb: &mut QueryBuilder<'_, Postgres>, column: &str, value: Option<&String>) {
    if let Some(value) = value {
        qb.push(" AND ")
            .push(column)
            .push(" ILIKE ")
            .push_bind(like_pattern(value));
    }
}

fn push_eq<T>(qb: &mut QueryBuilder<'_, Postgres>, column: &str, value: Option<T>)
where
    T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
{
    if let Some(value) = value {
        qb.push(" AND ").push(column).push(" = ").push_bind(value);
    }
}

fn push_search(qb: &mut QueryBuilder<'_, Postgres>, columns: &[&str], search: Option<&String>) {
    let Some(search) = search else {
        return;
    };
    qb.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(*column).push(" ILIKE ").push_bind(like_pattern(search));
    }
    qb.push(")");
}

/// Render a visibility filter as a WHERE fragment over the resource's alias
fn push_visibility(qb: &mut QueryBuilder<'_, Postgres>, kind: ResourceKind, visible: &RowFilter) {
    match (kind, *visible) {
        (_, RowFilter::All) => {}
        (ResourceKind::StudentProfile, RowFilter::OwnStudent(pid)) => {
            qb.push(" AND sp.id = ").push_bind(pid);
        }
        (ResourceKind::StudentProfile, RowFilter::TaughtBy(tid)) => {
            qb.push(
                " AND EXISTS (SELECT 1 FROM enrollments ve JOIN courses vc ON vc.id = ve.course_id \
                 WHERE ve.student_id = sp.id AND vc.teacher_id = ",
            )
            .push_bind(tid)
            .push(")");
        }
        (ResourceKind::TeacherProfile, RowFilter::OwnTeacher(pid)) => {
            qb.push(" AND tp.id = ").push_bind(pid);
        }
        (ResourceKind::Course, RowFilter::TaughtBy(tid)) => {
            qb.push(" AND c.teacher_id = ").push_bind(tid);
        }
        (ResourceKind::Course, RowFilter::ActiveCourses) => {
            qb.push(" AND c.is_active");
        }
        (ResourceKind::Enrollment, RowFilter::OwnStudent(pid)) => {
            qb.push(" AND e.student_id = ").push_bind(pid);
        }
        (ResourceKind::Enrollment, RowFilter::TaughtBy(tid)) => {
            qb.push(" AND EXISTS (SELECT 1 FROM courses vc WHERE vc.id = e.course_id AND vc.teacher_id = ")
                .push_bind(tid)
                .push(")");
        }
        (ResourceKind::Grade, RowFilter::OwnStudent(pid)) => {
            qb.push(" AND g.student_id = ").push_bind(pid);
        }
        (ResourceKind::Grade, RowFilter::TaughtBy(tid)) => {
            qb.push(" AND EXISTS (SELECT 1 FROM courses vc WHERE vc.id = g.course_id AND vc.teacher_id = ")
                .push_bind(tid)
                .push(")");
        }
        _ => {
            qb.push(" AND FALSE");
        }
    }
}

fn order_clause<F: SortField>(ordering: &[OrderBy<F>], id_column: &str) -> String {
    let mut terms: Vec<String> = ordering
        .iter()
        .map(|o| format!("{} {}", o.field.column(), if o.descending { "DESC" } else { "ASC" }))
        .collect();
    terms.push(format!("{id_column} ASC"));
    terms.join(", ")
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl PgTx {
    /// Run the count and page queries sharing one WHERE clause
    async fn fetch_page<T>(
        &mut self,
        select: &str,
        from: &str,
        push_where: impl Fn(&mut QueryBuilder<'_, Postgres>) + Send + Sync,
        order: String,
        page: Option<PageRequest>,
        decode: fn(&PgRow) -> Result<T, sqlx::Error>,
    ) -> DatabaseResult<Page<T>> {
        let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {from} WHERE TRUE"));
        push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *self.tx).await?;

        let mut qb = QueryBuilder::new(format!("SELECT {select} FROM {from} WHERE TRUE"));
        push_where(&mut qb);
        qb.push(" ORDER BY ").push(order);
        if let Some(page) = page {
            qb.push(" LIMIT ")
                .push_bind(to_i64(page.limit()))
                .push(" OFFSET ")
                .push_bind(to_i64(page.offset()));
        }

        let rows = qb.build().fetch_all(&mut *self.tx).await?;
        let items = rows
            .iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn fetch_one_where<T>(
        &mut self,
        select: &str,
        from: &str,
        push_where: impl Fn(&mut QueryBuilder<'_, Postgres>) + Send + Sync,
        decode: fn(&PgRow) -> Result<T, sqlx::Error>,
    ) -> DatabaseResult<Option<T>> {
        let mut qb = QueryBuilder::new(format!("SELECT {select} FROM {from} WHERE TRUE"));
        push_where(&mut qb);
        let row = qb.build().fetch_optional(&mut *self.tx).await?;
        Ok(row.as_ref().map(decode).transpose()?)
    }

    async fn delete_by_id(&mut self, table: &str, id: i64) -> DatabaseResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        debug!(table, id, "Deleted row");
        Ok(result.rows_affected() > 0)
    }

    async fn require_user(&mut self, user_id: UserId) -> DatabaseResult<User> {
        self.get_user(user_id)
            .await?
            .ok_or(DatabaseError::NotFound("User"))
    }
}

fn decode_user(row: &PgRow) -> Result<User, sqlx::Error> {
    User::from_row(row)
}

fn decode_course(row: &PgRow) -> Result<Course, sqlx::Error> {
    Course::from_row(row)
}

fn decode_enrollment(row: &PgRow) -> Result<Enrollment, sqlx::Error> {
    Enrollment::from_row(row)
}

fn decode_grade(row: &PgRow) -> Result<Grade, sqlx::Error> {
    Grade::from_row(row)
}

#[async_trait]
impl StoreTx for PgTx {
    // =========================================================================
    // Users
    // =========================================================================

    async fn get_user(&mut self, id: UserId) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&mut self, username: &str) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn list_users(&mut self, visible: &RowFilter, query: &UserQuery) -> DatabaseResult<Page<User>> {
        let filter = query.filter.clone();
        let search = query.search.clone();
        let visible = *visible;
        let push_where = move |qb: &mut QueryBuilder<'_, Postgres>| {
            if !visible.is_unrestricted() {
                qb.push(" AND FALSE");
            }
            push_icontains(qb, "u.username", filter.username.as_ref());
            push_icontains(qb, "u.email", filter.email.as_ref());
            push_eq(qb, "u.role", filter.role.map(|r| r.as_str().to_string()));
            push_eq(qb, "u.is_active", filter.is_active);
            push_search(
                qb,
                &["u.username", "u.email", "u.first_name", "u.last_name"],
                search.as_ref(),
            );
        };

        self.fetch_page(
            USER_COLUMNS,
            "users u",
            push_where,
            order_clause(&query.ordering, "u.id"),
            query.page,
            decode_user,
        )
        .await
    }

    async fn insert_user(&mut self, user: NewUser) -> DatabaseResult<User> {
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, role, first_name, last_name, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, &[]))?;

        debug!(user_id = row.id, "Inserted user");
        Ok(row)
    }

    async fn update_user(&mut self, user: &User) -> DatabaseResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = $2, email = $3, role = $4, first_name = $5,
                last_name = $6, is_active = $7, password_hash = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(&user.password_hash)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, &[]))?
        .ok_or(DatabaseError::NotFound("User"))
    }

    async fn delete_user(&mut self, id: UserId) -> DatabaseResult<bool> {
        self.delete_by_id("users", id).await
    }

    // =========================================================================
    // Student profiles
    // =========================================================================

    async fn get_student(&mut self, id: ProfileId, visible: &RowFilter) -> DatabaseResult<Option<StudentRecord>> {
        let visible = *visible;
        self.fetch_one_where(
            &format!("{STUDENT_COLUMNS}, {PREFIXED_USER_COLUMNS}"),
            STUDENT_FROM,
            move |qb| {
                qb.push(" AND sp.id = ").push_bind(id);
                push_visibility(qb, ResourceKind::StudentProfile, &visible);
            },
            decode_student,
        )
        .await
    }

    async fn student_for_user(&mut self, user_id: UserId) -> DatabaseResult<Option<StudentRecord>> {
        self.fetch_one_where(
            &format!("{STUDENT_COLUMNS}, {PREFIXED_USER_COLUMNS}"),
            STUDENT_FROM,
            move |qb| {
                qb.push(" AND sp.user_id = ").push_bind(user_id);
            },
            decode_student,
        )
        .await
    }

    async fn list_students(
        &mut self,
        visible: &RowFilter,
        query: &StudentQuery,
    ) -> DatabaseResult<Page<StudentRecord>> {
        let filter = query.filter.clone();
        let search = query.search.clone();
        let visible = *visible;
        let push_where = move |qb: &mut QueryBuilder<'_, Postgres>| {
            push_visibility(qb, ResourceKind::StudentProfile, &visible);
            push_icontains(qb, "sp.enrollment_number", filter.enrollment_number.as_ref());
            push_icontains(qb, "u.username", filter.username.as_ref());
            push_search(
                qb,
                &["sp.enrollment_number", "u.username", "u.email"],
                search.as_ref(),
            );
        };

        self.fetch_page(
            &format!("{STUDENT_COLUMNS}, {PREFIXED_USER_COLUMNS}"),
            STUDENT_FROM,
            push_where,
            order_clause(&query.ordering, "sp.id"),
            query.page,
            decode_student,
        )
        .await
    }

    async fn insert_student(&mut self, profile: NewStudentProfile) -> DatabaseResult<StudentRecord> {
        let row = sqlx::query_as::<_, StudentProfile>(
            r#"
            INSERT INTO student_profiles (user_id, enrollment_number, date_of_birth, phone_number, address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.enrollment_number)
        .bind(profile.date_of_birth)
        .bind(&profile.phone_number)
        .bind(&profile.address)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, &[("user_id", profile.user_id)]))?;

        let user = self.require_user(row.user_id).await?;
        Ok(StudentRecord { profile: row, user })
    }

    async fn update_student(&mut self, profile: &StudentProfile) -> DatabaseResult<StudentRecord> {
        let row = sqlx::query_as::<_, StudentProfile>(
            r#"
            UPDATE student_profiles
            SET enrollment_number = $2, date_of_birth = $3, phone_number = $4,
                address = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(profile.id)
        .bind(&profile.enrollment_number)
        .bind(profile.date_of_birth)
        .bind(&profile.phone_number)
        .bind(&profile.address)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, &[]))?
        .ok_or(DatabaseError::NotFound("Student profile"))?;

        let user = self.require_user(row.user_id).await?;
        Ok(StudentRecord { profile: row, user })
    }

    async fn delete_student(&mut self, id: ProfileId) -> DatabaseResult<bool> {
        self.delete_by_id("student_profiles", id).await
    }

    // =========================================================================
    // Teacher profiles
    // =========================================================================

    async fn get_teacher(&mut self, id: ProfileId, visible: &RowFilter) -> DatabaseResult<Option<TeacherRecord>> {
        let visible = *visible;
        self.fetch_one_where(
            &format!("{TEACHER_COLUMNS}, {PREFIXED_USER_COLUMNS}"),
            TEACHER_FROM,
            move |qb| {
                qb.push(" AND tp.id = ").push_bind(id);
                push_visibility(qb, ResourceKind::TeacherProfile, &visible);
            },
            decode_teacher,
        )
        .await
    }

    async fn teacher_for_user(&mut self, user_id: UserId) -> DatabaseResult<Option<TeacherRecord>> {
        self.fetch_one_where(
            &format!("{TEACHER_COLUMNS}, {PREFIXED_USER_COLUMNS}"),
            TEACHER_FROM,
            move |qb| {
                qb.push(" AND tp.user_id = ").push_bind(user_id);
            },
            decode_teacher,
        )
        .await
    }

    async fn list_teachers(
        &mut self,
        visible: &RowFilter,
        query: &TeacherQuery,
    ) -> DatabaseResult<Page<TeacherRecord>> {
        let filter = query.filter.clone();
        let search = query.search.clone();
        let visible = *visible;
        let push_where = move |qb: &mut QueryBuilder<'_, Postgres>| {
            push_visibility(qb, ResourceKind::TeacherProfile, &visible);
            push_icontains(qb, "tp.department", filter.department.as_ref());
            push_icontains(qb, "u.username", filter.username.as_ref());
            push_search(
                qb,
                &["u.username", "u.email", "tp.department"],
                search.as_ref(),
            );
        };

        self.fetch_page(
            &format!("{TEACHER_COLUMNS}, {PREFIXED_USER_COLUMNS}"),
            TEACHER_FROM,
            push_where,
            order_clause(&query.ordering, "tp.id"),
            query.page,
            decode_teacher,
        )
        .await
    }

    async fn insert_teacher(&mut self, profile: NewTeacherProfile) -> DatabaseResult<TeacherRecord> {
        let row = sqlx::query_as::<_, TeacherProfile>(
            "INSERT INTO teacher_profiles (user_id, department) VALUES ($1, $2) RETURNING *",
        )
        .bind(profile.user_id)
        .bind(&profile.department)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, &[("user_id", profile.user_id)]))?;

        let user = self.require_user(row.user_id).await?;
        Ok(TeacherRecord { profile: row, user })
    }

    async fn update_teacher(&mut self, profile: &TeacherProfile) -> DatabaseResult<TeacherRecord> {
        let row = sqlx::query_as::<_, TeacherProfile>(
            "UPDATE teacher_profiles SET department = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(profile.id)
        .bind(&profile.department)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(DatabaseError::NotFound("Teacher profile"))?;

        let user = self.require_user(row.user_id).await?;
        Ok(TeacherRecord { profile: row, user })
    }

    async fn delete_teacher(&mut self, id: ProfileId) -> DatabaseResult<bool> {
        self.delete_by_id("teacher_profiles", id).await
    }

    // =========================================================================
    // Courses
    // =========================================================================

    async fn get_course(&mut self, id: i64, visible: &RowFilter) -> DatabaseResult<Option<Course>> {
        let visible = *visible;
        self.fetch_one_where(
            "c.*",
            "courses c",
            move |qb| {
                qb.push(" AND c.id = ").push_bind(id);
                push_visibility(qb, ResourceKind::Course, &visible);
            },
            decode_course,
        )
        .await
    }

    async fn list_courses(&mut self, visible: &RowFilter, query: &CourseQuery) -> DatabaseResult<Page<Course>> {
        let filter = query.filter.clone();
        let search = query.search.clone();
        let visible = *visible;
        let push_where = move |qb: &mut QueryBuilder<'_, Postgres>| {
            push_visibility(qb, ResourceKind::Course, &visible);
            push_icontains(qb, "c.title", filter.title.as_ref());
            push_icontains(qb, "c.code", filter.code.as_ref());
            push_eq(qb, "c.teacher_id", filter.teacher);
            push_eq(qb, "c.is_active", filter.is_active);
            push_search(qb, &["c.title", "c.code", "c.description"], search.as_ref());
        };

        self.fetch_page(
            "c.*",
            "courses c",
            push_where,
            order_clause(&query.ordering, "c.id"),
            query.page,
            decode_course,
        )
        .await
    }

    async fn insert_course(&mut self, course: NewCourse) -> DatabaseResult<Course> {
        sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (code, title, description, teacher_id, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&course.code)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.teacher_id)
        .bind(course.is_active)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, &[("teacher_id", course.teacher_id.unwrap_or_default())]))
    }

    async fn update_course(&mut self, course: &Course) -> DatabaseResult<Course> {
        sqlx::query_as::<_, Course>(
            r#"
            UPDATE courses
            SET code = $2, title = $3, description = $4, teacher_id = $5,
                is_active = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(course.id)
        .bind(&course.code)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.teacher_id)
        .bind(course.is_active)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, &[("teacher_id", course.teacher_id.unwrap_or_default())]))?
        .ok_or(DatabaseError::NotFound("Course"))
    }

    async fn delete_course(&mut self, id: i64) -> DatabaseResult<bool> {
        self.delete_by_id("courses", id).await
    }

    // =========================================================================
    // Enrollments
    // =========================================================================

    async fn get_enrollment(&mut self, id: i64, visible: &RowFilter) -> DatabaseResult<Option<Enrollment>> {
        let visible = *visible;
        self.fetch_one_where(
            "e.*",
            "enrollments e",
            move |qb| {
                qb.push(" AND e.id = ").push_bind(id);
                push_visibility(qb, ResourceKind::Enrollment, &visible);
            },
            decode_enrollment,
        )
        .await
    }

    async fn is_enrolled(&mut self, student_id: ProfileId, course_id: i64) -> DatabaseResult<bool> {
        let enrolled = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM enrollments WHERE student_id = $1 AND course_id = $2)",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(enrolled)
    }

    async fn list_enrollments(
        &mut self,
        visible: &RowFilter,
        query: &EnrollmentQuery,
    ) -> DatabaseResult<Page<Enrollment>> {
        let filter = query.filter.clone();
        let visible = *visible;
        let push_where = move |qb: &mut QueryBuilder<'_, Postgres>| {
            push_visibility(qb, ResourceKind::Enrollment, &visible);
            push_eq(qb, "e.student_id", filter.student);
            push_eq(qb, "e.course_id", filter.course);
        };

        self.fetch_page(
            "e.*",
            "enrollments e",
            push_where,
            order_clause(&query.ordering, "e.id"),
            query.page,
            decode_enrollment,
        )
        .await
    }

    async fn insert_enrollment(&mut self, enrollment: NewEnrollment) -> DatabaseResult<Enrollment> {
        sqlx::query_as::<_, Enrollment>(
            "INSERT INTO enrollments (student_id, course_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(enrollment.student_id)
        .bind(enrollment.course_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            write_error(
                e,
                &[("student_id", enrollment.student_id), ("course_id", enrollment.course_id)],
            )
        })
    }

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> DatabaseResult<Enrollment> {
        sqlx::query_as::<_, Enrollment>(
            r#"
            UPDATE enrollments
            SET student_id = $2, course_id = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.student_id)
        .bind(enrollment.course_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            write_error(
                e,
                &[("student_id", enrollment.student_id), ("course_id", enrollment.course_id)],
            )
        })?
        .ok_or(DatabaseError::NotFound("Enrollment"))
    }

    async fn delete_enrollment(&mut self, id: i64) -> DatabaseResult<bool> {
        self.delete_by_id("enrollments", id).await
    }

    // =========================================================================
    // Grades
    // =========================================================================

    async fn get_grade(&mut self, id: i64, visible: &RowFilter) -> DatabaseResult<Option<Grade>> {
        let visible = *visible;
        self.fetch_one_where(
            "g.*",
            "grades g",
            move |qb| {
                qb.push(" AND g.id = ").push_bind(id);
                push_visibility(qb, ResourceKind::Grade, &visible);
            },
            decode_grade,
        )
        .await
    }

    async fn list_grades(&mut self, visible: &RowFilter, query: &GradeQuery) -> DatabaseResult<Page<Grade>> {
        let filter = query.filter.clone();
        let visible = *visible;
        let push_where = move |qb: &mut QueryBuilder<'_, Postgres>| {
            push_visibility(qb, ResourceKind::Grade, &visible);
            push_eq(qb, "g.student_id", filter.student);
            push_eq(qb, "g.course_id", filter.course);
            push_eq(qb, "g.teacher_id", filter.teacher);
            push_eq(qb, "g.value", filter.value.map(|v| v.as_str().to_string()));
        };

        self.fetch_page(
            "g.*",
            "grades g",
            push_where,
            order_clause(&query.ordering, "g.id"),
            query.page,
            decode_grade,
        )
        .await
    }

    async fn insert_grade(&mut self, grade: NewGrade) -> DatabaseResult<Grade> {
        sqlx::query_as::<_, Grade>(
            r#"
            INSERT INTO grades (student_id, course_id, teacher_id, value)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(grade.student_id)
        .bind(grade.course_id)
        .bind(grade.teacher_id)
        .bind(grade.value.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            write_error(
                e,
                &[
                    ("student_id", grade.student_id),
                    ("course_id", grade.course_id),
                    ("teacher_id", grade.teacher_id.unwrap_or_default()),
                ],
            )
        })
    }

    async fn update_grade(&mut self, grade: &Grade) -> DatabaseResult<Grade> {
        sqlx::query_as::<_, Grade>(
            r#"
            UPDATE grades
            SET student_id = $2, course_id = $3, teacher_id = $4, value = $5,
                graded_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(grade.id)
        .bind(grade.student_id)
        .bind(grade.course_id)
        .bind(grade.teacher_id)
        .bind(grade.value.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            write_error(
                e,
                &[
                    ("student_id", grade.student_id),
                    ("course_id", grade.course_id),
                    ("teacher_id", grade.teacher_id.unwrap_or_default()),
                ],
            )
        })?
        .ok_or(DatabaseError::NotFound("Grade"))
    }

    async fn delete_grade(&mut self, id: i64) -> DatabaseResult<bool> {
        self.delete_by_id("grades", id).await
    }

    // =========================================================================
    // Exports
    // =========================================================================

    async fn grade_export_rows(&mut self, course_id: Option<i64>) -> DatabaseResult<Vec<GradeExportRow>> {
        let rows = sqlx::query_as::<_, GradeExportRow>(
            r#"
            SELECT g.id,
                   su.username AS student_username,
                   sp.enrollment_number,
                   c.code AS course_code,
                   c.title AS course_title,
                   g.value,
                   tu.username AS teacher_username,
                   g.graded_at
            FROM grades g
            JOIN student_profiles sp ON sp.id = g.student_id
            JOIN users su ON su.id = sp.user_id
            JOIN courses c ON c.id = g.course_id
            LEFT JOIN teacher_profiles tp ON tp.id = g.teacher_id
            LEFT JOIN users tu ON tu.id = tp.user_id
            WHERE ($1::BIGINT IS NULL OR g.course_id = $1)
            ORDER BY g.graded_at DESC, g.id ASC
            "#,
        )
        .bind(course_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
