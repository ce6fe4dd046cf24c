// Database models
use access_control::{ProfileId, Role, Snapshot, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String, example = "student")]
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    /// Argon2 PHC string
    #[serde(skip)]
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StudentProfile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub enrollment_number: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A student profile together with its owning user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StudentRecord {
    #[serde(flatten)]
    pub profile: StudentProfile,
    pub user: User,
}

#[derive(Debug, Clone)]
pub struct NewStudentProfile {
    pub user_id: UserId,
    pub enrollment_number: String,
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TeacherProfile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub department: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A teacher profile together with its owning user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TeacherRecord {
    #[serde(flatten)]
    pub profile: TeacherProfile,
    pub user: User,
}

#[derive(Debug, Clone)]
pub struct NewTeacherProfile {
    pub user_id: UserId,
    pub department: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Course {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub description: String,
    pub teacher_id: Option<ProfileId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub code: String,
    pub title: String,
    pub description: String,
    pub teacher_id: Option<ProfileId>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: ProfileId,
    pub course_id: i64,
    pub enrolled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewEnrollment {
    pub student_id: ProfileId,
    pub course_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Grade {
    pub id: i64,
    pub student_id: ProfileId,
    pub course_id: i64,
    pub teacher_id: Option<ProfileId>,
    #[sqlx(try_from = "String")]
    pub value: GradeValue,
    /// Refreshed on every save
    pub graded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewGrade {
    pub student_id: ProfileId,
    pub course_id: i64,
    pub teacher_id: Option<ProfileId>,
    pub value: GradeValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum GradeValue {
    A,
    B,
    C,
    D,
    F,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("\"{0}\" is not a valid choice.")]
pub struct InvalidGradeValue(pub String);

impl GradeValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeValue::A => "A",
            GradeValue::B => "B",
            GradeValue::C => "C",
            GradeValue::D => "D",
            GradeValue::F => "F",
        }
    }
}

impl fmt::Display for GradeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradeValue {
    type Err = InvalidGradeValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(GradeValue::A),
            "B" => Ok(GradeValue::B),
            "C" => Ok(GradeValue::C),
            "D" => Ok(GradeValue::D),
            "F" => Ok(GradeValue::F),
            other => Err(InvalidGradeValue(other.to_string())),
        }
    }
}

impl TryFrom<String> for GradeValue {
    type Error = InvalidGradeValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One row of the grades CSV export
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GradeExportRow {
    pub id: i64,
    pub student_username: String,
    pub enrollment_number: String,
    pub course_code: String,
    pub course_title: String,
    #[sqlx(try_from = "String")]
    pub value: GradeValue,
    pub teacher_username: Option<String>,
    pub graded_at: DateTime<Utc>,
}

// =============================================================================
// Snapshots for object-level authorization
// =============================================================================

impl User {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::User { id: self.id }
    }
}

impl TeacherProfile {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::TeacherProfile {
            id: self.id,
            user_id: self.user_id,
        }
    }
}

impl Course {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::Course {
            teacher: self.teacher_id,
            is_active: self.is_active,
        }
    }
}
