use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A unique constraint rejected the write; `field` names the offending input
    #[error("{message}")]
    UniqueViolation { field: &'static str, message: String },

    /// A foreign key points at a row that does not exist
    #[error("Invalid pk \"{id}\" - object does not exist.")]
    MissingReference { field: &'static str, id: i64 },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl DatabaseError {
    pub fn unique(field: &'static str, message: impl Into<String>) -> Self {
        Self::UniqueViolation {
            field,
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Conflict messages shared by both backends
pub(crate) mod messages {
    pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
    pub const EMAIL_TAKEN: &str = "user with this email already exists.";
    pub const ENROLLMENT_NUMBER_TAKEN: &str =
        "student profile with this enrollment number already exists.";
    pub const STUDENT_PROFILE_EXISTS: &str = "student profile with this user already exists.";
    pub const TEACHER_PROFILE_EXISTS: &str = "teacher profile with this user already exists.";
    pub const COURSE_CODE_TAKEN: &str = "course with this code already exists.";
    pub const PAIR_TAKEN: &str = "The fields student, course must make a unique set.";
}
