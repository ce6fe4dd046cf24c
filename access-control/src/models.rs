use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AccessError;

/// Store-assigned identifier of a user row
pub type UserId = i64;

/// Store-assigned identifier of a student or teacher profile row
pub type ProfileId = i64;

/// Primary authorization discriminant of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Base,
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Base, Role::Student, Role::Teacher, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Base => "base",
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    /// The profile kind this role is provisioned with, if any
    pub fn profile_kind(&self) -> Option<ProfileKind> {
        match self {
            Role::Student => Some(ProfileKind::Student),
            Role::Teacher => Some(ProfileKind::Teacher),
            Role::Base | Role::Admin => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Role::Base),
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(AccessError::UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Role-specific extension record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileKind {
    Student,
    Teacher,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileKind::Student => f.write_str("Student"),
            ProfileKind::Teacher => f.write_str("Teacher"),
        }
    }
}

/// The authenticated identity making a request
///
/// Profile ids are resolved from the store for every request; a principal is
/// never reused across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub student_profile: Option<ProfileId>,
    pub teacher_profile: Option<ProfileId>,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            student_profile: None,
            teacher_profile: None,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn base(user_id: UserId) -> Self {
        Self::new(user_id, Role::Base)
    }

    pub fn student(user_id: UserId, profile: Option<ProfileId>) -> Self {
        Self::new(user_id, Role::Student).with_student_profile(profile)
    }

    pub fn teacher(user_id: UserId, profile: Option<ProfileId>) -> Self {
        Self::new(user_id, Role::Teacher).with_teacher_profile(profile)
    }

    pub fn with_student_profile(mut self, profile: Option<ProfileId>) -> Self {
        self.student_profile = profile;
        self
    }

    pub fn with_teacher_profile(mut self, profile: Option<ProfileId>) -> Self {
        self.teacher_profile = profile;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Linked profile of the given kind
    pub fn profile(&self, kind: ProfileKind) -> Option<ProfileId> {
        match kind {
            ProfileKind::Student => self.student_profile,
            ProfileKind::Teacher => self.teacher_profile,
        }
    }

    /// Teacher profile id, only when the principal currently holds the teacher role
    pub fn acting_teacher(&self) -> Option<ProfileId> {
        match self.role {
            Role::Teacher => self.teacher_profile,
            _ => None,
        }
    }

    /// Student profile id, only when the principal currently holds the student role
    pub fn acting_student(&self) -> Option<ProfileId> {
        match self.role {
            Role::Student => self.student_profile,
            _ => None,
        }
    }
}

/// Resource kinds protected by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    User,
    StudentProfile,
    TeacherProfile,
    Course,
    Enrollment,
    Grade,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::User,
        ResourceKind::StudentProfile,
        ResourceKind::TeacherProfile,
        ResourceKind::Course,
        ResourceKind::Enrollment,
        ResourceKind::Grade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::StudentProfile => "student_profile",
            ResourceKind::TeacherProfile => "teacher_profile",
            ResourceKind::Course => "course",
            ResourceKind::Enrollment => "enrollment",
            ResourceKind::Grade => "grade",
        }
    }

    /// Profile kind served by this resource's `me` operation
    pub fn self_service_kind(&self) -> Option<ProfileKind> {
        match self {
            ResourceKind::StudentProfile => Some(ProfileKind::Student),
            ResourceKind::TeacherProfile => Some(ProfileKind::Teacher),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations a principal can attempt on a resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
    /// Read or partially update the caller's own profile
    Me,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::List,
        Action::Retrieve,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Me,
    ];

    pub fn class(&self) -> ActionClass {
        match self {
            Action::List | Action::Retrieve => ActionClass::Read,
            Action::Create => ActionClass::Create,
            Action::Update | Action::Delete => ActionClass::MutateExisting,
            Action::Me => ActionClass::SelfService,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Retrieve => "retrieve",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Me => "me",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission classes the rule table is keyed on
///
/// Update and delete share one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    Read,
    Create,
    MutateExisting,
    SelfService,
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// The attributes of a target row an object-level decision depends on
///
/// `course_teacher` is the teacher currently assigned to the row's course.
/// For student profiles, `taught_by` lists the teachers of every course the
/// student is enrolled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    User {
        id: UserId,
    },
    StudentProfile {
        id: ProfileId,
        user_id: UserId,
        taught_by: Vec<ProfileId>,
    },
    TeacherProfile {
        id: ProfileId,
        user_id: UserId,
    },
    Course {
        teacher: Option<ProfileId>,
        is_active: bool,
    },
    Enrollment {
        student: ProfileId,
        course_teacher: Option<ProfileId>,
    },
    Grade {
        student: ProfileId,
        course_teacher: Option<ProfileId>,
        student_enrolled: bool,
    },
}

impl Snapshot {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Snapshot::User { .. } => ResourceKind::User,
            Snapshot::StudentProfile { .. } => ResourceKind::StudentProfile,
            Snapshot::TeacherProfile { .. } => ResourceKind::TeacherProfile,
            Snapshot::Course { .. } => ResourceKind::Course,
            Snapshot::Enrollment { .. } => ResourceKind::Enrollment,
            Snapshot::Grade { .. } => ResourceKind::Grade,
        }
    }
}
