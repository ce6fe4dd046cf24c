//! Resource operations
//!
//! Each module authorizes the action, validates the payload and runs the
//! store work in a single transaction. Handlers stay thin wrappers over these.

pub mod courses;
pub mod enrollments;
pub mod exports;
pub mod grades;
pub mod provision;
pub mod seed;
pub mod students;
pub mod teachers;
pub mod users;
