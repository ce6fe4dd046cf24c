pub mod auth;
pub mod courses;
pub mod enrollments;
pub mod exports;
pub mod grades;
pub mod health;
pub mod me;
pub mod students;
pub mod teachers;
pub mod users;
