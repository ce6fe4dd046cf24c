//! Entity store for the academic records API
//!
//! This crate owns the persistent model: users, student and teacher profiles,
//! courses, enrollments and grades, together with their relational invariants.
//!
//! # Key Features
//!
//! - **Transactional access**: every read and write runs inside a [`StoreTx`]
//!   obtained from an [`EntityStore`]; dropping it rolls back
//! - **Visibility-aware queries**: list and single-row fetches take an
//!   [`access_control::RowFilter`] and never return rows it excludes
//! - **Uniqueness and references**: duplicate keys surface as
//!   [`DatabaseError::UniqueViolation`] and dangling foreign keys as
//!   [`DatabaseError::MissingReference`], both naming the offending field
//! - **Two backends**: [`PgStore`] on PostgreSQL and [`MemoryStore`] for
//!   development and tests
//!
//! # Example Usage
//!
//! ```rust
//! use access_control::RowFilter;
//! use database_layer::{CourseQuery, EntityStore, MemoryStore, NewCourse, StoreTx};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     let mut tx = store.begin().await?;
//!     tx.insert_course(NewCourse {
//!         code: "CS101".into(),
//!         title: "Introduction to Computing".into(),
//!         description: String::new(),
//!         teacher_id: None,
//!         is_active: true,
//!     })
//!     .await?;
//!
//!     let page = tx
//!         .list_courses(&RowFilter::ActiveCourses, &CourseQuery::default())
//!         .await?;
//!     assert_eq!(page.total, 1);
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::*;
pub use memory::*;
pub use models::*;
pub use postgres::*;
pub use query::*;
pub use store::*;
