//! Access control engine for the academic records API
//!
//! This crate decides who may do what to which record. It combines three kinds
//! of checks:
//! - Role checks driven by a static rule table (admin, teacher, student, base)
//! - Ownership checks (a principal's own student or teacher profile)
//! - Relationship checks (a teacher may only grade students enrolled in a
//!   course that teacher teaches)
//!
//! # Core Concepts
//!
//! - **Principal**: the authenticated caller, its role and any linked profile ids
//! - **Action**: list, retrieve, create, update, delete, or the self-service `me`
//! - **ResourceKind**: users, student/teacher profiles, courses, enrollments, grades
//! - **RowFilter**: the visibility predicate a store applies to list/retrieve queries
//! - **Snapshot**: the few attributes of a target row an object-level check needs
//!
//! Everything here is a pure function of its inputs. Nothing is cached, so a
//! decision always reflects the role and profile linkage loaded for the current
//! request.
//!
//! # Example
//!
//! ```rust
//! use access_control::{AccessControlEngine, Action, Decision, Principal, ResourceKind, RowFilter};
//!
//! let engine = AccessControlEngine::new();
//! let teacher = Principal::teacher(7, Some(3));
//!
//! assert_eq!(
//!     engine.authorize(&teacher, Action::Create, ResourceKind::Course),
//!     Decision::Allow,
//! );
//! assert_eq!(
//!     engine.visibility(&teacher, ResourceKind::Grade),
//!     RowFilter::TaughtBy(3),
//! );
//! ```

pub mod check;
pub mod engine;
pub mod error;
pub mod models;
pub mod schema;
pub mod visibility;

pub use check::*;
pub use engine::*;
pub use error::*;
pub use models::*;
pub use schema::*;
pub use visibility::*;
