//! Academic records HTTP server
//!
//! Serves users, student and teacher profiles, courses, enrollments and grades
//! over a JSON API. Every request is authenticated with a bearer token and
//! authorized by the [`access_control`] engine; rows are read and written
//! through a [`database_layer::EntityStore`].

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::*;
pub use server::RecordsServer;

use axum::{middleware::from_fn, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Create the main application router with all routes and middleware
pub fn create_app(server: RecordsServer) -> Router {
    let cors = middleware::create_cors_layer(&server.config.server.cors_origins);

    routes::create_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(from_fn(middleware::request_timing_middleware)),
        )
        .with_state(server)
}
