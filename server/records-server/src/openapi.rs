use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers::{auth, courses, enrollments, exports, grades, health, me, students, teachers, users};
use crate::server::RecordsServer;

/// Main OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::obtain_token,
        auth::refresh_token,
        auth::register,
        me::current_identity,
        users::list_users,
        users::create_user,
        users::get_user,
        users::replace_user,
        users::patch_user,
        users::delete_user,
        students::list_students,
        students::create_student,
        students::get_student,
        students::replace_student,
        students::patch_student,
        students::delete_student,
        students::get_my_student_profile,
        students::update_my_student_profile,
        teachers::list_teachers,
        teachers::create_teacher,
        teachers::get_teacher,
        teachers::replace_teacher,
        teachers::patch_teacher,
        teachers::delete_teacher,
        teachers::get_my_teacher_profile,
        teachers::update_my_teacher_profile,
        courses::list_courses,
        courses::create_course,
        courses::get_course,
        courses::replace_course,
        courses::patch_course,
        courses::delete_course,
        enrollments::list_enrollments,
        enrollments::create_enrollment,
        enrollments::get_enrollment,
        enrollments::replace_enrollment,
        enrollments::patch_enrollment,
        enrollments::delete_enrollment,
        grades::list_grades,
        grades::create_grade,
        grades::get_grade,
        grades::replace_grade,
        grades::patch_grade,
        grades::delete_grade,
        exports::export_students,
        exports::export_grades,
    ),
    components(
        schemas(
            crate::error::ApiErrorResponse,
            health::HealthResponse,
            auth::TokenRequest,
            auth::RefreshRequest,
            me::IdentityResponse,
            crate::auth::IssuedToken,
            crate::auth::RefreshedToken,
            database_layer::GradeValue,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Tokens, registration and the current identity"),
        (name = "users", description = "User accounts (administrators)"),
        (name = "students", description = "Student profiles"),
        (name = "teachers", description = "Teacher profiles"),
        (name = "courses", description = "Courses"),
        (name = "enrollments", description = "Course enrollments"),
        (name = "grades", description = "Grades"),
        (name = "exports", description = "CSV exports (administrators)"),
    ),
    info(
        title = "Academic Records API",
        description = "Role-based access to users, student and teacher profiles, courses, enrollments and grades.",
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Create OpenAPI documentation routes
pub fn create_docs_routes() -> Router<RecordsServer> {
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_resource() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/token",
            "/api/v1/token/refresh",
            "/api/v1/students/me",
            "/api/v1/grades/{id}",
            "/api/v1/exports/grades",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = doc.components.unwrap().security_schemes;
        assert!(schemes.contains_key("bearer_auth"));
    }
}
