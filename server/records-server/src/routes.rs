use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    handlers::{auth, courses, enrollments, exports, grades, health, me, students, teachers, users},
    openapi,
    server::RecordsServer,
};

/// Create health check routes
pub fn health_routes() -> Router<RecordsServer> {
    Router::new().route("/health", get(health::health_check))
}

/// Token issuance, registration and the current identity
pub fn auth_routes() -> Router<RecordsServer> {
    Router::new()
        .route("/token", post(auth::obtain_token))
        .route("/token/refresh", post(auth::refresh_token))
        .route("/register", post(auth::register))
        .route("/me", get(me::current_identity))
}

pub fn user_routes() -> Router<RecordsServer> {
    Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::replace_user)
                .patch(users::patch_user)
                .delete(users::delete_user),
        )
}

/// Student profiles; `/students/me` is matched before `/students/:id`
pub fn student_routes() -> Router<RecordsServer> {
    Router::new()
        .route("/students", get(students::list_students).post(students::create_student))
        .route(
            "/students/me",
            get(students::get_my_student_profile)
                .put(students::update_my_student_profile)
                .patch(students::update_my_student_profile),
        )
        .route(
            "/students/:id",
            get(students::get_student)
                .put(students::replace_student)
                .patch(students::patch_student)
                .delete(students::delete_student),
        )
}

pub fn teacher_routes() -> Router<RecordsServer> {
    Router::new()
        .route("/teachers", get(teachers::list_teachers).post(teachers::create_teacher))
        .route(
            "/teachers/me",
            get(teachers::get_my_teacher_profile)
                .put(teachers::update_my_teacher_profile)
                .patch(teachers::update_my_teacher_profile),
        )
        .route(
            "/teachers/:id",
            get(teachers::get_teacher)
                .put(teachers::replace_teacher)
                .patch(teachers::patch_teacher)
                .delete(teachers::delete_teacher),
        )
}

pub fn course_routes() -> Router<RecordsServer> {
    Router::new()
        .route("/courses", get(courses::list_courses).post(courses::create_course))
        .route(
            "/courses/:id",
            get(courses::get_course)
                .put(courses::replace_course)
                .patch(courses::patch_course)
                .delete(courses::delete_course),
        )
}

pub fn enrollment_routes() -> Router<RecordsServer> {
    Router::new()
        .route(
            "/enrollments",
            get(enrollments::list_enrollments).post(enrollments::create_enrollment),
        )
        .route(
            "/enrollments/:id",
            get(enrollments::get_enrollment)
                .put(enrollments::replace_enrollment)
                .patch(enrollments::patch_enrollment)
                .delete(enrollments::delete_enrollment),
        )
}

pub fn grade_routes() -> Router<RecordsServer> {
    Router::new()
        .route("/grades", get(grades::list_grades).post(grades::create_grade))
        .route(
            "/grades/:id",
            get(grades::get_grade)
                .put(grades::replace_grade)
                .patch(grades::patch_grade)
                .delete(grades::delete_grade),
        )
}

pub fn export_routes() -> Router<RecordsServer> {
    Router::new()
        .route("/exports/students", get(exports::export_students))
        .route("/exports/grades", get(exports::export_grades))
}

/// Create API v1 routes
pub fn api_v1_routes() -> Router<RecordsServer> {
    Router::new()
        .merge(auth_routes())
        .merge(user_routes())
        .merge(student_routes())
        .merge(teacher_routes())
        .merge(course_routes())
        .merge(enrollment_routes())
        .merge(grade_routes())
        .merge(export_routes())
}

/// Create all application routes
pub fn create_routes() -> Router<RecordsServer> {
    Router::new()
        .merge(health_routes())
        .merge(openapi::create_docs_routes())
        .nest("/api/v1", api_v1_routes())
}
