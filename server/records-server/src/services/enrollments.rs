//! Course enrollments

use access_control::{Action, Principal, ResourceKind, Role};
use database_layer::{Enrollment, EnrollmentQuery, NewEnrollment, Page};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::server::RecordsServer;
use crate::validation::FieldErrors;

const KIND: ResourceKind = ResourceKind::Enrollment;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EnrollmentRequest {
    /// Ignored when a student enrolls; their own profile is used
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
}

pub async fn list(
    server: &RecordsServer,
    principal: &Principal,
    query: EnrollmentQuery,
) -> ApiResult<Page<Enrollment>> {
    server.engine.require(principal, Action::List, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    Ok(tx.list_enrollments(&visible, &query).await?)
}

pub async fn retrieve(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<Enrollment> {
    server.engine.require(principal, Action::Retrieve, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    tx.get_enrollment(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Enrollment"))
}

pub async fn create(
    server: &RecordsServer,
    principal: &Principal,
    request: EnrollmentRequest,
) -> ApiResult<Enrollment> {
    server.engine.require(principal, Action::Create, KIND)?;

    let mut errors = FieldErrors::new();
    // A student's own profile replaces whatever they send
    let student_id = if principal.role == Role::Student {
        request.student_id
    } else {
        errors.required("student_id", request.student_id)
    };
    let course_id = errors.required("course_id", request.course_id);
    errors.into_result()?;
    let injection = server.engine.injection(principal, Action::Create, KIND)?;
    let (Some(student_id), Some(course_id)) = (injection.apply(student_id), course_id) else {
        return Err(ApiError::bad_request("Invalid input."));
    };

    let mut tx = server.begin().await?;
    let enrollment = tx
        .insert_enrollment(NewEnrollment { student_id, course_id })
        .await?;
    tx.commit().await?;

    tracing::info!(
        enrollment_id = enrollment.id,
        student_id,
        course_id,
        created_by = principal.user_id,
        "Enrollment created"
    );
    Ok(enrollment)
}

pub async fn update(
    server: &RecordsServer,
    principal: &Principal,
    id: i64,
    request: EnrollmentRequest,
    partial: bool,
) -> ApiResult<Enrollment> {
    server.engine.require(principal, Action::Update, KIND)?;

    let (student_id, course_id) = if partial {
        (request.student_id, request.course_id)
    } else {
        let mut errors = FieldErrors::new();
        let student_id = errors.required("student_id", request.student_id);
        let course_id = errors.required("course_id", request.course_id);
        errors.into_result()?;
        (student_id, course_id)
    };

    let visible = server.engine.visibility(principal, KIND);
    let mut tx = server.begin().await?;
    let mut enrollment = tx
        .get_enrollment(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Enrollment"))?;

    if let Some(student_id) = student_id {
        enrollment.student_id = student_id;
    }
    if let Some(course_id) = course_id {
        enrollment.course_id = course_id;
    }

    let enrollment = tx.update_enrollment(&enrollment).await?;
    tx.commit().await?;
    Ok(enrollment)
}

pub async fn delete(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<()> {
    server.engine.require(principal, Action::Delete, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    tx.get_enrollment(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Enrollment"))?;
    tx.delete_enrollment(id).await?;
    tx.commit().await?;
    Ok(())
}
