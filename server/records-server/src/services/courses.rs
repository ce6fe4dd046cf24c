//! Courses

use access_control::{Action, Principal, ResourceKind};
use database_layer::{Course, CourseQuery, NewCourse, Page};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::server::RecordsServer;
use crate::validation::{double_option, FieldErrors};

const KIND: ResourceKind = ResourceKind::Course;

/// Create and update payload; on PATCH every field is optional
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CourseRequest {
    #[validate(length(max = 20, message = "Ensure this field has no more than 20 characters."))]
    pub code: Option<String>,
    #[validate(length(max = 200, message = "Ensure this field has no more than 200 characters."))]
    pub title: Option<String>,
    pub description: Option<String>,
    /// Teacher profile id; `null` unassigns. Forced to the caller's own
    /// profile when a teacher creates the course.
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub teacher_id: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

pub async fn list(server: &RecordsServer, principal: &Principal, query: CourseQuery) -> ApiResult<Page<Course>> {
    server.engine.require(principal, Action::List, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    Ok(tx.list_courses(&visible, &query).await?)
}

pub async fn retrieve(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<Course> {
    server.engine.require(principal, Action::Retrieve, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    tx.get_course(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Course"))
}

pub async fn create(server: &RecordsServer, principal: &Principal, request: CourseRequest) -> ApiResult<Course> {
    server.engine.require(principal, Action::Create, KIND)?;

    let mut errors = FieldErrors::new();
    errors.check(&request);
    let code = errors.required_text("code", request.code);
    let title = errors.required_text("title", request.title);
    errors.into_result()?;
    let injection = server.engine.injection(principal, Action::Create, KIND)?;
    let (Some(code), Some(title)) = (code, title) else {
        return Err(ApiError::bad_request("Invalid input."));
    };

    let mut tx = server.begin().await?;
    let course = tx
        .insert_course(NewCourse {
            code,
            title,
            description: request.description.unwrap_or_default(),
            teacher_id: injection.apply(request.teacher_id.flatten()),
            is_active: request.is_active.unwrap_or(true),
        })
        .await?;
    tx.commit().await?;

    tracing::info!(course_id = course.id, code = %course.code, created_by = principal.user_id, "Course created");
    Ok(course)
}

fn apply_changes(course: &mut Course, changes: CourseRequest, partial: bool) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    errors.check(&changes);
    let (code, title) = if partial {
        (
            errors.optional_text("code", changes.code),
            errors.optional_text("title", changes.title),
        )
    } else {
        (
            errors.required_text("code", changes.code),
            errors.required_text("title", changes.title),
        )
    };
    errors.into_result()?;

    if let Some(code) = code {
        course.code = code;
    }
    if let Some(title) = title {
        course.title = title;
    }
    match changes.description {
        Some(description) => course.description = description,
        None if !partial => course.description.clear(),
        None => {}
    }
    match changes.teacher_id {
        Some(teacher_id) => course.teacher_id = teacher_id,
        None if !partial => course.teacher_id = None,
        None => {}
    }
    match changes.is_active {
        Some(is_active) => course.is_active = is_active,
        None if !partial => course.is_active = true,
        None => {}
    }
    Ok(())
}

pub async fn update(
    server: &RecordsServer,
    principal: &Principal,
    id: i64,
    request: CourseRequest,
    partial: bool,
) -> ApiResult<Course> {
    server.engine.require(principal, Action::Update, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    let mut course = tx
        .get_course(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Course"))?;
    server.engine.require_object(principal, Action::Update, &course.snapshot())?;

    apply_changes(&mut course, request, partial)?;
    let course = tx.update_course(&course).await?;
    tx.commit().await?;
    Ok(course)
}

pub async fn delete(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<()> {
    server.engine.require(principal, Action::Delete, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    let course = tx
        .get_course(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Course"))?;
    server.engine.require_object(principal, Action::Delete, &course.snapshot())?;

    tx.delete_course(id).await?;
    tx.commit().await?;
    Ok(())
}
