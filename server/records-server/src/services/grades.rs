//! Grades
//!
//! Teachers may only grade students enrolled in a course they teach. The
//! check needs the target course and the enrollment state, so both are read
//! inside the write transaction before the object-level decision is made.

use access_control::{Action, Principal, ProfileId, ResourceKind, RowFilter, Snapshot};
use database_layer::{Grade, GradeQuery, GradeValue, NewGrade, Page, StoreTx};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::server::RecordsServer;
use crate::validation::{double_option, FieldErrors};

const KIND: ResourceKind = ResourceKind::Grade;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct GradeRequest {
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
    /// Forced to the caller's own profile when a teacher writes the grade
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub teacher_id: Option<Option<i64>>,
    /// One of A, B, C, D, F
    #[schema(example = "A")]
    pub value: Option<String>,
}

fn parse_value(errors: &mut FieldErrors, raw: Option<String>) -> Option<GradeValue> {
    match raw?.parse::<GradeValue>() {
        Ok(value) => Some(value),
        Err(err) => {
            errors.add("value", err.to_string());
            None
        }
    }
}

fn invalid_pk(field: &'static str, id: i64) -> ApiError {
    ApiError::field(field, format!("Invalid pk \"{id}\" - object does not exist."))
}

/// Resolve the grade's course and student and describe it for the object check
async fn grade_snapshot(tx: &mut dyn StoreTx, student_id: ProfileId, course_id: i64) -> ApiResult<Snapshot> {
    let course = tx
        .get_course(course_id, &RowFilter::All)
        .await?
        .ok_or_else(|| invalid_pk("course_id", course_id))?;
    tx.get_student(student_id, &RowFilter::All)
        .await?
        .ok_or_else(|| invalid_pk("student_id", student_id))?;
    let student_enrolled = tx.is_enrolled(student_id, course_id).await?;

    Ok(Snapshot::Grade {
        student: student_id,
        course_teacher: course.teacher_id,
        student_enrolled,
    })
}

pub async fn list(server: &RecordsServer, principal: &Principal, query: GradeQuery) -> ApiResult<Page<Grade>> {
    server.engine.require(principal, Action::List, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    Ok(tx.list_grades(&visible, &query).await?)
}

pub async fn retrieve(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<Grade> {
    server.engine.require(principal, Action::Retrieve, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    tx.get_grade(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Grade"))
}

pub async fn create(server: &RecordsServer, principal: &Principal, request: GradeRequest) -> ApiResult<Grade> {
    server.engine.require(principal, Action::Create, KIND)?;

    let mut errors = FieldErrors::new();
    let student_id = errors.required("student_id", request.student_id);
    let course_id = errors.required("course_id", request.course_id);
    let value = match request.value {
        Some(raw) => parse_value(&mut errors, Some(raw)),
        None => errors.required::<GradeValue>("value", None),
    };
    errors.into_result()?;
    let injection = server.engine.injection(principal, Action::Create, KIND)?;
    let (Some(student_id), Some(course_id), Some(value)) = (student_id, course_id, value) else {
        return Err(ApiError::bad_request("Invalid input."));
    };

    let mut tx = server.begin().await?;
    let snapshot = grade_snapshot(tx.as_mut(), student_id, course_id).await?;
    server.engine.require_object(principal, Action::Create, &snapshot)?;

    let grade = tx
        .insert_grade(NewGrade {
            student_id,
            course_id,
            teacher_id: injection.apply(request.teacher_id.flatten()),
            value,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(
        grade_id = grade.id,
        student_id,
        course_id,
        graded_by = principal.user_id,
        "Grade recorded"
    );
    Ok(grade)
}

fn apply_changes(grade: &mut Grade, changes: GradeRequest, partial: bool) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    let (student_id, course_id) = if partial {
        (changes.student_id, changes.course_id)
    } else {
        (
            errors.required("student_id", changes.student_id),
            errors.required("course_id", changes.course_id),
        )
    };
    let value = match changes.value {
        Some(raw) => parse_value(&mut errors, Some(raw)),
        None if !partial => errors.required::<GradeValue>("value", None),
        None => None,
    };
    errors.into_result()?;

    if let Some(student_id) = student_id {
        grade.student_id = student_id;
    }
    if let Some(course_id) = course_id {
        grade.course_id = course_id;
    }
    if let Some(value) = value {
        grade.value = value;
    }
    match changes.teacher_id {
        Some(teacher_id) => grade.teacher_id = teacher_id,
        None if !partial => grade.teacher_id = None,
        None => {}
    }
    Ok(())
}

pub async fn update(
    server: &RecordsServer,
    principal: &Principal,
    id: i64,
    request: GradeRequest,
    partial: bool,
) -> ApiResult<Grade> {
    server.engine.require(principal, Action::Update, KIND)?;
    let injection = server.engine.injection(principal, Action::Update, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    let mut grade = tx
        .get_grade(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Grade"))?;

    apply_changes(&mut grade, request, partial)?;
    grade.teacher_id = injection.apply(grade.teacher_id);

    let snapshot = grade_snapshot(tx.as_mut(), grade.student_id, grade.course_id).await?;
    server.engine.require_object(principal, Action::Update, &snapshot)?;

    let grade = tx.update_grade(&grade).await?;
    tx.commit().await?;
    Ok(grade)
}

pub async fn delete(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<()> {
    server.engine.require(principal, Action::Delete, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    tx.get_grade(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Grade"))?;
    tx.delete_grade(id).await?;
    tx.commit().await?;
    Ok(())
}
