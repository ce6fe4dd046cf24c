//! Teacher profiles

use access_control::{Action, Principal, ProfileKind, ResourceKind, Role, RowFilter};
use database_layer::{NewTeacherProfile, Page, StoreTx, TeacherQuery, TeacherRecord};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::server::RecordsServer;
use crate::validation::FieldErrors;

const KIND: ResourceKind = ResourceKind::TeacherProfile;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTeacherRequest {
    /// Existing teacher-role user without a profile
    pub user_id: Option<i64>,
    #[serde(default)]
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub department: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTeacherRequest {
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub department: Option<String>,
}

pub async fn list(server: &RecordsServer, principal: &Principal, query: TeacherQuery) -> ApiResult<Page<TeacherRecord>> {
    server.engine.require(principal, Action::List, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    Ok(tx.list_teachers(&visible, &query).await?)
}

async fn fetch_visible(
    server: &RecordsServer,
    tx: &mut dyn StoreTx,
    principal: &Principal,
    id: i64,
) -> ApiResult<TeacherRecord> {
    let visible = server.engine.visibility(principal, KIND);
    tx.get_teacher(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Teacher profile"))
}

pub async fn retrieve(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<TeacherRecord> {
    server.engine.require(principal, Action::Retrieve, KIND)?;

    let mut tx = server.begin().await?;
    fetch_visible(server, tx.as_mut(), principal, id).await
}

pub async fn create(
    server: &RecordsServer,
    principal: &Principal,
    request: CreateTeacherRequest,
) -> ApiResult<TeacherRecord> {
    server.engine.require(principal, Action::Create, KIND)?;

    let mut errors = FieldErrors::new();
    errors.check(&request);
    let user_id = errors.required("user_id", request.user_id);
    errors.into_result()?;
    let Some(user_id) = user_id else {
        return Err(ApiError::bad_request("Invalid input."));
    };

    let mut tx = server.begin().await?;
    let user = tx.get_user(user_id).await?.ok_or_else(|| {
        ApiError::field("user_id", format!("Invalid pk \"{user_id}\" - object does not exist."))
    })?;
    if user.role != Role::Teacher {
        return Err(ApiError::field("user_id", "User must have the teacher role."));
    }

    let record = tx
        .insert_teacher(NewTeacherProfile {
            user_id,
            department: request.department,
        })
        .await?;
    tx.commit().await?;
    Ok(record)
}

async fn write_department(
    tx: &mut dyn StoreTx,
    mut record: TeacherRecord,
    request: UpdateTeacherRequest,
    partial: bool,
) -> ApiResult<TeacherRecord> {
    let mut errors = FieldErrors::new();
    errors.check(&request);
    errors.into_result()?;

    match request.department {
        Some(department) => record.profile.department = department,
        None if !partial => record.profile.department.clear(),
        None => {}
    }
    Ok(tx.update_teacher(&record.profile).await?)
}

pub async fn update(
    server: &RecordsServer,
    principal: &Principal,
    id: i64,
    request: UpdateTeacherRequest,
    partial: bool,
) -> ApiResult<TeacherRecord> {
    server.engine.require(principal, Action::Update, KIND)?;

    let mut tx = server.begin().await?;
    let record = fetch_visible(server, tx.as_mut(), principal, id).await?;
    server
        .engine
        .require_object(principal, Action::Update, &record.profile.snapshot())?;

    let record = write_department(tx.as_mut(), record, request, partial).await?;
    tx.commit().await?;
    Ok(record)
}

pub async fn delete(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<()> {
    server.engine.require(principal, Action::Delete, KIND)?;

    let mut tx = server.begin().await?;
    let record = fetch_visible(server, tx.as_mut(), principal, id).await?;
    server
        .engine
        .require_object(principal, Action::Delete, &record.profile.snapshot())?;

    tx.delete_teacher(id).await?;
    tx.commit().await?;
    Ok(())
}

// =============================================================================
// Self service
// =============================================================================

async fn fetch_own(tx: &mut dyn StoreTx, profile_id: i64) -> ApiResult<TeacherRecord> {
    tx.get_teacher(profile_id, &RowFilter::OwnTeacher(profile_id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} profile", ProfileKind::Teacher)))
}

pub async fn me(server: &RecordsServer, principal: &Principal) -> ApiResult<TeacherRecord> {
    let profile_id = server.engine.self_profile(principal, KIND)?;

    let mut tx = server.begin().await?;
    fetch_own(tx.as_mut(), profile_id).await
}

/// Self-service writes are always partial, for PUT as well as PATCH
pub async fn update_me(
    server: &RecordsServer,
    principal: &Principal,
    request: UpdateTeacherRequest,
) -> ApiResult<TeacherRecord> {
    let profile_id = server.engine.self_profile(principal, KIND)?;

    let mut tx = server.begin().await?;
    let record = fetch_own(tx.as_mut(), profile_id).await?;
    let record = write_department(tx.as_mut(), record, request, true).await?;
    tx.commit().await?;
    Ok(record)
}
