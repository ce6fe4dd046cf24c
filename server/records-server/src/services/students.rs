//! Student profiles, including the `me` self-service endpoints

use access_control::{Action, Principal, ProfileKind, ResourceKind, Role};
use chrono::NaiveDate;
use database_layer::{NewStudentProfile, Page, StoreTx, StudentProfile, StudentQuery, StudentRecord};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::server::RecordsServer;
use crate::validation::{is_valid_phone_number, FieldErrors, PHONE_NUMBER_MESSAGE};

const KIND: ResourceKind = ResourceKind::StudentProfile;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateStudentRequest {
    /// Existing student-role user without a profile
    pub user_id: Option<i64>,
    #[validate(length(max = 20, message = "Ensure this field has no more than 20 characters."))]
    pub enrollment_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    #[validate(length(max = 17, message = "Ensure this field has no more than 17 characters."))]
    pub phone_number: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateStudentRequest {
    #[validate(length(max = 20, message = "Ensure this field has no more than 20 characters."))]
    pub enrollment_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[validate(length(max = 17, message = "Ensure this field has no more than 17 characters."))]
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

fn check_phone(errors: &mut FieldErrors, phone: Option<&str>) {
    if let Some(phone) = phone {
        if !is_valid_phone_number(phone) {
            errors.add("phone_number", PHONE_NUMBER_MESSAGE);
        }
    }
}

/// Merge `changes` into `profile`; with `partial` false the required fields must be present
fn apply_changes(profile: &mut StudentProfile, changes: UpdateStudentRequest, partial: bool) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    errors.check(&changes);
    check_phone(&mut errors, changes.phone_number.as_deref());

    let (enrollment_number, date_of_birth) = if partial {
        (
            errors.optional_text("enrollment_number", changes.enrollment_number),
            changes.date_of_birth,
        )
    } else {
        (
            errors.required_text("enrollment_number", changes.enrollment_number),
            errors.required("date_of_birth", changes.date_of_birth),
        )
    };
    errors.into_result()?;

    if let Some(number) = enrollment_number {
        profile.enrollment_number = number;
    }
    if let Some(date) = date_of_birth {
        profile.date_of_birth = date;
    }
    if let Some(phone) = changes.phone_number {
        profile.phone_number = phone;
    } else if !partial {
        profile.phone_number.clear();
    }
    if let Some(address) = changes.address {
        profile.address = address;
    } else if !partial {
        profile.address.clear();
    }
    Ok(())
}

pub async fn list(server: &RecordsServer, principal: &Principal, query: StudentQuery) -> ApiResult<Page<StudentRecord>> {
    server.engine.require(principal, Action::List, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    Ok(tx.list_students(&visible, &query).await?)
}

async fn fetch_visible(
    server: &RecordsServer,
    tx: &mut dyn StoreTx,
    principal: &Principal,
    id: i64,
) -> ApiResult<StudentRecord> {
    let visible = server.engine.visibility(principal, KIND);
    tx.get_student(id, &visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Student profile"))
}

pub async fn retrieve(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<StudentRecord> {
    server.engine.require(principal, Action::Retrieve, KIND)?;

    let mut tx = server.begin().await?;
    fetch_visible(server, tx.as_mut(), principal, id).await
}

pub async fn create(
    server: &RecordsServer,
    principal: &Principal,
    request: CreateStudentRequest,
) -> ApiResult<StudentRecord> {
    server.engine.require(principal, Action::Create, KIND)?;

    let mut errors = FieldErrors::new();
    errors.check(&request);
    check_phone(&mut errors, Some(&request.phone_number));
    let user_id = errors.required("user_id", request.user_id);
    let enrollment_number = errors.required_text("enrollment_number", request.enrollment_number);
    let date_of_birth = errors.required("date_of_birth", request.date_of_birth);
    errors.into_result()?;
    let (Some(user_id), Some(enrollment_number), Some(date_of_birth)) = (user_id, enrollment_number, date_of_birth)
    else {
        return Err(ApiError::bad_request("Invalid input."));
    };

    let mut tx = server.begin().await?;
    let user = tx.get_user(user_id).await?.ok_or_else(|| {
        ApiError::field("user_id", format!("Invalid pk \"{user_id}\" - object does not exist."))
    })?;
    if user.role != Role::Student {
        return Err(ApiError::field("user_id", "User must have the student role."));
    }

    let record = tx
        .insert_student(NewStudentProfile {
            user_id,
            enrollment_number,
            date_of_birth,
            phone_number: request.phone_number,
            address: request.address,
        })
        .await?;
    tx.commit().await?;
    Ok(record)
}

pub async fn update(
    server: &RecordsServer,
    principal: &Principal,
    id: i64,
    request: UpdateStudentRequest,
    partial: bool,
) -> ApiResult<StudentRecord> {
    server.engine.require(principal, Action::Update, KIND)?;

    let mut tx = server.begin().await?;
    let mut profile = fetch_visible(server, tx.as_mut(), principal, id).await?.profile;
    apply_changes(&mut profile, request, partial)?;

    let record = tx.update_student(&profile).await?;
    tx.commit().await?;
    Ok(record)
}

pub async fn delete(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<()> {
    server.engine.require(principal, Action::Delete, KIND)?;

    let mut tx = server.begin().await?;
    fetch_visible(server, tx.as_mut(), principal, id).await?;
    tx.delete_student(id).await?;
    tx.commit().await?;
    Ok(())
}

// =============================================================================
// Self service
// =============================================================================

async fn fetch_own(tx: &mut dyn StoreTx, profile_id: i64) -> ApiResult<StudentRecord> {
    tx.get_student(profile_id, &access_control::RowFilter::OwnStudent(profile_id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} profile", ProfileKind::Student)))
}

pub async fn me(server: &RecordsServer, principal: &Principal) -> ApiResult<StudentRecord> {
    let profile_id = server.engine.self_profile(principal, KIND)?;

    let mut tx = server.begin().await?;
    fetch_own(tx.as_mut(), profile_id).await
}

/// Self-service writes are always partial, for PUT as well as PATCH
pub async fn update_me(
    server: &RecordsServer,
    principal: &Principal,
    request: UpdateStudentRequest,
) -> ApiResult<StudentRecord> {
    let profile_id = server.engine.self_profile(principal, KIND)?;

    let mut tx = server.begin().await?;
    let mut profile = fetch_own(tx.as_mut(), profile_id).await?.profile;
    apply_changes(&mut profile, request, true)?;

    let record = tx.update_student(&profile).await?;
    tx.commit().await?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile() -> StudentProfile {
        let now = Utc::now();
        StudentProfile {
            id: 1,
            user_id: 2,
            enrollment_number: "ENR000002".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            phone_number: "+14155552671".to_string(),
            address: "1 Loop Rd".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_patch_keeps_untouched_fields() {
        let mut p = profile();
        apply_changes(
            &mut p,
            UpdateStudentRequest {
                address: Some("2 Loop Rd".to_string()),
                ..UpdateStudentRequest::default()
            },
            true,
        )
        .unwrap();
        assert_eq!(p.address, "2 Loop Rd");
        assert_eq!(p.phone_number, "+14155552671");
        assert_eq!(p.enrollment_number, "ENR000002");
    }

    #[test]
    fn test_put_requires_enrollment_number_and_birth_date() {
        let mut p = profile();
        let err = apply_changes(&mut p, UpdateStudentRequest::default(), false).unwrap_err();
        let fields = err.field_errors().unwrap();
        assert!(fields.contains_key("enrollment_number"));
        assert!(fields.contains_key("date_of_birth"));
    }

    #[test]
    fn test_bad_phone_number_is_rejected() {
        let mut p = profile();
        let err = apply_changes(
            &mut p,
            UpdateStudentRequest {
                phone_number: Some("call me".to_string()),
                ..UpdateStudentRequest::default()
            },
            true,
        )
        .unwrap_err();
        assert_eq!(err.field_errors().unwrap()["phone_number"], vec![PHONE_NUMBER_MESSAGE]);
    }
}
