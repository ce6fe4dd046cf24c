use axum::Json;
use database_layer::{StudentProfile, TeacherProfile, User};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{api_success, ApiErrorResponse, ApiResponse, ApiResult};
use crate::middleware::CurrentUser;

/// The caller's account and linked profiles
#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityResponse {
    #[serde(flatten)]
    pub user: User,
    pub student_profile: Option<StudentProfile>,
    pub teacher_profile: Option<TeacherProfile>,
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current identity", body = IdentityResponse),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse)
    ),
    tag = "auth",
    security(("bearer_auth" = []))
)]
pub async fn current_identity(current: CurrentUser) -> ApiResult<Json<ApiResponse<IdentityResponse>>> {
    Ok(Json(api_success(IdentityResponse {
        user: current.user,
        student_profile: current.student_profile,
        teacher_profile: current.teacher_profile,
    })))
}
