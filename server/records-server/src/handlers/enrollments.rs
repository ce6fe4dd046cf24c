use axum::{extract::State, http::StatusCode, Json};
use database_layer::{Enrollment, EnrollmentFilter, EnrollmentQuery};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{api_success, ApiErrorResponse, ApiResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::server::RecordsServer;
use crate::services::enrollments::{self, EnrollmentRequest};
use crate::types::{IdPath, PaginationParams, Payload, QueryParams};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EnrollmentListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// `enrolled_at`, `-` for descending
    pub ordering: Option<String>,
    /// Student profile ID
    pub student: Option<i64>,
    /// Course ID
    pub course: Option<i64>,
}

impl EnrollmentListParams {
    fn into_query(self) -> (PaginationParams, EnrollmentQuery) {
        let pagination = PaginationParams::new(self.page, self.page_size);
        let query = EnrollmentQuery::new(EnrollmentFilter {
            student: self.student,
            course: self.course,
        })
        .with_ordering(self.ordering.as_deref());
        (pagination, pagination.apply(query))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/enrollments",
    params(EnrollmentListParams),
    responses(
        (status = 200, description = "Visible enrollments", body = Vec<Enrollment>),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse)
    ),
    tag = "enrollments",
    security(("bearer_auth" = []))
)]
pub async fn list_enrollments(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    QueryParams(params): QueryParams<EnrollmentListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Enrollment>>>> {
    let (pagination, query) = params.into_query();
    let page = enrollments::list(&server, &current.principal, query).await?;
    Ok(Json(pagination.wrap_response(page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/enrollments",
    request_body = EnrollmentRequest,
    responses(
        (status = 201, description = "Enrolled", body = Enrollment),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators and students only", body = ApiErrorResponse),
        (status = 404, description = "Student profile not found", body = ApiErrorResponse),
        (status = 409, description = "Already enrolled", body = ApiErrorResponse)
    ),
    tag = "enrollments",
    security(("bearer_auth" = []))
)]
pub async fn create_enrollment(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    Payload(request): Payload<EnrollmentRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Enrollment>>)> {
    let enrollment = enrollments::create(&server, &current.principal, request).await?;
    Ok((StatusCode::CREATED, Json(api_success(enrollment))))
}

#[utoipa::path(
    get,
    path = "/api/v1/enrollments/{id}",
    params(("id" = i64, Path, description = "Enrollment ID")),
    responses(
        (status = 200, description = "Enrollment", body = Enrollment),
        (status = 404, description = "Not found or not visible", body = ApiErrorResponse)
    ),
    tag = "enrollments",
    security(("bearer_auth" = []))
)]
pub async fn get_enrollment(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<ApiResponse<Enrollment>>> {
    let enrollment = enrollments::retrieve(&server, &current.principal, id).await?;
    Ok(Json(api_success(enrollment)))
}

#[utoipa::path(
    put,
    path = "/api/v1/enrollments/{id}",
    params(("id" = i64, Path, description = "Enrollment ID")),
    request_body = EnrollmentRequest,
    responses(
        (status = 200, description = "Enrollment replaced", body = Enrollment),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse),
        (status = 409, description = "Already enrolled", body = ApiErrorResponse)
    ),
    tag = "enrollments",
    security(("bearer_auth" = []))
)]
pub async fn replace_enrollment(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<EnrollmentRequest>,
) -> ApiResult<Json<ApiResponse<Enrollment>>> {
    let enrollment = enrollments::update(&server, &current.principal, id, request, false).await?;
    Ok(Json(api_success(enrollment)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/enrollments/{id}",
    params(("id" = i64, Path, description = "Enrollment ID")),
    request_body = EnrollmentRequest,
    responses(
        (status = 200, description = "Enrollment updated", body = Enrollment),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse),
        (status = 409, description = "Already enrolled", body = ApiErrorResponse)
    ),
    tag = "enrollments",
    security(("bearer_auth" = []))
)]
pub async fn patch_enrollment(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<EnrollmentRequest>,
) -> ApiResult<Json<ApiResponse<Enrollment>>> {
    let enrollment = enrollments::update(&server, &current.principal, id, request, true).await?;
    Ok(Json(api_success(enrollment)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/enrollments/{id}",
    params(("id" = i64, Path, description = "Enrollment ID")),
    responses(
        (status = 204, description = "Enrollment deleted"),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "enrollments",
    security(("bearer_auth" = []))
)]
pub async fn delete_enrollment(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<StatusCode> {
    enrollments::delete(&server, &current.principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
