use axum::{extract::State, http::StatusCode, Json};
use database_layer::{TeacherFilter, TeacherQuery, TeacherRecord};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{api_success, ApiErrorResponse, ApiResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::server::RecordsServer;
use crate::services::teachers::{self, CreateTeacherRequest, UpdateTeacherRequest};
use crate::types::{IdPath, PaginationParams, Payload, QueryParams};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeacherListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Matches username, email and department
    pub search: Option<String>,
    /// `department`, `created_at` or `username`, `-` for descending
    pub ordering: Option<String>,
    pub department: Option<String>,
    pub username: Option<String>,
}

impl TeacherListParams {
    fn into_query(self) -> (PaginationParams, TeacherQuery) {
        let pagination = PaginationParams::new(self.page, self.page_size);
        let query = TeacherQuery::new(TeacherFilter {
            department: self.department,
            username: self.username,
        })
        .with_search(self.search)
        .with_ordering(self.ordering.as_deref());
        (pagination, pagination.apply(query))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/teachers",
    params(TeacherListParams),
    responses(
        (status = 200, description = "Visible teacher profiles", body = Vec<TeacherRecord>),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse)
    ),
    tag = "teachers",
    security(("bearer_auth" = []))
)]
pub async fn list_teachers(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    QueryParams(params): QueryParams<TeacherListParams>,
) -> ApiResult<Json<ApiResponse<Vec<TeacherRecord>>>> {
    let (pagination, query) = params.into_query();
    let page = teachers::list(&server, &current.principal, query).await?;
    Ok(Json(pagination.wrap_response(page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/teachers",
    request_body = CreateTeacherRequest,
    responses(
        (status = 201, description = "Teacher profile created", body = TeacherRecord),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 409, description = "Profile exists", body = ApiErrorResponse)
    ),
    tag = "teachers",
    security(("bearer_auth" = []))
)]
pub async fn create_teacher(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    Payload(request): Payload<CreateTeacherRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<TeacherRecord>>)> {
    let record = teachers::create(&server, &current.principal, request).await?;
    Ok((StatusCode::CREATED, Json(api_success(record))))
}

#[utoipa::path(
    get,
    path = "/api/v1/teachers/{id}",
    params(("id" = i64, Path, description = "Teacher profile ID")),
    responses(
        (status = 200, description = "Teacher profile", body = TeacherRecord),
        (status = 404, description = "Not found or not visible", body = ApiErrorResponse)
    ),
    tag = "teachers",
    security(("bearer_auth" = []))
)]
pub async fn get_teacher(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<ApiResponse<TeacherRecord>>> {
    let record = teachers::retrieve(&server, &current.principal, id).await?;
    Ok(Json(api_success(record)))
}

#[utoipa::path(
    put,
    path = "/api/v1/teachers/{id}",
    params(("id" = i64, Path, description = "Teacher profile ID")),
    request_body = UpdateTeacherRequest,
    responses(
        (status = 200, description = "Teacher profile replaced", body = TeacherRecord),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "teachers",
    security(("bearer_auth" = []))
)]
pub async fn replace_teacher(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<UpdateTeacherRequest>,
) -> ApiResult<Json<ApiResponse<TeacherRecord>>> {
    let record = teachers::update(&server, &current.principal, id, request, false).await?;
    Ok(Json(api_success(record)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/teachers/{id}",
    params(("id" = i64, Path, description = "Teacher profile ID")),
    request_body = UpdateTeacherRequest,
    responses(
        (status = 200, description = "Teacher profile updated", body = TeacherRecord),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "teachers",
    security(("bearer_auth" = []))
)]
pub async fn patch_teacher(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<UpdateTeacherRequest>,
) -> ApiResult<Json<ApiResponse<TeacherRecord>>> {
    let record = teachers::update(&server, &current.principal, id, request, true).await?;
    Ok(Json(api_success(record)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/teachers/{id}",
    params(("id" = i64, Path, description = "Teacher profile ID")),
    responses(
        (status = 204, description = "Teacher profile deleted"),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "teachers",
    security(("bearer_auth" = []))
)]
pub async fn delete_teacher(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<StatusCode> {
    teachers::delete(&server, &current.principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/teachers/me",
    responses(
        (status = 200, description = "Own teacher profile", body = TeacherRecord),
        (status = 403, description = "Caller is not a teacher", body = ApiErrorResponse),
        (status = 404, description = "No linked teacher profile", body = ApiErrorResponse)
    ),
    tag = "teachers",
    security(("bearer_auth" = []))
)]
pub async fn get_my_teacher_profile(
    State(server): State<RecordsServer>,
    current: CurrentUser,
) -> ApiResult<Json<ApiResponse<TeacherRecord>>> {
    let record = teachers::me(&server, &current.principal).await?;
    Ok(Json(api_success(record)))
}

/// Serves both PUT and PATCH; omitted fields are left unchanged
#[utoipa::path(
    patch,
    path = "/api/v1/teachers/me",
    request_body = UpdateTeacherRequest,
    responses(
        (status = 200, description = "Own teacher profile updated", body = TeacherRecord),
        (status = 403, description = "Caller is not a teacher", body = ApiErrorResponse),
        (status = 404, description = "No linked teacher profile", body = ApiErrorResponse)
    ),
    tag = "teachers",
    security(("bearer_auth" = []))
)]
pub async fn update_my_teacher_profile(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    Payload(request): Payload<UpdateTeacherRequest>,
) -> ApiResult<Json<ApiResponse<TeacherRecord>>> {
    let record = teachers::update_me(&server, &current.principal, request).await?;
    Ok(Json(api_success(record)))
}
