use axum::{extract::State, http::StatusCode, Json};
use database_layer::{StudentFilter, StudentQuery, StudentRecord};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{api_success, ApiErrorResponse, ApiResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::server::RecordsServer;
use crate::services::students::{self, CreateStudentRequest, UpdateStudentRequest};
use crate::types::{IdPath, PaginationParams, Payload, QueryParams};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StudentListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Matches enrollment number, username and email
    pub search: Option<String>,
    /// `enrollment_number` or `created_at`, `-` for descending
    pub ordering: Option<String>,
    pub enrollment_number: Option<String>,
    pub username: Option<String>,
}

impl StudentListParams {
    fn into_query(self) -> (PaginationParams, StudentQuery) {
        let pagination = PaginationParams::new(self.page, self.page_size);
        let query = StudentQuery::new(StudentFilter {
            enrollment_number: self.enrollment_number,
            username: self.username,
        })
        .with_search(self.search)
        .with_ordering(self.ordering.as_deref());
        (pagination, pagination.apply(query))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/students",
    params(StudentListParams),
    responses(
        (status = 200, description = "Visible student profiles", body = Vec<StudentRecord>),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse)
    ),
    tag = "students",
    security(("bearer_auth" = []))
)]
pub async fn list_students(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    QueryParams(params): QueryParams<StudentListParams>,
) -> ApiResult<Json<ApiResponse<Vec<StudentRecord>>>> {
    let (pagination, query) = params.into_query();
    let page = students::list(&server, &current.principal, query).await?;
    Ok(Json(pagination.wrap_response(page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/students",
    request_body = CreateStudentRequest,
    responses(
        (status = 201, description = "Student profile created", body = StudentRecord),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 409, description = "Profile or enrollment number exists", body = ApiErrorResponse)
    ),
    tag = "students",
    security(("bearer_auth" = []))
)]
pub async fn create_student(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    Payload(request): Payload<CreateStudentRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<StudentRecord>>)> {
    let record = students::create(&server, &current.principal, request).await?;
    Ok((StatusCode::CREATED, Json(api_success(record))))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/{id}",
    params(("id" = i64, Path, description = "Student profile ID")),
    responses(
        (status = 200, description = "Student profile", body = StudentRecord),
        (status = 404, description = "Not found or not visible", body = ApiErrorResponse)
    ),
    tag = "students",
    security(("bearer_auth" = []))
)]
pub async fn get_student(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<ApiResponse<StudentRecord>>> {
    let record = students::retrieve(&server, &current.principal, id).await?;
    Ok(Json(api_success(record)))
}

#[utoipa::path(
    put,
    path = "/api/v1/students/{id}",
    params(("id" = i64, Path, description = "Student profile ID")),
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Student profile replaced", body = StudentRecord),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "students",
    security(("bearer_auth" = []))
)]
pub async fn replace_student(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<UpdateStudentRequest>,
) -> ApiResult<Json<ApiResponse<StudentRecord>>> {
    let record = students::update(&server, &current.principal, id, request, false).await?;
    Ok(Json(api_success(record)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/students/{id}",
    params(("id" = i64, Path, description = "Student profile ID")),
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Student profile updated", body = StudentRecord),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "students",
    security(("bearer_auth" = []))
)]
pub async fn patch_student(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<UpdateStudentRequest>,
) -> ApiResult<Json<ApiResponse<StudentRecord>>> {
    let record = students::update(&server, &current.principal, id, request, true).await?;
    Ok(Json(api_success(record)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/students/{id}",
    params(("id" = i64, Path, description = "Student profile ID")),
    responses(
        (status = 204, description = "Student profile deleted"),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "students",
    security(("bearer_auth" = []))
)]
pub async fn delete_student(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<StatusCode> {
    students::delete(&server, &current.principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/students/me",
    responses(
        (status = 200, description = "Own student profile", body = StudentRecord),
        (status = 403, description = "Caller is not a student", body = ApiErrorResponse),
        (status = 404, description = "No linked student profile", body = ApiErrorResponse)
    ),
    tag = "students",
    security(("bearer_auth" = []))
)]
pub async fn get_my_student_profile(
    State(server): State<RecordsServer>,
    current: CurrentUser,
) -> ApiResult<Json<ApiResponse<StudentRecord>>> {
    let record = students::me(&server, &current.principal).await?;
    Ok(Json(api_success(record)))
}

/// Serves both PUT and PATCH; omitted fields are left unchanged
#[utoipa::path(
    patch,
    path = "/api/v1/students/me",
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Own student profile updated", body = StudentRecord),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Caller is not a student", body = ApiErrorResponse),
        (status = 404, description = "No linked student profile", body = ApiErrorResponse)
    ),
    tag = "students",
    security(("bearer_auth" = []))
)]
pub async fn update_my_student_profile(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    Payload(request): Payload<UpdateStudentRequest>,
) -> ApiResult<Json<ApiResponse<StudentRecord>>> {
    let record = students::update_me(&server, &current.principal, request).await?;
    Ok(Json(api_success(record)))
}
