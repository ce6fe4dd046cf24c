use axum::{extract::State, http::StatusCode, Json};
use database_layer::{Course, CourseFilter, CourseQuery};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{api_success, ApiErrorResponse, ApiResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::server::RecordsServer;
use crate::services::courses::{self, CourseRequest};
use crate::types::{IdPath, PaginationParams, Payload, QueryParams};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CourseListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Matches title, code and description
    pub search: Option<String>,
    /// `code`, `title` or `created_at`, `-` for descending
    pub ordering: Option<String>,
    pub title: Option<String>,
    pub code: Option<String>,
    /// Teacher profile ID
    pub teacher: Option<i64>,
    pub is_active: Option<bool>,
}

impl CourseListParams {
    fn into_query(self) -> (PaginationParams, CourseQuery) {
        let pagination = PaginationParams::new(self.page, self.page_size);
        let query = CourseQuery::new(CourseFilter {
            title: self.title,
            code: self.code,
            teacher: self.teacher,
            is_active: self.is_active,
        })
        .with_search(self.search)
        .with_ordering(self.ordering.as_deref());
        (pagination, pagination.apply(query))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/courses",
    params(CourseListParams),
    responses(
        (status = 200, description = "Visible courses", body = Vec<Course>),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse)
    ),
    tag = "courses",
    security(("bearer_auth" = []))
)]
pub async fn list_courses(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    QueryParams(params): QueryParams<CourseListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Course>>>> {
    let (pagination, query) = params.into_query();
    let page = courses::list(&server, &current.principal, query).await?;
    Ok(Json(pagination.wrap_response(page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/courses",
    request_body = CourseRequest,
    responses(
        (status = 201, description = "Course created", body = Course),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators and teachers only", body = ApiErrorResponse),
        (status = 404, description = "Teacher profile not found", body = ApiErrorResponse),
        (status = 409, description = "Course code taken", body = ApiErrorResponse)
    ),
    tag = "courses",
    security(("bearer_auth" = []))
)]
pub async fn create_course(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    Payload(request): Payload<CourseRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Course>>)> {
    let course = courses::create(&server, &current.principal, request).await?;
    Ok((StatusCode::CREATED, Json(api_success(course))))
}

#[utoipa::path(
    get,
    path = "/api/v1/courses/{id}",
    params(("id" = i64, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Course", body = Course),
        (status = 404, description = "Not found or not visible", body = ApiErrorResponse)
    ),
    tag = "courses",
    security(("bearer_auth" = []))
)]
pub async fn get_course(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<ApiResponse<Course>>> {
    let course = courses::retrieve(&server, &current.principal, id).await?;
    Ok(Json(api_success(course)))
}

#[utoipa::path(
    put,
    path = "/api/v1/courses/{id}",
    params(("id" = i64, Path, description = "Course ID")),
    request_body = CourseRequest,
    responses(
        (status = 200, description = "Course replaced", body = Course),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "courses",
    security(("bearer_auth" = []))
)]
pub async fn replace_course(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<CourseRequest>,
) -> ApiResult<Json<ApiResponse<Course>>> {
    let course = courses::update(&server, &current.principal, id, request, false).await?;
    Ok(Json(api_success(course)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/courses/{id}",
    params(("id" = i64, Path, description = "Course ID")),
    request_body = CourseRequest,
    responses(
        (status = 200, description = "Course updated", body = Course),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "courses",
    security(("bearer_auth" = []))
)]
pub async fn patch_course(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<CourseRequest>,
) -> ApiResult<Json<ApiResponse<Course>>> {
    let course = courses::update(&server, &current.principal, id, request, true).await?;
    Ok(Json(api_success(course)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/courses/{id}",
    params(("id" = i64, Path, description = "Course ID")),
    responses(
        (status = 204, description = "Course deleted"),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "courses",
    security(("bearer_auth" = []))
)]
pub async fn delete_course(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<StatusCode> {
    courses::delete(&server, &current.principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
