use access_control::{Action, ResourceKind};
use axum::{extract::State, http::StatusCode, Json};
use database_layer::{Grade, GradeFilter, GradeQuery, GradeValue};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{api_success, ApiError, ApiErrorResponse, ApiResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::server::RecordsServer;
use crate::services::grades::{self, GradeRequest};
use crate::types::{IdPath, PaginationParams, Payload, QueryParams};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GradeListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// `graded_at` or `value`, `-` for descending
    pub ordering: Option<String>,
    /// Student profile ID
    pub student: Option<i64>,
    /// Course ID
    pub course: Option<i64>,
    /// Teacher profile ID
    pub teacher: Option<i64>,
    /// One of A, B, C, D, F
    pub value: Option<String>,
}

impl GradeListParams {
    fn into_query(self) -> ApiResult<(PaginationParams, GradeQuery)> {
        let value = self
            .value
            .as_deref()
            .map(str::parse::<GradeValue>)
            .transpose()
            .map_err(|err| ApiError::field("value", err.to_string()))?;

        let pagination = PaginationParams::new(self.page, self.page_size);
        let query = GradeQuery::new(GradeFilter {
            student: self.student,
            course: self.course,
            teacher: self.teacher,
            value,
        })
        .with_ordering(self.ordering.as_deref());
        Ok((pagination, pagination.apply(query)))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/grades",
    params(GradeListParams),
    responses(
        (status = 200, description = "Visible grades", body = Vec<Grade>),
        (status = 400, description = "Unknown grade value", body = ApiErrorResponse),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse)
    ),
    tag = "grades",
    security(("bearer_auth" = []))
)]
pub async fn list_grades(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    params: Result<QueryParams<GradeListParams>, ApiError>,
) -> ApiResult<Json<ApiResponse<Vec<Grade>>>> {
    server.engine.require(&current.principal, Action::List, ResourceKind::Grade)?;
    let QueryParams(params) = params?;
    let (pagination, query) = params.into_query()?;
    let page = grades::list(&server, &current.principal, query).await?;
    Ok(Json(pagination.wrap_response(page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/grades",
    request_body = GradeRequest,
    responses(
        (status = 201, description = "Grade recorded", body = Grade),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Not the course teacher, or student not enrolled", body = ApiErrorResponse),
        (status = 404, description = "Teacher profile not found", body = ApiErrorResponse),
        (status = 409, description = "Student already graded in this course", body = ApiErrorResponse)
    ),
    tag = "grades",
    security(("bearer_auth" = []))
)]
pub async fn create_grade(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    Payload(request): Payload<GradeRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Grade>>)> {
    let grade = grades::create(&server, &current.principal, request).await?;
    Ok((StatusCode::CREATED, Json(api_success(grade))))
}

#[utoipa::path(
    get,
    path = "/api/v1/grades/{id}",
    params(("id" = i64, Path, description = "Grade ID")),
    responses(
        (status = 200, description = "Grade", body = Grade),
        (status = 404, description = "Not found or not visible", body = ApiErrorResponse)
    ),
    tag = "grades",
    security(("bearer_auth" = []))
)]
pub async fn get_grade(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<ApiResponse<Grade>>> {
    let grade = grades::retrieve(&server, &current.principal, id).await?;
    Ok(Json(api_success(grade)))
}

#[utoipa::path(
    put,
    path = "/api/v1/grades/{id}",
    params(("id" = i64, Path, description = "Grade ID")),
    request_body = GradeRequest,
    responses(
        (status = 200, description = "Grade replaced", body = Grade),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Not the course teacher, or student not enrolled", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "grades",
    security(("bearer_auth" = []))
)]
pub async fn replace_grade(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<GradeRequest>,
) -> ApiResult<Json<ApiResponse<Grade>>> {
    let grade = grades::update(&server, &current.principal, id, request, false).await?;
    Ok(Json(api_success(grade)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/grades/{id}",
    params(("id" = i64, Path, description = "Grade ID")),
    request_body = GradeRequest,
    responses(
        (status = 200, description = "Grade updated", body = Grade),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Not the course teacher, or student not enrolled", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "grades",
    security(("bearer_auth" = []))
)]
pub async fn patch_grade(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<GradeRequest>,
) -> ApiResult<Json<ApiResponse<Grade>>> {
    let grade = grades::update(&server, &current.principal, id, request, true).await?;
    Ok(Json(api_success(grade)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/grades/{id}",
    params(("id" = i64, Path, description = "Grade ID")),
    responses(
        (status = 204, description = "Grade deleted"),
        (status = 403, description = "Forbidden", body = ApiErrorResponse),
        (status = 404, description = "Not found", body = ApiErrorResponse)
    ),
    tag = "grades",
    security(("bearer_auth" = []))
)]
pub async fn delete_grade(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<StatusCode> {
    grades::delete(&server, &current.principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
