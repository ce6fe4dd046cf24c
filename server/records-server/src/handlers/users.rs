use access_control::{Action, ResourceKind, Role};
use axum::{extract::State, http::StatusCode, Json};
use database_layer::{User, UserFilter, UserQuery};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{api_success, ApiError, ApiErrorResponse, ApiResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::server::RecordsServer;
use crate::services::users::{self, CreateUserRequest, UpdateUserRequest};
use crate::types::{IdPath, PaginationParams, Payload, QueryParams};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Matches username, email, first and last name
    pub search: Option<String>,
    /// Comma separated; `username`, `email`, `date_joined`, `role`, `-` for descending
    pub ordering: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

impl UserListParams {
    fn into_query(self) -> ApiResult<(PaginationParams, UserQuery)> {
        let role = self
            .role
            .as_deref()
            .map(str::parse::<Role>)
            .transpose()
            .map_err(|err| ApiError::field("role", err.to_string()))?;

        let pagination = PaginationParams::new(self.page, self.page_size);
        let query = UserQuery::new(UserFilter {
            username: self.username,
            email: self.email,
            role,
            is_active: self.is_active,
        })
        .with_search(self.search)
        .with_ordering(self.ordering.as_deref());
        Ok((pagination, pagination.apply(query)))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(UserListParams),
    responses(
        (status = 200, description = "Users retrieved", body = Vec<User>),
        (status = 401, description = "Unauthenticated", body = ApiErrorResponse),
        (status = 403, description = "Administrators only", body = ApiErrorResponse)
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    params: Result<QueryParams<UserListParams>, ApiError>,
) -> ApiResult<Json<ApiResponse<Vec<User>>>> {
    // Non-admins are refused before their query string is looked at
    server.engine.require(&current.principal, Action::List, ResourceKind::User)?;
    let QueryParams(params) = params?;
    let (pagination, query) = params.into_query()?;
    let page = users::list(&server, &current.principal, query).await?;
    Ok(Json(pagination.wrap_response(page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 409, description = "Username or email taken", body = ApiErrorResponse)
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    Payload(request): Payload<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<User>>)> {
    let user = users::create(&server, &current.principal, request).await?;
    Ok((StatusCode::CREATED, Json(api_success(user))))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User retrieved", body = User),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "User not found", body = ApiErrorResponse)
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = users::retrieve(&server, &current.principal, id).await?;
    Ok(Json(api_success(user)))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User replaced", body = User),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 404, description = "User not found", body = ApiErrorResponse),
        (status = 409, description = "Username or email taken", body = ApiErrorResponse)
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn replace_user(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<UpdateUserRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = users::update(&server, &current.principal, id, request, false).await?;
    Ok(Json(api_success(user)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 404, description = "User not found", body = ApiErrorResponse)
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn patch_user(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
    Payload(request): Payload<UpdateUserRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = users::update(&server, &current.principal, id, request, true).await?;
    Ok(Json(api_success(user)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Administrators only", body = ApiErrorResponse),
        (status = 404, description = "User not found", body = ApiErrorResponse)
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    IdPath(id): IdPath,
) -> ApiResult<StatusCode> {
    users::delete(&server, &current.principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
