//! Token issuance and optional self-registration

use access_control::Role;
use axum::{extract::State, http::StatusCode, Json};
use database_layer::User;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{password, IssuedToken, RefreshedToken};
use crate::error::{api_success, ApiError, ApiErrorResponse, ApiResponse, ApiResult};
use crate::server::RecordsServer;
use crate::services::users::{insert_account, validate_account, CreateUserRequest};
use crate::types::Payload;

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/api/v1/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token issued", body = IssuedToken),
        (status = 400, description = "Malformed request", body = ApiErrorResponse),
        (status = 401, description = "Invalid credentials or inactive account", body = ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn obtain_token(
    State(server): State<RecordsServer>,
    Payload(request): Payload<TokenRequest>,
) -> ApiResult<Json<ApiResponse<IssuedToken>>> {
    let mut tx = server.begin().await?;
    let user = tx.find_user_by_username(&request.username).await?;
    drop(tx);

    let Some(user) = user else {
        password::verify_dummy_blocking(&request.password).await?;
        tracing::info!(username = %request.username, "Token request for unknown account");
        return Err(ApiError::authentication(BAD_CREDENTIALS));
    };

    if !password::verify_password_blocking(&request.password, &user.password_hash).await? {
        tracing::info!(user_id = user.id, "Token request with wrong password");
        return Err(ApiError::authentication(BAD_CREDENTIALS));
    }
    if !user.is_active {
        tracing::info!(user_id = user.id, "Token request for inactive account");
        return Err(ApiError::authentication(BAD_CREDENTIALS));
    }

    let token = server.tokens.issue(&user)?;
    tracing::info!(user_id = user.id, role = %user.role, "Token issued");
    Ok(Json(api_success(token)))
}

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/api/v1/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Access token issued", body = RefreshedToken),
        (status = 401, description = "Invalid or expired refresh token", body = ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(server): State<RecordsServer>,
    Payload(request): Payload<RefreshRequest>,
) -> ApiResult<Json<ApiResponse<RefreshedToken>>> {
    let claims = server.tokens.verify_refresh(&request.refresh)?;
    let user_id = claims.user_id()?;

    let mut tx = server.begin().await?;
    let user = tx.get_user(user_id).await?;
    drop(tx);

    // Claims are re-signed from the stored user, not copied from the refresh token
    let Some(user) = user.filter(|u| u.is_active) else {
        tracing::info!(user_id, "Refresh for missing or inactive account");
        return Err(ApiError::authentication("User not found"));
    };

    let token = server.tokens.refresh(&user)?;
    tracing::debug!(user_id = user.id, "Access token refreshed");
    Ok(Json(api_success(token)))
}

/// Create a base or student account without credentials
///
/// Answers 404 unless `auth.allow_self_registration` is enabled.
#[utoipa::path(
    post,
    path = "/api/v1/register",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Validation failed", body = ApiErrorResponse),
        (status = 404, description = "Self-registration disabled", body = ApiErrorResponse),
        (status = 409, description = "Username or email taken", body = ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(server): State<RecordsServer>,
    Payload(request): Payload<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<User>>)> {
    if !server.config.auth.allow_self_registration {
        return Err(ApiError::not_found("Resource"));
    }

    let account = validate_account(request, Role::Student, &[Role::Base, Role::Student])?
        .into_new_user()
        .await?;
    let mut tx = server.begin().await?;
    let user = insert_account(tx.as_mut(), account).await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, role = %user.role, "Account self-registered");
    Ok((StatusCode::CREATED, Json(api_success(user))))
}
