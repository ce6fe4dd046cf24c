//! User accounts

use access_control::{Action, Principal, ResourceKind, Role};
use database_layer::{NewUser, Page, StoreTx, User, UserQuery};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::password;
use crate::error::{ApiError, ApiResult};
use crate::server::RecordsServer;
use crate::services::provision::provision_profile;
use crate::validation::{password_problems, FieldErrors};

const KIND: ResourceKind = ResourceKind::User;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub username: Option<String>,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    pub password: Option<String>,
    /// Must repeat `password`
    pub password2: Option<String>,
    /// base, student, teacher or admin; defaults to base
    #[schema(example = "student")]
    pub role: Option<String>,
    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub last_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub username: Option<String>,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[schema(example = "teacher")]
    pub role: Option<String>,
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub first_name: Option<String>,
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
}

fn parse_role(errors: &mut FieldErrors, raw: Option<&str>) -> Option<Role> {
    let raw = raw?;
    match raw.parse::<Role>() {
        Ok(role) => Some(role),
        Err(_) => {
            errors.add("role", format!("\"{raw}\" is not a valid choice."));
            None
        }
    }
}

/// A validated account ready to hash and insert
pub(crate) struct ValidatedAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
}

/// Validate a create request; `allowed_roles` restricts the requested role
pub(crate) fn validate_account(
    request: CreateUserRequest,
    default_role: Role,
    allowed_roles: &[Role],
) -> ApiResult<ValidatedAccount> {
    let mut errors = FieldErrors::new();
    errors.check(&request);

    let username = errors.required_text("username", request.username);
    let email = errors.required_text("email", request.email);
    let password = errors.required_text("password", request.password);
    let password2 = errors.required_text("password2", request.password2);

    if let (Some(password), Some(password2)) = (&password, &password2) {
        if password != password2 {
            errors.add("password", "Password fields didn't match.");
        }
        for problem in password_problems(password) {
            errors.add("password", problem);
        }
    }

    let role = match parse_role(&mut errors, request.role.as_deref()) {
        Some(role) if !allowed_roles.contains(&role) => {
            errors.add("role", format!("\"{role}\" is not a valid choice."));
            None
        }
        Some(role) => Some(role),
        None => Some(default_role),
    };

    errors.into_result()?;

    match (username, email, password, role) {
        (Some(username), Some(email), Some(password), Some(role)) => Ok(ValidatedAccount {
            username,
            email,
            password,
            role,
            first_name: request.first_name,
            last_name: request.last_name,
        }),
        _ => Err(ApiError::bad_request("Invalid input.")),
    }
}

impl ValidatedAccount {
    /// Hash the password; runs before any transaction is opened
    pub(crate) async fn into_new_user(self) -> ApiResult<NewUser> {
        let password_hash = password::hash_password_blocking(&self.password).await?;
        Ok(NewUser {
            username: self.username,
            email: self.email,
            password_hash,
            role: self.role,
            first_name: self.first_name,
            last_name: self.last_name,
            is_active: true,
        })
    }
}

/// Insert an account and provision its profile inside `tx`
pub(crate) async fn insert_account(tx: &mut dyn StoreTx, account: NewUser) -> ApiResult<User> {
    let user = tx.insert_user(account).await?;
    provision_profile(tx, &user).await?;
    Ok(user)
}

pub async fn list(server: &RecordsServer, principal: &Principal, query: UserQuery) -> ApiResult<Page<User>> {
    server.engine.require(principal, Action::List, KIND)?;
    let visible = server.engine.visibility(principal, KIND);

    let mut tx = server.begin().await?;
    Ok(tx.list_users(&visible, &query).await?)
}

pub async fn retrieve(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<User> {
    server.engine.require(principal, Action::Retrieve, KIND)?;

    let mut tx = server.begin().await?;
    tx.get_user(id).await?.ok_or_else(|| ApiError::not_found("User"))
}

pub async fn create(server: &RecordsServer, principal: &Principal, request: CreateUserRequest) -> ApiResult<User> {
    server.engine.require(principal, Action::Create, KIND)?;
    let account = validate_account(request, Role::Base, &Role::ALL)?.into_new_user().await?;

    let mut tx = server.begin().await?;
    let user = insert_account(tx.as_mut(), account).await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, role = %user.role, created_by = principal.user_id, "User created");
    Ok(user)
}

/// PUT when `partial` is false (username and email required), PATCH otherwise.
///
/// Changing the role never creates or removes profiles.
pub async fn update(
    server: &RecordsServer,
    principal: &Principal,
    id: i64,
    request: UpdateUserRequest,
    partial: bool,
) -> ApiResult<User> {
    server.engine.require(principal, Action::Update, KIND)?;

    let mut errors = FieldErrors::new();
    errors.check(&request);
    let role = parse_role(&mut errors, request.role.as_deref());
    let (username, email) = if partial {
        (
            errors.optional_text("username", request.username),
            errors.optional_text("email", request.email),
        )
    } else {
        (
            errors.required_text("username", request.username),
            errors.required_text("email", request.email),
        )
    };
    errors.into_result()?;

    let mut tx = server.begin().await?;
    let mut user = tx.get_user(id).await?.ok_or_else(|| ApiError::not_found("User"))?;

    if let Some(username) = username {
        user.username = username;
    }
    if let Some(email) = email {
        user.email = email;
    }
    if let Some(role) = role {
        user.role = role;
    }
    if let Some(first_name) = request.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = request.last_name {
        user.last_name = last_name;
    }
    if let Some(is_active) = request.is_active {
        user.is_active = is_active;
    }

    let user = tx.update_user(&user).await?;
    tx.commit().await?;
    Ok(user)
}

pub async fn delete(server: &RecordsServer, principal: &Principal, id: i64) -> ApiResult<()> {
    server.engine.require(principal, Action::Delete, KIND)?;

    let mut tx = server.begin().await?;
    if tx.get_user(id).await?.is_none() {
        return Err(ApiError::not_found("User"));
    }

    tx.delete_user(id).await?;
    tx.commit().await?;
    tracing::info!(user_id = id, deleted_by = principal.user_id, "User deleted");
    Ok(())
}
