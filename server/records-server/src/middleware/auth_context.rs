//! Authentication context extraction
//!
//! Every authenticated handler takes a [`CurrentUser`]. The bearer token only
//! identifies the user; role and profile linkage are re-read from the store on
//! each request, so a role change or deactivation takes effect immediately.

use access_control::Principal;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use database_layer::{StudentProfile, TeacherProfile, User};

use crate::error::ApiError;
use crate::server::RecordsServer;

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub student_profile: Option<StudentProfile>,
    pub teacher_profile: Option<TeacherProfile>,
    pub principal: Principal,
}

impl CurrentUser {
    pub fn new(
        user: User,
        student_profile: Option<StudentProfile>,
        teacher_profile: Option<TeacherProfile>,
    ) -> Self {
        let principal = Principal::new(user.id, user.role)
            .with_student_profile(student_profile.as_ref().map(|p| p.id))
            .with_teacher_profile(teacher_profile.as_ref().map(|p| p.id));

        Self {
            user,
            student_profile,
            teacher_profile,
            principal,
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_token(parts: &Parts) -> Result<&str, ApiError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::authentication("Authentication credentials were not provided."))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::authentication("Invalid Authorization header format. Expected: Bearer <token>"))
}

#[async_trait]
impl FromRequestParts<RecordsServer> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, server: &RecordsServer) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let claims = server.tokens.verify(token)?;
        let user_id = claims.user_id()?;

        let mut tx = server.begin().await?;
        let user = tx
            .get_user(user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| ApiError::authentication("User not found or inactive"))?;

        let student_profile = tx.student_for_user(user.id).await?.map(|r| r.profile);
        let teacher_profile = tx.teacher_for_user(user.id).await?.map(|r| r.profile);
        drop(tx);

        Ok(CurrentUser::new(user, student_profile, teacher_profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use access_control::Role;
    use axum::http::Request;
    use chrono::Utc;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/me");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token(&parts_with(Some("Bearer abc.def"))).unwrap(), "abc.def");
        assert!(extract_token(&parts_with(None)).is_err());
        assert!(extract_token(&parts_with(Some("Basic dXNlcg=="))).is_err());
        assert!(extract_token(&parts_with(Some("Bearer "))).is_err());
    }

    #[test]
    fn test_principal_carries_linked_profiles() {
        let now = Utc::now();
        let user = User {
            id: 5,
            username: "ada".to_string(),
            email: "ada@school.test".to_string(),
            role: Role::Student,
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            date_joined: now,
            password_hash: String::new(),
        };
        let profile = StudentProfile {
            id: 11,
            user_id: 5,
            enrollment_number: "ENR000005".to_string(),
            date_of_birth: chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            phone_number: String::new(),
            address: String::new(),
            created_at: now,
            updated_at: now,
        };

        let current = CurrentUser::new(user, Some(profile), None);
        assert_eq!(current.principal.acting_student(), Some(11));
        assert_eq!(current.principal.acting_teacher(), None);
    }
}
