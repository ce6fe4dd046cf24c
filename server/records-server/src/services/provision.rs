//! Profile auto-provisioning for newly created users

use access_control::{ProfileId, Role};
use chrono::NaiveDate;
use database_layer::{DatabaseError, DatabaseResult, NewStudentProfile, NewTeacherProfile, StoreTx, User};
use tracing::info;

/// Outcome of [`provision_profile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Student(ProfileId),
    Teacher(ProfileId),
    Unchanged,
}

pub fn default_enrollment_number(user: &User) -> String {
    format!("ENR{:06}", user.id)
}

pub fn default_date_of_birth() -> DatabaseResult<NaiveDate> {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .ok_or_else(|| DatabaseError::InternalError(anyhow::anyhow!("invalid default date of birth")))
}

/// Give a student or teacher user the profile their role implies.
///
/// Runs inside the caller's transaction. Idempotent: an existing profile, or
/// any other role, leaves the store unchanged.
pub async fn provision_profile(tx: &mut dyn StoreTx, user: &User) -> DatabaseResult<Provisioned> {
    match user.role {
        Role::Student => {
            if tx.student_for_user(user.id).await?.is_some() {
                return Ok(Provisioned::Unchanged);
            }
            let record = tx
                .insert_student(NewStudentProfile {
                    user_id: user.id,
                    enrollment_number: default_enrollment_number(user),
                    date_of_birth: default_date_of_birth()?,
                    phone_number: String::new(),
                    address: String::new(),
                })
                .await?;
            info!(user_id = user.id, profile_id = record.profile.id, "Provisioned student profile");
            Ok(Provisioned::Student(record.profile.id))
        }
        Role::Teacher => {
            if tx.teacher_for_user(user.id).await?.is_some() {
                return Ok(Provisioned::Unchanged);
            }
            let record = tx
                .insert_teacher(NewTeacherProfile {
                    user_id: user.id,
                    department: String::new(),
                })
                .await?;
            info!(user_id = user.id, profile_id = record.profile.id, "Provisioned teacher profile");
            Ok(Provisioned::Teacher(record.profile.id))
        }
        Role::Base | Role::Admin => Ok(Provisioned::Unchanged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database_layer::{EntityStore, MemoryStore, NewUser};

    async fn create(tx: &mut dyn StoreTx, username: &str, role: Role) -> User {
        tx.insert_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@school.test"),
            password_hash: String::new(),
            role,
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_student_gets_default_profile_once() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = create(tx.as_mut(), "ada", Role::Student).await;

        let first = provision_profile(tx.as_mut(), &user).await.unwrap();
        assert!(matches!(first, Provisioned::Student(_)));
        assert_eq!(provision_profile(tx.as_mut(), &user).await.unwrap(), Provisioned::Unchanged);

        let record = tx.student_for_user(user.id).await.unwrap().unwrap();
        assert_eq!(record.profile.enrollment_number, format!("ENR{:06}", user.id));
        assert_eq!(record.profile.date_of_birth, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
    }

    #[tokio::test]
    async fn test_teacher_gets_blank_department() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = create(tx.as_mut(), "turing", Role::Teacher).await;

        assert!(matches!(
            provision_profile(tx.as_mut(), &user).await.unwrap(),
            Provisioned::Teacher(_)
        ));
        let record = tx.teacher_for_user(user.id).await.unwrap().unwrap();
        assert_eq!(record.profile.department, "");
    }

    #[tokio::test]
    async fn test_base_and_admin_are_untouched() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for (name, role) in [("visitor", Role::Base), ("root", Role::Admin)] {
            let user = create(tx.as_mut(), name, role).await;
            assert_eq!(provision_profile(tx.as_mut(), &user).await.unwrap(), Provisioned::Unchanged);
            assert!(tx.student_for_user(user.id).await.unwrap().is_none());
            assert!(tx.teacher_for_user(user.id).await.unwrap().is_none());
        }
    }
}
