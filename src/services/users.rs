//! User account management service

use crate::{
    error::{AppError, AppResult},
    models::user::{UpdateUser, User, UserChanges},
    policy::{Action, Subject},
    repository::Repository,
};

use super::auth::hash_password;

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list(&self, subject: &Subject) -> AppResult<Vec<User>> {
        subject.require(Action::ListUsers)?;
        self.repository.users.list().await
    }

    pub async fn get(&self, subject: &Subject, id: i32) -> AppResult<User> {
        subject.require(Action::ReadUser { owner: id })?;
        self.repository
            .users
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn update(&self, subject: &Subject, id: i32, request: UpdateUser) -> AppResult<User> {
        subject.require(Action::UpdateUser { owner: id })?;

        if let Some(ref email) = request.email {
            if self.repository.users.email_exists(email, Some(id)).await? {
                return Err(AppError::Conflict("Email is already registered".to_string()));
            }
        }

        let password = request.password.as_deref().map(hash_password).transpose()?;

        self.repository
            .users
            .update(
                id,
                UserChanges {
                    name: request.name,
                    email: request.email,
                    password,
                },
            )
            .await
    }

    /// Soft-delete an account; refused while it still has books out
    pub async fn delete(&self, subject: &Subject, id: i32) -> AppResult<()> {
        subject.require(Action::DeleteUser { owner: id })?;
        self.repository.users.soft_delete(id).await?;
        tracing::info!("Deleted user id={}", id);
        Ok(())
    }
}
