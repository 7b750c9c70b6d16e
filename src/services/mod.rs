//! Business logic services

pub mod auth;
pub mod books;
pub mod lending;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub users: users::UsersService,
    pub books: books::BooksService,
    pub lending: lending::LendingService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone()),
            users: users::UsersService::new(repository.clone()),
            books: books::BooksService::new(repository.clone()),
            lending: lending::LendingService::new(repository.clone(), config.lending.loan_days),
            repository,
        }
    }

    /// Check that the storage behind the services answers
    pub async fn ping(&self) -> crate::error::AppResult<()> {
        self.repository.ping().await
    }
}
