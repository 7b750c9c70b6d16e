//! Repository layer for database operations
//!
//! Services only see the three traits below. [`Repository::postgres`] backs
//! them with sqlx, [`Repository::in_memory`] with a process-local store.

pub mod books;
pub mod memory;
pub mod transactions;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook, UpdateBook},
        transaction::TransactionWithBook,
        user::{NewUser, User, UserChanges},
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Live (not deleted) user by id
    async fn get_by_id(&self, id: i32) -> AppResult<Option<User>>;

    /// Live user by email, case-insensitive
    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool>;

    async fn list(&self) -> AppResult<Vec<User>>;

    /// Insert a user; a taken email is a `Conflict`
    async fn create(&self, user: NewUser) -> AppResult<User>;

    async fn update(&self, id: i32, changes: UserChanges) -> AppResult<User>;

    /// Mark the user deleted; the row stays for past transactions.
    ///
    /// Fails with `Conflict` while the user has active loans. The check and
    /// the write are one atomic unit, so a concurrent `lend` either lands
    /// first and blocks the delete, or sees the user gone.
    async fn soft_delete(&self, id: i32) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn list(&self) -> AppResult<Vec<Book>>;

    async fn get_by_id(&self, id: i32) -> AppResult<Option<Book>>;

    async fn create(&self, book: CreateBook) -> AppResult<Book>;

    async fn update(&self, id: i32, changes: UpdateBook) -> AppResult<Book>;

    /// Fails with `Conflict` while any transaction references the book
    async fn delete(&self, id: i32) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Take one copy off the shelf and record the loan, atomically.
    ///
    /// Fails with `NotFound` for an unknown book, `OutOfStock` when no copy
    /// is left and `Conflict` when the pair already has an active loan.
    async fn lend(
        &self,
        user_id: i32,
        book_id: i32,
        deadline: DateTime<Utc>,
    ) -> AppResult<TransactionWithBook>;

    /// Mark the loan returned and put the copy back, atomically
    async fn return_loan(&self, id: i32, at: DateTime<Utc>) -> AppResult<TransactionWithBook>;

    /// Move the deadline of an active loan
    async fn set_deadline(
        &self,
        id: i32,
        deadline: DateTime<Utc>,
    ) -> AppResult<TransactionWithBook>;

    async fn get_by_id(&self, id: i32) -> AppResult<Option<TransactionWithBook>>;

    /// Newest first
    async fn list_all(&self) -> AppResult<Vec<TransactionWithBook>>;

    /// Newest first
    async fn list_by_user(&self, user_id: i32) -> AppResult<Vec<TransactionWithBook>>;
}

/// Main repository struct holding the storage handles
#[derive(Clone)]
pub struct Repository {
    pub users: Arc<dyn UserRepository>,
    pub books: Arc<dyn BookRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pool: Option<Pool<Postgres>>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            users: Arc::new(users::PgUserRepository::new(pool.clone())),
            books: Arc::new(books::PgBookRepository::new(pool.clone())),
            transactions: Arc::new(transactions::PgTransactionRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Create a repository whose data lives in this process only
    pub fn in_memory() -> Self {
        let store = memory::MemoryRepository::new();
        Self {
            users: Arc::new(store.clone()),
            books: Arc::new(store.clone()),
            transactions: Arc::new(store),
            pool: None,
        }
    }

    /// Assemble a repository from individual implementations
    pub fn from_parts(
        users: Arc<dyn UserRepository>,
        books: Arc<dyn BookRepository>,
        transactions: Arc<dyn TransactionRepository>,
    ) -> Self {
        Self {
            users,
            books,
            transactions,
            pool: None,
        }
    }

    /// Check that the storage answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(ref pool) = self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// Translate constraint violations into domain errors
pub(crate) fn map_constraint(err: sqlx::Error, unique: &str, foreign_key: &str) -> AppError {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return AppError::Conflict(unique.to_string());
        }
        if db.is_foreign_key_violation() {
            return AppError::Conflict(foreign_key.to_string());
        }
    }
    AppError::Database(err)
}

pub(crate) fn active_loans_message(active: usize) -> String {
    format!(
        "Return the {} borrowed book(s) before deleting this account",
        active
    )
}
