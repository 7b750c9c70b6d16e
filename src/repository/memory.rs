//! In-memory storage backing all repository traits.
//!
//! One mutex guards the whole state, so every multi-step operation (borrow,
//! return, delete checks) runs as a single atomic unit.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{active_loans_message, BookRepository, TransactionRepository, UserRepository};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookShort, CreateBook, UpdateBook},
        transaction::{LoanStatus, Transaction, TransactionWithBook},
        user::{NewUser, User, UserChanges},
    },
};

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, Book>,
    transactions: BTreeMap<i32, Transaction>,
    last_user_id: i32,
    last_book_id: i32,
    last_transaction_id: i32,
}

impl MemoryState {
    fn live_user(&self, id: i32) -> Option<&User> {
        self.users.get(&id).filter(|u| u.deleted_at.is_none())
    }

    fn email_taken(&self, email: &str, exclude_id: Option<i32>) -> bool {
        self.users.values().any(|u| {
            u.deleted_at.is_none()
                && u.email.eq_ignore_ascii_case(email)
                && Some(u.id) != exclude_id
        })
    }

    fn with_book(&self, transaction: &Transaction) -> AppResult<TransactionWithBook> {
        let book = self.books.get(&transaction.book_id).ok_or_else(|| {
            AppError::Internal(format!(
                "Transaction {} references missing book {}",
                transaction.id, transaction.book_id
            ))
        })?;
        Ok(TransactionWithBook {
            transaction: transaction.clone(),
            book: BookShort::from(book),
        })
    }

    fn newest_first<'a>(
        &self,
        transactions: impl Iterator<Item = &'a Transaction>,
    ) -> AppResult<Vec<TransactionWithBook>> {
        let mut records = transactions
            .map(|t| self.with_book(t))
            .collect::<AppResult<Vec<_>>>()?;
        records.sort_by(|a, b| {
            (b.transaction.created_at, b.transaction.id)
                .cmp(&(a.transaction.created_at, a.transaction.id))
        });
        Ok(records)
    }
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.live_user(id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.deleted_at.is_none() && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        Ok(self.state.lock().await.email_taken(email, exclude_id))
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.email_taken(&user.email, None) {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        state.last_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: state.last_user_id,
            name: user.name,
            email: user.email,
            password: user.password,
            role: user.role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i32, changes: UserChanges) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.live_user(id).is_none() {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        if let Some(ref email) = changes.email {
            if state.email_taken(email, Some(id)) {
                return Err(AppError::Conflict("Email is already registered".to_string()));
            }
        }

        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(password) = changes.password {
            user.password = password;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn soft_delete(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let active = state
            .transactions
            .values()
            .filter(|t| t.user_id == id && t.is_active())
            .count();
        if active > 0 && state.live_user(id).is_some() {
            return Err(AppError::Conflict(active_loans_message(active)));
        }
        let user = state
            .users
            .get_mut(&id)
            .filter(|u| u.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        let now = Utc::now();
        user.deleted_at = Some(now);
        user.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl BookRepository for MemoryRepository {
    async fn list(&self) -> AppResult<Vec<Book>> {
        Ok(self.state.lock().await.books.values().cloned().collect())
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.state.lock().await.books.get(&id).cloned())
    }

    async fn create(&self, book: CreateBook) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        state.last_book_id += 1;
        let now = Utc::now();
        let created = Book {
            id: state.last_book_id,
            title: book.title,
            description: book.description,
            author: book.author,
            year: book.year,
            synopsis: book.synopsis,
            stock: book.stock,
            created_at: now,
            updated_at: now,
        };
        state.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i32, changes: UpdateBook) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let book = state
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        changes.apply_to(book);
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.books.contains_key(&id) {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        if state.transactions.values().any(|t| t.book_id == id) {
            return Err(AppError::Conflict(
                "Book has lending history and cannot be deleted".to_string(),
            ));
        }
        state.books.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemoryRepository {
    async fn lend(
        &self,
        user_id: i32,
        book_id: i32,
        deadline: DateTime<Utc>,
    ) -> AppResult<TransactionWithBook> {
        let mut state = self.state.lock().await;

        if state.live_user(user_id).is_none() {
            return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
        }
        let book = state
            .books
            .get(&book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        if book.stock <= 0 {
            return Err(AppError::OutOfStock(format!("'{}' has no copy left", book.title)));
        }
        let already_borrowed = state
            .transactions
            .values()
            .any(|t| t.user_id == user_id && t.book_id == book_id && t.is_active());
        if already_borrowed {
            return Err(AppError::Conflict(format!(
                "'{}' is already borrowed by this user",
                book.title
            )));
        }

        let now = Utc::now();
        let book = state
            .books
            .get_mut(&book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        book.stock -= 1;
        book.updated_at = now;
        let book = BookShort::from(&*book);

        state.last_transaction_id += 1;
        let transaction = Transaction {
            id: state.last_transaction_id,
            user_id,
            book_id,
            status: LoanStatus::Active,
            deadline,
            returned_at: None,
            created_at: now,
            updated_at: now,
        };
        state.transactions.insert(transaction.id, transaction.clone());

        Ok(TransactionWithBook { transaction, book })
    }

    async fn return_loan(&self, id: i32, at: DateTime<Utc>) -> AppResult<TransactionWithBook> {
        let mut state = self.state.lock().await;

        let transaction = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction with id {} not found", id)))?;
        if !transaction.is_active() {
            return Err(AppError::Conflict("Transaction already returned".to_string()));
        }
        transaction.status = LoanStatus::Returned;
        transaction.returned_at = Some(at);
        transaction.updated_at = at;
        let transaction = transaction.clone();

        if let Some(book) = state.books.get_mut(&transaction.book_id) {
            book.stock += 1;
            book.updated_at = at;
        }

        state.with_book(&transaction)
    }

    async fn set_deadline(
        &self,
        id: i32,
        deadline: DateTime<Utc>,
    ) -> AppResult<TransactionWithBook> {
        let mut state = self.state.lock().await;

        let transaction = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction with id {} not found", id)))?;
        if !transaction.is_active() {
            return Err(AppError::Conflict(
                "The deadline of a returned transaction cannot change".to_string(),
            ));
        }
        transaction.deadline = deadline;
        transaction.updated_at = Utc::now();
        let transaction = transaction.clone();

        state.with_book(&transaction)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Option<TransactionWithBook>> {
        let state = self.state.lock().await;
        state
            .transactions
            .get(&id)
            .map(|t| state.with_book(t))
            .transpose()
    }

    async fn list_all(&self) -> AppResult<Vec<TransactionWithBook>> {
        let state = self.state.lock().await;
        state.newest_first(state.transactions.values())
    }

    async fn list_by_user(&self, user_id: i32) -> AppResult<Vec<TransactionWithBook>> {
        let state = self.state.lock().await;
        state.newest_first(state.transactions.values().filter(|t| t.user_id == user_id))
    }
}
