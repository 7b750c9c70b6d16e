//! Lending transactions repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use super::{map_constraint, TransactionRepository};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookShort},
        transaction::{LoanStatus, Transaction, TransactionWithBook},
    },
};

const SELECT_WITH_BOOK: &str = r#"
    SELECT t.*, b.title AS book_title, b.author AS book_author
    FROM transactions t
    JOIN books b ON b.id = t.book_id
"#;

fn record_from_row(row: &PgRow) -> Result<TransactionWithBook, sqlx::Error> {
    Ok(TransactionWithBook {
        transaction: Transaction {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            book_id: row.try_get("book_id")?,
            status: row.try_get("status")?,
            deadline: row.try_get("deadline")?,
            returned_at: row.try_get("returned_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        },
        book: BookShort {
            id: row.try_get("book_id")?,
            title: row.try_get("book_title")?,
            author: row.try_get("book_author")?,
        },
    })
}

#[derive(Clone)]
pub struct PgTransactionRepository {
    pool: Pool<Postgres>,
}

impl PgTransactionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: &str, id: i32) -> AppResult<Vec<TransactionWithBook>> {
        let query = format!("{} {} ORDER BY t.created_at DESC, t.id DESC", SELECT_WITH_BOOK, clause);
        let rows = sqlx::query(&query).bind(id).fetch_all(&self.pool).await?;
        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn lend(
        &self,
        user_id: i32,
        book_id: i32,
        deadline: DateTime<Utc>,
    ) -> AppResult<TransactionWithBook> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Shared lock on the borrower: a concurrent soft delete waits for this loan
        sqlx::query_scalar::<_, i32>(
            "SELECT id FROM users WHERE id = $1 AND deleted_at IS NULL FOR SHARE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

        // Row lock serializes concurrent borrows of the same book
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        if book.stock <= 0 {
            return Err(AppError::OutOfStock(format!("'{}' has no copy left", book.title)));
        }

        let already_borrowed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE user_id = $1 AND book_id = $2 AND status = 'active')",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        if already_borrowed {
            return Err(AppError::Conflict(format!(
                "'{}' is already borrowed by this user",
                book.title
            )));
        }

        sqlx::query("UPDATE books SET stock = stock - 1, updated_at = $2 WHERE id = $1")
            .bind(book_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (user_id, book_id, status, deadline, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(LoanStatus::Active)
        .bind(deadline)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            map_constraint(
                e,
                "This book is already borrowed by this user",
                "Borrower or book does not exist",
            )
        })?;

        tx.commit().await?;

        Ok(TransactionWithBook {
            transaction,
            book: BookShort::from(&book),
        })
    }

    async fn return_loan(&self, id: i32, at: DateTime<Utc>) -> AppResult<TransactionWithBook> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction with id {} not found", id)))?;

        if !current.is_active() {
            return Err(AppError::Conflict("Transaction already returned".to_string()));
        }

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions SET status = $2, returned_at = $3, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(LoanStatus::Returned)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        let book_row = sqlx::query(
            "UPDATE books SET stock = stock + 1, updated_at = $2 WHERE id = $1 RETURNING id, title, author",
        )
        .bind(transaction.book_id)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(TransactionWithBook {
            transaction,
            book: BookShort {
                id: book_row.try_get("id")?,
                title: book_row.try_get("title")?,
                author: book_row.try_get("author")?,
            },
        })
    }

    async fn set_deadline(
        &self,
        id: i32,
        deadline: DateTime<Utc>,
    ) -> AppResult<TransactionWithBook> {
        let now = Utc::now();

        let updated = sqlx::query(
            "UPDATE transactions SET deadline = $2, updated_at = $3 WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(deadline)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let record = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction with id {} not found", id)))?;

        if updated.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "The deadline of a returned transaction cannot change".to_string(),
            ));
        }

        Ok(record)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Option<TransactionWithBook>> {
        let query = format!("{} WHERE t.id = $1", SELECT_WITH_BOOK);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn list_all(&self) -> AppResult<Vec<TransactionWithBook>> {
        let query = format!("{} ORDER BY t.created_at DESC, t.id DESC", SELECT_WITH_BOOK);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn list_by_user(&self, user_id: i32) -> AppResult<Vec<TransactionWithBook>> {
        self.fetch_where("WHERE t.user_id = $1", user_id).await
    }
}
