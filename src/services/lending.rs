//! Lending workflow: borrowing and returning books.
//!
//! A loan is `Active` from the moment it is created until it is returned.
//! Stock moves only together with a loan state change, inside the
//! repository's atomic `lend` / `return_loan` operations.

use chrono::{Duration, Utc};

use crate::{
    error::{AppError, AppResult},
    models::transaction::{
        CreateTransaction, TransactionChange, TransactionDetails, TransactionWithBook,
        UpdateTransaction,
    },
    policy::{Action, Subject},
    repository::Repository,
};

#[derive(Clone)]
pub struct LendingService {
    repository: Repository,
    loan_days: i64,
}

impl LendingService {
    pub fn new(repository: Repository, loan_days: i64) -> Self {
        Self { repository, loan_days }
    }

    /// Borrow a book for the subject
    pub async fn borrow(
        &self,
        subject: &Subject,
        request: CreateTransaction,
    ) -> AppResult<TransactionDetails> {
        let borrower = request.user_id.unwrap_or(subject.id);
        subject.require(Action::CreateTransaction { borrower })?;

        let now = Utc::now();
        let deadline = Duration::try_days(self.loan_days)
            .and_then(|loan| now.checked_add_signed(loan))
            .ok_or_else(|| {
                AppError::Internal(format!("Loan length of {} days is out of range", self.loan_days))
            })?;
        let record = self
            .repository
            .transactions
            .lend(borrower, request.book_id, deadline)
            .await?;

        tracing::info!(
            "Loan id={} created: user={} book={} deadline={}",
            record.transaction.id,
            borrower,
            request.book_id,
            deadline
        );
        Ok(record.into_details(now))
    }

    /// Admins see every transaction, users their own
    pub async fn list(&self, subject: &Subject) -> AppResult<Vec<TransactionDetails>> {
        let records = if subject.can(Action::ListAllTransactions) {
            self.repository.transactions.list_all().await?
        } else {
            self.repository.transactions.list_by_user(subject.id).await?
        };

        let now = Utc::now();
        Ok(records.into_iter().map(|r| r.into_details(now)).collect())
    }

    pub async fn get(&self, subject: &Subject, id: i32) -> AppResult<TransactionDetails> {
        let record = self.find(id).await?;
        subject.require(Action::ReadTransaction {
            owner: record.transaction.user_id,
        })?;
        Ok(record.into_details(Utc::now()))
    }

    /// Move the deadline or return the book
    pub async fn update(
        &self,
        subject: &Subject,
        id: i32,
        request: UpdateTransaction,
    ) -> AppResult<TransactionDetails> {
        let record = self.find(id).await?;
        subject.require(Action::UpdateTransaction {
            owner: record.transaction.user_id,
        })?;

        let now = Utc::now();
        let updated = match request.into_change().map_err(AppError::Validation)? {
            TransactionChange::ExtendDeadline(deadline) => {
                if deadline <= now {
                    return Err(AppError::Validation(
                        "deadline must be in the future".to_string(),
                    ));
                }
                self.repository.transactions.set_deadline(id, deadline).await?
            }
            TransactionChange::Return => {
                let returned = self.repository.transactions.return_loan(id, now).await?;
                tracing::info!(
                    "Loan id={} returned, book={} restocked",
                    id,
                    returned.transaction.book_id
                );
                returned
            }
        };

        Ok(updated.into_details(now))
    }

    async fn find(&self, id: i32) -> AppResult<TransactionWithBook> {
        self.repository
            .transactions
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction with id {} not found", id)))
    }
}
