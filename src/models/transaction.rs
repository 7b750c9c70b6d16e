//! Lending transaction model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use validator::Validate;

use super::book::BookShort;

/// Persisted loan state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
        }
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "returned" => Ok(LoanStatus::Returned),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    // Stored in VARCHAR columns; accept every string type String does
    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// State reported to clients; overdue is derived from the deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LendingState {
    Active,
    Overdue,
    Returned,
}

/// Transaction row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub status: LoanStatus,
    pub deadline: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> LendingState {
        match self.status {
            LoanStatus::Returned => LendingState::Returned,
            LoanStatus::Active if self.deadline < now => LendingState::Overdue,
            LoanStatus::Active => LendingState::Active,
        }
    }
}

/// Transaction row joined with the book it lends
#[derive(Debug, Clone)]
pub struct TransactionWithBook {
    pub transaction: Transaction,
    pub book: BookShort,
}

impl TransactionWithBook {
    pub fn into_details(self, now: DateTime<Utc>) -> TransactionDetails {
        TransactionDetails::new(self.transaction, self.book, now)
    }
}

/// Transaction with its book, as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionDetails {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub book: BookShort,
    pub status: LendingState,
    /// Null once the book has been returned
    pub deadline: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionDetails {
    pub fn new(transaction: Transaction, book: BookShort, now: DateTime<Utc>) -> Self {
        let status = transaction.state_at(now);
        Self {
            id: transaction.id,
            user_id: transaction.user_id,
            book_id: transaction.book_id,
            book,
            status,
            deadline: transaction.is_active().then_some(transaction.deadline),
            returned_at: transaction.returned_at,
            created_at: transaction.created_at,
            updated_at: transaction.updated_at,
        }
    }
}

/// Create transaction request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTransaction {
    #[validate(range(min = 1, message = "book_id must be a positive id"))]
    pub book_id: i32,
    /// Borrower; defaults to the caller and must match it when given
    pub user_id: Option<i32>,
}

/// Update transaction request.
///
/// `deadline` distinguishes an absent key from an explicit `null`: a timestamp
/// moves the deadline, `null` returns the book.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTransaction {
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub status: Option<LoanStatus>,
}

/// A single change the lending workflow knows how to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionChange {
    ExtendDeadline(DateTime<Utc>),
    Return,
}

impl UpdateTransaction {
    pub fn into_change(self) -> Result<TransactionChange, String> {
        match (self.deadline, self.status) {
            (Some(None), None | Some(LoanStatus::Returned)) | (None, Some(LoanStatus::Returned)) => {
                Ok(TransactionChange::Return)
            }
            (Some(Some(deadline)), None | Some(LoanStatus::Active)) => {
                Ok(TransactionChange::ExtendDeadline(deadline))
            }
            (None, Some(LoanStatus::Active)) => {
                Err("status can only be changed to returned".to_string())
            }
            (None, None) => Err("Either deadline or status is required".to_string()),
            _ => Err("deadline and status contradict each other".to_string()),
        }
    }
}
