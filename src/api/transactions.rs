//! Lending transaction endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::transaction::{CreateTransaction, TransactionDetails, UpdateTransaction},
    AppState,
};

use super::{ApiResponse, AuthenticatedUser, ValidatedJson, ValidatedPath};

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionsData {
    pub transactions: Vec<TransactionDetails>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionData {
    pub transaction: TransactionDetails,
}

/// List transactions: all of them for admins, your own otherwise
#[utoipa::path(
    get,
    path = "/transactions",
    tag = "transactions",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transactions, newest first", body = TransactionsData),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<TransactionsData>>> {
    let transactions = state.services.lending.list(&subject).await?;
    Ok(ApiResponse::ok(
        "Transactions retrieved",
        TransactionsData { transactions },
    ))
}

/// Get a transaction by ID
#[utoipa::path(
    get,
    path = "/transactions/{id}",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Transaction ID")
    ),
    responses(
        (status = 200, description = "Transaction details", body = TransactionData),
        (status = 403, description = "Not your transaction", body = crate::error::ErrorResponse),
        (status = 404, description = "Transaction not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    ValidatedPath(id): ValidatedPath<i32>,
) -> AppResult<Json<ApiResponse<TransactionData>>> {
    let transaction = state.services.lending.get(&subject, id).await?;
    Ok(ApiResponse::ok(
        "Transaction retrieved",
        TransactionData { transaction },
    ))
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/transactions",
    tag = "transactions",
    security(("bearer_auth" = [])),
    request_body = CreateTransaction,
    responses(
        (status = 201, description = "Book borrowed", body = TransactionData),
        (status = 400, description = "Already borrowing this book", body = crate::error::ErrorResponse),
        (status = 403, description = "Admins cannot borrow", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "No copy left", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    ValidatedJson(request): ValidatedJson<CreateTransaction>,
) -> AppResult<(StatusCode, Json<ApiResponse<TransactionData>>)> {
    let transaction = state.services.lending.borrow(&subject, request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("Transaction created", TransactionData { transaction }),
    ))
}

/// Extend the deadline or return the book
#[utoipa::path(
    put,
    path = "/transactions/{id}",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Transaction ID")
    ),
    request_body = UpdateTransaction,
    responses(
        (status = 200, description = "Transaction updated", body = TransactionData),
        (status = 400, description = "Invalid change or already returned", body = crate::error::ErrorResponse),
        (status = 403, description = "Not your transaction", body = crate::error::ErrorResponse),
        (status = 404, description = "Transaction not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    ValidatedPath(id): ValidatedPath<i32>,
    ValidatedJson(request): ValidatedJson<UpdateTransaction>,
) -> AppResult<Json<ApiResponse<TransactionData>>> {
    let transaction = state.services.lending.update(&subject, id, request).await?;
    Ok(ApiResponse::ok(
        "Transaction updated",
        TransactionData { transaction },
    ))
}
