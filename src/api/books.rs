//! Book catalog endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::book::{Book, CreateBook, UpdateBook},
    AppState,
};

use super::{ApiResponse, AuthenticatedUser, ValidatedJson, ValidatedPath};

/// List all books
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    responses(
        (status = 200, description = "Envelope data is the list of books", body = [Book])
    )
)]
pub async fn list_books(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<Book>>>> {
    let books = state.services.books.list().await?;
    Ok(ApiResponse::ok("Books retrieved", books))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Envelope data is the book", body = Book),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    ValidatedPath(id): ValidatedPath<i32>,
) -> AppResult<Json<ApiResponse<Book>>> {
    let book = state.services.books.get(id).await?;
    Ok(ApiResponse::ok("Book retrieved", book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    ValidatedJson(book): ValidatedJson<CreateBook>,
) -> AppResult<(StatusCode, Json<ApiResponse<Book>>)> {
    let created = state.services.books.create(&subject, book).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok("Book created", created)))
}

/// Update an existing book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    ValidatedPath(id): ValidatedPath<i32>,
    ValidatedJson(changes): ValidatedJson<UpdateBook>,
) -> AppResult<Json<ApiResponse<Book>>> {
    let updated = state.services.books.update(&subject, id, changes).await?;
    Ok(ApiResponse::ok("Book updated", updated))
}

/// Remove a book from the catalog
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book deleted"),
        (status = 400, description = "Book has lending history", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    ValidatedPath(id): ValidatedPath<i32>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.services.books.delete(&subject, id).await?;
    Ok(ApiResponse::done("Book deleted"))
}
