//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, transactions, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library API",
        version = "0.1.0",
        description = "Library lending REST API. Successful responses are wrapped in \
                       `{success, message, data}`; the documented bodies describe `data`."
    ),
    paths(
        // Health
        health::index,
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Users
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        // Transactions
        transactions::list_transactions,
        transactions::get_transaction,
        transactions::create_transaction,
        transactions::update_transaction,
    ),
    components(
        schemas(
            // Auth
            auth::TokenData,
            crate::models::user::RegisterUser,
            crate::models::user::LoginRequest,
            // Books
            crate::models::book::Book,
            crate::models::book::BookShort,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::UpdateUser,
            users::UsersData,
            users::UserData,
            // Transactions
            crate::models::transaction::LoanStatus,
            crate::models::transaction::LendingState,
            crate::models::transaction::TransactionDetails,
            crate::models::transaction::CreateTransaction,
            crate::models::transaction::UpdateTransaction,
            transactions::TransactionsData,
            transactions::TransactionData,
            // Health
            health::HealthResponse,
            health::ServiceInfo,
            // Errors
            crate::error::ErrorResponse,
            crate::error::ErrorCode,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and login"),
        (name = "books", description = "Book catalog"),
        (name = "users", description = "User accounts"),
        (name = "transactions", description = "Lending transactions")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
