//! Authentication endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{LoginRequest, RegisterUser},
    AppState,
};

use super::{ApiResponse, ValidatedJson};

/// Payload of a successful register or login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenData {
    /// Bearer token for the `Authorization` header
    pub token: String,
}

/// Create a reader account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "Account created; envelope data is the token", body = TokenData),
        (status = 400, description = "Invalid input or email already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RegisterUser>,
) -> AppResult<(StatusCode, Json<ApiResponse<TokenData>>)> {
    let token = state.services.auth.register(request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("User registered", TokenData { token }),
    ))
}

/// Exchange credentials for a token
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; envelope data is the token", body = TokenData),
        (status = 400, description = "Wrong password", body = crate::error::ErrorResponse),
        (status = 404, description = "No account with this email", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> AppResult<Json<ApiResponse<TokenData>>> {
    let token = state.services.auth.login(request).await?;
    Ok(ApiResponse::ok("Login successful", TokenData { token }))
}
