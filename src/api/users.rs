//! User management endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{UpdateUser, User},
    AppState,
};

use super::{ApiResponse, AuthenticatedUser, ValidatedJson, ValidatedPath};

#[derive(Debug, Serialize, ToSchema)]
pub struct UsersData {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserData {
    pub user: User,
}

/// List users (admin only)
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "List of users", body = UsersData),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
) -> AppResult<Json<ApiResponse<UsersData>>> {
    let users = state.services.users.list(&subject).await?;
    Ok(ApiResponse::ok("Users retrieved", UsersData { users }))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = UserData),
        (status = 403, description = "Not your account", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    ValidatedPath(id): ValidatedPath<i32>,
) -> AppResult<Json<ApiResponse<UserData>>> {
    let user = state.services.users.get(&subject, id).await?;
    Ok(ApiResponse::ok("User retrieved", UserData { user }))
}

/// Update your own account
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = UserData),
        (status = 400, description = "Invalid input or email taken", body = crate::error::ErrorResponse),
        (status = 403, description = "Not your account", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    ValidatedPath(id): ValidatedPath<i32>,
    ValidatedJson(request): ValidatedJson<UpdateUser>,
) -> AppResult<Json<ApiResponse<UserData>>> {
    let user = state.services.users.update(&subject, id, request).await?;
    Ok(ApiResponse::ok("User updated", UserData { user }))
}

/// Delete your own account
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "User still has borrowed books", body = crate::error::ErrorResponse),
        (status = 403, description = "Not your account", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(subject): AuthenticatedUser,
    ValidatedPath(id): ValidatedPath<i32>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.services.users.delete(&subject, id).await?;
    Ok(ApiResponse::done("User deleted"))
}
