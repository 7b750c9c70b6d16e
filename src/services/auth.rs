//! Authentication service: registration, login and bearer token resolution

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{LoginRequest, NewUser, RegisterUser, Role, User, UserClaims},
    policy::Subject,
    repository::Repository,
};

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a new reader account and return its token
    pub async fn register(&self, request: RegisterUser) -> AppResult<String> {
        if self.repository.users.email_exists(&request.email, None).await? {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let user = self
            .repository
            .users
            .create(NewUser {
                name: request.name,
                email: request.email,
                password: hash_password(&request.password)?,
                role: Role::User,
            })
            .await?;

        tracing::info!("Registered user id={}", user.id);
        self.issue_token(&user)
    }

    /// Check credentials and return a token.
    ///
    /// An unknown email is `NotFound`, a wrong password `InvalidCredentials`.
    pub async fn login(&self, request: LoginRequest) -> AppResult<String> {
        let user = self
            .repository
            .users
            .get_by_email(&request.email)
            .await?
            .ok_or_else(|| AppError::NotFound("No account with this email".to_string()))?;

        if !verify_password(&user.password, &request.password)? {
            tracing::debug!("Rejected password for user id={}", user.id);
            return Err(AppError::InvalidCredentials);
        }

        self.issue_token(&user)
    }

    /// Turn a bearer token into the request subject
    pub async fn resolve(&self, token: &str) -> AppResult<Subject> {
        let claims = UserClaims::from_token(token, &self.config.jwt_secret, &self.config.jwt_issuer)
            .map_err(|e| AppError::Unauthenticated(e.to_string()))?;

        // Tokens of deleted accounts stop working
        self.repository
            .users
            .get_by_id(claims.uid)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("Account no longer exists".to_string()))?;

        Ok(Subject::new(claims.uid, claims.role))
    }

    /// Create a signed JWT for a user
    pub fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.email.clone(),
            uid: user.id,
            role: user.role,
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_issuer.clone(),
            iat: now,
            exp,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Create the configured admin account unless it already exists
    pub async fn ensure_admin(&self) -> AppResult<()> {
        let (Some(email), Some(password)) =
            (&self.config.admin_email, &self.config.admin_password)
        else {
            return Ok(());
        };

        if self.repository.users.get_by_email(email).await?.is_some() {
            tracing::debug!("Admin account {} already present", email);
            return Ok(());
        }

        let admin = self
            .repository
            .users
            .create(NewUser {
                name: "Administrator".to_string(),
                email: email.clone(),
                password: hash_password(password)?,
                role: Role::Admin,
            })
            .await?;

        tracing::info!("Seeded admin account id={}", admin.id);
        Ok(())
    }
}

/// Hash a password with argon2 and a random salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
