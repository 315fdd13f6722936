use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{StatusCode, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::web::{
    AppState,
    responses::{ErrorBody, json_error, message},
};

pub const TOKEN_TTL_DAYS: i64 = 7;

/// Authenticated user, loaded from the database for every guarded request.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
}

/// Wrapper extractor for routes that additionally require the `admin` role.
#[derive(Clone, Debug)]
pub struct AdminUser(pub AuthUser);

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(secret: &str, user_id: Uuid, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = TokenClaims {
        user_id,
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + ChronoDuration::days(TOKEN_TTL_DAYS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_token(secret: &str, token: &str) -> Option<TokenClaims> {
    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        use axum::RequestPartsExt;

        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| {
                json_error(
                    StatusCode::UNAUTHORIZED,
                    "Unauthorized - No token provided",
                )
            })?;

        let claims = verify_token(&state.config().jwt_secret, bearer.token())
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "Unauthorized - Invalid token"))?;

        let user = fetch_user(state.pool_ref(), claims.user_id)
            .await
            .map_err(|err| {
                error!(?err, "failed to load user for auth check");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            })?
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "Unauthorized - User not found"))?;

        Ok(user)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != "admin" {
            return Err(json_error(
                StatusCode::FORBIDDEN,
                "Forbidden - Admin access required",
            ));
        }
        Ok(AdminUser(user))
    }
}

async fn fetch_user(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<AuthUser>> {
    sqlx::query_as::<_, AuthUser>("SELECT id, email, name, role FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
}

#[derive(Deserialize)]
struct RegisterPayload {
    email: Option<String>,
    password: Option<String>,
    name: Option<String>,
    role: Option<String>,
}

#[derive(Deserialize)]
struct LoginPayload {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct CreatedUser {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct AuthResponse<U> {
    user: U,
    token: String,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorBody>)> {
    let (Some(email), Some(password), Some(name)) = (
        payload.email.as_deref(),
        payload.password.as_deref(),
        payload.name.as_deref(),
    ) else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Email, password, and name are required",
        ));
    };

    if email.is_empty() || password.is_empty() || name.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Email, password, and name are required",
        ));
    }

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to check for existing user");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to register user")
        })?;

    if existing.is_some() {
        return Err(json_error(StatusCode::BAD_REQUEST, "User already exists"));
    }

    let password_hash = hash_password(password).map_err(|err| {
        error!(%err, "failed to hash password");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to register user")
    })?;

    let role = payload.role.as_deref().unwrap_or("editor");
    let user = sqlx::query_as::<_, CreatedUser>(
        "INSERT INTO users (id, email, password, name, role) VALUES ($1, $2, $3, $4, $5)
         RETURNING id, email, name, role, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(role)
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to insert user");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to register user")
    })?;

    let token = issue_token(&state.config().jwt_secret, user.id, &user.email).map_err(|err| {
        error!(%err, "failed to issue token");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to register user")
    })?;

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorBody>)> {
    let (Some(email), Some(password)) = (payload.email.as_deref(), payload.password.as_deref())
    else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Email and password are required",
        ));
    };

    let user = sqlx::query_as::<_, CredentialRow>(
        "SELECT id, email, name, role, password FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch user during login");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to login")
    })?
    .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "Invalid credentials"))?;

    if !verify_password(password, &user.password) {
        return Err(json_error(StatusCode::UNAUTHORIZED, "Invalid credentials"));
    }

    let token = issue_token(&state.config().jwt_secret, user.id, &user.email).map_err(|err| {
        error!(%err, "failed to issue token");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to login")
    })?;

    Ok(Json(AuthResponse {
        user: AuthUser {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        },
        token,
    }))
}

#[derive(Serialize)]
struct MeResponse {
    user: AuthUser,
}

async fn me(user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse { user })
}

async fn logout() -> impl IntoResponse {
    // Tokens are stateless; logout is handled client-side.
    message("Logged out successfully")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, "a@b.com").unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.email, "a@b.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_rejected_with_wrong_secret() {
        let token = issue_token(SECRET, Uuid::new_v4(), "a@b.com").unwrap();
        assert!(verify_token("other-secret", &token).is_none());
    }

    #[test]
    fn garbage_token_rejected() {
        assert!(verify_token(SECRET, "not-a-jwt").is_none());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("admin123").unwrap();
        assert!(verify_password("admin123", &hash));
        assert!(!verify_password("admin124", &hash));
        assert!(!verify_password("admin123", "not-a-hash"));
    }
}
