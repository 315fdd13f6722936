use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::web::{
    AppState,
    auth::AuthUser,
    responses::{EnvelopeError, envelope, envelope_error, envelope_message},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/email-subscriptions",
            get(list_subscriptions).post(create_subscription),
        )
        .route(
            "/api/email-subscriptions/:id",
            get(get_subscription)
                .put(update_subscription)
                .delete(delete_subscription),
        )
}

type EnvelopeResult<T> = Result<T, (StatusCode, Json<EnvelopeError>)>;

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct SubscriptionRow {
    id: Uuid,
    email: String,
    status: String,
    subscribed_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const SUBSCRIPTION_COLUMNS: &str = "id, email, status, subscribed_at, updated_at";

fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_subscriptions(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> EnvelopeResult<impl IntoResponse> {
    let result = match query.status {
        Some(status) => {
            sqlx::query_as::<_, SubscriptionRow>(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM email_subscriptions WHERE status = $1 \
                 ORDER BY subscribed_at DESC"
            ))
            .bind(status)
            .fetch_all(state.pool_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, SubscriptionRow>(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM email_subscriptions ORDER BY subscribed_at DESC"
            ))
            .fetch_all(state.pool_ref())
            .await
        }
    };

    result.map(envelope).map_err(|err| {
        error!(?err, "failed to fetch email subscriptions");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch subscriptions",
        )
    })
}

async fn get_subscription(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(
            StatusCode::NOT_FOUND,
            "Subscription not found",
        ));
    };

    sqlx::query_as::<_, SubscriptionRow>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM email_subscriptions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch email subscription");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to fetch subscription",
        )
    })?
    .map(envelope)
    .ok_or_else(|| envelope_error(StatusCode::NOT_FOUND, "Subscription not found"))
}

#[derive(Deserialize)]
struct CreatePayload {
    email: Option<String>,
}

async fn create_subscription(
    State(state): State<AppState>,
    Json(payload): Json<CreatePayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let Some(email) = payload.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) else {
        return Err(envelope_error(StatusCode::BAD_REQUEST, "Email is required"));
    };

    let email = normalize_email(email);

    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM email_subscriptions WHERE email = $1")
            .bind(&email)
            .fetch_optional(state.pool_ref())
            .await
            .map_err(|err| {
                error!(?err, "failed to check existing subscription");
                envelope_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to create subscription",
                )
            })?;

    if existing.is_some() {
        return Err(envelope_error(
            StatusCode::BAD_REQUEST,
            "Email already subscribed",
        ));
    }

    let subscription = sqlx::query_as::<_, SubscriptionRow>(&format!(
        "INSERT INTO email_subscriptions (id, email) VALUES ($1, $2)
         RETURNING {SUBSCRIPTION_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&email)
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to create email subscription");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create subscription",
        )
    })?;

    Ok((StatusCode::CREATED, envelope(subscription)))
}

#[derive(Deserialize)]
struct UpdatePayload {
    status: Option<String>,
}

async fn update_subscription(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let Some(status) = payload.status.filter(|s| !s.is_empty()) else {
        return Err(envelope_error(
            StatusCode::BAD_REQUEST,
            "Status is required",
        ));
    };

    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update subscription",
        ));
    };

    sqlx::query_as::<_, SubscriptionRow>(&format!(
        "UPDATE email_subscriptions SET status = $2, updated_at = NOW()
         WHERE id = $1 RETURNING {SUBSCRIPTION_COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update email subscription");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update subscription",
        )
    })?
    .map(envelope)
    .ok_or_else(|| {
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update subscription",
        )
    })
}

async fn delete_subscription(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete subscription",
        ));
    };

    sqlx::query("DELETE FROM email_subscriptions WHERE id = $1")
        .bind(id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete email subscription");
            envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete subscription",
            )
        })?;

    Ok(envelope_message("Subscription deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  NguyenVanA@Example.COM "), "nguyenvana@example.com");
    }
}
