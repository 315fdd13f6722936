use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::web::{
    AppState,
    auth::AuthUser,
    responses::{EnvelopeError, envelope, envelope_error, envelope_message},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route(
            "/api/products/:id",
            get(get_product_by_slug)
                .put(update_product)
                .delete(delete_product),
        )
}

type EnvelopeResult<T> = Result<T, (StatusCode, Json<EnvelopeError>)>;

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct ProductRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    content: Option<String>,
    price: i64,
    image: Option<String>,
    images: Value,
    category: Option<String>,
    stock: i32,
    status: String,
    featured: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const PRODUCT_COLUMNS: &str = "id, name, slug, description, content, price, image, images, \
     category, stock, status, featured, created_at, updated_at";

#[derive(Deserialize)]
struct ListQuery {
    category: Option<String>,
    featured: Option<String>,
    status: Option<String>,
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> EnvelopeResult<impl IntoResponse> {
    let mut sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE");
    let mut placeholder = 0;
    if query.category.is_some() {
        placeholder += 1;
        sql.push_str(&format!(" AND category = ${placeholder}"));
    }
    if query.featured.is_some() {
        placeholder += 1;
        sql.push_str(&format!(" AND featured = ${placeholder}"));
    }
    if query.status.is_some() {
        placeholder += 1;
        sql.push_str(&format!(" AND status = ${placeholder}"));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut q = sqlx::query_as::<_, ProductRow>(&sql);
    if let Some(category) = &query.category {
        q = q.bind(category);
    }
    if let Some(featured) = &query.featured {
        q = q.bind(featured == "true");
    }
    if let Some(status) = &query.status {
        q = q.bind(status);
    }

    let products = q
        .fetch_all(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to fetch products");
            envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch products",
            )
        })?;

    Ok(envelope(products))
}

async fn get_product_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1"
    ))
    .bind(&slug)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch product");
        envelope_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch product")
    })?
    .map(envelope)
    .ok_or_else(|| envelope_error(StatusCode::NOT_FOUND, "Product not found"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductPayload {
    name: Option<String>,
    slug: Option<String>,
    description: Option<String>,
    content: Option<String>,
    price: Option<i64>,
    image: Option<String>,
    images: Option<Vec<String>>,
    category: Option<String>,
    stock: Option<i32>,
    status: Option<String>,
    featured: Option<bool>,
}

async fn create_product(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ProductPayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let images = serde_json::to_value(payload.images.unwrap_or_default()).unwrap_or(Value::Null);

    let product = sqlx::query_as::<_, ProductRow>(&format!(
        "INSERT INTO products (id, name, slug, description, content, price, image, images, \
         category, stock, status, featured)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(payload.name.unwrap_or_default())
    .bind(payload.slug.unwrap_or_default())
    .bind(payload.description)
    .bind(payload.content)
    .bind(payload.price.unwrap_or_default())
    .bind(payload.image)
    .bind(images)
    .bind(payload.category)
    .bind(payload.stock.unwrap_or_default())
    .bind(payload.status.unwrap_or_else(|| "draft".to_string()))
    .bind(payload.featured.unwrap_or_default())
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to create product");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to create product",
        )
    })?;

    Ok((StatusCode::CREATED, envelope(product)))
}

async fn update_product(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ProductPayload>,
) -> EnvelopeResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update product",
        ));
    };

    let images = payload
        .images
        .map(|images| serde_json::to_value(images).unwrap_or(Value::Null));

    sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products SET
             name = COALESCE($2, name),
             slug = COALESCE($3, slug),
             description = COALESCE($4, description),
             content = COALESCE($5, content),
             price = COALESCE($6, price),
             image = COALESCE($7, image),
             images = COALESCE($8, images),
             category = COALESCE($9, category),
             stock = COALESCE($10, stock),
             status = COALESCE($11, status),
             featured = COALESCE($12, featured),
             updated_at = NOW()
         WHERE id = $1
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(id)
    .bind(payload.name)
    .bind(payload.slug)
    .bind(payload.description)
    .bind(payload.content)
    .bind(payload.price)
    .bind(payload.image)
    .bind(images)
    .bind(payload.category)
    .bind(payload.stock)
    .bind(payload.status)
    .bind(payload.featured)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update product");
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update product",
        )
    })?
    .map(envelope)
    .ok_or_else(|| {
        envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update product",
        )
    })
}

async fn delete_product(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> EnvelopeResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(envelope_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete product",
        ));
    };

    sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete product");
            envelope_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete product",
            )
        })?;

    Ok(envelope_message("Product deleted successfully"))
}
