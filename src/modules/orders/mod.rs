use std::collections::HashMap;

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
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::{
    utils,
    web::{
        AppState,
        auth::AuthUser,
        responses::{ErrorBody, json_error, message},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders", get(list_orders).post(create_order))
        .route(
            "/api/orders/:id",
            get(get_order).put(update_order).delete(delete_order),
        )
}

type JsonResult<T> = Result<T, (StatusCode, Json<ErrorBody>)>;

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    shipping_address: String,
    total_amount: i64,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const ORDER_COLUMNS: &str = "id, order_number, customer_name, customer_email, customer_phone, \
     shipping_address, total_amount, status, notes, created_at, updated_at";

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct ItemProductRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    price: i64,
    image: Option<String>,
    images: Value,
    category: Option<String>,
    stock: i32,
    status: String,
    featured: bool,
}

#[derive(sqlx::FromRow)]
struct ItemJoinRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    price: i64,
    product_name: String,
    product_slug: String,
    product_description: Option<String>,
    product_price: i64,
    product_image: Option<String>,
    product_images: Value,
    product_category: Option<String>,
    product_stock: i32,
    product_status: String,
    product_featured: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderItem {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    price: i64,
    product: ItemProductRow,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderWithItems {
    #[serde(flatten)]
    order: OrderRow,
    order_items: Vec<OrderItem>,
}

const ITEM_SELECT: &str = "SELECT i.id, i.order_id, i.product_id, i.quantity, i.price, \
     p.name AS product_name, p.slug AS product_slug, p.description AS product_description, \
     p.price AS product_price, p.image AS product_image, p.images AS product_images, \
     p.category AS product_category, p.stock AS product_stock, p.status AS product_status, \
     p.featured AS product_featured
     FROM order_items i JOIN products p ON p.id = i.product_id";

fn into_item(row: ItemJoinRow) -> OrderItem {
    OrderItem {
        id: row.id,
        order_id: row.order_id,
        product_id: row.product_id,
        quantity: row.quantity,
        price: row.price,
        product: ItemProductRow {
            id: row.product_id,
            name: row.product_name,
            slug: row.product_slug,
            description: row.product_description,
            price: row.product_price,
            image: row.product_image,
            images: row.product_images,
            category: row.product_category,
            stock: row.product_stock,
            status: row.product_status,
            featured: row.product_featured,
        },
    }
}

async fn fetch_order(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<OrderWithItems>> {
    let order =
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    let Some(order) = order else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, ItemJoinRow>(&format!("{ITEM_SELECT} WHERE i.order_id = $1"))
        .bind(id)
        .fetch_all(pool)
        .await?;

    Ok(Some(OrderWithItems {
        order,
        order_items: items.into_iter().map(into_item).collect(),
    }))
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_orders(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> JsonResult<Json<Vec<OrderWithItems>>> {
    let orders = match query.status {
        Some(status) => {
            sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 ORDER BY created_at DESC"
            ))
            .bind(status)
            .fetch_all(state.pool_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
            ))
            .fetch_all(state.pool_ref())
            .await
        }
    }
    .map_err(|err| {
        error!(?err, "failed to fetch orders");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch orders")
    })?;

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let items = sqlx::query_as::<_, ItemJoinRow>(&format!(
        "{ITEM_SELECT} WHERE i.order_id = ANY($1)"
    ))
    .bind(&order_ids)
    .fetch_all(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to fetch order items");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch orders")
    })?;

    let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in items {
        grouped.entry(row.order_id).or_default().push(into_item(row));
    }

    let orders = orders
        .into_iter()
        .map(|order| {
            let order_items = grouped.remove(&order.id).unwrap_or_default();
            OrderWithItems { order, order_items }
        })
        .collect();

    Ok(Json(orders))
}

async fn get_order(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult<Json<OrderWithItems>> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(StatusCode::NOT_FOUND, "Order not found"));
    };

    fetch_order(state.pool_ref(), id)
        .await
        .map_err(|err| {
            error!(?err, "failed to fetch order");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch order")
        })?
        .map(Json)
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Order not found"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateItem {
    product_id: Uuid,
    quantity: i32,
    price: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderPayload {
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    shipping_address: String,
    total_amount: i64,
    status: Option<String>,
    notes: Option<String>,
    #[serde(default)]
    items: Vec<CreateItem>,
}

async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderPayload>,
) -> JsonResult<impl IntoResponse> {
    let order_id = Uuid::new_v4();
    let order_number = utils::order_number();

    // Order and items land together, matching the ORM's nested create.
    let mut tx = state.pool_ref().begin().await.map_err(|err| {
        error!(?err, "failed to open order transaction");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create order")
    })?;

    sqlx::query(
        "INSERT INTO orders (id, order_number, customer_name, customer_email, customer_phone, \
         shipping_address, total_amount, status, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(order_id)
    .bind(&order_number)
    .bind(&payload.customer_name)
    .bind(&payload.customer_email)
    .bind(&payload.customer_phone)
    .bind(&payload.shipping_address)
    .bind(payload.total_amount)
    .bind(payload.status.as_deref().unwrap_or("pending"))
    .bind(&payload.notes)
    .execute(&mut *tx)
    .await
    .map_err(|err| {
        error!(?err, "failed to insert order");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create order")
    })?;

    for item in &payload.items {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, quantity, price)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.price)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            error!(?err, "failed to insert order item");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create order")
        })?;
    }

    tx.commit().await.map_err(|err| {
        error!(?err, "failed to commit order transaction");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create order")
    })?;

    let order = fetch_order(state.pool_ref(), order_id)
        .await
        .map_err(|err| {
            error!(?err, "failed to reload created order");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create order")
        })?
        .ok_or_else(|| json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create order"))?;

    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateOrderPayload {
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    shipping_address: Option<String>,
    total_amount: Option<i64>,
    status: Option<String>,
    notes: Option<String>,
}

async fn update_order(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderPayload>,
) -> JsonResult<Json<OrderWithItems>> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update order",
        ));
    };

    let updated = sqlx::query(
        "UPDATE orders SET
             customer_name = COALESCE($2, customer_name),
             customer_email = COALESCE($3, customer_email),
             customer_phone = COALESCE($4, customer_phone),
             shipping_address = COALESCE($5, shipping_address),
             total_amount = COALESCE($6, total_amount),
             status = COALESCE($7, status),
             notes = COALESCE($8, notes),
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(id)
    .bind(payload.customer_name)
    .bind(payload.customer_email)
    .bind(payload.customer_phone)
    .bind(payload.shipping_address)
    .bind(payload.total_amount)
    .bind(payload.status)
    .bind(payload.notes)
    .execute(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update order");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update order")
    })?;

    if updated.rows_affected() == 0 {
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update order",
        ));
    }

    fetch_order(state.pool_ref(), id)
        .await
        .map_err(|err| {
            error!(?err, "failed to reload updated order");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update order")
        })?
        .map(Json)
        .ok_or_else(|| json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update order"))
}

async fn delete_order(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JsonResult<impl IntoResponse> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete order",
        ));
    };

    sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(id)
        .execute(state.pool_ref())
        .await
        .map_err(|err| {
            error!(?err, "failed to delete order");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete order")
        })?;

    Ok(message("Order deleted successfully"))
}
