//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CustomerId, OrderId, ProductId};
use serde::{Deserialize, Serialize};
use store::{Order, OrderChanges, OrderStore};

use crate::auth::Claims;
use crate::error::ApiError;
use crate::service::OrderService;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub order_service: OrderService<S>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderRequest {
    pub customer_id: CustomerId,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

// -- Handlers --

/// `GET /orders`: All orders for admins, the caller's own orders otherwise.
#[tracing::instrument(skip(state, claims))]
pub async fn list<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    claims: Claims,
) -> Result<Json<OrdersResponse>, ApiError> {
    let orders = state.order_service.list(&claims).await?;
    Ok(Json(OrdersResponse { orders }))
}

/// `GET /orders/:id`: One order with its products.
#[tracing::instrument(skip(state, claims))]
pub async fn get<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id::<OrderId>(&id)?;
    let order = state.order_service.get(&claims, order_id).await?;
    Ok(Json(order))
}

/// `GET /orders/:customerId/customers`: A customer's orders with their products.
#[tracing::instrument(skip(state, claims))]
pub async fn list_for_customer<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    claims: Claims,
    Path(customer_id): Path<String>,
) -> Result<Json<OrdersResponse>, ApiError> {
    let customer_id = parse_id::<CustomerId>(&customer_id)?;
    let orders = state
        .order_service
        .list_for_customer(&claims, customer_id)
        .await?;
    Ok(Json(OrdersResponse { orders }))
}

/// `POST /orders`: Create an order.
#[tracing::instrument(skip(state, claims, req))]
pub async fn create<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    claims: Claims,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .order_service
        .create(&claims, req.customer_id, req.product_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// `PUT /orders/:id`: Replace an order's customer.
#[tracing::instrument(skip(state, claims, req))]
pub async fn update<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    claims: Claims,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id::<OrderId>(&id)?;
    let changes = OrderChanges {
        customer_id: req.customer_id,
    };
    let order = state
        .order_service
        .update(&claims, order_id, changes)
        .await?;
    Ok(Json(order))
}

/// `DELETE /orders/:id`: Delete an order.
#[tracing::instrument(skip(state, claims))]
pub async fn delete<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id = parse_id::<OrderId>(&id)?;
    state.order_service.delete(&claims, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_id<T: std::str::FromStr<Err = std::num::ParseIntError>>(id: &str) -> Result<T, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
