//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::OrderId;
use notifications::NotificationStore;
use orders::{CreateOrderRequest, Order, OrderStore, Page};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

/// Query parameters for listing orders.
#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

fn default_size() -> u32 {
    10
}

/// POST /orders: create an order and stage its event.
#[tracing::instrument(skip(state, req))]
pub async fn create<O: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<O, N>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let created = state.orders.create_order(req).await?;
    Ok((StatusCode::CREATED, Json(created.order)))
}

/// GET /orders: list orders a page at a time.
#[tracing::instrument(skip(state))]
pub async fn list<O: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<O, N>>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Order>>, ApiError> {
    let page = state.orders.list_orders(params.page, params.size).await?;
    Ok(Json(page))
}

/// GET /orders/{id}: load one order.
#[tracing::instrument(skip(state))]
pub async fn get<O: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<O, N>>>,
    Path(id): Path<i64>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.get_order(OrderId::new(id)).await?;
    Ok(Json(order))
}
