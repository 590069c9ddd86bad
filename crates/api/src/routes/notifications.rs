//! Notification read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use notifications::{Notification, NotificationStore};
use orders::OrderStore;

use crate::AppState;
use crate::error::ApiError;

/// GET /notifications
pub async fn list<O: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<O, N>>>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    Ok(Json(state.notifications.list_notifications().await?))
}

/// GET /notifications/{id}
pub async fn get<O: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<O, N>>>,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, ApiError> {
    Ok(Json(state.notifications.get_notification(id).await?))
}

/// GET /notifications/order/{order_id}
#[tracing::instrument(skip(state))]
pub async fn by_order<O: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<O, N>>>,
    Path(order_id): Path<i64>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = state
        .notifications
        .notifications_for_order(OrderId::new(order_id))
        .await?;
    Ok(Json(notifications))
}
