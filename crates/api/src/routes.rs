use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch},
    Router,
};
use serde::{Deserialize, Serialize};
use shop_models::{NewOrder, Order, OrderStatus, UserId};
use shop_services::OrderQuery;
use shop_stream::RegistrySnapshot;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::auth::{AdminUser, CurrentUser};
use crate::error::ApiError;
use crate::state::AppState;
use crate::stream::stream_orders;

#[derive(Deserialize)]
pub struct AdminOrderParams {
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub pagination: Option<PaginationInfo>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            pagination: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u32,
    pub pages: u32,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub streams: RegistrySnapshot,
    pub orders: usize,
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Health and status
        .route("/health", get(health_check))
        .route("/api/v1/status", get(get_system_status))

        // Customer orders
        .route("/api/v1/orders/stream", get(stream_orders))
        .route("/api/v1/orders", get(list_my_orders).post(place_order))
        .route("/api/v1/orders/:order_id", get(get_my_order))

        // Admin order management
        .route("/api/v1/admin/orders", get(query_orders))
        .route("/api/v1/admin/orders/:order_id/status", patch(update_order_status))
}

/// Router with state, request tracing and CORS applied.
pub fn create_app(state: AppState) -> Router {
    create_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

// Live stream and order book counters
async fn get_system_status(State(state): State<AppState>) -> Json<ApiResponse<SystemStatus>> {
    let status = SystemStatus {
        streams: state.registry.snapshot(),
        orders: state.orders.order_count(),
    };
    Json(ApiResponse::ok(status).with_message("System operational"))
}

// Checkout
async fn place_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<NewOrder>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ApiError> {
    let order = state.orders.place_order(user.user_id, request)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(order))))
}

async fn list_my_orders(State(state): State<AppState>, user: CurrentUser) -> Json<ApiResponse<Vec<Order>>> {
    Json(ApiResponse::ok(state.orders.orders_for_user(&user.user_id)))
}

async fn get_my_order(
    Path(order_id): Path<Uuid>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let order = state.orders.get_for_user(&user.user_id, order_id)?;
    Ok(Json(ApiResponse::ok(order)))
}

// Admin order query with optional status / owner filters
async fn query_orders(
    Query(params): Query<AdminOrderParams>,
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<Vec<Order>>>, ApiError> {
    let query = OrderQuery {
        status: params
            .status
            .as_deref()
            .map(str::parse::<OrderStatus>)
            .transpose()?,
        user_id: params.user_id.map(UserId::new).transpose()?,
    };

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(50).clamp(1, 100); // Max 100 per page

    let orders = state.orders.query(&query);
    let total = orders.len() as u32;
    // far pages saturate past the end instead of overflowing
    let start = (page as usize - 1).saturating_mul(limit as usize);
    let page_orders: Vec<Order> = orders.into_iter().skip(start).take(limit as usize).collect();

    Ok(Json(ApiResponse {
        success: true,
        data: Some(page_orders),
        message: None,
        pagination: Some(PaginationInfo {
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
        }),
    }))
}

// Status change, pushed to the owner's open order streams
async fn update_order_status(
    Path(order_id): Path<Uuid>,
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let status: OrderStatus = request.status.parse()?;
    let order = state.orders.update_status(order_id, status)?;

    tracing::info!("🛠️  {} moved order {} to {}", admin.user_id, order.id, order.status);
    Ok(Json(ApiResponse::ok(order).with_message("Order status updated")))
}
