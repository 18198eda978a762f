use thiserror::Error;
use uuid::Uuid;

use crate::OrderStatus;

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: Uuid },

    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    #[error("Missing or empty user identity")]
    Unauthorized,

    #[error("Admin role required")]
    Forbidden,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShopError>;
