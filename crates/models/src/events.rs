use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::Order;

pub const ORDER_STATUS_UPDATED: &str = "ORDER_STATUS_UPDATED";

/// Full current state of one order as carried on the event stream.
///
/// The notification path never interprets the fields; the snapshot is
/// forwarded verbatim to whoever consumes the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderSnapshot(Value);

impl OrderSnapshot {
    pub fn from_order(order: &Order) -> Result<Self> {
        Ok(Self(serde_json::to_value(order)?))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrderEvent {
    #[serde(rename = "ORDER_STATUS_UPDATED")]
    OrderStatusUpdated { order: OrderSnapshot },
}

impl OrderEvent {
    pub fn status_updated(order: &Order) -> Result<Self> {
        Ok(OrderEvent::OrderStatusUpdated {
            order: OrderSnapshot::from_order(order)?,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrderEvent::OrderStatusUpdated { .. } => ORDER_STATUS_UPDATED,
        }
    }

    pub fn order(&self) -> &OrderSnapshot {
        match self {
            OrderEvent::OrderStatusUpdated { order } => order,
        }
    }
}
