use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shop_models::{NewOrder, Order, OrderEvent, OrderStatus, Result, ShopError, UserId};
use shop_stream::SubscriptionRegistry;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub user_id: Option<UserId>,
}

impl OrderQuery {
    fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |status| order.status == status)
            && self.user_id.as_ref().map_or(true, |user| &order.user_id == user)
    }
}

/// In-memory order book. Status changes are pushed to the owner's open
/// order streams through the subscription registry.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<DashMap<Uuid, Order>>,
    registry: SubscriptionRegistry,
}

impl OrderService {
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self {
            orders: Arc::new(DashMap::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn place_order(&self, user_id: UserId, request: NewOrder) -> Result<Order> {
        let order = Order::place(user_id, request)?;
        tracing::info!(order = %order.id, user = %order.user_id, total = %order.total, "order placed");
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    pub fn get(&self, order_id: Uuid) -> Result<Order> {
        self.orders
            .get(&order_id)
            .map(|order| order.clone())
            .ok_or(ShopError::OrderNotFound { order_id })
    }

    /// Orders of other users are reported as not found.
    pub fn get_for_user(&self, user_id: &UserId, order_id: Uuid) -> Result<Order> {
        let order = self.get(order_id)?;
        if &order.user_id != user_id {
            return Err(ShopError::OrderNotFound { order_id });
        }
        Ok(order)
    }

    pub fn orders_for_user(&self, user_id: &UserId) -> Vec<Order> {
        self.query(&OrderQuery {
            status: None,
            user_id: Some(user_id.clone()),
        })
    }

    /// Matching orders, newest first.
    pub fn query(&self, query: &OrderQuery) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Applies a validated status change and notifies the owning user.
    ///
    /// Nothing is broadcast when the transition is rejected.
    pub fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order> {
        let updated = {
            let mut order = self
                .orders
                .get_mut(&order_id)
                .ok_or(ShopError::OrderNotFound { order_id })?;
            order.transition_to(status)?;
            order.clone()
        };

        let event = OrderEvent::status_updated(&updated)?;
        let delivered = self.registry.broadcast_to_user(&updated.user_id, &event);

        tracing::info!(
            order = %updated.id,
            user = %updated.user_id,
            status = %updated.status,
            delivered,
            "order status updated"
        );

        Ok(updated)
    }
}
