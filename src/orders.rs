use crate::types::{Order, OrderStatus};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Upsert,
    Remove,
    Ignore,
}

/// What an order update does to the local mirror: live orders are kept,
/// anything that reached a terminal state is dropped.
pub fn action_for(status: OrderStatus) -> OrderAction {
    match status {
        OrderStatus::New | OrderStatus::PartiallyFilled | OrderStatus::Untriggered => {
            OrderAction::Upsert
        }
        OrderStatus::Rejected
        | OrderStatus::PartiallyFilledCanceled
        | OrderStatus::Filled
        | OrderStatus::Cancelled
        | OrderStatus::Triggered
        | OrderStatus::Deactivated => OrderAction::Remove,
        OrderStatus::Unknown => OrderAction::Ignore,
    }
}

/// Local mirror of the account's live orders, keyed by order id.
#[derive(Debug, Default)]
pub struct OrderMirror {
    orders: HashMap<String, Order>,
}

impl OrderMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a pushed batch and hands it back for after-update hooks.
    pub fn apply(&mut self, batch: Vec<Order>) -> Vec<Order> {
        for order in &batch {
            match action_for(order.order_status) {
                OrderAction::Upsert => {
                    self.orders.insert(order.order_id.clone(), order.clone());
                }
                OrderAction::Remove => {
                    self.orders.remove(&order.order_id);
                }
                OrderAction::Ignore => {
                    debug!(
                        "[{}] Ignoring order {} in status {:?}",
                        order.symbol, order.order_id, order.order_status
                    );
                }
            }
        }
        batch
    }

    /// Replaces the mirror with a polled list of open orders.
    pub fn replace_all(&mut self, orders: Vec<Order>) {
        self.orders = orders
            .into_iter()
            .filter(|o| action_for(o.order_status) == OrderAction::Upsert)
            .map(|o| (o.order_id.clone(), o))
            .collect();
    }

    pub fn find_by_symbol_and_status(&self, symbol: &str, status: OrderStatus) -> Vec<&Order> {
        self.orders
            .values()
            .filter(|o| o.symbol == symbol && o.order_status == status)
            .collect()
    }

    /// Whether the symbol has a resting (`New`) order.
    pub fn has_order(&self, symbol: &str) -> bool {
        !self.find_by_symbol_and_status(symbol, OrderStatus::New).is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }
}
