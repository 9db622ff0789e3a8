//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    Settlement(SettlementEvent),
    Return(ReturnEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, sku: String },
    Published { product_id: Uuid },
    InventoryAdded { product_id: Uuid, quantity: u32 },
    InventoryRemoved { product_id: Uuid, quantity: u32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, customer_id: Uuid, total: Decimal },
    PaymentSubmitted { order_id: Uuid, proof_id: Uuid },
    Paid { order_id: Uuid },
    PaymentRejected { order_id: Uuid, reason: String },
    Shipped { order_id: Uuid, tracking: Option<String> },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEvent {
    Created { settlement_id: Uuid, vendor_id: Uuid, balance: Decimal },
    Approved { settlement_id: Uuid },
    Paid { settlement_id: Uuid, reference: String },
    Cancelled { settlement_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReturnEvent {
    Requested { return_id: Uuid, order_id: Uuid, quantity: u32 },
    Approved { return_id: Uuid, refund: Decimal },
    Rejected { return_id: Uuid },
}

impl DomainEvent {
    /// Subject suffix used when the event is published, e.g. `order.paid`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Product(e) => ("product", match e {
                ProductEvent::Created { .. } => "created",
                ProductEvent::Published { .. } => "published",
                ProductEvent::InventoryAdded { .. } => "inventory_added",
                ProductEvent::InventoryRemoved { .. } => "inventory_removed",
            }),
            Self::Order(e) => ("order", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::PaymentSubmitted { .. } => "payment_submitted",
                OrderEvent::Paid { .. } => "paid",
                OrderEvent::PaymentRejected { .. } => "payment_rejected",
                OrderEvent::Shipped { .. } => "shipped",
                OrderEvent::Delivered { .. } => "delivered",
                OrderEvent::Cancelled { .. } => "cancelled",
            }),
            Self::Settlement(e) => ("settlement", match e {
                SettlementEvent::Created { .. } => "created",
                SettlementEvent::Approved { .. } => "approved",
                SettlementEvent::Paid { .. } => "paid",
                SettlementEvent::Cancelled { .. } => "cancelled",
            }),
            Self::Return(e) => ("return", match e {
                ReturnEvent::Requested { .. } => "requested",
                ReturnEvent::Approved { .. } => "approved",
                ReturnEvent::Rejected { .. } => "rejected",
            }),
        };
        format!("{aggregate}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject() {
        let e = DomainEvent::Order(OrderEvent::Paid { order_id: Uuid::nil() });
        assert_eq!(e.subject(), "order.paid");
    }
}
