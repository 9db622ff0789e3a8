//! Return request (Devolución) Aggregate

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::aggregates::order::{Order, OrderStatus};
use crate::domain::events::{DomainEvent, ReturnEvent};
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus { #[default] Requested, Approved, Rejected }

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Requested => "requested", Self::Approved => "approved", Self::Rejected => "rejected" }
    }
}

impl FromStr for ReturnStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown return status '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub line_id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub customer_id: Uuid,
    pub quantity: u32,
    pub reason: String,
    pub refund: Money,
    pub status: ReturnStatus,
    pub restock: bool,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub resolution_note: Option<String>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl ReturnRequest {
    /// Opens a return for `quantity` units of `line_id`.
    /// `pending` is the number of units of that line already in open requests.
    pub fn open(order: &Order, line_id: Uuid, quantity: u32, reason: &str, pending: u32, window_days: i64, now: DateTime<Utc>) -> Result<Self, ReturnError> {
        if order.status() != OrderStatus::Delivered { return Err(ReturnError::OrderNotDelivered); }
        let delivered_at = order.delivered_at().ok_or(ReturnError::OrderNotDelivered)?;
        if now > delivered_at + Duration::days(window_days) { return Err(ReturnError::WindowClosed { days: window_days }); }
        let line = order.line(line_id).ok_or(ReturnError::LineNotFound)?;
        let returnable = line.returnable().saturating_sub(pending);
        if quantity == 0 || quantity > returnable { return Err(ReturnError::QuantityExceeded { returnable }); }
        if reason.trim().is_empty() { return Err(ReturnError::MissingReason); }

        let id = Uuid::now_v7();
        let mut request = Self {
            id, order_id: order.id(), line_id, product_id: line.product_id, vendor_id: line.vendor_id,
            customer_id: order.customer_id(), quantity, reason: reason.trim().to_string(), refund: line.refund_for(quantity),
            status: ReturnStatus::Requested, restock: true, requested_at: now, resolved_at: None, resolved_by: None,
            resolution_note: None, events: vec![],
        };
        request.raise_event(DomainEvent::Return(ReturnEvent::Requested { return_id: id, order_id: order.id(), quantity }));
        Ok(request)
    }

    pub fn is_open(&self) -> bool { self.status == ReturnStatus::Requested }

    pub fn approve(&mut self, by: Uuid, restock: bool, note: Option<String>) -> Result<(), ReturnError> {
        if !self.is_open() { return Err(ReturnError::AlreadyResolved); }
        self.status = ReturnStatus::Approved;
        self.restock = restock;
        self.resolve(by, note);
        self.raise_event(DomainEvent::Return(ReturnEvent::Approved { return_id: self.id, refund: self.refund.amount() }));
        Ok(())
    }

    pub fn reject(&mut self, by: Uuid, note: Option<String>) -> Result<(), ReturnError> {
        if !self.is_open() { return Err(ReturnError::AlreadyResolved); }
        self.status = ReturnStatus::Rejected;
        self.restock = false;
        self.resolve(by, note);
        self.raise_event(DomainEvent::Return(ReturnEvent::Rejected { return_id: self.id }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }

    fn resolve(&mut self, by: Uuid, note: Option<String>) {
        self.resolved_by = Some(by);
        self.resolved_at = Some(Utc::now());
        self.resolution_note = note;
    }
}

/// Persistence-side constructor; no events are raised.
#[allow(clippy::too_many_arguments)]
impl ReturnRequest {
    pub fn restore(
        id: Uuid, order_id: Uuid, line_id: Uuid, product_id: Uuid, vendor_id: Uuid, customer_id: Uuid, quantity: u32,
        reason: String, refund: Money, status: ReturnStatus, restock: bool, requested_at: DateTime<Utc>,
        resolved_at: Option<DateTime<Utc>>, resolved_by: Option<Uuid>, resolution_note: Option<String>,
    ) -> Self {
        Self {
            id, order_id, line_id, product_id, vendor_id, customer_id, quantity, reason, refund, status, restock,
            requested_at, resolved_at, resolved_by, resolution_note, events: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnError { OrderNotDelivered, LineNotFound, MissingReason, AlreadyResolved, WindowClosed { days: i64 }, QuantityExceeded { returnable: u32 } }
impl std::error::Error for ReturnError {}
impl std::fmt::Display for ReturnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrderNotDelivered => write!(f, "Only delivered orders can be returned"),
            Self::LineNotFound => write!(f, "Order line not found"),
            Self::MissingReason => write!(f, "A reason is required"),
            Self::AlreadyResolved => write!(f, "Return request already resolved"),
            Self::WindowClosed { days } => write!(f, "Returns are accepted within {days} days of delivery"),
            Self::QuantityExceeded { returnable } => write!(f, "Only {returnable} units can be returned"),
        }
    }
}
