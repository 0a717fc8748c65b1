//! Domain layer for wallet order orchestration.
//!
//! This crate provides:
//! - the `Order` document and its channel payloads
//! - the `OrderStatus` state machine
//! - `OrderRepository` and `EventPublisher` seams with in-memory implementations
//! - `OrderService`, the only writer of order status

pub mod error;
pub mod order;
pub mod publisher;
pub mod repository;

pub use error::{DomainError, PublishError};
pub use order::{
    BankInfo, BillInfo, CardInfo, Money, NewOrder, Order, OrderError, OrderService, OrderStatus,
    OrderStatusChanged, OrderType, PurchasedCard, RefundInfo, RefundMode, RefundType,
    SourceOfFund,
};
pub use publisher::{EventPublisher, InMemoryEventPublisher, TracingEventPublisher};
pub use repository::{InMemoryOrderRepository, OrderRepository};
