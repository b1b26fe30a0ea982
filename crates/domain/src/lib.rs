//! Order domain model for the checkout core.
//!
//! This crate provides:
//! - The `Order` / `OrderLine` model and the `OrderDraft` handed to the
//!   durable store for atomic persistence
//! - The `OrderStatus` state machine and `PaymentStatus`
//! - `CartLine`, the shape of cart contents consumed by the coordinator

pub mod cart;
pub mod error;
pub mod order;

pub use cart::CartLine;
pub use error::DomainError;
pub use order::{Order, OrderDraft, OrderLine, OrderStatus, PaymentStatus};
