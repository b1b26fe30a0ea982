//! Background order fulfillment for the checkout core.
//!
//! A fixed-size pool of workers drains a bounded queue of committed orders
//! and drives each one through the status state machine
//! (`Pending -> Processing -> Shipped`), capturing payment along the way.
//! A periodic sweep re-submits orders left `Pending` past a threshold, so
//! no committed order is ever stranded even if its direct submission was
//! dropped.
//!
//! Per-order mutual exclusion is enforced twice: a shared in-flight claim
//! set at dequeue time, and a persisted-status re-check before the first
//! transition. Different orders are processed fully in parallel.

pub mod config;
pub mod error;
pub mod pool;
pub mod services;
mod sweep;

pub use config::FulfillmentConfig;
pub use error::FulfillmentError;
pub use pool::{FulfillmentHandle, FulfillmentPool};
pub use services::{
    InMemoryNotifier, InMemoryPaymentGateway, NotifyError, Notifier, OrderEventKind, PaymentError,
    PaymentGateway, PaymentReceipt,
};
