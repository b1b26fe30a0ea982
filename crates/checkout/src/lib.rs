//! The checkout surface: order transaction coordination over the stock
//! ledger, the durable store, and the fulfillment queue.
//!
//! The central guarantee is all-or-nothing checkout: a returned order means
//! every line was reserved and the order committed durably; any error means
//! nothing observable changed.

pub mod cart;
pub mod coordinator;
pub mod error;

pub use cart::{CartError, CartService, InMemoryCart};
pub use coordinator::CheckoutCoordinator;
pub use error::CheckoutError;
