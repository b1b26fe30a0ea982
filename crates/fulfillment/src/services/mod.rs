//! External collaborator adapters invoked after an order has committed.
//!
//! Both adapters run entirely outside any ledger lock: payment capture is a
//! synchronous call with a typed result, notification is fire-and-forget.

pub mod notifier;
pub mod payment;

pub use notifier::{InMemoryNotifier, NotifyError, Notifier, OrderEventKind};
pub use payment::{InMemoryPaymentGateway, PaymentError, PaymentGateway, PaymentReceipt};
