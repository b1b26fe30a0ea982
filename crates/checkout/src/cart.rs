//! Cart collaborator boundary.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::UserId;
use domain::CartLine;
use thiserror::Error;

/// Cart collaborator failure.
#[derive(Debug, Error)]
#[error("Cart unavailable: {0}")]
pub struct CartError(pub String);

/// Read-and-clear access to a user's cart.
///
/// The coordinator only ever snapshots the lines at checkout time and
/// clears them after a successful commit.
#[async_trait]
pub trait CartService: Send + Sync {
    /// Returns the current cart lines for a user.
    async fn lines(&self, user_id: UserId) -> Result<Vec<CartLine>, CartError>;

    /// Empties the user's cart.
    async fn clear(&self, user_id: UserId) -> Result<(), CartError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<UserId, Vec<CartLine>>,
    fail_on_clear: bool,
}

/// In-memory cart for testing and development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCart {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCart {
    /// Creates a new empty cart service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line to a user's cart, merging quantity into an existing
    /// line for the same product.
    pub fn add_line(&self, user_id: UserId, line: CartLine) {
        let mut state = self.state.write().unwrap();
        let cart = state.carts.entry(user_id).or_default();
        if let Some(existing) = cart.iter_mut().find(|l| l.product_id == line.product_id) {
            existing.quantity += line.quantity;
        } else {
            cart.push(line);
        }
    }

    /// Configures the cart to fail `clear` calls.
    pub fn set_fail_on_clear(&self, fail: bool) {
        self.state.write().unwrap().fail_on_clear = fail;
    }

    /// Returns the number of lines in a user's cart.
    pub fn line_count(&self, user_id: UserId) -> usize {
        self.state
            .read()
            .unwrap()
            .carts
            .get(&user_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl CartService for InMemoryCart {
    async fn lines(&self, user_id: UserId) -> Result<Vec<CartLine>, CartError> {
        let state = self.state.read().unwrap();
        Ok(state.carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, user_id: UserId) -> Result<(), CartError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_clear {
            return Err(CartError("injected clear failure".to_string()));
        }
        state.carts.remove(&user_id);
        Ok(())
    }
}
