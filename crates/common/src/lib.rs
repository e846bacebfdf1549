//! Shared types used across the inventory reservation workspace.

mod types;
mod version;

pub use types::{LineItemId, OrderId, ProductId, ReservationId, UserId};
pub use version::Version;
