//! Persistence for the reservation core.
//!
//! [`InventoryStore`] is the port the services talk to; every method is
//! atomic on its own. Two adapters are provided:
//! - [`InMemoryInventoryStore`] for tests and local runs
//! - [`PostgresInventoryStore`] backed by `sqlx`

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use query::OrderQuery;
pub use store::{InventoryStore, ProductSnapshot, SweepOutcome, UpsertOutcome};
