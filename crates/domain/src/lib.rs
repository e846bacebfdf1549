//! Domain layer for the inventory reservation core.
//!
//! This crate holds the plain data model and the rules that do not need
//! storage or I/O:
//! - products, reservations and line items
//! - customer and stock order state machines
//! - availability arithmetic and pricing

pub mod error;
pub mod line_item;
pub mod order;
pub mod product;
pub mod quantity;
pub mod reservation;
pub mod user;
pub mod value_objects;

pub use error::{ErrorKind, ReasonCode};
pub use line_item::LineItem;
pub use order::{
    Counterparty, CustomerOrder, OrderError, OrderKind, OrderLike, OrderRecord, OrderStatus,
    Packaging, StatusEffect, StatusTimestamps, StockOrder, StockOrderStatus, validate_quantity,
};
pub use product::Product;
pub use quantity::{QuantityDetails, available_for_order};
pub use reservation::{HoldPolicy, Reservation, ReservationUpsert};
pub use user::AuthorProfile;
pub use value_objects::{DiscountPercent, Money, PriceList, PriceTier, PricingProfile};
