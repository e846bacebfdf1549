//! Route handlers grouped by resource.

pub mod orders;
pub mod products;
pub mod reservations;
pub mod stock_orders;
pub mod system;
pub mod users;

use std::str::FromStr;

use inventory::{InMemoryUserDirectory, Inventory, Page};
use serde::Deserialize;

use crate::error::ApiError;

const MAX_PER_PAGE: usize = 100;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub inventory: Inventory<S>,
    /// Author profiles consulted by the services; seeded through `PUT /users/{id}`.
    pub users: InMemoryUserDirectory,
}

/// `?page=&per_page=` of listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        let defaults = Page::default();
        Page {
            page: self.page.unwrap_or(defaults.page).max(1),
            per_page: self
                .per_page
                .unwrap_or(defaults.per_page)
                .clamp(1, MAX_PER_PAGE),
        }
    }
}

fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
