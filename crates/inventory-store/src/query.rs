use common::UserId;
use domain::OrderKind;

/// Filter for order listings.
///
/// Results are always ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by order family.
    pub kind: Option<OrderKind>,

    /// Filter by author.
    pub author: Option<UserId>,

    /// Filter by status name (any of these).
    pub statuses: Option<Vec<&'static str>>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one order family.
    pub fn for_kind(kind: OrderKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    /// Filters by author.
    pub fn author(mut self, author: UserId) -> Self {
        self.author = Some(author);
        self
    }

    /// Filters by a set of status names.
    pub fn statuses(mut self, statuses: Vec<&'static str>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    /// Applies page-based pagination (pages start at 1).
    pub fn page(mut self, page: usize, per_page: usize) -> Self {
        let page = page.max(1);
        self.offset = Some((page - 1) * per_page);
        self.limit = Some(per_page);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if an order with these attributes matches the filter.
    pub fn matches(&self, kind: OrderKind, author: UserId, status: &str) -> bool {
        if let Some(k) = self.kind
            && k != kind
        {
            return false;
        }
        if let Some(a) = self.author
            && a != author
        {
            return false;
        }
        if let Some(ref statuses) = self.statuses
            && !statuses.contains(&status)
        {
            return false;
        }
        true
    }
}
