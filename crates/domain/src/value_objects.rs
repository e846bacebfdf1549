//! Value objects for prices and pricing profiles.

use serde::{Deserialize, Serialize};

/// Money amount in minor units (cents) to avoid floating point issues.
///
/// The core handles a single currency, so no currency code is carried.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * i64::from(quantity),
        }
    }

    /// Applies a percentage discount, rounding the result down to whole cents.
    pub fn discounted(&self, discount: DiscountPercent) -> Money {
        let keep = i64::from(100 - discount.value());
        Money {
            cents: (self.cents * keep).div_euclid(100),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Price tier a buyer is billed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    #[default]
    Retail,
    Wholesale,
    Distributor,
}

impl PriceTier {
    /// Returns the tier name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTier::Retail => "retail",
            PriceTier::Wholesale => "wholesale",
            PriceTier::Distributor => "distributor",
        }
    }
}

impl std::fmt::Display for PriceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discount expressed in whole percent, clamped to `0..=100`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "u8", into = "u8")]
pub struct DiscountPercent(u8);

impl DiscountPercent {
    /// Creates a discount, clamping values above 100.
    pub fn new(percent: u8) -> Self {
        Self(percent.min(100))
    }

    /// No discount.
    pub fn none() -> Self {
        Self(0)
    }

    /// Returns the percentage.
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for DiscountPercent {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<DiscountPercent> for u8 {
    fn from(value: DiscountPercent) -> Self {
        value.0
    }
}

/// Price tier plus discount applied when an order is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PricingProfile {
    pub tier: PriceTier,
    #[serde(default)]
    pub discount: DiscountPercent,
}

impl PricingProfile {
    pub fn new(tier: PriceTier, discount: DiscountPercent) -> Self {
        Self { tier, discount }
    }
}

/// Denormalized per-tier prices of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceList {
    pub retail: Money,
    pub wholesale: Money,
    pub distributor: Money,
}

impl PriceList {
    /// Uses the same price for every tier.
    pub fn flat(price: Money) -> Self {
        Self {
            retail: price,
            wholesale: price,
            distributor: price,
        }
    }

    /// Returns the list price for a tier.
    pub fn for_tier(&self, tier: PriceTier) -> Money {
        match tier {
            PriceTier::Retail => self.retail,
            PriceTier::Wholesale => self.wholesale,
            PriceTier::Distributor => self.distributor,
        }
    }
}
