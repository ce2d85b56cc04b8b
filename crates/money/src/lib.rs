//! Monetary value objects: currency tags, fixed-point amounts, exchange rates.
//!
//! Amounts are stored as an integer count of minor units (hundredths), so
//! addition is exact and comparisons are trivial. Decimal math only happens
//! at the boundaries: construction, parsing, and conversion.

pub mod currency;
pub mod money;
pub mod rates;

pub use currency::Currency;
pub use money::{Money, MoneyError};
pub use rates::ExchangeRates;
