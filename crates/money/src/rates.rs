//! Exchange-rate table.

use rust_decimal::Decimal;

/// Immutable pair of directed conversion factors.
///
/// The two factors are independent; the engine never inverts one to derive
/// the other.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExchangeRates {
    usd_to_gel: Decimal,
    gel_to_usd: Decimal,
}

impl ExchangeRates {
    pub fn new(usd_to_gel: Decimal, gel_to_usd: Decimal) -> Self {
        Self {
            usd_to_gel,
            gel_to_usd,
        }
    }

    pub fn usd_to_gel(&self) -> Decimal {
        self.usd_to_gel
    }

    pub fn gel_to_usd(&self) -> Decimal {
        self.gel_to_usd
    }
}
