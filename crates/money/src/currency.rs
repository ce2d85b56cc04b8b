//! Supported currencies.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::money::MoneyError;

/// Closed set of supported currencies.
///
/// New currencies are added by widening this enum, the rate table, and the
/// symbol table below - exhaustive matches will flag every site that needs
/// a decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Gel,
}

impl Currency {
    /// Display symbol used in rendered amounts.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Gel => "₾",
        }
    }

    /// ISO-style currency code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Gel => "GEL",
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "GEL" => Ok(Currency::Gel),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}
