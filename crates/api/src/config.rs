//! Process configuration.
//!
//! Rates are static per process: they are read once here and injected into
//! the dispatcher at startup. Changing them mid-process is a test hook, not
//! a production capability.

use std::str::FromStr;

use rust_decimal::Decimal;

use billflow_money::ExchangeRates;

const DEFAULT_USD_TO_GEL: &str = "2.7777";
const DEFAULT_GEL_TO_USD: &str = "0.3601";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub rates: ExchangeRates,
    pub listen_addr: String,
}

impl Config {
    /// Resolve configuration from the environment, falling back to the
    /// built-in defaults.
    pub fn from_env() -> Self {
        Self {
            rates: ExchangeRates::new(
                decimal_env("RATE_USD_TO_GEL", DEFAULT_USD_TO_GEL),
                decimal_env("RATE_GEL_TO_USD", DEFAULT_GEL_TO_USD),
            ),
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string()),
        }
    }

    pub fn default_rates() -> ExchangeRates {
        ExchangeRates::new(
            parse_decimal(DEFAULT_USD_TO_GEL),
            parse_decimal(DEFAULT_GEL_TO_USD),
        )
    }
}

fn decimal_env(key: &str, default: &str) -> Decimal {
    match std::env::var(key) {
        Ok(raw) => Decimal::from_str(&raw).unwrap_or_else(|_| {
            tracing::warn!(%key, %raw, "ignoring unparseable rate override");
            parse_decimal(default)
        }),
        Err(_) => parse_decimal(default),
    }
}

fn parse_decimal(s: &str) -> Decimal {
    Decimal::from_str(s).expect("built-in rate constants are valid decimals")
}
