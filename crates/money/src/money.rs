//! Fixed-point monetary amount tagged with a currency.

use core::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::currency::Currency;
use crate::rates::ExchangeRates;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("invalid amount format: {0}")]
    InvalidAmount(String),

    #[error("amount cannot be negative")]
    Negative,

    #[error("cannot add different currencies: {0} and {1}")]
    CurrencyMismatch(Currency, Currency),

    #[error("invalid currency: {0}")]
    UnknownCurrency(String),

    #[error("no recognized currency symbol")]
    UnknownSymbol,

    #[error("amount exceeds the representable minor-unit range")]
    Overflow,
}

/// Non-negative monetary amount in a specific currency.
///
/// Stored as an integer count of minor units (hundredths). Addition never
/// rounds; construction, parsing, and conversion round half-away-from-zero
/// exactly once.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Money {
    cents: i64,
    currency: Currency,
}

impl Money {
    /// Build from a decimal amount, rounding to minor units.
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        let cents = decimal_to_cents(amount)?;
        if cents < 0 {
            return Err(MoneyError::Negative);
        }
        Ok(Self { cents, currency })
    }

    /// Parse a plain decimal string (no currency symbol) into minor units.
    pub fn parse(amount: &str, currency: Currency) -> Result<Self, MoneyError> {
        let amount = Decimal::from_str(amount.trim())
            .map_err(|e| MoneyError::InvalidAmount(e.to_string()))?;
        Self::new(amount, currency)
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self { cents: 0, currency }
    }

    /// Build directly from a minor-unit count.
    pub fn from_minor_units(cents: i64, currency: Currency) -> Result<Self, MoneyError> {
        if cents < 0 {
            return Err(MoneyError::Negative);
        }
        Ok(Self { cents, currency })
    }

    pub fn minor_units(&self) -> i64 {
        self.cents
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// The amount as an exact decimal.
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.cents, 2)
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Exact same-currency addition.
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(self.currency, other.currency));
        }

        let cents = self
            .cents
            .checked_add(other.cents)
            .ok_or(MoneyError::Overflow)?;

        Ok(Money {
            cents,
            currency: self.currency,
        })
    }

    /// Convert into `target` using the directed factor from `rates`.
    ///
    /// Multiplies the decimal amount (not the raw minor units) by the rate,
    /// then rounds once, so conversion never compounds truncation.
    pub fn convert_to(&self, target: Currency, rates: &ExchangeRates) -> Result<Money, MoneyError> {
        if self.currency == target {
            return Ok(*self);
        }

        let factor = match (self.currency, target) {
            (Currency::Usd, Currency::Gel) => rates.usd_to_gel(),
            (Currency::Gel, Currency::Usd) => rates.gel_to_usd(),
            // Same-currency pairs are handled above; with a closed two-member
            // currency set no other pair exists.
            (a, b) => {
                debug_assert_eq!(a, b);
                return Ok(*self);
            }
        };

        let converted = self
            .amount()
            .checked_mul(factor)
            .ok_or(MoneyError::Overflow)?;

        Money::new(converted, target)
    }
}

/// Round a decimal amount to minor units, half-away-from-zero.
fn decimal_to_cents(amount: Decimal) -> Result<i64, MoneyError> {
    let scaled = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(MoneyError::Overflow)?;

    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(MoneyError::Overflow)
}

impl core::fmt::Display for Money {
    /// Canonical rendering: `<symbol><integer>.<2 digits>`, e.g. `$46.01`.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}{}.{:02}",
            self.currency.symbol(),
            self.cents / 100,
            self.cents % 100
        )
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    /// Parse the tagged form produced by `Display` (`$123.45`, `₾27.78`).
    ///
    /// The symbol selects the currency; the remainder must be a non-negative
    /// decimal. A leading minus anywhere is a failure.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (currency, rest) = if let Some(rest) = s.strip_prefix('$') {
            (Currency::Usd, rest)
        } else if let Some(rest) = s.strip_prefix('₾') {
            (Currency::Gel, rest)
        } else {
            return Err(MoneyError::UnknownSymbol);
        };

        Money::parse(rest, currency)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn rates() -> ExchangeRates {
        ExchangeRates::new(dec("2.5"), dec("0.4"))
    }

    #[test]
    fn new_stores_minor_units_and_currency() {
        let m = Money::new(dec("123.45"), Currency::Usd).unwrap();
        assert_eq!(m.minor_units(), 12345);
        assert_eq!(m.currency(), Currency::Usd);
    }

    #[test]
    fn new_rejects_negative_amounts() {
        assert_eq!(
            Money::new(dec("-123.45"), Currency::Usd),
            Err(MoneyError::Negative)
        );
        // Zero stays fine.
        assert_eq!(Money::new(dec("0"), Currency::Usd).unwrap().minor_units(), 0);
    }

    #[test]
    fn parse_accepts_plain_decimal_strings() {
        let m = Money::parse("123.45", Currency::Usd).unwrap();
        assert_eq!(m.minor_units(), 12345);
        assert!(Money::parse("invalid", Currency::Usd).is_err());
        assert!(Money::parse("-123.45", Currency::Usd).is_err());
    }

    #[test]
    fn construction_rounds_half_away_from_zero() {
        for (input, want) in [
            ("123.45", 12345),
            ("0.01", 1),
            ("0", 0),
            ("0.001", 0),
            ("0.004", 0),
            ("0.005", 1),
            ("0.009", 1),
            ("0.994", 99),
            ("0.995", 100),
        ] {
            let m = Money::new(dec(input), Currency::Usd).unwrap();
            assert_eq!(m.minor_units(), want, "input {input}");
        }
    }

    #[test]
    fn add_combines_same_currency_exactly() {
        let a = Money::new(dec("100"), Currency::Usd).unwrap();
        let b = Money::new(dec("50"), Currency::Usd).unwrap();
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.minor_units(), 15000);
        assert_eq!(sum.currency(), Currency::Usd);

        let c = Money::new(dec("0.01"), Currency::Usd).unwrap();
        let d = Money::new(dec("0.02"), Currency::Usd).unwrap();
        assert_eq!(c.add(&d).unwrap().minor_units(), 3);
    }

    #[test]
    fn addition_is_commutative_and_associative() {
        let a = Money::new(dec("1.23"), Currency::Usd).unwrap();
        let b = Money::new(dec("4.56"), Currency::Usd).unwrap();
        let c = Money::new(dec("7.89"), Currency::Usd).unwrap();

        assert_eq!(a.add(&b).unwrap(), b.add(&a).unwrap());
        assert_eq!(
            a.add(&b).unwrap().add(&c).unwrap(),
            a.add(&b.add(&c).unwrap()).unwrap()
        );
    }

    #[test]
    fn add_rejects_currency_mismatch() {
        let a = Money::new(dec("100"), Currency::Usd).unwrap();
        let b = Money::new(dec("50"), Currency::Gel).unwrap();
        assert_eq!(
            a.add(&b),
            Err(MoneyError::CurrencyMismatch(Currency::Usd, Currency::Gel))
        );
    }

    #[test]
    fn add_surfaces_overflow_instead_of_wrapping() {
        let a = Money::from_minor_units(i64::MAX - 100, Currency::Usd).unwrap();
        let b = Money::new(dec("1"), Currency::Usd).unwrap();
        assert_eq!(a.add(&b).unwrap().minor_units(), i64::MAX);

        let c = Money::new(dec("2"), Currency::Usd).unwrap();
        assert_eq!(a.add(&c), Err(MoneyError::Overflow));
    }

    #[test]
    fn convert_same_currency_is_identity() {
        let m = Money::new(dec("100"), Currency::Usd).unwrap();
        let r = m.convert_to(Currency::Usd, &rates()).unwrap();
        assert_eq!(r, m);
    }

    #[test]
    fn convert_usd_to_gel_uses_directed_rate() {
        let m = Money::new(dec("100"), Currency::Usd).unwrap();
        let r = m.convert_to(Currency::Gel, &rates()).unwrap();
        assert_eq!(r.minor_units(), 25000);
        assert_eq!(r.currency(), Currency::Gel);
    }

    #[test]
    fn convert_gel_to_usd_uses_directed_rate() {
        let m = Money::new(dec("100"), Currency::Gel).unwrap();
        let r = m.convert_to(Currency::Usd, &rates()).unwrap();
        assert_eq!(r.minor_units(), 4000);
        assert_eq!(r.currency(), Currency::Usd);
    }

    #[test]
    fn convert_multiplies_the_decimal_amount_not_the_cents() {
        // 0.01 USD * 2.5 = 0.025 GEL, rounded away from zero to 3 tetri.
        let m = Money::new(dec("0.01"), Currency::Usd).unwrap();
        let r = m.convert_to(Currency::Gel, &rates()).unwrap();
        assert_eq!(r.minor_units(), 3);
    }

    #[test]
    fn round_trip_conversion_stays_within_one_minor_unit() {
        let m = Money::new(dec("0.01"), Currency::Usd).unwrap();
        let there = m.convert_to(Currency::Gel, &rates()).unwrap();
        let back = there.convert_to(Currency::Usd, &rates()).unwrap();
        assert_eq!(back.minor_units(), 1);
    }

    #[test]
    fn convert_handles_zero_and_extreme_rates() {
        let zero = Money::zero(Currency::Usd);
        let r = zero.convert_to(Currency::Gel, &rates()).unwrap();
        assert_eq!(r.minor_units(), 0);
        assert_eq!(r.currency(), Currency::Gel);

        let extreme = ExchangeRates::new(dec("1000000"), dec("0.000001"));
        let m = Money::new(dec("100"), Currency::Usd).unwrap();
        let r = m.convert_to(Currency::Gel, &extreme).unwrap();
        assert_eq!(r.minor_units(), 10_000_000_000);
    }

    #[test]
    fn display_renders_symbol_and_two_decimals() {
        for (cents, currency, want) in [
            (12345, Currency::Usd, "$123.45"),
            (12345, Currency::Gel, "₾123.45"),
            (1, Currency::Usd, "$0.01"),
            (10, Currency::Usd, "$0.10"),
            (0, Currency::Usd, "$0.00"),
        ] {
            let m = Money::from_minor_units(cents, currency).unwrap();
            assert_eq!(m.to_string(), want);
        }
    }

    #[test]
    fn parse_render_round_trips() {
        let m: Money = "$123.45".parse().unwrap();
        assert_eq!(m.minor_units(), 12345);
        assert_eq!(m.currency(), Currency::Usd);
        assert_eq!(m.to_string(), "$123.45");

        let m: Money = "₾27.78".parse().unwrap();
        assert_eq!(m.minor_units(), 2778);
        assert_eq!(m.currency(), Currency::Gel);
        assert_eq!(m.to_string(), "₾27.78");
    }

    #[test]
    fn parse_trims_whitespace_around_and_inside() {
        let m: Money = " $123.45 ".parse().unwrap();
        assert_eq!(m.minor_units(), 12345);
        assert_eq!(m.currency(), Currency::Usd);
    }

    #[test]
    fn parse_rejects_unknown_symbols_and_garbage() {
        assert_eq!("invalid".parse::<Money>(), Err(MoneyError::UnknownSymbol));
        assert_eq!("€123.45".parse::<Money>(), Err(MoneyError::UnknownSymbol));
        assert!(matches!(
            "$abc".parse::<Money>(),
            Err(MoneyError::InvalidAmount(_))
        ));
    }

    #[test]
    fn parse_rejects_negative_in_either_position() {
        assert_eq!("-$123.45".parse::<Money>(), Err(MoneyError::UnknownSymbol));
        assert_eq!("$-123.45".parse::<Money>(), Err(MoneyError::Negative));
    }

    #[test]
    fn serde_round_trips_the_tagged_string() {
        let m = Money::from_minor_units(12345, Currency::Usd).unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"$123.45\"");

        let m = Money::from_minor_units(12345, Currency::Gel).unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"₾123.45\"");

        let m: Money = serde_json::from_str("\"$123.45\"").unwrap();
        assert_eq!(m.minor_units(), 12345);
        assert_eq!(m.currency(), Currency::Usd);

        let m: Money = serde_json::from_str("\"$0\"").unwrap();
        assert_eq!(m.minor_units(), 0);

        assert!(serde_json::from_str::<Money>("\"-$123.45\"").is_err());
        assert!(serde_json::from_str::<Money>("\"€123.45\"").is_err());
    }

    #[test]
    fn amount_returns_the_exact_decimal() {
        let m = Money::from_minor_units(12345, Currency::Usd).unwrap();
        assert_eq!(m.amount(), dec("123.45"));
    }
}
