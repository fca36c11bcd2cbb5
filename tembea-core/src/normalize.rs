use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

use crate::payment::Currency;
use crate::{PaymentError, PaymentResult};

// ============================================================================
// Phone numbers
// ============================================================================

/// Subscriber numbers are nine digits in every market we dial into.
const SUBSCRIBER_DIGITS: usize = 9;

/// Normalize a user-entered phone number into the digits-only international
/// form mobile-money providers expect, e.g. `0712 345-678` → `254712345678`.
pub fn normalize_phone(raw: &str, calling_code: &str) -> PaymentResult<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '(' | ')'))
        .collect();

    let digits = compact
        .strip_prefix('+')
        .or_else(|| compact.strip_prefix("00"))
        .unwrap_or(&compact);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::Validation(format!(
            "phone_number is not a valid number: {}",
            raw
        )));
    }

    let international = calling_code.len() + SUBSCRIBER_DIGITS;
    if digits.len() == international && digits.starts_with(calling_code) {
        return Ok(digits.to_string());
    }
    if digits.len() == SUBSCRIBER_DIGITS + 1 && digits.starts_with('0') {
        return Ok(format!("{}{}", calling_code, &digits[1..]));
    }
    if digits.len() == SUBSCRIBER_DIGITS && !digits.starts_with('0') {
        return Ok(format!("{}{}", calling_code, digits));
    }

    Err(PaymentError::Validation(format!(
        "phone_number {} is not a +{} number",
        raw, calling_code
    )))
}

// ============================================================================
// Currency conversion
// ============================================================================

/// Static exchange rates, quoted as units of each currency per one unit of
/// the base currency, valid as of a point in time.
#[derive(Debug, Clone)]
pub struct RateTable {
    base: Currency,
    rates: HashMap<Currency, Decimal>,
    as_of: DateTime<Utc>,
}

impl RateTable {
    pub fn new(base: Currency, as_of: DateTime<Utc>) -> Self {
        let mut rates = HashMap::new();
        rates.insert(base, Decimal::ONE);
        Self { base, rates, as_of }
    }

    pub fn with_rate(mut self, currency: Currency, units_per_base: Decimal) -> Self {
        self.rates.insert(currency, units_per_base);
        self
    }

    pub fn base(&self) -> Currency {
        self.base
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn rate(&self, currency: Currency) -> Option<Decimal> {
        self.rates.get(&currency).copied()
    }

    /// Convert and round to two decimal places.
    pub fn convert(&self, amount: Decimal, from: Currency, to: Currency) -> PaymentResult<Decimal> {
        if from == to {
            return Ok(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero));
        }

        let from_rate = self.usable_rate(from)?;
        let to_rate = self.usable_rate(to)?;
        let converted = amount / from_rate * to_rate;
        Ok(converted.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.as_of > max_age
    }

    fn usable_rate(&self, currency: Currency) -> PaymentResult<Decimal> {
        match self.rate(currency) {
            Some(rate) if rate > Decimal::ZERO => Ok(rate),
            _ => Err(PaymentError::Validation(format!(
                "No exchange rate configured for {}",
                currency
            ))),
        }
    }
}
