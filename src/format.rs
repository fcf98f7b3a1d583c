//! Display helpers for the presentation boundary.
//!
//! Metrics stay full precision; rounding happens only here. Grouping is
//! always `,` so output does not depend on the host locale.

use crate::schema::Currency;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

const MILLION: Decimal = dec!(1000000);
const COMPACT_THOUSANDS_FROM: Decimal = dec!(100000);
const THOUSAND: Decimal = dec!(1000);

fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded
}

/// Inserts `,` every three digits of a plain unsigned integer string.
fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

fn sign(value: Decimal) -> &'static str {
    if value.is_sign_negative() && !value.is_zero() {
        "-"
    } else {
        ""
    }
}

/// Whole units, half away from zero, comma grouped: `1234.5` -> `"1,235"`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = round_half_up(amount, 0);
    let digits = rounded.abs().to_string();
    format!("{}{}", sign(rounded), group_digits(&digits))
}

/// `"SSP 1,235"`.
pub fn format_money(amount: Decimal, currency: Currency) -> String {
    format!("{} {}", currency.code(), format_currency(amount))
}

/// `"1.3M"` from a million up, `"250K"` from a hundred thousand up, grouped
/// whole units below that.
pub fn format_compact(amount: Decimal) -> String {
    let magnitude = amount.abs();

    let body = if magnitude >= MILLION {
        format!("{}M", round_half_up(magnitude / MILLION, 1))
    } else if magnitude >= COMPACT_THOUSANDS_FROM {
        format!("{}K", round_half_up(magnitude / THOUSAND, 0))
    } else {
        return format_currency(amount);
    };

    format!("{}{}", sign(amount), body)
}

pub fn format_percent(value: Decimal, decimals: u32) -> String {
    let rounded = round_half_up(value, decimals);
    format!("{}%", rounded)
}

/// Like [`format_percent`] with an explicit `+` on positive values.
pub fn format_signed_percent(value: Decimal, decimals: u32) -> String {
    let rounded = round_half_up(value, decimals);
    if rounded > Decimal::ZERO {
        format!("+{}%", rounded)
    } else {
        format!("{}%", rounded)
    }
}
