#![deny(warnings)]

//! Amount text codec: converts what players type into canonical Major-unit
//! amounts and back.
//!
//! This module provides validated utilities for:
//! - Keystroke sanitising against each unit's typing grammar
//! - Commit-time normalisation to the coarser committed precision
//! - Canonical conversion and display formatting with digit grouping
//! - The settlement granularity check (0.1 M / 100 K)

use rust_decimal::{Decimal, RoundingStrategy};
use settle_core::{max_amount, DisplayUnit};
use thiserror::Error;
use tracing::debug;

/// Fraction digits canonical amounts are kept at (one Minor unit).
pub const CANONICAL_DECIMALS: u32 = 3;

/// Shown when a turn cannot close because of off-step amounts.
pub const GRANULARITY_MESSAGE: &str =
    "Check the amounts: M values go in steps of 0.1 and K values in steps of 100.";

/// Shown instead of digits when an amount cannot be scaled into the unit.
pub const OVERFLOW_TEXT: &str = "####";

/// Why a keystroke was not applied.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CodecError {
    /// Amounts are never negative.
    #[error("negative amounts are not accepted")]
    NegativeSign,
    /// Minor amounts are whole numbers.
    #[error("K amounts take no decimal separator")]
    DecimalInMinor,
    /// Text does not match the unit's grammar.
    #[error("malformed amount for unit {0}")]
    Malformed(DisplayUnit),
    /// Digit cap for the unit exceeded.
    #[error("at most {max} digits allowed")]
    TooManyDigits { max: usize },
    /// Value exceeds what one field may hold.
    #[error("amount out of range")]
    OutOfRange,
}

fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse unsigned `digits[.digits]` text. `None` when there are no digits,
/// any other character, or the value does not fit a `Decimal`.
pub fn parse_plain(text: &str) -> Option<Decimal> {
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let scale = u32::try_from(frac_part.len()).ok()?;
    if scale > 28 {
        return None;
    }
    let mut mantissa: i128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        mantissa = mantissa
            .checked_mul(10)?
            .checked_add(i128::from(b - b'0'))?;
    }
    Decimal::try_from_i128_with_scale(mantissa, scale).ok()
}

fn to_major(value: Decimal, unit: DisplayUnit) -> Decimal {
    match unit {
        DisplayUnit::Major => value,
        DisplayUnit::Minor => value / unit.scale(),
    }
}

/// Parsed Major amount, or `None` past the per-field cap.
fn within_cap(value: Decimal, unit: DisplayUnit) -> Option<Decimal> {
    let major = to_major(value, unit);
    (major <= max_amount()).then_some(major)
}

/// Validate one keystroke's worth of field text.
///
/// Returns the normalised text to keep (a Major decimal comma becomes `.`),
/// or the reason the edit must be dropped. The empty string is always
/// accepted and stands for zero.
pub fn sanitize_keystroke(text: &str, unit: DisplayUnit) -> Result<String, CodecError> {
    if text.is_empty() {
        return Ok(String::new());
    }
    if text.contains('-') {
        return Err(CodecError::NegativeSign);
    }
    let normalized = match unit {
        DisplayUnit::Major => text.replace(',', "."),
        DisplayUnit::Minor => {
            if text.contains('.') || text.contains(',') {
                return Err(CodecError::DecimalInMinor);
            }
            text.to_string()
        }
    };

    let well_formed = match normalized.split_once('.') {
        Some((int_part, frac_part)) => {
            int_part.bytes().all(|b| b.is_ascii_digit())
                && frac_part.bytes().all(|b| b.is_ascii_digit())
                && frac_part.len() <= unit.typed_decimals() as usize
        }
        None => normalized.bytes().all(|b| b.is_ascii_digit()),
    };
    if !well_formed {
        return Err(CodecError::Malformed(unit));
    }

    let digits = normalized.bytes().filter(|b| b.is_ascii_digit()).count();
    if digits > unit.max_digits() {
        return Err(CodecError::TooManyDigits {
            max: unit.max_digits(),
        });
    }

    // A lone "." is a partial entry and reads as zero.
    if digits > 0 {
        match parse_plain(&normalized) {
            Some(v) if v.is_sign_negative() && !v.is_zero() => {
                return Err(CodecError::NegativeSign)
            }
            Some(v) if within_cap(v, unit).is_none() => return Err(CodecError::OutOfRange),
            Some(_) => {}
            None => return Err(CodecError::OutOfRange),
        }
    }
    debug!(%unit, text = %normalized, "keystroke accepted");
    Ok(normalized)
}

/// Canonical amount of already-normalised text (sanitised keystroke or
/// formatted display text). Commas are digit grouping and are ignored.
/// Unparsable or over-cap text reads as zero; the result is kept at one
/// Minor unit.
pub fn to_canonical(text: &str, unit: DisplayUnit) -> Decimal {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let major = match parse_plain(&cleaned) {
        Some(v) => within_cap(v, unit).unwrap_or_else(|| {
            debug!(%unit, text = %cleaned, "amount over the field cap reads as zero");
            Decimal::ZERO
        }),
        None => Decimal::ZERO,
    };
    round_half_up(major, CANONICAL_DECIMALS).max(Decimal::ZERO)
}

/// Normalise a field when the player leaves it.
///
/// Major rounds to 0.1, Minor to a whole unit. Negative, unparsable or
/// over-cap text clamps to zero.
pub fn commit_and_normalize(text: &str, unit: DisplayUnit) -> Decimal {
    let trimmed = text.trim();
    let normalized = match unit {
        DisplayUnit::Major => trimmed.replace(',', "."),
        DisplayUnit::Minor => trimmed.to_string(),
    };
    let value = match parse_plain(&normalized) {
        Some(v) => v,
        None => {
            if !normalized.is_empty() {
                debug!(%unit, text = %normalized, "commit of unparsable text clamps to zero");
            }
            Decimal::ZERO
        }
    };
    let rounded = round_half_up(value, unit.committed_decimals()).max(Decimal::ZERO);
    within_cap(rounded, unit).unwrap_or_else(|| {
        debug!(%unit, text = %normalized, "commit over the field cap clamps to zero");
        Decimal::ZERO
    })
}

fn group_thousands(int_digits: &str) -> String {
    let len = int_digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in int_digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn render(amount: Decimal, unit: DisplayUnit, grouped: bool) -> String {
    if amount.is_zero() {
        return String::new();
    }
    let Some(scaled) = amount.checked_mul(unit.scale()) else {
        debug!(%unit, %amount, "amount too large to display");
        return OVERFLOW_TEXT.to_string();
    };
    let rounded = round_half_up(scaled, unit.typed_decimals()).normalize();
    if rounded.is_zero() {
        return "0".to_string();
    }
    let text = rounded.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };
    let mut out = String::new();
    if rounded.is_sign_negative() {
        out.push('-');
    }
    if grouped {
        out.push_str(&group_thousands(int_part));
    } else {
        out.push_str(int_part);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Display text for a canonical amount in `unit`: grouped thousands, and a
/// fraction only when the rounded value is not whole. Zero renders empty
/// so fields fall back to their placeholder.
pub fn format(amount: Decimal, unit: DisplayUnit) -> String {
    render(amount, unit, true)
}

/// Ungrouped text an input field shows for a canonical amount.
pub fn field_text(amount: Decimal, unit: DisplayUnit) -> String {
    render(amount, unit, false)
}

/// Whether a canonical amount sits on the settlement step (0.1 M = 100 K).
pub fn is_on_step(amount: Decimal) -> bool {
    amount.round_dp(DisplayUnit::Major.committed_decimals()) == amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const M: DisplayUnit = DisplayUnit::Major;
    const K: DisplayUnit = DisplayUnit::Minor;

    fn d(text: &str) -> Decimal {
        parse_plain(text).unwrap()
    }

    #[test]
    fn parse_plain_forms() {
        assert_eq!(parse_plain("12"), Some(Decimal::new(12, 0)));
        assert_eq!(parse_plain("1.25"), Some(Decimal::new(125, 2)));
        assert_eq!(parse_plain(".5"), Some(Decimal::new(5, 1)));
        assert_eq!(parse_plain("5."), Some(Decimal::new(5, 0)));
        assert_eq!(parse_plain("."), None);
        assert_eq!(parse_plain(""), None);
        assert_eq!(parse_plain("1a"), None);
        assert_eq!(parse_plain("1.2.3"), None);
        assert_eq!(parse_plain(&"9".repeat(40)), None);
    }

    #[test]
    fn empty_keystroke_is_zero() {
        assert_eq!(sanitize_keystroke("", M), Ok(String::new()));
        assert_eq!(sanitize_keystroke("", K), Ok(String::new()));
        assert_eq!(to_canonical("", M), Decimal::ZERO);
    }

    #[test]
    fn major_keystrokes() {
        assert_eq!(sanitize_keystroke("1.234", M), Ok("1.234".to_string()));
        assert_eq!(sanitize_keystroke("1,5", M), Ok("1.5".to_string()));
        assert_eq!(sanitize_keystroke(".", M), Ok(".".to_string()));
        assert_eq!(sanitize_keystroke("1.2345", M), Err(CodecError::Malformed(M)));
        assert_eq!(sanitize_keystroke("-5", M), Err(CodecError::NegativeSign));
        assert_eq!(sanitize_keystroke("1e3", M), Err(CodecError::Malformed(M)));
        assert_eq!(sanitize_keystroke("1.2.3", M), Err(CodecError::Malformed(M)));
    }

    #[test]
    fn minor_keystrokes() {
        assert_eq!(sanitize_keystroke("2500", K), Ok("2500".to_string()));
        assert_eq!(sanitize_keystroke("12.5", K), Err(CodecError::DecimalInMinor));
        assert_eq!(sanitize_keystroke("1,000", K), Err(CodecError::DecimalInMinor));
        assert_eq!(sanitize_keystroke("-1", K), Err(CodecError::NegativeSign));
        assert_eq!(sanitize_keystroke("12a", K), Err(CodecError::Malformed(K)));
        assert_eq!(sanitize_keystroke("1234567890", K), Ok("1234567890".to_string()));
        assert_eq!(
            sanitize_keystroke("12345678901", K),
            Err(CodecError::TooManyDigits { max: 10 })
        );
    }

    #[test]
    fn major_digit_cap_and_range() {
        let at_cap = "1".repeat(99);
        // 99 digits passes the cap but cannot be held by a Decimal.
        assert_eq!(sanitize_keystroke(&at_cap, M), Err(CodecError::OutOfRange));
        let over = "1".repeat(100);
        assert_eq!(
            sanitize_keystroke(&over, M),
            Err(CodecError::TooManyDigits { max: 99 })
        );
    }

    #[test]
    fn field_cap_rejects_and_clamps() {
        let cap = "1000000000000000000";
        assert_eq!(sanitize_keystroke(cap, M), Ok(cap.to_string()));
        assert_eq!(
            sanitize_keystroke("1000000000000000000.001", M),
            Err(CodecError::OutOfRange)
        );
        assert_eq!(
            sanitize_keystroke("50000000000000000000000000000", M),
            Err(CodecError::OutOfRange)
        );
        assert_eq!(to_canonical(cap, M), max_amount());
        assert_eq!(to_canonical("1000000000000000001", M), Decimal::ZERO);
        assert_eq!(to_canonical("9999999999999999999999999999", M), Decimal::ZERO);
        assert_eq!(commit_and_normalize("1000000000000000000.04", M), max_amount());
        assert_eq!(commit_and_normalize("1000000000000000000.1", M), Decimal::ZERO);
        assert_eq!(commit_and_normalize("9999999999", K), d("9999999.999"));
    }

    #[test]
    fn extreme_amounts_never_panic() {
        assert_eq!(format(Decimal::MAX, K), OVERFLOW_TEXT);
        assert_eq!(field_text(Decimal::MIN, K), OVERFLOW_TEXT);
        assert!(!format(Decimal::MAX, M).is_empty());
        assert!(is_on_step(Decimal::MAX));
        assert!(is_on_step(max_amount()));
        assert!(!is_on_step(max_amount() - d("0.001")));
        assert_eq!(format(max_amount(), K), "1,000,000,000,000,000,000,000");
    }

    #[test]
    fn canonical_conversion() {
        assert_eq!(to_canonical("1.234", M), d("1.234"));
        assert_eq!(to_canonical("2500", K), d("2.5"));
        assert_eq!(to_canonical("1", K), d("0.001"));
        assert_eq!(to_canonical("1,250", K), d("1.25"));
        assert_eq!(to_canonical("1,234.5", M), d("1234.5"));
        assert_eq!(to_canonical("garbage", M), Decimal::ZERO);
        assert_eq!(to_canonical(".", M), Decimal::ZERO);
    }

    #[test]
    fn commit_rounds_to_committed_precision() {
        assert_eq!(commit_and_normalize("1.234", M), d("1.2"));
        assert_eq!(commit_and_normalize("1.25", M), d("1.3"));
        assert_eq!(commit_and_normalize("1,05", M), d("1.1"));
        assert_eq!(commit_and_normalize("2500", K), d("2.5"));
        assert_eq!(commit_and_normalize("-3", M), Decimal::ZERO);
        assert_eq!(commit_and_normalize("abc", K), Decimal::ZERO);
        assert_eq!(commit_and_normalize("", M), Decimal::ZERO);
    }

    #[test]
    fn format_display() {
        assert_eq!(format(Decimal::ZERO, M), "");
        assert_eq!(format(d("17"), M), "17");
        assert_eq!(format(d("1.5"), M), "1.5");
        assert_eq!(format(d("1.250"), M), "1.25");
        assert_eq!(format(d("1234.5"), M), "1,234.5");
        assert_eq!(format(d("17"), K), "17,000");
        assert_eq!(format(d("0.0004"), K), "0");
        assert_eq!(format(Decimal::new(-25, 1), M), "-2.5");
        assert_eq!(format(Decimal::new(-25, 1), K), "-2,500");
        assert_eq!(format(d("1234567.891"), M), "1,234,567.891");
    }

    #[test]
    fn field_text_is_ungrouped() {
        assert_eq!(field_text(d("1234.5"), M), "1234.5");
        assert_eq!(field_text(d("2.5"), K), "2500");
        assert_eq!(field_text(Decimal::ZERO, K), "");
    }

    #[test]
    fn settlement_step() {
        assert!(is_on_step(d("1.2")));
        assert!(is_on_step(d("3")));
        assert!(is_on_step(Decimal::ZERO));
        assert!(!is_on_step(d("1.25")));
        assert!(!is_on_step(d("0.05")));
    }

    proptest! {
        #[test]
        fn format_roundtrips_through_canonical(n in 0i64..1_000_000_000_000, minor in any::<bool>()) {
            let unit = if minor { K } else { M };
            let a = Decimal::new(n, 3);
            prop_assert_eq!(to_canonical(&format(a, unit), unit), a);
            prop_assert_eq!(to_canonical(&field_text(a, unit), unit), a);
        }

        #[test]
        fn accepted_keystrokes_are_non_negative(text in "[0-9]{0,6}(\\.[0-9]{0,3})?") {
            let kept = sanitize_keystroke(&text, M).unwrap();
            prop_assert!(to_canonical(&kept, M) >= Decimal::ZERO);
        }

        #[test]
        fn accepted_magnitudes_survive_every_view(
            thousandths in 0i128..=1_000_000_000_000_000_000_000,
            minor in any::<bool>(),
        ) {
            let unit = if minor { K } else { M };
            let a = Decimal::from_i128_with_scale(thousandths, 3);
            let text = field_text(a, unit);
            let kept = sanitize_keystroke(&text, unit);
            if minor && text.len() > K.max_digits() {
                prop_assert_eq!(kept, Err(CodecError::TooManyDigits { max: K.max_digits() }));
            } else {
                prop_assert_eq!(kept, Ok(text.clone()));
            }
            prop_assert_eq!(to_canonical(&format(a, unit), unit), a);
            prop_assert_eq!(to_canonical(&text, unit), a);
            let committed = commit_and_normalize(&text, unit);
            prop_assert!(committed <= max_amount());
            prop_assert!(is_on_step(committed) || unit == K);
        }

        #[test]
        fn commit_lands_on_committed_grain(n in 0i64..10_000_000, minor in any::<bool>()) {
            let unit = if minor { K } else { M };
            let text = field_text(Decimal::new(n, 3), unit);
            let committed = commit_and_normalize(&text, unit);
            let in_unit = committed * unit.scale();
            prop_assert_eq!(in_unit.round_dp(unit.committed_decimals()), in_unit);
        }
    }
}
