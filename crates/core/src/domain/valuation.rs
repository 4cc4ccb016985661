//! Graham-style intrinsic value and the per-row figures derived from it.

/// Calibration anchor for the bond-yield adjustment (AAA yield in Graham's day).
pub const REFERENCE_YIELD: f64 = 4.4;

/// Current AAA yield used when the rate provider cannot supply one.
pub const FALLBACK_YIELD: f64 = 4.88;

pub const DEFAULT_MARGIN_OF_SAFETY: f64 = 0.25;

/// Rounds to cents, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// `eps * (7 + 100 * growth) * reference_yield / current_yield`, rounded to cents.
///
/// Returns `0.0` when `current_yield` is zero or the result is not finite. A zero
/// means "valuation unavailable", not "worthless"; callers rank it as a zero score.
pub fn intrinsic_value(eps: f64, growth: f64, reference_yield: f64, current_yield: f64) -> f64 {
    if current_yield == 0.0 {
        return 0.0;
    }

    // Rounding scales by 100, so a finite value near f64::MAX can still overflow.
    let value = eps * (7.0 + 100.0 * growth) * reference_yield / current_yield;
    finite_or_zero(round2(value))
}

/// Caller guarantees `price > 0`.
pub fn score(intrinsic_value: f64, price: f64) -> f64 {
    finite_or_zero(round2(intrinsic_value / price))
}

pub fn buy_under(intrinsic_value: f64, margin_of_safety: f64) -> f64 {
    finite_or_zero(round2(intrinsic_value * (1.0 - margin_of_safety)))
}

/// Discount of `price` below `intrinsic_value`; zero when the price is at or above it.
pub fn actual_margin_of_safety(price: f64, intrinsic_value: f64) -> f64 {
    if price < intrinsic_value {
        round2(1.0 - price / intrinsic_value)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_closed_form() {
        // 2.0 * 12 * 4.4 / 4.88 = 21.639...
        assert_eq!(intrinsic_value(2.0, 0.05, REFERENCE_YIELD, FALLBACK_YIELD), 21.64);
        assert_eq!(intrinsic_value(5.0, 0.10, 4.4, 4.4), 85.0);
        assert_eq!(intrinsic_value(-1.0, 0.0, 4.4, 4.4), -7.0);
    }

    #[test]
    fn is_deterministic() {
        let a = intrinsic_value(3.17, 0.083, REFERENCE_YIELD, 5.12);
        let b = intrinsic_value(3.17, 0.083, REFERENCE_YIELD, 5.12);
        assert_eq!(a, b);
        assert_eq!(a, round2(3.17 * (7.0 + 8.3) * 4.4 / 5.12));
    }

    #[test]
    fn zero_yield_and_overflow_return_sentinel() {
        assert_eq!(intrinsic_value(2.0, 0.05, REFERENCE_YIELD, 0.0), 0.0);
        assert_eq!(intrinsic_value(f64::MAX, 1.0e10, REFERENCE_YIELD, 1.0), 0.0);
        assert_eq!(intrinsic_value(f64::NAN, 0.05, REFERENCE_YIELD, 4.88), 0.0);
        // Finite before rounding, infinite once scaled to cents.
        assert_eq!(intrinsic_value(1.0e306, 0.0, REFERENCE_YIELD, 4.88), 0.0);
        assert_eq!(score(1.0e306, 1.0e-10), 0.0);
    }

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(score(22.5, 20.0), 1.12);
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
    }

    #[test]
    fn margin_of_safety_is_zero_when_price_is_at_or_above_value() {
        assert_eq!(actual_margin_of_safety(50.0, 40.0), 0.0);
        assert_eq!(actual_margin_of_safety(40.0, 40.0), 0.0);
        assert_eq!(actual_margin_of_safety(30.0, 40.0), 0.25);
        assert_eq!(actual_margin_of_safety(10.0, 0.0), 0.0);
    }

    #[test]
    fn buy_under_applies_discount() {
        assert_eq!(buy_under(21.64, DEFAULT_MARGIN_OF_SAFETY), 16.23);
        assert_eq!(score(21.64, 10.0), 2.16);
    }
}
