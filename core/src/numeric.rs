//! Range-checked 32-bit integer arithmetic, Euclidean `DIV`/`MOD`, and the
//! real-number formatting/validity rules shared by the consteval and the
//! interpreter. Keeping both in one place is what guarantees compile-time
//! constant folding and run-time evaluation can never disagree on a sum.
//!
//! Unlike a wrapping machine word, every operation here traps: overflow is
//! a `RangeError`, not silently truncated data.

use crate::error::PrescribeError;

pub type NResult<T> = Result<T, PrescribeError>;

pub fn add_i32(line: usize, a: i32, b: i32) -> NResult<i32> {
    a.checked_add(b)
        .ok_or_else(|| PrescribeError::range(line, "integer overflow in addition"))
}

pub fn sub_i32(line: usize, a: i32, b: i32) -> NResult<i32> {
    a.checked_sub(b)
        .ok_or_else(|| PrescribeError::range(line, "integer overflow in subtraction"))
}

pub fn mul_i32(line: usize, a: i32, b: i32) -> NResult<i32> {
    a.checked_mul(b)
        .ok_or_else(|| PrescribeError::range(line, "integer overflow in multiplication"))
}

pub fn neg_i32(line: usize, a: i32) -> NResult<i32> {
    a.checked_neg()
        .ok_or_else(|| PrescribeError::range(line, "integer overflow in negation"))
}

/// Euclidean `DIV`/`MOD`: `0 <= r < |b|` and `a = b*q + r`. `i32`'s own
/// `div_euclid`/`rem_euclid` already implement this; the only case that
/// needs a guard is `MIN / -1`, which overflows the same way ordinary
/// division does.
pub fn euclid_div_mod(line: usize, a: i32, b: i32) -> NResult<(i32, i32)> {
    if b == 0 {
        return Err(PrescribeError::runtime(line, "division by zero"));
    }
    if a == i32::MIN && b == -1 {
        return Err(PrescribeError::range(line, "integer overflow in DIV"));
    }
    Ok((a.div_euclid(b), a.rem_euclid(b)))
}

/// `/`: both operands are widened to `Real` before dividing.
pub fn div_real(line: usize, a: f64, b: f64) -> NResult<f64> {
    if b == 0.0 {
        return Err(PrescribeError::runtime(line, "division by zero"));
    }
    check_real(line, a / b)
}

pub fn add_real(line: usize, a: f64, b: f64) -> NResult<f64> {
    check_real(line, a + b)
}

pub fn sub_real(line: usize, a: f64, b: f64) -> NResult<f64> {
    check_real(line, a - b)
}

pub fn mul_real(line: usize, a: f64, b: f64) -> NResult<f64> {
    check_real(line, a * b)
}

pub fn neg_real(line: usize, a: f64) -> NResult<f64> {
    check_real(line, -a)
}

/// No real value is ever NaN or infinite at rest (data model invariant).
/// NaN is treated as a `RuntimeError` (it arises from indeterminate forms
/// like `0.0/0.0`), infinities as a `RangeError` (magnitude overflow).
pub fn check_real(line: usize, x: f64) -> NResult<f64> {
    if x.is_nan() {
        Err(PrescribeError::runtime(line, "real arithmetic produced NaN"))
    } else if x.is_infinite() {
        Err(PrescribeError::range(line, "real overflow"))
    } else {
        Ok(x)
    }
}

/// `OUTPUT`/`STRING` conversion for `Real`: fixed-point, up to 6 fractional
/// digits, half-away-from-zero rounding, trailing zeros and an isolated
/// trailing `.` removed, empty result collapses to `0`.
pub fn format_real(x: f64) -> String {
    let factor = 1_000_000f64; // 10^6
    let scaled = x * factor;
    let rounded_scaled = if scaled >= 0.0 {
        (scaled + 0.5).floor()
    } else {
        (scaled - 0.5).ceil()
    };
    if rounded_scaled == 0.0 {
        return "0".to_string();
    }
    let rounded = rounded_scaled / factor;
    let mut s = format!("{:.6}", rounded);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_traps() {
        assert!(add_i32(1, i32::MAX, 1).is_err());
        assert!(sub_i32(1, i32::MIN, 1).is_err());
        assert!(mul_i32(1, i32::MAX, 2).is_err());
        assert!(neg_i32(1, i32::MIN).is_err());
    }

    #[test]
    fn test_euclidean_mod_matches_spec_example() {
        let (q, r) = euclid_div_mod(1, -7, 3).unwrap();
        assert_eq!(r, 2);
        assert_eq!(-7, 3 * q + r);
        assert!(0 <= r && r < 3);
    }

    #[test]
    fn test_euclidean_mod_property_sweep() {
        for a in -20..=20i32 {
            for b in [-7, -3, -1, 1, 3, 7] {
                let (q, r) = euclid_div_mod(1, a, b).unwrap();
                assert_eq!(a, b * q + r);
                assert!(r >= 0 && r < b.abs());
            }
        }
    }

    #[test]
    fn test_division_by_zero_is_runtime_error() {
        assert!(euclid_div_mod(1, 5, 0).is_err());
        assert!(div_real(1, 5.0, 0.0).is_err());
    }

    #[test]
    fn test_min_div_neg_one_overflows() {
        assert!(euclid_div_mod(1, i32::MIN, -1).is_err());
    }

    #[test]
    fn test_format_real_trims_trailing_zeros() {
        assert_eq!(format_real(20.0), "20");
        assert_eq!(format_real(2.5), "2.5");
        assert_eq!(format_real(0.0), "0");
        assert_eq!(format_real(-0.0), "0");
    }

    #[test]
    fn test_format_real_rounds_half_away_from_zero() {
        assert_eq!(format_real(1.23456749), "1.234567");
        assert_eq!(format_real(1.23456751), "1.234568");
        assert_eq!(format_real(-1.23456751), "-1.234568");
    }

    #[test]
    fn test_format_real_caps_at_six_digits() {
        assert_eq!(format_real(1.0 / 3.0), "0.333333");
    }
}
