//! The built-in function library (`spec.md` §4.6) and the shared
//! INPUT-token parser used by both `INPUT` and `READFILE` (see
//! `DESIGN.md`'s Open Question #2 — keeping them behind one function is
//! what guarantees the two paths can't diverge).
//!
//! Every built-in here is total: it either returns a `Value` or raises a
//! typed error, never panics.

use crate::date::Date;
use crate::error::{PrResult, PrescribeError};
use crate::types::Type;
use crate::value::Value;

pub fn length(s: &str) -> Value {
    Value::Integer(s.chars().count() as i32)
}

pub fn right(line: usize, s: &str, n: i32) -> PrResult<Value> {
    let chars: Vec<char> = s.chars().collect();
    if n < 0 || n as usize > chars.len() {
        return Err(PrescribeError::range(line, format!("RIGHT: n={} out of range for a string of length {}", n, chars.len())));
    }
    let start = chars.len() - n as usize;
    Ok(Value::String(chars[start..].iter().collect()))
}

pub fn mid(line: usize, s: &str, start: i32, n: i32) -> PrResult<Value> {
    let chars: Vec<char> = s.chars().collect();
    if n == 0 {
        return Ok(Value::String(String::new()));
    }
    if start < 1 || n < 0 {
        return Err(PrescribeError::range(line, "MID: start must be >= 1 and n must be >= 0"));
    }
    let start0 = (start - 1) as usize;
    if start0 >= chars.len() {
        return Err(PrescribeError::range(line, "MID: start is past the end of the string"));
    }
    let end = (start0 + n as usize).min(chars.len());
    Ok(Value::String(chars[start0..end].iter().collect()))
}

pub fn lcase(s: &str) -> Value {
    Value::String(s.chars().map(|c| if c.is_ascii_uppercase() { c.to_ascii_lowercase() } else { c }).collect())
}

pub fn ucase(s: &str) -> Value {
    Value::String(s.chars().map(|c| if c.is_ascii_lowercase() { c.to_ascii_uppercase() } else { c }).collect())
}

pub fn int_of_real(x: f64) -> Value {
    Value::Integer(x.trunc() as i32)
}

pub fn real_of_int(n: i32) -> Value {
    Value::Real(n as f64)
}

/// `STRING(x)`: same conversion rules as `OUTPUT`; composite types are a
/// `TypeError`.
pub fn string_of(line: usize, v: &Value) -> PrResult<Value> {
    v.to_output_string()
        .map(Value::String)
        .ok_or_else(|| PrescribeError::type_error(line, format!("STRING: cannot convert a {} value", v.type_name())))
}

pub fn char_of(line: usize, n: i32) -> PrResult<Value> {
    if !(0..=127).contains(&n) {
        return Err(PrescribeError::range(line, format!("CHAR: {} is outside 0..127", n)));
    }
    Ok(Value::Char(n as u8 as char))
}

pub fn boolean_of(line: usize, s: &str) -> PrResult<Value> {
    match s.to_uppercase().as_str() {
        "TRUE" => Ok(Value::Boolean(true)),
        "FALSE" => Ok(Value::Boolean(false)),
        _ => Err(PrescribeError::range(line, format!("BOOLEAN: `{}` is neither TRUE nor FALSE", s))),
    }
}

pub fn date_of(line: usize, s: &str) -> PrResult<Value> {
    Ok(Value::Date(Date::parse(line, s)?))
}

/// `ORD(e)`: enum values are already represented at runtime as their
/// ordinal, so this is the identity — kept as a named built-in purely so
/// the checker has something to type-check against (`Enum -> Integer`).
pub fn ord_of_enum(ordinal: i32) -> Value {
    Value::Integer(ordinal)
}

pub fn enum_value(line: usize, member_count: usize, k: i32) -> PrResult<Value> {
    if k < 0 || k as usize >= member_count {
        return Err(PrescribeError::range(line, format!("ENUMVALUE: {} is out of range for {} members", k, member_count)));
    }
    Ok(Value::Integer(k))
}

pub fn size_of_set(members: &std::collections::BTreeSet<i32>) -> Value {
    Value::Integer(members.len() as i32)
}

/// A deterministic linear congruential generator: `state <- (1103515245 *
/// state + 12345) mod 2^31`, `result = state / 2^31`. Seeded at 1.
pub struct Rng {
    state: u64,
}

impl Default for Rng {
    fn default() -> Self {
        Self { state: 1 }
    }
}

impl Rng {
    const MODULUS: u64 = 1u64 << 31;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> f64 {
        self.state = (1_103_515_245u64.wrapping_mul(self.state).wrapping_add(12_345)) % Self::MODULUS;
        self.state as f64 / Self::MODULUS as f64
    }
}

/// Parses one whitespace-delimited token for `INPUT`/`READFILE`, per
/// `spec.md` §6's per-type table. `enum_members` is consulted only when
/// `ty` is `Type::Enum`.
pub fn parse_input_token(line: usize, token: &str, ty: &Type, enum_members: Option<&[String]>) -> PrResult<Value> {
    let bad = |msg: String| PrescribeError::range(line, msg);
    match ty {
        Type::Integer => token
            .parse::<i32>()
            .map(Value::Integer)
            .map_err(|_| bad(format!("`{}` is not a valid integer", token))),
        Type::Real => {
            if !is_valid_real_token(token) {
                return Err(bad(format!("`{}` is not a valid real", token)));
            }
            token
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| bad(format!("`{}` is not a valid real", token)))
        }
        Type::Boolean => boolean_of(line, token),
        Type::Char => {
            let mut chars = token.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(bad(format!("`{}` is not exactly one character", token))),
            }
        }
        Type::String => Ok(Value::String(token.to_string())),
        Type::Date => date_of(line, token),
        Type::Enum(_) => {
            let members = enum_members.ok_or_else(|| PrescribeError::runtime(line, "missing enum member table"))?;
            members
                .iter()
                .position(|m| m == token)
                .map(|i| Value::Integer(i as i32))
                .ok_or_else(|| bad(format!("`{}` is not a member of this enum", token)))
        }
        _ => Err(PrescribeError::type_error(line, format!("{} is not a valid INPUT/READFILE target type", ty))),
    }
}

fn is_valid_real_token(token: &str) -> bool {
    let bytes = token.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    let mut i = 0;
    if bytes[i] == b'+' || bytes[i] == b'-' {
        i += 1;
    }
    let digit_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digit_start {
        return false;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == frac_start {
            return false;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_counts_code_points() {
        assert_eq!(length("hello"), Value::Integer(5));
    }

    #[test]
    fn test_right() {
        assert_eq!(right(1, "hello", 3).unwrap(), Value::String("llo".into()));
        assert!(right(1, "hello", 6).is_err());
        assert!(right(1, "hello", -1).is_err());
    }

    #[test]
    fn test_mid() {
        assert_eq!(mid(1, "hello", 2, 3).unwrap(), Value::String("ell".into()));
        assert_eq!(mid(1, "hello", 1, 0).unwrap(), Value::String("".into()));
    }

    #[test]
    fn test_case_conversion_is_ascii_only() {
        assert_eq!(ucase("café"), Value::String("CAFé".into()));
    }

    #[test]
    fn test_int_truncates_toward_zero() {
        assert_eq!(int_of_real(3.9), Value::Integer(3));
        assert_eq!(int_of_real(-3.9), Value::Integer(-3));
    }

    #[test]
    fn test_char_range_check() {
        assert!(char_of(1, 65).is_ok());
        assert!(char_of(1, 128).is_err());
        assert!(char_of(1, -1).is_err());
    }

    #[test]
    fn test_boolean_of_case_insensitive() {
        assert_eq!(boolean_of(1, "true").unwrap(), Value::Boolean(true));
        assert_eq!(boolean_of(1, "FALSE").unwrap(), Value::Boolean(false));
        assert!(boolean_of(1, "yes").is_err());
    }

    #[test]
    fn test_rng_matches_spec_constants() {
        let mut rng = Rng::new();
        let first = rng.next();
        let expected_state = (1_103_515_245u64 * 1 + 12_345) % (1u64 << 31);
        assert_eq!(first, expected_state as f64 / (1u64 << 31) as f64);
        assert!((0.0..1.0).contains(&first));
    }

    #[test]
    fn test_parse_input_token_integer_rejects_trailing_garbage() {
        assert!(parse_input_token(1, "42", &Type::Integer, None).is_ok());
        assert!(parse_input_token(1, "42a", &Type::Integer, None).is_err());
    }

    #[test]
    fn test_parse_input_token_real_accepts_exponent() {
        assert_eq!(
            parse_input_token(1, "2.5e-3", &Type::Real, None).unwrap(),
            Value::Real(2.5e-3)
        );
    }

    #[test]
    fn test_parse_input_token_enum_is_case_sensitive() {
        let members = vec!["Red".to_string(), "Green".to_string(), "Blue".to_string()];
        let ty = Type::Enum("Colour".into());
        assert_eq!(
            parse_input_token(1, "Green", &ty, Some(&members)).unwrap(),
            Value::Integer(1)
        );
        assert!(parse_input_token(1, "green", &ty, Some(&members)).is_err());
    }
}
