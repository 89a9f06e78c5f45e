use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Number, Value};
use std::str::FromStr;
use thiserror::Error;

use crate::config::CastSpec;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CastError {
    #[error("Cannot cast {value} to {cast}")]
    Unconvertible { value: Value, cast: CastSpec },
    #[error("Value {value} is out of range for {cast}")]
    OutOfRange { value: Value, cast: CastSpec },
}

/// Returns the value of the first candidate that is present and non-null.
pub fn resolve<'a>(row: &'a Map<String, Value>, candidates: &[String]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|name| row.get(name))
        .find(|value| !value.is_null())
}

/// Coerces `value`, falling back to the original value when coercion fails.
pub fn apply_cast(value: &Value, cast: Option<CastSpec>) -> Value {
    try_cast(value, cast).unwrap_or_else(|_| value.clone())
}

/// Coerces `value` to `cast`. A missing cast or a null value passes through.
///
/// Decimal casts use exact decimal arithmetic and round half to even, so
/// `12.345` becomes `12.34` and `12.355` becomes `12.36`. The rounded value is
/// emitted as a JSON number; casting it again yields the same number. A
/// rounded value that no JSON number carries exactly (roughly more than 15
/// significant digits) is `OutOfRange` rather than silently approximated.
pub fn try_cast(value: &Value, cast: Option<CastSpec>) -> Result<Value, CastError> {
    let Some(cast) = cast else {
        return Ok(value.clone());
    };
    if value.is_null() {
        return Ok(Value::Null);
    }

    let unconvertible = || CastError::Unconvertible {
        value: value.clone(),
        cast,
    };
    let out_of_range = || CastError::OutOfRange {
        value: value.clone(),
        cast,
    };

    match cast {
        CastSpec::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => {
                let f = n.as_f64().ok_or_else(unconvertible)?;
                truncate(f).map(Value::from).ok_or_else(out_of_range)
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| unconvertible()),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            _ => Err(unconvertible()),
        },
        CastSpec::Float => {
            let f = match value {
                Value::Number(n) => n.as_f64().ok_or_else(unconvertible)?,
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| unconvertible())?,
                Value::Bool(b) => f64::from(u8::from(*b)),
                _ => return Err(unconvertible()),
            };
            Number::from_f64(f).map(Value::Number).ok_or_else(unconvertible)
        }
        CastSpec::Decimal { scale, .. } => {
            let dec = match value {
                Value::Number(n) => parse_decimal(&n.to_string()).ok_or_else(out_of_range)?,
                Value::String(s) => parse_decimal(s.trim()).ok_or_else(unconvertible)?,
                Value::Bool(b) => Decimal::from(u8::from(*b)),
                _ => return Err(unconvertible()),
            };
            let rounded = dec.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven);
            exact_number(rounded)
                .map(Value::Number)
                .ok_or_else(out_of_range)
        }
    }
}

/// The JSON number whose shortest text is exactly `dec`, if there is one.
fn exact_number(dec: Decimal) -> Option<Number> {
    let f = dec.to_string().parse::<f64>().ok()?;
    let back = parse_decimal(&f.to_string())?;
    if back != dec {
        return None;
    }
    Number::from_f64(f)
}

fn truncate(f: f64) -> Option<i64> {
    let t = f.trunc();
    // i64::MAX is not representable as f64; 2^63 is the first value past it.
    if t.is_finite() && t >= i64::MIN as f64 && t < 9_223_372_036_854_775_808.0 {
        Some(t as i64)
    } else {
        None
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEC_18_2: Option<CastSpec> = Some(CastSpec::Decimal {
        precision: 18,
        scale: 2,
    });

    fn row(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // ── resolve ───────────────────────────────────────────────────────────────

    #[test]
    fn resolve_respects_candidate_priority() {
        let r = row(json!({"amt": "1", "amount": "2"}));
        assert_eq!(resolve(&r, &names(&["amount", "amt"])), Some(&json!("2")));
        assert_eq!(resolve(&r, &names(&["amt", "amount"])), Some(&json!("1")));
    }

    #[test]
    fn resolve_skips_null_candidates() {
        let r = row(json!({"currency": null, "ccy": "EUR"}));
        assert_eq!(resolve(&r, &names(&["currency", "ccy"])), Some(&json!("EUR")));
    }

    #[test]
    fn resolve_absent_when_nothing_matches() {
        let r = row(json!({"x": 1, "y": null}));
        assert_eq!(resolve(&r, &names(&["y", "z"])), None);
        assert_eq!(resolve(&r, &[]), None);
    }

    #[test]
    fn resolve_keeps_falsy_values() {
        let r = row(json!({"a": 0, "b": "", "c": false}));
        assert_eq!(resolve(&r, &names(&["a"])), Some(&json!(0)));
        assert_eq!(resolve(&r, &names(&["b"])), Some(&json!("")));
        assert_eq!(resolve(&r, &names(&["c"])), Some(&json!(false)));
    }

    // ── integer ───────────────────────────────────────────────────────────────

    #[test]
    fn integer_truncates_toward_zero() {
        let cast = Some(CastSpec::Integer);
        assert_eq!(try_cast(&json!(12.7), cast), Ok(json!(12)));
        assert_eq!(try_cast(&json!(-12.7), cast), Ok(json!(-12)));
        assert_eq!(try_cast(&json!(" 42 "), cast), Ok(json!(42)));
        assert_eq!(try_cast(&json!(true), cast), Ok(json!(1)));
        assert_eq!(try_cast(&json!(7), cast), Ok(json!(7)));
    }

    #[test]
    fn integer_rejects_fractional_strings() {
        assert!(matches!(
            try_cast(&json!("12.5"), Some(CastSpec::Integer)),
            Err(CastError::Unconvertible { .. })
        ));
    }

    #[test]
    fn integer_out_of_range() {
        assert!(matches!(
            try_cast(&json!(1e300), Some(CastSpec::Integer)),
            Err(CastError::OutOfRange { .. })
        ));
    }

    // ── float ─────────────────────────────────────────────────────────────────

    #[test]
    fn float_conversions() {
        let cast = Some(CastSpec::Float);
        assert_eq!(try_cast(&json!("7.8"), cast), Ok(json!(7.8)));
        assert_eq!(try_cast(&json!(133900), cast), Ok(json!(133900.0)));
        assert_eq!(try_cast(&json!(false), cast), Ok(json!(0.0)));
        assert!(try_cast(&json!("inf"), cast).is_err());
        assert!(try_cast(&json!([1]), cast).is_err());
    }

    // ── decimal ───────────────────────────────────────────────────────────────

    #[test]
    fn decimal_rounds_half_to_even() {
        assert_eq!(try_cast(&json!("12.345"), DEC_18_2), Ok(json!(12.34)));
        assert_eq!(try_cast(&json!("12.355"), DEC_18_2), Ok(json!(12.36)));
        assert_eq!(try_cast(&json!("12.345 "), DEC_18_2), Ok(json!(12.34)));
        assert_eq!(try_cast(&json!(7.8), DEC_18_2), Ok(json!(7.8)));
    }

    #[test]
    fn decimal_cast_is_idempotent() {
        for input in [json!("12.345"), json!("0.125"), json!(-3.14159), json!("1e3")] {
            let once = try_cast(&input, DEC_18_2).unwrap();
            let twice = try_cast(&once, DEC_18_2).unwrap();
            assert_eq!(once, twice, "re-casting {input} changed the value");
        }
    }

    #[test]
    fn decimal_zero_scale() {
        let cast = Some(CastSpec::Decimal {
            precision: 10,
            scale: 0,
        });
        assert_eq!(try_cast(&json!("2.5"), cast), Ok(json!(2.0)));
        assert_eq!(try_cast(&json!("3.5"), cast), Ok(json!(4.0)));
    }

    #[test]
    fn decimal_keeps_every_digit_or_fails() {
        assert_eq!(
            try_cast(&json!("123456789012.345"), DEC_18_2),
            Ok(json!(123456789012.34))
        );
        assert_eq!(
            try_cast(&json!("1234567890123456.78"), DEC_18_2),
            Err(CastError::OutOfRange {
                value: json!("1234567890123456.78"),
                cast: CastSpec::Decimal {
                    precision: 18,
                    scale: 2
                },
            })
        );
        assert_eq!(
            apply_cast(&json!("1234567890123456.78"), DEC_18_2),
            json!("1234567890123456.78")
        );
    }

    #[test]
    fn decimal_rejects_non_numeric_text() {
        assert!(matches!(
            try_cast(&json!("abc"), DEC_18_2),
            Err(CastError::Unconvertible { .. })
        ));
    }

    // ── pass-through and lenient fallback ─────────────────────────────────────

    #[test]
    fn no_cast_or_null_passes_through() {
        assert_eq!(try_cast(&json!(" x "), None), Ok(json!(" x ")));
        assert_eq!(try_cast(&Value::Null, DEC_18_2), Ok(Value::Null));
    }

    #[test]
    fn apply_cast_returns_original_on_failure() {
        assert_eq!(apply_cast(&json!("abc"), DEC_18_2), json!("abc"));
        assert_eq!(apply_cast(&json!("12.345"), DEC_18_2), json!(12.34));
    }
}
