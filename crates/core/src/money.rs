use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Parses a bank-formatted amount string: `$1,234.56`, `-50.00`, and
/// accounting-style `(75.25)` for negatives.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let s = s.replace([',', '$', ' '], "");
    let dec = parse_plain(&s)?;
    Some(if negative { -dec } else { dec })
}

/// Exact decimal view of a JSON scalar. Numbers go through their textual
/// form so `0.1` stays `0.1` instead of its nearest binary double.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_plain(&n.to_string()),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

fn parse_plain(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}
