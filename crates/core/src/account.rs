use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::decimal_from_value;
use crate::raw::{present, text, CanonicalError, RawRecord};

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAccount {
    pub account_id: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub mask: Option<String>,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub current: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub available: Option<Decimal>,
    pub name: Option<String>,
}

impl CanonicalAccount {
    /// Builds the canonical shape of the `index`-th raw account record.
    pub fn from_raw(index: usize, raw: &RawRecord) -> Result<Self, CanonicalError> {
        Ok(CanonicalAccount {
            account_id: text(raw, "account_id"),
            account_type: text(raw, "type"),
            subtype: text(raw, "subtype"),
            mask: text(raw, "mask"),
            currency: text(raw, "currency").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            current: balance(index, raw, "current")?,
            available: balance(index, raw, "available")?,
            name: text(raw, "name"),
        })
    }
}

fn balance(index: usize, raw: &RawRecord, field: &str) -> Result<Option<Decimal>, CanonicalError> {
    match present(raw, field) {
        None => Ok(None),
        Some(value) => decimal_from_value(value)
            .map(Some)
            .ok_or_else(|| CanonicalError::InvalidAmount {
                index,
                field: field.to_string(),
                value: value.clone(),
            }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountList {
    pub accounts: Vec<CanonicalAccount>,
}
