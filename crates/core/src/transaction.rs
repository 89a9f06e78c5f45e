use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::account::DEFAULT_CURRENCY;
use crate::money::decimal_from_value;
use crate::raw::{present, text, CanonicalError, RawRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTransaction {
    pub txn_id: Option<String>,
    pub account_id: Option<String>,
    pub date: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub merchant_raw: Option<String>,
    pub merchant_norm: Option<String>,
    pub mcc: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl CanonicalTransaction {
    /// Builds the canonical shape of the `index`-th raw transaction record.
    ///
    /// `merchant_norm` starts out equal to `merchant_raw` and `category` holds
    /// whatever the source supplied; enrichment happens afterwards.
    pub fn from_raw(index: usize, raw: &RawRecord) -> Result<Self, CanonicalError> {
        let amount = match present(raw, "amount") {
            None => Decimal::ZERO,
            Some(value) => {
                decimal_from_value(value).ok_or_else(|| CanonicalError::InvalidAmount {
                    index,
                    field: "amount".to_string(),
                    value: value.clone(),
                })?
            }
        };
        let merchant_raw = text(raw, "merchant_raw");

        Ok(CanonicalTransaction {
            txn_id: text(raw, "txn_id"),
            account_id: text(raw, "account_id"),
            date: text(raw, "date"),
            amount,
            currency: text(raw, "currency").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            merchant_norm: merchant_raw.clone(),
            merchant_raw,
            mcc: text(raw, "mcc"),
            category: text(raw, "category"),
            meta: Map::new(),
        })
    }
}

/// Cursor stub carried alongside every transaction listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paging {
    pub cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub transactions: Vec<CanonicalTransaction>,
    pub paging: Paging,
}

impl TransactionPage {
    pub fn single(transactions: Vec<CanonicalTransaction>) -> Self {
        TransactionPage {
            transactions,
            paging: Paging::default(),
        }
    }
}
