use recast_core::{
    records, AccountList, CanonicalAccount, CanonicalError, CanonicalTransaction, TransactionPage,
    ACCOUNTS_KEY, TRANSACTIONS_KEY,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::ReferenceCache;

pub const MERCHANT_ALIASES: &str = "merchant_aliases";
pub const MCC_MAP: &str = "mcc_map";
pub const CATEGORY_RULES: &str = "category_rules";

/// A reference lookup table as stored in the cache.
pub type ReferenceTable = Arc<BTreeMap<String, String>>;

/// Startup contents of the reference tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSeed {
    pub merchant_aliases: BTreeMap<String, String>,
    pub mcc_map: BTreeMap<String, String>,
    pub category_rules: BTreeMap<String, String>,
}

fn table(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for ReferenceSeed {
    fn default() -> Self {
        Self {
            merchant_aliases: table(&[
                ("AMZN Mkt", "Amazon"),
                ("GOOGLE*SVCS", "Google"),
                ("Starbcks", "Starbucks"),
                ("CoffeeShop", "Starbucks"),
            ]),
            mcc_map: table(&[("5814", "Fast Food"), ("4111", "Transport")]),
            category_rules: table(&[
                ("Amazon", "Shopping"),
                ("Google", "Services"),
                ("Starbucks", "Food & Beverage"),
                ("Payroll", "Income"),
            ]),
        }
    }
}

impl ReferenceSeed {
    /// Writes every table into `cache`. Each table replaces its key in place,
    /// so this doubles as a refresh.
    pub fn load_into(&self, cache: &ReferenceCache<ReferenceTable>) {
        cache.set(MERCHANT_ALIASES, Arc::new(self.merchant_aliases.clone()));
        cache.set(MCC_MAP, Arc::new(self.mcc_map.clone()));
        cache.set(CATEGORY_RULES, Arc::new(self.category_rules.clone()));
        tracing::debug!(
            aliases = self.merchant_aliases.len(),
            mcc_codes = self.mcc_map.len(),
            category_rules = self.category_rules.len(),
            "reference tables loaded"
        );
    }
}

/// Merchant and category enrichment backed by the reference cache.
///
/// Every lookup tolerates a missing or expired table by passing the input
/// through unchanged; nothing here fails because of the cache.
#[derive(Clone)]
pub struct CanonicalNormalizer {
    cache: Arc<ReferenceCache<ReferenceTable>>,
}

impl CanonicalNormalizer {
    pub fn new(cache: Arc<ReferenceCache<ReferenceTable>>) -> Self {
        Self { cache }
    }

    fn lookup(&self, table: &str, key: &str) -> Option<String> {
        self.cache.get(table)?.get(key).cloned()
    }

    pub fn normalize_merchant(&self, merchant_raw: Option<&str>) -> Option<String> {
        let raw = merchant_raw?;
        Some(self.lookup(MERCHANT_ALIASES, raw).unwrap_or_else(|| raw.to_string()))
    }

    /// Category rule for the normalized merchant, else the supplied category.
    pub fn categorize(&self, merchant_norm: Option<&str>, supplied: Option<String>) -> Option<String> {
        merchant_norm
            .and_then(|m| self.lookup(CATEGORY_RULES, m))
            .or(supplied)
    }

    pub fn describe_mcc(&self, mcc: &str) -> Option<String> {
        self.lookup(MCC_MAP, mcc)
    }

    pub fn enrich(&self, mut txn: CanonicalTransaction) -> CanonicalTransaction {
        txn.merchant_norm = self.normalize_merchant(txn.merchant_raw.as_deref());
        txn.category = self.categorize(txn.merchant_norm.as_deref(), txn.category.take());
        if let Some(description) = txn.mcc.as_deref().and_then(|mcc| self.describe_mcc(mcc)) {
            txn.meta
                .insert("mcc_description".to_string(), Value::String(description));
        }
        txn
    }

    /// Raw `{"transactions": [...]}` payload to an enriched canonical page.
    pub fn canonical_transactions(&self, payload: &Value) -> Result<TransactionPage, CanonicalError> {
        let transactions = records(payload, TRANSACTIONS_KEY)?
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| CanonicalTransaction::from_raw(idx, raw).map(|t| self.enrich(t)))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(transactions = transactions.len(), "canonicalized transactions");
        Ok(TransactionPage::single(transactions))
    }
}

/// Raw `{"accounts": [...]}` payload to canonical accounts.
pub fn canonical_accounts(payload: &Value) -> Result<AccountList, CanonicalError> {
    let accounts = records(payload, ACCOUNTS_KEY)?
        .into_iter()
        .enumerate()
        .map(|(idx, raw)| CanonicalAccount::from_raw(idx, raw))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(accounts = accounts.len(), "canonicalized accounts");
    Ok(AccountList { accounts })
}
