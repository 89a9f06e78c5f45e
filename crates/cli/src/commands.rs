use anyhow::{bail, Context, Result};
use recast_core::{ACCOUNTS_KEY, TRANSACTIONS_KEY};
use recast_mapping::{
    canonical_accounts, denormalize, project, transform_all, CanonicalNormalizer, CastMode,
    ChildRelation, MappingConfig, Record, ReferenceCache, Table,
};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::files;
use crate::settings::Settings;

/// Options shared by every command after settings and flags are merged.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub settings: Settings,
    pub strict: bool,
}

impl RunContext {
    fn mapping(&self, path: &Path) -> Result<MappingConfig> {
        let cfg = files::read_mapping(path)?;
        Ok(if self.strict {
            cfg.with_cast_mode(CastMode::Strict)
        } else {
            cfg
        })
    }
}

pub fn run_transform(ctx: &RunContext, mapping: &Path, input: &Path, output: Option<&Path>) -> Result<()> {
    let cfg = ctx.mapping(mapping)?;
    let rows = files::read_rows(input)?;
    let docs = transform_all(&rows, &cfg)?;
    tracing::info!(rows = docs.len(), input = %input.display(), "transformed");
    files::write_json(output, &docs)
}

pub fn run_project(ctx: &RunContext, mapping: &Path, input: &Path, output: Option<&Path>) -> Result<()> {
    let cfg = ctx.mapping(mapping)?;
    let docs = files::read_rows(input)?;
    let table = project(&Table::from_records(&docs), &cfg)?;
    tracing::info!(
        rows = table.len(),
        columns = table.columns().len(),
        input = %input.display(),
        "projected"
    );
    files::write_table(output, &table)
}

// ── Denormalization plan ─────────────────────────────────────────────────────

/// A parent table and the child tables that nest under it. Relative paths
/// resolve against the plan file's directory.
#[derive(Debug, Clone, Deserialize)]
pub struct DenormalizePlan {
    pub primary_key: String,
    pub parent: TableSource,
    #[serde(default)]
    pub children: Vec<ChildSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSource {
    pub input: PathBuf,
    /// Rows are used as-is when no mapping is given.
    pub mapping: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChildSource {
    pub name: String,
    pub foreign_key: String,
    pub input: PathBuf,
    pub mapping: Option<PathBuf>,
}

impl DenormalizePlan {
    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str(&s).with_context(|| format!("parse plan {}", path.display()))
    }
}

fn load_rows(ctx: &RunContext, base: &Path, input: &Path, mapping: Option<&Path>) -> Result<Vec<Record>> {
    let rows = files::read_rows(&base.join(input))?;
    match mapping {
        Some(m) => Ok(transform_all(&rows, &ctx.mapping(&base.join(m))?)?),
        None => Ok(rows),
    }
}

pub fn run_denormalize(ctx: &RunContext, plan_path: &Path, output: Option<&Path>) -> Result<()> {
    let plan = DenormalizePlan::load(plan_path)?;
    let base = plan_path.parent().unwrap_or_else(|| Path::new("."));

    let parents = load_rows(ctx, base, &plan.parent.input, plan.parent.mapping.as_deref())?;
    let children = plan
        .children
        .iter()
        .map(|child| {
            let records = load_rows(ctx, base, &child.input, child.mapping.as_deref())
                .with_context(|| format!("child relation '{}'", child.name))?;
            Ok(ChildRelation::new(&child.name, &child.foreign_key, records))
        })
        .collect::<Result<Vec<_>>>()?;

    let docs = denormalize(&parents, &plan.primary_key, &children)?;
    tracing::info!(documents = docs.len(), relations = children.len(), "denormalized");
    files::write_json(output, &docs)
}

// ── Canonicalization ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PayloadKind {
    Accounts,
    Transactions,
}

fn detect_kind(payload: &Value) -> Result<PayloadKind> {
    if payload.get(TRANSACTIONS_KEY).is_some() {
        Ok(PayloadKind::Transactions)
    } else if payload.get(ACCOUNTS_KEY).is_some() {
        Ok(PayloadKind::Accounts)
    } else {
        bail!("payload has neither '{ACCOUNTS_KEY}' nor '{TRANSACTIONS_KEY}'")
    }
}

pub fn run_canonicalize(
    ctx: &RunContext,
    input: &Path,
    kind: Option<PayloadKind>,
    output: Option<&Path>,
) -> Result<()> {
    let payload = files::read_json(input)?;
    let kind = match kind {
        Some(k) => k,
        None => detect_kind(&payload)?,
    };

    match kind {
        PayloadKind::Accounts => {
            let list = canonical_accounts(&payload)?;
            tracing::info!(accounts = list.accounts.len(), "canonicalized");
            files::write_json(output, &list)
        }
        PayloadKind::Transactions => {
            let cache = Arc::new(ReferenceCache::with_ttl(chrono::Duration::seconds(
                ctx.settings.ttl_secs,
            )));
            ctx.settings.reference.load_into(&cache);
            let normalizer = CanonicalNormalizer::new(cache);

            let page = normalizer.canonical_transactions(&payload)?;
            tracing::info!(transactions = page.transactions.len(), "canonicalized");
            files::write_json(output, &page)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RunContext {
        RunContext {
            settings: Settings::default(),
            strict: false,
        }
    }

    #[test]
    fn detects_payload_kind() {
        assert_eq!(
            detect_kind(&json!({"transactions": []})).unwrap(),
            PayloadKind::Transactions
        );
        assert_eq!(detect_kind(&json!({"accounts": []})).unwrap(), PayloadKind::Accounts);
        assert!(detect_kind(&json!({"balances": []})).is_err());
    }

    #[test]
    fn denormalize_plan_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        fs::write(p.join("clients.csv"), "client_id,name\n825,Alice\n1746,Bob\n").unwrap();
        fs::write(
            p.join("cards.csv"),
            "client_id,card_brand,card_number\n825,Visa,****5119\n825,Visa,****0690\n",
        )
        .unwrap();
        fs::write(
            p.join("cards.toml"),
            r#"
[fields.brand]
candidates = ["card_brand"]
[fields.last4]
candidates = ["card_number"]
[fields.client_id]
candidates = ["client_id"]
"#,
        )
        .unwrap();
        fs::write(
            p.join("plan.toml"),
            r#"
primary_key = "client_id"

[parent]
input = "clients.csv"

[[children]]
name = "cards"
foreign_key = "client_id"
input = "cards.csv"
mapping = "cards.toml"
"#,
        )
        .unwrap();

        let out = p.join("docs.json");
        run_denormalize(&ctx(), &p.join("plan.toml"), Some(&out)).unwrap();

        let docs: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(
            docs,
            json!([
                {"client_id": "825", "name": "Alice", "cards": [
                    {"brand": "Visa", "last4": "****5119"},
                    {"brand": "Visa", "last4": "****0690"}
                ]},
                {"client_id": "1746", "name": "Bob", "cards": []}
            ])
        );
    }

    #[test]
    fn strict_flag_turns_cast_failures_into_errors() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        fs::write(p.join("map.json"), r#"{"fields": {"n": {"candidates": ["n"], "cast": "int"}}}"#)
            .unwrap();
        fs::write(p.join("rows.json"), r#"[{"n": "x"}]"#).unwrap();
        let out = p.join("out.json");

        run_transform(&ctx(), &p.join("map.json"), &p.join("rows.json"), Some(&out)).unwrap();
        let strict = RunContext {
            strict: true,
            ..ctx()
        };
        assert!(run_transform(&strict, &p.join("map.json"), &p.join("rows.json"), Some(&out)).is_err());
    }

    #[test]
    fn canonicalize_transactions_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        fs::write(
            p.join("raw.json"),
            r#"{"transactions": [{"txn_id": "T1", "amount": "5.50", "merchant_raw": "Starbcks"}]}"#,
        )
        .unwrap();
        let out = p.join("canonical.json");

        run_canonicalize(&ctx(), &p.join("raw.json"), None, Some(&out)).unwrap();

        let page: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(page["transactions"][0]["merchant_norm"], json!("Starbucks"));
        assert_eq!(page["transactions"][0]["category"], json!("Food & Beverage"));
        assert_eq!(page["transactions"][0]["amount"], json!(5.5));
    }

    #[test]
    fn canonicalize_with_explicit_kind_requires_key() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        fs::write(p.join("raw.json"), r#"{"transactions": []}"#).unwrap();
        let err = run_canonicalize(&ctx(), &p.join("raw.json"), Some(PayloadKind::Accounts), None)
            .unwrap_err();
        assert!(err.to_string().contains("accounts"));
    }

    #[test]
    fn project_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        fs::write(
            p.join("docs.json"),
            r#"[{"amount": 12.345, "currency": "USD"}, {"amount": "7.8"}]"#,
        )
        .unwrap();
        fs::write(
            p.join("map.toml"),
            r#"
[fields.amt]
candidates = ["amount"]
cast = "decimal(18,2)"
[fields.ccy]
candidates = ["currency"]
default = "USD"
"#,
        )
        .unwrap();
        let out = p.join("table.csv");

        run_project(&ctx(), &p.join("map.toml"), &p.join("docs.json"), Some(&out)).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "amt,ccy\n12.34,USD\n7.8,\n");
    }
}
