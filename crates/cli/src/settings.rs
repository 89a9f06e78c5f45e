use anyhow::{bail, Context, Result};
use recast_mapping::{ReferenceSeed, DEFAULT_TTL_SECS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Process-wide settings, read from an optional `settings.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Lifetime of reference tables in the cache, in seconds.
    pub ttl_secs: i64,
    /// Treat every cast failure as an error unless a field opts out.
    pub strict_casts: bool,
    /// Seed contents of the reference tables.
    pub reference: ReferenceSeed,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            strict_casts: false,
            reference: ReferenceSeed::default(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            None => Settings::default(),
            Some(p) => {
                let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
                toml::from_str(&s).with_context(|| format!("parse {}", p.display()))?
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs <= 0 {
            bail!("ttl_secs must be positive, got {}", self.ttl_secs);
        }
        if chrono::Duration::try_seconds(self.ttl_secs).is_none() {
            bail!("ttl_secs is out of range: {}", self.ttl_secs);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_gives_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.ttl_secs, 600);
        assert!(!settings.strict_casts);
        assert_eq!(
            settings.reference.merchant_aliases.get("AMZN Mkt").map(String::as_str),
            Some("Amazon")
        );
    }

    #[test]
    fn file_overrides_selected_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
ttl_secs = 30
strict_casts = true

[reference.category_rules]
Amazon = "Online Retail"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.ttl_secs, 30);
        assert!(settings.strict_casts);
        assert_eq!(
            settings.reference.category_rules.get("Amazon").map(String::as_str),
            Some("Online Retail")
        );
        assert_eq!(settings.reference.category_rules.len(), 1);
        assert_eq!(settings.reference.mcc_map, ReferenceSeed::default().mcc_map);
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ttl_secs = 0").unwrap();
        assert!(Settings::load(Some(file.path())).is_err());
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
