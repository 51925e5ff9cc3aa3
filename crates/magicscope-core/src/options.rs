use std::path::PathBuf;

use crate::error::{MagicError, Result};
use crate::flags::FlagToken;

/// Configuration applied to an analyzer when it is opened.
///
/// Each field corresponds to one handle operation: `flags` to
/// `set_flags`, `simplified` to `set_simplified`, `database` to the initial
/// database load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AnalyzerOptions {
    pub flags: Option<Vec<FlagToken>>,
    pub simplified: Option<bool>,
    pub database: Option<PathBuf>,
}

impl AnalyzerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags<I, T>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FlagToken>,
    {
        self.flags = Some(flags.into_iter().map(Into::into).collect());
        self
    }

    pub fn simplified(mut self, simplified: bool) -> Self {
        self.simplified = Some(simplified);
        self
    }

    pub fn database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_none() && self.simplified.is_none() && self.database.is_none()
    }

    /// Build options from a loosely typed table, e.g. the `[analyzer]`
    /// section of the config file.
    pub fn from_table(table: &toml::Table) -> Result<Self> {
        Self::from_pairs(table.iter().map(|(k, v)| (k.as_str(), v.clone())))
    }

    pub fn from_pairs<I, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, toml::Value)>,
        K: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            let key = key.as_ref();
            match key {
                "flags" => options.flags = Some(FlagToken::list_from_value(&value)?),
                "simplified" => {
                    let on = value.as_bool().ok_or_else(|| invalid(key, &value, "boolean"))?;
                    options.simplified = Some(on);
                }
                "database" => {
                    let path = value.as_str().ok_or_else(|| invalid(key, &value, "string"))?;
                    options.database = Some(PathBuf::from(path));
                }
                other => return Err(MagicError::UnknownOption(other.to_string())),
            }
        }
        Ok(options)
    }
}

fn invalid(key: &str, value: &toml::Value, expected: &str) -> MagicError {
    MagicError::InvalidOption {
        key: key.to_string(),
        reason: format!("expected {expected}, got {}", value.type_str()),
    }
}
