use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analyzer::DEFAULT_READ_LENGTH;
use crate::error::{MagicError, Result};
use crate::options::AnalyzerOptions;

/// Root configuration, loaded from `~/.config/magicscope/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MagicConfig {
    /// Bytes read from stdin or readers before describing them.
    pub read_length: usize,
    /// Emit JSON from the CLI by default.
    pub json: bool,
    /// Analyzer options, validated by [`AnalyzerOptions::from_table`].
    pub analyzer: toml::Table,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for MagicConfig {
    fn default() -> Self {
        Self {
            read_length: DEFAULT_READ_LENGTH,
            json: false,
            analyzer: toml::Table::new(),
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl MagicConfig {
    /// Standard config file path: `~/.config/magicscope/config.toml`
    pub fn config_path() -> PathBuf {
        // Allow override via env var
        if let Ok(path) = std::env::var("MAGICSCOPE_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("magicscope")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        if config.read_length == 0 {
            return Err(MagicError::Config(format!(
                "{}: read_length must be greater than zero",
                path.display()
            )));
        }
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Validated analyzer options from the `[analyzer]` table.
    pub fn analyzer_options(&self) -> Result<AnalyzerOptions> {
        AnalyzerOptions::from_table(&self.analyzer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FlagToken;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = MagicConfig::default();
        assert_eq!(cfg.read_length, 1024);
        assert!(!cfg.json);
        assert!(cfg.analyzer_options().unwrap().is_empty());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = MagicConfig::default();
        cfg.read_length = 4096;
        cfg.analyzer.insert(
            "flags".to_string(),
            toml::Value::Array(vec![toml::Value::String("mime".to_string())]),
        );
        cfg.save_to(&path).unwrap();

        let loaded = MagicConfig::load_from(&path).unwrap();
        assert_eq!(loaded.read_length, 4096);
        assert_eq!(
            loaded.analyzer_options().unwrap().flags,
            Some(vec![FlagToken::from("mime")])
        );
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg =
            MagicConfig::load_from(Path::new("/tmp/nonexistent_magicscope_config.toml")).unwrap();
        assert_eq!(cfg.read_length, 1024);
    }

    #[test]
    fn test_unknown_analyzer_key_surfaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[analyzer]\nbogus_option = 1\n").unwrap();

        let cfg = MagicConfig::load_from(&path).unwrap();
        assert!(matches!(cfg.analyzer_options(), Err(MagicError::UnknownOption(_))));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "read_length = [").unwrap();
        assert!(matches!(MagicConfig::load_from(&path), Err(MagicError::TomlParse(_))));
    }

    #[test]
    fn test_zero_read_length_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "read_length = 0\n").unwrap();
        assert!(matches!(MagicConfig::load_from(&path), Err(MagicError::Config(_))));
    }
}
