use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Pinyin-specific configuration that extends the base `Config` from core.
///
/// This configuration includes:
/// - All generic options from `aipinyin_core::Config` (flattened via serde)
/// - Simple pinyin (bare initials such as `zg` for `zhongguo`)
/// - The apostrophe syllable separator
///
/// # Example
///
/// ```rust
/// use aipinyin::PinyinConfig;
///
/// let config = PinyinConfig::from_toml_str("simple_pinyin = false\nbeam_width = 40\n").unwrap();
/// assert!(!config.simple_pinyin);
/// assert_eq!(config.base().beam_width, 40);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PinyinConfig {
    /// Base configuration fields (search, ranking, reranking).
    #[serde(flatten)]
    pub base: aipinyin_core::Config,

    /// Accept bare initials as abbreviations.
    pub simple_pinyin: bool,

    /// Treat `'` as an explicit syllable boundary.
    pub apostrophe_separator: bool,
}

impl Default for PinyinConfig {
    fn default() -> Self {
        Self {
            base: aipinyin_core::Config::default(),
            simple_pinyin: true,
            apostrophe_separator: true,
        }
    }
}

impl PinyinConfig {
    /// Convert this pinyin config into the base config used by the decoder.
    pub fn into_base(self) -> aipinyin_core::Config {
        self.base
    }

    /// Get a reference to the base config
    pub fn base(&self) -> &aipinyin_core::Config {
        &self.base
    }

    /// Get a mutable reference to the base config
    pub fn base_mut(&mut self) -> &mut aipinyin_core::Config {
        &mut self.base
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load and validate a TOML config file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.base.validate()?;
        Ok(config)
    }
}
