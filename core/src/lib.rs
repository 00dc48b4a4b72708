//! aipinyin-core
//!
//! Language-agnostic decoding engine shared by phonetic input crates: token
//! model, dictionary index, lattice search, language-model reranking,
//! user learning and configuration.
//!
//! Public API:
//! - `Decoder` - Generic decoder over any `SyllableParser`
//! - `DictionaryIndex` - Syllable-sequence keys to weighted words
//! - `Lattice` - Bounded right-to-left path search
//! - `Scorer` - Language-model capability used for reranking
//! - `UserDict` - User learning overlay with bincode persistence
//! - `Config` - Search, ranking and reranking parameters
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub mod token;
pub use token::{
    Segmentation, SyllableId, SyllableParser, Token, TokenKind, UnknownInput, UnknownPolicy,
};

pub mod trie;
pub use trie::TrieNode;

pub mod lexicon;
pub use lexicon::{BuildReport, DictEntry, DictKey, DictRow, DictionaryIndex, MalformedRows, MAX_WEIGHT};

pub mod candidate;
pub use candidate::{Candidate, Segment};

pub mod lattice;
pub use lattice::Lattice;

pub mod rerank;
pub use rerank::{RerankConfig, RerankOutcome, RerankStrategy, ScoreError, Scorer};

pub mod cancel;
pub use cancel::{CancellationToken, RequestGate};

pub mod context;
pub use context::ContextBuffer;

pub mod userdict;
pub use userdict::{UserDict, UserSnapshot};

pub mod error;
pub use error::{ConfigError, DecodeError};

pub mod engine;
pub use engine::{DecodeRequest, Decoder, DictSource, Snapshot};

#[cfg(test)]
mod testutil;

/// What a decode returns when no path covers the whole input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFallback {
    /// No candidates.
    #[default]
    Empty,
    /// The raw input, unconverted, as the only candidate.
    RawPinyin,
    /// Best single-token words, keeping raw text where none exist.
    Partial,
}

/// Generic configuration for the decoder.
///
/// This config contains only language-agnostic fields. Language-specific
/// options (simple pinyin, separators) belong in the language crate's config,
/// which flattens this one.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Bonus per syllable covered by one word. Must be positive so longer
    /// words always gain more.
    pub length_bonus: u32,
    /// Longest word considered, in syllables.
    pub max_span: usize,
    /// Distinct paths kept per lattice position.
    pub beam_width: usize,
    /// Entries considered for a single-syllable span.
    pub single_fanout: usize,
    /// Continuations each entry is combined with.
    pub continuation_fanout: usize,
    pub default_top_k: usize,
    pub unknown_policy: UnknownPolicy,
    pub gap_fallback: GapFallback,
    /// Subtracted from words matched through bare initials.
    pub abbreviation_penalty: u32,
    /// Added per learned pick of a word.
    pub user_boost: u32,
    /// Committed strings kept as context history.
    pub context_history: usize,
    /// Characters of history handed to the scorer.
    pub max_context_chars: usize,
    /// Warn when more than this fraction of dictionary rows is malformed.
    pub malformed_warn_ratio: f64,
    /// Maximum number of entries in the input -> lattice cache (0 disables it).
    pub max_cache_size: usize,
    pub rerank: RerankConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            length_bonus: 200,
            max_span: 6,
            beam_width: 100,
            single_fanout: 10,
            continuation_fanout: 5,
            default_top_k: 5,
            unknown_policy: UnknownPolicy::Drop,
            gap_fallback: GapFallback::Empty,
            abbreviation_penalty: 100,
            user_boost: 20,
            context_history: 16,
            max_context_chars: 64,
            malformed_warn_ratio: 0.05,
            // 1000 entries is plenty for interactive typing
            max_cache_size: 1000,
            rerank: RerankConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }

    /// Load configuration from TOML string. Missing fields take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject values the search cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("length_bonus", self.length_bonus as usize),
            ("max_span", self.max_span),
            ("beam_width", self.beam_width),
            ("single_fanout", self.single_fanout),
            ("continuation_fanout", self.continuation_fanout),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if !(0.0..=1.0).contains(&self.malformed_warn_ratio) {
            return Err(ConfigError::WarnRatio(self.malformed_warn_ratio));
        }
        if !self.rerank.alpha.is_finite() {
            return Err(ConfigError::Alpha(self.rerank.alpha));
        }
        Ok(())
    }
}

/// Utility helpers.
pub mod utils {
    /// Normalize input strings (NFC) and trim whitespace.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect::<String>().trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.length_bonus, 200);
        assert_eq!(config.unknown_policy, UnknownPolicy::Drop);
        assert_eq!(config.gap_fallback, GapFallback::Empty);
    }

    #[test]
    fn test_partial_toml_takes_defaults() {
        let config = Config::from_toml_str(
            r#"
            beam_width = 20
            gap_fallback = "partial"

            [rerank]
            strategy = "constrained"
            extend = true
            "#,
        )
        .unwrap();
        assert_eq!(config.beam_width, 20);
        assert_eq!(config.gap_fallback, GapFallback::Partial);
        assert_eq!(config.rerank.strategy, RerankStrategy::Constrained);
        assert!(config.rerank.extend);
        assert_eq!(config.rerank.constrained_top_n, 5);
        assert_eq!(config.max_span, 6);
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decoder.toml");
        let mut config = Config::default();
        config.user_boost = 35;
        config.save_toml(&path).unwrap();
        assert_eq!(Config::load_toml(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_zero_bonus() {
        let config = Config {
            length_bonus: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("length_bonus")));
    }

    #[test]
    fn test_normalize_composes_and_trims() {
        assert_eq!(utils::normalize("  e\u{301} "), "\u{e9}");
    }
}
