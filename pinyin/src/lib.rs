//! aipinyin crate root
//!
//! Pinyin-specific pieces on top of `aipinyin-core`: the syllable table,
//! the maximal-munch parser and a high-level `Engine`.
//!
//! Public API exported here:
//! - `SyllableTable`, `PINYIN_SYLLABLES` and `INITIALS` from `syllables`
//! - `Parser` from `parser`
//! - `Engine` from `engine`
//! - `PinyinConfig` from `config`

pub mod config;
pub mod engine;
pub mod parser;
pub mod syllables;

pub use config::PinyinConfig;
pub use engine::Engine;
pub use parser::Parser;
pub use syllables::{initial_of, SyllableTable, TableError, INITIALS, PINYIN_SYLLABLES};

// Convenience re-exports for common types used by callers.
pub use aipinyin_core::{
    BuildReport, CancellationToken, Candidate, Config, DecodeError, DecodeRequest, DictRow,
    DictSource, DictionaryIndex, GapFallback, RerankConfig, RerankStrategy, ScoreError, Scorer,
    Segment, SyllableParser, Token, UnknownPolicy, UserDict,
};
