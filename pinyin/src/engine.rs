//! Pinyin decoding engine
//!
//! Provides a high-level `Engine` that combines the pinyin parser with the
//! generic `aipinyin_core::Decoder` into a simple
//! `decode(input, context, top_k) -> Vec<Candidate>` API.
//!
//! All search, reranking and caching logic lives in core.

use std::path::Path;
use std::sync::Arc;

use aipinyin_core::{
    BuildReport, CancellationToken, Candidate, DecodeError, DecodeRequest, Decoder, DictSource,
    DictionaryIndex, Scorer, Token, UserDict,
};
use tracing::info;

use crate::config::PinyinConfig;
use crate::parser::Parser;

/// Public engine for pinyin input.
///
/// The inner decoder is wrapped in `Arc` so clones share one dictionary
/// snapshot, cache and history across threads.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Decoder<Parser>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(PinyinConfig::default())
    }
}

impl Engine {
    /// Engine with no dictionary loaded yet.
    pub fn new(config: PinyinConfig) -> Self {
        Self::from_decoder(Decoder::new(Parser::from_config(&config), config.into_base()))
    }

    /// Engine built from an already configured decoder (scorer, user dictionary).
    pub fn from_decoder(decoder: Decoder<Parser>) -> Self {
        Self {
            inner: Arc::new(decoder),
        }
    }

    /// Load an engine with the dictionary at `path`.
    pub fn from_dict_path<P: AsRef<Path>>(path: P, config: PinyinConfig) -> anyhow::Result<Self> {
        let engine = Self::new(config);
        let report = engine.reload_from_path(path)?;
        info!(accepted = report.accepted, rows = report.rows, "pinyin engine ready");
        Ok(engine)
    }

    /// Engine with a scorer attached, as `Decoder::with_scorer`.
    pub fn with_scorer(config: PinyinConfig, scorer: Arc<dyn Scorer>) -> Self {
        Self::from_decoder(
            Decoder::new(Parser::from_config(&config), config.into_base()).with_scorer(scorer),
        )
    }

    /// Get a cloned Arc to the inner decoder.
    pub fn inner_arc(&self) -> Arc<Decoder<Parser>> {
        Arc::clone(&self.inner)
    }

    pub fn decoder(&self) -> &Decoder<Parser> {
        &self.inner
    }

    pub fn decode(&self, input: &str, context: &str, top_k: usize) -> Result<Vec<Candidate>, DecodeError> {
        self.inner.decode(input, context, top_k)
    }

    pub fn decode_with(&self, request: DecodeRequest<'_>) -> Result<Vec<Candidate>, DecodeError> {
        self.inner.decode_with(request)
    }

    /// Decode with the default top-k and the committed history as context.
    pub fn input(&self, input: &str) -> Result<Vec<Candidate>, DecodeError> {
        self.inner.decode_with(DecodeRequest::new(input))
    }

    pub fn complete(&self, input: &str, limit: usize) -> Result<Vec<Candidate>, DecodeError> {
        self.inner.complete(input, limit)
    }

    pub fn segment(&self, input: &str) -> Result<Vec<Token>, DecodeError> {
        self.inner.segment(input)
    }

    pub fn reload_dictionary(&self, source: DictSource<'_>) -> anyhow::Result<BuildReport> {
        self.inner.reload_dictionary(source)
    }

    pub fn reload_from_text(&self, text: &str) -> BuildReport {
        self.inner.reload_from_text(text)
    }

    pub fn reload_from_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<BuildReport> {
        self.inner.reload_from_path(path)
    }

    /// Publish a prebuilt index; returns its generation.
    pub fn install(&self, index: DictionaryIndex) -> u64 {
        self.inner.install(index)
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation()
    }

    /// Record a pick and add its text to the context history.
    pub fn select(&self, candidate: &Candidate) {
        self.inner.learn(candidate);
        self.inner.commit(&candidate.text);
    }

    pub fn learn(&self, candidate: &Candidate) {
        self.inner.learn(candidate);
    }

    pub fn commit(&self, text: &str) {
        self.inner.commit(text);
    }

    pub fn begin_request(&self) -> CancellationToken {
        self.inner.begin_request()
    }

    pub fn user_dict(&self) -> &UserDict {
        self.inner.user_dict()
    }

    pub fn clear_cache(&self) {
        self.inner.clear_cache();
    }
}
