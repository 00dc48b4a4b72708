// core/src/engine.rs
//
// Generic decoder that works with any syllable parser.
// Language crates wrap it with their own parser and config.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;
use tracing::{debug, debug_span, warn};

use crate::cancel::{CancellationToken, RequestGate};
use crate::candidate::{finalize, Candidate, Segment};
use crate::context::ContextBuffer;
use crate::error::DecodeError;
use crate::lattice::{edge_score, Lattice};
use crate::lexicon::{BuildReport, DictRow, DictionaryIndex};
use crate::rerank::{rerank, RerankRequest, RerankStrategy, Scorer};
use crate::token::{SyllableParser, Token, UnknownPolicy};
use crate::userdict::UserDict;
use crate::{Config, GapFallback};

/// A published dictionary: the index plus the generation it was installed as.
#[derive(Debug)]
pub struct Snapshot {
    pub index: Arc<DictionaryIndex>,
    pub generation: u64,
}

/// Where a reload reads its dictionary from.
#[derive(Debug, Clone)]
pub enum DictSource<'a> {
    Text(&'a str),
    Path(&'a Path),
    Rows(Vec<DictRow>),
}

/// One decode call with every knob explicit.
#[derive(Debug, Clone, Default)]
pub struct DecodeRequest<'a> {
    pub input: &'a str,
    /// Preceding text; `None` uses the committed-text history.
    pub context: Option<&'a str>,
    /// Defaults to `Config::default_top_k`.
    pub top_k: Option<usize>,
    /// Defaults to `Config::rerank.strategy`.
    pub strategy: Option<RerankStrategy>,
    /// Defaults to a fresh token that is never cancelled.
    pub cancel: Option<CancellationToken>,
}

impl<'a> DecodeRequest<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    pub fn context(mut self, context: &'a str) -> Self {
        self.context = Some(context);
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn strategy(mut self, strategy: RerankStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Segmentation and lattice output for one input under one snapshot.
#[derive(Debug)]
struct Searched {
    tokens: Vec<Token>,
    paths: Vec<Candidate>,
}

/// (dictionary generation, user snapshot version, raw input)
type CacheKey = (u64, u64, String);

/// Generic decoder combining a parser, a dictionary snapshot, an optional
/// scorer and the user overlay.
///
/// Type parameter P is the parser (e.g. the pinyin maximal-munch parser).
/// The decoder is `Send + Sync`; share it behind an `Arc`.
pub struct Decoder<P> {
    parser: P,
    config: Config,
    slot: RwLock<Option<Arc<Snapshot>>>,
    generations: AtomicU64,
    scorer: Option<Arc<dyn Scorer>>,
    userdict: UserDict,
    gate: RequestGate,
    history: Mutex<ContextBuffer>,
    cache: Option<Mutex<LruCache<CacheKey, Arc<Searched>>>>,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

impl<P: SyllableParser> Decoder<P> {
    /// A decoder with no dictionary loaded yet; decoding fails with
    /// [`DecodeError::IndexNotLoaded`] until one is installed.
    pub fn new(parser: P, config: Config) -> Self {
        let cache = NonZeroUsize::new(config.max_cache_size).map(|cap| Mutex::new(LruCache::new(cap)));
        let history = ContextBuffer::new(config.context_history, config.max_context_chars);
        Self {
            parser,
            config,
            slot: RwLock::new(None),
            generations: AtomicU64::new(0),
            scorer: None,
            userdict: UserDict::new(),
            gate: RequestGate::new(),
            history: Mutex::new(history),
            cache,
            cache_hits: AtomicUsize::new(0),
            cache_misses: AtomicUsize::new(0),
        }
    }

    /// Attach a language-model scorer for reranking.
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Replace the user dictionary (e.g. one restored from disk).
    pub fn with_user_dict(mut self, userdict: UserDict) -> Self {
        self.userdict = userdict;
        self
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn user_dict(&self) -> &UserDict {
        &self.userdict
    }

    // ========== Dictionary snapshots ==========

    /// The current snapshot, if a dictionary has been installed.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        slot.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Generation of the current snapshot; 0 before the first install.
    pub fn generation(&self) -> u64 {
        self.snapshot().map_or(0, |s| s.generation)
    }

    /// Publish a prebuilt index. Decodes already running keep the snapshot
    /// they started with. Returns the new generation.
    pub fn install(&self, index: DictionaryIndex) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(Snapshot {
            index: Arc::new(index),
            generation,
        });
        {
            let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
            *slot = Some(snapshot);
        }
        debug!(generation, "dictionary snapshot installed");
        generation
    }

    /// Build a dictionary from `source` and swap it in.
    ///
    /// Only I/O failures are errors. Malformed rows are skipped and
    /// reported; too many of them log a warning.
    pub fn reload_dictionary(&self, source: DictSource<'_>) -> anyhow::Result<BuildReport> {
        let (index, report) = match source {
            DictSource::Text(text) => DictionaryIndex::from_text(text, &self.parser),
            DictSource::Path(path) => DictionaryIndex::load(path, &self.parser)?,
            DictSource::Rows(rows) => DictionaryIndex::build(rows, &self.parser),
        };
        self.publish(index, &report);
        Ok(report)
    }

    pub fn reload_from_text(&self, text: &str) -> BuildReport {
        let (index, report) = DictionaryIndex::from_text(text, &self.parser);
        self.publish(index, &report);
        report
    }

    pub fn reload_from_path<Q: AsRef<Path>>(&self, path: Q) -> anyhow::Result<BuildReport> {
        self.reload_dictionary(DictSource::Path(path.as_ref()))
    }

    fn publish(&self, index: DictionaryIndex, report: &BuildReport) {
        let ratio = report.malformed_ratio();
        if ratio > self.config.malformed_warn_ratio {
            warn!(
                malformed = report.malformed_total(),
                rows = report.rows,
                ratio,
                "dictionary has many malformed rows"
            );
        }
        self.install(index);
    }

    // ========== Decoding ==========

    /// Decode `input` with `context` as the preceding text.
    pub fn decode(&self, input: &str, context: &str, top_k: usize) -> Result<Vec<Candidate>, DecodeError> {
        self.decode_with(DecodeRequest::new(input).context(context).top_k(top_k))
    }

    pub fn decode_with(&self, request: DecodeRequest<'_>) -> Result<Vec<Candidate>, DecodeError> {
        let snapshot = self.snapshot().ok_or(DecodeError::IndexNotLoaded)?;
        let cancel = request.cancel.unwrap_or_default();
        let top_k = request.top_k.unwrap_or(self.config.default_top_k);
        let _span = debug_span!("decode", input = request.input, generation = snapshot.generation).entered();

        if cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let searched = self.search(&snapshot, request.input, &cancel)?;
        if searched.paths.is_empty() {
            return Ok(self.gap_fallback(&snapshot, request.input, &searched.tokens, top_k));
        }

        let candidates = finalize(searched.paths.clone(), top_k);
        let strategy = request.strategy.unwrap_or(self.config.rerank.strategy);
        let Some(scorer) = self.scorer.as_deref() else {
            return Ok(candidates);
        };

        let history;
        let context = match request.context {
            Some(context) => context,
            None => {
                history = self.history_text();
                history.as_str()
            }
        };
        let rerank_request = RerankRequest {
            context,
            tokens: &searched.tokens,
            index: &snapshot.index,
            config: &self.config,
            strategy,
            cancel: &cancel,
        };
        let outcome = rerank(scorer, &rerank_request, candidates)?;
        Ok(finalize(outcome.candidates, top_k))
    }

    fn search(
        &self,
        snapshot: &Snapshot,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<Searched>, DecodeError> {
        // Lattices carry user boosts, so the user snapshot is part of the key.
        let user = self.userdict.snapshot();
        let key = (snapshot.generation, user.version(), input.to_string());
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cache.get(&key) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(hit));
            }
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let segmentation = self.parser.segment(input, self.config.unknown_policy)?;
        if !segmentation.unknown.is_empty() {
            debug!(skipped = ?segmentation.unknown, "dropped unknown input");
        }
        let paths = Lattice::new(&segmentation.tokens, &snapshot.index, &self.config)
            .with_user(&user)
            .search(cancel)?;

        let searched = Arc::new(Searched {
            tokens: segmentation.tokens,
            paths,
        });
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.put(key, Arc::clone(&searched));
        }
        Ok(searched)
    }

    fn gap_fallback(&self, snapshot: &Snapshot, input: &str, tokens: &[Token], top_k: usize) -> Vec<Candidate> {
        if tokens.is_empty() {
            return Vec::new();
        }
        debug!(policy = ?self.config.gap_fallback, "no full path covers the input");
        match self.config.gap_fallback {
            GapFallback::Empty => Vec::new(),
            GapFallback::RawPinyin => {
                let raw = input.trim();
                let segment = Segment {
                    start: 0,
                    end: tokens.len(),
                    word: raw.to_string(),
                    key: raw.to_string(),
                    ids: Vec::new(),
                    weight: 0,
                    raw: 0..input.len(),
                };
                vec![Candidate::from_segments(vec![segment], 0)]
            }
            GapFallback::Partial => {
                let user = self.userdict.snapshot();
                let stitched = Lattice::new(tokens, &snapshot.index, &self.config)
                    .with_user(&user)
                    .stitch_partial();
                finalize(vec![stitched], top_k)
            }
        }
    }

    // ========== Completion and learning ==========

    /// Dictionary words whose key starts with the syllables of `input`.
    ///
    /// Input that does not read as whole syllables has no completions.
    pub fn complete(&self, input: &str, limit: usize) -> Result<Vec<Candidate>, DecodeError> {
        let snapshot = self.snapshot().ok_or(DecodeError::IndexNotLoaded)?;
        let segmentation = self.parser.segment(input, self.config.unknown_policy)?;
        let Some(ids) = segmentation.syllable_ids() else {
            return Ok(Vec::new());
        };
        let user = self.userdict.snapshot();
        let boost_per_pick = i64::from(self.config.user_boost);
        let token_count = segmentation.tokens.len();

        let completions = snapshot
            .index
            .lookup_prefix(&ids, limit)
            .into_iter()
            .map(|(key, entry)| {
                let boost = user.boost(key.ids(), &entry.word, boost_per_pick);
                let score = edge_score(&self.config, entry.weight, key.syllable_count(), boost, false);
                let segment = Segment {
                    start: 0,
                    end: token_count,
                    word: entry.word.clone(),
                    key: key.text().to_string(),
                    ids: key.ids().to_vec(),
                    weight: entry.weight,
                    raw: 0..input.len(),
                };
                Candidate::from_segments(vec![segment], score)
            })
            .collect();
        Ok(finalize(completions, limit))
    }

    /// Record that the user picked `candidate`; boosts each of its words.
    pub fn learn(&self, candidate: &Candidate) {
        for segment in candidate.segments.iter().filter(|s| !s.ids.is_empty()) {
            self.userdict.learn(&segment.ids, &segment.word);
        }
        // Entries for older user snapshots can no longer be hit.
        self.clear_cache();
    }

    /// Start a request, cancelling the one started before it.
    pub fn begin_request(&self) -> CancellationToken {
        self.gate.begin()
    }

    /// Add committed text to the history used as default context.
    pub fn commit(&self, text: &str) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(text);
    }

    /// The history rendered as a context string.
    pub fn history_text(&self) -> String {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.render()
    }

    pub fn clear_history(&self) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.clear();
    }

    /// Segment `input` with the configured unknown-input policy.
    pub fn segment(&self, input: &str) -> Result<Vec<Token>, DecodeError> {
        Ok(self.parser.segment(input, self.config.unknown_policy)?.tokens)
    }

    /// Segment with an explicit policy.
    pub fn segment_with(&self, input: &str, policy: UnknownPolicy) -> Result<Vec<Token>, DecodeError> {
        Ok(self.parser.segment(input, policy)?.tokens)
    }

    // ========== Cache ==========

    /// Returns (hits, misses).
    pub fn cache_stats(&self) -> (usize, usize) {
        (
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
        )
    }

    pub fn cache_size(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| {
            cache.lock().unwrap_or_else(|e| e.into_inner()).len()
        })
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rerank::ScoreError;
    use crate::testutil::LetterParser;

    fn decoder(dict: &str) -> Decoder<LetterParser> {
        let d = Decoder::new(LetterParser::default(), Config::default());
        d.reload_from_text(dict);
        d
    }

    #[test]
    fn test_decode_before_load_fails() {
        let d = Decoder::new(LetterParser::default(), Config::default());
        assert_eq!(d.decode("a", "", 5), Err(DecodeError::IndexNotLoaded));
    }

    #[test]
    fn test_cache_is_keyed_by_generation() {
        let d = decoder("a,甲,10\n");
        assert_eq!(d.decode("a", "", 5).unwrap()[0].text, "甲");
        assert_eq!(d.decode("a", "", 5).unwrap()[0].text, "甲");
        assert_eq!(d.cache_stats(), (1, 1));

        d.reload_from_text("a,乙,10\n");
        assert_eq!(d.generation(), 2);
        assert_eq!(d.decode("a", "", 5).unwrap()[0].text, "乙");
    }

    #[test]
    fn test_gap_fallbacks() {
        let mut config = Config::default();
        config.gap_fallback = GapFallback::RawPinyin;
        let d = Decoder::new(LetterParser::default(), config.clone());
        d.reload_from_text("a,甲,10\n");
        assert_eq!(d.decode("ab", "", 5).unwrap()[0].text, "ab");

        config.gap_fallback = GapFallback::Partial;
        let d = Decoder::new(LetterParser::default(), config);
        d.reload_from_text("a,甲,10\n");
        assert_eq!(d.decode("ab", "", 5).unwrap()[0].text, "甲b");

        let d = decoder("a,甲,10\n");
        assert!(d.decode("ab", "", 5).unwrap().is_empty());
    }

    #[test]
    fn test_learn_boosts_and_clears_cache() {
        let d = decoder("a,甲,100\na,乙,95\n");
        let out = d.decode("a", "", 5).unwrap();
        assert_eq!(out[0].text, "甲");
        d.learn(&out[1]);
        assert_eq!(d.cache_size(), 0);
        assert_eq!(d.decode("a", "", 5).unwrap()[0].text, "乙");
    }

    #[test]
    fn test_user_dict_changes_bypass_cache() {
        let d = decoder("a,甲,100\na,乙,95\n");
        let out = d.decode("a", "", 5).unwrap();
        d.learn(&out[1]);
        assert_eq!(d.decode("a", "", 5).unwrap()[0].text, "乙");
        assert_eq!(d.cache_size(), 1);

        d.user_dict().clear();
        assert_eq!(d.decode("a", "", 5).unwrap()[0].text, "甲");

        let ids = out[1].segments[0].ids.clone();
        d.user_dict().learn(&ids, "乙");
        assert_eq!(d.decode("a", "", 5).unwrap()[0].text, "乙");

        let other = UserDict::new();
        other.learn_with_count(&ids, "甲", 3);
        d.user_dict().merge_from(&other);
        assert_eq!(d.decode("a", "", 5).unwrap()[0].text, "甲");
    }

    #[test]
    fn test_complete_by_prefix() {
        let d = decoder("ab,甲乙,10\nabc,甲乙丙,50\nb,乙,99\n");
        let out = d.complete("ab", 5).unwrap();
        let texts: Vec<&str> = out.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["甲乙丙", "甲乙"]);
        assert!(d.complete("aB", 5).unwrap().is_empty());
    }

    #[test]
    fn test_reject_policy_surfaces_unknown() {
        let mut config = Config::default();
        config.unknown_policy = UnknownPolicy::Reject;
        let d = Decoder::new(LetterParser::default(), config);
        d.reload_from_text("a,甲,10\n");
        assert_eq!(
            d.decode("a1", "", 5),
            Err(DecodeError::UnknownSyllable { position: 1, ch: '1' })
        );
    }

    #[test]
    fn test_cancelled_request_is_reported() {
        let d = decoder("a,甲,10\n");
        let first = d.begin_request();
        let _second = d.begin_request();
        let err = d.decode_with(DecodeRequest::new("a").cancel(first)).unwrap_err();
        assert_eq!(err, DecodeError::Cancelled);
    }

    struct Echo;

    impl Scorer for Echo {
        fn score(&self, context: &str, text: &str) -> Result<f32, ScoreError> {
            Ok(if context.ends_with('甲') && text == "乙" { 50.0 } else { 0.0 })
        }
    }

    #[test]
    fn test_history_feeds_scorer_context() {
        let d = Decoder::new(LetterParser::default(), Config::default()).with_scorer(Arc::new(Echo));
        d.reload_from_text("a,甲,100\na,乙,95\n");
        assert_eq!(d.decode_with(DecodeRequest::new("a")).unwrap()[0].text, "甲");
        d.commit("甲");
        assert_eq!(d.history_text(), "甲");
        assert_eq!(d.decode_with(DecodeRequest::new("a")).unwrap()[0].text, "乙");
    }
}
