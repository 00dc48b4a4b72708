//! Language-model reranking of lattice candidates.
//!
//! The lattice ranks by dictionary weight alone. A [`Scorer`] adds a
//! plausibility score given the preceding context, either for whole
//! sentences or one character at a time. A scorer that fails or runs past
//! its time budget never costs the user candidates: the pass falls back to
//! the dictionary order it was given.

use std::time::{Duration, Instant};

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, warn};

use crate::cancel::CancellationToken;
use crate::candidate::{by_score_desc, Candidate, Segment};
use crate::error::DecodeError;
use crate::lattice::edge_score;
use crate::lexicon::DictionaryIndex;
use crate::token::{SyllableId, Token, TokenKind};
use crate::Config;

/// Why a scorer could not produce a score.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("scorer unavailable: {0}")]
    Unavailable(String),

    #[error("scorer does not support next-character scoring")]
    Unsupported,

    #[error("scorer returned {got} scores for {expected} characters")]
    Shape { expected: usize, got: usize },

    #[error("scorer returned a non-finite score")]
    NonFinite,

    #[error("scorer budget of {0:?} exceeded")]
    BudgetExceeded(Duration),
}

/// Plausibility model for converted text. Higher is more plausible.
///
/// Implementations must be pure: the same inputs give the same scores.
pub trait Scorer: Send + Sync {
    /// Score `text` as the continuation of `context`.
    fn score(&self, context: &str, text: &str) -> Result<f32, ScoreError>;

    /// Unnormalized scores for each of `allowed` as the next character
    /// after `context`, in the same order.
    fn score_next(&self, _context: &str, _allowed: &[char]) -> Result<Vec<f32>, ScoreError> {
        Err(ScoreError::Unsupported)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankStrategy {
    /// Dictionary order only.
    Disabled,
    /// Whole candidates, ranked by model score alone.
    ModelOnly,
    /// Whole candidates, ranked by `dict_score + alpha * model_score`.
    #[default]
    Blend,
    /// Character-by-character scoring of the top candidates, ranked by
    /// `dict_score + alpha * model_score`.
    Constrained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub strategy: RerankStrategy,
    pub alpha: f32,
    /// Candidates scored by the constrained pass.
    pub constrained_top_n: usize,
    /// Let the constrained pass propose one greedy candidate of its own.
    pub extend: bool,
    /// Wall-clock budget for one pass; 0 disables the limit.
    pub scorer_budget_ms: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            strategy: RerankStrategy::default(),
            alpha: 100.0,
            constrained_top_n: 5,
            extend: false,
            scorer_budget_ms: 200,
        }
    }
}

/// Everything one reranking pass reads besides the candidates.
pub struct RerankRequest<'a> {
    pub context: &'a str,
    pub tokens: &'a [Token],
    pub index: &'a DictionaryIndex,
    pub config: &'a Config,
    pub strategy: RerankStrategy,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub candidates: Vec<Candidate>,
    /// The model pass completed and its order is in effect.
    pub applied: bool,
    /// Set when the pass gave up and the dictionary order was kept.
    pub fallback: Option<ScoreError>,
}

impl RerankOutcome {
    fn unchanged(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            applied: false,
            fallback: None,
        }
    }
}

/// Rerank `candidates` (in dictionary order). Only cancellation is an error.
pub fn rerank(
    scorer: &dyn Scorer,
    request: &RerankRequest<'_>,
    candidates: Vec<Candidate>,
) -> Result<RerankOutcome, DecodeError> {
    if candidates.is_empty() || request.strategy == RerankStrategy::Disabled {
        return Ok(RerankOutcome::unchanged(candidates));
    }
    let _span = debug_span!("rerank", strategy = ?request.strategy, n = candidates.len()).entered();

    let pass = Pass {
        scorer,
        request,
        started: Instant::now(),
    };
    let result = match request.strategy {
        RerankStrategy::Constrained => pass.constrained(&candidates),
        _ => pass.whole(&candidates),
    };

    match result {
        Ok(reranked) => {
            debug!(elapsed_us = pass.started.elapsed().as_micros() as u64, "rerank applied");
            Ok(RerankOutcome {
                candidates: reranked,
                applied: true,
                fallback: None,
            })
        }
        Err(Abort::Cancelled) => Err(DecodeError::Cancelled),
        Err(Abort::Score(err)) => {
            warn!(error = %err, "scorer unavailable, keeping dictionary order");
            Ok(RerankOutcome {
                candidates,
                applied: false,
                fallback: Some(err),
            })
        }
    }
}

enum Abort {
    Cancelled,
    Score(ScoreError),
}

impl From<ScoreError> for Abort {
    fn from(e: ScoreError) -> Self {
        Abort::Score(e)
    }
}

struct Pass<'a, 'r> {
    scorer: &'a dyn Scorer,
    request: &'a RerankRequest<'r>,
    started: Instant,
}

impl Pass<'_, '_> {
    fn rerank_config(&self) -> &RerankConfig {
        &self.request.config.rerank
    }

    /// Called before every scorer call.
    fn checkpoint(&self) -> Result<(), Abort> {
        if self.request.cancel.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        let budget_ms = self.rerank_config().scorer_budget_ms;
        if budget_ms > 0 {
            let budget = Duration::from_millis(budget_ms);
            if self.started.elapsed() > budget {
                return Err(Abort::Score(ScoreError::BudgetExceeded(budget)));
            }
        }
        Ok(())
    }

    fn blend(&self, dict_score: i64, model: f32) -> f32 {
        dict_score as f32 + self.rerank_config().alpha * model
    }

    fn whole(&self, candidates: &[Candidate]) -> Result<Vec<Candidate>, Abort> {
        let mut out = Vec::with_capacity(candidates.len());
        for cand in candidates {
            self.checkpoint()?;
            let model = self.scorer.score(self.request.context, &cand.text)?;
            if !model.is_finite() {
                return Err(ScoreError::NonFinite.into());
            }
            let mut cand = cand.clone();
            cand.model_score = Some(model);
            cand.score = match self.request.strategy {
                RerankStrategy::ModelOnly => model,
                _ => self.blend(cand.dict_score, model),
            };
            out.push(cand);
        }
        self.checkpoint()?;
        out.sort_by(by_score_desc);
        Ok(out)
    }

    fn constrained(&self, candidates: &[Candidate]) -> Result<Vec<Candidate>, Abort> {
        let tokens = self.request.tokens;
        let window = self.rerank_config().constrained_top_n.min(candidates.len());

        // Admissible characters per token, shared by every candidate.
        let allowed: Vec<Vec<char>> = tokens.iter().map(|t| self.admissible(t)).collect();

        let mut scored = Vec::with_capacity(candidates.len() + 1);
        let mut floor = f32::INFINITY;
        for cand in &candidates[..window] {
            let chars: Vec<char> = cand.text.chars().collect();
            if chars.len() != tokens.len() {
                // Not one character per token (raw-text fallback); unscorable.
                continue;
            }
            let model = self.walk(&chars, &allowed)?;
            floor = floor.min(model);
            let mut cand = cand.clone();
            cand.model_score = Some(model);
            cand.score = self.blend(cand.dict_score, model);
            scored.push(cand);
        }

        if self.rerank_config().extend && !tokens.is_empty() {
            let (chars, model) = self.greedy(&allowed)?;
            let text: String = chars.iter().collect();
            if !candidates.iter().any(|c| c.text == text) {
                let mut cand = self.stitch(&chars);
                floor = floor.min(model);
                cand.model_score = Some(model);
                cand.score = self.blend(cand.dict_score, model);
                scored.push(cand);
            }
        }

        // Unscored candidates are treated as no more plausible than the
        // least plausible scored one.
        let floor = if floor.is_finite() { floor } else { 0.0 };
        let mut seen: AHashSet<&str> = scored.iter().map(|c| c.text.as_str()).collect();
        let mut rest = Vec::new();
        for cand in candidates {
            if seen.insert(cand.text.as_str()) {
                let mut cand = cand.clone();
                cand.score = self.blend(cand.dict_score, floor);
                rest.push(cand);
            }
        }
        scored.extend(rest);
        scored.sort_by(by_score_desc);
        Ok(scored)
    }

    /// Sum of per-step log-softmax scores of `chars` among `allowed`.
    fn walk(&self, chars: &[char], allowed: &[Vec<char>]) -> Result<f32, Abort> {
        let mut context = self.request.context.to_string();
        let mut total = 0.0f32;
        for (ch, options) in chars.iter().zip(allowed) {
            let options = with_char(options, *ch);
            let scores = self.next_scores(&context, &options)?;
            let pos = options.iter().position(|c| c == ch).unwrap_or(0);
            total += log_softmax(&scores, pos);
            context.push(*ch);
        }
        Ok(total)
    }

    /// Best admissible character at every step.
    fn greedy(&self, allowed: &[Vec<char>]) -> Result<(Vec<char>, f32), Abort> {
        let mut context = self.request.context.to_string();
        let mut chars = Vec::with_capacity(allowed.len());
        let mut total = 0.0f32;
        for options in allowed {
            let scores = self.next_scores(&context, options)?;
            let mut best = 0;
            for (i, s) in scores.iter().enumerate() {
                if *s > scores[best] {
                    best = i;
                }
            }
            total += log_softmax(&scores, best);
            chars.push(options[best]);
            context.push(options[best]);
        }
        Ok((chars, total))
    }

    fn next_scores(&self, context: &str, options: &[char]) -> Result<Vec<f32>, Abort> {
        self.checkpoint()?;
        let scores = self.scorer.score_next(context, options)?;
        if scores.len() != options.len() {
            return Err(ScoreError::Shape {
                expected: options.len(),
                got: scores.len(),
            }
            .into());
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ScoreError::NonFinite.into());
        }
        Ok(scores)
    }

    /// Single-character dictionary words for one token. Never empty.
    fn admissible(&self, token: &Token) -> Vec<char> {
        let index = self.request.index;
        let mut out: Vec<char> = match token.kind {
            TokenKind::Syllable(id) => index
                .lookup(&[id])
                .iter()
                .filter_map(|e| single_char(&e.word))
                .collect(),
            TokenKind::Initial => index
                .lookup_abbreviation(std::slice::from_ref(token), usize::MAX)
                .into_iter()
                .filter_map(|(_, e)| single_char(&e.word))
                .collect(),
            TokenKind::Literal => token.text.chars().take(1).collect(),
        };
        let mut seen = AHashSet::new();
        out.retain(|c| seen.insert(*c));
        if out.is_empty() {
            out.extend(token.text.chars().take(1));
        }
        out
    }

    /// Single-character path spelling `chars`, scored like lattice edges.
    fn stitch(&self, chars: &[char]) -> Candidate {
        let config = self.request.config;
        let mut score = 0;
        let segments = self
            .request
            .tokens
            .iter()
            .zip(chars)
            .enumerate()
            .map(|(i, (tok, ch))| {
                let word = ch.to_string();
                let (weight, ids) = self.single_entry(tok, &word);
                if !tok.is_literal() {
                    score += edge_score(config, weight, 1, 0, tok.is_initial());
                }
                Segment {
                    start: i,
                    end: i + 1,
                    key: tok.text.to_string(),
                    ids,
                    word,
                    weight,
                    raw: tok.span.clone(),
                }
            })
            .collect();
        Candidate::from_segments(segments, score)
    }

    /// Weight and key of `word` as a single-token entry; zero and no key
    /// when the dictionary does not list it.
    fn single_entry(&self, token: &Token, word: &str) -> (u32, Vec<SyllableId>) {
        let index = self.request.index;
        match token.kind {
            TokenKind::Syllable(id) => index
                .lookup(&[id])
                .iter()
                .find(|e| e.word == word)
                .map_or((0, Vec::new()), |e| (e.weight, vec![id])),
            TokenKind::Initial => index
                .lookup_abbreviation(std::slice::from_ref(token), usize::MAX)
                .into_iter()
                .find(|(_, e)| e.word == word)
                .map_or((0, Vec::new()), |(k, e)| (e.weight, k.ids().to_vec())),
            TokenKind::Literal => (0, Vec::new()),
        }
    }
}

fn single_char(word: &str) -> Option<char> {
    let mut it = word.chars();
    match (it.next(), it.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn with_char(options: &[char], ch: char) -> Vec<char> {
    let mut out = options.to_vec();
    if !out.contains(&ch) {
        out.push(ch);
    }
    out
}

/// `scores[pos] - logsumexp(scores)`.
fn log_softmax(scores: &[f32], pos: usize) -> f32 {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = scores.iter().map(|s| (s - max).exp()).sum();
    scores[pos] - max - sum.ln()
}
