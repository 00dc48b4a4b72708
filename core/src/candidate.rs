//! Decoded candidates and the final ranking pass.
//!
//! This module provides:
//! - `Candidate`: a whole-sentence conversion with its scores and segments
//! - `Segment`: one dictionary word inside a candidate
//! - `finalize`: dedupe, stable sort and truncation to top-K

use std::cmp::Ordering;
use std::ops::Range;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::token::SyllableId;

/// One word of a candidate, with enough position data for a front-end to
/// accept part of a conversion and re-type the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// First token index covered (inclusive).
    pub start: usize,
    /// Token index after the last one covered.
    pub end: usize,
    pub word: String,
    /// Concatenated syllables of the dictionary key ("nihao").
    pub key: String,
    /// Syllables of the dictionary key; empty for literal pass-through.
    pub ids: Vec<SyllableId>,
    /// Dictionary weight of the chosen entry (0 for literal pass-through).
    pub weight: u32,
    /// Byte range of the raw input this segment was typed as.
    pub raw: Range<usize>,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.start, self.end)
    }
}

/// A whole-sentence candidate.
///
/// Scores are on a relative scale; higher is better. `score` is what the
/// candidate is ranked by; `dict_score` is the lattice score it started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub score: f32,
    pub dict_score: i64,
    /// Language-model score, when a reranking pass ran.
    pub model_score: Option<f32>,
    pub segments: Vec<Segment>,
}

impl Candidate {
    /// A candidate ranked purely by its dictionary score.
    pub fn from_segments(segments: Vec<Segment>, dict_score: i64) -> Self {
        let text = segments.iter().map(|s| s.word.as_str()).collect();
        Self {
            text,
            score: dict_score as f32,
            dict_score,
            model_score: None,
            segments,
        }
    }

    /// `(start, end)` token bounds of every segment.
    pub fn boundaries(&self) -> Vec<(usize, usize)> {
        self.segments.iter().map(Segment::bounds).collect()
    }

    /// Number of input tokens this candidate covers.
    pub fn token_len(&self) -> usize {
        self.segments.last().map_or(0, |s| s.end)
    }
}

/// Descending by score; NaN sorts last.
pub(crate) fn by_score_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or_else(|| {
        // NaN never outranks a real score.
        a.score.is_nan().cmp(&b.score.is_nan())
    })
}

/// Final ranking: stable sort by score (ties keep incoming order), drop
/// repeated texts keeping the first, keep at most `top_k`.
pub fn finalize(mut candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
    candidates.sort_by(by_score_desc);
    let mut seen = AHashSet::new();
    candidates.retain(|c| seen.insert(c.text.clone()));
    candidates.truncate(top_k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: usize, end: usize, word: &str) -> Segment {
        Segment {
            start,
            end,
            word: word.to_string(),
            key: String::new(),
            ids: Vec::new(),
            weight: 0,
            raw: start..end,
        }
    }

    fn cand(text: &str, score: f32) -> Candidate {
        let mut c = Candidate::from_segments(vec![seg(0, text.chars().count(), text)], 0);
        c.score = score;
        c
    }

    #[test]
    fn test_from_segments_concatenates() {
        let c = Candidate::from_segments(vec![seg(0, 2, "你好"), seg(2, 4, "世界")], 1200);
        assert_eq!(c.text, "你好世界");
        assert_eq!(c.score, 1200.0);
        assert_eq!(c.boundaries(), vec![(0, 2), (2, 4)]);
        assert_eq!(c.token_len(), 4);
    }

    #[test]
    fn test_finalize_dedupes_and_truncates() {
        let out = finalize(
            vec![
                cand("甲", 1.0),
                cand("乙", 3.0),
                cand("甲", 5.0),
                cand("丙", 3.0),
                cand("丁", 0.5),
            ],
            3,
        );
        let texts: Vec<&str> = out.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["甲", "乙", "丙"]);
        assert_eq!(out[0].score, 5.0);
    }

    #[test]
    fn test_nan_sorts_last() {
        let out = finalize(vec![cand("甲", f32::NAN), cand("乙", -10.0)], 5);
        assert_eq!(out[0].text, "乙");
    }
}
