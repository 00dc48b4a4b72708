//! Lattice path search over a token sequence.
//!
//! Right-to-left dynamic programming: `best[i]` holds the best distinct paths
//! covering tokens `[i, n)`. Every path is a chain of arena nodes, so a
//! position only stores indices and extending a path is a single push. Nodes
//! never copy their suffix; text and boundaries are read by walking `next`.
//!
//! Ordering at every position is total and deterministic:
//! score desc, fewer segments, segment end-boundaries descending (longer
//! leading words first), then text asc. Paths that spell the same text keep
//! only the first (best) one.

use std::cmp::Ordering;

use ahash::AHashMap;
use tracing::{debug, debug_span};

use crate::cancel::CancellationToken;
use crate::candidate::{Candidate, Segment};
use crate::error::DecodeError;
use crate::lexicon::{DictEntry, DictKey, DictionaryIndex};
use crate::token::{SyllableId, Token};
use crate::userdict::UserSnapshot;
use crate::Config;

/// Score of one lattice edge.
///
/// `length_bonus` is linear in the span length so that longer words always
/// gain more than the shorter words they replace carry in bonus.
pub fn edge_score(config: &Config, weight: u32, len: usize, boost: i64, abbreviated: bool) -> i64 {
    let bonus = i64::try_from(len)
        .unwrap_or(i64::MAX)
        .saturating_mul(i64::from(config.length_bonus));
    let score = i64::from(weight).saturating_add(bonus).saturating_add(boost);
    if abbreviated {
        score.saturating_sub(i64::from(config.abbreviation_penalty))
    } else {
        score
    }
}

// Polynomial fingerprint base; fingerprints only bucket paths, equal text is
// always confirmed by walking both chains.
const FP_BASE: u64 = 0x100_0000_01b3;

fn fingerprint(word: &str) -> (u64, u64) {
    word.chars().fold((0u64, 1u64), |(hash, pow), ch| {
        (
            hash.wrapping_mul(FP_BASE).wrapping_add(u64::from(ch)),
            pow.wrapping_mul(FP_BASE),
        )
    })
}

/// A candidate word over tokens `[start, end)`.
#[derive(Debug, Clone)]
struct Edge {
    end: usize,
    word: String,
    key: String,
    ids: Vec<SyllableId>,
    weight: u32,
    score: i64,
}

#[derive(Debug)]
struct Node {
    segment: Segment,
    /// Score of the whole path starting at this node.
    score: i64,
    next: Option<usize>,
    segments: usize,
    /// Fingerprint of the path text and `FP_BASE^chars`, for composing.
    text_hash: u64,
    text_pow: u64,
}

/// Nodes of the path starting at `node`, head first.
fn walk<'n>(arena: &'n [Node], node: &'n Node) -> impl Iterator<Item = &'n Node> + 'n {
    std::iter::successors(Some(node), move |n| n.next.map(|i| &arena[i]))
}

fn path_text<'n>(arena: &'n [Node], node: &'n Node) -> impl Iterator<Item = char> + 'n {
    walk(arena, node).flat_map(|n| n.segment.word.chars())
}

fn path_ends<'n>(arena: &'n [Node], node: &'n Node) -> impl Iterator<Item = usize> + 'n {
    walk(arena, node).map(|n| n.segment.end)
}

fn path_order(arena: &[Node], a: &Node, b: &Node) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.segments.cmp(&b.segments))
        .then_with(|| path_ends(arena, b).cmp(path_ends(arena, a)))
        .then_with(|| path_text(arena, a).cmp(path_text(arena, b)))
}

fn same_text(arena: &[Node], a: &Node, b: &Node) -> bool {
    a.text_hash == b.text_hash && path_text(arena, a).eq(path_text(arena, b))
}

/// One search over a fixed token sequence and index snapshot.
pub struct Lattice<'a> {
    tokens: &'a [Token],
    index: &'a DictionaryIndex,
    config: &'a Config,
    user: Option<&'a UserSnapshot>,
}

impl<'a> Lattice<'a> {
    pub fn new(tokens: &'a [Token], index: &'a DictionaryIndex, config: &'a Config) -> Self {
        Self {
            tokens,
            index,
            config,
            user: None,
        }
    }

    /// Apply learned picks as score boosts.
    pub fn with_user(mut self, user: &'a UserSnapshot) -> Self {
        if !user.is_empty() {
            self.user = Some(user);
        }
        self
    }

    /// Run the search. Returns every path kept at position 0, best first;
    /// an empty list means the tokens cannot be covered (a segmentation gap).
    pub fn search(&self, cancel: &CancellationToken) -> Result<Vec<Candidate>, DecodeError> {
        let n = self.tokens.len();
        let _span = debug_span!("lattice", tokens = n).entered();
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut arena: Vec<Node> = Vec::new();
        let mut best: Vec<Vec<usize>> = vec![Vec::new(); n + 1];

        for i in (0..n).rev() {
            if cancel.is_cancelled() {
                debug!(position = i, "lattice search cancelled");
                return Err(DecodeError::Cancelled);
            }

            let mut pending: Vec<Node> = Vec::new();
            for edge in self.edges_from(i) {
                let raw = self.raw_range(i, edge.end);
                let segment = Segment {
                    start: i,
                    end: edge.end,
                    word: edge.word,
                    key: edge.key,
                    ids: edge.ids,
                    weight: edge.weight,
                    raw,
                };

                let (word_hash, word_pow) = fingerprint(&segment.word);

                if edge.end == n {
                    pending.push(Node {
                        segment,
                        score: edge.score,
                        next: None,
                        segments: 1,
                        text_hash: word_hash,
                        text_pow: word_pow,
                    });
                    continue;
                }

                for &cont in best[edge.end].iter().take(self.config.continuation_fanout) {
                    let tail = &arena[cont];
                    pending.push(Node {
                        segment: segment.clone(),
                        score: edge.score.saturating_add(tail.score),
                        next: Some(cont),
                        segments: tail.segments + 1,
                        text_hash: word_hash.wrapping_mul(tail.text_pow).wrapping_add(tail.text_hash),
                        text_pow: word_pow.wrapping_mul(tail.text_pow),
                    });
                }
            }

            pending.sort_by(|a, b| path_order(&arena, a, b));

            // Keep the first (best) path per text, at most `beam_width` of them.
            let mut kept: Vec<Node> = Vec::new();
            let mut by_hash: AHashMap<u64, Vec<usize>> = AHashMap::new();
            for node in pending {
                if kept.len() == self.config.beam_width {
                    break;
                }
                let bucket = by_hash.entry(node.text_hash).or_default();
                if bucket.iter().any(|&k| same_text(&arena, &kept[k], &node)) {
                    continue;
                }
                bucket.push(kept.len());
                kept.push(node);
            }

            for node in kept {
                best[i].push(arena.len());
                arena.push(node);
            }
        }

        let out: Vec<Candidate> = best[0].iter().map(|&head| collect_path(&arena, head)).collect();
        debug!(nodes = arena.len(), paths = out.len(), "lattice search finished");
        Ok(out)
    }

    /// Best-effort stitch used when no full path exists: every token takes
    /// its best single-token word, or keeps its own text when it has none.
    pub fn stitch_partial(&self) -> Candidate {
        let mut segments = Vec::with_capacity(self.tokens.len());
        let mut score = 0;
        for (i, tok) in self.tokens.iter().enumerate() {
            let edge = self
                .edges_from(i)
                .into_iter()
                .find(|e| e.end == i + 1)
                .unwrap_or_else(|| Edge {
                    end: i + 1,
                    word: tok.text.to_string(),
                    key: tok.text.to_string(),
                    ids: Vec::new(),
                    weight: 0,
                    score: 0,
                });
            score = edge.score.saturating_add(score);
            segments.push(Segment {
                start: i,
                end: i + 1,
                word: edge.word,
                key: edge.key,
                ids: edge.ids,
                weight: edge.weight,
                raw: tok.span.clone(),
            });
        }
        Candidate::from_segments(segments, score)
    }

    fn raw_range(&self, start: usize, end: usize) -> std::ops::Range<usize> {
        self.tokens[start].span.start..self.tokens[end - 1].span.end
    }

    fn boost(&self, key: &DictKey, word: &str) -> i64 {
        self.user
            .map_or(0, |u| u.boost(key.ids(), word, i64::from(self.config.user_boost)))
    }

    fn edges_from(&self, i: usize) -> Vec<Edge> {
        let tok = &self.tokens[i];
        if tok.is_literal() {
            return vec![Edge {
                end: i + 1,
                word: tok.text.to_string(),
                key: tok.text.to_string(),
                ids: Vec::new(),
                weight: 0,
                score: 0,
            }];
        }

        let max_len = self.config.max_span.min(self.tokens.len() - i);
        let mut edges = Vec::new();
        for len in 1..=max_len {
            let span = &self.tokens[i..i + len];
            if span.iter().any(Token::is_literal) {
                break;
            }
            let limit = if len == 1 {
                self.config.single_fanout
            } else {
                usize::MAX
            };

            if span.iter().any(Token::is_initial) {
                for (key, entry) in self.index.lookup_abbreviation(span, limit) {
                    edges.push(self.edge(i + len, key, entry, true));
                }
            } else {
                let ids: Vec<SyllableId> = span.iter().filter_map(Token::syllable_id).collect();
                let Some(key) = self.index.key(&ids) else {
                    continue;
                };
                for entry in self.index.lookup(&ids).iter().take(limit) {
                    edges.push(self.edge(i + len, key, entry, false));
                }
            }
        }
        edges
    }

    fn edge(&self, end: usize, key: &DictKey, entry: &DictEntry, abbreviated: bool) -> Edge {
        let boost = self.boost(key, &entry.word);
        Edge {
            end,
            word: entry.word.clone(),
            key: key.text().to_string(),
            ids: key.ids().to_vec(),
            weight: entry.weight,
            score: edge_score(self.config, entry.weight, key.syllable_count(), boost, abbreviated),
        }
    }
}

fn collect_path(arena: &[Node], head: usize) -> Candidate {
    let score = arena[head].score;
    let mut segments = Vec::with_capacity(arena[head].segments);
    let mut cur = Some(head);
    while let Some(idx) = cur {
        segments.push(arena[idx].segment.clone());
        cur = arena[idx].next;
    }
    Candidate::from_segments(segments, score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::LetterParser;
    use crate::token::{SyllableParser, UnknownPolicy};
    use crate::userdict::UserDict;

    fn run(dict: &str, input: &str) -> Vec<Candidate> {
        run_with(dict, input, &Config::default())
    }

    fn run_with(dict: &str, input: &str, config: &Config) -> Vec<Candidate> {
        let p = LetterParser::default();
        let (index, _) = DictionaryIndex::from_text(dict, &p);
        let seg = p.segment(input, UnknownPolicy::PassThrough).unwrap();
        Lattice::new(&seg.tokens, &index, config)
            .search(&CancellationToken::new())
            .unwrap()
    }

    fn texts(c: &[Candidate]) -> Vec<&str> {
        c.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_stitch_then_whole_word_wins() {
        let stitched = run("a,甲,100\nb,乙,100\n", "ab");
        assert_eq!(texts(&stitched), vec!["甲乙"]);
        assert_eq!(stitched[0].dict_score, 600);
        assert_eq!(stitched[0].boundaries(), vec![(0, 1), (1, 2)]);

        let whole = run("a,甲,100\nb,乙,100\nab,甲乙,900\n", "ab");
        assert_eq!(whole[0].text, "甲乙");
        assert_eq!(whole[0].dict_score, 1300);
        assert_eq!(whole[0].boundaries(), vec![(0, 2)]);
        // Same text through the stitch is deduplicated.
        assert_eq!(whole.len(), 1);
    }

    #[test]
    fn test_fewer_segments_break_ties() {
        let out = run("a,甲,300\nb,乙,300\nab,丙丁,600\n", "ab");
        assert_eq!(texts(&out), vec!["丙丁", "甲乙"]);
        assert_eq!(out[0].dict_score, out[1].dict_score);
    }

    #[test]
    fn test_longer_leading_word_breaks_ties() {
        // Both paths score 1100 with two segments; [0,2)+[2,3) comes first.
        let dict = "ab,甲乙,300\nc,丙,200\na,丁,200\nbc,戊己,300\n";
        let out = run(dict, "abc");
        assert_eq!(texts(&out), vec!["甲乙丙", "丁戊己"]);
        assert_eq!(out[0].boundaries(), vec![(0, 2), (2, 3)]);
    }

    #[test]
    fn test_paths_tile_the_input() {
        let dict = "a,甲,10\nb,乙,10\nc,丙,10\nab,甲乙,10\nbc,乙丙,10\nabc,甲乙丙,1\n";
        for cand in run(dict, "abc") {
            let mut pos = 0;
            for seg in &cand.segments {
                assert_eq!(seg.start, pos);
                pos = seg.end;
            }
            assert_eq!(pos, 3);
            let keys: String = cand.segments.iter().map(|s| s.key.as_str()).collect();
            assert_eq!(keys, "abc");
        }
    }

    #[test]
    fn test_gap_gives_no_paths() {
        assert!(run("a,甲,10\n", "ab").is_empty());
        assert!(run("", "a").is_empty());
    }

    #[test]
    fn test_literal_passes_through() {
        let out = run("a,甲,10\nb,乙,10\n", "a7b");
        assert_eq!(out[0].text, "甲7乙");
        assert_eq!(out[0].segments[1].weight, 0);
        assert_eq!(out[0].segments[1].raw, 1..2);
    }

    #[test]
    fn test_abbreviation_pays_penalty() {
        let config = Config::default();
        let out = run_with("ab,甲乙,500\n", "aB", &config);
        assert_eq!(out[0].text, "甲乙");
        assert_eq!(
            out[0].dict_score,
            500 + 2 * i64::from(config.length_bonus) - i64::from(config.abbreviation_penalty)
        );
        assert_eq!(out[0].segments[0].key, "ab");
    }

    #[test]
    fn test_beam_width_bounds_paths() {
        let mut dict = String::new();
        for (i, ch) in "甲乙丙丁戊己庚辛壬癸".chars().enumerate() {
            dict.push_str(&format!("a,{ch},{}\n", 100 + i));
        }
        let config = Config {
            beam_width: 3,
            ..Config::default()
        };
        let out = run_with(&dict, "aa", &config);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].text, "癸癸");
    }

    #[test]
    fn test_user_boost_reorders() {
        let p = LetterParser::default();
        let (index, _) = DictionaryIndex::from_text("a,甲,100\na,乙,90\n", &p);
        let seg = p.segment("a", UnknownPolicy::Drop).unwrap();
        let user = UserDict::new();
        user.learn(&p.ids("a"), "乙");
        let snap = user.snapshot();
        let config = Config::default();
        let out = Lattice::new(&seg.tokens, &index, &config)
            .with_user(&snap)
            .search(&CancellationToken::new())
            .unwrap();
        assert_eq!(out[0].text, "乙");
    }

    #[test]
    fn test_huge_boost_saturates() {
        let p = LetterParser::default();
        let (index, _) = DictionaryIndex::from_text("a,甲,100\na,乙,90\nb,丙,10\n", &p);
        let seg = p.segment("aba", UnknownPolicy::Drop).unwrap();
        let user = UserDict::new();
        user.learn_with_count(&p.ids("a"), "乙", u32::MAX);
        let snap = user.snapshot();
        let config = Config {
            user_boost: u32::MAX,
            ..Config::default()
        };
        let out = Lattice::new(&seg.tokens, &index, &config)
            .with_user(&snap)
            .search(&CancellationToken::new())
            .unwrap();
        assert_eq!(out[0].text, "乙丙乙");
        assert_eq!(out[0].dict_score, i64::MAX);
        assert_eq!(edge_score(&config, 999, 6, i64::MAX, true), i64::MAX - i64::from(config.abbreviation_penalty));
    }

    #[test]
    fn test_equal_text_from_different_splits_dedupes() {
        // 甲乙丙 is reachable as a|bc, ab|c and a|b|c; only the best survives.
        let dict = "a,甲,10\nb,乙,10\nc,丙,10\nab,甲乙,50\nbc,乙丙,40\n";
        let out = run(dict, "abc");
        assert_eq!(texts(&out), vec!["甲乙丙"]);
        assert_eq!(out[0].boundaries(), vec![(0, 2), (2, 3)]);
    }

    #[test]
    fn test_cancelled_search_errors() {
        let p = LetterParser::default();
        let (index, _) = DictionaryIndex::from_text("a,甲,100\n", &p);
        let seg = p.segment("aaa", UnknownPolicy::Drop).unwrap();
        let config = Config::default();
        let token = CancellationToken::new();
        token.cancel();
        let err = Lattice::new(&seg.tokens, &index, &config).search(&token).unwrap_err();
        assert!(matches!(err, DecodeError::Cancelled));
    }

    #[test]
    fn test_stitch_partial_keeps_raw_text() {
        let p = LetterParser::default();
        let (index, _) = DictionaryIndex::from_text("a,甲,100\n", &p);
        let seg = p.segment("ab", UnknownPolicy::Drop).unwrap();
        let config = Config::default();
        let cand = Lattice::new(&seg.tokens, &index, &config).stitch_partial();
        assert_eq!(cand.text, "甲b");
        assert_eq!(cand.dict_score, 100 + i64::from(config.length_bonus));
    }
}
