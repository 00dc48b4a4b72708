//! Dictionary index: syllable-sequence keys to weighted words.
//!
//! The index is built once from `pinyin,word,weight` rows and is read-only
//! afterwards. Keys are syllable-id sequences, so `xi'an` (two syllables) and
//! `xian` (one syllable) never share a bucket even though they spell the same
//! letters.
//!
//! Build rules:
//! - duplicate `(key, word)` rows keep the maximum weight, whatever the row order;
//! - a word must have exactly one character per key syllable;
//! - malformed rows are skipped and counted in [`BuildReport`], never fatal.

use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::token::{SyllableId, SyllableParser, Token, TokenKind, UnknownPolicy};
use crate::utils;

/// Highest weight an entry may carry; larger source values are clamped.
pub const MAX_WEIGHT: u32 = 999;

/// A dictionary lookup key: one or more consecutive syllables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DictKey {
    ids: Box<[SyllableId]>,
    text: Box<str>,
}

impl DictKey {
    pub fn ids(&self) -> &[SyllableId] {
        &self.ids
    }

    /// Concatenated syllable text, e.g. `"nihao"`.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn syllable_count(&self) -> usize {
        self.ids.len()
    }
}

/// A single word under a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictEntry {
    pub word: String,
    /// Relative priority in `0..=999`; higher wins.
    pub weight: u32,
}

impl DictEntry {
    pub fn new<T: Into<String>>(word: T, weight: u32) -> Self {
        Self {
            word: word.into(),
            weight,
        }
    }
}

/// One typed source row, for callers that already parsed their asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictRow {
    pub pinyin: String,
    pub word: String,
    pub weight: u32,
}

impl DictRow {
    pub fn new<K: Into<String>, W: Into<String>>(pinyin: K, word: W, weight: u32) -> Self {
        Self {
            pinyin: pinyin.into(),
            word: word.into(),
            weight,
        }
    }
}

/// Per-reason counts of skipped source rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedRows {
    /// Not exactly three comma-separated fields.
    pub field_count: usize,
    /// Weight is not a non-negative integer.
    pub bad_weight: usize,
    /// Pinyin or word is empty.
    pub empty_field: usize,
    /// Word character count differs from the key's syllable count.
    pub length_mismatch: usize,
    /// Key does not split into complete syllables.
    pub unsegmentable_key: usize,
}

impl MalformedRows {
    pub fn total(&self) -> usize {
        self.field_count
            + self.bad_weight
            + self.empty_field
            + self.length_mismatch
            + self.unsegmentable_key
    }
}

/// Summary of one index build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Data rows seen (comments and blank lines excluded).
    pub rows: usize,
    pub accepted: usize,
    /// Rows that repeated an existing `(key, word)` pair.
    pub merged_duplicates: usize,
    pub clamped_weights: usize,
    pub comments: usize,
    pub blank: usize,
    pub malformed: MalformedRows,
}

impl BuildReport {
    pub fn malformed_total(&self) -> usize {
        self.malformed.total()
    }

    /// Fraction of data rows that were skipped as malformed.
    pub fn malformed_ratio(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.malformed_total() as f64 / self.rows as f64
        }
    }
}

#[derive(Debug)]
struct Bucket {
    key: DictKey,
    /// Initial of each key syllable, for abbreviation matching.
    initials: Box<[Arc<str>]>,
    /// Sorted by weight desc, then word asc.
    entries: Vec<DictEntry>,
}

/// Immutable dictionary index.
#[derive(Debug, Default)]
pub struct DictionaryIndex {
    buckets: Vec<Bucket>,
    by_key: AHashMap<Box<[SyllableId]>, usize>,
    /// Bucket indices ordered by key ids, for prefix scans.
    sorted: Vec<usize>,
    /// First letter of every key syllable, concatenated -> buckets.
    abbrev: AHashMap<Box<str>, Vec<usize>>,
    entry_count: usize,
}

impl DictionaryIndex {
    /// An index with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from typed rows. Rows failing validation are skipped and counted.
    pub fn build<I, P>(rows: I, parser: &P) -> (Self, BuildReport)
    where
        I: IntoIterator<Item = DictRow>,
        P: SyllableParser + ?Sized,
    {
        let mut builder = IndexBuilder::new(parser);
        for row in rows {
            builder.report.rows += 1;
            builder.push(&row.pinyin, &row.word, row.weight);
        }
        builder.finish()
    }

    /// Build from the line-oriented `pinyin,word,weight` text format.
    pub fn from_text<P>(text: &str, parser: &P) -> (Self, BuildReport)
    where
        P: SyllableParser + ?Sized,
    {
        let mut builder = IndexBuilder::new(parser);
        for line in text.lines() {
            builder.push_line(line);
        }
        builder.finish()
    }

    /// Read and build a dictionary file.
    ///
    /// Only I/O problems are errors; bad rows are reported, not fatal.
    pub fn load<Q, P>(path: Q, parser: &P) -> anyhow::Result<(Self, BuildReport)>
    where
        Q: AsRef<Path>,
        P: SyllableParser + ?Sized,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dictionary {}", path.display()))?;
        let (index, report) = Self::from_text(&text, parser);
        info!(
            path = %path.display(),
            keys = index.key_count(),
            entries = index.entry_count(),
            malformed = report.malformed_total(),
            "dictionary loaded"
        );
        Ok((index, report))
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Entries for an exact key, best first. Unknown keys give an empty slice.
    pub fn lookup(&self, ids: &[SyllableId]) -> &[DictEntry] {
        self.by_key
            .get(ids)
            .map(|&i| self.buckets[i].entries.as_slice())
            .unwrap_or(&[])
    }

    /// The key object for `ids`, if present.
    pub fn key(&self, ids: &[SyllableId]) -> Option<&DictKey> {
        self.by_key.get(ids).map(|&i| &self.buckets[i].key)
    }

    /// Segment `raw` and look it up. Keys that do not split exactly give nothing.
    pub fn lookup_text<P>(&self, raw: &str, parser: &P) -> &[DictEntry]
    where
        P: SyllableParser + ?Sized,
    {
        match parser.segment(raw, UnknownPolicy::Reject) {
            Ok(seg) => match seg.syllable_ids() {
                Some(ids) if !ids.is_empty() => self.lookup(&ids),
                _ => &[],
            },
            Err(_) => &[],
        }
    }

    /// Entries whose key starts with `prefix`, ordered by weight desc, then
    /// shorter keys, then key text, then word. At most `limit` results.
    pub fn lookup_prefix(&self, prefix: &[SyllableId], limit: usize) -> Vec<(&DictKey, &DictEntry)> {
        if prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        let start = self
            .sorted
            .partition_point(|&i| &*self.buckets[i].key.ids < prefix);
        let mut out: Vec<(&DictKey, &DictEntry)> = self.sorted[start..]
            .iter()
            .map(|&i| &self.buckets[i])
            .take_while(|b| b.key.ids.starts_with(prefix))
            .flat_map(|b| b.entries.iter().map(move |e| (&b.key, e)))
            .collect();
        sort_keyed(&mut out);
        out.truncate(limit);
        out
    }

    /// Entries matching a token run that mixes full syllables and bare
    /// initials. Full syllables must match exactly; an initial token matches
    /// any syllable whose initial starts with it (`z` matches `zhong`).
    /// Literal tokens never match.
    pub fn lookup_abbreviation(&self, tokens: &[Token], limit: usize) -> Vec<(&DictKey, &DictEntry)> {
        if tokens.is_empty() || limit == 0 || tokens.iter().any(Token::is_literal) {
            return Vec::new();
        }
        let pattern: String = tokens.iter().filter_map(|t| t.initial.chars().next()).collect();
        let Some(candidates) = self.abbrev.get(pattern.as_str()) else {
            return Vec::new();
        };

        let mut out: Vec<(&DictKey, &DictEntry)> = candidates
            .iter()
            .map(|&i| &self.buckets[i])
            .filter(|b| {
                b.key.ids.len() == tokens.len()
                    && tokens.iter().enumerate().all(|(pos, tok)| match tok.kind {
                        TokenKind::Syllable(id) => b.key.ids[pos] == id,
                        TokenKind::Initial => b.initials[pos].starts_with(&*tok.text),
                        TokenKind::Literal => false,
                    })
            })
            .flat_map(|b| b.entries.iter().map(move |e| (&b.key, e)))
            .collect();
        sort_keyed(&mut out);
        out.truncate(limit);
        out
    }

    /// Every `(key, entry)` pair, in key order. Used by diagnostics and tests.
    pub fn iter(&self) -> impl Iterator<Item = (&DictKey, &DictEntry)> {
        self.sorted.iter().flat_map(move |&i| {
            let b = &self.buckets[i];
            b.entries.iter().map(move |e| (&b.key, e))
        })
    }
}

fn sort_keyed(items: &mut [(&DictKey, &DictEntry)]) {
    items.sort_by(|a, b| {
        b.1.weight
            .cmp(&a.1.weight)
            .then_with(|| a.0.ids.len().cmp(&b.0.ids.len()))
            .then_with(|| a.0.text.cmp(&b.0.text))
            .then_with(|| a.1.word.cmp(&b.1.word))
    });
}

struct PendingBucket {
    key: DictKey,
    initials: Box<[Arc<str>]>,
    words: AHashMap<String, u32>,
}

/// Accumulates rows; resolves duplicates with max-weight on `finish`.
struct IndexBuilder<'p, P: ?Sized> {
    parser: &'p P,
    pending: AHashMap<Box<[SyllableId]>, PendingBucket>,
    report: BuildReport,
}

impl<'p, P: SyllableParser + ?Sized> IndexBuilder<'p, P> {
    fn new(parser: &'p P) -> Self {
        Self {
            parser,
            pending: AHashMap::new(),
            report: BuildReport::default(),
        }
    }

    fn push_line(&mut self, line: &str) {
        let line = line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            self.report.blank += 1;
            return;
        }
        if line.starts_with('#') {
            self.report.comments += 1;
            return;
        }
        self.report.rows += 1;

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [pinyin, word, weight] = fields.as_slice() else {
            self.report.malformed.field_count += 1;
            return;
        };
        let Ok(weight) = weight.parse::<u32>() else {
            self.report.malformed.bad_weight += 1;
            return;
        };
        self.push(pinyin, word, weight);
    }

    fn push(&mut self, pinyin: &str, word: &str, weight: u32) {
        let word = utils::normalize(word);
        if pinyin.trim().is_empty() || word.is_empty() {
            self.report.malformed.empty_field += 1;
            return;
        }

        let seg = match self.parser.segment(pinyin, UnknownPolicy::Reject) {
            Ok(seg) if seg.is_exact() && !seg.is_empty() => seg,
            _ => {
                self.report.malformed.unsegmentable_key += 1;
                debug!(pinyin, "skipping row with unsegmentable key");
                return;
            }
        };
        if word.chars().count() != seg.len() {
            self.report.malformed.length_mismatch += 1;
            debug!(pinyin, word = %word, "skipping row with length mismatch");
            return;
        }

        let weight = if weight > MAX_WEIGHT {
            self.report.clamped_weights += 1;
            MAX_WEIGHT
        } else {
            weight
        };

        let ids: Box<[SyllableId]> = seg.tokens.iter().filter_map(Token::syllable_id).collect();
        let bucket = self.pending.entry(ids.clone()).or_insert_with(|| PendingBucket {
            key: DictKey {
                text: seg.tokens.iter().map(|t| &*t.text).collect::<String>().into(),
                ids,
            },
            initials: seg.tokens.iter().map(|t| Arc::clone(&t.initial)).collect(),
            words: AHashMap::new(),
        });

        match bucket.words.get_mut(&word) {
            Some(existing) => {
                self.report.merged_duplicates += 1;
                *existing = (*existing).max(weight);
            }
            None => {
                bucket.words.insert(word, weight);
            }
        }
        self.report.accepted += 1;
    }

    fn finish(self) -> (DictionaryIndex, BuildReport) {
        let mut index = DictionaryIndex::empty();

        for (_, pending) in self.pending {
            let mut entries: Vec<DictEntry> = pending
                .words
                .into_iter()
                .map(|(word, weight)| DictEntry { word, weight })
                .collect();
            entries.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.word.cmp(&b.word)));
            index.entry_count += entries.len();
            index.buckets.push(Bucket {
                key: pending.key,
                initials: pending.initials,
                entries,
            });
        }

        // Hash iteration order is arbitrary; fix bucket order so every
        // build from the same rows is laid out identically.
        index.buckets.sort_by(|a, b| a.key.ids.cmp(&b.key.ids));
        for (i, bucket) in index.buckets.iter().enumerate() {
            index.by_key.insert(bucket.key.ids.clone(), i);
            let pattern: String = bucket
                .initials
                .iter()
                .filter_map(|s| s.chars().next())
                .collect();
            index.abbrev.entry(pattern.into_boxed_str()).or_default().push(i);
        }
        index.sorted = (0..index.buckets.len()).collect();

        debug!(
            keys = index.key_count(),
            entries = index.entry_count(),
            rows = self.report.rows,
            malformed = self.report.malformed_total(),
            "dictionary index built"
        );
        (index, self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::LetterParser;

    #[test]
    fn test_max_weight_wins_regardless_of_order() {
        let p = LetterParser::default();
        let (a, _) = DictionaryIndex::from_text("ab,甲乙,10\nab,甲乙,90\n", &p);
        let (b, _) = DictionaryIndex::from_text("ab,甲乙,90\nab,甲乙,10\n", &p);
        let ids = p.ids("ab");
        assert_eq!(a.lookup(&ids), &[DictEntry::new("甲乙", 90)]);
        assert_eq!(a.lookup(&ids), b.lookup(&ids));
    }

    #[test]
    fn test_lookup_sorted_by_weight_then_word() {
        let p = LetterParser::default();
        let (idx, report) = DictionaryIndex::from_text("a,乙,5\na,甲,5\na,丙,7\n", &p);
        assert_eq!(report.accepted, 3);
        let words: Vec<&str> = idx.lookup(&p.ids("a")).iter().map(|e| e.word.as_str()).collect();
        assert_eq!(words, vec!["丙", "乙", "甲"]);
    }

    #[test]
    fn test_malformed_rows_are_counted() {
        let p = LetterParser::default();
        let text = "# header\n\na,甲\na,甲,x\na,甲,-1\n,甲,3\nab,甲,3\na1,甲,3\na,甲,2000\n";
        let (idx, report) = DictionaryIndex::from_text(text, &p);
        assert_eq!(report.comments, 1);
        assert_eq!(report.blank, 1);
        assert_eq!(report.rows, 7);
        assert_eq!(report.malformed.field_count, 1);
        assert_eq!(report.malformed.bad_weight, 2);
        assert_eq!(report.malformed.empty_field, 1);
        assert_eq!(report.malformed.length_mismatch, 1);
        assert_eq!(report.malformed.unsegmentable_key, 1);
        assert_eq!(report.clamped_weights, 1);
        assert_eq!(idx.lookup(&p.ids("a")), &[DictEntry::new("甲", MAX_WEIGHT)]);
    }

    #[test]
    fn test_prefix_lookup() {
        let p = LetterParser::default();
        let (idx, _) = DictionaryIndex::from_text("ab,甲乙,10\nabc,甲乙丙,50\nb,乙,99\na,甲,1\n", &p);
        let hits = idx.lookup_prefix(&p.ids("ab"), 10);
        let words: Vec<&str> = hits.iter().map(|(_, e)| e.word.as_str()).collect();
        assert_eq!(words, vec!["甲乙丙", "甲乙"]);
        assert!(idx.lookup_prefix(&p.ids("c"), 10).is_empty());
    }

    #[test]
    fn test_bom_is_ignored() {
        let p = LetterParser::default();
        let (idx, report) = DictionaryIndex::from_text("\u{feff}a,甲,3\n", &p);
        assert_eq!(report.accepted, 1);
        assert_eq!(idx.entry_count(), 1);
    }
}
