/// Prefix trie over a syllable alphabet.
use std::collections::HashMap;

use crate::token::SyllableId;

/// A prefix tree mapping syllable spellings to interned ids.
///
/// Segmenters walk it from each input position; the deepest terminal
/// reached is the maximal-munch match.
///
/// # Example
/// ```
/// use aipinyin_core::trie::TrieNode;
/// use aipinyin_core::SyllableId;
///
/// let mut trie = TrieNode::new();
/// trie.insert("xi", SyllableId(0));
/// trie.insert("xian", SyllableId(1));
///
/// let input: Vec<char> = "xiande".chars().collect();
/// assert_eq!(trie.longest_prefix(&input, 0), Some((4, SyllableId(1))));
/// ```
#[derive(Debug, Default)]
pub struct TrieNode {
    children: HashMap<char, Box<TrieNode>>,
    /// Set when the path from the root to this node spells a syllable.
    id: Option<SyllableId>,
}

impl TrieNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a syllable spelling. Re-inserting a spelling replaces its id.
    pub fn insert(&mut self, syllable: &str, id: SyllableId) {
        let mut node = self;
        for ch in syllable.chars() {
            node = node.children.entry(ch).or_default();
        }
        node.id = Some(id);
    }

    /// Id of the exact spelling `word`, if it is a complete syllable.
    pub fn get(&self, word: &str) -> Option<SyllableId> {
        let mut node = self;
        for ch in word.chars() {
            node = node.children.get(&ch)?;
        }
        node.id
    }

    pub fn contains_word(&self, word: &str) -> bool {
        self.get(word).is_some()
    }

    /// All syllables that start at `start`, as `(end_index, id)` in order of
    /// increasing length. `end_index` is exclusive.
    pub fn walk_prefixes(&self, input: &[char], start: usize) -> Vec<(usize, SyllableId)> {
        let mut res = Vec::new();
        let mut node = self;
        for (offset, ch) in input.iter().skip(start).enumerate() {
            match node.children.get(ch) {
                Some(child) => {
                    node = child;
                    if let Some(id) = node.id {
                        res.push((start + offset + 1, id));
                    }
                }
                None => break,
            }
        }
        res
    }

    /// The longest syllable starting at `start`.
    pub fn longest_prefix(&self, input: &[char], start: usize) -> Option<(usize, SyllableId)> {
        self.walk_prefixes(input, start).pop()
    }
}
