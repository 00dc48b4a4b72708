// aipinyin/pinyin/src/parser.rs
//
// Pinyin parser for syllable segmentation.
// - Greedy maximal munch over the syllable trie
// - Apostrophe as an explicit syllable boundary (xi'an)
// - Bare initials as simple-pinyin shorthand (zg -> zh/z + g)

use std::sync::Arc;

use aipinyin_core::{Segmentation, SyllableParser, Token, UnknownInput, UnknownPolicy};
use tracing::trace;

use crate::config::PinyinConfig;
use crate::syllables::{SyllableTable, INITIALS};

/// Parser providing maximal-munch segmentation over a [`SyllableTable`].
///
/// Public entrypoints:
/// - `Parser::new` for the built-in Mandarin table
/// - `SyllableParser::segment` to split raw input into tokens
#[derive(Debug, Clone)]
pub struct Parser {
    table: Arc<SyllableTable>,
    simple_pinyin: bool,
    apostrophe_separator: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Parser over the standard table with simple pinyin and apostrophes on.
    pub fn new() -> Self {
        Self::with_table(SyllableTable::standard())
    }

    pub fn with_table(table: Arc<SyllableTable>) -> Self {
        Self {
            table,
            simple_pinyin: true,
            apostrophe_separator: true,
        }
    }

    pub fn from_config(config: &PinyinConfig) -> Self {
        Self::new()
            .simple_pinyin(config.simple_pinyin)
            .apostrophe_separator(config.apostrophe_separator)
    }

    /// Emit bare initials as `Initial` tokens instead of treating them as unknown.
    pub fn simple_pinyin(mut self, enabled: bool) -> Self {
        self.simple_pinyin = enabled;
        self
    }

    pub fn apostrophe_separator(mut self, enabled: bool) -> Self {
        self.apostrophe_separator = enabled;
        self
    }

    pub fn table(&self) -> &SyllableTable {
        &self.table
    }

    /// Longest initial at `pos`, as its char length.
    fn initial_at(&self, chars: &[char], pos: usize) -> Option<usize> {
        [2, 1].into_iter().find(|&n| {
            pos + n <= chars.len() && {
                let prefix: String = chars[pos..pos + n].iter().collect();
                INITIALS.contains(prefix.as_str())
            }
        })
    }
}

impl SyllableParser for Parser {
    fn segment(&self, input: &str, policy: UnknownPolicy) -> Result<Segmentation, UnknownInput> {
        // Byte offsets survive lowercasing: ASCII case mapping keeps lengths.
        let (offsets, chars): (Vec<usize>, Vec<char>) = input
            .char_indices()
            .map(|(pos, ch)| (pos, ch.to_ascii_lowercase()))
            .unzip();
        let byte_at = |i: usize| offsets.get(i).copied().unwrap_or(input.len());

        let mut seg = Segmentation::default();
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch == '\'' && self.apostrophe_separator {
                i += 1;
                continue;
            }

            if let Some((end, id)) = self.table.longest_match(&chars, i) {
                if let (Some(text), Some(initial)) = (self.table.text_arc(id), self.table.initial_arc(id)) {
                    seg.tokens.push(Token::syllable(
                        id,
                        Arc::clone(text),
                        Arc::clone(initial),
                        byte_at(i)..byte_at(end),
                    ));
                    i = end;
                    continue;
                }
            }

            if self.simple_pinyin {
                if let Some(n) = self.initial_at(&chars, i) {
                    let text: String = chars[i..i + n].iter().collect();
                    seg.tokens.push(Token::initial(Arc::from(text), byte_at(i)..byte_at(i + n)));
                    i += n;
                    continue;
                }
            }

            let position = byte_at(i);
            let original = input[position..].chars().next().unwrap_or(ch);
            match policy {
                UnknownPolicy::Drop => {
                    trace!(position, ch = %original, "dropping unknown input");
                    seg.unknown.push((position, original));
                }
                UnknownPolicy::PassThrough => {
                    seg.tokens
                        .push(Token::literal(original, position..position + original.len_utf8()));
                }
                UnknownPolicy::Reject => {
                    return Err(UnknownInput {
                        position,
                        ch: original,
                    })
                }
            }
            i += 1;
        }
        Ok(seg)
    }
}
