//! Tiny alphabet for unit tests: every lowercase letter is a syllable.
//!
//! Uppercase letters are read as bare initials (`Z` -> initial `z`), which
//! is enough to exercise abbreviation matching without a real pinyin table.

use crate::token::{Segmentation, SyllableId, SyllableParser, Token, UnknownInput, UnknownPolicy};

#[derive(Debug, Default)]
pub(crate) struct LetterParser;

impl LetterParser {
    pub fn ids(&self, s: &str) -> Vec<SyllableId> {
        s.bytes().map(|b| SyllableId(u16::from(b - b'a'))).collect()
    }
}

impl SyllableParser for LetterParser {
    fn segment(&self, input: &str, policy: UnknownPolicy) -> Result<Segmentation, UnknownInput> {
        let mut seg = Segmentation::default();
        for (pos, ch) in input.char_indices() {
            let span = pos..pos + ch.len_utf8();
            if ch.is_ascii_lowercase() {
                let text = ch.to_string();
                seg.tokens.push(Token::syllable(
                    SyllableId(u16::from(ch as u8 - b'a')),
                    text.as_str().into(),
                    text.as_str().into(),
                    span,
                ));
            } else if ch.is_ascii_uppercase() {
                seg.tokens
                    .push(Token::initial(ch.to_ascii_lowercase().to_string().into(), span));
            } else {
                match policy {
                    UnknownPolicy::Drop => seg.unknown.push((pos, ch)),
                    UnknownPolicy::PassThrough => seg.tokens.push(Token::literal(ch, span)),
                    UnknownPolicy::Reject => return Err(UnknownInput { position: pos, ch }),
                }
            }
        }
        Ok(seg)
    }
}
