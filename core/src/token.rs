//! Token model shared by syllable segmenters and the lattice search.
//!
//! A segmenter turns raw keyboard input into a sequence of [`Token`]s. The
//! lattice only ever sees tokens, so the core stays independent of the
//! phonetic alphabet (pinyin today, anything with the same shape later).

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Interned syllable handle: an index into the segmenter's syllable table.
///
/// Two tokens denote the same syllable iff their ids are equal, so key
/// comparisons never touch the syllable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyllableId(pub u16);

/// What a token stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A complete syllable from the alphabet.
    Syllable(SyllableId),
    /// A bare initial typed as simple-pinyin shorthand ("zh" for "zhong").
    Initial,
    /// An input character outside the alphabet, kept verbatim.
    Literal,
}

/// One unit of segmented input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Canonical text of the token ("zhong", "zh", "7").
    pub text: Arc<str>,
    /// The initial this token starts with; used for abbreviation matching.
    /// Zero-initial syllables use their first letter, literals their text.
    pub initial: Arc<str>,
    /// Byte range of the raw input this token was read from.
    pub span: Range<usize>,
}

impl Token {
    pub fn syllable(id: SyllableId, text: Arc<str>, initial: Arc<str>, span: Range<usize>) -> Self {
        Self {
            kind: TokenKind::Syllable(id),
            text,
            initial,
            span,
        }
    }

    pub fn initial(text: Arc<str>, span: Range<usize>) -> Self {
        Self {
            kind: TokenKind::Initial,
            initial: Arc::clone(&text),
            text,
            span,
        }
    }

    pub fn literal(ch: char, span: Range<usize>) -> Self {
        let text: Arc<str> = Arc::from(ch.to_string());
        Self {
            kind: TokenKind::Literal,
            initial: Arc::clone(&text),
            text,
            span,
        }
    }

    pub fn syllable_id(&self) -> Option<SyllableId> {
        match self.kind {
            TokenKind::Syllable(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_initial(&self) -> bool {
        self.kind == TokenKind::Initial
    }

    pub fn is_literal(&self) -> bool {
        self.kind == TokenKind::Literal
    }
}

/// What a segmenter does with input it cannot read as a syllable or initial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    /// Skip the character; it is reported but produces no token.
    #[default]
    Drop,
    /// Keep the character as a [`TokenKind::Literal`] token that decodes to itself.
    PassThrough,
    /// Fail the whole segmentation.
    Reject,
}

/// Raised by a segmenter running under [`UnknownPolicy::Reject`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown input {ch:?} at byte {position}")]
pub struct UnknownInput {
    pub position: usize,
    pub ch: char,
}

/// Result of segmenting one raw input string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub tokens: Vec<Token>,
    /// Characters skipped under [`UnknownPolicy::Drop`], with byte offsets.
    pub unknown: Vec<(usize, char)>,
}

impl Segmentation {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| &*t.text).collect()
    }

    /// Syllable ids of every token, or `None` if any token is not a full syllable.
    pub fn syllable_ids(&self) -> Option<Vec<SyllableId>> {
        self.tokens.iter().map(Token::syllable_id).collect()
    }

    /// True when every token is a full syllable and nothing was skipped.
    pub fn is_exact(&self) -> bool {
        self.unknown.is_empty() && self.tokens.iter().all(|t| t.syllable_id().is_some())
    }
}

/// Trait that syllable segmenters implement to drive the generic decoder.
pub trait SyllableParser: Send + Sync {
    /// Split `input` into tokens, handling unreadable characters per `policy`.
    fn segment(&self, input: &str, policy: UnknownPolicy) -> Result<Segmentation, UnknownInput>;
}
