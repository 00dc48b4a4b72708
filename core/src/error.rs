use crate::token::UnknownInput;

/// Errors surfaced by a decode request.
///
/// Everything else (segmentation gaps, dropped characters, scorer failures,
/// malformed dictionary rows) is recovered inside the decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("no dictionary loaded")]
    IndexNotLoaded,

    #[error("request cancelled")]
    Cancelled,

    #[error("unknown syllable {ch:?} at byte {position}")]
    UnknownSyllable { position: usize, ch: char },
}

impl From<UnknownInput> for DecodeError {
    fn from(e: UnknownInput) -> Self {
        DecodeError::UnknownSyllable {
            position: e.position,
            ch: e.ch,
        }
    }
}

/// A configuration value out of range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("malformed_warn_ratio must be within 0.0..=1.0, got {0}")]
    WarnRatio(f64),

    #[error("rerank.alpha must be finite, got {0}")]
    Alpha(f32),
}
