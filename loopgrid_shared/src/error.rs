use thiserror::Error;

/// Raised by the composition update functions when a caller addresses
/// something that does not exist. The composition is never modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("track index {index} out of range (composition has {len} tracks)")]
    TrackOutOfRange { index: usize, len: usize },

    #[error("beat index {index} out of range on track {track} (loop has {len} beats)")]
    BeatOutOfRange { track: usize, index: usize, len: usize },

    #[error("effect index {index} out of range on track {track} (chain has {len} effects)")]
    EffectOutOfRange { track: usize, index: usize, len: usize },

    #[error("a loop must contain at least one beat")]
    EmptyLoop,

    #[error("track {track} has {actual} beats, expected {expected}")]
    LoopLengthMismatch { track: usize, expected: usize, actual: usize },
}
