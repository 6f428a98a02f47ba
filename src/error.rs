//! Error taxonomy: fatal (returned from `start`) vs. recoverable
//! (surfaced through `Event::Error` while play continues).

use thiserror::Error;

/// Fatal errors. Surfaced on `RhythmCore::start`; the run never begins.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StartError {
    #[error("stage config invalid: {reason}")]
    ConfigInvalid { reason: String },

    #[error("chord id unknown: {id}")]
    ChordUnknown { id: String },
}

/// Recoverable errors. Logged, counted, and emitted as `Event::Error`;
/// `tick` keeps running afterwards.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunError {
    #[error("input bus overflowed, oldest PitchUp dropped")]
    InputOverflow,

    #[error("transpose offset {computed} out of range, normalised to {normalised}")]
    TransposeOutOfRange { computed: i32, normalised: i32 },

    #[error("transport lost: {reason}")]
    TransportLost { reason: String },
}

impl RunError {
    /// Short machine-readable code, per spec §7.
    pub fn code(&self) -> &'static str {
        match self {
            RunError::InputOverflow => "input_overflow",
            RunError::TransposeOutOfRange { .. } => "transpose_out_of_range",
            RunError::TransportLost { .. } => "transport_lost",
        }
    }
}
