//! `chordrush`: the rhythm/judging engine for a chord-prompt
//! monster-battle rhythm game. Owns the musical clock, note
//! generation, chord-matching judgement, multi-monster combat state
//! machines, and a typed outbound event stream. Rendering, device
//! discovery, audio playback, and persistence are host concerns,
//! reached only through the ports in [`transport`] and [`events`].

pub mod chord;
pub mod clock;
pub mod error;
pub mod events;
pub mod input_bus;
pub mod judge;
pub mod monster;
pub mod note_generator;
pub mod rhythm_core;
pub mod rng;
pub mod run_state;
pub mod stage;
pub mod transport;
pub mod transpose;

pub use error::{RunError, StartError};
pub use events::{Event, EventSink, VecEventSink};
pub use rhythm_core::{RhythmCore, RunMetrics};
pub use run_state::Outcome;
pub use stage::{Mode, StageConfig};
pub use transport::{NullTransport, Transport};
