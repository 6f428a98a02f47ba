//! Typed one-way event stream to the presentation layer (spec §4.9).

use crate::chord::{ChordDefinition, PitchClassSet};
use crate::error::RunError;
use crate::judge::MonsterId;
use crate::note_generator::TimedNote;
use crate::run_state::Outcome;

pub type NoteId = u64;

/// Per-monster view model carried by `Event::FrameState` (spec §4.6
/// step 7): everything the presentation layer needs to render one
/// monster without reaching back into engine-internal state.
#[derive(Debug, Clone, PartialEq)]
pub struct MonsterView {
    pub id: MonsterId,
    pub slot: u32,
    pub hp: u32,
    pub max_hp: u32,
    pub gauge: f64,
    pub target: ChordDefinition,
    pub accepted_classes: PitchClassSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    LoopBoundaryCrossed { new_cycle: u64, new_transpose_offset: i32 },
    NoteDueSoon { id: NoteId, chord: ChordDefinition, seconds_ahead: f64 },
    NoteHit { id: NoteId, monster_id: MonsterId, damage: u32, is_special: bool },
    NoteMissed { id: NoteId },
    MonsterSpawned { id: MonsterId, slot: u32, chord: ChordDefinition },
    MonsterHit { id: MonsterId, hp_after: u32 },
    MonsterDefeated { id: MonsterId },
    MonsterAttacked { id: MonsterId, damage: u32 },
    Enraged { id: MonsterId },
    PlayerHpChanged { hp: u32 },
    SpChanged { sp: u8 },
    /// Consolidated per-tick view model (spec §4.6 step 7): current
    /// bar/beat (1-based), one `MonsterView` per occupied slot, notes
    /// due within the look-ahead window, and the active transpose
    /// offset.
    FrameState {
        measure: u32,
        beat: u32,
        monsters: Vec<MonsterView>,
        upcoming_notes: Vec<TimedNote>,
        current_transpose_offset: i32,
    },
    RunEnded { outcome: Outcome },
    RunPaused { reason: String },
    Error { code: &'static str, message: String },
}

impl From<RunError> for Event {
    fn from(err: RunError) -> Self {
        Event::Error { code: err.code(), message: err.to_string() }
    }
}

/// Implemented by the host; receives every event emitted during a
/// `tick` in emission order, synchronously, with no replay.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

/// Buffering sink used by tests and the demo binary.
#[derive(Debug, Default)]
pub struct VecEventSink {
    pub events: Vec<Event>,
}

impl EventSink for VecEventSink {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

impl VecEventSink {
    pub fn new() -> Self {
        VecEventSink::default()
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_preserves_emission_order() {
        let mut sink = VecEventSink::new();
        sink.emit(Event::PlayerHpChanged { hp: 2 });
        sink.emit(Event::SpChanged { sp: 1 });
        assert_eq!(sink.events, vec![Event::PlayerHpChanged { hp: 2 }, Event::SpChanged { sp: 1 }]);
    }

    #[test]
    fn run_error_converts_to_error_event_with_code() {
        let event: Event = RunError::InputOverflow.into();
        assert!(matches!(event, Event::Error { code: "input_overflow", .. }));
    }
}
