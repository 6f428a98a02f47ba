//! Player/run bookkeeping owned exclusively by `RhythmCore` (spec §3
//! `PlayerState`/`RunState`).

use crate::note_generator::TimedNote;
use crate::stage::StageConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Clear,
    GameOver,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub hp: u32,
    pub sp: u8,
    pub score: u64,
    pub correct_answers: u64,
    pub total_answered: u64,
}

impl PlayerState {
    pub fn new(max_hp: u32) -> Self {
        PlayerState { hp: max_hp, sp: 0, score: 0, correct_answers: 0, total_answered: 0 }
    }
}

/// `Monster`s live in `MonsterScheduler`, not here: `RhythmCore` owns
/// both and keeps them in lock-step inside `tick`. This struct holds
/// everything else the spec's `RunState` names.
#[derive(Debug, Clone)]
pub struct RunState {
    pub player: PlayerState,
    pub notes_for_current_loop: Vec<TimedNote>,
    pub current_note_index: usize,
    pub current_loop_cycle: u64,
    pub current_transpose_offset: i32,
    pub current_section_index: u32,
    pub awaiting_loop_start: bool,
    pub active: bool,
    pub finished: Option<Outcome>,
}

impl RunState {
    pub fn new(stage: &StageConfig) -> Self {
        RunState {
            player: PlayerState::new(stage.max_hp),
            notes_for_current_loop: Vec::new(),
            current_note_index: 0,
            current_loop_cycle: 0,
            current_transpose_offset: 0,
            current_section_index: 0,
            awaiting_loop_start: stage.count_in_measures > 0,
            active: true,
            finished: None,
        }
    }

    /// Invariant 1: `0 <= current_note_index <= notes_for_current_loop.len()`.
    pub fn note_index_in_bounds(&self) -> bool {
        self.current_note_index <= self.notes_for_current_loop.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Mode;

    fn stage() -> StageConfig {
        StageConfig {
            mode: Mode::Single,
            bpm: 120.0,
            time_signature: 4,
            measure_count: 4,
            count_in_measures: 0,
            allowed_chords: vec!["Cmaj".into()],
            chord_progression: vec![],
            max_hp: 3,
            enemy_hp: 1,
            enemy_gauge_seconds: 5.0,
            enemy_count: 1,
            min_damage: 1,
            max_damage: 1,
            simultaneous_monster_count: 1,
            play_root_on_correct: false,
            transpose: None,
            combined_stage_ids: vec![],
            combined_sections: vec![],
            is_auftakt: false,
            note_interval_beats: None,
            judgement_window_seconds: None,
            time_limit_seconds: None,
        }
    }

    #[test]
    fn new_run_state_starts_at_full_hp_and_zero_sp() {
        let state = RunState::new(&stage());
        assert_eq!(state.player.hp, 3);
        assert_eq!(state.player.sp, 0);
        assert!(state.note_index_in_bounds());
    }
}
