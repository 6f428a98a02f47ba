//! Pure expansion of a `StageConfig` chord progression into an ordered
//! sequence of scrolling notes (spec §4.3).

use rand::Rng;

use crate::chord::{lookup, ChordDefinition};
use crate::stage::{Mode, StageConfig};
use crate::transpose;

/// A single scrolling note, ordered by `hit_time` within a loop.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedNote {
    pub id: u64,
    pub hit_time: f64,
    pub chord: ChordDefinition,
    pub section_index: u32,
}

/// Expands one section's progression into notes with `hit_time` measured
/// from that section's own bar 1 (the caller adds a section offset for
/// `TimingCombined`).
fn expand_section<R: Rng + ?Sized>(
    stage: &StageConfig,
    section_index: u32,
    transpose_offset: i32,
    rng: &mut R,
    next_id: &mut u64,
) -> Vec<TimedNote> {
    let sec_per_beat = stage.sec_per_beat();
    let sec_per_bar = stage.sec_per_bar();

    let mut notes = Vec::new();

    match stage.mode {
        Mode::Single | Mode::SingleOrdered => {}

        Mode::ProgressionOrdered | Mode::ProgressionTiming | Mode::TimingCombined => {
            for step in stage.progression_steps() {
                let Some(base) = lookup(&step.chord_id) else { continue };
                let chord = transpose::apply(&base, transpose_offset);
                let hit_time = (step.bar.saturating_sub(1)) as f64 * sec_per_bar
                    + (step.beat - 1.0) * sec_per_beat;
                notes.push(TimedNote { id: *next_id, hit_time, chord, section_index });
                *next_id += 1;
            }
        }

        Mode::ProgressionRandom => {
            if stage.allowed_chords.is_empty() {
                return notes;
            }
            let interval_beats = stage.note_interval_beats.unwrap_or(stage.time_signature as f64);
            let total_beats = stage.measure_count as f64 * stage.time_signature as f64;
            let step_count = (total_beats / interval_beats).floor().max(0.0) as u64;

            let mut previous: Option<usize> = None;
            for i in 0..step_count {
                let choice = loop {
                    let idx = rng.gen_range(0..stage.allowed_chords.len());
                    if stage.allowed_chords.len() == 1 || Some(idx) != previous {
                        break idx;
                    }
                };
                previous = Some(choice);
                let Some(base) = lookup(&stage.allowed_chords[choice]) else { continue };
                let chord = transpose::apply(&base, transpose_offset);
                let hit_time = i as f64 * interval_beats * sec_per_beat;
                notes.push(TimedNote { id: *next_id, hit_time, chord, section_index });
                *next_id += 1;
            }
        }
    }

    notes.sort_by(|a, b| a.hit_time.partial_cmp(&b.hit_time).unwrap());
    notes
}

/// Generates the full ordered note sequence for one loop cycle.
/// `TimingCombined` sections are concatenated with an accumulated time
/// offset, each note carrying its originating `section_index`.
pub fn generate<R: Rng + ?Sized>(
    stage: &StageConfig,
    transpose_offset: i32,
    rng: &mut R,
) -> Vec<TimedNote> {
    let mut next_id = 0u64;

    if matches!(stage.mode, Mode::TimingCombined) {
        let mut notes = Vec::new();
        let mut offset = 0.0;
        for (section_index, section) in stage.combined_sections.iter().enumerate() {
            let mut section_notes =
                expand_section(section, section_index as u32, transpose_offset, rng, &mut next_id);
            for note in &mut section_notes {
                note.hit_time += offset;
            }
            offset += section.loop_duration();
            notes.extend(section_notes);
        }
        notes
    } else {
        expand_section(stage, 0, transpose_offset, rng, &mut next_id)
    }
}
