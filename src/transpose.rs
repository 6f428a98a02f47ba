//! Pure functions for per-loop key offset and chord remapping (spec §4.8).

use crate::chord::{pitch_class_set_transpose, ChordDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatRule {
    Off,
    #[serde(rename = "+1")]
    PlusOneSemitone,
    #[serde(rename = "+5")]
    PlusFourthPerfect,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransposeSettings {
    pub initial_key_offset: i32,
    pub repeat_rule: RepeatRule,
}

/// Wraps a semitone offset into `[-6..+6]` by taking the enharmonic
/// equivalent (i.e. modulo 12, then shifted into the symmetric range).
fn wrap_to_symmetric_range(semitones: i32) -> i32 {
    let m = semitones.rem_euclid(12);
    if m > 6 { m - 12 } else { m }
}

/// `offset(loopCycle, settings) -> semitones`, per spec §4.8.
pub fn offset(loop_cycle: u64, settings: &TransposeSettings) -> i32 {
    let loop_cycle = loop_cycle as i32;
    let raw = match settings.repeat_rule {
        RepeatRule::Off => settings.initial_key_offset,
        RepeatRule::PlusOneSemitone => settings.initial_key_offset + loop_cycle,
        RepeatRule::PlusFourthPerfect => settings.initial_key_offset + 5 * loop_cycle,
    };
    wrap_to_symmetric_range(raw)
}

/// Transposes `root`, `bassOverride`, `targetSet`, and
/// `preferredVoicing` by `semitones mod 12`, regenerating
/// `displayName` via the chord library's naming rule.
pub fn apply(chord: &ChordDefinition, semitones: i32) -> ChordDefinition {
    let shift = semitones.rem_euclid(12) as i32;
    let new_root = ((chord.root as i32 + shift).rem_euclid(12)) as u8;
    let new_bass = chord.bass_override.map(|b| ((b as i32 + shift).rem_euclid(12)) as u8);
    let new_voicing = chord
        .preferred_voicing
        .iter()
        .map(|&m| ((m as i32 + shift).clamp(0, 127)) as u8)
        .collect();
    let new_target = pitch_class_set_transpose(chord.target_set, shift);

    let display_name = rename_for_transpose(chord, new_root, new_bass);

    ChordDefinition {
        id: chord.id.clone(),
        display_name,
        root: new_root,
        bass_override: new_bass,
        target_set: new_target,
        preferred_voicing: new_voicing,
    }
}

/// Rebuilds a display name (`root_name + quality_suffix[/bass_name]`)
/// given new root/bass pitch classes, reusing the original quality
/// suffix text (everything after the root letter/accidental and
/// before an optional `/bass` in the original `display_name`).
fn rename_for_transpose(chord: &ChordDefinition, new_root: u8, new_bass: Option<u8>) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let original_body = chord.display_name.split('/').next().unwrap_or("");
    let root_len = if original_body.len() > 1
        && (original_body.as_bytes()[1] == b'#')
    {
        2
    } else {
        1
    };
    let quality_suffix = original_body.get(root_len..).unwrap_or("");

    match new_bass {
        Some(bass) => format!("{}{}/{}", NAMES[new_root as usize], quality_suffix, NAMES[bass as usize]),
        None => format!("{}{}", NAMES[new_root as usize], quality_suffix),
    }
}
