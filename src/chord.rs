//! Chord definitions: id, root, target pitch-class set, display name,
//! bass override, and the static chord library.

use std::collections::HashMap;
use std::sync::OnceLock;

/// A pitch class, 0..11 where C = 0.
pub type PitchClass = u8;

/// A MIDI note number, 0..127. `MidiNote % 12 == PitchClass`.
pub type MidiNote = u8;

/// Bitmask over pitch classes 0..11: bit `i` set ⇔ pitch class `i` is
/// a member. `Copy`, cheap to union/compare, and composes trivially
/// under transposition (rotate the low 12 bits).
pub type PitchClassSet = u16;

pub fn pitch_class_set_from(classes: impl IntoIterator<Item = PitchClass>) -> PitchClassSet {
    classes.into_iter().fold(0u16, |acc, pc| acc | (1 << (pc % 12)))
}

pub fn pitch_class_set_contains(set: PitchClassSet, pc: PitchClass) -> bool {
    set & (1 << (pc % 12)) != 0
}

pub fn pitch_class_set_transpose(set: PitchClassSet, semitones: i32) -> PitchClassSet {
    let shift = semitones.rem_euclid(12) as u32;
    let set = set & 0x0FFF;
    ((set << shift) | (set >> (12 - shift))) & 0x0FFF
}

/// An immutable chord definition. Shared by reference/id; never
/// mutated after construction (transposition produces a new value,
/// see [`crate::transpose::apply`]).
#[derive(Debug, Clone, PartialEq)]
pub struct ChordDefinition {
    pub id: String,
    pub display_name: String,
    pub root: PitchClass,
    pub bass_override: Option<PitchClass>,
    pub target_set: PitchClassSet,
    /// Ordered MIDI notes used only for guide-highlighting; never
    /// consulted by judgement.
    pub preferred_voicing: Vec<MidiNote>,
}

impl ChordDefinition {
    pub fn target_classes(&self) -> Vec<PitchClass> {
        (0..12u8).filter(|&pc| pitch_class_set_contains(self.target_set, pc)).collect()
    }
}

const PITCH_NAMES_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Quality suffixes recognised by the `<Root><Quality>[/Bass]` id
/// convention, with their semitone interval sets from the root.
const QUALITIES: &[(&str, &[u8])] = &[
    ("maj7", &[0, 4, 7, 11]),
    ("m7b5", &[0, 3, 6, 10]),
    ("dim7", &[0, 3, 6, 9]),
    ("maj9", &[0, 4, 7, 11, 2]),
    ("m9", &[0, 3, 7, 10, 2]),
    ("m7", &[0, 3, 7, 10]),
    ("m6", &[0, 3, 7, 9]),
    ("dim", &[0, 3, 6]),
    ("aug", &[0, 4, 8]),
    ("sus4", &[0, 5, 7]),
    ("sus2", &[0, 2, 7]),
    ("add9", &[0, 4, 7, 2]),
    ("9", &[0, 4, 7, 10, 2]),
    ("7", &[0, 4, 7, 10]),
    ("6", &[0, 4, 7, 9]),
    ("m", &[0, 3, 7]),
    ("maj", &[0, 4, 7]),
    ("", &[0, 4, 7]),
];

fn pitch_name_to_class(name: &str) -> Option<PitchClass> {
    let (letter, accidental) = name.split_at(1);
    let base = match letter {
        "C" => 0,
        "D" => 2,
        "E" => 4,
        "F" => 5,
        "G" => 7,
        "A" => 9,
        "B" => 11,
        _ => return None,
    };
    let offset: i32 = match accidental {
        "" => 0,
        "#" => 1,
        "b" => -1,
        _ => return None,
    };
    Some(((base + offset).rem_euclid(12)) as PitchClass)
}

fn quality_display_suffix(quality: &str) -> &str {
    quality
}

/// Parses a chord id in the `<Root><Quality>[/Bass]` convention, e.g.
/// `Cmaj7`, `F#m7b5`, `G/B`. Returns `None` if the root or bass pitch
/// name is unrecognised, or no known quality suffix matches.
///
/// The bass pitch class (if present) is folded into `target_set`: a
/// slash chord is only satisfied once its bass note is also played.
pub fn parse_id(id: &str) -> Option<ChordDefinition> {
    let (body, bass) = match id.split_once('/') {
        Some((body, bass)) => (body, Some(bass)),
        None => (id, None),
    };

    let root_len = if body.len() > 1 && (body.as_bytes()[1] == b'#' || body.as_bytes()[1] == b'b') {
        2
    } else {
        1
    };
    if body.len() < root_len {
        return None;
    }
    let (root_name, quality) = body.split_at(root_len);
    let root = pitch_name_to_class(root_name)?;

    let (quality_str, intervals) = QUALITIES.iter().find(|(q, _)| *q == quality)?;

    let mut classes: Vec<PitchClass> = intervals.iter().map(|&iv| (root + iv) % 12).collect();

    let bass_override = match bass {
        Some(bass_name) => {
            let bass_pc = pitch_name_to_class(bass_name)?;
            classes.push(bass_pc);
            Some(bass_pc)
        }
        None => None,
    };

    let display_name = match bass_override {
        Some(bass_pc) => format!(
            "{}{}/{}",
            PITCH_NAMES_SHARP[root as usize],
            quality_display_suffix(quality_str),
            PITCH_NAMES_SHARP[bass_pc as usize]
        ),
        None => format!(
            "{}{}",
            PITCH_NAMES_SHARP[root as usize],
            quality_display_suffix(quality_str)
        ),
    };

    Some(ChordDefinition {
        id: id.to_string(),
        display_name,
        root,
        bass_override,
        target_set: pitch_class_set_from(classes),
        preferred_voicing: Vec::new(),
    })
}

fn static_entries() -> Vec<ChordDefinition> {
    let mut defs = Vec::new();
    for root_name in PITCH_NAMES_SHARP {
        for (quality, _) in QUALITIES {
            let id = format!("{root_name}{quality}");
            if let Some(chord) = parse_id(&id) {
                defs.push(chord);
            }
        }
    }
    defs
}

fn library_cell() -> &'static HashMap<String, ChordDefinition> {
    static LIBRARY: OnceLock<HashMap<String, ChordDefinition>> = OnceLock::new();
    LIBRARY.get_or_init(|| {
        static_entries()
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect()
    })
}

/// Looks up a chord by id, first in the static table, falling back to
/// on-the-fly parsing (§6: "a static table keyed by chord id"; the
/// parser covers ids not pre-populated, e.g. slash chords).
pub fn lookup(id: &str) -> Option<ChordDefinition> {
    library_cell().get(id).cloned().or_else(|| parse_id(id))
}
