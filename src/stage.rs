//! Immutable per-run stage descriptor (spec §3 `StageConfig`) plus
//! JSON (de)serialization per the external interface of spec §6.

use serde::{Deserialize, Serialize};

use crate::chord::lookup;
use crate::error::StartError;
use crate::transpose::TransposeSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Single,
    SingleOrdered,
    ProgressionRandom,
    ProgressionOrdered,
    ProgressionTiming,
    TimingCombined,
}

impl Mode {
    pub fn is_timing(self) -> bool {
        matches!(self, Mode::ProgressionTiming | Mode::TimingCombined)
    }

    pub fn is_progression(self) -> bool {
        matches!(
            self,
            Mode::ProgressionRandom | Mode::ProgressionOrdered | Mode::ProgressionTiming
        )
    }
}

/// Either a bare chord id string, or an object carrying bar/beat/lyric
/// metadata — matches spec §6 ("either a string chord id or an
/// object").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChordProgressionElement {
    Id(String),
    Detailed {
        bar: u32,
        beat: f64,
        chord: String,
        #[serde(default)]
        lyric_display: Option<String>,
    },
}

/// One step of an explicit (non-random) chord progression.
#[derive(Debug, Clone)]
pub struct ProgressionStep {
    pub bar: u32,
    pub beat: f64,
    pub chord_id: String,
    pub lyric_label: Option<String>,
}

fn steps_from_elements(elements: &[ChordProgressionElement]) -> Vec<ProgressionStep> {
    // When elements are bare ids (Single/ProgressionRandom-style
    // shorthand), each gets a synthetic one-beat-per-bar placement;
    // timing modes are expected to supply `Detailed` elements with
    // real bar/beat positions.
    elements
        .iter()
        .enumerate()
        .map(|(i, el)| match el {
            ChordProgressionElement::Id(id) => ProgressionStep {
                bar: i as u32 + 1,
                beat: 1.0,
                chord_id: id.clone(),
                lyric_label: None,
            },
            ChordProgressionElement::Detailed { bar, beat, chord, lyric_display } => {
                ProgressionStep {
                    bar: *bar,
                    beat: *beat,
                    chord_id: chord.clone(),
                    lyric_label: lyric_display.clone(),
                }
            }
        })
        .collect()
}

fn default_damage_range() -> (u32, u32) {
    (10, 20)
}

fn default_simultaneous() -> u32 {
    1
}

fn default_time_signature() -> u32 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub mode: Mode,
    pub bpm: f64,
    #[serde(rename = "time_signature", default = "default_time_signature")]
    pub time_signature: u32,
    #[serde(rename = "measure_count")]
    pub measure_count: u32,
    #[serde(rename = "count_in_measures", default)]
    pub count_in_measures: u32,
    #[serde(rename = "allowed_chords", default)]
    pub allowed_chords: Vec<String>,
    #[serde(rename = "chord_progression", default)]
    pub chord_progression: Vec<ChordProgressionElement>,
    #[serde(rename = "max_hp", default = "default_max_hp")]
    pub max_hp: u32,
    #[serde(rename = "enemy_hp", default = "default_enemy_hp")]
    pub enemy_hp: u32,
    #[serde(rename = "enemy_gauge_seconds", default = "default_gauge_seconds")]
    pub enemy_gauge_seconds: f64,
    #[serde(rename = "enemy_count", default)]
    pub enemy_count: u32,
    #[serde(rename = "min_damage", default)]
    pub min_damage: u32,
    #[serde(rename = "max_damage", default)]
    pub max_damage: u32,
    #[serde(rename = "simultaneous_monster_count", default = "default_simultaneous")]
    pub simultaneous_monster_count: u32,
    #[serde(rename = "play_root_on_correct", default)]
    pub play_root_on_correct: bool,
    #[serde(default)]
    pub transpose: Option<TransposeSettings>,
    #[serde(rename = "combined_stage_ids", default)]
    pub combined_stage_ids: Vec<String>,
    #[serde(default)]
    pub combined_sections: Vec<StageConfig>,
    #[serde(rename = "is_auftakt", default)]
    pub is_auftakt: bool,
    #[serde(rename = "note_interval_beats", default)]
    pub note_interval_beats: Option<f64>,
    /// Judgement window override, seconds (pre, post). Ambient field,
    /// see DESIGN.md "Open Questions — decisions".
    #[serde(default)]
    pub judgement_window_seconds: Option<(f64, f64)>,
    /// Daily-challenge style hard cutoff. Ambient field.
    #[serde(default)]
    pub time_limit_seconds: Option<f64>,
}

fn default_max_hp() -> u32 {
    100
}
fn default_enemy_hp() -> u32 {
    1
}
fn default_gauge_seconds() -> f64 {
    8.0
}

impl StageConfig {
    pub fn damage_range(&self) -> (u32, u32) {
        if self.min_damage == 0 && self.max_damage == 0 {
            default_damage_range()
        } else {
            (self.min_damage, self.max_damage.max(self.min_damage))
        }
    }

    pub fn sec_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn sec_per_bar(&self) -> f64 {
        self.sec_per_beat() * self.time_signature as f64
    }

    pub fn loop_duration(&self) -> f64 {
        self.measure_count as f64 * self.time_signature as f64 * 60.0 / self.bpm
    }

    pub fn count_in_seconds(&self) -> f64 {
        self.count_in_measures as f64 * self.sec_per_bar()
    }

    pub fn progression_steps(&self) -> Vec<ProgressionStep> {
        steps_from_elements(&self.chord_progression)
    }

    pub fn judgement_window(&self) -> (f64, f64) {
        self.judgement_window_seconds.unwrap_or((0.180, 0.180))
    }

    /// Validates field ranges/consistency and resolves every
    /// referenced chord id, per spec §7 (`ConfigInvalid`,
    /// `ChordUnknown`, both fatal on `start`).
    pub fn validate(&self) -> Result<(), StartError> {
        if self.bpm <= 0.0 {
            return Err(StartError::ConfigInvalid { reason: "bpm must be positive".into() });
        }
        if !matches!(self.time_signature, 2 | 3 | 4 | 6 | 8) {
            return Err(StartError::ConfigInvalid {
                reason: format!("time_signature {} not in {{2,3,4,6,8}}", self.time_signature),
            });
        }
        if self.measure_count == 0 {
            return Err(StartError::ConfigInvalid { reason: "measure_count must be positive".into() });
        }
        if self.simultaneous_monster_count == 0 || self.simultaneous_monster_count > 8 {
            return Err(StartError::ConfigInvalid {
                reason: format!(
                    "simultaneous_monster_count {} not in 1..=8",
                    self.simultaneous_monster_count
                ),
            });
        }
        if let Some(settings) = &self.transpose {
            if !(-6..=6).contains(&settings.initial_key_offset) {
                return Err(StartError::ConfigInvalid {
                    reason: format!(
                        "transpose.initial_key_offset {} not in -6..=6",
                        settings.initial_key_offset
                    ),
                });
            }
        }

        if matches!(self.mode, Mode::TimingCombined) {
            if self.combined_sections.is_empty() {
                return Err(StartError::ConfigInvalid {
                    reason: "TimingCombined requires at least one combined_sections entry".into(),
                });
            }
            for section in &self.combined_sections {
                if !section.combined_sections.is_empty() {
                    return Err(StartError::ConfigInvalid {
                        reason: "combined_sections entries must not themselves nest TimingCombined".into(),
                    });
                }
                section.validate()?;
            }
        } else if !self.combined_sections.is_empty() {
            return Err(StartError::ConfigInvalid {
                reason: "combined_sections is only valid for TimingCombined".into(),
            });
        }

        for id in &self.allowed_chords {
            if lookup(id).is_none() {
                return Err(StartError::ChordUnknown { id: id.clone() });
            }
        }
        for step in self.progression_steps() {
            if lookup(&step.chord_id).is_none() {
                return Err(StartError::ChordUnknown { id: step.chord_id });
            }
        }

        if self.mode.is_progression() && self.allowed_chords.is_empty() && self.chord_progression.is_empty() {
            return Err(StartError::ConfigInvalid {
                reason: "progression modes require allowed_chords or chord_progression".into(),
            });
        }

        Ok(())
    }
}
