//! Matches pitch presses against monster expectations and computes hit
//! damage (spec §4.4).

use std::collections::HashMap;

use rand::Rng;

use crate::chord::{pitch_class_set_contains, PitchClass, PitchClassSet};

pub type MonsterId = u64;

#[derive(Debug, Clone)]
struct Expectation {
    target_set: PitchClassSet,
    display_name: String,
    accepted: PitchClassSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JudgeResult {
    /// A new pitch class joined the accepted set; target not yet fully covered.
    Partial { accepted_classes: PitchClassSet },
    /// Duplicate press, or out-of-set press outside any judgement window.
    Ignored,
    /// The accepted set now equals the target set.
    Complete { damage: u32, is_special: bool },
    /// Out-of-set press landing inside an active timing-mode judgement window.
    Incorrect { reason: String },
}

/// Stateful per-monster accumulation of accepted pitch classes. Holds
/// no knowledge of notes, timing windows, or monster hp — those are
/// the caller's (`RhythmCore`'s) concern; this type only ever answers
/// "does this press complete this monster's current chord".
#[derive(Debug, Default)]
pub struct JudgeEngine {
    expectations: HashMap<MonsterId, Expectation>,
}

impl JudgeEngine {
    pub fn new() -> Self {
        JudgeEngine { expectations: HashMap::new() }
    }

    pub fn set_expectation(&mut self, monster_id: MonsterId, target_set: PitchClassSet, display_name: String) {
        self.expectations.insert(monster_id, Expectation { target_set, display_name, accepted: 0 });
    }

    pub fn clear(&mut self, monster_id: MonsterId) {
        self.expectations.remove(&monster_id);
    }

    pub fn target_set(&self, monster_id: MonsterId) -> Option<PitchClassSet> {
        self.expectations.get(&monster_id).map(|e| e.target_set)
    }

    pub fn accepted_classes(&self, monster_id: MonsterId) -> PitchClassSet {
        self.expectations.get(&monster_id).map(|e| e.accepted).unwrap_or(0)
    }

    /// Registers a press against `monster_id`'s expectation.
    ///
    /// `timing_window` is `None` outside timing modes (an out-of-set
    /// press is simply `Ignored`, allowing stacking per §4.4(3));
    /// `Some(in_window)` in timing modes, where an out-of-set press
    /// that lands inside the active judgement window becomes
    /// `Incorrect` rather than silently ignored.
    pub fn input(
        &mut self,
        pitch_class: PitchClass,
        monster_id: MonsterId,
        timing_window: Option<bool>,
    ) -> JudgeResult {
        let Some(expectation) = self.expectations.get_mut(&monster_id) else {
            return JudgeResult::Ignored;
        };

        if !pitch_class_set_contains(expectation.target_set, pitch_class) {
            return match timing_window {
                Some(true) => JudgeResult::Incorrect {
                    reason: format!("pitch class {pitch_class} not in {}", expectation.display_name),
                },
                _ => JudgeResult::Ignored,
            };
        }

        if pitch_class_set_contains(expectation.accepted, pitch_class) {
            return JudgeResult::Ignored;
        }

        expectation.accepted |= 1 << (pitch_class % 12);

        if expectation.accepted == expectation.target_set {
            expectation.accepted = 0;
            JudgeResult::Partial { accepted_classes: 0 }
        } else {
            JudgeResult::Partial { accepted_classes: expectation.accepted }
        }
    }

    /// Same as [`Self::input`], but resolves completion into a damage
    /// roll instead of returning a bare `Partial` with an empty
    /// accepted set. Kept separate from `input` so the pure
    /// matching policy (testable without an RNG) stays isolated.
    pub fn input_and_roll<R: Rng + ?Sized>(
        &mut self,
        pitch_class: PitchClass,
        monster_id: MonsterId,
        timing_window: Option<bool>,
        rng: &mut R,
        damage_range: (u32, u32),
        player_sp: u8,
        specials_allowed: bool,
    ) -> (JudgeResult, Option<u8>) {
        let became_complete = {
            let Some(expectation) = self.expectations.get(&monster_id) else {
                return (JudgeResult::Ignored, None);
            };
            pitch_class_set_contains(expectation.target_set, pitch_class)
                && !pitch_class_set_contains(expectation.accepted, pitch_class)
                && (expectation.accepted | (1 << (pitch_class % 12))) == expectation.target_set
        };

        let result = self.input(pitch_class, monster_id, timing_window);
        match result {
            JudgeResult::Partial { accepted_classes } if became_complete && accepted_classes == 0 => {
                let (damage, is_special, new_sp) =
                    roll_damage(rng, damage_range, player_sp, specials_allowed);
                (JudgeResult::Complete { damage, is_special }, Some(new_sp))
            }
            other => (other, None),
        }
    }
}

/// Damage roll on `Complete` (spec §4.4 "Damage calculation"):
/// a uniform integer in `damage_range`, doubled and `sp -= 3` when
/// `sp >= 3` and specials are allowed, otherwise `sp` saturates at 5.
pub fn roll_damage<R: Rng + ?Sized>(
    rng: &mut R,
    damage_range: (u32, u32),
    player_sp: u8,
    specials_allowed: bool,
) -> (u32, bool, u8) {
    let (min, max) = damage_range;
    let base = if min >= max { min } else { rng.gen_range(min..=max) };

    if specials_allowed && player_sp >= 3 {
        (base * 2, true, player_sp - 3)
    } else {
        (base, false, player_sp.saturating_add(1).min(5))
    }
}

/// Attributes a press to the lowest-slot monster whose target set
/// contains `pitch_class` (spec §4.4(5)). `candidates` must be
/// pre-sorted by ascending slot.
pub fn attribute_monster(
    pitch_class: PitchClass,
    candidates: impl IntoIterator<Item = (MonsterId, PitchClassSet)>,
) -> Option<MonsterId> {
    candidates
        .into_iter()
        .find(|&(_, target_set)| pitch_class_set_contains(target_set, pitch_class))
        .map(|(id, _)| id)
}
