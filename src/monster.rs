//! Per-monster state machines and spawn/replacement scheduling
//! (spec §4.5).

use rand::Rng;

use crate::chord::ChordDefinition;
use crate::events::{Event, NoteId};
use crate::judge::MonsterId;
use crate::stage::{Mode, StageConfig};

const HIT_DURATION_SECONDS: f64 = 0.300;
const FADE_DURATION_SECONDS: f64 = 0.800;
const ENRAGE_LIFETIME_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonsterState {
    Idle,
    Hit,
    FadingOut,
    Gone,
}

#[derive(Debug, Clone)]
pub struct Monster {
    pub id: MonsterId,
    pub slot: u32,
    pub chord_target: ChordDefinition,
    /// Identifies the "chord instance" `chord_target` represents, for
    /// `Event::NoteHit.id`: the due `TimedNote`'s id in timing modes,
    /// or a sequential counter in modes with no scrolling notes.
    pub current_instance_id: NoteId,
    pub hp: u32,
    pub max_hp: u32,
    pub gauge: f64,
    pub next_chord: Option<ChordDefinition>,
    pub state: MonsterState,
    pub spawned_at: f64,
    state_timer: f64,
    enraged: bool,
}

/// Owns every monster slot and the policy for who spawns next
/// (spec §4.5 "Spawning policy").
#[derive(Debug)]
pub struct MonsterScheduler {
    slots: Vec<Option<Monster>>,
    next_id: u64,
    next_instance_id: NoteId,
    mode: Mode,
    enemy_max_hp: u32,
    gauge_enabled: bool,
    gauge_per_second: f64,
    enemy_count: u32,
    defeated_count: u32,
    allowed_chords: Vec<String>,
    single_cursor: usize,
    last_single_choice: Option<usize>,
    expected_lifetime_seconds: f64,
}

impl MonsterScheduler {
    pub fn new(stage: &StageConfig) -> Self {
        let slot_count = if stage.mode.is_progression() {
            stage.simultaneous_monster_count as usize
        } else {
            1
        };
        let gauge_enabled = matches!(stage.mode, Mode::Single | Mode::SingleOrdered);
        MonsterScheduler {
            slots: (0..slot_count).map(|_| None).collect(),
            next_id: 0,
            next_instance_id: 0,
            mode: stage.mode,
            enemy_max_hp: stage.enemy_hp,
            gauge_enabled,
            gauge_per_second: if stage.enemy_gauge_seconds > 0.0 { 100.0 / stage.enemy_gauge_seconds } else { 0.0 },
            enemy_count: stage.enemy_count,
            defeated_count: 0,
            allowed_chords: stage.allowed_chords.clone(),
            single_cursor: 0,
            last_single_choice: None,
            expected_lifetime_seconds: if gauge_enabled { stage.enemy_gauge_seconds } else { stage.loop_duration().max(1.0) },
        }
    }

    pub fn monsters(&self) -> impl Iterator<Item = &Monster> {
        self.slots.iter().filter_map(|m| m.as_ref())
    }

    pub fn monster(&self, id: MonsterId) -> Option<&Monster> {
        self.monsters().find(|m| m.id == id)
    }

    /// Targets in ascending-slot order, for judge-attribution tie-breaking.
    /// `slots` is itself indexed by slot, so iteration order is already correct.
    pub fn active_targets(&self) -> Vec<(MonsterId, crate::chord::PitchClassSet)> {
        self.monsters()
            .filter(|m| m.state != MonsterState::Gone)
            .map(|m| (m.id, m.chord_target.target_set))
            .collect()
    }

    fn alloc_id(&mut self) -> MonsterId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn next_single_chord(&mut self, rng: &mut impl Rng) -> Option<ChordDefinition> {
        if self.allowed_chords.is_empty() {
            return None;
        }
        let idx = if matches!(self.mode, Mode::SingleOrdered) {
            let idx = self.single_cursor % self.allowed_chords.len();
            self.single_cursor += 1;
            idx
        } else {
            loop {
                let idx = rng.gen_range(0..self.allowed_chords.len());
                if self.allowed_chords.len() == 1 || Some(idx) != self.last_single_choice {
                    break idx;
                }
            }
        };
        self.last_single_choice = Some(idx);
        crate::chord::lookup(&self.allowed_chords[idx])
    }

    /// Spawns the initial monster(s) for a fresh `Single`/`SingleOrdered`
    /// run. Progression-mode initial monsters are assigned by the
    /// caller via [`Self::assign_target`], which owns the progression
    /// cursor (see `rhythm_core`).
    pub fn spawn_initial(&mut self, rng: &mut impl Rng, now: f64) -> Vec<Event> {
        let mut events = Vec::new();
        let slot_count = self.slots.len();
        for slot in 0..slot_count {
            if let Some(chord) = self.next_single_chord(rng) {
                events.extend(self.spawn_at_auto_instance(slot as u32, chord, now));
            }
        }
        events
    }

    fn alloc_instance_id(&mut self) -> NoteId {
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        id
    }

    /// Allocates a fresh chord-instance id, for callers (non-timing
    /// progression cursors) that assign chords the scheduler itself
    /// did not generate from a `TimedNote`.
    pub fn alloc_public_instance_id(&mut self) -> NoteId {
        self.alloc_instance_id()
    }

    fn spawn_at(&mut self, slot: u32, chord: ChordDefinition, instance_id: NoteId, now: f64) -> Vec<Event> {
        let id = self.alloc_id();
        let monster = Monster {
            id,
            slot,
            chord_target: chord.clone(),
            current_instance_id: instance_id,
            hp: self.enemy_max_hp,
            max_hp: self.enemy_max_hp,
            gauge: 0.0,
            next_chord: None,
            state: MonsterState::Idle,
            spawned_at: now,
            state_timer: 0.0,
            enraged: false,
        };
        self.slots[slot as usize] = Some(monster);
        log::debug!("monster: spawned id={id} slot={slot} chord={}", chord.display_name);
        vec![Event::MonsterSpawned { id, slot, chord }]
    }

    fn spawn_at_auto_instance(&mut self, slot: u32, chord: ChordDefinition, now: f64) -> Vec<Event> {
        let instance_id = self.alloc_instance_id();
        self.spawn_at(slot, chord, instance_id, now)
    }

    /// Directly assigns (or spawns) the monster in `slot` to `chord`
    /// with an explicit instance id, used by timing modes where the
    /// due `TimedNote`'s id should appear in `Event::NoteHit`, and by
    /// non-timing progression modes advancing their own cursor.
    pub fn assign_target(&mut self, slot: u32, chord: ChordDefinition, instance_id: NoteId, now: f64) -> Vec<Event> {
        match self.slots.get_mut(slot as usize).and_then(|s| s.as_mut()) {
            Some(monster) if monster.state != MonsterState::Gone => {
                monster.chord_target = chord;
                monster.current_instance_id = instance_id;
                Vec::new()
            }
            _ => self.spawn_at(slot, chord, instance_id, now),
        }
    }

    /// Applies completion damage to a monster: hit flash, hp
    /// reduction, defeat transition.
    pub fn apply_damage(&mut self, monster_id: MonsterId, damage: u32) -> Vec<Event> {
        let mut events = Vec::new();
        let Some(monster) = self.slots.iter_mut().flatten().find(|m| m.id == monster_id) else {
            return events;
        };
        monster.hp = monster.hp.saturating_sub(damage);
        monster.state = MonsterState::Hit;
        monster.state_timer = 0.0;
        events.push(Event::MonsterHit { id: monster_id, hp_after: monster.hp });
        if monster.hp == 0 {
            monster.state = MonsterState::FadingOut;
            monster.state_timer = 0.0;
            log::debug!("monster: defeated id={monster_id}");
            events.push(Event::MonsterDefeated { id: monster_id });
            self.defeated_count += 1;
        }
        events
    }

    /// Advances gauges and state-machine timers by `dt` seconds.
    /// `Single`/`SingleOrdered` slots that go `Gone` respawn
    /// immediately from `allowed_chords`; progression-mode slots that
    /// go `Gone` are reported via the returned list so the caller can
    /// assign the next progression chord itself.
    pub fn tick(&mut self, dt: f64, now: f64, rng: &mut impl Rng) -> (Vec<Event>, Vec<u32>) {
        let mut events = Vec::new();
        let mut slots_needing_chord = Vec::new();
        let slot_count = self.slots.len();

        for slot in 0..slot_count {
            let mut spawn_needed = false;

            if let Some(monster) = self.slots[slot].as_mut() {
                match monster.state {
                    MonsterState::Idle => {
                        if self.gauge_enabled {
                            monster.gauge += self.gauge_per_second * dt;
                            if monster.gauge >= 100.0 {
                                monster.gauge = 0.0;
                                events.push(Event::MonsterAttacked { id: monster.id, damage: 1 });
                            }
                        }
                        if !monster.enraged
                            && now - monster.spawned_at > self.expected_lifetime_seconds * ENRAGE_LIFETIME_MULTIPLIER
                        {
                            monster.enraged = true;
                            events.push(Event::Enraged { id: monster.id });
                        }
                    }
                    MonsterState::Hit => {
                        monster.state_timer += dt;
                        if monster.state_timer >= HIT_DURATION_SECONDS {
                            monster.state = MonsterState::Idle;
                            monster.state_timer = 0.0;
                        }
                    }
                    MonsterState::FadingOut => {
                        monster.state_timer += dt;
                        if monster.state_timer >= FADE_DURATION_SECONDS {
                            monster.state = MonsterState::Gone;
                        }
                    }
                    MonsterState::Gone => {
                        spawn_needed = true;
                    }
                }
            }

            if spawn_needed {
                if matches!(self.mode, Mode::Single | Mode::SingleOrdered) {
                    if let Some(chord) = self.next_single_chord(rng) {
                        events.extend(self.spawn_at_auto_instance(slot as u32, chord, now));
                    }
                } else {
                    slots_needing_chord.push(slot as u32);
                }
            }
        }

        (events, slots_needing_chord)
    }

    pub fn all_gone(&self) -> bool {
        self.slots.iter().all(|m| matches!(m, None | Some(Monster { state: MonsterState::Gone, .. })))
    }

    pub fn enemy_count_met(&self) -> bool {
        self.enemy_count > 0 && self.defeated_count >= self.enemy_count
    }
}
