//! Top-level orchestrator: owns `RunState`, drives `tick`, binds
//! Clock → NoteGenerator → JudgeEngine → MonsterScheduler, emits
//! `EventOut` (spec §4.6).

use std::collections::{HashMap, HashSet};

use rand_chacha::ChaCha8Rng;

use crate::chord::{lookup, PitchClassSet};
use crate::clock::{validate_transport_seconds, Clock, MusicTime};
use crate::error::{RunError, StartError};
use crate::events::{Event, EventSink, MonsterView, NoteId};
use crate::input_bus::{InputBus, InputEvent, InputProducer};
use crate::judge::{self, JudgeEngine, MonsterId};
use crate::monster::MonsterScheduler;
use crate::note_generator::{self, TimedNote};
use crate::rng::seeded_rng;
use crate::run_state::{Outcome, RunState};
use crate::stage::{Mode, StageConfig};
use crate::transport::Transport;
use crate::transpose;

/// How long a `Paused` run (from `TransportLost`) waits for `resume()`
/// before the run is aborted (spec §7 "Mid-run fatal conditions").
const TRANSPORT_LOST_ABORT_SECONDS: f64 = 5.0;
/// A press completing a not-yet-due note this far ahead of its window
/// is accepted early and marked pre-completed (spec §4.4(6)).
const PRE_HIT_WINDOW_SECONDS: f64 = 0.080;
/// How far ahead of `hitTime` a `NoteDueSoon` look-ahead event fires.
const LOOK_AHEAD_SECONDS: f64 = 2.0;

pub struct RhythmCore<T: Transport> {
    stage: StageConfig,
    clock: Clock,
    transport: T,
    rng: ChaCha8Rng,
    judge: JudgeEngine,
    scheduler: MonsterScheduler,
    state: RunState,
    input_bus: InputBus,

    last_transport_seconds: Option<f64>,
    last_music_seconds: Option<f64>,
    paused: bool,
    paused_elapsed: f64,

    pre_hit_accum: HashMap<NoteId, PitchClassSet>,
    pre_completed: HashSet<NoteId>,
    due_soon_announced: HashSet<NoteId>,

    ordered_progression_cursor: usize,
    random_progression_last: Option<usize>,
    specials_allowed: bool,
    pending_initial_events: Vec<Event>,
    metrics: RunMetrics,
    clock_ready_logged: bool,
}

/// Read-only diagnostics counters, not consulted by judgement (spec
/// §3 "ambient, not in spec.md").
#[derive(Debug, Clone, Copy, Default)]
pub struct RunMetrics {
    pub ticks_processed: u64,
    pub inputs_dropped: u64,
    pub notes_missed: u64,
    pub transpose_out_of_range_count: u64,
}

impl<T: Transport> RhythmCore<T> {
    /// Validates `stage`, builds the engine, and spawns initial
    /// monster(s). Fatal per §7: `ConfigInvalid`/`ChordUnknown`
    /// prevent the run from starting.
    pub fn start(stage: StageConfig, transport: T, seed: u64) -> Result<(Self, InputProducer), StartError> {
        stage.validate()?;

        let clock = Clock::new(&stage);
        let rng = seeded_rng(seed);
        let scheduler = MonsterScheduler::new(&stage);
        let state = RunState::new(&stage);
        let (input_bus, producer) = InputBus::new();

        let mut core = RhythmCore {
            stage,
            clock,
            transport,
            rng,
            judge: JudgeEngine::new(),
            scheduler,
            state,
            input_bus,
            last_transport_seconds: None,
            last_music_seconds: None,
            paused: false,
            paused_elapsed: 0.0,
            pre_hit_accum: HashMap::new(),
            pre_completed: HashSet::new(),
            due_soon_announced: HashSet::new(),
            ordered_progression_cursor: 0,
            random_progression_last: None,
            specials_allowed: true,
            pending_initial_events: Vec::new(),
            metrics: RunMetrics::default(),
            clock_ready_logged: false,
        };

        let initial_offset = core.transpose_offset_for(0);
        core.state.current_transpose_offset = initial_offset;
        core.state.notes_for_current_loop = note_generator::generate(&core.stage, initial_offset, &mut core.rng);
        core.spawn_initial_monsters();

        log::info!("rhythm_core: run started, mode={:?} seed={seed}", core.stage.mode);
        Ok((core, producer))
    }

    pub fn metrics(&self) -> RunMetrics {
        self.metrics
    }

    /// Direct access to the host-owned transport, for hosts (e.g. the
    /// demo binary) that need to drive a test double themselves.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Populates monster slots for a fresh run (or a fresh loop cycle
    /// where slots reset). Timing modes leave slots empty; the boss
    /// slot is filled lazily the first time a due note is hit.
    fn spawn_initial_monsters(&mut self) {
        let events = if self.stage.mode.is_timing() {
            Vec::new()
        } else if self.stage.mode.is_progression() {
            let mut events = Vec::new();
            for slot in 0..self.slot_count() {
                if let Some((chord, instance_id)) = self.next_progression_chord() {
                    events.extend(self.scheduler.assign_target(slot, chord, instance_id, 0.0));
                }
            }
            events
        } else {
            self.scheduler.spawn_initial(&mut self.rng, 0.0)
        };
        self.sync_expectations_from_events(&events);
        self.pending_initial_events.extend(events);
    }

    fn slot_count(&self) -> u32 {
        self.stage.simultaneous_monster_count
    }

    /// Mirrors a monster's current target into `JudgeEngine` so the
    /// next press against it is matched correctly. Idempotent.
    fn sync_expectation(&mut self, monster_id: MonsterId) {
        if let Some(monster) = self.scheduler.monster(monster_id) {
            let target = monster.chord_target.target_set;
            let name = monster.chord_target.display_name.clone();
            self.judge.set_expectation(monster_id, target, name);
        }
    }

    fn sync_expectations_from_events(&mut self, events: &[Event]) {
        let ids: Vec<MonsterId> = events
            .iter()
            .filter_map(|e| match e {
                Event::MonsterSpawned { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        for id in ids {
            self.sync_expectation(id);
        }
    }

    fn transpose_offset_for(&self, loop_cycle: u64) -> i32 {
        match &self.stage.transpose {
            Some(settings) => transpose::offset(loop_cycle, settings),
            None => 0,
        }
    }

    /// Idempotent: a second call after the run has already ended is a no-op.
    pub fn stop(&mut self, sink: &mut impl EventSink) {
        if self.state.active {
            self.state.active = false;
            self.state.finished = Some(Outcome::Aborted);
            sink.emit(Event::RunEnded { outcome: Outcome::Aborted });
        }
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.paused_elapsed = 0.0;
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished.is_some()
    }

    pub fn input_bus_overflow_count(&self) -> u64 {
        self.input_bus.overflow_count()
    }

    /// Advances the run by `dt_seconds`. A no-op once finished, while
    /// paused awaiting `resume()` (past the abort timeout the run ends
    /// with `Outcome::Aborted` instead), or before the transport
    /// reports a confirmed start instant (`ClockNotReady`).
    pub fn tick(&mut self, dt_seconds: f64, sink: &mut impl EventSink) {
        if !self.state.active {
            return;
        }

        if self.paused {
            self.paused_elapsed += dt_seconds;
            if self.paused_elapsed > TRANSPORT_LOST_ABORT_SECONDS {
                self.state.active = false;
                self.state.finished = Some(Outcome::Aborted);
                sink.emit(Event::RunEnded { outcome: Outcome::Aborted });
            }
            return;
        }

        let Some(raw_position) = self.transport.position_seconds() else {
            if self.clock_ready_logged {
                log::debug!("rhythm_core: transport not ready, tick is a no-op");
                self.clock_ready_logged = false;
            }
            return;
        };
        let Ok(position) = validate_transport_seconds(raw_position) else { return };

        if !self.clock_ready_logged {
            log::debug!("rhythm_core: transport ready at {position:.3}s");
            self.clock_ready_logged = true;
        }

        self.metrics.ticks_processed += 1;

        if let Some(last) = self.last_transport_seconds {
            let delta = position - last;
            let bound = self.clock.loop_duration() + 0.200;
            if delta.abs() > bound {
                self.last_transport_seconds = Some(position);
                self.paused = true;
                self.paused_elapsed = 0.0;
                let reason = format!("position jumped by {delta:.3}s, exceeding {bound:.3}s bound");
                log::warn!("rhythm_core: {reason}, pausing run");
                sink.emit(Event::RunPaused { reason: reason.clone() });
                sink.emit(RunError::TransportLost { reason }.into());
                return;
            }
        }
        self.last_transport_seconds = Some(position);

        if !self.pending_initial_events.is_empty() {
            let events = std::mem::take(&mut self.pending_initial_events);
            for e in events {
                sink.emit(e);
            }
        }

        // Step 1: one stable snapshot for the whole tick.
        let now = self.clock.at(position);

        if let Some(time_limit) = self.stage.time_limit_seconds {
            if now.music_seconds >= time_limit {
                self.end_run(Outcome::Aborted, sink);
                return;
            }
        }

        // Step 2: loop-boundary detection and regeneration. Two
        // independent signals per §4.3, since §4.2 lets a Transport's
        // `position_seconds()` jump backward exactly at a loop
        // boundary: (a) `Clock::at`'s own `loop_cycle` advanced, which
        // covers a monotonically-accumulating Transport, or (b) a
        // large negative jump in `music_seconds` between consecutive
        // ticks (a wrapping Transport, whose recomputed `loop_cycle`
        // resets to the same value it started at and so never trips
        // signal (a)), or (c) every note in the loop has already been
        // consumed and we're sitting within one beat of `loopDuration`.
        let loop_duration = self.clock.loop_duration();
        let wrapped = !now.is_count_in()
            && self
                .last_music_seconds
                .is_some_and(|last| now.music_seconds - last < -(loop_duration * 0.5));
        let notes_exhausted = !now.is_count_in()
            && self.stage.mode.is_timing()
            && self.state.current_note_index >= self.state.notes_for_current_loop.len()
            && (loop_duration - now.loop_position_seconds).abs() <= self.stage.sec_per_beat();

        if !now.is_count_in() && now.loop_cycle > self.state.current_loop_cycle {
            self.cross_loop_boundary(now.loop_cycle, sink);
        } else if wrapped || notes_exhausted {
            self.cross_loop_boundary(self.state.current_loop_cycle + 1, sink);
        } else if self.state.awaiting_loop_start && !now.is_count_in() {
            self.state.awaiting_loop_start = false;
        }

        self.last_music_seconds = Some(now.music_seconds);

        if matches!(self.stage.mode, Mode::TimingCombined) && !now.is_count_in() {
            self.state.current_section_index = self.combined_section_at(now.loop_position_seconds);
        }

        if self.state.awaiting_loop_start {
            return;
        }

        // Step 3: monster gauges / state machines.
        let (monster_events, slots_needing_chord) =
            self.scheduler.tick(dt_seconds, now.music_seconds, &mut self.rng);
        self.sync_expectations_from_events(&monster_events);
        for event in monster_events {
            if let Event::MonsterAttacked { damage, .. } = event {
                self.state.player.hp = self.state.player.hp.saturating_sub(damage);
                sink.emit(event);
                sink.emit(Event::PlayerHpChanged { hp: self.state.player.hp });
            } else {
                sink.emit(event);
            }
        }
        for slot in slots_needing_chord {
            if let Some((chord, instance_id)) = self.next_progression_chord() {
                let events = self.scheduler.assign_target(slot, chord, instance_id, now.music_seconds);
                self.sync_expectations_from_events(&events);
                let monster_id = self.scheduler.monsters().find(|m| m.slot == slot).map(|m| m.id);
                if let Some(monster_id) = monster_id {
                    self.sync_expectation(monster_id);
                }
                for e in events {
                    sink.emit(e);
                }
            }
        }

        if self.state.player.hp == 0 {
            self.end_run(Outcome::GameOver, sink);
            return;
        }

        // Step 4: sweep timing-mode due notes and advance the cursor
        // past anything expired *before* matching this tick's presses,
        // so a press is always judged against whichever note is
        // actually current.
        if self.stage.mode.is_timing() {
            self.sweep_due_notes(now.loop_position_seconds, sink);
            self.announce_due_soon(now.loop_position_seconds, sink);
        }

        // Step 5: drain InputBus, route through JudgeEngine.
        let (events, overflow) = self.input_bus.drain_ordered();
        if let Some(err) = overflow {
            self.metrics.inputs_dropped += 1;
            log::warn!("rhythm_core: {err}");
            sink.emit(err.into());
        }
        for input in events {
            if let InputEvent::PitchDown { midi, .. } = input {
                self.handle_pitch_down(midi % 12, now.music_seconds, now.loop_position_seconds, sink);
            }
        }

        if self.state.player.hp == 0 {
            self.end_run(Outcome::GameOver, sink);
            return;
        }

        // Step 6: ambient sp-change notice.
        sink.emit(Event::SpChanged { sp: self.state.player.sp });

        // Step 7: consolidated frame state for the presentation layer.
        sink.emit(self.frame_state(&now));

        self.check_run_end(sink);
    }

    fn cross_loop_boundary(&mut self, new_cycle: u64, sink: &mut impl EventSink) {
        log::info!("rhythm_core: crossing into loop cycle {new_cycle}");
        self.state.current_loop_cycle = new_cycle;
        self.state.current_transpose_offset = self.transpose_offset_for(new_cycle);
        self.state.notes_for_current_loop =
            note_generator::generate(&self.stage, self.state.current_transpose_offset, &mut self.rng);
        self.state.current_note_index = 0;
        self.state.awaiting_loop_start = false;
        self.pre_hit_accum.clear();
        self.pre_completed.clear();
        self.due_soon_announced.clear();
        sink.emit(Event::LoopBoundaryCrossed {
            new_cycle,
            new_transpose_offset: self.state.current_transpose_offset,
        });
    }

    /// Which `combined_sections` entry is currently playing, derived
    /// from a position within the full concatenated pass. `LoopBoundaryCrossed`
    /// fires once per full pass through every section (see `cross_loop_boundary`);
    /// this index is a read-only diagnostic of which section that pass is
    /// currently in, not a separate boundary of its own.
    fn combined_section_at(&self, loop_position: f64) -> u32 {
        let mut offset = 0.0;
        let sections = &self.stage.combined_sections;
        for (i, section) in sections.iter().enumerate() {
            offset += section.loop_duration();
            if loop_position < offset || i == sections.len() - 1 {
                return i as u32;
            }
        }
        0
    }

    fn window(&self) -> (f64, f64) {
        self.stage.judgement_window()
    }

    /// Builds the consolidated `Event::FrameState` for this tick (spec
    /// §4.6 step 7): `Clock.measure()`/`.beat()` are documented
    /// 1-based, while `MusicTime`'s fields are the raw 0-based floor
    /// division used internally, so the display values are offset by
    /// one here rather than in `Clock`.
    fn frame_state(&self, now: &MusicTime) -> Event {
        let monsters = self
            .scheduler
            .monsters()
            .map(|m| MonsterView {
                id: m.id,
                slot: m.slot,
                hp: m.hp,
                max_hp: m.max_hp,
                gauge: m.gauge,
                target: m.chord_target.clone(),
                accepted_classes: self.judge.accepted_classes(m.id),
            })
            .collect();

        let upcoming_notes = self
            .state
            .notes_for_current_loop
            .iter()
            .filter(|note| {
                let ahead = note.hit_time - now.loop_position_seconds;
                ahead >= 0.0 && ahead <= LOOK_AHEAD_SECONDS
            })
            .cloned()
            .collect();

        Event::FrameState {
            measure: now.measure + 1,
            beat: now.beat + 1,
            monsters,
            upcoming_notes,
            current_transpose_offset: self.state.current_transpose_offset,
        }
    }

    fn active_note_index(&mut self) -> usize {
        let notes = &self.state.notes_for_current_loop;
        let mut idx = self.state.current_note_index;
        while idx < notes.len() && self.pre_completed.contains(&notes[idx].id) {
            idx += 1;
        }
        self.state.current_note_index = idx;
        idx
    }

    fn handle_pitch_down(&mut self, pitch_class: u8, now_music: f64, loop_position: f64, sink: &mut impl EventSink) {
        if self.stage.mode.is_timing() {
            self.handle_timing_press(pitch_class, now_music, loop_position, sink);
        } else {
            self.handle_direct_press(pitch_class, now_music, sink);
        }
    }

    fn handle_direct_press(&mut self, pitch_class: u8, now_music: f64, sink: &mut impl EventSink) {
        let candidates = self.scheduler.active_targets();
        let Some(monster_id) = judge::attribute_monster(pitch_class, candidates) else { return };
        self.complete_against_monster(monster_id, pitch_class, None, now_music, sink);
    }

    fn handle_timing_press(&mut self, pitch_class: u8, now_music: f64, loop_position: f64, sink: &mut impl EventSink) {
        let (window_pre, window_post) = self.window();
        let idx = self.active_note_index();
        let notes = self.state.notes_for_current_loop.clone();

        if idx < notes.len() {
            let note = &notes[idx];
            let delta = note.hit_time - loop_position;
            let in_window = delta <= window_pre && delta >= -window_post;
            if in_window {
                let slot = 0;
                // Only re-arm the judge (which resets accepted classes)
                // when this note isn't already the one in progress, so
                // a chord built up over several presses isn't wiped by
                // re-asserting the same target on every press.
                let needs_sync = match self.scheduler.monsters().find(|m| m.slot == slot) {
                    Some(m) => m.current_instance_id != note.id,
                    None => true,
                };
                let events = self.scheduler.assign_target(slot, note.chord.clone(), note.id, now_music);
                if needs_sync {
                    self.sync_expectations_from_events(&events);
                }
                for e in events {
                    sink.emit(e);
                }
                let monster_id = self.scheduler.monsters().find(|m| m.slot == slot).map(|m| m.id);
                if let Some(monster_id) = monster_id {
                    if needs_sync {
                        self.sync_expectation(monster_id);
                    }
                    let completed =
                        self.complete_against_monster(monster_id, pitch_class, Some(true), now_music, sink);
                    if completed {
                        self.state.current_note_index = idx + 1;
                    }
                }
                return;
            }
        }

        if idx + 1 < notes.len() {
            let next = &notes[idx + 1];
            let delta = next.hit_time - loop_position;
            if delta > window_pre && delta <= window_pre + PRE_HIT_WINDOW_SECONDS {
                let target = next.target_set_for_pitch_class(pitch_class);
                if let Some(full_target) = target {
                    let accum = self.pre_hit_accum.entry(next.id).or_insert(0);
                    *accum |= 1 << (pitch_class % 12);
                    if *accum == full_target {
                        self.pre_completed.insert(next.id);
                        self.pre_hit_accum.remove(&next.id);
                        let (damage, is_special, new_sp) = crate::judge::roll_damage(
                            &mut self.rng,
                            self.stage.damage_range(),
                            self.state.player.sp,
                            self.specials_allowed,
                        );
                        self.state.player.sp = new_sp;
                        let monster_id = self.scheduler.monsters().find(|m| m.slot == 0).map(|m| m.id);
                        if let Some(monster_id) = monster_id {
                            let events = self.scheduler.apply_damage(monster_id, damage);
                            for e in events {
                                sink.emit(e);
                            }
                            sink.emit(Event::NoteHit { id: next.id, monster_id, damage, is_special });
                            self.record_hit(is_special);
                        }
                    }
                }
            }
        }
    }

    /// Updates `PlayerState.score`/`.correctAnswers`/`.totalAnswered`
    /// on a completed chord (spec §3 `PlayerState`), mirroring the
    /// teacher's `apply_judgement` score-tier-on-hit bookkeeping.
    fn record_hit(&mut self, is_special: bool) {
        self.state.player.total_answered += 1;
        self.state.player.correct_answers += 1;
        self.state.player.score += if is_special { 200 } else { 100 };
    }

    /// Counts a missed due-note as an answered-but-incorrect attempt.
    fn record_miss(&mut self) {
        self.state.player.total_answered += 1;
    }

    /// Returns whether the press completed `monster_id`'s chord.
    fn complete_against_monster(
        &mut self,
        monster_id: MonsterId,
        pitch_class: u8,
        timing_window: Option<bool>,
        now_music: f64,
        sink: &mut impl EventSink,
    ) -> bool {
        let (result, new_sp) = self.judge.input_and_roll(
            pitch_class,
            monster_id,
            timing_window,
            &mut self.rng,
            self.stage.damage_range(),
            self.state.player.sp,
            self.specials_allowed,
        );
        if let Some(sp) = new_sp {
            self.state.player.sp = sp;
        }
        let completed = matches!(result, crate::judge::JudgeResult::Complete { .. });
        if let crate::judge::JudgeResult::Complete { damage, is_special } = result {
            let note_id = self.scheduler.monster(monster_id).map(|m| m.current_instance_id).unwrap_or(0);
            let events = self.scheduler.apply_damage(monster_id, damage);
            for e in events {
                sink.emit(e);
            }
            sink.emit(Event::NoteHit { id: note_id, monster_id, damage, is_special });
            self.record_hit(is_special);

            if self.stage.mode.is_progression() && !self.stage.mode.is_timing() {
                if let Some((chord, instance_id)) = self.next_progression_chord() {
                    let slot = self.scheduler.monster(monster_id).map(|m| m.slot).unwrap_or(0);
                    let events = self.scheduler.assign_target(slot, chord, instance_id, now_music);
                    self.sync_expectations_from_events(&events);
                    let reassigned_id = self.scheduler.monsters().find(|m| m.slot == slot).map(|m| m.id);
                    if let Some(reassigned_id) = reassigned_id {
                        self.sync_expectation(reassigned_id);
                    }
                    for e in events {
                        sink.emit(e);
                    }
                }
            }
        }
        completed
    }

    /// `ProgressionOrdered` cycles `chord_progression` when present;
    /// a stage that only sets `allowed_chords` (no bar/beat placement
    /// needed outside timing modes) cycles that list instead, the
    /// same way `SingleOrdered` does.
    fn ordered_progression_ids(&self) -> Vec<String> {
        let steps = self.stage.progression_steps();
        if !steps.is_empty() {
            steps.into_iter().map(|s| s.chord_id).collect()
        } else {
            self.stage.allowed_chords.clone()
        }
    }

    fn next_progression_chord(&mut self) -> Option<(crate::chord::ChordDefinition, NoteId)> {
        let chord = match self.stage.mode {
            Mode::ProgressionOrdered => {
                let ids = self.ordered_progression_ids();
                if ids.is_empty() {
                    return None;
                }
                let id = &ids[self.ordered_progression_cursor % ids.len()];
                self.ordered_progression_cursor += 1;
                lookup(id)
            }
            Mode::ProgressionRandom => {
                if self.stage.allowed_chords.is_empty() {
                    return None;
                }
                let idx = loop {
                    let idx = rand::Rng::gen_range(&mut self.rng, 0..self.stage.allowed_chords.len());
                    if self.stage.allowed_chords.len() == 1 || Some(idx) != self.random_progression_last {
                        break idx;
                    }
                };
                self.random_progression_last = Some(idx);
                lookup(&self.stage.allowed_chords[idx])
            }
            _ => None,
        }?;
        let instance_id = self.scheduler.alloc_public_instance_id();
        Some((chord, instance_id))
    }

    fn sweep_due_notes(&mut self, loop_position: f64, sink: &mut impl EventSink) {
        let (_, window_post) = self.window();
        loop {
            let idx = self.active_note_index();
            let Some(note) = self.state.notes_for_current_loop.get(idx) else { break };
            if note.hit_time + window_post < loop_position {
                self.metrics.notes_missed += 1;
                sink.emit(Event::NoteMissed { id: note.id });
                self.record_miss();
                self.state.current_note_index = idx + 1;
            } else {
                break;
            }
        }
    }

    fn announce_due_soon(&mut self, loop_position: f64, sink: &mut impl EventSink) {
        for note in &self.state.notes_for_current_loop {
            if self.due_soon_announced.contains(&note.id) {
                continue;
            }
            let ahead = note.hit_time - loop_position;
            if ahead > 0.0 && ahead <= LOOK_AHEAD_SECONDS {
                sink.emit(Event::NoteDueSoon { id: note.id, chord: note.chord.clone(), seconds_ahead: ahead });
                self.due_soon_announced.insert(note.id);
            }
        }
    }

    fn end_run(&mut self, outcome: Outcome, sink: &mut impl EventSink) {
        if self.state.finished.is_some() {
            return;
        }
        self.state.active = false;
        self.state.finished = Some(outcome);
        log::info!("rhythm_core: run ended with outcome {outcome:?}");
        sink.emit(Event::RunEnded { outcome });
    }

    fn check_run_end(&mut self, sink: &mut impl EventSink) {
        if self.state.finished.is_some() {
            return;
        }
        let clear = match self.stage.mode {
            Mode::Single | Mode::SingleOrdered | Mode::ProgressionRandom => self.scheduler.enemy_count_met(),
            Mode::ProgressionOrdered | Mode::ProgressionTiming | Mode::TimingCombined => {
                self.scheduler.all_gone() && self.next_progression_preview_exhausted()
            }
        };
        if clear {
            self.end_run(Outcome::Clear, sink);
        }
    }

    fn next_progression_preview_exhausted(&self) -> bool {
        match self.stage.mode {
            Mode::ProgressionOrdered => {
                let ids = self.ordered_progression_ids();
                !ids.is_empty() && self.ordered_progression_cursor >= ids.len()
            }
            Mode::ProgressionTiming | Mode::TimingCombined => {
                self.state.current_note_index >= self.state.notes_for_current_loop.len()
            }
            _ => false,
        }
    }
}

impl TimedNote {
    fn target_set_for_pitch_class(&self, pitch_class: u8) -> Option<PitchClassSet> {
        if crate::chord::pitch_class_set_contains(self.chord.target_set, pitch_class) {
            Some(self.chord.target_set)
        } else {
            None
        }
    }
}
