//! Derives musical time (loop cycle, measure, beat) from an external
//! [`crate::transport::Transport`] position, per spec §4.2.

use crate::error::RunError;
use crate::stage::{Mode, StageConfig};

/// A stable, per-tick snapshot of musical time. Computed once per
/// `tick()` from the transport's reported position so that every
/// component consulted during that tick agrees on "now".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicTime {
    /// Seconds since the transport started, including count-in.
    pub transport_seconds: f64,
    /// Seconds since count-in ended; negative during count-in.
    pub music_seconds: f64,
    pub loop_cycle: u64,
    /// Seconds elapsed within the current loop, `[0, loop_duration)`.
    pub loop_position_seconds: f64,
    pub measure: u32,
    pub beat: u32,
    /// Fractional position within the current beat, `[0, 1)`.
    pub beat_fraction: f64,
}

impl MusicTime {
    pub fn is_count_in(&self) -> bool {
        self.music_seconds < 0.0
    }
}

/// Wraps a stage's tempo/meter and turns raw transport seconds into
/// [`MusicTime`]. Stateless aside from the stage it was built for;
/// callers hold one `Clock` per run.
#[derive(Debug, Clone)]
pub struct Clock {
    sec_per_beat: f64,
    beats_per_measure: u32,
    count_in_seconds: f64,
    loop_duration: f64,
}

impl Clock {
    pub fn new(stage: &StageConfig) -> Self {
        let loop_duration = if matches!(stage.mode, Mode::TimingCombined) {
            stage.combined_sections.iter().map(StageConfig::loop_duration).sum()
        } else {
            stage.loop_duration()
        };
        Clock {
            sec_per_beat: stage.sec_per_beat(),
            beats_per_measure: stage.time_signature,
            count_in_seconds: stage.count_in_seconds(),
            loop_duration,
        }
    }

    /// Computes a [`MusicTime`] for a raw transport position. Returns
    /// `RunError::TransportLost` semantics are the caller's concern
    /// (the transport reports failure separately); this function is
    /// pure arithmetic over an already-valid position.
    pub fn at(&self, transport_seconds: f64) -> MusicTime {
        let music_seconds = transport_seconds - self.count_in_seconds;

        if music_seconds < 0.0 {
            return MusicTime {
                transport_seconds,
                music_seconds,
                loop_cycle: 0,
                loop_position_seconds: music_seconds,
                measure: 0,
                beat: 0,
                beat_fraction: 0.0,
            };
        }

        let loop_cycle = if self.loop_duration > 0.0 {
            (music_seconds / self.loop_duration).floor() as u64
        } else {
            0
        };
        let loop_position_seconds = if self.loop_duration > 0.0 {
            music_seconds - loop_cycle as f64 * self.loop_duration
        } else {
            music_seconds
        };

        let total_beats = loop_position_seconds / self.sec_per_beat;
        let measure = (total_beats / self.beats_per_measure as f64).floor() as u32;
        let beat_in_measure = total_beats - (measure * self.beats_per_measure) as f64;
        let beat = beat_in_measure.floor() as u32;
        let beat_fraction = beat_in_measure - beat as f64;

        MusicTime {
            transport_seconds,
            music_seconds,
            loop_cycle,
            loop_position_seconds,
            measure,
            beat,
            beat_fraction,
        }
    }

    pub fn loop_duration(&self) -> f64 {
        self.loop_duration
    }
}

/// Validates a transport-reported position before it is used to derive
/// a [`MusicTime`]; transports that report NaN/negative-before-start
/// values map to a recoverable run error rather than propagating NaN
/// through judgement math.
pub fn validate_transport_seconds(seconds: f64) -> Result<f64, RunError> {
    if seconds.is_finite() {
        Ok(seconds)
    } else {
        Err(RunError::TransportLost { reason: "transport reported a non-finite position".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Mode;

    fn stage(bpm: f64, time_signature: u32, measure_count: u32, count_in_measures: u32) -> StageConfig {
        StageConfig {
            mode: Mode::Single,
            bpm,
            time_signature,
            measure_count,
            count_in_measures,
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
    fn count_in_is_negative_music_time() {
        let stage = stage(120.0, 4, 4, 1);
        let clock = Clock::new(&stage);
        let t = clock.at(1.0);
        assert!(t.is_count_in());
        assert!(t.music_seconds < 0.0);
    }

    #[test]
    fn first_beat_of_first_measure_after_count_in() {
        let stage = stage(120.0, 4, 4, 1);
        let clock = Clock::new(&stage);
        let count_in = stage.count_in_seconds();
        let t = clock.at(count_in);
        assert_eq!(t.loop_cycle, 0);
        assert_eq!(t.measure, 0);
        assert_eq!(t.beat, 0);
    }

    #[test]
    fn loop_cycle_advances_after_full_loop() {
        let stage = stage(120.0, 4, 2, 0);
        let clock = Clock::new(&stage);
        let loop_dur = clock.loop_duration();
        assert_eq!(loop_dur, 4.0);
        let t = clock.at(loop_dur + 0.1);
        assert_eq!(t.loop_cycle, 1);
    }

    #[test]
    fn beat_and_measure_advance_with_time() {
        let stage = stage(120.0, 4, 4, 0);
        let clock = Clock::new(&stage);
        let sec_per_beat = stage.sec_per_beat();
        let t = clock.at(sec_per_beat * 5.0);
        assert_eq!(t.measure, 1);
        assert_eq!(t.beat, 1);
    }

    #[test]
    fn non_finite_position_is_rejected() {
        assert!(validate_transport_seconds(f64::NAN).is_err());
        assert!(validate_transport_seconds(f64::INFINITY).is_err());
        assert!(validate_transport_seconds(1.5).is_ok());
    }
}
