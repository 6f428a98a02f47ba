//! Host-implemented audio backend port. The core never touches an
//! audio backend directly; it only asks a `Transport` for the current
//! playback position and drives playback through this narrow contract
//! (spec §1 Non-goals, §4.2, §6 External Interfaces).

/// Implemented by the host. Method set mirrors a typical streaming
/// audio player: load/play/stop, volume and pitch-shift control, and a
/// monotonic (within a play session) position reader.
pub trait Transport {
    /// Loads the backing track for a section. `pitch_shift_semitones`
    /// is applied immediately; `no_loop_mode` disables the backend's
    /// own looping so `RhythmCore` can detect loop boundaries itself
    /// (§4.3 "the core detects loops from its own computation").
    fn load(
        &mut self,
        url: &str,
        bpm: f64,
        time_signature: u32,
        measure_count: u32,
        count_in_measures: u32,
        volume: f32,
        rate: f64,
        pitch_shift_semitones: i32,
        no_loop_mode: bool,
    ) -> Result<(), String>;

    fn play(&mut self);
    fn stop(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn set_pitch_shift(&mut self, semitones: i32);
    fn seek_to_bar1_start(&mut self);

    /// Current playback position in seconds, or `None` if the
    /// transport has not yet confirmed a start instant (`ClockNotReady`).
    /// Must be monotonic within a play session except across a loop
    /// boundary, where it may jump backward.
    fn position_seconds(&self) -> Option<f64>;

    fn is_running(&self) -> bool;
}

/// A deterministic, host-free stand-in used by tests and the demo
/// binary: position is whatever the caller last set via
/// [`NullTransport::set_position`]; `load`/`play`/etc. only flip
/// bookkeeping flags.
#[derive(Debug, Default)]
pub struct NullTransport {
    position: Option<f64>,
    running: bool,
    loaded: bool,
    volume: f32,
    pitch_shift_semitones: i32,
}

impl NullTransport {
    pub fn new() -> Self {
        NullTransport { position: None, running: false, loaded: false, volume: 1.0, pitch_shift_semitones: 0 }
    }

    pub fn set_position(&mut self, seconds: f64) {
        self.position = Some(seconds);
    }

    /// Advances the reported position by `dt` seconds, starting from
    /// 0.0 if nothing has been reported yet. Lets a caller (e.g. the
    /// demo binary) drive this double like a free-running clock
    /// instead of poking an absolute position every tick.
    pub fn advance(&mut self, dt: f64) {
        self.position = Some(self.position.unwrap_or(0.0) + dt);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pitch_shift_semitones(&self) -> i32 {
        self.pitch_shift_semitones
    }
}

impl Transport for NullTransport {
    fn load(
        &mut self,
        _url: &str,
        _bpm: f64,
        _time_signature: u32,
        _measure_count: u32,
        _count_in_measures: u32,
        volume: f32,
        _rate: f64,
        pitch_shift_semitones: i32,
        _no_loop_mode: bool,
    ) -> Result<(), String> {
        self.loaded = true;
        self.volume = volume;
        self.pitch_shift_semitones = pitch_shift_semitones;
        Ok(())
    }

    fn play(&mut self) {
        self.running = self.loaded;
        if self.position.is_none() {
            self.position = Some(0.0);
        }
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn set_pitch_shift(&mut self, semitones: i32) {
        self.pitch_shift_semitones = semitones;
    }

    fn seek_to_bar1_start(&mut self) {
        self.position = Some(0.0);
    }

    fn position_seconds(&self) -> Option<f64> {
        self.position
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
