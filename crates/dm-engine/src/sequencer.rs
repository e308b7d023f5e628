//! 16-step pattern sequencer.
//!
//! The sequencer is polled: [`Sequencer::update`] checks its clock and, once a
//! step interval has elapsed, reports the step and its triggers to a
//! [`SequencerListener`]. It never touches audio directly.

use arrayvec::ArrayVec;
use dm_ir::{
    Cell, PatternBank, DEFAULT_VELOCITY, LOOP_VELOCITY, MAX_PATTERNS, MAX_TRACKS,
    STEPS_PER_PATTERN,
};

use crate::clock::Clock;

pub const MIN_TEMPO: f32 = 40.0;
pub const MAX_TEMPO: f32 = 300.0;
pub const DEFAULT_TEMPO: f32 = 120.0;

/// Receives step notifications from [`Sequencer::update`].
pub trait SequencerListener {
    /// A track fires on the current step.
    fn on_step_triggered(&mut self, track: u8, velocity: u8, track_volume: u8);

    /// The step about to be played; sent before any of its triggers.
    fn on_step_advanced(&mut self, _step: u8) {}
}

/// One resolved trigger of a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepTrigger {
    pub track: u8,
    pub velocity: u8,
    pub track_volume: u8,
    /// Fired by a track loop rather than a pattern cell.
    pub from_loop: bool,
}

/// Pattern-independent per-track state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TrackState {
    muted: bool,
    /// 0-100
    volume: u8,
    loop_active: bool,
    loop_paused: bool,
}

impl TrackState {
    const fn new() -> Self {
        Self {
            muted: false,
            volume: 100,
            loop_active: false,
            loop_paused: false,
        }
    }
}

/// Step interval in microseconds for a tempo in BPM (16th notes).
pub fn step_interval_us(bpm: f32) -> u32 {
    ((60.0 / bpm / 4.0) * 1_000_000.0) as u32
}

/// The step sequencer state machine.
pub struct Sequencer<C: Clock> {
    clock: C,
    patterns: PatternBank,
    tracks: [TrackState; MAX_TRACKS],
    playing: bool,
    current_pattern: usize,
    current_step: usize,
    tempo: f32,
    step_interval_us: u32,
    last_step_us: u64,
}

impl<C: Clock> Sequencer<C> {
    /// A stopped sequencer with empty patterns at 120 BPM.
    pub fn new(clock: C) -> Self {
        Self::with_patterns(clock, PatternBank::new())
    }

    /// A stopped sequencer using the given pattern bank.
    pub fn with_patterns(clock: C, patterns: PatternBank) -> Self {
        Self {
            clock,
            patterns,
            tracks: [TrackState::new(); MAX_TRACKS],
            playing: false,
            current_pattern: 0,
            current_step: 0,
            tempo: DEFAULT_TEMPO,
            step_interval_us: step_interval_us(DEFAULT_TEMPO),
            last_step_us: 0,
        }
    }

    /// A stopped copy of this sequencer's patterns, tempo and track state on another clock.
    pub fn rebind<D: Clock>(&self, clock: D) -> Sequencer<D> {
        Sequencer {
            clock,
            patterns: self.patterns.clone(),
            tracks: self.tracks,
            playing: false,
            current_pattern: self.current_pattern,
            current_step: 0,
            tempo: self.tempo,
            step_interval_us: self.step_interval_us,
            last_step_us: 0,
        }
    }

    // --- Transport ---

    pub fn start(&mut self) {
        self.playing = true;
        self.last_step_us = self.clock.now_micros();
        log::info!("sequencer started");
    }

    /// Stop, keeping the current step and pattern.
    pub fn stop(&mut self) {
        self.playing = false;
        log::info!("sequencer stopped");
    }

    /// Return to step 0 without changing play state.
    pub fn reset(&mut self) {
        self.current_step = 0;
        self.last_step_us = self.clock.now_micros();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Step that the next elapsed interval will play.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // --- Timing ---

    /// Set tempo, clamped to 40-300 BPM. NaN is ignored.
    pub fn set_tempo(&mut self, bpm: f32) {
        if bpm.is_nan() {
            return;
        }
        self.tempo = bpm.clamp(MIN_TEMPO, MAX_TEMPO);
        self.step_interval_us = step_interval_us(self.tempo);
        log::debug!("tempo set to {:.1} BPM", self.tempo);
    }

    pub fn tempo(&self) -> f32 {
        self.tempo
    }

    pub fn step_interval_us(&self) -> u32 {
        self.step_interval_us
    }

    /// Poll the clock; play at most one step.
    ///
    /// Returns true if a step was played. The step index is reported before
    /// the step's triggers so displays stay in sync with sound.
    pub fn update<L: SequencerListener + ?Sized>(&mut self, listener: &mut L) -> bool {
        if !self.playing {
            return false;
        }
        let now = self.clock.now_micros();
        if now.saturating_sub(self.last_step_us) < self.step_interval_us as u64 {
            return false;
        }
        self.last_step_us = now;

        listener.on_step_advanced(self.current_step as u8);
        for trigger in self.resolve_step() {
            listener.on_step_triggered(trigger.track, trigger.velocity, trigger.track_volume);
        }

        self.current_step = (self.current_step + 1) % STEPS_PER_PATTERN;
        true
    }

    /// Triggers for the current step: running loops first, then pattern cells.
    ///
    /// Muted tracks produce nothing; a loop and a cell on the same track both fire.
    pub fn resolve_step(&self) -> ArrayVec<StepTrigger, { MAX_TRACKS * 2 }> {
        let mut triggers = ArrayVec::new();

        for (track, state) in self.tracks.iter().enumerate() {
            if state.loop_active && !state.loop_paused && !state.muted {
                triggers.push(StepTrigger {
                    track: track as u8,
                    velocity: LOOP_VELOCITY,
                    track_volume: state.volume,
                    from_loop: true,
                });
            }
        }

        for (track, state) in self.tracks.iter().enumerate() {
            let cell = self.patterns.get(self.current_pattern, track, self.current_step);
            if cell.active && !state.muted {
                triggers.push(StepTrigger {
                    track: track as u8,
                    velocity: cell.velocity,
                    track_volume: state.volume,
                    from_loop: false,
                });
            }
        }

        triggers
    }

    // --- Pattern editing ---

    /// Set a step in the current pattern.
    pub fn set_step(&mut self, track: usize, step: usize, active: bool, velocity: u8) {
        let cell = Cell { active, velocity: velocity.min(127) };
        self.patterns.set(self.current_pattern, track, step, cell);
    }

    /// Whether a step of the current pattern is active.
    pub fn step(&self, track: usize, step: usize) -> bool {
        self.pattern_step(self.current_pattern, track, step)
    }

    /// Whether a step of any pattern is active.
    pub fn pattern_step(&self, pattern: usize, track: usize, step: usize) -> bool {
        self.patterns.get(pattern, track, step).active
    }

    pub fn set_step_velocity(&mut self, track: usize, step: usize, velocity: u8) {
        self.set_pattern_step_velocity(self.current_pattern, track, step, velocity);
    }

    pub fn set_pattern_step_velocity(&mut self, pattern: usize, track: usize, step: usize, velocity: u8) {
        if let Some(cell) = self.patterns.get_mut(pattern, track, step) {
            cell.velocity = velocity.min(127);
        }
    }

    /// Velocity of a step in the current pattern; 127 for invalid indices.
    pub fn step_velocity(&self, track: usize, step: usize) -> u8 {
        self.pattern_step_velocity(self.current_pattern, track, step)
    }

    pub fn pattern_step_velocity(&self, pattern: usize, track: usize, step: usize) -> u8 {
        if pattern >= MAX_PATTERNS {
            return DEFAULT_VELOCITY;
        }
        self.patterns.get(pattern, track, step).velocity
    }

    pub fn clear_pattern(&mut self, pattern: usize) {
        if pattern < MAX_PATTERNS {
            self.patterns.clear_pattern(pattern);
            log::debug!("pattern {} cleared", pattern);
        }
    }

    pub fn clear_current_pattern(&mut self) {
        self.clear_pattern(self.current_pattern);
    }

    /// Deactivate every step of a track in the current pattern.
    pub fn clear_track(&mut self, track: usize) {
        if track < MAX_TRACKS {
            self.patterns.clear_track(self.current_pattern, track);
            log::debug!("track {} cleared", track);
        }
    }

    pub fn select_pattern(&mut self, pattern: usize) {
        if pattern < MAX_PATTERNS {
            self.current_pattern = pattern;
            log::debug!("pattern {} selected", pattern);
        }
    }

    pub fn current_pattern(&self) -> usize {
        self.current_pattern
    }

    pub fn copy_pattern(&mut self, src: usize, dst: usize) {
        if src < MAX_PATTERNS && dst < MAX_PATTERNS {
            self.patterns.copy_pattern(src, dst);
            log::debug!("pattern {} copied to {}", src, dst);
        }
    }

    pub fn patterns(&self) -> &PatternBank {
        &self.patterns
    }

    /// Replace the whole pattern bank.
    pub fn load_patterns(&mut self, patterns: PatternBank) {
        self.patterns = patterns;
    }

    // --- Tracks ---

    pub fn mute_track(&mut self, track: usize, muted: bool) {
        if let Some(state) = self.tracks.get_mut(track) {
            state.muted = muted;
            log::debug!("track {} {}", track, if muted { "muted" } else { "unmuted" });
        }
    }

    pub fn is_track_muted(&self, track: usize) -> bool {
        self.tracks.get(track).is_some_and(|s| s.muted)
    }

    /// Set track volume, clamped to 0-100.
    pub fn set_track_volume(&mut self, track: usize, volume: u8) {
        if let Some(state) = self.tracks.get_mut(track) {
            state.volume = volume.min(100);
        }
    }

    /// Track volume; 100 for invalid tracks.
    pub fn track_volume(&self, track: usize) -> u8 {
        self.tracks.get(track).map(|s| s.volume).unwrap_or(100)
    }

    // --- Loops ---

    /// Flip a track's loop on or off; always clears the pause flag.
    pub fn toggle_loop(&mut self, track: usize) {
        if let Some(state) = self.tracks.get_mut(track) {
            state.loop_active = !state.loop_active;
            state.loop_paused = false;
            log::debug!(
                "loop on track {} {}",
                track,
                if state.loop_active { "active" } else { "inactive" }
            );
        }
    }

    /// Pause or resume a running loop. No-op if the loop is inactive.
    pub fn pause_loop(&mut self, track: usize) {
        if let Some(state) = self.tracks.get_mut(track) {
            if state.loop_active {
                state.loop_paused = !state.loop_paused;
                log::debug!(
                    "loop on track {} {}",
                    track,
                    if state.loop_paused { "paused" } else { "resumed" }
                );
            }
        }
    }

    pub fn is_looping(&self, track: usize) -> bool {
        self.tracks.get(track).is_some_and(|s| s.loop_active)
    }

    pub fn is_loop_paused(&self, track: usize) -> bool {
        self.tracks.get(track).is_some_and(|s| s.loop_paused)
    }
}
