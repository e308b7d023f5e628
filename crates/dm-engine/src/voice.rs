//! Voice: one sample-playback slot.

use dm_ir::{SampleView, TriggerSource};

/// Unity pitch as a 16.16 fixed-point increment.
pub const UNITY_INCREMENT: u32 = 1 << 16;

pub const MIN_PITCH: f32 = 0.0625;
pub const MAX_PITCH: f32 = 8.0;

/// Where a voice came from, for stopping and FX routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceOrigin {
    /// Pad index; for sequencer voices this is also the track index.
    pub pad: u8,
    pub source: TriggerSource,
}

/// A single voice reading from borrowed sample data.
#[derive(Clone, Copy, Debug)]
pub struct Voice<'a> {
    /// Sample being played (owned by the caller's sample store).
    pub sample: SampleView<'a>,
    /// Read cursor (48.16 fixed-point, in samples).
    pub position: u64,
    /// Cursor advance per output frame (16.16 fixed-point).
    pub increment: u32,
    /// Is the voice producing audio?
    pub playing: bool,
    /// Velocity (0-127).
    pub velocity: u8,
    /// Volume scale (0-100).
    pub volume: u8,
    pub looping: bool,
    /// Loop bounds in samples, `[loop_start, loop_end)`.
    pub loop_start: u32,
    pub loop_end: u32,
    pub origin: VoiceOrigin,
    /// Allocation order, used to pick a steal victim.
    pub serial: u64,
}

impl<'a> Voice<'a> {
    /// A voice at the start of `sample`, unity pitch, no loop.
    pub fn new(sample: SampleView<'a>, origin: VoiceOrigin, velocity: u8, volume: u8) -> Self {
        Self {
            sample,
            position: 0,
            increment: UNITY_INCREMENT,
            playing: !sample.is_empty(),
            velocity: velocity.min(127),
            volume: volume.min(100),
            looping: false,
            loop_start: 0,
            loop_end: sample.len() as u32,
            origin,
            serial: 0,
        }
    }

    /// Sample length.
    pub fn len(&self) -> usize {
        self.sample.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample.is_empty()
    }

    /// Set the resampling ratio (1.0 = original pitch).
    pub fn set_pitch(&mut self, multiplier: f32) {
        let multiplier = if multiplier.is_finite() {
            multiplier.clamp(MIN_PITCH, MAX_PITCH)
        } else {
            1.0
        };
        self.increment = (multiplier * UNITY_INCREMENT as f32) as u32;
    }

    /// Current pitch multiplier.
    pub fn pitch(&self) -> f32 {
        self.increment as f32 / UNITY_INCREMENT as f32
    }

    /// Enable or disable looping over `[start, end)`.
    ///
    /// `end == 0` means the end of the sample. Bounds are clamped to the
    /// sample; an empty range disables the loop.
    pub fn set_loop(&mut self, enabled: bool, start: u32, end: u32) {
        let len = self.sample.len() as u32;
        let end = if end == 0 { len } else { end.min(len) };
        if !enabled || start >= end {
            self.looping = false;
            self.loop_start = 0;
            self.loop_end = len;
            return;
        }
        self.looping = true;
        self.loop_start = start;
        self.loop_end = end;
    }

    /// Produce one mono sample scaled by velocity and volume, then advance.
    ///
    /// Returns 0 once the voice has stopped.
    #[inline]
    pub fn render(&mut self) -> i32 {
        if !self.playing {
            return 0;
        }
        if (self.position >> 16) >= self.sample.len() as u64 {
            self.playing = false;
            return 0;
        }

        let value = i32::from(if self.looping {
            self.sample
                .get_interpolated_looped(self.position, self.loop_start, self.loop_end)
        } else {
            self.sample.get_interpolated(self.position)
        });
        let out = value * self.velocity as i32 * self.volume as i32 / (127 * 100);

        self.position += self.increment as u64;
        self.advance_loop();
        out
    }

    /// Wrap into the loop range or stop at the end of the sample.
    fn advance_loop(&mut self) {
        let pos_samples = self.position >> 16;
        if self.looping && pos_samples >= self.loop_end as u64 {
            let start = (self.loop_start as u64) << 16;
            let span = ((self.loop_end - self.loop_start) as u64) << 16;
            self.position = start + (self.position - start) % span;
        } else if pos_samples >= self.sample.len() as u64 {
            self.playing = false;
        }
    }
}
