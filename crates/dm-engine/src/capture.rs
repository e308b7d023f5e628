//! Output capture for visualization.
//!
//! The fill path only pushes samples into a fixed history ring. Spectrum and
//! waveform bytes are computed on the reader side.

use core::f32::consts::PI;

use dm_ir::SAMPLE_RATE;
use heapless::HistoryBuffer;

/// Number of most recent output samples kept.
pub const CAPTURE_LEN: usize = 256;

/// Lowest and highest spectrum band centres in Hz.
const LOW_BAND_HZ: f32 = 60.0;
const HIGH_BAND_HZ: f32 = 12_000.0;

/// History of the last [`CAPTURE_LEN`] mono output samples.
pub struct Capture {
    history: HistoryBuffer<i16, CAPTURE_LEN>,
}

impl Default for Capture {
    fn default() -> Self {
        Self::new()
    }
}

impl Capture {
    pub const fn new() -> Self {
        Self {
            history: HistoryBuffer::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, sample: i16) {
        self.history.write(sample);
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.len() == 0
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Oldest-first 8-bit waveform, centred on 128. Unfilled bytes read as 128.
    pub fn waveform(&self, out: &mut [u8]) {
        out.fill(128);
        for (dst, &s) in out.iter_mut().zip(self.history.oldest_ordered()) {
            *dst = ((s >> 8) + 128) as u8;
        }
    }

    /// Magnitude per band, one byte per entry of `out`.
    ///
    /// Band centres are spaced logarithmically between 60 Hz and 12 kHz and
    /// measured with a Goertzel filter over the captured history. 255 is a
    /// full-scale sinusoid.
    pub fn spectrum(&self, out: &mut [u8]) {
        let bands = out.len();
        let n = self.history.len();
        if n == 0 {
            out.fill(0);
            return;
        }
        for (band, dst) in out.iter_mut().enumerate() {
            let freq = band_frequency(band, bands);
            let magnitude = goertzel(self.history.oldest_ordered().copied(), n, freq);
            *dst = (magnitude * 255.0).clamp(0.0, 255.0) as u8;
        }
    }
}

/// Centre frequency of `band` out of `bands`.
pub fn band_frequency(band: usize, bands: usize) -> f32 {
    if bands <= 1 {
        return LOW_BAND_HZ;
    }
    let t = band as f32 / (bands - 1) as f32;
    LOW_BAND_HZ * libm::powf(HIGH_BAND_HZ / LOW_BAND_HZ, t)
}

/// Normalized amplitude (0.0-1.0 for in-range input) at `freq`.
fn goertzel<I: Iterator<Item = i16>>(samples: I, n: usize, freq: f32) -> f32 {
    let coeff = 2.0 * libm::cosf(2.0 * PI * freq / SAMPLE_RATE as f32);
    let (mut s1, mut s2) = (0.0f32, 0.0f32);
    for x in samples {
        let s0 = x as f32 / 32768.0 + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    let power = (s1 * s1 + s2 * s2 - coeff * s1 * s2).max(0.0);
    libm::sqrtf(power) / (n as f32 / 2.0)
}
