//! Second-order IIR sections for the ten filter types.
//!
//! Coefficients follow the RBJ audio-EQ cookbook. They are derived once per
//! parameter change; [`FilterState::process`] is the only per-sample work.

use core::f32::consts::PI;

use dm_ir::FilterType;

/// Lowest cutoff accepted by [`BiquadCoeffs::design`].
pub const MIN_CUTOFF_HZ: f32 = 10.0;

/// Highest cutoff as a fraction of the sample rate (just under Nyquist).
pub const MAX_CUTOFF_RATIO: f32 = 0.49;

pub const MIN_Q: f32 = 0.1;
pub const MAX_Q: f32 = 40.0;

/// Shelf / peaking gain limit in dB.
pub const MAX_GAIN_DB: f32 = 24.0;

/// Biquad coefficients with `a0` normalized to 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::identity()
    }
}

impl BiquadCoeffs {
    /// Pass-through section.
    pub const fn identity() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }

    /// Derive coefficients for `kind` at the given cutoff (Hz), Q and gain (dB).
    ///
    /// Cutoff is clamped into `[MIN_CUTOFF_HZ, 0.49 * sample_rate]`, Q into
    /// `[MIN_Q, MAX_Q]` and gain into `±MAX_GAIN_DB`, so the result is always a
    /// stable section.
    pub fn design(kind: FilterType, cutoff: f32, resonance: f32, gain_db: f32, sample_rate: u32) -> Self {
        if kind == FilterType::None || sample_rate == 0 {
            return Self::identity();
        }

        let fs = sample_rate as f32;
        let cutoff = clamp_cutoff(cutoff, sample_rate);
        let mut q = clamp_q(resonance);
        if kind == FilterType::Resonant {
            q = (q * 4.0).clamp(2.0, MAX_Q);
        }
        let gain_db = if gain_db.is_finite() {
            gain_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB)
        } else {
            0.0
        };

        let w0 = 2.0 * PI * cutoff / fs;
        let cos_w = libm::cosf(w0);
        let sin_w = libm::sinf(w0);
        let alpha = sin_w / (2.0 * q);
        let a = libm::powf(10.0, gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterType::LowPass | FilterType::Resonant => {
                let b = (1.0 - cos_w) / 2.0;
                (b, 1.0 - cos_w, b, 1.0 + alpha, -2.0 * cos_w, 1.0 - alpha)
            }
            FilterType::HighPass => {
                let b = (1.0 + cos_w) / 2.0;
                (b, -(1.0 + cos_w), b, 1.0 + alpha, -2.0 * cos_w, 1.0 - alpha)
            }
            FilterType::BandPass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w, 1.0 - alpha),
            FilterType::Notch => (1.0, -2.0 * cos_w, 1.0, 1.0 + alpha, -2.0 * cos_w, 1.0 - alpha),
            FilterType::AllPass => (
                1.0 - alpha,
                -2.0 * cos_w,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cos_w,
                1.0 - alpha,
            ),
            FilterType::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_w,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let k = 2.0 * libm::sqrtf(a) * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w),
                    a * ((a + 1.0) - (a - 1.0) * cos_w - k),
                    (a + 1.0) + (a - 1.0) * cos_w + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w),
                    (a + 1.0) + (a - 1.0) * cos_w - k,
                )
            }
            FilterType::HighShelf => {
                let k = 2.0 * libm::sqrtf(a) * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w + k),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w),
                    a * ((a + 1.0) + (a - 1.0) * cos_w - k),
                    (a + 1.0) - (a - 1.0) * cos_w + k,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w),
                    (a + 1.0) - (a - 1.0) * cos_w - k,
                )
            }
            FilterType::None => return Self::identity(),
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Clamp a cutoff frequency into the stable design range.
pub fn clamp_cutoff(cutoff: f32, sample_rate: u32) -> f32 {
    let max = (sample_rate as f32 * MAX_CUTOFF_RATIO).max(MIN_CUTOFF_HZ);
    if !cutoff.is_finite() {
        return max;
    }
    cutoff.clamp(MIN_CUTOFF_HZ, max)
}

/// Clamp a resonance / Q value.
pub fn clamp_q(q: f32) -> f32 {
    if !q.is_finite() {
        return MIN_Q;
    }
    q.clamp(MIN_Q, MAX_Q)
}

/// Two samples of input and output history.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterState {
    pub x1: f32,
    pub x2: f32,
    pub y1: f32,
    pub y2: f32,
}

impl FilterState {
    pub const fn new() -> Self {
        Self { x1: 0.0, x2: 0.0, y1: 0.0, y2: 0.0 }
    }

    /// Run one sample through the section (direct form I).
    #[inline]
    pub fn process(&mut self, c: &BiquadCoeffs, x: f32) -> f32 {
        let mut y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        // flush denormals
        if libm::fabsf(y) < 1.0e-20 {
            y = 0.0;
        }
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dm_ir::SAMPLE_RATE;

    /// Largest pole magnitude of `1 + a1 z^-1 + a2 z^-2`.
    fn max_pole_magnitude(c: &BiquadCoeffs) -> f64 {
        let a1 = c.a1 as f64;
        let a2 = c.a2 as f64;
        let disc = a1 * a1 - 4.0 * a2;
        if disc < 0.0 {
            a2.sqrt()
        } else {
            let r = disc.sqrt();
            ((-a1 + r) / 2.0).abs().max(((-a1 - r) / 2.0).abs())
        }
    }

    fn is_finite(c: &BiquadCoeffs) -> bool {
        [c.b0, c.b1, c.b2, c.a1, c.a2].iter().all(|v| v.is_finite())
    }

    fn run_dc(c: &BiquadCoeffs, level: f32, n: usize) -> f32 {
        let mut state = FilterState::new();
        let mut y = 0.0;
        for _ in 0..n {
            y = state.process(c, level);
        }
        y
    }

    #[test]
    fn coefficients_are_stable_across_sweep() {
        let nyquist = SAMPLE_RATE as f32 / 2.0;
        let cutoffs = [10.0, 20.0, 60.0, 250.0, 1000.0, 4000.0, 10000.0, 18000.0, nyquist - 1.0];
        let qs = [0.1, 0.5, 0.707, 1.0, 2.0, 5.0, 10.0, 20.0];
        let gains = [-12.0, 0.0, 12.0];
        for kind in FilterType::ALL {
            for &cutoff in &cutoffs {
                for &q in &qs {
                    for &gain in &gains {
                        let c = BiquadCoeffs::design(kind, cutoff, q, gain, SAMPLE_RATE);
                        assert!(is_finite(&c), "{:?} {} {} {} not finite", kind, cutoff, q, gain);
                        let p = max_pole_magnitude(&c);
                        assert!(p < 1.0, "{:?} cutoff={} q={} gain={} pole={}", kind, cutoff, q, gain, p);
                    }
                }
            }
        }
    }

    #[test]
    fn cutoff_beyond_nyquist_is_clamped() {
        let over = BiquadCoeffs::design(FilterType::LowPass, 40_000.0, 0.707, 0.0, SAMPLE_RATE);
        let at_max = BiquadCoeffs::design(
            FilterType::LowPass,
            SAMPLE_RATE as f32 * MAX_CUTOFF_RATIO,
            0.707,
            0.0,
            SAMPLE_RATE,
        );
        assert_eq!(over, at_max);
        assert!(is_finite(&BiquadCoeffs::design(FilterType::HighPass, 0.0, 0.707, 0.0, SAMPLE_RATE)));
        assert!(is_finite(&BiquadCoeffs::design(FilterType::HighPass, f32::NAN, f32::NAN, f32::NAN, SAMPLE_RATE)));
    }

    #[test]
    fn tiny_sample_rate_does_not_panic() {
        assert_eq!(clamp_cutoff(1000.0, 16), MIN_CUTOFF_HZ);
        let c = BiquadCoeffs::design(FilterType::LowPass, 1000.0, 0.7, 0.0, 16);
        for v in [c.b0, c.b1, c.b2, c.a1, c.a2] {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn none_is_identity() {
        let c = BiquadCoeffs::design(FilterType::None, 500.0, 3.0, 6.0, SAMPLE_RATE);
        assert_eq!(c, BiquadCoeffs::identity());
        let mut state = FilterState::new();
        assert_eq!(state.process(&c, 0.25), 0.25);
    }

    #[test]
    fn lowpass_passes_dc_highpass_blocks_it() {
        let lp = BiquadCoeffs::design(FilterType::LowPass, 1000.0, 0.707, 0.0, SAMPLE_RATE);
        let hp = BiquadCoeffs::design(FilterType::HighPass, 1000.0, 0.707, 0.0, SAMPLE_RATE);
        assert!((run_dc(&lp, 0.5, 2000) - 0.5).abs() < 1e-3);
        assert!(run_dc(&hp, 0.5, 2000).abs() < 1e-3);
    }

    #[test]
    fn notch_and_allpass_pass_dc() {
        let notch = BiquadCoeffs::design(FilterType::Notch, 1000.0, 2.0, 0.0, SAMPLE_RATE);
        let ap = BiquadCoeffs::design(FilterType::AllPass, 1000.0, 0.707, 0.0, SAMPLE_RATE);
        assert!((run_dc(&notch, 0.5, 4000) - 0.5).abs() < 1e-3);
        assert!((run_dc(&ap, 0.5, 4000) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn low_shelf_boosts_dc_by_gain() {
        let c = BiquadCoeffs::design(FilterType::LowShelf, 200.0, 0.707, 6.0, SAMPLE_RATE);
        let out = run_dc(&c, 0.25, 20_000);
        let expected = 0.25 * libm::powf(10.0, 6.0 / 20.0);
        assert!((out - expected).abs() < 1e-2, "got {}, expected {}", out, expected);
    }

    #[test]
    fn same_state_same_output() {
        let c = BiquadCoeffs::design(FilterType::Resonant, 800.0, 3.0, 0.0, SAMPLE_RATE);
        let mut a = FilterState { x1: 0.1, x2: -0.2, y1: 0.3, y2: 0.05 };
        let mut b = a;
        assert_eq!(a.process(&c, 0.7), b.process(&c, 0.7));
        assert_eq!(a, b);
    }

    #[test]
    fn reset_clears_history() {
        let c = BiquadCoeffs::design(FilterType::LowPass, 800.0, 0.707, 0.0, SAMPLE_RATE);
        let mut state = FilterState::new();
        state.process(&c, 1.0);
        assert_ne!(state, FilterState::new());
        state.reset();
        assert_eq!(state, FilterState::new());
    }
}
