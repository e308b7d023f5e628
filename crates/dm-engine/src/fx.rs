//! Effect chain: filter, distortion, bit reduction and sample-rate reduction.
//!
//! One [`FxParams`] describes a complete chain. The engine keeps a global
//! instance and two banks of [`FxSlots`] (per track, per pad), each slot with
//! its own coefficients and history so slots never share state.

use dm_ir::{FilterType, SAMPLE_RATE};

use crate::filter::{clamp_cutoff, clamp_q, BiquadCoeffs, FilterState, MAX_GAIN_DB};

pub const MIN_BIT_DEPTH: u8 = 4;
pub const MAX_BIT_DEPTH: u8 = 16;
pub const MAX_DISTORTION: f32 = 100.0;

/// Quantize to `bit_depth` bits by dropping low-order magnitude bits.
///
/// The sign is kept, so quantization always moves towards zero.
#[inline]
pub fn apply_bit_crush(sample: i16, bit_depth: u8) -> i16 {
    let bits = bit_depth.clamp(MIN_BIT_DEPTH, MAX_BIT_DEPTH);
    if bits >= MAX_BIT_DEPTH {
        return sample;
    }
    let shift = (MAX_BIT_DEPTH - bits) as u32;
    let value = sample as i32;
    let magnitude = (value.abs() >> shift) << shift;
    let crushed = if value < 0 { -magnitude } else { magnitude };
    crushed.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Soft clip with a drive that grows with `amount` (0-100).
///
/// Full scale in maps to full scale out; `amount <= 0` is the identity.
#[inline]
pub fn apply_distortion(sample: i16, amount: f32) -> i16 {
    if amount.is_nan() || amount <= 0.0 {
        return sample;
    }
    let drive = 1.0 + amount.min(MAX_DISTORTION) / 10.0;
    let x = sample as f32 / 32768.0;
    let y = libm::tanhf(drive * x) / libm::tanhf(drive);
    to_i16(y * 32768.0)
}

#[inline]
fn to_i16(value: f32) -> i16 {
    // `as` saturates and maps NaN to 0
    value as i16
}

/// Sample-and-hold decimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateReducer {
    hold: i16,
    counter: u32,
}

impl RateReducer {
    pub const fn new() -> Self {
        Self { hold: 0, counter: 0 }
    }

    /// Hold each admitted sample for `SAMPLE_RATE / target_rate` frames.
    ///
    /// A target of 0 or at/above the system rate bypasses the stage.
    #[inline]
    pub fn process(&mut self, sample: i16, target_rate: u32) -> i16 {
        if target_rate == 0 || target_rate >= SAMPLE_RATE {
            return sample;
        }
        let period = SAMPLE_RATE / target_rate;
        if self.counter == 0 {
            self.hold = sample;
        }
        self.counter += 1;
        if self.counter >= period {
            self.counter = 0;
        }
        self.hold
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// A full effect configuration plus its running state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FxParams {
    filter_type: FilterType,
    cutoff: f32,
    resonance: f32,
    gain: f32,
    bit_depth: u8,
    distortion: f32,
    /// Decimation target in Hz; 0 = off.
    target_rate: u32,
    coeffs: BiquadCoeffs,
    state: FilterState,
    reducer: RateReducer,
}

impl Default for FxParams {
    fn default() -> Self {
        Self::new()
    }
}

impl FxParams {
    /// A chain with every stage bypassed.
    pub const fn new() -> Self {
        Self {
            filter_type: FilterType::None,
            cutoff: 1000.0,
            resonance: 0.707,
            gain: 0.0,
            bit_depth: MAX_BIT_DEPTH,
            distortion: 0.0,
            target_rate: 0,
            coeffs: BiquadCoeffs::identity(),
            state: FilterState::new(),
            reducer: RateReducer::new(),
        }
    }

    /// A filter-only chain.
    pub fn with_filter(kind: FilterType, cutoff: f32, resonance: f32, gain: f32) -> Self {
        let mut fx = Self::new();
        fx.set_filter(kind, cutoff, resonance, gain);
        fx
    }

    /// Set all filter parameters at once and recompute coefficients.
    ///
    /// Filter history is cleared when the type changes.
    pub fn set_filter(&mut self, kind: FilterType, cutoff: f32, resonance: f32, gain: f32) {
        if kind != self.filter_type {
            self.filter_type = kind;
            self.state.reset();
        }
        self.cutoff = clamp_cutoff(cutoff, SAMPLE_RATE);
        self.resonance = clamp_q(resonance);
        self.gain = clamp_gain(gain);
        self.recompute();
    }

    pub fn set_filter_type(&mut self, kind: FilterType) {
        if kind != self.filter_type {
            self.filter_type = kind;
            self.state.reset();
            self.recompute();
        }
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.cutoff = clamp_cutoff(cutoff, SAMPLE_RATE);
        self.recompute();
    }

    pub fn set_resonance(&mut self, resonance: f32) {
        self.resonance = clamp_q(resonance);
        self.recompute();
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = clamp_gain(gain);
        self.recompute();
    }

    pub fn set_bit_depth(&mut self, bits: u8) {
        self.bit_depth = bits.clamp(MIN_BIT_DEPTH, MAX_BIT_DEPTH);
    }

    pub fn set_distortion(&mut self, amount: f32) {
        self.distortion = if amount.is_finite() {
            amount.clamp(0.0, MAX_DISTORTION)
        } else {
            0.0
        };
    }

    /// Set the decimation target; values at or above the system rate disable it.
    pub fn set_sample_rate_reduction(&mut self, rate: u32) {
        self.target_rate = if rate >= SAMPLE_RATE { 0 } else { rate };
        self.reducer.reset();
    }

    fn recompute(&mut self) {
        self.coeffs =
            BiquadCoeffs::design(self.filter_type, self.cutoff, self.resonance, self.gain, SAMPLE_RATE);
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    pub fn distortion(&self) -> f32 {
        self.distortion
    }

    pub fn sample_rate_reduction(&self) -> u32 {
        self.target_rate
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// True if at least one stage would alter the signal.
    pub fn is_active(&self) -> bool {
        self.filter_type != FilterType::None
            || self.distortion > 0.0
            || self.bit_depth < MAX_BIT_DEPTH
            || self.target_rate != 0
    }

    /// Filter one sample through this chain's biquad only.
    #[inline]
    pub fn apply_filter(&mut self, sample: i16) -> i16 {
        if self.filter_type == FilterType::None {
            return sample;
        }
        to_i16(self.state.process(&self.coeffs, sample as f32))
    }

    /// Run filter, distortion, bit crush and rate reduction in that order.
    #[inline]
    pub fn process(&mut self, sample: i16) -> i16 {
        let mut s = self.apply_filter(sample);
        if self.distortion > 0.0 {
            s = apply_distortion(s, self.distortion);
        }
        if self.bit_depth < MAX_BIT_DEPTH {
            s = apply_bit_crush(s, self.bit_depth);
        }
        if self.target_rate != 0 {
            s = self.reducer.process(s, self.target_rate);
        }
        s
    }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_finite() {
        gain.clamp(-MAX_GAIN_DB, MAX_GAIN_DB)
    } else {
        0.0
    }
}

/// A fixed bank of independently activatable effect chains.
#[derive(Clone, Debug)]
pub struct FxSlots<const N: usize> {
    slots: [Option<FxParams>; N],
}

impl<const N: usize> Default for FxSlots<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FxSlots<N> {
    pub const fn new() -> Self {
        Self { slots: [None; N] }
    }

    /// Activate slot `index` with a fresh filter chain.
    ///
    /// Returns false if the index is out of range. Setting `FilterType::None`
    /// deactivates the slot.
    pub fn set(&mut self, index: usize, kind: FilterType, cutoff: f32, resonance: f32, gain: f32) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        *slot = match kind {
            FilterType::None => None,
            _ => Some(FxParams::with_filter(kind, cutoff, resonance, gain)),
        };
        true
    }

    /// Deactivate a slot.
    pub fn clear(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }

    /// Filter type of a slot, `FilterType::None` when inactive or out of range.
    pub fn filter_type(&self, index: usize) -> FilterType {
        self.get(index).map(|fx| fx.filter_type()).unwrap_or_default()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn get(&self, index: usize) -> Option<&FxParams> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut FxParams> {
        self.slots.get_mut(index).and_then(|s| s.as_mut())
    }

    /// Number of active slots.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_crush_truncates_magnitude_and_keeps_sign() {
        assert_eq!(apply_bit_crush(0x1234, 8), 0x1200);
        assert_eq!(apply_bit_crush(-0x1234, 8), -0x1200);
        assert_eq!(apply_bit_crush(255, 8), 0);
        assert_eq!(apply_bit_crush(-255, 8), 0);
        assert_eq!(apply_bit_crush(12345, 16), 12345);
    }

    #[test]
    fn bit_crush_handles_extremes() {
        assert_eq!(apply_bit_crush(i16::MIN, 4), i16::MIN);
        assert_eq!(apply_bit_crush(i16::MAX, 4), 0x7000);
        // below 4 bits clamps to 4
        assert_eq!(apply_bit_crush(i16::MAX, 1), apply_bit_crush(i16::MAX, 4));
    }

    #[test]
    fn distortion_zero_is_identity() {
        for s in [i16::MIN, -1000, 0, 1, 12345, i16::MAX] {
            assert_eq!(apply_distortion(s, 0.0), s);
        }
    }

    #[test]
    fn distortion_raises_quiet_signals_and_preserves_sign() {
        let quiet = 4000;
        let out = apply_distortion(quiet, 50.0);
        assert!(out > quiet);
        assert_eq!(apply_distortion(-quiet, 50.0), -out);
        assert!(apply_distortion(i16::MAX, 100.0) >= 32700);
    }

    #[test]
    fn rate_reducer_holds_for_period() {
        let mut r = RateReducer::new();
        // 44100 / 11025 = 4 frames per held sample
        let out: [i16; 8] = core::array::from_fn(|i| r.process(i as i16 + 1, 11_025));
        assert_eq!(out, [1, 1, 1, 1, 5, 5, 5, 5]);
    }

    #[test]
    fn rate_reducer_bypass() {
        let mut r = RateReducer::new();
        assert_eq!(r.process(7, 0), 7);
        assert_eq!(r.process(8, SAMPLE_RATE), 8);
    }

    #[test]
    fn default_chain_is_transparent() {
        let mut fx = FxParams::new();
        assert!(!fx.is_active());
        for s in [i16::MIN, -3, 0, 99, i16::MAX] {
            assert_eq!(fx.process(s), s);
        }
    }

    #[test]
    fn setters_clamp() {
        let mut fx = FxParams::new();
        fx.set_bit_depth(2);
        assert_eq!(fx.bit_depth(), MIN_BIT_DEPTH);
        fx.set_bit_depth(24);
        assert_eq!(fx.bit_depth(), MAX_BIT_DEPTH);
        fx.set_distortion(250.0);
        assert_eq!(fx.distortion(), MAX_DISTORTION);
        fx.set_distortion(-3.0);
        assert_eq!(fx.distortion(), 0.0);
        fx.set_cutoff(100_000.0);
        assert!(fx.cutoff() < SAMPLE_RATE as f32 / 2.0);
        fx.set_sample_rate_reduction(96_000);
        assert_eq!(fx.sample_rate_reduction(), 0);
    }

    #[test]
    fn coefficients_follow_parameter_changes() {
        let mut fx = FxParams::with_filter(FilterType::LowPass, 1000.0, 0.707, 0.0);
        let before = *fx.coeffs();
        fx.set_cutoff(2000.0);
        assert_ne!(*fx.coeffs(), before);
        fx.set_filter_type(FilterType::None);
        assert_eq!(*fx.coeffs(), BiquadCoeffs::identity());
    }

    #[test]
    fn chain_order_is_filter_then_crush() {
        // the low-pass settles on the DC input; the crush then quantizes it
        let mut fx = FxParams::with_filter(FilterType::LowPass, 20_000.0, 0.707, 0.0);
        fx.set_bit_depth(4);
        let mut last = 0;
        for _ in 0..500 {
            last = fx.process(10_000);
        }
        assert_eq!(last, apply_bit_crush(last, 4));
        assert_eq!(last & 0x0FFF, 0);
    }

    #[test]
    fn chain_order_is_distortion_then_crush() {
        let mut fx = FxParams::new();
        fx.set_distortion(50.0);
        fx.set_bit_depth(4);
        let expected = apply_bit_crush(apply_distortion(4000, 50.0), 4);
        assert_eq!(fx.process(4000), expected);
        // crushing first would have quantized 4000 to zero
        assert_eq!(apply_bit_crush(4000, 4), 0);
        assert_ne!(expected, 0);
    }

    #[test]
    fn rate_reduction_holds_filtered_output() {
        let mut plain = FxParams::with_filter(FilterType::LowPass, 1000.0, 0.707, 0.0);
        let mut held = FxParams::with_filter(FilterType::LowPass, 1000.0, 0.707, 0.0);
        held.set_sample_rate_reduction(11_025);
        let filtered: [i16; 8] = core::array::from_fn(|_| plain.process(10_000));
        let out: [i16; 8] = core::array::from_fn(|_| held.process(10_000));
        // the filter keeps moving underneath; the hold stage runs last
        assert_ne!(filtered[0], filtered[1]);
        assert_eq!(out[..4], [filtered[0]; 4]);
        assert_eq!(out[4..], [filtered[4]; 4]);
    }

    #[test]
    fn changing_type_in_set_filter_clears_history() {
        let mut fx = FxParams::with_filter(FilterType::LowPass, 1000.0, 0.707, 0.0);
        for _ in 0..100 {
            fx.process(20_000);
        }
        fx.set_filter(FilterType::HighPass, 1000.0, 0.707, 0.0);
        assert_eq!(fx.process(0), 0);

        // same type keeps the running state
        let mut fx = FxParams::with_filter(FilterType::LowPass, 1000.0, 0.707, 0.0);
        for _ in 0..100 {
            fx.process(20_000);
        }
        fx.set_filter(FilterType::LowPass, 1200.0, 0.707, 0.0);
        assert_ne!(fx.process(0), 0);
    }

    #[test]
    fn distortion_ignores_nan_amount() {
        assert_eq!(apply_distortion(1234, f32::NAN), 1234);
    }

    #[test]
    fn slots_are_independent() {
        let mut slots: FxSlots<8> = FxSlots::new();
        assert!(slots.set(0, FilterType::LowPass, 500.0, 0.707, 0.0));
        assert!(slots.set(1, FilterType::LowPass, 500.0, 0.707, 0.0));
        assert!(!slots.set(8, FilterType::LowPass, 500.0, 0.707, 0.0));
        assert_eq!(slots.active_count(), 2);

        let a = slots.get_mut(0).map(|fx| fx.process(20_000));
        // slot 1 has not seen any input yet
        let b = slots.get_mut(1).map(|fx| fx.process(0));
        assert_ne!(a, b);
        assert_eq!(b, Some(0));
    }

    #[test]
    fn slot_clear_and_query() {
        let mut slots: FxSlots<4> = FxSlots::new();
        slots.set(2, FilterType::Notch, 1000.0, 2.0, 0.0);
        assert_eq!(slots.filter_type(2), FilterType::Notch);
        assert_eq!(slots.filter_type(9), FilterType::None);
        slots.clear(2);
        assert_eq!(slots.active_count(), 0);
        slots.set(3, FilterType::HighPass, 1000.0, 1.0, 0.0);
        slots.set(3, FilterType::None, 1000.0, 1.0, 0.0);
        assert!(!slots.is_active(3));
    }
}
