//! The mixing engine.
//!
//! [`AudioEngine`] owns the voice pool, the sample table and every FX chain.
//! The thread that fills output buffers owns it exclusively; other threads
//! talk to it through [`EngineCommand`]s and [`TriggerEvent`]s.

use dm_ir::{
    FilterPreset, FilterType, SampleView, TriggerEvent, TriggerSource, BUFFER_COUNT,
    BUFFER_FRAMES, MAX_FX_SLOTS, NUM_PADS, SAMPLE_RATE,
};
use thiserror::Error;

use crate::capture::Capture;
use crate::clock::Clock;
use crate::command::EngineCommand;
use crate::frame::{saturate, Frame};
use crate::fx::{FxParams, FxSlots};
use crate::sequencer::SequencerListener;
use crate::voice::{Voice, VoiceOrigin};
use crate::voice_pool::{VoiceId, VoicePool};

/// Full scale of the master, sequencer and live volume controls (unity gain).
pub const MAX_VOLUME: u8 = 150;
pub const DEFAULT_VOLUME: u8 = 100;

/// Smoothing factor of the CPU load average.
const LOAD_ALPHA: f32 = 0.1;

/// Opaque pin or role ids for the serial audio bus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusPins {
    pub bck: u8,
    pub ws: u8,
    pub data: u8,
}

/// Output bus configuration handed to [`OutputBus::configure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusConfig {
    pub pins: BusPins,
    pub sample_rate: u32,
    /// Stereo frames per buffer.
    pub buffer_frames: usize,
    /// Buffers queued in the peripheral.
    pub buffer_count: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new(BusPins::default())
    }
}

impl BusConfig {
    pub const fn new(pins: BusPins) -> Self {
        Self {
            pins,
            sample_rate: SAMPLE_RATE,
            buffer_frames: BUFFER_FRAMES,
            buffer_count: BUFFER_COUNT,
        }
    }

    /// Check the configuration against what the engine can drive.
    pub fn validate(&self) -> Result<(), InitError> {
        if self.sample_rate != SAMPLE_RATE {
            return Err(InitError::SampleRate(self.sample_rate));
        }
        if self.buffer_frames != BUFFER_FRAMES {
            return Err(InitError::BufferFrames(self.buffer_frames));
        }
        if !matches!(self.buffer_count, 2 | 4) {
            return Err(InitError::BufferCount(self.buffer_count));
        }
        Ok(())
    }

    /// Duration of one buffer in microseconds.
    pub fn buffer_micros(&self) -> f32 {
        self.buffer_frames as f32 * 1_000_000.0 / self.sample_rate as f32
    }
}

/// Failure to bring up the output path.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InitError {
    #[error("unsupported sample rate: {0} Hz")]
    SampleRate(u32),
    #[error("unsupported buffer length: {0} frames")]
    BufferFrames(usize),
    #[error("unsupported buffer count: {0}")]
    BufferCount(usize),
    #[error("output bus unavailable")]
    BusUnavailable,
}

/// Destination for interleaved stereo i16 buffers.
pub trait OutputBus {
    /// Prepare the bus. Called once from [`AudioEngine::begin`].
    fn configure(&mut self, config: &BusConfig) -> Result<(), InitError>;

    /// Hand over one filled buffer; may block until the bus has room.
    fn write(&mut self, samples: &[i16]);
}

/// Exponential moving average of buffer fill time over buffer duration.
#[derive(Clone, Copy, Debug, Default)]
struct CpuLoad {
    fraction: f32,
}

impl CpuLoad {
    fn update(&mut self, elapsed_us: u64, budget_us: f32) {
        let load = elapsed_us as f32 / budget_us;
        self.fraction += LOAD_ALPHA * (load - self.fraction);
    }
}

/// The voice mixer and FX engine.
pub struct AudioEngine<'a> {
    samples: [Option<SampleView<'a>>; NUM_PADS],
    pool: VoicePool<'a>,
    fx: FxParams,
    track_fx: FxSlots<MAX_FX_SLOTS>,
    pad_fx: FxSlots<MAX_FX_SLOTS>,
    master_volume: u8,
    sequencer_volume: u8,
    live_volume: u8,
    mix_buffer: [i16; BUFFER_FRAMES * 2],
    capture: Capture,
    load: CpuLoad,
    config: BusConfig,
    initialized: bool,
}

impl<'a> Default for AudioEngine<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> AudioEngine<'a> {
    pub fn new() -> Self {
        Self {
            samples: [None; NUM_PADS],
            pool: VoicePool::new(),
            fx: FxParams::new(),
            track_fx: FxSlots::new(),
            pad_fx: FxSlots::new(),
            master_volume: DEFAULT_VOLUME,
            sequencer_volume: DEFAULT_VOLUME,
            live_volume: DEFAULT_VOLUME,
            mix_buffer: [0; BUFFER_FRAMES * 2],
            capture: Capture::new(),
            load: CpuLoad::default(),
            config: BusConfig::default(),
            initialized: false,
        }
    }

    /// Configure the output bus with the default buffer layout.
    pub fn begin<B: OutputBus + ?Sized>(&mut self, bus: &mut B, pins: BusPins) -> Result<(), InitError> {
        self.begin_with(bus, BusConfig::new(pins))
    }

    /// Configure the output bus with an explicit configuration.
    pub fn begin_with<B: OutputBus + ?Sized>(&mut self, bus: &mut B, config: BusConfig) -> Result<(), InitError> {
        config.validate()?;
        bus.configure(&config)?;
        self.config = config;
        self.initialized = true;
        log::info!(
            "audio engine ready: {} Hz, {} frames x {} buffers",
            config.sample_rate,
            config.buffer_frames,
            config.buffer_count
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // --- Samples ---

    /// Associate sample data with a pad.
    ///
    /// Voices still playing the pad's previous sample are stopped. Returns
    /// false for an invalid pad or empty data.
    pub fn set_sample_buffer(&mut self, pad: usize, sample: SampleView<'a>) -> bool {
        if pad >= NUM_PADS || sample.is_empty() {
            log::warn!("rejected sample for pad {} ({} frames)", pad, sample.len());
            return false;
        }
        self.pool.stop_pad(pad as u8);
        self.samples[pad] = Some(sample);
        log::debug!("pad {} loaded with {} frames", pad, sample.len());
        true
    }

    pub fn clear_sample_buffer(&mut self, pad: usize) {
        if pad < NUM_PADS {
            self.pool.stop_pad(pad as u8);
            self.samples[pad] = None;
        }
    }

    pub fn sample_buffer(&self, pad: usize) -> Option<SampleView<'a>> {
        self.samples.get(pad).copied().flatten()
    }

    // --- Triggers ---

    /// Trigger a pad as a live hit.
    pub fn trigger_sample(&mut self, pad: usize, velocity: u8) -> Option<VoiceId> {
        self.trigger_sample_live(pad, velocity)
    }

    pub fn trigger_sample_live(&mut self, pad: usize, velocity: u8) -> Option<VoiceId> {
        self.start_voice(pad, velocity, 100, TriggerSource::Live)
    }

    /// Trigger a pad from the sequencer; `track_volume` is 0-100.
    pub fn trigger_sample_sequencer(&mut self, pad: usize, velocity: u8, track_volume: u8) -> Option<VoiceId> {
        self.start_voice(pad, velocity, track_volume, TriggerSource::Sequencer)
    }

    /// Start a voice for a queued trigger.
    pub fn trigger(&mut self, event: TriggerEvent) -> Option<VoiceId> {
        self.start_voice(event.pad as usize, event.velocity, event.track_volume, event.source)
    }

    fn start_voice(&mut self, pad: usize, velocity: u8, volume: u8, source: TriggerSource) -> Option<VoiceId> {
        let sample = self.sample_buffer(pad)?;
        let origin = VoiceOrigin { pad: pad as u8, source };
        Some(self.pool.allocate(Voice::new(sample, origin, velocity, volume)))
    }

    /// Stop every voice playing a pad.
    pub fn stop_sample(&mut self, pad: usize) {
        if pad < NUM_PADS {
            self.pool.stop_pad(pad as u8);
        }
    }

    pub fn stop_all(&mut self) {
        self.pool.stop_all();
    }

    // --- Voice parameters ---

    pub fn set_pitch(&mut self, voice: VoiceId, multiplier: f32) {
        self.pool.set_pitch(voice, multiplier);
    }

    pub fn set_loop(&mut self, voice: VoiceId, enabled: bool, start: u32, end: u32) {
        self.pool.set_loop(voice, enabled, start, end);
    }

    pub fn voice(&self, voice: VoiceId) -> Option<&Voice<'a>> {
        self.pool.get(voice)
    }

    // --- Global FX ---

    pub fn set_filter(&mut self, kind: FilterType, cutoff: f32, resonance: f32, gain: f32) {
        self.fx.set_filter(kind, cutoff, resonance, gain);
        log::debug!("global filter: {} {:.0} Hz q {:.2} {:.1} dB", kind.name(), cutoff, resonance, gain);
    }

    pub fn set_filter_type(&mut self, kind: FilterType) {
        self.fx.set_filter_type(kind);
        log::debug!("global filter type: {}", kind.name());
    }

    pub fn set_filter_cutoff(&mut self, cutoff: f32) {
        self.fx.set_cutoff(cutoff);
    }

    pub fn set_filter_resonance(&mut self, resonance: f32) {
        self.fx.set_resonance(resonance);
    }

    pub fn set_filter_gain(&mut self, gain: f32) {
        self.fx.set_gain(gain);
    }

    pub fn set_bit_depth(&mut self, bits: u8) {
        self.fx.set_bit_depth(bits);
    }

    pub fn set_distortion(&mut self, amount: f32) {
        self.fx.set_distortion(amount);
    }

    pub fn set_sample_rate_reduction(&mut self, rate: u32) {
        self.fx.set_sample_rate_reduction(rate);
    }

    pub fn filter_type(&self) -> FilterType {
        self.fx.filter_type()
    }

    pub fn filter_cutoff(&self) -> f32 {
        self.fx.cutoff()
    }

    pub fn filter_resonance(&self) -> f32 {
        self.fx.resonance()
    }

    pub fn filter_gain(&self) -> f32 {
        self.fx.gain()
    }

    pub fn bit_depth(&self) -> u8 {
        self.fx.bit_depth()
    }

    pub fn distortion(&self) -> f32 {
        self.fx.distortion()
    }

    pub fn sample_rate_reduction(&self) -> u32 {
        self.fx.sample_rate_reduction()
    }

    // --- Per-track and per-pad filters ---

    /// Assign a filter to a sequencer track. `FilterType::None` clears it.
    pub fn set_track_filter(&mut self, track: usize, kind: FilterType, cutoff: f32, resonance: f32, gain: f32) -> bool {
        let ok = self.track_fx.set(track, kind, cutoff, resonance, gain);
        if ok {
            log::debug!("track {} filter: {}", track, kind.name());
        }
        ok
    }

    pub fn clear_track_filter(&mut self, track: usize) {
        self.track_fx.clear(track);
    }

    pub fn track_filter(&self, track: usize) -> FilterType {
        self.track_fx.filter_type(track)
    }

    pub fn active_track_filters(&self) -> usize {
        self.track_fx.active_count()
    }

    /// Assign a filter to a live pad. `FilterType::None` clears it.
    pub fn set_pad_filter(&mut self, pad: usize, kind: FilterType, cutoff: f32, resonance: f32, gain: f32) -> bool {
        let ok = self.pad_fx.set(pad, kind, cutoff, resonance, gain);
        if ok {
            log::debug!("pad {} filter: {}", pad, kind.name());
        }
        ok
    }

    pub fn clear_pad_filter(&mut self, pad: usize) {
        self.pad_fx.clear(pad);
    }

    pub fn pad_filter(&self, pad: usize) -> FilterType {
        self.pad_fx.filter_type(pad)
    }

    pub fn active_pad_filters(&self) -> usize {
        self.pad_fx.active_count()
    }

    pub fn filter_preset(kind: FilterType) -> &'static FilterPreset {
        kind.preset()
    }

    pub fn filter_name(kind: FilterType) -> &'static str {
        kind.name()
    }

    // --- Volume (0-150, 150 = unity) ---

    pub fn set_master_volume(&mut self, volume: u8) {
        self.master_volume = volume.min(MAX_VOLUME);
    }

    pub fn master_volume(&self) -> u8 {
        self.master_volume
    }

    pub fn set_sequencer_volume(&mut self, volume: u8) {
        self.sequencer_volume = volume.min(MAX_VOLUME);
    }

    pub fn sequencer_volume(&self) -> u8 {
        self.sequencer_volume
    }

    pub fn set_live_volume(&mut self, volume: u8) {
        self.live_volume = volume.min(MAX_VOLUME);
    }

    pub fn live_volume(&self) -> u8 {
        self.live_volume
    }

    // --- Commands ---

    /// Apply a queued control operation.
    pub fn apply(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::TriggerLive { pad, velocity } => {
                self.trigger_sample_live(pad as usize, velocity);
            }
            EngineCommand::StopSample { pad } => self.stop_sample(pad as usize),
            EngineCommand::StopAll => self.stop_all(),
            EngineCommand::SetFilterType(kind) => self.set_filter_type(kind),
            EngineCommand::SetFilterCutoff(hz) => self.set_filter_cutoff(hz),
            EngineCommand::SetFilterResonance(q) => self.set_filter_resonance(q),
            EngineCommand::SetFilterGain(db) => self.set_filter_gain(db),
            EngineCommand::SetBitDepth(bits) => self.set_bit_depth(bits),
            EngineCommand::SetDistortion(amount) => self.set_distortion(amount),
            EngineCommand::SetSampleRateReduction(rate) => self.set_sample_rate_reduction(rate),
            EngineCommand::SetTrackFilter { track, kind, cutoff, resonance, gain } => {
                self.set_track_filter(track as usize, kind, cutoff, resonance, gain);
            }
            EngineCommand::ClearTrackFilter { track } => self.clear_track_filter(track as usize),
            EngineCommand::SetPadFilter { pad, kind, cutoff, resonance, gain } => {
                self.set_pad_filter(pad as usize, kind, cutoff, resonance, gain);
            }
            EngineCommand::ClearPadFilter { pad } => self.clear_pad_filter(pad as usize),
            EngineCommand::SetMasterVolume(v) => self.set_master_volume(v),
            EngineCommand::SetSequencerVolume(v) => self.set_sequencer_volume(v),
            EngineCommand::SetLiveVolume(v) => self.set_live_volume(v),
            EngineCommand::SetPitch { voice, multiplier } => self.set_pitch(voice, multiplier),
            EngineCommand::SetLoop { voice, enabled, start, end } => {
                self.set_loop(voice, enabled, start, end);
            }
        }
    }

    // --- Rendering ---

    /// Fill an interleaved stereo buffer.
    ///
    /// Never allocates, blocks or logs. A trailing odd sample is zeroed.
    pub fn fill_buffer(&mut self, out: &mut [i16]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.fill_frames(out));
        #[cfg(not(feature = "alloc_check"))]
        self.fill_frames(out);
    }

    fn fill_frames(&mut self, out: &mut [i16]) {
        // slot activity cannot change during a fill
        let track_active: [bool; MAX_FX_SLOTS] = core::array::from_fn(|i| self.track_fx.is_active(i));
        let pad_active: [bool; MAX_FX_SLOTS] = core::array::from_fn(|i| self.pad_fx.is_active(i));

        let mut frames = out.chunks_exact_mut(2);
        for pair in &mut frames {
            let frame = self.render_frame(&track_active, &pad_active);
            pair[0] = frame.left;
            pair[1] = frame.right;
            self.capture.push(frame.left);
        }
        for rest in frames.into_remainder() {
            *rest = 0;
        }
    }

    /// Mix one output frame (mono on both channels).
    #[inline]
    fn render_frame(&mut self, track_active: &[bool; MAX_FX_SLOTS], pad_active: &[bool; MAX_FX_SLOTS]) -> Frame {
        let mut dry: i32 = 0;
        let mut track_bus = [0i32; MAX_FX_SLOTS];
        let mut pad_bus = [0i32; MAX_FX_SLOTS];
        let seq_gain = self.sequencer_volume as i32;
        let live_gain = self.live_volume as i32;

        self.pool.render_frame(|voice, value| {
            let slot = voice.origin.pad as usize;
            match voice.origin.source {
                TriggerSource::Sequencer => {
                    let v = value * seq_gain / MAX_VOLUME as i32;
                    match track_bus.get_mut(slot) {
                        Some(bus) if track_active[slot] => *bus += v,
                        _ => dry += v,
                    }
                }
                TriggerSource::Live => {
                    let v = value * live_gain / MAX_VOLUME as i32;
                    match pad_bus.get_mut(slot) {
                        Some(bus) if pad_active[slot] => *bus += v,
                        _ => dry += v,
                    }
                }
            }
        });

        let mut mix = dry;
        for (i, bus) in track_bus.iter().enumerate() {
            if let Some(fx) = self.track_fx.get_mut(i) {
                mix += fx.process(saturate(*bus)) as i32;
            }
        }
        for (i, bus) in pad_bus.iter().enumerate() {
            if let Some(fx) = self.pad_fx.get_mut(i) {
                mix += fx.process(saturate(*bus)) as i32;
            }
        }

        let wet = self.fx.process(saturate(mix)) as i32;
        Frame::saturating_mono(wet * self.master_volume as i32 / MAX_VOLUME as i32)
    }

    /// Render one buffer into the internal mix buffer and update the load average.
    pub fn process<C: Clock + ?Sized>(&mut self, clock: &C) -> &[i16] {
        let start = clock.now_micros();
        let mut buffer = self.mix_buffer;
        self.fill_buffer(&mut buffer);
        self.mix_buffer = buffer;
        let elapsed = clock.now_micros().saturating_sub(start);
        self.load.update(elapsed, self.config.buffer_micros());
        &self.mix_buffer
    }

    /// Render one buffer and hand it to the bus.
    pub fn pump<C: Clock + ?Sized, B: OutputBus + ?Sized>(&mut self, clock: &C, bus: &mut B) {
        let buffer = self.process(clock);
        bus.write(buffer);
    }

    /// Last rendered buffer as frames.
    pub fn last_frames(&self) -> impl Iterator<Item = Frame> + '_ {
        Frame::from_interleaved(&self.mix_buffer)
    }

    // --- Diagnostics ---

    pub fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    /// Smoothed buffer fill time as a fraction of the buffer duration.
    ///
    /// 1.0 means a fill takes as long as the buffer plays.
    pub fn cpu_load(&self) -> f32 {
        self.load.fraction
    }

    /// Spectrum bands and 8-bit waveform from the most recent output.
    pub fn capture_audio_data(&self, spectrum: &mut [u8], waveform: &mut [u8]) {
        self.capture.spectrum(spectrum);
        self.capture.waveform(waveform);
    }
}

impl<'a> SequencerListener for AudioEngine<'a> {
    fn on_step_triggered(&mut self, track: u8, velocity: u8, track_volume: u8) {
        self.trigger_sample_sequencer(track as usize, velocity, track_volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use dm_ir::MAX_VOICES;

    #[derive(Default)]
    struct TestBus {
        configured: Option<BusConfig>,
        written: usize,
        fail: bool,
    }

    impl OutputBus for TestBus {
        fn configure(&mut self, config: &BusConfig) -> Result<(), InitError> {
            if self.fail {
                return Err(InitError::BusUnavailable);
            }
            self.configured = Some(*config);
            Ok(())
        }

        fn write(&mut self, samples: &[i16]) {
            self.written += samples.len();
        }
    }

    static FULL: [i16; 512] = [i16::MAX; 512];
    static HALF: [i16; 512] = [8000; 512];
    static NEGATIVE_FULL: [i16; 512] = [i16::MIN; 512];

    fn unity_engine() -> AudioEngine<'static> {
        let mut engine = AudioEngine::new();
        engine.set_master_volume(MAX_VOLUME);
        engine.set_sequencer_volume(MAX_VOLUME);
        engine.set_live_volume(MAX_VOLUME);
        engine
    }

    fn render(engine: &mut AudioEngine<'_>, frames: usize) -> Vec<i16> {
        let mut out = vec![0i16; frames * 2];
        engine.fill_buffer(&mut out);
        out
    }

    // === Initialization ===

    #[test]
    fn begin_configures_bus() {
        let mut engine = AudioEngine::new();
        let mut bus = TestBus::default();
        let pins = BusPins { bck: 1, ws: 2, data: 3 };
        engine.begin(&mut bus, pins).unwrap();
        assert!(engine.is_initialized());
        let cfg = bus.configured.unwrap();
        assert_eq!(cfg.pins, pins);
        assert_eq!(cfg.sample_rate, SAMPLE_RATE);
        assert_eq!(cfg.buffer_frames, BUFFER_FRAMES);
    }

    #[test]
    fn begin_reports_bus_failure() {
        let mut engine = AudioEngine::new();
        let mut bus = TestBus { fail: true, ..Default::default() };
        assert_eq!(engine.begin(&mut bus, BusPins::default()), Err(InitError::BusUnavailable));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn bus_config_validation() {
        let mut cfg = BusConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.buffer_count = 2;
        assert!(cfg.validate().is_ok());
        cfg.buffer_count = 3;
        assert_eq!(cfg.validate(), Err(InitError::BufferCount(3)));
        let cfg = BusConfig { sample_rate: 48_000, ..BusConfig::default() };
        assert_eq!(cfg.validate(), Err(InitError::SampleRate(48_000)));
        let cfg = BusConfig { buffer_frames: 64, ..BusConfig::default() };
        assert_eq!(cfg.validate(), Err(InitError::BufferFrames(64)));
    }

    // === Samples and triggers ===

    #[test]
    fn trigger_without_sample_is_noop() {
        let mut engine = AudioEngine::new();
        assert_eq!(engine.trigger_sample(3, 127), None);
        assert_eq!(engine.trigger_sample(NUM_PADS, 127), None);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn set_sample_buffer_validates() {
        let mut engine = AudioEngine::new();
        assert!(!engine.set_sample_buffer(NUM_PADS, SampleView::new(&HALF)));
        assert!(!engine.set_sample_buffer(0, SampleView::new(&[])));
        assert!(engine.set_sample_buffer(15, SampleView::new(&HALF)));
        assert!(engine.sample_buffer(15).is_some());
        engine.clear_sample_buffer(15);
        assert!(engine.sample_buffer(15).is_none());
    }

    #[test]
    fn replacing_sample_stops_its_voices() {
        let mut engine = AudioEngine::new();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        engine.trigger_sample(0, 127);
        engine.set_sample_buffer(0, SampleView::new(&FULL));
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn silence_without_voices() {
        let mut engine = AudioEngine::new();
        assert!(render(&mut engine, 64).iter().all(|&s| s == 0));
    }

    #[test]
    fn single_voice_reaches_output_at_unity() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        engine.trigger_sample_live(0, 127);
        let out = render(&mut engine, 4);
        assert_eq!(out, vec![8000; 8]);
    }

    #[test]
    fn eight_full_scale_voices_saturate() {
        let mut engine = unity_engine();
        for pad in 0..MAX_VOICES {
            engine.set_sample_buffer(pad, SampleView::new(&FULL));
            engine.trigger_sample(pad, 127);
        }
        assert_eq!(engine.active_voices(), MAX_VOICES);
        let out = render(&mut engine, 32);
        assert!(out.iter().all(|&s| s == i16::MAX));
    }

    #[test]
    fn eight_negative_voices_through_fx_slots_saturate() {
        let mut engine = unity_engine();
        for pad in 0..MAX_VOICES {
            engine.set_sample_buffer(pad, SampleView::new(&NEGATIVE_FULL));
        }
        for track in 0..4 {
            engine.set_track_filter(track, FilterType::LowPass, 20_000.0, 0.707, 0.0);
            engine.trigger_sample_sequencer(track, 127, 100);
        }
        for pad in 4..MAX_VOICES {
            engine.set_pad_filter(pad, FilterType::LowPass, 20_000.0, 0.707, 0.0);
            engine.trigger_sample_live(pad, 127);
        }
        assert_eq!(engine.active_voices(), MAX_VOICES);
        let out = render(&mut engine, 32);
        assert!(out.iter().all(|&s| s == i16::MIN), "{:?}", &out[..8]);
    }

    #[test]
    fn mixed_sources_saturate() {
        let mut engine = unity_engine();
        for pad in 0..MAX_VOICES {
            engine.set_sample_buffer(pad, SampleView::new(&FULL));
        }
        engine.set_track_filter(1, FilterType::LowPass, 20_000.0, 0.707, 0.0);
        engine.set_pad_filter(5, FilterType::LowPass, 20_000.0, 0.707, 0.0);
        for track in 0..4 {
            engine.trigger_sample_sequencer(track, 127, 100);
        }
        for pad in 4..MAX_VOICES {
            engine.trigger_sample_live(pad, 127);
        }
        let out = render(&mut engine, 32);
        assert!(out.iter().all(|&s| s == i16::MAX));
    }

    #[test]
    fn ninth_trigger_steals() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        for _ in 0..MAX_VOICES + 1 {
            engine.trigger_sample(0, 127);
        }
        assert_eq!(engine.active_voices(), MAX_VOICES);
    }

    #[test]
    fn sequencer_volume_scales_sequencer_voices_only() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        engine.set_sequencer_volume(75);
        engine.trigger_sample_sequencer(0, 127, 100);
        assert_eq!(render(&mut engine, 1)[0], 4000);

        engine.stop_all();
        engine.trigger_sample_live(0, 127);
        assert_eq!(render(&mut engine, 1)[0], 8000);
    }

    #[test]
    fn track_volume_applies_to_sequencer_voice() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(2, SampleView::new(&HALF));
        engine.on_step_triggered(2, 127, 50);
        assert_eq!(render(&mut engine, 1)[0], 4000);
    }

    #[test]
    fn volumes_are_clamped() {
        let mut engine = AudioEngine::new();
        engine.set_master_volume(255);
        engine.set_sequencer_volume(151);
        engine.set_live_volume(42);
        assert_eq!(engine.master_volume(), MAX_VOLUME);
        assert_eq!(engine.sequencer_volume(), MAX_VOLUME);
        assert_eq!(engine.live_volume(), 42);
    }

    #[test]
    fn stop_sample_and_stop_all() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        engine.set_sample_buffer(1, SampleView::new(&HALF));
        engine.trigger_sample(0, 127);
        engine.trigger_sample(1, 127);
        engine.stop_sample(0);
        assert_eq!(engine.active_voices(), 1);
        engine.apply(EngineCommand::StopAll);
        assert_eq!(engine.active_voices(), 0);
        assert!(render(&mut engine, 8).iter().all(|&s| s == 0));
    }

    // === FX routing ===

    #[test]
    fn track_filter_only_affects_sequencer_voices_of_that_track() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        assert!(engine.set_track_filter(0, FilterType::HighPass, 2000.0, 0.707, 0.0));
        assert_eq!(engine.active_track_filters(), 1);

        // live hit on pad 0 bypasses the track slot
        engine.trigger_sample_live(0, 127);
        assert_eq!(render(&mut engine, 1)[0], 8000);
        engine.stop_all();

        // a high-pass settles to zero on a DC input
        engine.trigger_sample_sequencer(0, 127, 100);
        let out = render(&mut engine, 400);
        assert!(out[out.len() - 1].abs() < 50, "last sample {}", out[out.len() - 1]);
    }

    #[test]
    fn pad_filter_slots() {
        let mut engine = AudioEngine::new();
        assert!(engine.set_pad_filter(7, FilterType::Notch, 1000.0, 1.0, 0.0));
        assert!(!engine.set_pad_filter(MAX_FX_SLOTS, FilterType::Notch, 1000.0, 1.0, 0.0));
        assert_eq!(engine.pad_filter(7), FilterType::Notch);
        assert_eq!(engine.active_pad_filters(), 1);
        engine.clear_pad_filter(7);
        assert_eq!(engine.pad_filter(7), FilterType::None);
        assert_eq!(engine.active_pad_filters(), 0);
    }

    #[test]
    fn track_filter_none_clears() {
        let mut engine = AudioEngine::new();
        engine.set_track_filter(3, FilterType::LowPass, 500.0, 1.0, 0.0);
        engine.set_track_filter(3, FilterType::None, 500.0, 1.0, 0.0);
        assert_eq!(engine.track_filter(3), FilterType::None);
        assert_eq!(engine.active_track_filters(), 0);
    }

    #[test]
    fn global_bit_crush_quantizes_output() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        engine.set_bit_depth(4);
        assert_eq!(engine.bit_depth(), 4);
        engine.trigger_sample(0, 127);
        let out = render(&mut engine, 4);
        assert!(out.iter().all(|&s| s % (1 << 12) == 0));
    }

    #[test]
    fn global_fx_getters_reflect_commands() {
        let mut engine = AudioEngine::new();
        engine.apply(EngineCommand::SetFilterType(FilterType::Peaking));
        engine.apply(EngineCommand::SetFilterCutoff(2500.0));
        engine.apply(EngineCommand::SetFilterGain(6.0));
        engine.apply(EngineCommand::SetDistortion(40.0));
        engine.apply(EngineCommand::SetSampleRateReduction(11_025));
        assert_eq!(engine.filter_type(), FilterType::Peaking);
        assert_eq!(engine.filter_cutoff(), 2500.0);
        assert_eq!(engine.filter_gain(), 6.0);
        assert_eq!(engine.distortion(), 40.0);
        assert_eq!(engine.sample_rate_reduction(), 11_025);
    }

    #[test]
    fn preset_lookup() {
        assert_eq!(AudioEngine::filter_name(FilterType::LowPass), "Low Pass");
        assert_eq!(AudioEngine::filter_preset(FilterType::Resonant).kind, FilterType::Resonant);
    }

    // === Process and diagnostics ===

    #[test]
    fn pump_writes_one_stereo_buffer() {
        let mut engine = AudioEngine::new();
        let mut bus = TestBus::default();
        let clock = ManualClock::new();
        engine.pump(&clock, &mut bus);
        assert_eq!(bus.written, BUFFER_FRAMES * 2);
    }

    #[test]
    fn process_returns_rendered_buffer() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        engine.trigger_sample(0, 127);
        let clock = ManualClock::new();
        let out = engine.process(&clock);
        assert_eq!(out.len(), BUFFER_FRAMES * 2);
        assert_eq!(out[0], 8000);
        assert_eq!(engine.last_frames().next(), Some(Frame::mono(8000)));
    }

    #[test]
    fn cpu_load_is_smoothed() {
        let mut load = CpuLoad::default();
        load.update(1000, 2000.0);
        assert!((load.fraction - 0.05).abs() < 1e-6);
        load.update(1000, 2000.0);
        assert!((load.fraction - 0.095).abs() < 1e-6);
    }

    #[test]
    fn capture_follows_output() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        engine.trigger_sample(0, 127);
        render(&mut engine, 16);
        let mut spectrum = [0u8; 8];
        let mut waveform = [0u8; 16];
        engine.capture_audio_data(&mut spectrum, &mut waveform);
        assert!(waveform.iter().all(|&b| b == ((8000 >> 8) + 128) as u8));
    }

    #[test]
    fn odd_buffer_tail_is_zeroed() {
        let mut engine = unity_engine();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        engine.trigger_sample(0, 127);
        let mut out = [7i16; 5];
        engine.fill_buffer(&mut out);
        assert_eq!(out, [8000, 8000, 8000, 8000, 0]);
    }

    #[test]
    fn pitch_and_loop_commands_reach_voice() {
        let mut engine = AudioEngine::new();
        engine.set_sample_buffer(0, SampleView::new(&HALF));
        let id = engine.trigger_sample(0, 127).unwrap();
        engine.apply(EngineCommand::SetPitch { voice: id, multiplier: 2.0 });
        engine.apply(EngineCommand::SetLoop { voice: id, enabled: true, start: 10, end: 20 });
        let voice = engine.voice(id).unwrap();
        assert_eq!(voice.pitch(), 2.0);
        assert!(voice.looping);
    }
}
