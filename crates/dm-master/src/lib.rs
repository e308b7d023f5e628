//! Headless controller for drumkit.
//!
//! Wires a [`Sequencer`] and an [`AudioEngine`] together for live playback on
//! the default audio device, and renders offline to frames or WAV files. Both
//! the CLI and tests drive the machine through [`Controller`].

mod kit;
mod playback;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use dm_engine::{ManualClock, StdClock};
use dm_ir::{SampleView, SAMPLE_RATE};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use thiserror::Error;

use playback::{AudioInputs, Shared};

// Re-export common types so callers don't need dm-ir/dm-engine directly.
pub use dm_audio::AudioError;
pub use dm_engine::{AudioEngine, BusPins, EngineCommand, Frame, InitError, Sequencer};
pub use dm_ir::{FilterType, PatternBank};
pub use kit::{decode_wav, Kit, KitError, PAD_NAMES};

/// Sequencer polling granularity for offline renders, in frames.
const RENDER_CHUNK: usize = 32;

/// Capacity of the trigger and command rings.
const RING_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("audio engine init failed: {0}")]
    Init(#[from] InitError),
    #[error(transparent)]
    Kit(#[from] KitError),
    #[error("wav export failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("not available while playing")]
    Busy,
    #[error("audio thread exited unexpectedly")]
    AudioThread,
}

/// Headless drum machine: owns the kit, the sequencer and the engine.
pub struct Controller {
    kit: Kit,
    sequencer: Arc<Mutex<Sequencer<StdClock>>>,
    /// Present while stopped; moved to the audio thread during playback.
    engine: Option<AudioEngine<'static>>,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    shared: Arc<Shared>,
    commands: HeapProd<EngineCommand>,
    sequencer_thread: Option<JoinHandle<()>>,
    audio_thread: Option<JoinHandle<AudioEngine<'static>>>,
}

impl Controller {
    /// An empty kit with the demo grooves in patterns 0-2.
    pub fn new() -> Self {
        Self::with_kit(Kit::empty())
    }

    pub fn with_kit(kit: Kit) -> Self {
        let sequencer = Sequencer::with_patterns(StdClock::new(), PatternBank::with_demo_grooves());
        Self {
            kit,
            sequencer: Arc::new(Mutex::new(sequencer)),
            engine: Some(engine_for(&kit)),
            playback: None,
        }
    }

    // --- Samples ---

    pub fn kit(&self) -> &Kit {
        &self.kit
    }

    /// Put sample data on a pad. Not available while playing.
    ///
    /// Each distinct sample stays allocated for the life of the process.
    pub fn set_sample(&mut self, pad: usize, data: Vec<i16>) -> Result<(), ControllerError> {
        let engine = self.engine.as_mut().ok_or(ControllerError::Busy)?;
        self.kit.set(pad, data)?;
        if let Some(data) = self.kit.get(pad) {
            engine.set_sample_buffer(pad, SampleView::new(data));
        }
        Ok(())
    }

    /// Replace the whole kit. Not available while playing.
    pub fn load_kit(&mut self, kit: Kit) -> Result<(), ControllerError> {
        let engine = self.engine.as_mut().ok_or(ControllerError::Busy)?;
        for pad in 0..dm_ir::NUM_PADS {
            engine.clear_sample_buffer(pad);
        }
        register_kit(engine, &kit);
        log::info!("kit loaded: {} pads", kit.len());
        self.kit = kit;
        Ok(())
    }

    // --- Sequencer ---

    /// Lock the sequencer for editing or transport queries.
    pub fn sequencer(&self) -> MutexGuard<'_, Sequencer<StdClock>> {
        self.sequencer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Engine control ---

    /// Apply a control operation now, or queue it for the audio thread.
    pub fn send(&mut self, command: EngineCommand) {
        if let Some(engine) = self.engine.as_mut() {
            engine.apply(command);
        } else if let Some(pb) = self.playback.as_mut() {
            if pb.commands.try_push(command).is_err() {
                log::warn!("command ring full, dropped {:?}", command);
            }
        }
    }

    pub fn trigger_live(&mut self, pad: u8, velocity: u8) {
        self.send(EngineCommand::TriggerLive { pad, velocity });
    }

    /// The engine, while stopped.
    pub fn engine(&self) -> Option<&AudioEngine<'static>> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut AudioEngine<'static>> {
        self.engine.as_mut()
    }

    // --- Real-time playback ---

    /// Start the sequencer and audio threads on the default output device.
    pub fn play(&mut self, pins: BusPins) -> Result<(), ControllerError> {
        self.stop();
        let engine = self.engine.take().ok_or(ControllerError::Busy)?;

        let shared = Arc::new(Shared::new());
        let (trigger_prod, trigger_cons) = HeapRb::new(RING_CAPACITY).split();
        let (command_prod, command_cons) = HeapRb::new(RING_CAPACITY).split();
        let inputs = AudioInputs {
            triggers: trigger_cons,
            commands: command_cons,
        };

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let audio_shared = shared.clone();
        let audio_thread = std::thread::spawn(move || {
            playback::audio_thread(engine, pins, inputs, audio_shared, ready_tx)
        });

        let ready = ready_rx.recv().unwrap_or(Err(ControllerError::AudioThread));
        if let Err(e) = ready {
            self.engine = Some(audio_thread.join().unwrap_or_else(|_| engine_for(&self.kit)));
            return Err(e);
        }

        self.sequencer().start();
        let seq = self.sequencer.clone();
        let seq_shared = shared.clone();
        let sequencer_thread = std::thread::spawn(move || {
            playback::sequencer_thread(seq, trigger_prod, seq_shared);
        });

        self.playback = Some(PlaybackHandle {
            shared,
            commands: command_prod,
            sequencer_thread: Some(sequencer_thread),
            audio_thread: Some(audio_thread),
        });
        log::info!("playback started");
        Ok(())
    }

    /// Stop playback and take the engine back. No-op when stopped.
    pub fn stop(&mut self) {
        let Some(mut pb) = self.playback.take() else {
            return;
        };
        pb.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = pb.sequencer_thread.take() {
            let _ = handle.join();
        }
        self.sequencer().stop();

        let mut engine = match pb.audio_thread.take().map(JoinHandle::join) {
            Some(Ok(engine)) => engine,
            _ => {
                log::error!("audio thread panicked; rebuilding engine");
                engine_for(&self.kit)
            }
        };
        engine.stop_all();
        self.engine = Some(engine);
        log::info!("playback stopped");
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.shared.finished.load(Ordering::Relaxed))
    }

    /// Step most recently played.
    pub fn current_step(&self) -> usize {
        match &self.playback {
            Some(pb) => pb.shared.current_step.load(Ordering::Relaxed) as usize,
            None => self.sequencer().current_step(),
        }
    }

    /// Smoothed engine load as a fraction of real time.
    pub fn cpu_load(&self) -> f32 {
        match (&self.playback, &self.engine) {
            (Some(pb), _) => f32::from_bits(pb.shared.cpu_load.load(Ordering::Relaxed)),
            (None, Some(engine)) => engine.cpu_load(),
            (None, None) => 0.0,
        }
    }

    // --- Offline rendering ---

    /// Render `frames` stereo frames of the current pattern from step 0.
    ///
    /// Time is derived from frames written, so the result is deterministic.
    pub fn render_frames(&mut self, frames: usize) -> Result<Vec<Frame>, ControllerError> {
        let clock = ManualClock::new();
        let mut seq = self.sequencer().rebind(&clock);
        let engine = self.engine.as_mut().ok_or(ControllerError::Busy)?;
        engine.stop_all();

        // Start one interval in the past so step 0 sounds on the first frame
        seq.start();
        let origin = seq.step_interval_us() as u64;

        let mut out = Vec::with_capacity(frames);
        let mut buffer = [0i16; RENDER_CHUNK * 2];
        let mut done = 0usize;
        while done < frames {
            clock.set(origin + done as u64 * 1_000_000 / SAMPLE_RATE as u64);
            seq.update(&mut *engine);

            let n = RENDER_CHUNK.min(frames - done);
            engine.fill_buffer(&mut buffer[..n * 2]);
            out.extend(Frame::from_interleaved(&buffer[..n * 2]));
            done += n;
        }
        engine.stop_all();
        Ok(out)
    }

    /// Render `seconds` of audio to a 16-bit stereo WAV file.
    pub fn render_to_wav(&mut self, path: impl AsRef<Path>, seconds: f32) -> Result<usize, ControllerError> {
        let frames = (seconds.max(0.0) * SAMPLE_RATE as f32) as usize;
        let rendered = self.render_frames(frames)?;

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
        for frame in &rendered {
            writer.write_sample(frame.left)?;
            writer.write_sample(frame.right)?;
        }
        writer.finalize()?;
        log::info!("wrote {} frames to {}", rendered.len(), path.as_ref().display());
        Ok(rendered.len())
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn register_kit(engine: &mut AudioEngine<'static>, kit: &Kit) {
    for (pad, data) in kit.iter() {
        engine.set_sample_buffer(pad, SampleView::new(data));
    }
}

fn engine_for(kit: &Kit) -> AudioEngine<'static> {
    let mut engine = AudioEngine::new();
    register_kit(&mut engine, kit);
    engine
}
