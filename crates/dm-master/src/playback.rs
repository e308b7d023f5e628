//! Playback threads.
//!
//! The sequencer thread polls the shared [`Sequencer`] and forwards step
//! triggers through an SPSC ring. The audio thread owns the engine, drains
//! triggers and commands between buffers, and pumps buffers to the device.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dm_audio::{AudioOutput, CpalOutput};
use dm_engine::{AudioEngine, BusPins, EngineCommand, Sequencer, SequencerListener, StdClock};
use dm_ir::TriggerEvent;
use ringbuf::traits::{Consumer, Producer};
use ringbuf::{HeapCons, HeapProd};

use crate::ControllerError;

/// Sequencer poll period.
const POLL_INTERVAL: Duration = Duration::from_micros(500);

/// State shared between the controller and both threads.
pub(crate) struct Shared {
    pub stop: AtomicBool,
    pub finished: AtomicBool,
    pub current_step: AtomicU8,
    /// `f32` bits of the engine's load average.
    pub cpu_load: AtomicU32,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            current_step: AtomicU8::new(0),
            cpu_load: AtomicU32::new(0),
        }
    }
}

/// Forwards step notifications from the sequencer thread.
struct TriggerForwarder<'a> {
    triggers: &'a mut HeapProd<TriggerEvent>,
    shared: &'a Shared,
}

impl SequencerListener for TriggerForwarder<'_> {
    fn on_step_triggered(&mut self, track: u8, velocity: u8, track_volume: u8) {
        let event = TriggerEvent::sequencer(track, velocity, track_volume);
        if self.triggers.try_push(event).is_err() {
            log::warn!("trigger ring full, dropped track {}", track);
        }
    }

    fn on_step_advanced(&mut self, step: u8) {
        self.shared.current_step.store(step, Ordering::Relaxed);
    }
}

pub(crate) fn sequencer_thread(
    sequencer: Arc<Mutex<Sequencer<StdClock>>>,
    mut triggers: HeapProd<TriggerEvent>,
    shared: Arc<Shared>,
) {
    while !shared.stop.load(Ordering::Relaxed) {
        {
            let mut seq = sequencer.lock().unwrap_or_else(PoisonError::into_inner);
            let mut forwarder = TriggerForwarder {
                triggers: &mut triggers,
                shared: &shared,
            };
            seq.update(&mut forwarder);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Rings consumed by the audio thread.
pub(crate) struct AudioInputs {
    pub triggers: HeapCons<TriggerEvent>,
    pub commands: HeapCons<EngineCommand>,
}

/// Run the engine against the default device until told to stop.
///
/// The outcome of device setup is reported once through `ready`. The engine
/// is handed back when the thread ends.
pub(crate) fn audio_thread(
    mut engine: AudioEngine<'static>,
    pins: BusPins,
    mut inputs: AudioInputs,
    shared: Arc<Shared>,
    ready: SyncSender<Result<(), ControllerError>>,
) -> AudioEngine<'static> {
    let mut output = match CpalOutput::new() {
        Ok(output) => output,
        Err(e) => {
            shared.finished.store(true, Ordering::Relaxed);
            let _ = ready.send(Err(e.into()));
            return engine;
        }
    };
    if let Err(e) = engine.begin(&mut output, pins) {
        shared.finished.store(true, Ordering::Relaxed);
        let _ = ready.send(Err(e.into()));
        return engine;
    }
    let _ = ready.send(Ok(()));

    let clock = StdClock::new();
    while !shared.stop.load(Ordering::Relaxed) {
        while let Some(command) = inputs.commands.try_pop() {
            engine.apply(command);
        }
        while let Some(event) = inputs.triggers.try_pop() {
            engine.trigger(event);
        }
        engine.pump(&clock, &mut output);
        shared.cpu_load.store(engine.cpu_load().to_bits(), Ordering::Relaxed);
    }

    if let Err(e) = output.stop() {
        log::warn!("failed to stop output: {}", e);
    }
    shared.finished.store(true, Ordering::Relaxed);
    engine
}
