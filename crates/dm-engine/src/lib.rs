//! Mixing, effects and sequencing engine for the drumkit.
//!
//! [`AudioEngine`] mixes up to eight sample voices through per-track,
//! per-pad and global effect chains. [`Sequencer`] drives it from a
//! 16-step pattern bank through the [`SequencerListener`] seam.

#![cfg_attr(not(feature = "std"), no_std)]

mod capture;
pub mod clock;
mod command;
mod engine;
pub mod filter;
mod frame;
pub mod fx;
pub mod sequencer;
mod voice;
mod voice_pool;

pub use capture::{band_frequency, Capture, CAPTURE_LEN};
pub use clock::{Clock, ManualClock};
#[cfg(feature = "std")]
pub use clock::StdClock;
pub use command::EngineCommand;
pub use engine::{AudioEngine, BusConfig, BusPins, InitError, OutputBus, DEFAULT_VOLUME, MAX_VOLUME};
pub use filter::{BiquadCoeffs, FilterState};
pub use frame::Frame;
pub use fx::{FxParams, FxSlots};
pub use sequencer::{Sequencer, SequencerListener, StepTrigger};
pub use voice::{Voice, VoiceOrigin, MAX_PITCH, MIN_PITCH};
pub use voice_pool::{VoiceId, VoicePool};
