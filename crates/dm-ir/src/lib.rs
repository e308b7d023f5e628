//! Core data types for the drumkit engine.
//!
//! This crate holds the plain data shared between the sequencer, the
//! mixing engine and the host side: fixed capacities, pattern storage,
//! borrowed sample views, filter descriptions and trigger events.
//!
//! Everything here is `no_std` and allocation-free.

#![cfg_attr(not(feature = "std"), no_std)]

mod event;
mod filter_type;
mod pattern;
mod sample;

pub use event::{TriggerEvent, TriggerSource};
pub use filter_type::{FilterPreset, FilterType};
pub use pattern::{Cell, PatternBank};
pub use sample::SampleView;

/// Fixed system sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Maximum number of simultaneously sounding voices.
pub const MAX_VOICES: usize = 8;

/// Number of pads that can hold a sample.
pub const NUM_PADS: usize = 16;

/// Number of sequencer tracks.
pub const MAX_TRACKS: usize = 8;

/// Number of stored patterns.
pub const MAX_PATTERNS: usize = 16;

/// Steps per pattern (16th notes of one bar).
pub const STEPS_PER_PATTERN: usize = 16;

/// Number of per-track and per-pad FX slots.
pub const MAX_FX_SLOTS: usize = 8;

/// Frames per output buffer.
pub const BUFFER_FRAMES: usize = 128;

/// Number of output buffers queued in the peripheral (quad buffering).
pub const BUFFER_COUNT: usize = 4;

/// Velocity of a freshly cleared step.
pub const DEFAULT_VELOCITY: u8 = 127;

/// Velocity used when a track loop fires.
pub const LOOP_VELOCITY: u8 = 100;
