//! Trigger events handed from control context to the audio context.

/// Where a voice trigger came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TriggerSource {
    /// Fired by the step sequencer (pattern cell or track loop).
    Sequencer,
    /// Fired by a performer hitting a pad.
    #[default]
    Live,
}

/// A request to start a sample voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Pad (and for sequencer triggers, track) index.
    pub pad: u8,
    /// MIDI-style velocity (0-127).
    pub velocity: u8,
    pub source: TriggerSource,
    /// Track volume (0-100); 100 for live triggers.
    pub track_volume: u8,
}

impl TriggerEvent {
    /// A live pad hit.
    pub const fn live(pad: u8, velocity: u8) -> Self {
        Self {
            pad,
            velocity,
            source: TriggerSource::Live,
            track_volume: 100,
        }
    }

    /// A sequencer-originated trigger with its track volume.
    pub const fn sequencer(pad: u8, velocity: u8, track_volume: u8) -> Self {
        Self {
            pad,
            velocity,
            source: TriggerSource::Sequencer,
            track_volume,
        }
    }
}
