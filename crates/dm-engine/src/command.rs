//! Control messages applied to the engine between buffers.

use dm_ir::FilterType;

use crate::voice_pool::VoiceId;

/// A queued engine control operation.
///
/// Commands travel through an SPSC ring to the thread that owns the engine
/// and are applied with [`AudioEngine::apply`](crate::AudioEngine::apply).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineCommand {
    TriggerLive { pad: u8, velocity: u8 },
    StopSample { pad: u8 },
    StopAll,

    SetFilterType(FilterType),
    SetFilterCutoff(f32),
    SetFilterResonance(f32),
    SetFilterGain(f32),
    SetBitDepth(u8),
    SetDistortion(f32),
    SetSampleRateReduction(u32),

    SetTrackFilter { track: u8, kind: FilterType, cutoff: f32, resonance: f32, gain: f32 },
    ClearTrackFilter { track: u8 },
    SetPadFilter { pad: u8, kind: FilterType, cutoff: f32, resonance: f32, gain: f32 },
    ClearPadFilter { pad: u8 },

    SetMasterVolume(u8),
    SetSequencerVolume(u8),
    SetLiveVolume(u8),

    SetPitch { voice: VoiceId, multiplier: f32 },
    SetLoop { voice: VoiceId, enabled: bool, start: u32, end: u32 },
}
