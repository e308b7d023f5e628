//! VoicePool: fixed-capacity voice allocation and lifecycle.

use dm_ir::MAX_VOICES;

use crate::voice::Voice;

/// Identifier for a voice slot in the pool.
pub type VoiceId = usize;

/// Fixed pool of `MAX_VOICES` voice slots.
///
/// When every slot is busy, [`VoicePool::allocate`] steals the oldest voice
/// (the one allocated first). Allocation serials are unique, so the choice is
/// deterministic.
pub struct VoicePool<'a> {
    /// Voice slots (None = free).
    slots: [Option<Voice<'a>>; MAX_VOICES],
    next_serial: u64,
}

impl<'a> Default for VoicePool<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> VoicePool<'a> {
    /// Create an empty pool.
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_VOICES],
            next_serial: 0,
        }
    }

    /// Place a voice in a free slot, or steal the oldest one.
    pub fn allocate(&mut self, mut voice: Voice<'a>) -> VoiceId {
        voice.serial = self.next_serial;
        self.next_serial += 1;

        let id = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .unwrap_or_else(|| self.find_steal_candidate());
        self.slots[id] = Some(voice);
        id
    }

    /// The busy slot holding the oldest voice.
    fn find_steal_candidate(&self) -> VoiceId {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v.serial)))
            .min_by_key(|&(_, serial)| serial)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice<'a>> {
        self.slots.get(id).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: VoiceId) -> Option<&mut Voice<'a>> {
        self.slots.get_mut(id).and_then(|s| s.as_mut())
    }

    /// Stop every voice started from `pad`.
    pub fn stop_pad(&mut self, pad: u8) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|v| v.origin.pad == pad) {
                *slot = None;
            }
        }
    }

    /// Stop every voice.
    pub fn stop_all(&mut self) {
        self.slots = [None; MAX_VOICES];
    }

    /// No-op on a free or invalid slot.
    pub fn set_pitch(&mut self, id: VoiceId, multiplier: f32) {
        if let Some(voice) = self.get_mut(id) {
            voice.set_pitch(multiplier);
        }
    }

    /// No-op on a free or invalid slot.
    pub fn set_loop(&mut self, id: VoiceId, enabled: bool, start: u32, end: u32) {
        if let Some(voice) = self.get_mut(id) {
            voice.set_loop(enabled, start, end);
        }
    }

    /// Count of occupied slots.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Render one frame of every voice, handing each rendered sample to `route`.
    ///
    /// Voices that finish are freed afterwards.
    #[inline]
    pub fn render_frame<F>(&mut self, mut route: F)
    where
        F: FnMut(&Voice<'a>, i32),
    {
        for slot in &mut self.slots {
            if let Some(voice) = slot.as_mut() {
                let value = voice.render();
                route(voice, value);
                if !voice.playing {
                    *slot = None;
                }
            }
        }
    }

    /// Iterate over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (VoiceId, &Voice<'a>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
    }
}
