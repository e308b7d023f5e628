//! Borrowed sample data.

/// A non-owning view over 16-bit signed mono sample data.
///
/// The engine never owns sample memory; an external sample store keeps the
/// data alive for `'a`. Replacing a pad's view while voices still play the
/// old one is only meaningful after those voices have been stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleView<'a> {
    data: &'a [i16],
}

impl<'a> SampleView<'a> {
    /// Wrap a slice of sample data.
    pub const fn new(data: &'a [i16]) -> Self {
        Self { data }
    }

    /// Wrap the first `length` samples of `data` (clamped to the slice).
    pub fn with_length(data: &'a [i16], length: usize) -> Self {
        let length = length.min(data.len());
        Self { data: &data[..length] }
    }

    /// Length in samples.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the view holds no samples.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at `pos`, or silence past the end.
    #[inline]
    pub fn get(&self, pos: usize) -> i16 {
        self.data.get(pos).copied().unwrap_or(0)
    }

    /// Linearly interpolated value at a 48.16 fixed-point position.
    #[inline]
    pub fn get_interpolated(&self, pos_fixed: u64) -> i16 {
        let idx = (pos_fixed >> 16) as usize;
        self.interpolate(pos_fixed, idx + 1)
    }

    /// Interpolated value inside a loop over `[loop_start, loop_end)`.
    ///
    /// The last frame of the loop blends toward `loop_start` rather than
    /// the sample after `loop_end`.
    #[inline]
    pub fn get_interpolated_looped(&self, pos_fixed: u64, loop_start: u32, loop_end: u32) -> i16 {
        let idx = (pos_fixed >> 16) as usize;
        let next = if idx + 1 == loop_end as usize {
            loop_start as usize
        } else {
            idx + 1
        };
        self.interpolate(pos_fixed, next)
    }

    #[inline]
    fn interpolate(&self, pos_fixed: u64, next: usize) -> i16 {
        let idx = (pos_fixed >> 16) as usize;
        let frac = (pos_fixed & 0xFFFF) as i64;

        let a = self.get(idx) as i64;
        if frac == 0 {
            return a as i16;
        }
        let b = match self.data.get(next) {
            Some(&b) => b as i64,
            None => a,
        };

        (a + (((b - a) * frac) >> 16)) as i16
    }

    /// The underlying slice.
    pub fn as_slice(&self) -> &'a [i16] {
        self.data
    }
}
