//! Stereo frame type.

/// A stereo audio frame (16-bit integer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: i16) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Saturate an i32 mono sum into a frame.
    #[inline]
    pub fn saturating_mono(value: i32) -> Self {
        Self::mono(saturate(value))
    }

    /// Pairs of an interleaved stereo buffer as frames; a trailing odd sample is ignored.
    pub fn from_interleaved(samples: &[i16]) -> impl Iterator<Item = Frame> + '_ {
        samples.chunks_exact(2).map(|c| Frame {
            left: c[0],
            right: c[1],
        })
    }
}

/// Clamp an i32 accumulator to the i16 range.
#[inline]
pub(crate) fn saturate(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
