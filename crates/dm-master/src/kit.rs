//! Sample kits: a synthesized default set and WAV loading.
//!
//! Kit buffers are leaked on load so voices can borrow them for `'static`
//! from the audio thread. Replaced buffers are never freed: memory grows with
//! every distinct sample loaded over the life of the process. Loading the same
//! data onto a pad again reuses its existing buffer.

use std::f32::consts::TAU;
use std::io::Read;
use std::path::Path;

use dm_ir::{NUM_PADS, SAMPLE_RATE};
use thiserror::Error;

/// Names of the synthesized sounds on pads 0-7.
pub const PAD_NAMES: [&str; 8] = [
    "kick",
    "snare",
    "closed hat",
    "open hat",
    "clap",
    "rim",
    "low tom",
    "high tom",
];

const PEAK: f32 = 0.9 * 32767.0;

#[derive(Debug, Error)]
pub enum KitError {
    #[error("pad {0} out of range")]
    InvalidPad(usize),
    #[error("sample for pad {0} is empty")]
    Empty(usize),
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

/// Sample data for each pad.
///
/// See the module docs for the lifetime of pad buffers.
#[derive(Clone, Copy, Debug, Default)]
pub struct Kit {
    pads: [Option<&'static [i16]>; NUM_PADS],
}

impl Kit {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in eight-piece kit on pads 0-7.
    pub fn synthesized() -> Self {
        let mut rng = fastrand::Rng::with_seed(0x0808);
        let sounds = [
            kick(),
            snare(&mut rng),
            hat(&mut rng, 0.08, 60.0),
            hat(&mut rng, 0.4, 8.0),
            clap(&mut rng),
            rim(&mut rng),
            tom(95.0),
            tom(150.0),
        ];
        let mut kit = Self::empty();
        for (pad, data) in sounds.into_iter().enumerate() {
            kit.pads[pad] = Some(leak(data));
        }
        kit
    }

    /// Put sample data on a pad.
    ///
    /// The pad's previous buffer stays allocated; identical data keeps it.
    pub fn set(&mut self, pad: usize, data: Vec<i16>) -> Result<(), KitError> {
        if pad >= NUM_PADS {
            return Err(KitError::InvalidPad(pad));
        }
        if data.is_empty() {
            return Err(KitError::Empty(pad));
        }
        if self.pads[pad] == Some(data.as_slice()) {
            return Ok(());
        }
        self.pads[pad] = Some(leak(data));
        Ok(())
    }

    /// Load a WAV file onto a pad (downmixed to mono, resampled to 44.1 kHz).
    ///
    /// Reloading an unchanged file does not allocate a new pad buffer.
    pub fn load_wav(&mut self, pad: usize, path: impl AsRef<Path>) -> Result<(), KitError> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path)?;
        let data = decode(reader)?;
        log::info!("pad {}: {} ({} frames)", pad, path.display(), data.len());
        self.set(pad, data)
    }

    pub fn clear(&mut self, pad: usize) {
        if let Some(slot) = self.pads.get_mut(pad) {
            *slot = None;
        }
    }

    pub fn get(&self, pad: usize) -> Option<&'static [i16]> {
        self.pads.get(pad).copied().flatten()
    }

    /// Loaded pads in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'static [i16])> + '_ {
        self.pads
            .iter()
            .enumerate()
            .filter_map(|(pad, data)| data.map(|d| (pad, d)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn leak(data: Vec<i16>) -> &'static [i16] {
    Box::leak(data.into_boxed_slice())
}

/// Decode WAV data from any reader into 44.1 kHz mono i16.
pub fn decode_wav<R: Read>(reader: R) -> Result<Vec<i16>, KitError> {
    decode(hound::WavReader::new(reader)?)
}

fn decode<R: Read>(mut reader: hound::WavReader<R>) -> Result<Vec<i16>, KitError> {
    let spec = reader.spec();
    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let shift = spec.bits_per_sample as i32 - 16;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| scale_int(v, shift)))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v * 32767.0).clamp(-32768.0, 32767.0) as i16))
            .collect::<Result<_, _>>()?,
    };
    let mono = downmix(&interleaved, spec.channels.max(1) as usize);
    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

fn scale_int(value: i32, shift: i32) -> i16 {
    let v = if shift >= 0 { value >> shift } else { value << -shift };
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn downmix(interleaved: &[i16], channels: usize) -> Vec<i16> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / channels as i32) as i16)
        .collect()
}

/// Linear-interpolation resampler.
fn resample(data: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || from == 0 || data.is_empty() {
        return data.to_vec();
    }
    let out_len = (data.len() as u64 * to as u64 / from as u64) as usize;
    let step = from as f64 / to as f64;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = pos - idx as f64;
            let a = data[idx.min(data.len() - 1)] as f64;
            let b = data[(idx + 1).min(data.len() - 1)] as f64;
            (a + (b - a) * frac) as i16
        })
        .collect()
}

// --- Synthesis ---

fn synth(seconds: f32, mut f: impl FnMut(f32) -> f32) -> Vec<i16> {
    let len = (seconds * SAMPLE_RATE as f32) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (f(t).clamp(-1.0, 1.0) * PEAK) as i16
        })
        .collect()
}

fn noise(rng: &mut fastrand::Rng) -> f32 {
    rng.f32() * 2.0 - 1.0
}

fn kick() -> Vec<i16> {
    let mut phase = 0.0f32;
    synth(0.4, |t| {
        let freq = 50.0 + 100.0 * (-t * 30.0).exp();
        phase += TAU * freq / SAMPLE_RATE as f32;
        phase.sin() * (-t * 8.0).exp()
    })
}

fn snare(rng: &mut fastrand::Rng) -> Vec<i16> {
    synth(0.25, |t| {
        0.6 * noise(rng) * (-t * 18.0).exp() + 0.4 * (TAU * 180.0 * t).sin() * (-t * 25.0).exp()
    })
}

fn hat(rng: &mut fastrand::Rng, seconds: f32, decay: f32) -> Vec<i16> {
    let mut prev = 0.0f32;
    synth(seconds, |t| {
        let n = noise(rng);
        // first difference as a crude high-pass
        let hp = (n - prev) * 0.5;
        prev = n;
        hp * (-t * decay).exp()
    })
}

fn clap(rng: &mut fastrand::Rng) -> Vec<i16> {
    synth(0.3, |t| {
        let bursts: f32 = [0.0f32, 0.01, 0.02]
            .iter()
            .filter(|&&start| t >= start)
            .map(|&start| (-(t - start) * 150.0).exp())
            .sum();
        let env = (bursts + 0.5 * (-t * 20.0).exp()).min(1.0);
        noise(rng) * env
    })
}

fn rim(rng: &mut fastrand::Rng) -> Vec<i16> {
    synth(0.06, |t| {
        (TAU * 820.0 * t).sin() * (-t * 90.0).exp() + 0.2 * noise(rng) * (-t * 200.0).exp()
    })
}

fn tom(base: f32) -> Vec<i16> {
    let mut phase = 0.0f32;
    synth(0.35, |t| {
        let freq = base * (1.0 + 0.5 * (-t * 20.0).exp());
        phase += TAU * freq / SAMPLE_RATE as f32;
        phase.sin() * (-t * 9.0).exp()
    })
}
