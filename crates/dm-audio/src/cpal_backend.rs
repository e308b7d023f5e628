//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig, SupportedBufferSize};
use dm_engine::{BusConfig, Frame, InitError, OutputBus};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::traits::{AudioError, AudioOutput};

/// CPAL-based stereo output at the engine's fixed rate.
///
/// Frames pass to the device callback through an SPSC ring holding the
/// configured buffer queue (`buffer_frames * buffer_count`).
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    /// Buffer sizes the device accepts, from its default output config.
    supported: SupportedBufferSize,
    stream: Option<Stream>,
    producer: Option<HeapProd<Frame>>,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default output device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        if let Ok(name) = device.name() {
            log::info!("audio device: {}", name);
        }
        let supported = *device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?
            .buffer_size();

        // The callback assumes 2-channel interleaving at the engine rate
        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(dm_ir::SAMPLE_RATE),
            buffer_size: BufferSize::Default,
        };

        Ok(Self {
            device,
            config,
            supported,
            stream: None,
            producer: None,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Build the device stream and start it.
    pub fn build_stream(&mut self, bus: &BusConfig) -> Result<(), AudioError> {
        let (buffer_size, device_min) = device_buffer(&self.supported, bus.buffer_frames);
        self.config.buffer_size = buffer_size;
        let capacity = ring_capacity(bus, device_min);
        log::debug!("output ring: {} frames ({:?})", capacity, self.config.buffer_size);
        let (producer, mut consumer) = HeapRb::<Frame>::new(capacity).split();

        let running = self.running.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill_device_buffer(data, channels, &running, &mut consumer);
                },
                |err| log::error!("audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        self.producer = Some(producer);
        self.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Write a single frame, spinning until the ring buffer has room.
    ///
    /// Frames are dropped while no stream is running.
    pub fn write_spin(&mut self, frame: Frame) {
        let Some(producer) = self.producer.as_mut() else {
            return;
        };
        while self.running.load(Ordering::Relaxed) && producer.try_push(frame).is_err() {
            std::hint::spin_loop();
        }
    }
}

/// Device buffer request for the engine's buffer length.
///
/// Returns the request and, when the device cannot take the engine's length,
/// the smallest callback size it reports.
fn device_buffer(supported: &SupportedBufferSize, buffer_frames: usize) -> (BufferSize, Option<usize>) {
    let frames = buffer_frames as u32;
    match *supported {
        SupportedBufferSize::Range { min, max } if (min..=max).contains(&frames) => {
            (BufferSize::Fixed(frames), None)
        }
        SupportedBufferSize::Range { min, .. } => (BufferSize::Default, Some(min as usize)),
        SupportedBufferSize::Unknown => (BufferSize::Default, None),
    }
}

/// Ring capacity in frames: the configured queue, grown only when the
/// device's callback is larger than that.
fn ring_capacity(bus: &BusConfig, device_min: Option<usize>) -> usize {
    let queued = bus.buffer_frames * bus.buffer_count;
    queued.max(device_min.unwrap_or(0)).max(1)
}

/// Device callback body: one engine frame per device frame.
fn fill_device_buffer(
    data: &mut [f32],
    channels: usize,
    running: &AtomicBool,
    consumer: &mut HeapCons<Frame>,
) {
    if !running.load(Ordering::Relaxed) {
        data.fill(0.0);
        return;
    }
    for chunk in data.chunks_mut(channels) {
        let frame = consumer.try_pop().unwrap_or_default();
        let left = frame.left as f32 / 32768.0;
        let right = frame.right as f32 / 32768.0;
        for (i, sample) in chunk.iter_mut().enumerate() {
            *sample = match i {
                0 => left,
                1 => right,
                _ => 0.0,
            };
        }
    }
}

impl OutputBus for CpalOutput {
    fn configure(&mut self, config: &BusConfig) -> Result<(), InitError> {
        self.build_stream(config).map_err(|e| {
            log::error!("output bus setup failed: {}", e);
            InitError::BusUnavailable
        })
    }

    fn write(&mut self, samples: &[i16]) {
        for frame in Frame::from_interleaved(samples) {
            self.write_spin(frame);
        }
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
