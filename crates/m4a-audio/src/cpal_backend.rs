//! CPAL-based audio output backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use m4a_ir::{Frame, STREAM_SAMPLE_RATE};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error};

use crate::traits::{AudioError, AudioOutput};

/// CPAL-based audio output fed through a lock-free ring buffer.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default device at the engine rate. The returned consumer
    /// is handed to [`build_stream`](Self::build_stream).
    pub fn new() -> Result<(Self, HeapCons<Frame>), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let mut config: StreamConfig = device.default_output_config()?.into();
        // the callback assumes 2-channel interleaving
        config.channels = 2;
        config.sample_rate = SampleRate(STREAM_SAMPLE_RATE);

        // about 100 ms of audio
        let rb = HeapRb::<Frame>::new(STREAM_SAMPLE_RATE as usize / 10);
        let (producer, consumer) = rb.split();
        debug!(rate = STREAM_SAMPLE_RATE, "audio device opened");

        let output = Self {
            device,
            config,
            stream: None,
            producer,
            running: Arc::new(AtomicBool::new(false)),
        };
        Ok((output, consumer))
    }

    /// Build and start the audio stream.
    pub fn build_stream(&mut self, mut consumer: HeapCons<Frame>) -> Result<(), AudioError> {
        let running = self.running.clone();
        let channels = self.config.channels as usize;

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if running.load(Ordering::Relaxed) {
                    fill_interleaved(data, channels, &mut consumer);
                } else {
                    data.fill(0.0);
                }
            },
            |err| error!(%err, "audio stream error"),
            None,
        )?;

        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }
}

/// Interleave queued frames into a device buffer of `channels` samples per
/// frame. Extra channels get silence, underruns play silence.
fn fill_interleaved(data: &mut [f32], channels: usize, frames: &mut impl Consumer<Item = Frame>) {
    for chunk in data.chunks_mut(channels.max(1)) {
        let frame = frames.try_pop().unwrap_or_default();
        chunk.fill(0.0);
        chunk[0] = frame.left;
        if let Some(right) = chunk.get_mut(1) {
            *right = frame.right;
        }
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn free_frames(&self) -> usize {
        self.producer.vacant_len()
    }

    fn write(&mut self, frames: &[Frame]) -> usize {
        self.producer.push_slice(frames)
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play()?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause()?;
        }
        Ok(())
    }
}
