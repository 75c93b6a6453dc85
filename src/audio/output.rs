use crate::audio::buffer::AudioRingBuffer;
use crate::audio::scheduler::PlaybackClock;
use crate::{ParlaError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Speaker output for synthesized tutor audio.
///
/// Pulls scheduled samples from the shared ring buffer and renders silence
/// when it runs dry. Every rendered frame advances the playback clock the
/// scheduler measures start times against, whether or not real audio was
/// available.
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    is_playing: Arc<Mutex<bool>>,
}

impl AudioOutput {
    /// Create a new audio output at the service's playback rate
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| ParlaError::DeviceError("No output device available".into()))?;

        info!(
            "Using output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported = device
            .supported_output_configs()
            .map_err(|e| ParlaError::DeviceError(format!("Failed to query output configs: {}", e)))?
            .find(|c| {
                c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| {
                ParlaError::DeviceError(format!("No output config supports {}Hz", sample_rate))
            })?;

        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();

        Ok(Self {
            device,
            config,
            stream: None,
            is_playing: Arc::new(Mutex::new(false)),
        })
    }

    /// Get the sample rate of the output stream
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Start rendering from the queue, advancing `clock` per frame
    pub fn start_playback(&mut self, queue: AudioRingBuffer, clock: PlaybackClock) -> Result<()> {
        if *self.is_playing.lock() {
            warn!("Already playing");
            return Ok(());
        }

        let channels = self.config.channels as usize;
        let is_playing = Arc::clone(&self.is_playing);

        let err_fn = |err| {
            error!("Audio output stream error: {}", err);
        };

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;

                    if !*is_playing.lock() {
                        data.fill(0.0);
                        clock.advance(frames as u64);
                        return;
                    }

                    let mut mono = vec![0.0f32; frames];
                    queue.read_into(&mut mono);

                    for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }

                    clock.advance(frames as u64);
                },
                err_fn,
                None,
            )
            .map_err(|e| {
                ParlaError::DeviceError(format!("Failed to build output stream: {}", e))
            })?;

        stream
            .play()
            .map_err(|e| ParlaError::DeviceError(format!("Failed to start output stream: {}", e)))?;

        *self.is_playing.lock() = true;
        self.stream = Some(stream);

        info!("Started audio playback");
        Ok(())
    }

    /// Stop rendering and release the device stream
    pub fn stop_playback(&mut self) {
        *self.is_playing.lock() = false;

        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Stopped audio playback");
        }
    }

    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        *self.is_playing.lock()
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop_playback();
    }
}
