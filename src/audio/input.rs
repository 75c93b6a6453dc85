use crate::{ParlaError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Live microphone capture feeding the outbound pipeline.
///
/// Opens the default input device at the requested sample rate when the
/// device supports it, so most sessions skip resampling entirely; other
/// devices capture at their default rate and the session resamples. The
/// capture callback only downmixes and hands blocks to a channel, so it
/// never blocks on network progress.
pub struct AudioInput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    is_capturing: Arc<Mutex<bool>>,
}

impl AudioInput {
    /// Open the default input device, preferring `sample_rate`
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| ParlaError::DeviceError("No input device available".into()))?;

        info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let config = match Self::config_at(&device, sample_rate) {
            Some(config) => config,
            None => {
                let default = device.default_input_config().map_err(|e| {
                    ParlaError::DeviceError(format!("Failed to get input config: {}", e))
                })?;
                debug!(
                    "Device cannot capture at {}Hz, falling back to {}Hz",
                    sample_rate,
                    default.sample_rate().0
                );
                default.into()
            }
        };

        Ok(Self {
            device,
            config,
            stream: None,
            is_capturing: Arc::new(Mutex::new(false)),
        })
    }

    /// Find a supported input configuration at exactly the given rate
    fn config_at(device: &Device, sample_rate: u32) -> Option<StreamConfig> {
        let rate = SampleRate(sample_rate);
        device
            .supported_input_configs()
            .ok()?
            .find(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .map(|c| c.with_sample_rate(rate).config())
    }

    /// Get the sample rate capture actually runs at
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Get the number of channels
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Start capture, sending mono sample blocks to the provided channel.
    ///
    /// Send is non-blocking; if the pipeline falls behind, the block is
    /// dropped here rather than stalling the device callback.
    pub fn start_capture(&mut self, audio_tx: Sender<Vec<f32>>) -> Result<()> {
        if *self.is_capturing.lock() {
            warn!("Already capturing");
            return Ok(());
        }

        let channels = self.config.channels as usize;
        let is_capturing = Arc::clone(&self.is_capturing);

        let err_fn = |err| {
            error!("Audio input stream error: {}", err);
        };

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !*is_capturing.lock() {
                        return;
                    }

                    if let Err(e) = audio_tx.try_send(downmix(data, channels)) {
                        debug!("Dropped capture block: {}", e);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| ParlaError::DeviceError(format!("Failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| ParlaError::DeviceError(format!("Failed to start input stream: {}", e)))?;

        *self.is_capturing.lock() = true;
        self.stream = Some(stream);

        info!("Started microphone capture at {}Hz", self.sample_rate());
        Ok(())
    }

    /// Stop capture and release the device stream
    pub fn stop_capture(&mut self) {
        *self.is_capturing.lock() = false;

        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Stopped microphone capture");
        }
    }

    /// Check if currently capturing
    pub fn is_capturing(&self) -> bool {
        *self.is_capturing.lock()
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

/// Average interleaved channels down to one
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }

    let mut mono = Vec::with_capacity(data.len() / channels);
    for frame in data.chunks(channels) {
        mono.push(frame.iter().sum::<f32>() / channels as f32);
    }
    mono
}
