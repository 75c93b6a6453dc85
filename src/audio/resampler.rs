use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use crate::{ParlaError, Result};

/// Chunk size fed to the inner resampler per pass
const CHUNK_FRAMES: usize = 1024;

/// Streaming mono resampler bridging the capture device rate and the
/// 16 kHz rate the wire expects.
///
/// Input arrives in arbitrary-size blocks from the capture callback;
/// leftover samples smaller than a resampler chunk are carried over to
/// the next call.
pub struct AudioResampler {
    inner: SincFixedIn<f32>,
    pending: Vec<f32>,
    input_rate: u32,
    output_rate: u32,
}

impl AudioResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };

        let inner = SincFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            2.0,
            params,
            CHUNK_FRAMES,
            1,
        )
        .map_err(|e| {
            ParlaError::AudioProcessingError(format!("Failed to create resampler: {}", e))
        })?;

        debug!("Resampler created: {}Hz -> {}Hz", input_rate, output_rate);

        Ok(Self {
            inner,
            pending: Vec::with_capacity(CHUNK_FRAMES * 2),
            input_rate,
            output_rate,
        })
    }

    /// Feed input samples, returning whatever output is ready
    pub fn resample(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }

            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let processed = self
                .inner
                .process(&[chunk], None)
                .map_err(|e| ParlaError::AudioProcessingError(format!("Resample failed: {}", e)))?;
            output.extend_from_slice(&processed[0]);
        }

        Ok(output)
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}
