pub mod buffer;
pub mod codec;
#[cfg(feature = "audio-io")]
pub mod input;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod resampler;
pub mod scheduler;

pub use buffer::AudioRingBuffer;
pub use codec::{decode_pcm16, encode_pcm16, FrameChunker};
#[cfg(feature = "audio-io")]
pub use input::AudioInput;
#[cfg(feature = "audio-io")]
pub use output::AudioOutput;
pub use resampler::AudioResampler;
pub use scheduler::{PlaybackClock, PlaybackScheduler};

/// Sample rate the service expects for microphone audio
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio arriving from the service
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Samples per outbound frame, constant while capture is active
pub const FRAME_SAMPLES: usize = 4096;
