//! Speech payload decoding and playback.

pub mod decode;
#[cfg(feature = "device-output")]
pub mod device;
pub mod playback;

pub use decode::{decode, AudioSession, DEFAULT_CHANNEL_COUNT, DEFAULT_SAMPLE_RATE};
#[cfg(feature = "device-output")]
pub use device::DeviceOutput;
pub use playback::{
    AudioOutput, AudioPlaybackPipeline, ClockedOutput, FinishedCallback, PlaybackHandle,
    PlaybackState,
};
