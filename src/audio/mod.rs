pub mod backend;
pub mod buffer;
pub mod codec;
pub mod graph;
pub mod mixer;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod resampler;

pub use backend::{AudioBackend, ContextState, OfflineBackend, RenderDriver};
pub use buffer::AudioBuffer;
pub use codec::{base64_to_bytes, bytes_to_base64, decode_compressed_audio, decode_raw_pcm};
pub use graph::{MixGraph, SharedGraph, VoiceEnd, VoiceId};
pub use mixer::{AudioMixer, ChannelHandle, ChannelKind};
#[cfg(feature = "audio-io")]
pub use output::DeviceBackend;
pub use resampler::{prepare_for_context, AudioResampler};
