pub mod allocator;
pub mod channel;
pub mod config;
pub mod control;
pub mod engine;
pub mod fixed;
pub mod key;
pub mod message;
pub mod mixer;
pub mod note;
pub mod output;
pub mod patch;
pub mod voice;
pub mod waveform;

pub use config::SynthConfig;
pub use control::{create_synth, SynthController};
pub use engine::AudioEngine;
