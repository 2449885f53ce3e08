use crate::{
    fixed,
    mixer::Mixer,
    output::{IdleLevel, OutputPin},
};
use thiserror::Error;

/// Upper bound on simultaneous voices.
pub const MAX_POLYPHONY: usize = 32;

/// Number of GPIO pins that can carry PWM audio.
pub const GPIO_PIN_COUNT: usize = 32;

/// GPIO driving the on-board piezo buzzer.
pub const PIEZO_PIN: u8 = 23;

/// GPIO driving the line-level audio jack.
pub const AUDIO_JACK_PIN: u8 = 25;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("polyphony must be between 1 and 32, got {0}")]
    Polyphony(u8),
    #[error("audio resolution must be between 2 and 16 bits, got {0}")]
    AudioBits(u8),
    #[error("the sample interval must be at least one microsecond")]
    SampleInterval,
    #[error("the output sample rate must be above zero")]
    SampleRate,
    #[error("the command queue must hold at least one command")]
    QueueLength,
    #[error("GPIO {0} cannot carry audio")]
    Pin(u8),
    #[error("GPIO {0} is listed more than once")]
    DuplicatePin(u8),
}

/// Settings fixed for the lifetime of a synth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthConfig {
    /// Number of voices, which is also the number of channel ids.
    pub polyphony: u8,
    /// PWM resolution. Output levels range over `0..2^audio_bits`.
    pub audio_bits: u8,
    /// Length of one sample period in microseconds.
    pub sample_interval_us: u32,
    /// Exact rate of an output device that polls the engine, when it is not
    /// a whole number of microseconds per sample. Pitches follow this rate.
    pub device_rate_hz: Option<u32>,
    /// Capacity of the command queue.
    pub command_queue_len: usize,
    /// Pins driven by the mixer.
    pub pins: Vec<OutputPin>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            polyphony: 16,
            audio_bits: 9,
            sample_interval_us: 37,
            device_rate_hz: None,
            command_queue_len: 64,
            pins: vec![
                OutputPin::new(PIEZO_PIN, IdleLevel::Ground),
                OutputPin::new(AUDIO_JACK_PIN, IdleLevel::Neutral),
            ],
        }
    }
}

impl SynthConfig {
    pub fn with_polyphony(mut self, polyphony: u8) -> Self {
        self.polyphony = polyphony;
        self
    }

    pub fn with_audio_bits(mut self, audio_bits: u8) -> Self {
        self.audio_bits = audio_bits;
        self
    }

    pub fn with_sample_interval_us(mut self, sample_interval_us: u32) -> Self {
        self.sample_interval_us = sample_interval_us;
        self
    }

    pub fn with_device_rate_hz(mut self, device_rate_hz: u32) -> Self {
        self.device_rate_hz = Some(device_rate_hz);
        self
    }

    pub fn with_command_queue_len(mut self, command_queue_len: usize) -> Self {
        self.command_queue_len = command_queue_len;
        self
    }

    pub fn with_pins(mut self, pins: Vec<OutputPin>) -> Self {
        self.pins = pins;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polyphony == 0 || self.polyphony as usize > MAX_POLYPHONY {
            return Err(ConfigError::Polyphony(self.polyphony));
        }
        if !(2..=16).contains(&self.audio_bits) {
            return Err(ConfigError::AudioBits(self.audio_bits));
        }
        if self.sample_interval_us == 0 {
            return Err(ConfigError::SampleInterval);
        }
        if self.device_rate_hz == Some(0) {
            return Err(ConfigError::SampleRate);
        }
        if self.command_queue_len == 0 {
            return Err(ConfigError::QueueLength);
        }
        for (i, pin) in self.pins.iter().enumerate() {
            if pin.gpio as usize >= GPIO_PIN_COUNT {
                return Err(ConfigError::Pin(pin.gpio));
            }
            if self.pins[..i].iter().any(|other| other.gpio == pin.gpio) {
                return Err(ConfigError::DuplicatePin(pin.gpio));
            }
        }
        Ok(())
    }

    /// The level that represents silence: half scale, rounded down.
    pub fn neutral_level(&self) -> u16 {
        Mixer::new(self.audio_bits).neutral()
    }

    pub fn max_level(&self) -> u16 {
        Mixer::new(self.audio_bits).max()
    }

    pub fn sample_rate_hz(&self) -> f64 {
        match self.device_rate_hz {
            Some(rate) => rate as f64,
            None => fixed::sample_rate_hz(self.sample_interval_us),
        }
    }

    /// Phase increment that plays `frequency_hz` at this configuration's rate.
    pub fn increment(&self, frequency_hz: f64) -> u32 {
        match self.device_rate_hz {
            Some(rate) => fixed::frequency_to_increment_at_rate(frequency_hz, rate),
            None => fixed::frequency_to_increment(frequency_hz, self.sample_interval_us),
        }
    }
}
