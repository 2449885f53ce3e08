use super::PwmOutput;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::{
    fs::File,
    io::{BufWriter, Seek, Write},
    path::Path,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("could not write WAV data: {0}")]
    Wav(#[from] hound::Error),
}

/// Records one PWM pin to a mono 16-bit WAV stream.
pub struct WavOutput<W: Write + Seek> {
    pin: u8,
    neutral: i32,
    shift: u8,
    writer: WavWriter<W>,
    /// The first write failure, reported by [`WavOutput::finalize`].
    error: Option<hound::Error>,
}

impl WavOutput<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, pin: u8, audio_bits: u8, sample_rate: u32) -> Result<Self, RenderError> {
        let writer = WavWriter::create(path, wav_spec(sample_rate))?;
        Ok(Self::with_writer(writer, pin, audio_bits))
    }
}

impl<W: Write + Seek> WavOutput<W> {
    pub fn new(writer: W, pin: u8, audio_bits: u8, sample_rate: u32) -> Result<Self, RenderError> {
        let writer = WavWriter::new(writer, wav_spec(sample_rate))?;
        Ok(Self::with_writer(writer, pin, audio_bits))
    }

    fn with_writer(writer: WavWriter<W>, pin: u8, audio_bits: u8) -> Self {
        let audio_bits = audio_bits.clamp(2, 16);
        Self {
            pin,
            neutral: (1 << (audio_bits - 1)) - 1,
            shift: 16 - audio_bits,
            writer,
            error: None,
        }
    }

    /// Number of samples written so far.
    pub fn len(&self) -> u32 {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the header and flushes the stream.
    pub fn finalize(self) -> Result<(), RenderError> {
        if let Some(err) = self.error {
            return Err(err.into());
        }
        self.writer.finalize()?;
        Ok(())
    }
}

impl<W: Write + Seek> PwmOutput for WavOutput<W> {
    fn set_level(&mut self, pin: u8, level: u16) {
        if pin != self.pin || self.error.is_some() {
            return;
        }
        let sample = ((level as i32 - self.neutral) << self.shift).clamp(i16::MIN as i32, i16::MAX as i32);
        if let Err(err) = self.writer.write_sample(sample as i16) {
            self.error = Some(err);
        }
    }
}

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}
