use super::PwmOutput;
use ::cpal::{traits::DeviceTrait, BuildStreamError, Device, Stream, StreamConfig};
use basedrop::Handle;
use ringbuf_basedrop as ringbuf;
use std::sync::mpsc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("could not open the output stream: {0}")]
    BuildStream(#[from] BuildStreamError),
}

/// Plays one PWM pin through a sound card, so the synth can be heard without
/// the hardware. Duty levels are converted to centred floating-point samples
/// and copied to every channel of the stream.
pub struct CpalOutput {
    pin: u8,
    neutral: f32,
    scale: f32,
    channels: usize,
    block_len: usize,
    channel: ringbuf::Producer<f32>,
    buffer: Vec<f32>,
    notify: mpsc::Receiver<()>,
}

impl CpalOutput {
    /// Opens a stream on `device`. `buffer_size` is the ring capacity in
    /// samples. Levels for pins other than `pin` are ignored.
    pub fn from_cpal(
        device: &Device,
        config: &StreamConfig,
        pin: u8,
        audio_bits: u8,
        buffer_size: usize,
        handle: &Handle,
    ) -> Result<(Self, Stream), OutputError> {
        let channels = config.channels.max(1) as usize;
        let capacity = buffer_size.max(4 * channels);
        let (tx, mut rx) = ringbuf::RingBuffer::new(capacity).split(handle);
        let (tx2, rx2) = mpsc::sync_channel(1);

        let stream = device.build_output_stream(
            config,
            move |data: &mut [f32], _| {
                let read = rx.pop_slice(data);
                // Underflow
                data[read..].fill(0.0);
                tx2.try_send(()).ok();
            },
            move |err| {
                log::error!("an error occurred on stream: {}", err);
            },
            None,
        )?;

        let half_scale = (1u32 << (audio_bits.clamp(2, 16) - 1)) as f32;
        Ok((
            Self {
                pin,
                neutral: half_scale - 1.0,
                scale: half_scale.recip(),
                channels,
                block_len: capacity / 4,
                channel: tx,
                buffer: Vec::with_capacity(capacity),
                notify: rx2,
            },
            stream,
        ))
    }

    /// Pushes buffered samples to the stream, waiting while the ring is full.
    pub fn flush(&mut self) {
        while self.channel.remaining() < self.buffer.len() {
            if self.notify.recv().is_err() {
                // The stream is gone, nobody will ever read these.
                self.buffer.clear();
                return;
            }
        }
        self.channel.push_slice(&self.buffer);
        self.buffer.clear();
    }
}

impl PwmOutput for CpalOutput {
    fn set_level(&mut self, pin: u8, level: u16) {
        if pin != self.pin {
            return;
        }
        let sample = (level as f32 - self.neutral) * self.scale;
        self.buffer.extend(std::iter::repeat(sample).take(self.channels));
        if self.buffer.len() >= self.block_len {
            self.flush();
        }
    }
}
