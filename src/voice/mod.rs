pub use self::envelope::{AdsrEnvelope, AdsrPhase, EnvelopeParams};
pub use self::oscillator::{Oscillator, Waveform};
use crate::message::{VoiceUpdate, WaveformSource};
use std::{fmt, num::NonZeroU8};

mod envelope;
mod oscillator;

/// Largest value a single voice can produce from [`Voice::next_sample`].
/// The most negative is one lower, from rounding towards negative infinity.
pub const VOICE_PEAK: i32 = (127 * 255 * 255) >> 8;

/// Identifies a voice slot. Ids are numbered from 1 up to the polyphony.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct VoiceId(NonZeroU8);

impl VoiceId {
    pub const fn new(id: u8) -> Option<Self> {
        match NonZeroU8::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    pub const fn get(self) -> u8 {
        self.0.get()
    }

    /// Zero-based position of the voice in the voice array.
    pub const fn index(self) -> usize {
        self.0.get() as usize - 1
    }

    pub(crate) fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index + 1).ok().and_then(Self::new)
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One synthesis channel: an oscillator shaped by an envelope and scaled by a volume.
#[derive(Clone, Copy, Debug)]
pub struct Voice {
    id: VoiceId,
    oscillator: Oscillator,
    envelope: AdsrEnvelope,
    volume: u8,
}

impl Voice {
    pub fn new(id: VoiceId) -> Self {
        Self {
            id,
            oscillator: Oscillator::new(),
            envelope: AdsrEnvelope::default(),
            volume: 0,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn update_pitch(&mut self, increment: u32) {
        self.oscillator.set_increment(increment);
    }

    pub fn update_volume(&mut self, volume: u8) {
        self.volume = volume;
    }

    /// Installs a new waveform. Table contents are copied into the voice, so the
    /// caller's table can be dropped or reused straight away. Passing `None` for
    /// `envelope` keeps the current timing.
    pub fn update_waveform(&mut self, source: &WaveformSource, envelope: Option<EnvelopeParams>) {
        match source {
            WaveformSource::Table(table) => self.oscillator.load_table(table),
            WaveformSource::Linear(shape) => self.oscillator.set_waveform(Waveform::Linear(*shape)),
            WaveformSource::Harmonic(harmonics) => self.oscillator.set_waveform(Waveform::Harmonic(*harmonics)),
        }
        if let Some(params) = envelope {
            self.envelope.set_params(params);
        }
    }

    /// Applies whichever fields of `update` are present.
    pub fn apply(&mut self, update: &VoiceUpdate) {
        if let Some(increment) = update.pitch {
            self.update_pitch(increment);
        }
        if let Some(volume) = update.volume {
            self.update_volume(volume);
        }
        if let Some(waveform) = &update.waveform {
            self.update_waveform(&waveform.source, waveform.envelope);
        }
    }

    pub fn note_on(&mut self) {
        self.envelope.trigger();
    }

    pub fn note_off(&mut self) {
        self.envelope.release();
    }

    /// Produces the next sample, advancing the oscillator and envelope.
    ///
    /// An idle voice returns 0 without advancing. A silent (volume 0) voice
    /// still runs its envelope so it reaches `Off` on schedule.
    #[inline]
    pub fn next_sample(&mut self) -> i32 {
        if !self.envelope.is_active() {
            return 0;
        }
        let level = self.envelope.process();
        if self.volume == 0 {
            return 0;
        }
        let raw = self.oscillator.process();
        (raw as i32 * self.volume as i32 * level as i32) >> 8
    }

    pub fn phase(&self) -> AdsrPhase {
        self.envelope.phase()
    }

    pub fn level(&self) -> u8 {
        self.envelope.level()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn oscillator(&self) -> &Oscillator {
        &self.oscillator
    }

    pub fn envelope_params(&self) -> EnvelopeParams {
        self.envelope.params()
    }

    /// Whether the envelope is in any phase other than `Off`.
    pub fn is_sounding(&self) -> bool {
        self.envelope.is_active()
    }

    /// Whether the voice contributes to the mix.
    pub fn is_audible(&self) -> bool {
        self.is_sounding() && self.volume > 0
    }
}
