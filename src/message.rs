//! Commands sent from the control side to the audio engine.

use crate::{
    voice::{EnvelopeParams, VoiceId},
    waveform::{Harmonics, LinearShape, Wavetable},
};
use basedrop::{Handle, Shared};
use std::{fmt, ops::Deref};

/// Bit flags describing what a command carries.
pub mod flags {
    pub const NOTE_OFF: u8 = 0;
    pub const NOTE_ON: u8 = 1;
    pub const UPDATE_PITCH: u8 = 2;
    pub const UPDATE_VOLUME: u8 = 4;
    pub const UPDATE_WAVEFORM: u8 = 8;
    /// Waveform update that leaves the envelope alone.
    pub const SHAPE_ONLY: u8 = 16;
    pub const PIN_ON: u8 = 32;
    pub const PIN_OFF: u8 = 64;
}

/// An immutable wavetable that can be handed to the audio thread.
///
/// The voice copies the contents on receipt. When the last reference is
/// dropped on the audio thread, the memory is freed later by the collector
/// that created it.
#[derive(Clone)]
pub struct TableRef(Shared<Wavetable>);

impl TableRef {
    pub fn new(handle: &Handle, table: Wavetable) -> Self {
        Self(Shared::new(handle, table))
    }
}

impl Deref for TableRef {
    type Target = Wavetable;

    fn deref(&self) -> &Wavetable {
        &self.0
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TableRef").field(&&self.0[..8]).finish()
    }
}

#[derive(Clone, Debug)]
pub enum WaveformSource {
    Table(TableRef),
    Linear(LinearShape),
    Harmonic(Harmonics),
}

#[derive(Clone, Debug)]
pub struct WaveformUpdate {
    pub source: WaveformSource,
    /// New envelope timing, or `None` to keep the current one.
    pub envelope: Option<EnvelopeParams>,
}

impl WaveformUpdate {
    pub fn new(source: WaveformSource, envelope: Option<EnvelopeParams>) -> Self {
        Self { source, envelope }
    }

    /// Reshapes a procedural wave without touching the envelope, as needed
    /// when a frequency-dependent shape follows a pitch change.
    pub fn shape_only(shape: LinearShape) -> Self {
        Self::new(WaveformSource::Linear(shape), None)
    }
}

/// Parameter changes for one voice. Absent fields are left unchanged.
#[derive(Clone, Debug, Default)]
pub struct VoiceUpdate {
    /// Phase increment per sample.
    pub pitch: Option<u32>,
    pub volume: Option<u8>,
    pub waveform: Option<WaveformUpdate>,
}

impl VoiceUpdate {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_pitch(mut self, increment: u32) -> Self {
        self.pitch = Some(increment);
        self
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_waveform(mut self, waveform: WaveformUpdate) -> Self {
        self.waveform = Some(waveform);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pitch.is_none() && self.volume.is_none() && self.waveform.is_none()
    }

    pub fn flags(&self) -> u8 {
        let mut bits = 0;
        if self.pitch.is_some() {
            bits |= flags::UPDATE_PITCH;
        }
        if self.volume.is_some() {
            bits |= flags::UPDATE_VOLUME;
        }
        match &self.waveform {
            Some(WaveformUpdate { envelope: Some(_), .. }) => bits |= flags::UPDATE_WAVEFORM,
            Some(WaveformUpdate { envelope: None, .. }) => bits |= flags::UPDATE_WAVEFORM | flags::SHAPE_ONLY,
            None => {}
        }
        bits
    }
}

#[derive(Clone, Debug)]
pub enum SynthCommand {
    /// Applies `update`, then starts the voice's attack.
    NoteOn { voice: VoiceId, update: VoiceUpdate },
    /// Starts the voice's release.
    NoteOff { voice: VoiceId },
    /// Changes parameters without touching the envelope phase.
    Update { voice: VoiceId, update: VoiceUpdate },
    /// Enables PWM output on a GPIO pin.
    PinOn { pin: u8 },
    /// Disables PWM output on a GPIO pin.
    PinOff { pin: u8 },
}

impl SynthCommand {
    /// The voice this command targets, if any.
    pub fn voice(&self) -> Option<VoiceId> {
        match self {
            SynthCommand::NoteOn { voice, .. }
            | SynthCommand::NoteOff { voice }
            | SynthCommand::Update { voice, .. } => Some(*voice),
            SynthCommand::PinOn { .. } | SynthCommand::PinOff { .. } => None,
        }
    }

    pub fn flags(&self) -> u8 {
        match self {
            SynthCommand::NoteOn { update, .. } => flags::NOTE_ON | update.flags(),
            SynthCommand::NoteOff { .. } => flags::NOTE_OFF,
            SynthCommand::Update { update, .. } => update.flags(),
            SynthCommand::PinOn { .. } => flags::PIN_ON,
            SynthCommand::PinOff { .. } => flags::PIN_OFF,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::waveform::{LinearWave, SINE};
    use basedrop::Collector;

    #[test]
    fn test_flags() {
        let collector = Collector::new();
        let voice = VoiceId::new(3).unwrap();
        let full = VoiceUpdate::new()
            .with_pitch(1000)
            .with_volume(200)
            .with_waveform(WaveformUpdate::new(
                WaveformSource::Table(TableRef::new(&collector.handle(), SINE)),
                Some(EnvelopeParams::default()),
            ));
        let on = SynthCommand::NoteOn { voice, update: full };
        assert_eq!(on.flags(), 0b1111);
        assert_eq!(on.voice(), Some(voice));

        let off = SynthCommand::NoteOff { voice };
        assert_eq!(off.flags(), flags::NOTE_OFF);

        let reshape = SynthCommand::Update {
            voice,
            update: VoiceUpdate::new()
                .with_pitch(5)
                .with_waveform(WaveformUpdate::shape_only(LinearShape::new(LinearWave::Hybrid, 300.0, 0))),
        };
        assert_eq!(reshape.flags(), flags::UPDATE_PITCH | flags::UPDATE_WAVEFORM | flags::SHAPE_ONLY);

        assert_eq!(SynthCommand::PinOn { pin: 25 }.flags(), flags::PIN_ON);
        assert_eq!(SynthCommand::PinOff { pin: 25 }.voice(), None);
    }

    #[test]
    fn test_empty_update() {
        assert!(VoiceUpdate::new().is_empty());
        assert_eq!(VoiceUpdate::new().flags(), 0);
        assert!(!VoiceUpdate::new().with_volume(0).is_empty());
    }

    #[test]
    fn test_table_ref_shares_contents() {
        let mut collector = Collector::new();
        let table = TableRef::new(&collector.handle(), SINE);
        let copy = table.clone();
        assert_eq!(*copy, SINE);
        drop(table);
        drop(copy);
        collector.collect();
    }
}
