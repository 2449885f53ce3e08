use std::fmt;

/// Identifies a physical key (or MIDI note) held down by the player.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyId(pub u16);

impl From<u8> for KeyId {
    fn from(value: u8) -> Self {
        Self(value as u16)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key {}", self.0)
    }
}

/// MIDI controller number of the modulation wheel.
const MOD_WHEEL: u8 = 1;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum KeyEvent {
    Press { key: KeyId, velocity: u8 },
    Release { key: KeyId },
    PitchBend { value: u16 },
    Modulation { value: u8 },
    Invalid,
}

impl KeyEvent {
    /// Decodes a raw MIDI message. Channels are ignored, and a note-on with
    /// zero velocity counts as a release.
    pub fn from_midi(data: &[u8]) -> Self {
        match *data {
            [0x80..=0x8f, note, _] | [0x90..=0x9f, note, 0] => KeyEvent::Release { key: note.into() },
            [0x90..=0x9f, note, velocity] => KeyEvent::Press {
                key: note.into(),
                velocity,
            },
            [0xb0..=0xbf, MOD_WHEEL, value] => KeyEvent::Modulation { value },
            [0xe0..=0xef, lsb, msb] => KeyEvent::PitchBend {
                value: lsb as u16 | ((msb as u16) << 7),
            },
            _ => KeyEvent::Invalid,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, KeyEvent::Invalid)
    }
}
