use std::sync::OnceLock;

/// A MIDI note number, 60 being middle C.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Note(pub u8);

impl From<u8> for Note {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::fmt::Debug for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Note {
    pub fn middle_c() -> Self {
        Self(60)
    }

    pub fn name(&self) -> &'static str {
        note_name(self.0)
    }

    pub fn frequency(&self) -> f64 {
        hz_from_note(self.0)
    }

    pub fn transpose(&self, offset: i8) -> Self {
        Self(self.0.saturating_add_signed(offset).min(127))
    }
}

/// Converts a MIDI note value to a frequency in Hz.
pub fn hz_from_note(note: u8) -> f64 {
    440.0 * 2.0f64.powf((note as f64 - 69.0) / 12.0)
}

/// Converts a raw 14-bit pitch bend into a ratio to be multiplied with frequency.
pub fn pitch_bend_ratio(bend: u16, range_cents: u32) -> f64 {
    const MID_POINT: f64 = 8192.0; // No bend

    let cents = (bend.min(16383) as f64 - MID_POINT) / MID_POINT * range_cents as f64;
    2.0f64.powf(cents / 1200.0)
}

fn note_name(note: u8) -> &'static str {
    static NOTE_NAMES: OnceLock<[String; 128]> = OnceLock::new();

    let names = NOTE_NAMES.get_or_init(|| {
        const NOTES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
        core::array::from_fn(|i| format!("{}{}", NOTES[i % 12], i as i32 / 12 - 1))
    });

    &names[note.min(127) as usize]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hz_from_note() {
        assert_eq!(hz_from_note(69), 440.0);
        assert_eq!(hz_from_note(69 + 12), 880.0);
        assert_eq!(hz_from_note(69 - 12), 220.0);
        assert!((Note::middle_c().frequency() - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn test_note_names() {
        assert_eq!(Note(60).name(), "C4");
        assert_eq!(Note(61).to_string(), "C#4");
        assert_eq!(Note(0).name(), "C-1");
        assert_eq!(Note(127).name(), "G9");
    }

    #[test]
    fn test_transpose() {
        assert_eq!(Note(60).transpose(12), Note(72));
        assert_eq!(Note(5).transpose(-12), Note(0));
        assert_eq!(Note(120).transpose(12), Note(127));
    }

    #[test]
    fn test_pitch_bend_ratio() {
        assert_eq!(pitch_bend_ratio(8192, 200), 1.0);
        assert!((pitch_bend_ratio(0, 1200) - 0.5).abs() < 1e-9);
        assert!((pitch_bend_ratio(16383, 200) - 2f64.powf(200.0 / 1200.0)).abs() < 1e-3);
    }
}
