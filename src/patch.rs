use crate::{
    fixed::scale_u8,
    message::{TableRef, WaveformSource},
    voice::EnvelopeParams,
    waveform::{Harmonics, LinearShape, LinearWave},
};

/// Frequency above which notes are treated as inaudible by the loudness curve.
const HIGHEST_AUDIBLE_HZ: f64 = 13_290.0;

/// The waveform family a patch plays.
#[derive(Clone, Debug)]
pub enum Timbre {
    /// A procedural shape, recomputed for every note's frequency.
    Linear(LinearWave),
    Harmonic(Harmonics),
    /// A precomputed table shared by every note.
    Table(TableRef),
}

/// How notes should sound: timbre, envelope and loudness handling.
#[derive(Clone, Debug)]
pub struct Patch {
    pub timbre: Timbre,
    pub envelope: EnvelopeParams,
    /// Narrows procedural waves, 0-127.
    pub modulation: u8,
    /// Scales volume so notes across the range sound about equally loud.
    pub equal_loudness: bool,
    /// Full pitch-bend deflection, in cents.
    pub bend_range_cents: u32,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            timbre: Timbre::Linear(LinearWave::Hybrid),
            envelope: EnvelopeParams::default(),
            modulation: 0,
            equal_loudness: true,
            bend_range_cents: 200,
        }
    }
}

impl Patch {
    pub fn new(timbre: Timbre, envelope: EnvelopeParams) -> Self {
        Self {
            timbre,
            envelope,
            ..Default::default()
        }
    }

    /// The waveform a note at `frequency_hz` should play.
    pub fn source(&self, frequency_hz: f64) -> WaveformSource {
        match &self.timbre {
            Timbre::Linear(wave) => WaveformSource::Linear(LinearShape::new(*wave, frequency_hz, self.modulation)),
            Timbre::Harmonic(harmonics) => WaveformSource::Harmonic(*harmonics),
            Timbre::Table(table) => WaveformSource::Table(table.clone()),
        }
    }

    /// Whether the waveform has to be recomputed when the pitch moves.
    pub fn follows_pitch(&self) -> bool {
        matches!(self.timbre, Timbre::Linear(LinearWave::Hybrid))
    }

    /// Voice volume for a MIDI-style velocity (0-127) at `frequency_hz`.
    pub fn volume(&self, frequency_hz: f64, velocity: u8) -> u8 {
        let base = (velocity.min(127) as u32 * 255 / 127) as u8;
        if self.equal_loudness {
            scale_u8(base, loudness(frequency_hz))
        } else {
            base
        }
    }
}

/// A rough equal-loudness weighting: full level in the bass and treble,
/// dipping where the ear is most sensitive. Silent outside the audible range.
pub fn loudness(frequency_hz: f64) -> u8 {
    let level = if frequency_hz < 8.0 {
        0.0
    } else if frequency_hz < 200.0 {
        255.0
    } else if frequency_hz < 1500.0 {
        191.0 + (frequency_hz - 800.0).abs() / 700.0 * 64.0
    } else if frequency_hz < 5000.0 {
        127.0 + (frequency_hz - 3250.0).abs() / 1750.0 * 128.0
    } else if frequency_hz < HIGHEST_AUDIBLE_HZ {
        255.0
    } else {
        0.0
    };
    level.min(255.0) as u8
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_loudness_curve() {
        assert_eq!(loudness(4.0), 0);
        assert_eq!(loudness(100.0), 255);
        assert_eq!(loudness(800.0), 191);
        assert_eq!(loudness(3250.0), 127);
        assert_eq!(loudness(8000.0), 255);
        assert_eq!(loudness(20_000.0), 0);
        for f in (200..5000).step_by(10) {
            assert!(loudness(f as f64) >= 127);
        }
    }

    #[test]
    fn test_volume() {
        let mut patch = Patch::default();
        patch.equal_loudness = false;
        assert_eq!(patch.volume(800.0, 127), 255);
        assert_eq!(patch.volume(800.0, 200), 255);
        assert_eq!(patch.volume(800.0, 0), 0);

        patch.equal_loudness = true;
        assert_eq!(patch.volume(100.0, 127), 255);
        assert_eq!(patch.volume(800.0, 127), 191);
    }

    #[test]
    fn test_source_follows_timbre() {
        let mut patch = Patch::default();
        assert!(patch.follows_pitch());
        let WaveformSource::Linear(low) = patch.source(110.0) else {
            panic!("expected a linear shape");
        };
        let WaveformSource::Linear(high) = patch.source(3520.0) else {
            panic!("expected a linear shape");
        };
        assert_ne!(low, high);

        patch.timbre = Timbre::Harmonic(Harmonics::sine());
        assert!(!patch.follows_pitch());
        assert!(matches!(patch.source(440.0), WaveformSource::Harmonic(_)));
    }
}
