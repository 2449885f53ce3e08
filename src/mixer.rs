use crate::config::MAX_POLYPHONY;

/// Gain applied to the summed voices, indexed by the number of audible voices.
///
/// The values are `64 / sqrt(n)` rounded, so the total loudness of `n`
/// uncorrelated voices stays roughly constant. Unity gain is 64.
#[rustfmt::skip]
pub const ATTENUATION: [u8; MAX_POLYPHONY + 1] = [
     0, 64, 45, 37, 32, 29, 26, 24, 23, 21, 20, 19, 18, 18, 17, 17,
    16, 16, 15, 15, 14, 14, 14, 13, 13, 13, 13, 12, 12, 12, 12, 11,
    11,
];

/// Bit width of an attenuated mix that reaches full scale.
const MIX_BITS: u8 = 24;

/// Gain for `voices` audible voices. Counts past the table use its last entry.
pub fn attenuation(voices: usize) -> u8 {
    ATTENUATION[voices.min(MAX_POLYPHONY)]
}

/// Turns the sum of voice samples into a PWM duty level.
#[derive(Clone, Copy, Debug)]
pub struct Mixer {
    shift: u8,
    neutral: i32,
    max: i32,
}

impl Mixer {
    /// `audio_bits` must be between 2 and 16.
    pub fn new(audio_bits: u8) -> Self {
        let audio_bits = audio_bits.clamp(2, 16);
        Self {
            shift: MIX_BITS - audio_bits,
            neutral: (1 << (audio_bits - 1)) - 1,
            max: (1 << audio_bits) - 1,
        }
    }

    pub fn neutral(&self) -> u16 {
        self.neutral as u16
    }

    pub fn max(&self) -> u16 {
        self.max as u16
    }

    /// Attenuates `sum` for `voices` audible voices and centres it on the
    /// neutral level, clipping to the output range. Returns `None` when no
    /// voice is audible, leaving each pin to fall back to its idle level.
    #[inline]
    pub fn mix_down(&self, sum: i32, voices: usize) -> Option<u16> {
        if voices == 0 {
            return None;
        }
        let scaled = (sum as i64 * attenuation(voices) as i64) >> self.shift;
        Some((self.neutral as i64 + scaled).clamp(0, self.max as i64) as u16)
    }
}
