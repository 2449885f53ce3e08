//! Waveform descriptions and the table generators that run off the audio core.
//!
//! Per-sample evaluation ([`LinearShape::sample`], [`Harmonics::sample`]) is
//! integer-only. Table generation ([`additive`], [`LinearShape::new`]) uses
//! floating point and is meant to run once, when a timbre or pitch changes.

use itertools::Itertools;
use std::f32::consts::TAU;

/// Number of entries in a waveform table.
pub const TABLE_LEN: usize = 256;

/// One cycle of a waveform, indexed by the top 8 bits of a phase accumulator.
pub type Wavetable = [i8; TABLE_LEN];

/// Maximum number of harmonics summed by the additive oscillator.
pub const HARMONIC_LIMIT: usize = 12;

/// Lowest and highest table values produced by the generators.
const LOW: i8 = -127;
const HIGH: i8 = 127;

/// Reference sine table.
#[rustfmt::skip]
pub static SINE: Wavetable = [
       0,   3,   6,   9,  12,  16,  19,  22,  25,  28,  31,  34,  37,  40,  43,  46,
      49,  51,  54,  57,  60,  63,  65,  68,  71,  73,  76,  78,  81,  83,  85,  88,
      90,  92,  94,  96,  98, 100, 102, 104, 106, 107, 109, 111, 112, 113, 115, 116,
     117, 118, 120, 121, 122, 122, 123, 124, 125, 125, 126, 126, 126, 127, 127, 127,
     127, 127, 127, 127, 126, 126, 126, 125, 125, 124, 123, 122, 122, 121, 120, 118,
     117, 116, 115, 113, 112, 111, 109, 107, 106, 104, 102, 100,  98,  96,  94,  92,
      90,  88,  85,  83,  81,  78,  76,  73,  71,  68,  65,  63,  60,  57,  54,  51,
      49,  46,  43,  40,  37,  34,  31,  28,  25,  22,  19,  16,  12,   9,   6,   3,
       0,  -3,  -6,  -9, -12, -16, -19, -22, -25, -28, -31, -34, -37, -40, -43, -46,
     -49, -51, -54, -57, -60, -63, -65, -68, -71, -73, -76, -78, -81, -83, -85, -88,
     -90, -92, -94, -96, -98,-100,-102,-104,-106,-107,-109,-111,-112,-113,-115,-116,
    -117,-118,-120,-121,-122,-122,-123,-124,-125,-125,-126,-126,-126,-127,-127,-127,
    -127,-127,-127,-127,-126,-126,-126,-125,-125,-124,-123,-122,-122,-121,-120,-118,
    -117,-116,-115,-113,-112,-111,-109,-107,-106,-104,-102,-100, -98, -96, -94, -92,
     -90, -88, -85, -83, -81, -78, -76, -73, -71, -68, -65, -63, -60, -57, -54, -51,
     -49, -46, -43, -40, -37, -34, -31, -28, -25, -22, -19, -16, -12,  -9,  -6,  -3,
];

/// Frequencies at which the hybrid wave changes character.
pub const HYBRID_SQUARE_HZ: f64 = 220.0;
pub const HYBRID_SAW_LOW_HZ: f64 = 440.0;
pub const HYBRID_SAW_HIGH_HZ: f64 = 880.0;
pub const HYBRID_TRIANGLE_HZ: f64 = 1760.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinearWave {
    Square,
    Saw,
    Triangle,
    /// Square in the bass, saw in the middle, triangle in the treble.
    Hybrid,
}

/// A piecewise-linear cycle described by four breakpoints.
///
/// ```text
/// 127 |     B ***** C
///     |     *       *
///     |    *         *
/// -127|** A           D ***
///     0                 255
/// ```
///
/// Up to `a` the level is low, it rises until `b`, stays high until `c`,
/// falls until `d`, and is low again for the rest of the cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinearShape {
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    /// Q8 slope of the rising edge.
    rise: u16,
    /// Q8 slope of the falling edge.
    fall: u16,
}

impl LinearShape {
    /// Computes the breakpoints for `wave` played at `frequency_hz`.
    ///
    /// `modulation` (0-127) narrows the active part of the cycle, leaving the
    /// remainder at the low level.
    pub fn new(wave: LinearWave, frequency_hz: f64, modulation: u8) -> Self {
        let (model, saw_mix) = match wave {
            LinearWave::Hybrid => hybrid_blend(frequency_hz),
            other => (other, 0.0),
        };

        let duty = (127 - modulation.min(127)) as f32;
        let full = 2.0 * duty;

        // Float-to-int casts saturate, so a breakpoint below zero lands on zero.
        let (a, b, c, d) = match model {
            LinearWave::Square => {
                let c = (full - 1.0) as u8;
                (
                    (duty * (1.0 - saw_mix) - 1.0) as u8,
                    (duty * (1.0 + saw_mix)) as u8,
                    c,
                    c.saturating_add(1),
                )
            }
            LinearWave::Triangle => {
                let b = (duty * (1.0 + saw_mix)) as u8;
                (0, b, b, full as u8)
            }
            LinearWave::Saw | LinearWave::Hybrid => {
                let c = (full - 1.0) as u8;
                (0, c, c, c.saturating_add(1))
            }
        };

        Self::from_breakpoints(a, b, c, d)
    }

    /// Builds a shape from raw breakpoints. They are sorted into `a <= b <= c <= d`.
    pub fn from_breakpoints(a: u8, b: u8, c: u8, d: u8) -> Self {
        let b = b.max(a);
        let c = c.max(b);
        let d = d.max(c);
        Self {
            a,
            b,
            c,
            d,
            rise: slope(a, b),
            fall: slope(c, d),
        }
    }

    pub fn breakpoints(&self) -> [u8; 4] {
        [self.a, self.b, self.c, self.d]
    }

    /// Evaluates the shape at table position `t`.
    #[inline]
    pub fn sample(&self, t: u8) -> i8 {
        if t <= self.a {
            LOW
        } else if t < self.b {
            ramp(t - self.a, self.rise)
        } else if t <= self.c {
            HIGH
        } else if t < self.d {
            ramp(self.d - t, self.fall)
        } else {
            LOW
        }
    }

    /// Renders the shape into a full table.
    pub fn to_table(&self) -> Wavetable {
        std::array::from_fn(|i| self.sample(i as u8))
    }
}

/// Picks the model shape for a hybrid wave and how far it has morphed towards a saw.
fn hybrid_blend(frequency_hz: f64) -> (LinearWave, f32) {
    if frequency_hz < HYBRID_SAW_LOW_HZ {
        let mix = if frequency_hz > HYBRID_SQUARE_HZ {
            (frequency_hz - HYBRID_SQUARE_HZ) / (HYBRID_SAW_LOW_HZ - HYBRID_SQUARE_HZ)
        } else {
            0.0
        };
        (LinearWave::Square, mix as f32)
    } else if frequency_hz > HYBRID_SAW_HIGH_HZ {
        let mix = if frequency_hz < HYBRID_TRIANGLE_HZ {
            (HYBRID_TRIANGLE_HZ - frequency_hz) / (HYBRID_TRIANGLE_HZ - HYBRID_SAW_HIGH_HZ)
        } else {
            0.0
        };
        (LinearWave::Triangle, mix as f32)
    } else {
        (LinearWave::Saw, 0.0)
    }
}

/// Q8 slope covering the full table range between two breakpoints, exclusive.
fn slope(from: u8, to: u8) -> u16 {
    let steps = to.saturating_sub(from).saturating_sub(1);
    if steps == 0 {
        0
    } else {
        (254u32 * 256 / steps as u32) as u16
    }
}

#[inline]
fn ramp(steps: u8, slope: u16) -> i8 {
    (((steps as i32 * slope as i32) >> 8).min(254) - HIGH as i32) as i8
}

/// Harmonic amplitudes for the additive oscillator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Harmonics {
    amounts: [u8; HARMONIC_LIMIT],
    /// Q16 reciprocal of the summed amplitudes, keeping the peak within range.
    normalization: u32,
}

impl Harmonics {
    /// Creates a harmonic set from the amplitudes of the fundamental and its overtones.
    /// Amplitudes past [`HARMONIC_LIMIT`] are ignored.
    pub fn new(amounts: &[u8]) -> Self {
        let mut set = [0; HARMONIC_LIMIT];
        for (slot, &amount) in set.iter_mut().zip(amounts) {
            *slot = amount;
        }
        let sum = set.iter().map(|&a| a as u32).sum();
        Self {
            amounts: set,
            normalization: crate::fixed::reciprocal_q16(sum),
        }
    }

    /// A pure sine.
    pub fn sine() -> Self {
        Self::new(&[255])
    }

    pub fn amounts(&self) -> &[u8; HARMONIC_LIMIT] {
        &self.amounts
    }

    /// Evaluates the harmonic sum at `phase`.
    #[inline]
    pub fn sample(&self, phase: u32) -> i8 {
        let mut acc = 0i32;
        let mut harmonic_phase = 0u32;
        for &amount in &self.amounts {
            harmonic_phase = harmonic_phase.wrapping_add(phase);
            if amount != 0 {
                acc += SINE[(harmonic_phase >> 24) as usize] as i32 * amount as i32;
            }
        }
        ((acc * self.normalization as i32 + (1 << 15)) >> 16) as i8
    }
}

impl Default for Harmonics {
    fn default() -> Self {
        Self::sine()
    }
}

/// Builds a table by summing sines.
///
/// `amounts[h]` (0.0-1.0) is the level of harmonic `h + 1`, and `phases[h]` its
/// phase offset in cycles, so 0.25 gives a cosine. Missing phases are 0. The
/// result is normalized so the loudest point reaches full scale, but quiet
/// spectra are never amplified.
pub fn additive(amounts: &[f32], phases: &[f32]) -> Wavetable {
    let raw: [f32; TABLE_LEN] = std::array::from_fn(|i| {
        let t = i as f32 / TABLE_LEN as f32;
        amounts
            .iter()
            .enumerate()
            .map(|(h, amount)| {
                let phase = phases.get(h).copied().unwrap_or(0.0);
                amount * (TAU * (h + 1) as f32 * (phase + t)).sin()
            })
            .sum()
    });

    let (low, high) = raw.iter().copied().minmax().into_option().unwrap_or((0.0, 0.0));
    let peak = f32::max(-low, high).max(1.0);
    let scale = HIGH as f32 / peak;

    raw.map(|s| (s * scale).round() as i8)
}

pub const STRINGS_AMOUNTS: [f32; 10] = [0.995, 0.94, 0.425, 0.48, 0.0, 0.365, 0.04, 0.085, 0.0, 0.09];
pub const STRINGS_PHASES: [f32; 10] = [0.0, 0.25, 0.0, 0.25, 0.0, 0.25, 0.0, 0.25, 0.0, 0.25];
pub const CLARINET_AMOUNTS: [f32; 11] = [1.0, 0.0, 0.333, 0.0, 0.2, 0.0, 0.143, 0.0, 0.111, 0.0, 0.909];

/// A bowed-string timbre.
pub fn strings() -> Wavetable {
    additive(&STRINGS_AMOUNTS, &STRINGS_PHASES)
}

/// A clarinet timbre built from odd harmonics.
pub fn clarinet() -> Wavetable {
    additive(&CLARINET_AMOUNTS, &[])
}
