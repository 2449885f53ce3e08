use crate::fixed::{ramp_rate, ramp_step};

/// Envelope timing, with every duration expressed in samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EnvelopeParams {
    /// Attack time in samples.
    pub attack: u32,
    /// Decay time in samples.
    pub decay: u32,
    /// Sustain level between 0 and 255.
    pub sustain: u8,
    /// Release time in samples.
    pub release: u32,
}

impl EnvelopeParams {
    pub const fn new(attack: u32, decay: u32, sustain: u8, release: u32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Converts millisecond timings to sample counts for the given sample interval.
    pub fn from_millis(attack_ms: f64, decay_ms: f64, sustain: u8, release_ms: f64, sample_interval_us: u32) -> Self {
        let samples = |ms: f64| (ms.max(0.0) * 1000.0 / sample_interval_us.max(1) as f64).round() as u32;
        Self {
            attack: samples(attack_ms),
            decay: samples(decay_ms),
            sustain,
            release: samples(release_ms),
        }
    }
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self::new(256, 4096, 192, 2048)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdsrPhase {
    Off,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Clone, Copy, Debug)]
enum AdsrState {
    Attack {
        /// The level the attack phase started at.
        start: u8,
        /// Slope from `start` to full level.
        rate: u32,
        /// Samples elapsed in the attack phase.
        t: u32,
    },
    Decay {
        /// Samples elapsed in the decay phase.
        t: u32,
    },
    Sustain,
    Release {
        /// The level the release phase started at.
        start: u8,
        /// Slope from `start` down to silence.
        rate: u32,
        /// Samples elapsed in the release phase.
        t: u32,
    },
    Off,
}

/// A linear ADSR envelope producing an 8-bit level once per sample.
///
/// Slopes are precomputed whenever a ramp starts, so [`AdsrEnvelope::process`]
/// needs one multiply and no division. Stages of length zero are skipped.
#[derive(Clone, Copy, Debug)]
pub struct AdsrEnvelope {
    params: EnvelopeParams,
    /// Slope from full level down to the sustain level.
    decay_rate: u32,
    state: AdsrState,
    level: u8,
}

impl AdsrEnvelope {
    pub fn new(params: EnvelopeParams) -> Self {
        Self {
            params,
            decay_rate: ramp_rate(255 - params.sustain, params.decay),
            state: AdsrState::Off,
            level: 0,
        }
    }

    pub fn params(&self) -> EnvelopeParams {
        self.params
    }

    /// Replaces the timing. A ramp already in progress keeps its slope but
    /// ends according to the new stage length.
    pub fn set_params(&mut self, params: EnvelopeParams) {
        self.params = params;
        self.decay_rate = ramp_rate(255 - params.sustain, params.decay);
        if let AdsrState::Sustain = self.state {
            self.level = params.sustain;
        }
    }

    pub fn phase(&self) -> AdsrPhase {
        match self.state {
            AdsrState::Attack { .. } => AdsrPhase::Attack,
            AdsrState::Decay { .. } => AdsrPhase::Decay,
            AdsrState::Sustain => AdsrPhase::Sustain,
            AdsrState::Release { .. } => AdsrPhase::Release,
            AdsrState::Off => AdsrPhase::Off,
        }
    }

    /// The most recently produced level.
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, AdsrState::Off)
    }

    /// Starts the attack phase from the current level, so retriggering a
    /// sounding voice does not click.
    pub fn trigger(&mut self) {
        self.enter_attack(self.level);
    }

    /// Starts the release phase from the current level.
    /// Does nothing if the envelope is already releasing or off.
    pub fn release(&mut self) {
        match self.state {
            AdsrState::Release { .. } | AdsrState::Off => {}
            _ => self.enter_release(self.level),
        }
    }

    /// Advances the envelope by one sample and returns the new level.
    pub fn process(&mut self) -> u8 {
        use AdsrState::*;
        match self.state {
            Attack { start, rate, t } => {
                let t = t + 1;
                if t >= self.params.attack {
                    self.enter_decay();
                } else {
                    self.level = start.saturating_add(ramp_step(t, rate).min(255) as u8);
                    self.state = Attack { start, rate, t };
                }
            }
            Decay { t } => {
                let t = t + 1;
                if t >= self.params.decay {
                    self.enter_sustain();
                } else {
                    let span = 255 - self.params.sustain;
                    self.level = 255 - ramp_step(t, self.decay_rate).min(span as u32) as u8;
                    self.state = Decay { t };
                }
            }
            // Sustain holds until a note-off; it never falls through into the release ramp.
            Sustain => self.level = self.params.sustain,
            Release { start, rate, t } => {
                let t = t + 1;
                if t >= self.params.release {
                    self.enter_off();
                } else {
                    self.level = start - ramp_step(t, rate).min(start as u32) as u8;
                    self.state = Release { start, rate, t };
                }
            }
            Off => self.level = 0,
        }

        self.level
    }

    fn enter_attack(&mut self, start: u8) {
        if self.params.attack == 0 {
            self.enter_decay();
        } else {
            self.state = AdsrState::Attack {
                start,
                rate: ramp_rate(255 - start, self.params.attack),
                t: 0,
            };
        }
    }

    fn enter_decay(&mut self) {
        self.level = 255;
        if self.params.decay == 0 {
            self.enter_sustain();
        } else {
            self.state = AdsrState::Decay { t: 0 };
        }
    }

    fn enter_sustain(&mut self) {
        self.level = self.params.sustain;
        self.state = AdsrState::Sustain;
    }

    fn enter_release(&mut self, start: u8) {
        if self.params.release == 0 || start == 0 {
            self.enter_off();
        } else {
            self.state = AdsrState::Release {
                start,
                rate: ramp_rate(start, self.params.release),
                t: 0,
            };
        }
    }

    fn enter_off(&mut self) {
        self.level = 0;
        self.state = AdsrState::Off;
    }
}

impl Default for AdsrEnvelope {
    fn default() -> Self {
        Self::new(EnvelopeParams::default())
    }
}
