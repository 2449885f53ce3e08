use crate::{
    channel::CommandReceiver,
    config::SynthConfig,
    message::SynthCommand,
    mixer::Mixer,
    output::{PinBank, PwmOutput},
    voice::{Voice, VoiceId},
};
use ringbuf_basedrop as ringbuf;
use std::sync::{
    atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

/// Most commands applied in a single sample period.
pub const COMMANDS_PER_POLL: usize = 8;

/// Counters published by the audio thread for the control side to read.
#[derive(Debug, Default)]
pub struct EngineStatus {
    active_voices: AtomicUsize,
    samples: AtomicU64,
    retire_overflows: AtomicU32,
}

impl EngineStatus {
    /// Voices not in the `Off` phase as of the last sample.
    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }

    /// Sample periods processed while running.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Finished voices that could not be handed back because the retire queue was full.
    pub fn retire_overflows(&self) -> u32 {
        self.retire_overflows.load(Ordering::Relaxed)
    }
}

/// The audio side of the synth. Owns every voice and produces one output
/// level per call to [`AudioEngine::poll`], which must be made once per sample
/// period. Nothing here blocks or allocates.
pub struct AudioEngine {
    voices: Box<[Voice]>,
    commands: CommandReceiver,
    retired: ringbuf::Producer<VoiceId>,
    mixer: Mixer,
    pins: PinBank,
    running: bool,
    status: Arc<EngineStatus>,
}

impl AudioEngine {
    pub(crate) fn new(
        config: &SynthConfig,
        commands: CommandReceiver,
        retired: ringbuf::Producer<VoiceId>,
        status: Arc<EngineStatus>,
    ) -> Self {
        let voices = (0..config.polyphony as usize)
            .filter_map(VoiceId::from_index)
            .map(Voice::new)
            .collect();
        Self {
            voices,
            commands,
            retired,
            mixer: Mixer::new(config.audio_bits),
            pins: PinBank::new(&config.pins),
            running: false,
            status,
        }
    }

    /// Begins processing. Until this is called, [`AudioEngine::poll`] does nothing.
    pub fn start(&mut self) {
        if !self.running {
            log::info!("audio engine started with {} voices", self.voices.len());
        }
        self.running = true;
    }

    /// Pauses processing. Voices keep their state and pending commands stay queued.
    pub fn stop(&mut self) {
        if self.running {
            log::info!("audio engine stopped");
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Runs one sample period: applies pending commands, advances every
    /// sounding voice, mixes and writes the result to the output pins.
    ///
    /// Returns the mixed level, which is the neutral level when no voice is
    /// audible, or `None` if the engine is stopped.
    pub fn poll(&mut self, output: &mut impl PwmOutput) -> Option<u16> {
        if !self.running {
            return None;
        }

        for _ in 0..COMMANDS_PER_POLL {
            let Some(command) = self.commands.try_receive() else {
                break;
            };
            self.apply(command);
        }

        let mut sum = 0;
        let mut audible = 0;
        let mut sounding = 0;
        for voice in self.voices.iter_mut() {
            if !voice.is_sounding() {
                continue;
            }
            let contributes = voice.is_audible();
            let sample = voice.next_sample();
            if contributes {
                sum += sample;
                audible += 1;
            }
            if voice.is_sounding() {
                sounding += 1;
            } else {
                retire(&mut self.retired, &self.status, voice.id());
            }
        }

        let level = self.mixer.mix_down(sum, audible);
        self.pins.write(output, level, self.mixer.neutral());

        self.status.active_voices.store(sounding, Ordering::Relaxed);
        self.status.samples.fetch_add(1, Ordering::Relaxed);

        Some(level.unwrap_or(self.mixer.neutral()))
    }

    /// Polls `samples` times in a row, for offline rendering.
    pub fn render(&mut self, output: &mut impl PwmOutput, samples: usize) {
        for _ in 0..samples {
            self.poll(output);
        }
    }

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(id.index())
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Number of voices currently sounding.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_sounding()).count()
    }

    pub fn is_pin_enabled(&self, gpio: u8) -> bool {
        self.pins.is_enabled(gpio)
    }

    fn apply(&mut self, command: SynthCommand) {
        match command {
            SynthCommand::NoteOn { voice, update } => {
                if let Some(v) = self.voices.get_mut(voice.index()) {
                    v.apply(&update);
                    v.note_on();
                }
            }
            SynthCommand::NoteOff { voice } => {
                if let Some(v) = self.voices.get_mut(voice.index()) {
                    let was_sounding = v.is_sounding();
                    v.note_off();
                    // A zero-length release finishes without another sample.
                    if was_sounding && !v.is_sounding() {
                        retire(&mut self.retired, &self.status, voice);
                    }
                }
            }
            SynthCommand::Update { voice, update } => {
                if let Some(v) = self.voices.get_mut(voice.index()) {
                    v.apply(&update);
                }
            }
            SynthCommand::PinOn { pin } => self.pins.set_enabled(pin, true),
            SynthCommand::PinOff { pin } => self.pins.set_enabled(pin, false),
        }
    }
}

fn retire(queue: &mut ringbuf::Producer<VoiceId>, status: &EngineStatus, id: VoiceId) {
    if queue.push(id).is_err() {
        status.retire_overflows.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use crate::{
        allocator::AllocatorError,
        config::{SynthConfig, AUDIO_JACK_PIN, PIEZO_PIN},
        control::create_synth,
        message::{SynthCommand, VoiceUpdate, WaveformSource, WaveformUpdate},
        output::PinLevels,
        voice::{AdsrPhase, EnvelopeParams, VoiceId},
        waveform::Harmonics,
    };

    fn sine_note(volume: u8, envelope: EnvelopeParams) -> VoiceUpdate {
        VoiceUpdate::new()
            .with_pitch(1 << 25)
            .with_volume(volume)
            .with_waveform(WaveformUpdate::new(WaveformSource::Harmonic(Harmonics::sine()), Some(envelope)))
    }

    #[test]
    fn test_stopped_engine_does_nothing() {
        let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
        let voice = VoiceId::new(1).unwrap();
        controller
            .note_on(voice, sine_note(255, EnvelopeParams::default()))
            .unwrap();

        let mut out = PinLevels::new();
        assert_eq!(engine.poll(&mut out), None);
        assert_eq!(out.get(AUDIO_JACK_PIN), None);
        assert_eq!(engine.voice(voice).unwrap().phase(), AdsrPhase::Off);

        engine.start();
        assert!(engine.is_running());
        engine.poll(&mut out);
        assert_eq!(engine.voice(voice).unwrap().phase(), AdsrPhase::Attack);
    }

    #[test]
    fn test_idle_output() {
        let (_controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
        engine.start();
        let mut out = PinLevels::new();
        assert_eq!(engine.poll(&mut out), Some(255));
        assert_eq!(out.get(AUDIO_JACK_PIN), Some(255));
        assert_eq!(out.get(PIEZO_PIN), Some(0));
    }

    #[test]
    fn test_command_drain_is_bounded() {
        let config = SynthConfig::default().with_command_queue_len(32);
        let (mut controller, mut engine) = create_synth(config).unwrap();
        engine.start();
        for id in 1..=12 {
            controller
                .note_on(VoiceId::new(id).unwrap(), sine_note(255, EnvelopeParams::default()))
                .unwrap();
        }
        let mut out = PinLevels::new();
        engine.poll(&mut out);
        assert_eq!(engine.active_voices(), super::COMMANDS_PER_POLL);
        engine.poll(&mut out);
        assert_eq!(engine.active_voices(), 12);
    }

    #[test]
    fn test_zero_length_release_retires_immediately() {
        let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
        engine.start();
        let voice = controller.allocate().unwrap();
        controller.note_on(voice, sine_note(255, EnvelopeParams::new(0, 0, 200, 0))).unwrap();
        let mut out = PinLevels::new();
        engine.poll(&mut out);
        controller.note_off(voice).unwrap();
        engine.poll(&mut out);
        assert_eq!(engine.voice(voice).unwrap().phase(), AdsrPhase::Off);
        assert_eq!(controller.reclaim(), 1);
        assert_eq!(controller.available_channels(), 16);
    }

    #[test]
    fn test_unplayed_voice_can_be_freed() {
        let config = SynthConfig::default().with_polyphony(2);
        let (mut controller, mut engine) = create_synth(config).unwrap();
        engine.start();
        let voice = controller.allocate().unwrap();
        controller.note_off(voice).unwrap();
        engine.render(&mut PinLevels::new(), 10_000);
        assert_eq!(controller.reclaim(), 0);
        assert_eq!(controller.available_channels(), 1);

        controller.free(voice).unwrap();
        assert_eq!(controller.available_channels(), 2);
        assert_eq!(controller.free(voice), Err(AllocatorError::NotCheckedOut(voice)));
    }

    #[test]
    fn test_played_voice_is_not_freed_twice() {
        let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
        engine.start();
        let voice = controller.allocate().unwrap();
        controller.note_on(voice, sine_note(255, EnvelopeParams::new(0, 0, 200, 0))).unwrap();
        assert_eq!(controller.free(voice), Err(AllocatorError::Playing(voice)));

        let mut out = PinLevels::new();
        engine.poll(&mut out);
        controller.note_off(voice).unwrap();
        engine.poll(&mut out);
        assert_eq!(controller.reclaim(), 1);
        assert_eq!(controller.free(voice), Err(AllocatorError::NotCheckedOut(voice)));
        let stray = VoiceId::new(40).unwrap();
        assert_eq!(controller.free(stray), Err(AllocatorError::OutOfRange(stray)));
        assert_eq!(controller.available_channels(), 16);
    }

    #[test]
    fn test_pins_can_be_switched() {
        let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
        engine.start();
        controller.set_pin(AUDIO_JACK_PIN, false).unwrap();
        let mut out = PinLevels::new();
        engine.poll(&mut out);
        assert!(!engine.is_pin_enabled(AUDIO_JACK_PIN));
        assert_eq!(out.get(AUDIO_JACK_PIN), Some(0));

        controller.set_pin(AUDIO_JACK_PIN, true).unwrap();
        engine.poll(&mut out);
        assert_eq!(out.get(AUDIO_JACK_PIN), Some(255));
    }

    #[test]
    fn test_status_counters() {
        let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
        engine.start();
        let voice = VoiceId::new(2).unwrap();
        controller
            .note_on(voice, sine_note(255, EnvelopeParams::default()))
            .unwrap();
        let mut out = PinLevels::new();
        engine.render(&mut out, 10);
        assert_eq!(controller.status().samples(), 10);
        assert_eq!(controller.status().active_voices(), 1);
        assert_eq!(controller.status().retire_overflows(), 0);

        engine.stop();
        engine.render(&mut out, 10);
        assert_eq!(controller.status().samples(), 10);
    }

    #[test]
    fn test_unknown_pin_command() {
        let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
        engine.start();
        controller.send(SynthCommand::PinOn { pin: 200 }).unwrap();
        let mut out = PinLevels::new();
        engine.poll(&mut out);
        assert!(!engine.is_pin_enabled(200));
    }
}
