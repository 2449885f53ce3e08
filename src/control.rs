//! The control side of the synth: turns key presses into voice commands.

use crate::{
    allocator::{AllocatorError, ChannelAllocator},
    channel::{command_channel, CommandSender, SendError},
    config::{ConfigError, SynthConfig},
    engine::{AudioEngine, EngineStatus},
    key::KeyId,
    message::{SynthCommand, TableRef, VoiceUpdate, WaveformUpdate},
    note::pitch_bend_ratio,
    patch::{Patch, Timbre},
    voice::VoiceId,
    waveform::{LinearShape, Wavetable},
};
use basedrop::{Collector, Handle};
use ringbuf_basedrop as ringbuf;
use std::sync::Arc;

/// Builds a connected controller and audio engine.
///
/// The engine is meant to be moved to the audio thread (or core) and polled
/// once per sample period. Everything else goes through the controller.
pub fn create_synth(config: SynthConfig) -> Result<(SynthController, AudioEngine), ConfigError> {
    config.validate()?;

    let collector = Collector::new();
    let handle = collector.handle();
    let (commands, receiver) = command_channel(config.command_queue_len, &handle);
    let (retire_tx, retire_rx) = ringbuf::RingBuffer::new(config.polyphony as usize).split(&handle);
    let status = Arc::new(EngineStatus::default());

    let engine = AudioEngine::new(&config, receiver, retire_tx, Arc::clone(&status));
    log::info!(
        "synth created: {} voices, {}-bit output at {:.0} Hz",
        config.polyphony,
        config.audio_bits,
        config.sample_rate_hz()
    );

    let controller = SynthController {
        allocator: ChannelAllocator::new(config.polyphony),
        config,
        collector,
        commands,
        retired: retire_rx,
        status,
        patch: Patch::default(),
        held: Vec::new(),
        unplayed: 0,
        bend: 1.0,
    };
    Ok((controller, engine))
}

#[derive(Clone, Copy, Debug)]
struct HeldKey {
    key: KeyId,
    voice: VoiceId,
    /// Unbent frequency of the note.
    frequency_hz: f64,
}

pub struct SynthController {
    config: SynthConfig,
    collector: Collector,
    commands: CommandSender,
    allocator: ChannelAllocator,
    retired: ringbuf::Consumer<VoiceId>,
    status: Arc<EngineStatus>,
    patch: Patch,
    held: Vec<HeldKey>,
    /// Bit `i` is set while voice `i + 1` is allocated but has not been sent a note-on.
    unplayed: u32,
    /// Current pitch-bend ratio.
    bend: f64,
}

impl SynthController {
    /// Starts a note for `key`, using the current patch.
    ///
    /// A key that is already held retriggers its own voice. Returns the voice
    /// playing the note, or `None` if every voice is busy and the note was dropped.
    pub fn key_down(&mut self, key: KeyId, frequency_hz: f64, velocity: u8) -> Result<Option<VoiceId>, SendError> {
        self.reclaim();

        let held = self.held.iter().position(|held| held.key == key);
        let voice = match held {
            Some(index) => self.held[index].voice,
            None => match self.allocator.acquire() {
                Some(voice) => voice,
                None => {
                    log::debug!("no free voice for {key}, note dropped");
                    return Ok(None);
                }
            },
        };

        let update = self.note_update(frequency_hz * self.bend, velocity);
        if let Err(err) = self.commands.send(SynthCommand::NoteOn { voice, update }) {
            if held.is_none() {
                self.allocator.release(voice).ok();
            }
            return Err(err);
        }

        let entry = HeldKey {
            key,
            voice,
            frequency_hz,
        };
        match held {
            Some(index) => self.held[index] = entry,
            None => self.held.push(entry),
        }
        Ok(Some(voice))
    }

    /// Releases the note held by `key`. Returns `false` if the key was not sounding.
    pub fn key_up(&mut self, key: KeyId) -> Result<bool, SendError> {
        let Some(index) = self.held.iter().position(|held| held.key == key) else {
            return Ok(false);
        };
        let held = self.held.swap_remove(index);
        self.note_off(held.voice)?;
        Ok(true)
    }

    /// Releases every held key.
    pub fn all_notes_off(&mut self) -> Result<(), SendError> {
        while let Some(held) = self.held.pop() {
            self.note_off(held.voice)?;
        }
        Ok(())
    }

    /// Takes a voice from the free queue for use with the per-voice commands.
    /// It comes back through [`SynthController::reclaim`] once its release ends.
    pub fn allocate(&mut self) -> Option<VoiceId> {
        self.reclaim();
        let voice = self.allocator.acquire()?;
        self.unplayed |= voice_bit(voice);
        Some(voice)
    }

    /// Hands back a voice from [`SynthController::allocate`] that was never
    /// played. A voice that has had a note-on returns through `reclaim` instead.
    pub fn free(&mut self, voice: VoiceId) -> Result<(), AllocatorError> {
        if voice.get() > self.allocator.limit() {
            return Err(AllocatorError::OutOfRange(voice));
        }
        if self.unplayed & voice_bit(voice) == 0 {
            return Err(if self.allocator.is_free(voice) {
                AllocatorError::NotCheckedOut(voice)
            } else {
                AllocatorError::Playing(voice)
            });
        }
        self.allocator.release(voice)?;
        self.unplayed &= !voice_bit(voice);
        Ok(())
    }

    pub fn note_on(&mut self, voice: VoiceId, update: VoiceUpdate) -> Result<(), SendError> {
        self.send(SynthCommand::NoteOn { voice, update })
    }

    pub fn note_off(&mut self, voice: VoiceId) -> Result<(), SendError> {
        self.send(SynthCommand::NoteOff { voice })
    }

    /// Sets a voice's phase increment. See [`SynthConfig::increment`].
    pub fn update_pitch(&mut self, voice: VoiceId, increment: u32) -> Result<(), SendError> {
        let update = VoiceUpdate::new().with_pitch(increment);
        self.send(SynthCommand::Update { voice, update })
    }

    pub fn update_volume(&mut self, voice: VoiceId, volume: u8) -> Result<(), SendError> {
        let update = VoiceUpdate::new().with_volume(volume);
        self.send(SynthCommand::Update { voice, update })
    }

    pub fn update_waveform(&mut self, voice: VoiceId, waveform: WaveformUpdate) -> Result<(), SendError> {
        let update = VoiceUpdate::new().with_waveform(waveform);
        self.send(SynthCommand::Update { voice, update })
    }

    pub fn set_pin(&mut self, pin: u8, enabled: bool) -> Result<(), SendError> {
        self.send(if enabled {
            SynthCommand::PinOn { pin }
        } else {
            SynthCommand::PinOff { pin }
        })
    }

    /// Sends a raw command, waiting for queue space if needed.
    pub fn send(&mut self, command: SynthCommand) -> Result<(), SendError> {
        if let SynthCommand::NoteOn { voice, .. } = &command {
            self.unplayed &= !voice_bit(*voice);
        }
        self.commands.send(command)
    }

    /// Replaces the patch used by future notes. Held notes keep their sound.
    pub fn set_patch(&mut self, patch: Patch) {
        log::info!("patch changed to {:?}", patch.timbre);
        self.patch = patch;
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    /// Sets the modulation amount and reshapes held notes that use it.
    pub fn set_modulation(&mut self, modulation: u8) -> Result<(), SendError> {
        self.patch.modulation = modulation.min(127);
        self.update_held(false)
    }

    /// Applies a raw 14-bit pitch bend (8192 is centre) to every held note.
    /// Frequency-dependent shapes are recomputed for the bent pitch.
    pub fn set_pitch_bend(&mut self, bend: u16) -> Result<(), SendError> {
        self.bend = pitch_bend_ratio(bend, self.patch.bend_range_cents);
        self.update_held(true)
    }

    /// Returns voices that finished their release to the free queue, and
    /// frees any memory the audio side has let go of. Returns how many voices
    /// came back.
    pub fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0;
        while let Some(voice) = self.retired.pop() {
            self.held.retain(|held| held.voice != voice);
            match self.allocator.release(voice) {
                Ok(()) => reclaimed += 1,
                Err(err) => log::warn!("could not reclaim voice {voice}: {err}"),
            }
        }
        if reclaimed > 0 {
            log::trace!("reclaimed {reclaimed} voices");
        }
        self.collector.collect();
        reclaimed
    }

    /// Wraps a generated table so it can be sent to the audio side.
    pub fn table(&self, table: Wavetable) -> TableRef {
        TableRef::new(&self.collector.handle(), table)
    }

    /// A handle to the collector that owns memory shared with the audio side.
    pub fn handle(&self) -> Handle {
        self.collector.handle()
    }

    /// Number of voices free for new notes, not counting ones still to be reclaimed.
    pub fn available_channels(&self) -> usize {
        self.allocator.available()
    }

    pub fn held_keys(&self) -> usize {
        self.held.len()
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Re-sends the procedural shape of every held note, along with the bent
    /// pitch when `pitch` is set. A pitch change alone only reshapes waves
    /// that depend on frequency.
    fn update_held(&mut self, pitch: bool) -> Result<(), SendError> {
        let reshape = match self.patch.timbre {
            Timbre::Linear(wave) if !pitch || self.patch.follows_pitch() => Some(wave),
            _ => None,
        };
        for held in &self.held {
            let frequency_hz = held.frequency_hz * self.bend;
            let mut update = VoiceUpdate::new();
            if pitch {
                update = update.with_pitch(self.config.increment(frequency_hz));
            }
            if let Some(wave) = reshape {
                let shape = LinearShape::new(wave, frequency_hz, self.patch.modulation);
                update = update.with_waveform(WaveformUpdate::shape_only(shape));
            }
            if update.is_empty() {
                continue;
            }
            self.commands.send(SynthCommand::Update {
                voice: held.voice,
                update,
            })?;
        }
        Ok(())
    }

    /// Builds the complete voice setup for a note at `frequency_hz`.
    fn note_update(&self, frequency_hz: f64, velocity: u8) -> VoiceUpdate {
        let patch = &self.patch;
        VoiceUpdate::new()
            .with_pitch(self.config.increment(frequency_hz))
            .with_volume(patch.volume(frequency_hz, velocity))
            .with_waveform(WaveformUpdate::new(patch.source(frequency_hz), Some(patch.envelope)))
    }
}

fn voice_bit(voice: VoiceId) -> u32 {
    1u32.checked_shl(voice.index() as u32).unwrap_or(0)
}
