use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hexboard_synth::{
    config::AUDIO_JACK_PIN,
    create_synth,
    key::{KeyEvent, KeyId},
    note::Note,
    output::{CpalOutput, WavOutput},
    SynthConfig, SynthController,
};
use log::LevelFilter;
use midir::{Ignore, MidiInput, MidiInputConnection};
use simple_logger::SimpleLogger;
use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

/// Semitones above middle C played when there is no MIDI input.
const ARPEGGIO: [i8; 4] = [0, 4, 7, 4];
const NOTE_ON_TIME: Duration = Duration::from_millis(50);
const NOTE_OFF_TIME: Duration = Duration::from_millis(450);

/// Samples rendered per pass of the audio thread.
const BLOCK: usize = 64;

fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [flag, path, rest @ ..] if flag == "--render" => {
            let seconds = match rest.first() {
                Some(seconds) => seconds.parse()?,
                None => 4.0,
            };
            render(path, seconds)
        }
        [] => play(),
        _ => {
            eprintln!("usage: hexboard-synth [--render <file.wav> [seconds]]");
            Ok(())
        }
    }
}

/// Plays live input (or the arpeggio) through the default output device.
fn play() -> Result<(), Box<dyn Error>> {
    let (events_tx, events_rx) = mpsc::channel();
    let _connection = connect_midi(events_tx)?;

    let host = cpal::default_host();
    let device = host.default_output_device().ok_or("no output device available")?;
    let stream_config: cpal::StreamConfig = device.default_output_config()?.into();
    let sample_rate = stream_config.sample_rate.0;

    // The sound card polls the engine, so pitches follow its exact rate.
    let interval_us = (1_000_000.0 / sample_rate as f64).round() as u32;
    let config = SynthConfig::default()
        .with_sample_interval_us(interval_us)
        .with_device_rate_hz(sample_rate);
    let audio_bits = config.audio_bits;
    let (mut controller, mut engine) = create_synth(config)?;

    let (mut output, stream) = CpalOutput::from_cpal(
        &device,
        &stream_config,
        AUDIO_JACK_PIN,
        audio_bits,
        4096,
        &controller.handle(),
    )?;
    stream.play()?;

    let running = Arc::new(AtomicBool::new(true));
    let audio = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            engine.start();
            while running.load(Ordering::Relaxed) {
                engine.render(&mut output, BLOCK);
            }
            engine.stop();
        })
    };

    // Runs until the event source goes away.
    let result = events_rx
        .iter()
        .try_for_each(|event| handle_event(&mut controller, event));

    running.store(false, Ordering::Relaxed);
    audio.join().ok();
    result
}

/// Renders the arpeggio offline to a WAV file.
fn render(path: &str, seconds: f64) -> Result<(), Box<dyn Error>> {
    let config = SynthConfig::default();
    let sample_rate = config.sample_rate_hz();
    let audio_bits = config.audio_bits;
    let (mut controller, mut engine) = create_synth(config)?;
    let mut output = WavOutput::create(path, AUDIO_JACK_PIN, audio_bits, sample_rate.round() as u32)?;

    let samples = |time: Duration| (time.as_secs_f64() * sample_rate) as usize;
    let total = (seconds.max(0.0) * sample_rate) as usize;
    let mut rendered = 0;

    engine.start();
    for &offset in ARPEGGIO.iter().cycle() {
        if rendered >= total {
            break;
        }
        let note = Note::middle_c().transpose(offset);
        let key = KeyId::from(note.0);
        controller.key_down(key, note.frequency(), 127)?;
        engine.render(&mut output, samples(NOTE_ON_TIME));
        controller.key_up(key)?;
        engine.render(&mut output, samples(NOTE_OFF_TIME));
        rendered += samples(NOTE_ON_TIME) + samples(NOTE_OFF_TIME);
    }
    controller.reclaim();

    let written = output.len();
    output.finalize()?;
    log::info!("rendered {written} samples to {path}");
    Ok(())
}

fn handle_event(controller: &mut SynthController, event: KeyEvent) -> Result<(), Box<dyn Error>> {
    match event {
        KeyEvent::Press { key, velocity } => {
            let note = Note(key.0.min(127) as u8);
            if controller.key_down(key, note.frequency(), velocity)?.is_none() {
                log::info!("all voices busy, dropped {note}");
            }
        }
        KeyEvent::Release { key } => {
            controller.key_up(key)?;
        }
        KeyEvent::PitchBend { value } => controller.set_pitch_bend(value)?,
        KeyEvent::Modulation { value } => controller.set_modulation(value)?,
        KeyEvent::Invalid => {}
    }
    Ok(())
}

/// Forwards events from the first MIDI input, or starts the arpeggio when there is none.
fn connect_midi(tx: mpsc::Sender<KeyEvent>) -> Result<Option<MidiInputConnection<()>>, Box<dyn Error>> {
    let mut midi_in = MidiInput::new("hexboard-synth")?;
    midi_in.ignore(Ignore::ActiveSense);

    let ports = midi_in.ports();
    let Some(port) = ports.first() else {
        log::info!("no MIDI input ports available, playing an arpeggio");
        thread::spawn(move || arpeggio(tx));
        return Ok(None);
    };

    let callback = move |_, message: &[u8], _: &mut ()| {
        let event = KeyEvent::from_midi(message);
        if event.is_invalid() {
            return;
        }
        tx.send(event).ok();
    };
    let connection = midi_in
        .connect(port, "hexboard-synth-input", callback, ())
        .map_err(|err| err.to_string())?;
    Ok(Some(connection))
}

fn arpeggio(tx: mpsc::Sender<KeyEvent>) {
    thread::sleep(Duration::from_millis(500));
    for &offset in ARPEGGIO.iter().cycle() {
        let key = KeyId::from(Note::middle_c().transpose(offset).0);
        if tx.send(KeyEvent::Press { key, velocity: 127 }).is_err() {
            return;
        }
        thread::sleep(NOTE_ON_TIME);
        tx.send(KeyEvent::Release { key }).ok();
        thread::sleep(NOTE_OFF_TIME);
    }
}
