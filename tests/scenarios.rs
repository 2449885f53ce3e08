use hexboard_synth::{
    allocator::ChannelAllocator,
    config::{SynthConfig, AUDIO_JACK_PIN},
    create_synth,
    key::KeyId,
    message::{VoiceUpdate, WaveformSource, WaveformUpdate},
    mixer::attenuation,
    output::{PinLevels, WavOutput},
    patch::{Patch, Timbre},
    voice::{AdsrPhase, EnvelopeParams, VoiceId},
    waveform::{LinearShape, LinearWave},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

const NEUTRAL: u16 = 255;

fn square_note(envelope: EnvelopeParams) -> VoiceUpdate {
    VoiceUpdate::new()
        .with_pitch(1 << 24)
        .with_volume(255)
        .with_waveform(WaveformUpdate::new(
            WaveformSource::Linear(LinearShape::new(LinearWave::Square, 100.0, 0)),
            Some(envelope),
        ))
}

#[test]
fn test_attack_reaches_full_level() {
    let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
    engine.start();

    let voice = controller.allocate().unwrap();
    assert_eq!(voice.get(), 1);
    let attack = 300;
    controller
        .note_on(voice, square_note(EnvelopeParams::new(attack, 1000, 100, 1000)))
        .unwrap();

    let mut out = PinLevels::new();
    engine.render(&mut out, attack as usize - 1);
    assert_eq!(engine.voice(voice).unwrap().phase(), AdsrPhase::Attack);

    engine.poll(&mut out);
    let state = engine.voice(voice).unwrap();
    assert_eq!(state.phase(), AdsrPhase::Decay);
    assert_eq!(state.level(), 255);
}

#[test]
fn test_third_note_is_dropped_with_two_voices() {
    let config = SynthConfig::default().with_polyphony(2);
    let (mut controller, mut engine) = create_synth(config).unwrap();
    controller.set_patch(Patch::new(
        Timbre::Linear(LinearWave::Saw),
        EnvelopeParams::new(10, 100, 200, 100),
    ));
    engine.start();

    let first = controller.key_down(KeyId(1), 300.0, 127).unwrap();
    let second = controller.key_down(KeyId(2), 450.0, 127).unwrap();
    let third = controller.key_down(KeyId(3), 600.0, 127).unwrap();
    assert!(first.is_some());
    assert!(second.is_some());
    assert_eq!(third, None);
    assert_eq!(controller.available_channels(), 0);

    let mut out = PinLevels::new();
    let levels: Vec<u16> = (0..200).filter_map(|_| engine.poll(&mut out)).collect();
    assert!(levels.iter().any(|&level| level != NEUTRAL));
    for voice in [first, second].into_iter().flatten() {
        let state = engine.voice(voice).unwrap();
        assert!(state.is_audible());
        assert!(state.level() > 0);
    }
    assert_eq!(engine.active_voices(), 2);
}

#[test]
fn test_mix_is_compressed() {
    let envelope = EnvelopeParams::new(0, 0, 255, 100);
    let mut peaks = Vec::new();
    for voices in [1u8, 4] {
        let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
        engine.start();
        for id in 1..=voices {
            controller
                .note_on(VoiceId::new(id).unwrap(), square_note(envelope))
                .unwrap();
        }
        let mut out = PinLevels::new();
        let peak = (0..256)
            .filter_map(|_| engine.poll(&mut out))
            .map(|level| level as i32 - NEUTRAL as i32)
            .max()
            .unwrap();
        peaks.push(peak);
    }

    let (one, four) = (peaks[0], peaks[1]);
    assert_eq!(one, 63);
    assert!(four > one);
    assert!(four < 4 * one);
    assert_ne!(attenuation(1), attenuation(4));
    assert_eq!(attenuation(4) * 2, attenuation(1));
}

#[test]
fn test_waveform_update_applies_whole_table() {
    let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
    engine.start();
    let voice = controller.allocate().unwrap();
    let envelope = EnvelopeParams::new(0, 0, 255, 100);

    let low = controller.table([-50; 256]);
    controller
        .note_on(
            voice,
            VoiceUpdate::new()
                .with_pitch(12345)
                .with_volume(255)
                .with_waveform(WaveformUpdate::new(WaveformSource::Table(low), Some(envelope))),
        )
        .unwrap();
    let mut out = PinLevels::new();
    let before = engine.poll(&mut out).unwrap();
    assert!(before < NEUTRAL);

    let high = controller.table([100; 256]);
    controller
        .update_waveform(voice, WaveformUpdate::new(WaveformSource::Table(high), None))
        .unwrap();
    for _ in 0..300 {
        // (100 * 255 * 255) >> 8, attenuated for one voice and scaled to 9 bits.
        assert_eq!(engine.poll(&mut out), Some(NEUTRAL + 49));
    }
    assert_eq!(engine.voice(voice).unwrap().envelope_params(), envelope);
    assert_eq!(controller.reclaim(), 0);
}

#[test]
fn test_double_note_off_keeps_release() {
    let (mut controller, mut engine) = create_synth(SynthConfig::default()).unwrap();
    engine.start();
    let voice = controller.allocate().unwrap();
    controller
        .note_on(voice, square_note(EnvelopeParams::new(0, 0, 200, 100)))
        .unwrap();
    let mut out = PinLevels::new();
    engine.render(&mut out, 10);

    controller.note_off(voice).unwrap();
    engine.render(&mut out, 40);
    let level = engine.voice(voice).unwrap().level();

    controller.note_off(voice).unwrap();
    engine.poll(&mut out);
    let state = engine.voice(voice).unwrap();
    assert_eq!(state.phase(), AdsrPhase::Release);
    assert!(state.level() <= level && level - state.level() <= 3);

    engine.render(&mut out, 100);
    assert_eq!(engine.voice(voice).unwrap().phase(), AdsrPhase::Off);
    assert_eq!(controller.reclaim(), 1);
    assert_eq!(controller.status().retire_overflows(), 0);
}

#[test]
fn test_allocator_never_hands_out_an_id_twice() {
    let mut rng = StdRng::seed_from_u64(0x4845_5842);
    for limit in [1u8, 2, 7, 16, 32] {
        let mut allocator = ChannelAllocator::new(limit);
        let mut model: VecDeque<VoiceId> = (1..=limit).filter_map(VoiceId::new).collect();
        let mut outstanding: Vec<VoiceId> = Vec::new();

        for _ in 0..5000 {
            if rng.gen_bool(0.55) {
                let acquired = allocator.acquire();
                assert_eq!(acquired, model.pop_front());
                match acquired {
                    Some(id) => {
                        assert!(!outstanding.contains(&id));
                        outstanding.push(id);
                    }
                    None => assert_eq!(outstanding.len(), limit as usize),
                }
            } else if !outstanding.is_empty() {
                let id = outstanding.swap_remove(rng.gen_range(0..outstanding.len()));
                allocator.release(id).unwrap();
                model.push_back(id);
            }
            assert_eq!(allocator.available() + outstanding.len(), limit as usize);
        }

        let free: HashSet<VoiceId> = std::iter::from_fn(|| allocator.acquire()).collect();
        assert_eq!(free.len() + outstanding.len(), limit as usize);
        assert!(outstanding.iter().all(|id| !free.contains(id)));
    }
}

#[test]
fn test_engine_on_another_thread() {
    let (mut controller, engine) = create_synth(SynthConfig::default().with_command_queue_len(8)).unwrap();
    controller.set_patch(Patch::new(
        Timbre::Linear(LinearWave::Triangle),
        EnvelopeParams::new(20, 20, 150, 30),
    ));

    let running = Arc::new(AtomicBool::new(true));
    let audio = {
        let running = Arc::clone(&running);
        let mut engine = engine;
        thread::spawn(move || {
            let mut out = PinLevels::new();
            engine.start();
            while running.load(Ordering::Relaxed) {
                engine.render(&mut out, 16);
            }
            engine
        })
    };

    let mut rng = StdRng::seed_from_u64(7);
    let mut held: Vec<KeyId> = Vec::new();
    for step in 0..400u16 {
        if held.len() < 20 && rng.gen_bool(0.6) {
            let key = KeyId(step);
            controller.key_down(key, 200.0 + step as f64, 100).unwrap();
            held.push(key);
        } else if !held.is_empty() {
            let key = held.swap_remove(rng.gen_range(0..held.len()));
            controller.key_up(key).unwrap();
        }
        if step % 50 == 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }
    controller.all_notes_off().unwrap();

    running.store(false, Ordering::Relaxed);
    let mut engine = audio.join().unwrap();

    // Finish whatever is still queued or releasing.
    engine.render(&mut PinLevels::new(), 10_000);
    assert_eq!(engine.active_voices(), 0);

    controller.reclaim();
    assert_eq!(controller.available_channels(), 16);
    assert_eq!(controller.status().retire_overflows(), 0);
}

#[test]
fn test_render_to_wav_file() {
    let path = std::env::temp_dir().join(format!("hexboard-synth-test-{}.wav", std::process::id()));
    let config = SynthConfig::default();
    let sample_rate = config.sample_rate_hz().round() as u32;
    let (mut controller, mut engine) = create_synth(config).unwrap();
    let mut output = WavOutput::create(&path, AUDIO_JACK_PIN, 9, sample_rate).unwrap();

    engine.start();
    controller.key_down(KeyId(60), 261.63, 127).unwrap();
    engine.render(&mut output, 2000);
    controller.key_up(KeyId(60)).unwrap();
    engine.render(&mut output, 4000);
    output.finalize().unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_rate, sample_rate);
    let samples: Vec<i16> = reader.into_samples().map(Result::unwrap).collect();
    assert_eq!(samples.len(), 6000);
    assert!(samples[..2000].iter().any(|&s| s != 0));
    // The default release is over well before the end, leaving silence.
    assert!(samples[5000..].iter().all(|&s| s == 0));

    std::fs::remove_file(&path).ok();
}
