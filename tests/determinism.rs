//! Rendering is a pure function of ROM, song and settings.

use std::sync::Arc;

use m4a_engine::PlaybackContext;
use m4a_formats::{frames_to_wav, RomBuilder, SongTable, Voice};
use m4a_ir::{Adsr, EngineSoundMode, Frame, Mp2kSoundMode, ResamplerType, ReverbType, STREAM_SAMPLE_RATE};

/// Two songs: a PCM melody with reverb-worthy sustain and a PSG duet.
fn rom() -> (Vec<u8>, SongTable) {
    let mut b = RomBuilder::new();
    let pcm: Vec<i8> = (0..256).map(|i| ((i * 37) % 256) as u8 as i8).collect();
    let sample = b.add_pcm(13379, Some(32), &pcm);
    let saw = b.add_synth(0, 0x80, 0, 0);
    let group = b.add_voice_group(&[
        Voice::direct(sample),
        Voice::direct(saw),
        Voice::Square1 { duty: 2, sweep: 0, adsr: Adsr::new(0, 2, 12, 3) },
        Voice::Noise { rough: true, adsr: Adsr::new(0, 1, 8, 2) },
    ]);
    let melody = b.add_track(&[0xBD, 0, 0xD3, 60, 100, 0x84, 0xD3, 64, 90, 0x84, 0xE7, 67, 110, 0x98, 0xB1]);
    let bass = b.add_track(&[0xBD, 1, 0xBF, 0x30, 0xE7, 36, 127, 0x98, 0xB1]);
    b.add_song(group, 1, 0x90, &[melody, bass]);
    let square = b.add_track(&[0xBD, 2, 0xD3, 72, 127, 0x84, 0xD3, 76, 127, 0x84, 0xB1]);
    let noise = b.add_track(&[0xBD, 3, 0xD3, 50, 80, 0x84, 0xD3, 50, 80, 0x84, 0xB1]);
    b.add_song(group, 2, 0, &[square, noise]);
    let (data, pos) = b.build();
    let table = SongTable::at(&data, pos).unwrap();
    (data, table)
}

fn render(data: &Arc<Vec<u8>>, pos: usize, engine: EngineSoundMode) -> Vec<Frame> {
    let mut ctx = PlaybackContext::new(Arc::<Vec<u8>>::clone(data), Mp2kSoundMode::default(), engine);
    ctx.init_song(pos).unwrap();
    let mut out = Vec::new();
    while !ctx.has_ended() && out.len() < 400 * 800 {
        ctx.sound_main();
        out.extend_from_slice(ctx.master().frames());
    }
    out
}

fn engines() -> Vec<EngineSoundMode> {
    [ResamplerType::Nearest, ResamplerType::Linear, ResamplerType::Sinc, ResamplerType::Blep]
        .into_iter()
        .map(|r| EngineSoundMode { resampler_normal: r, reverb: ReverbType::Normal, ..Default::default() })
        .collect()
}

#[test]
fn same_song_renders_identically_in_two_contexts() {
    let (data, table) = rom();
    let data = Arc::new(data);
    for engine in engines() {
        for uid in 0..2 {
            let pos = table.pos_of_song(uid).unwrap();
            let a = render(&data, pos, engine);
            let b = render(&data, pos, engine);
            assert!(!a.is_empty());
            assert_eq!(a, b, "song {uid} with {:?} differs between runs", engine.resampler_normal);
        }
    }
}

#[test]
fn reinitialising_a_context_forgets_the_previous_song() {
    let (data, table) = rom();
    let data = Arc::new(data);
    let engine = EngineSoundMode::default();
    let first = table.pos_of_song(0).unwrap();
    let second = table.pos_of_song(1).unwrap();

    let fresh = render(&data, second, engine);

    let mut ctx = PlaybackContext::new(Arc::<Vec<u8>>::clone(&data), Mp2kSoundMode::default(), engine);
    ctx.init_song(first).unwrap();
    for _ in 0..5 {
        ctx.sound_main();
    }
    ctx.init_song(second).unwrap();
    let mut reused = Vec::new();
    while !ctx.has_ended() {
        ctx.sound_main();
        reused.extend_from_slice(ctx.master().frames());
    }
    assert_eq!(fresh, reused);
}

#[test]
fn encoded_wav_is_byte_identical() {
    let (data, table) = rom();
    let data = Arc::new(data);
    let pos = table.pos_of_song(0).unwrap();
    let a = frames_to_wav(&render(&data, pos, EngineSoundMode::default()), STREAM_SAMPLE_RATE).unwrap();
    let b = frames_to_wav(&render(&data, pos, EngineSoundMode::default()), STREAM_SAMPLE_RATE).unwrap();
    assert_eq!(a, b);
}
