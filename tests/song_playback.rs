//! End-to-end playback of synthetic ROM images through PlaybackContext.

use std::sync::Arc;

use m4a_engine::{PlaybackContext, TempoScale};
use m4a_formats::{RomBuilder, SongTable, Voice};
use m4a_ir::{agb_pos_to_ptr, Adsr, EngineSoundMode, Frame, Mp2kSoundMode, ReverbType};

const FINE: u8 = 0xB1;
const GOTO: u8 = 0xB2;
const VOICE: u8 = 0xBD;
/// N04 with explicit key and velocity.
const N04: u8 = 0xD3;
const W04: u8 = 0x84;
const W01: u8 = 0x81;

struct Song {
    data: Vec<u8>,
    header: usize,
}

fn song_with(voices: &[Voice], streams: &[Vec<u8>], priority: u8) -> Song {
    song_in(RomBuilder::new(), |_| voices.to_vec(), streams, priority)
}

fn song_in(
    mut b: RomBuilder,
    voices: impl FnOnce(&mut RomBuilder) -> Vec<Voice>,
    streams: &[Vec<u8>],
    priority: u8,
) -> Song {
    let voices = voices(&mut b);
    let group = b.add_voice_group(&voices);
    let tracks: Vec<usize> = streams.iter().map(|s| b.add_track(s)).collect();
    let header = b.add_song(group, priority, 0, &tracks);
    Song { data: b.build().0, header }
}

fn synth_song(streams: &[Vec<u8>], priority: u8) -> Song {
    song_in(
        RomBuilder::new(),
        |b| {
            let synth = b.add_synth(0, 0x80, 0, 0);
            vec![Voice::direct(synth)]
        },
        streams,
        priority,
    )
}

fn context(song: &Song, mp2k: Mp2kSoundMode, engine: EngineSoundMode) -> PlaybackContext {
    let mut ctx = PlaybackContext::new(Arc::new(song.data.clone()), mp2k, engine);
    ctx.init_song(song.header).unwrap();
    ctx
}

fn run_to_end(ctx: &mut PlaybackContext, limit: usize) -> Vec<Vec<Frame>> {
    let mut blocks = Vec::new();
    while !ctx.has_ended() && blocks.len() < limit {
        ctx.sound_main();
        blocks.push(ctx.master().frames().to_vec());
    }
    blocks
}

fn is_silent(block: &[Frame]) -> bool {
    block.iter().all(|f| f.left == 0.0 && f.right == 0.0)
}

#[test]
fn single_note_song_ends_with_silent_tail() {
    let song = synth_song(&[vec![VOICE, 0, N04, 60, 127, W04, FINE], vec![FINE]], 1);
    let mut ctx = context(&song, Mp2kSoundMode::default(), EngineSoundMode::default());
    let blocks = run_to_end(&mut ctx, 100);

    assert!(ctx.has_ended());
    assert!(blocks.len() >= 4, "ended after {} blocks", blocks.len());
    assert!(blocks.len() < 20, "release tail too long: {} blocks", blocks.len());
    assert!(blocks[..4].iter().any(|b| !is_silent(b)));
    assert!(is_silent(blocks.last().unwrap()));
    assert_eq!(ctx.active_channels(), 0);
}

#[test]
fn empty_song_ends_immediately() {
    let song = synth_song(&[vec![FINE], vec![FINE]], 0);
    let mut ctx = context(&song, Mp2kSoundMode::default(), EngineSoundMode::default());
    let blocks = run_to_end(&mut ctx, 10);
    assert_eq!(blocks.len(), 1);
    assert!(is_silent(&blocks[0]));
}

#[test]
fn polyphony_cap_steals_instead_of_growing() {
    let streams: Vec<Vec<u8>> = (0..4).map(|k| vec![VOICE, 0, N04, 60 + k, 127, W04, FINE]).collect();
    let song = synth_song(&streams, 0);
    let mp2k = Mp2kSoundMode { max_channels: 2, ..Default::default() };
    let mut ctx = context(&song, mp2k, EngineSoundMode::default());
    ctx.sound_main();
    assert_eq!(ctx.active_channels(), 2);
    // the oldest voices were replaced by the last tracks' notes
    let state = ctx.visualizer_state();
    assert_eq!(state.tracks[0].active_notes, 0);
    assert_eq!(state.tracks[3].active_notes, 1u128 << 63);
}

#[test]
fn psg_voices_are_audible() {
    let adsr = Adsr::new(0, 0, 15, 0);
    let song = song_in(
        RomBuilder::new(),
        |b| {
            let ram = b.add_wave(&[0xF0; 16]);
            vec![
                Voice::Square1 { duty: 2, sweep: 0, adsr },
                Voice::Square2 { duty: 1, adsr },
                Voice::Wave { wave: ram, adsr },
                Voice::Noise { rough: false, adsr },
            ]
        },
        &[
            vec![VOICE, 0, N04, 60, 127, W04, FINE],
            vec![VOICE, 1, N04, 64, 127, W04, FINE],
            vec![VOICE, 2, N04, 67, 127, W04, FINE],
            vec![VOICE, 3, N04, 40, 127, W04, FINE],
        ],
        0,
    );
    let mut ctx = context(&song, Mp2kSoundMode::default(), EngineSoundMode::default());
    let blocks = run_to_end(&mut ctx, 200);
    assert!(ctx.has_ended());
    for (i, buf) in ctx.track_buffers().iter().enumerate() {
        assert!(buf.is_silent(), "track {i} still sounding after the end");
    }
    assert!(blocks.iter().any(|b| !is_silent(b)));
}

#[test]
fn drum_kit_plays_mapped_voice() {
    let song = song_in(
        RomBuilder::new(),
        |b| {
            let synth = b.add_synth(2, 0, 0, 0);
            let mut kit = vec![Voice::Empty; 128];
            kit[36] = Voice::DirectSound { sample: synth, key: 60, fixed: false, pan: 0xC0 - 32, adsr: Adsr::default() };
            let kit_pos = b.add_voice_group(&kit);
            vec![Voice::DrumKit { table: kit_pos }]
        },
        &[vec![VOICE, 0, N04, 36, 127, W04, N04, 37, 127, W04, FINE]],
        0,
    );
    let mut ctx = context(&song, Mp2kSoundMode::default(), EngineSoundMode::default());
    ctx.sound_main();
    assert_eq!(ctx.active_channels(), 1);
    let blocks = run_to_end(&mut ctx, 100);
    // key 37 has no drum: nothing new starts
    assert!(blocks.len() > 4);
    let left: f32 = blocks[0].iter().map(|f| f.left.abs()).sum();
    let right: f32 = blocks[0].iter().map(|f| f.right.abs()).sum();
    assert!(left > right, "drum pan override should favour the left side");
}

#[test]
fn pause_freezes_and_resume_continues() {
    let song = synth_song(&[vec![VOICE, 0, N04, 60, 127, W04, W04, FINE]], 0);
    let mut ctx = context(&song, Mp2kSoundMode::default(), EngineSoundMode::default());
    ctx.sound_main();
    ctx.sound_main();
    let before = ctx.visualizer_state();

    ctx.pause();
    for _ in 0..10 {
        ctx.sound_main();
        assert!(ctx.master().is_silent());
    }
    let during = ctx.visualizer_state();
    assert!(during.paused);
    assert_eq!(during.tracks, before.tracks);
    assert_eq!(during.active_channels, before.active_channels);

    ctx.resume();
    ctx.sound_main();
    assert!(!ctx.master().is_silent());
}

#[test]
fn stop_is_a_hard_reset() {
    let song = synth_song(&[vec![VOICE, 0, N04, 60, 127, W04, FINE]], 0);
    let mut ctx = context(&song, Mp2kSoundMode::default(), EngineSoundMode::default());
    ctx.sound_main();
    ctx.stop();
    assert!(ctx.has_ended());
    ctx.sound_main();
    assert!(ctx.master().is_silent());
}

#[test]
fn double_tempo_halves_song_length() {
    let stream = vec![VOICE, 0, W04, W04, W04, W04, W04, W04, W04, W04, FINE];
    let song = synth_song(&[stream], 0);
    let length = |scale: TempoScale| {
        let mut ctx = context(&song, Mp2kSoundMode::default(), EngineSoundMode::default());
        ctx.set_tempo_scale(scale);
        run_to_end(&mut ctx, 500).len()
    };
    let normal = length(TempoScale::Normal);
    let double = length(TempoScale::Double);
    let half = length(TempoScale::Half);
    assert!(double * 2 <= normal + 2, "double {double} vs normal {normal}");
    assert!(half >= normal * 2 - 2, "half {half} vs normal {normal}");
}

#[test]
fn track_limit_clamps_track_count() {
    let streams: Vec<Vec<u8>> = (0..6).map(|_| vec![FINE]).collect();
    let song = synth_song(&streams, 0);
    let engine = EngineSoundMode { track_limit: 3, ..Default::default() };
    let ctx = context(&song, Mp2kSoundMode::default(), engine);
    assert_eq!(ctx.tracks().len(), 3);
    assert_eq!(ctx.song().num_tracks, 3);
}

#[test]
fn corrupt_stream_ends_track_without_panic() {
    // GOTO to a pointer outside the image
    let mut stream = vec![VOICE, 0, N04, 60, 127, W01, GOTO];
    stream.extend_from_slice(&0x09FF_0000u32.to_le_bytes());
    let song = synth_song(&[stream, vec![0xFF; 64]], 0);
    let mut ctx = context(&song, Mp2kSoundMode::default(), EngineSoundMode::default());
    run_to_end(&mut ctx, 1000);
    assert!(ctx.has_ended());
}

#[test]
fn loops_repeat_until_max_loops() {
    let mut b = RomBuilder::new();
    let synth = b.add_synth(0, 0x80, 0, 0);
    let group = b.add_voice_group(&[Voice::direct(synth)]);
    let start = b.next_pos();
    let mut stream = vec![VOICE, 0, W04, GOTO];
    stream.extend_from_slice(&agb_pos_to_ptr(start + 2).to_le_bytes());
    let track = b.add_track(&stream);
    let header = b.add_song(group, 0, 0, &[track]);
    let song = Song { data: b.build().0, header };

    let blocks_for = |max_loops: i8| {
        let engine = EngineSoundMode { max_loops, ..Default::default() };
        let mut ctx = context(&song, Mp2kSoundMode::default(), engine);
        run_to_end(&mut ctx, 1000).len()
    };
    let once = blocks_for(0);
    let twice = blocks_for(1);
    assert!(twice > once);
    assert_eq!(blocks_for(-1), 1000);
}

#[test]
fn song_table_lookup_feeds_context() {
    let song = synth_song(&[vec![VOICE, 0, N04, 60, 127, W04, FINE]], 0);
    let table = SongTable::locate(&song.data, 1).unwrap();
    assert_eq!(table.pos_of_song(0), Some(song.header));
}

#[test]
fn reverb_adds_a_tail() {
    let stream = vec![VOICE, 0, N04, 60, 127, W04, FINE];
    let song = synth_song(&[stream], 0);
    let tail = |rev: u8| {
        let mp2k = Mp2kSoundMode { rev, ..Default::default() };
        let engine = EngineSoundMode { reverb: ReverbType::Normal, ..Default::default() };
        let mut ctx = context(&song, mp2k, engine);
        for _ in 0..6 {
            ctx.sound_main();
        }
        ctx.master().is_silent()
    };
    assert!(tail(0));
    assert!(!tail(0x80 | 100));
}

#[test]
fn voices_only_song_has_no_sound() {
    let song = song_with(&[Voice::Empty], &[vec![VOICE, 0, N04, 60, 127, W04, FINE]], 0);
    let mut ctx = context(&song, Mp2kSoundMode::default(), EngineSoundMode::default());
    let blocks = run_to_end(&mut ctx, 50);
    assert!(blocks.iter().all(|b| is_silent(b)));
}
