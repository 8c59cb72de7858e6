//! Assembles small MP2K images: samples, voice groups, tracks, song
//! headers and a song table.
//!
//! Every block is placed 4-aligned after the previous one, so positions
//! handed out by the `add_*` methods stay valid and can be referenced by
//! later blocks (e.g. a GOTO target computed from [`RomBuilder::next_pos`]).

use m4a_ir::{agb_pos_to_ptr, Adsr};

const DATA_START: usize = 0x200;
const SAMPLE_FLAG_LOOP: u8 = 0x40;

/// One voice group entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Voice {
    /// Sample or synth header at `sample`.
    DirectSound { sample: usize, key: u8, fixed: bool, pan: u8, adsr: Adsr },
    Square1 { duty: u8, sweep: u8, adsr: Adsr },
    Square2 { duty: u8, adsr: Adsr },
    /// 16-byte wave RAM image at `wave`.
    Wave { wave: usize, adsr: Adsr },
    Noise { rough: bool, adsr: Adsr },
    KeySplit { table: usize, key_map: usize },
    DrumKit { table: usize },
    /// Zeroed entry. Notes played on it are skipped.
    Empty,
}

impl Voice {
    /// DirectSound voice at middle C with an instant attack and release.
    pub fn direct(sample: usize) -> Self {
        Voice::DirectSound { sample, key: 60, fixed: false, pan: 0, adsr: Adsr::default() }
    }

    fn encode(&self) -> [u8; 12] {
        let (kind, key, pan_sweep, data, extra) = match *self {
            Voice::DirectSound { sample, key, fixed, pan, adsr } => {
                let kind = if fixed { 0x08 } else { 0x00 };
                (kind, key, pan, agb_pos_to_ptr(sample), adsr_word(adsr))
            }
            Voice::Square1 { duty, sweep, adsr } => (0x01, 60, sweep, duty as u32, adsr_word(adsr)),
            Voice::Square2 { duty, adsr } => (0x02, 60, 0, duty as u32, adsr_word(adsr)),
            Voice::Wave { wave, adsr } => (0x03, 60, 0, agb_pos_to_ptr(wave), adsr_word(adsr)),
            Voice::Noise { rough, adsr } => (0x04, 60, 0, rough as u32, adsr_word(adsr)),
            Voice::KeySplit { table, key_map } => (0x40, 0, 0, agb_pos_to_ptr(table), agb_pos_to_ptr(key_map)),
            Voice::DrumKit { table } => (0x80, 0, 0, agb_pos_to_ptr(table), 0),
            Voice::Empty => return [0; 12],
        };
        let mut e = [0u8; 12];
        e[0] = kind;
        e[1] = key;
        e[3] = pan_sweep;
        e[4..8].copy_from_slice(&data.to_le_bytes());
        e[8..12].copy_from_slice(&extra.to_le_bytes());
        e
    }
}

fn adsr_word(adsr: Adsr) -> u32 {
    u32::from_le_bytes([adsr.att, adsr.dec, adsr.sus, adsr.rel])
}

/// Builder for synthetic ROM images.
#[derive(Clone, Debug)]
pub struct RomBuilder {
    data: Vec<u8>,
    /// Header position and player of each table entry.
    songs: Vec<(usize, u16)>,
}

impl Default for RomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RomBuilder {
    /// Empty image with a valid cartridge header.
    pub fn new() -> Self {
        let mut data = vec![0u8; DATA_START];
        data[0xA0..0xA8].copy_from_slice(b"M4A TEST");
        data[0xAC..0xB0].copy_from_slice(b"ATST");
        data[0xB0..0xB2].copy_from_slice(b"01");
        data[0xB2] = 0x96;
        data[0xBD] = crate::CartridgeHeader::compute_complement(&data[0xA0..0xBE]);
        Self { data, songs: Vec::new() }
    }

    /// Position the next block will be placed at.
    pub fn next_pos(&self) -> usize {
        self.data.len().next_multiple_of(4)
    }

    /// Append raw bytes, returning their position.
    pub fn put(&mut self, bytes: &[u8]) -> usize {
        let pos = self.next_pos();
        self.data.resize(pos, 0);
        self.data.extend_from_slice(bytes);
        pos
    }

    /// Signed 8-bit PCM sample played at `rate` Hz at middle C.
    pub fn add_pcm(&mut self, rate: u32, loop_start: Option<u32>, samples: &[i8]) -> usize {
        let flags = if loop_start.is_some() { SAMPLE_FLAG_LOOP } else { 0 };
        let mut bytes = sample_header(0, flags, rate * 1024, loop_start.unwrap_or(0), samples.len() as u32);
        bytes.extend(samples.iter().map(|&s| s as u8));
        self.put(&bytes)
    }

    /// Procedural DirectSound voice (shape 0 pulse, 1 saw, 2 triangle).
    pub fn add_synth(&mut self, shape: u8, base_duty: u8, duty_depth: u8, duty_period: u8) -> usize {
        let mut bytes = sample_header(0, 0, 0, 0, 0);
        bytes.extend_from_slice(&[shape, base_duty, duty_depth, duty_period]);
        self.put(&bytes)
    }

    /// 4-bit wave RAM image for the CGB wave channel.
    pub fn add_wave(&mut self, nibbles: &[u8; 16]) -> usize {
        self.put(nibbles)
    }

    pub fn add_voice_group(&mut self, voices: &[Voice]) -> usize {
        let bytes: Vec<u8> = voices.iter().flat_map(|v| v.encode()).collect();
        self.put(&bytes)
    }

    /// Command stream for one track.
    pub fn add_track(&mut self, stream: &[u8]) -> usize {
        self.put(stream)
    }

    /// Song header referencing previously added blocks. The song is also
    /// appended to the song table written by [`build`](Self::build).
    pub fn add_song(&mut self, voice_group: usize, priority: u8, reverb: u8, tracks: &[usize]) -> usize {
        let mut bytes = vec![tracks.len() as u8, 0, priority, reverb];
        bytes.extend_from_slice(&agb_pos_to_ptr(voice_group).to_le_bytes());
        for &t in tracks {
            bytes.extend_from_slice(&agb_pos_to_ptr(t).to_le_bytes());
        }
        let pos = self.put(&bytes);
        self.songs.push((pos, 0));
        pos
    }

    /// Assign table entry `uid` to music player `player`.
    pub fn set_song_player(&mut self, uid: usize, player: u16) {
        if let Some(song) = self.songs.get_mut(uid) {
            song.1 = player;
        }
    }

    /// Write the song table and return the image with the table position.
    pub fn build(mut self) -> (Vec<u8>, usize) {
        let mut table = Vec::with_capacity(self.songs.len() * 8);
        for &(song, player) in &self.songs {
            table.extend_from_slice(&agb_pos_to_ptr(song).to_le_bytes());
            table.extend_from_slice(&player.to_le_bytes());
            table.extend_from_slice(&[0, 0]);
        }
        let pos = self.put(&table);
        // trailing padding so the last entry is never at the very end
        self.data.extend_from_slice(&[0; 16]);
        (self.data, pos)
    }
}

fn sample_header(compression: u8, flags: u8, pitch: u32, loop_pos: u32, end_pos: u32) -> Vec<u8> {
    let mut h = vec![0u8; 16];
    h[0] = compression;
    h[3] = flags;
    h[4..8].copy_from_slice(&pitch.to_le_bytes());
    h[8..12].copy_from_slice(&loop_pos.to_le_bytes());
    h[12..16].copy_from_slice(&end_pos.to_le_bytes());
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rom;
    use m4a_ir::ByteSource;

    #[test]
    fn blocks_are_aligned_and_sequential() {
        let mut b = RomBuilder::new();
        let a = b.put(&[1, 2, 3]);
        let c = b.put(&[4]);
        assert_eq!(a, DATA_START);
        assert_eq!(c, DATA_START + 4);
        assert_eq!(b.next_pos(), DATA_START + 8);
    }

    #[test]
    fn image_has_cartridge_header() {
        let (data, _) = RomBuilder::new().build();
        let rom = Rom::from_bytes(data).unwrap();
        assert_eq!(rom.game_code().as_deref(), Some("ATST"));
        assert_eq!(rom.header().unwrap().title(), "M4A TEST");
    }

    #[test]
    fn song_header_layout() {
        let mut b = RomBuilder::new();
        let group = b.add_voice_group(&[Voice::Empty]);
        let t0 = b.add_track(&[0xB1]);
        let t1 = b.add_track(&[0xB1]);
        let song = b.add_song(group, 3, 0x85, &[t0, t1]);
        let (data, table) = b.build();
        assert_eq!(&data[song..song + 4], &[2, 0, 3, 0x85]);
        assert_eq!(data.read_agb_ptr(song + 4), Some(group));
        assert_eq!(data.read_agb_ptr(song + 8), Some(t0));
        assert_eq!(data.read_agb_ptr(song + 12), Some(t1));
        assert_eq!(data.read_agb_ptr(table), Some(song));
    }

    #[test]
    fn pcm_header_fields() {
        let mut b = RomBuilder::new();
        let s = b.add_pcm(8000, Some(2), &[0, 64, -64, 127]);
        let (data, _) = b.build();
        assert_eq!(data.read_u8(s + 3), Some(SAMPLE_FLAG_LOOP));
        assert_eq!(data.read_u32(s + 4), Some(8000 * 1024));
        assert_eq!(data.read_u32(s + 8), Some(2));
        assert_eq!(data.read_u32(s + 12), Some(4));
        assert_eq!(data.read_i8(s + 18), Some(-64));
    }

    #[test]
    fn voice_encoding() {
        let adsr = Adsr::new(1, 2, 3, 4);
        let e = Voice::Square1 { duty: 2, sweep: 0x15, adsr }.encode();
        assert_eq!(e, [0x01, 60, 0, 0x15, 2, 0, 0, 0, 1, 2, 3, 4]);
        let e = Voice::DirectSound { sample: 0x300, key: 48, fixed: true, pan: 0xC0, adsr }.encode();
        assert_eq!(e[0], 0x08);
        assert_eq!(e[1], 48);
        assert_eq!(e[3], 0xC0);
        assert_eq!(u32::from_le_bytes([e[4], e[5], e[6], e[7]]), 0x0800_0300);
    }
}
