//! Voice group (instrument table) resolution.
//!
//! A voice group is an array of 12-byte entries indexed by program number.
//! Key-split and drum-kit entries redirect into nested voice groups; the
//! chain is followed until a playable leaf entry is found.

use m4a_ir::{Adsr, ByteSource, SampleInfo};
use tracing::debug;

use crate::sample_source::{SampleEncoding, SynthShape, DPCM_BLOCK_BYTES, DPCM_BLOCK_SAMPLES};

/// Size of one voice group entry.
pub const VOICE_ENTRY_SIZE: usize = 12;
/// Size of a DirectSound sample header.
pub const SAMPLE_HEADER_SIZE: usize = 16;

const KIND_KEY_SPLIT: u8 = 0x40;
const KIND_DRUM_KIT: u8 = 0x80;
const KIND_FIXED: u8 = 0x08;
const SAMPLE_FLAG_LOOP: u8 = 0x40;
const COMPRESSION_DPCM: u8 = 1;

/// Maximum split/drum redirections followed.
const MAX_NESTING: usize = 2;

/// PSG voice description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CgbVoice {
    /// Square with frequency sweep register.
    Square1 { duty: u8, sweep: u8 },
    Square2 { duty: u8 },
    /// 4-bit wave RAM image at the given ROM position (16 bytes).
    Wave { pos: usize },
    /// `rough` selects the 7-bit LFSR.
    Noise { rough: bool },
}

impl CgbVoice {
    /// Hardware channel this voice occupies (0-3).
    pub fn hw_channel(&self) -> usize {
        match self {
            CgbVoice::Square1 { .. } => 0,
            CgbVoice::Square2 { .. } => 1,
            CgbVoice::Wave { .. } => 2,
            CgbVoice::Noise { .. } => 3,
        }
    }
}

/// Procedural DirectSound voice parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SynthParams {
    pub shape: SynthShape,
    /// Pulse duty in 1/256 of a cycle.
    pub base_duty: u8,
    /// Duty sweep depth in 1/256 of a cycle.
    pub duty_depth: u8,
    /// Duty sweep period in blocks (0 = static).
    pub duty_period: u8,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VoiceKind {
    Sample { info: SampleInfo, encoding: SampleEncoding, fixed: bool },
    Synth(SynthParams),
    Cgb(CgbVoice),
}

/// A resolved, playable instrument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instrument {
    pub kind: VoiceKind,
    pub adsr: Adsr,
    /// Key used for pitch (replaced by the entry key inside drum kits).
    pub pitch_key: u8,
    /// Drum-kit pan override (0 = none).
    pub rhythm_pan: i8,
}

#[derive(Clone, Copy, Debug)]
struct VoiceEntry {
    kind: u8,
    key: u8,
    pan_sweep: u8,
    data: u32,
    extra: u32,
}

impl VoiceEntry {
    fn read(rom: &dyn ByteSource, pos: usize) -> Option<Self> {
        let bytes = rom.read_bytes(pos, VOICE_ENTRY_SIZE)?;
        Some(Self {
            kind: bytes[0],
            key: bytes[1],
            pan_sweep: bytes[3],
            data: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            extra: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// Resolve `program` played at `key` in the voice group at `table_pos`.
///
/// Returns `None` for undefined programs, corrupt pointers or unsupported
/// entry kinds.
pub fn resolve(rom: &dyn ByteSource, table_pos: usize, program: u8, key: u8) -> Option<Instrument> {
    let mut table = table_pos;
    let mut index = program;
    let mut in_drum_kit = false;

    for depth in 0..=MAX_NESTING {
        let entry = VoiceEntry::read(rom, table + index as usize * VOICE_ENTRY_SIZE)?;
        match entry.kind {
            KIND_KEY_SPLIT | KIND_DRUM_KIT if depth == MAX_NESTING => {
                debug!(program, key, "instrument nesting too deep");
                return None;
            }
            KIND_KEY_SPLIT => {
                let map = rom.read_agb_ptr(table + index as usize * VOICE_ENTRY_SIZE + 8)?;
                table = rom.read_agb_ptr(table + index as usize * VOICE_ENTRY_SIZE + 4)?;
                index = rom.read_u8(map + key as usize)?;
            }
            KIND_DRUM_KIT => {
                table = rom.read_agb_ptr(table + index as usize * VOICE_ENTRY_SIZE + 4)?;
                index = key;
                in_drum_kit = true;
            }
            _ => return leaf(rom, &entry, key, in_drum_kit),
        }
    }
    None
}

fn leaf(rom: &dyn ByteSource, entry: &VoiceEntry, key: u8, in_drum_kit: bool) -> Option<Instrument> {
    let (pitch_key, rhythm_pan) = if in_drum_kit {
        let pan = if entry.pan_sweep & 0x80 != 0 { (entry.pan_sweep as i16 - 0xC0) as i8 } else { 0 };
        (entry.key, pan)
    } else {
        (key, 0)
    };
    let adsr = Adsr::from_u32(entry.extra);
    let kind = match entry.kind & 0x07 {
        0 => direct_sound(rom, entry.data, entry.kind & KIND_FIXED != 0)?,
        1 => VoiceKind::Cgb(CgbVoice::Square1 { duty: (entry.data & 3) as u8, sweep: entry.pan_sweep }),
        2 => VoiceKind::Cgb(CgbVoice::Square2 { duty: (entry.data & 3) as u8 }),
        3 => {
            let pos = m4a_ir::agb_ptr_to_pos(entry.data).filter(|&p| rom.contains(p, 16))?;
            VoiceKind::Cgb(CgbVoice::Wave { pos })
        }
        4 => VoiceKind::Cgb(CgbVoice::Noise { rough: entry.data & 1 != 0 }),
        _ => return None,
    };
    Some(Instrument { kind, adsr, pitch_key, rhythm_pan })
}

fn direct_sound(rom: &dyn ByteSource, data_ptr: u32, fixed: bool) -> Option<VoiceKind> {
    let header = m4a_ir::agb_ptr_to_pos(data_ptr)?;
    let compression = rom.read_u8(header)?;
    let flags = rom.read_u8(header + 3)?;
    let pitch = rom.read_u32(header + 4)?;
    let loop_pos = rom.read_u32(header + 8)?;
    let end_pos = rom.read_u32(header + 12)?;
    let sample_pos = header + SAMPLE_HEADER_SIZE;

    if compression == 0 && end_pos == 0 {
        let bytes = rom.read_bytes(sample_pos, 4)?;
        let shape = match bytes[0] {
            0 => SynthShape::Pulse,
            1 => SynthShape::Saw,
            _ => SynthShape::Triangle,
        };
        return Some(VoiceKind::Synth(SynthParams {
            shape,
            base_duty: bytes[1],
            duty_depth: bytes[2],
            duty_period: bytes[3],
        }));
    }

    let avail = rom.len().saturating_sub(sample_pos);
    let (encoding, max_samples) = if compression == COMPRESSION_DPCM {
        (SampleEncoding::Dpcm, (avail / DPCM_BLOCK_BYTES) as u64 * DPCM_BLOCK_SAMPLES as u64)
    } else {
        (SampleEncoding::Pcm8, avail as u64)
    };
    let end_pos = (end_pos as u64).min(max_samples) as u32;
    let loop_enabled = flags & SAMPLE_FLAG_LOOP != 0 && loop_pos < end_pos;

    Some(VoiceKind::Sample {
        info: SampleInfo {
            sample_pos,
            mid_c_freq: pitch as f32 / 1024.0,
            loop_pos,
            end_pos,
            loop_enabled,
        },
        encoding,
        fixed,
    })
}
