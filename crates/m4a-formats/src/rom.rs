//! ROM image container.

use std::io::Cursor;
use std::path::Path;

use binrw::BinRead;
use m4a_ir::ByteSource;
use tracing::{debug, warn};

use crate::FormatError;

/// Position of the cartridge header inside a GBA ROM.
pub const CARTRIDGE_HEADER_POS: usize = 0xA0;

/// Covers title through complement check.
const CARTRIDGE_HEADER_LEN: usize = 0x1E;

/// Value the BIOS requires at 0xB2.
const FIXED_VALUE: u8 = 0x96;

/// GBA cartridge header (0xA0..0xBE).
#[derive(BinRead, Clone, Debug, PartialEq, Eq)]
#[br(little)]
pub struct CartridgeHeader {
    pub title: [u8; 12],
    pub game_code: [u8; 4],
    pub maker_code: [u8; 2],
    #[br(assert(fixed == FIXED_VALUE))]
    fixed: u8,
    pub unit_code: u8,
    pub device_type: u8,
    #[br(pad_before = 7)]
    pub version: u8,
    pub complement: u8,
}

impl CartridgeHeader {
    /// Title with trailing padding removed.
    pub fn title(&self) -> String {
        ascii_field(&self.title)
    }

    pub fn game_code(&self) -> String {
        ascii_field(&self.game_code)
    }

    /// Complement check byte as the BIOS computes it over 0xA0..0xBD.
    pub fn compute_complement(raw: &[u8]) -> u8 {
        raw.iter()
            .take(CARTRIDGE_HEADER_LEN - 1)
            .fold(0u8, |chk, &b| chk.wrapping_sub(b))
            .wrapping_sub(0x19)
    }
}

fn ascii_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

/// A loaded ROM image.
///
/// Images without a cartridge header are treated as sequence-only
/// wrappers: songs can be played but nothing else about the game is known.
#[derive(Clone, Debug)]
pub struct Rom {
    data: Vec<u8>,
    header: Option<CartridgeHeader>,
}

impl Rom {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, FormatError> {
        if data.is_empty() {
            return Err(FormatError::EmptyRom);
        }
        let header = parse_header(&data);
        match &header {
            Some(h) => debug!(title = %h.title(), code = %h.game_code(), len = data.len(), "ROM loaded"),
            None => debug!(len = data.len(), "sequence-only image loaded"),
        }
        Ok(Self { data, header })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data)
    }

    pub fn header(&self) -> Option<&CartridgeHeader> {
        self.header.as_ref()
    }

    /// Four-letter game code, if the image has a cartridge header.
    pub fn game_code(&self) -> Option<String> {
        self.header.as_ref().map(CartridgeHeader::game_code)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

fn parse_header(data: &[u8]) -> Option<CartridgeHeader> {
    let raw = data.get(CARTRIDGE_HEADER_POS..CARTRIDGE_HEADER_POS + CARTRIDGE_HEADER_LEN)?;
    let header = CartridgeHeader::read(&mut Cursor::new(raw)).ok()?;
    if CartridgeHeader::compute_complement(raw) != header.complement {
        warn!(game = %header.game_code(), "cartridge header checksum mismatch");
    }
    Some(header)
}

impl ByteSource for Rom {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn read_bytes(&self, pos: usize, len: usize) -> Option<&[u8]> {
        self.data.read_bytes(pos, len)
    }

    fn is_sequence_only(&self) -> bool {
        self.header.is_none()
    }
}
