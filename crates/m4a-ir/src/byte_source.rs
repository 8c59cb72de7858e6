//! Random-access read interface over ROM bytes.

use alloc::string::String;
use alloc::vec::Vec;

/// Bus address at which the cartridge ROM is mapped.
pub const AGB_MAP_ROM: u32 = 0x0800_0000;

/// Largest cartridge ROM size (32 MiB).
pub const AGB_ROM_MAX: u32 = 0x0200_0000;

/// Returns true if `ptr` points into the mapped cartridge ROM.
pub fn is_valid_agb_ptr(ptr: u32) -> bool {
    (AGB_MAP_ROM..AGB_MAP_ROM + AGB_ROM_MAX).contains(&ptr)
}

/// Convert a ROM bus pointer into a byte position.
pub fn agb_ptr_to_pos(ptr: u32) -> Option<usize> {
    is_valid_agb_ptr(ptr).then(|| (ptr - AGB_MAP_ROM) as usize)
}

/// Convert a byte position into a ROM bus pointer.
pub fn agb_pos_to_ptr(pos: usize) -> u32 {
    AGB_MAP_ROM + pos as u32
}

/// Read-only byte access by absolute position.
///
/// Every read is bounds-checked and returns `None` past the end, so corrupt
/// pointers can never take the engine down.
pub trait ByteSource {
    /// Total number of addressable bytes.
    fn len(&self) -> usize;

    /// Borrow `len` bytes starting at `pos`.
    fn read_bytes(&self, pos: usize, len: usize) -> Option<&[u8]>;

    /// True if the image only wraps sequence data (no full cartridge ROM).
    fn is_sequence_only(&self) -> bool {
        false
    }

    /// Returns true if the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `len` bytes starting at `pos` are readable.
    fn contains(&self, pos: usize, len: usize) -> bool {
        pos.checked_add(len).is_some_and(|end| end <= self.len())
    }

    fn read_u8(&self, pos: usize) -> Option<u8> {
        self.read_bytes(pos, 1).map(|b| b[0])
    }

    fn read_i8(&self, pos: usize) -> Option<i8> {
        self.read_u8(pos).map(|b| b as i8)
    }

    fn read_u16(&self, pos: usize) -> Option<u16> {
        self.read_bytes(pos, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, pos: usize) -> Option<u32> {
        self.read_bytes(pos, 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a ROM bus pointer at `pos` and convert it to a position inside
    /// this source. `None` if the pointer is outside ROM or past the end.
    fn read_agb_ptr(&self, pos: usize) -> Option<usize> {
        let target = agb_ptr_to_pos(self.read_u32(pos)?)?;
        (target < self.len()).then_some(target)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes.
    fn read_cstr(&self, pos: usize, max_len: usize) -> Option<String> {
        let avail = self.len().checked_sub(pos)?.min(max_len);
        let bytes = self.read_bytes(pos, avail)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

impl ByteSource for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn read_bytes(&self, pos: usize, len: usize) -> Option<&[u8]> {
        self.get(pos..pos.checked_add(len)?)
    }
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn read_bytes(&self, pos: usize, len: usize) -> Option<&[u8]> {
        self.as_slice().read_bytes(pos, len)
    }
}
