/// Atari binary load file header and trailer
///
/// A binary load file starts with 0xFF 0xFF followed by the start and end
/// address of its first segment. It may end with a segment that stores a
/// vector into INITAD (0x02E2) or RUNAD (0x02E0); either may come last.

use std::fmt;

const BINARY_MAGIC: [u8; 2] = [0xFF, 0xFF];
const INIT_SEGMENT: [u8; 4] = [0xE2, 0x02, 0xE3, 0x02];
const RUN_SEGMENT: [u8; 4] = [0xE0, 0x02, 0xE1, 0x02];

/// Load addresses of a binary file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryInfo {
    /// First address of the first segment
    pub load_start: u16,
    /// Last address of the first segment
    pub load_end: u16,
    /// Initialization vector, if the file sets one
    pub init: Option<u16>,
    /// Run vector, if the file sets one
    pub run: Option<u16>,
}

fn word(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Vector stored by the 6-byte segment ending at `end`, if it targets `segment`
fn vector_at(data: &[u8], end: usize, segment: &[u8; 4]) -> Option<u16> {
    let start = end.checked_sub(6)?;
    if &data[start..start + 4] == segment {
        Some(word(data, start + 4))
    } else {
        None
    }
}

impl BinaryInfo {
    /// Inspect file contents, returning `None` for anything but a binary load file
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() <= 6 || data[..2] != BINARY_MAGIC {
            return None;
        }

        let mut info = Self {
            load_start: word(data, 2),
            load_end: word(data, 4),
            init: None,
            run: None,
        };

        let len = data.len();
        if let Some(init) = vector_at(data, len, &INIT_SEGMENT) {
            info.init = Some(init);
            info.run = vector_at(data, len - 6, &RUN_SEGMENT);
        } else if let Some(run) = vector_at(data, len, &RUN_SEGMENT) {
            info.run = Some(run);
            info.init = vector_at(data, len - 6, &INIT_SEGMENT);
        }

        Some(info)
    }

    /// Bytes in the first segment
    pub fn load_size(&self) -> i32 {
        self.load_end as i32 + 1 - self.load_start as i32
    }
}

impl fmt::Display for BinaryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load_start=${:x} load_end=${:x}", self.load_start, self.load_end)?;
        if let Some(init) = self.init {
            write!(f, " init=${:x}", init)?;
        }
        if let Some(run) = self.run {
            write!(f, " run=${:x}", run)?;
        }
        Ok(())
    }
}
