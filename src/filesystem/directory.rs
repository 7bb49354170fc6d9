/// Atari DOS 2 directory
///
/// Directory format:
/// - Sectors 361..=368, 8 entries of 16 bytes per sector, 64 slots in total
/// - A slot's index is its linear position and doubles as the file number
///   stamped into every data sector of the file
/// - Slots are never compacted; deleting a file only rewrites its flag byte

use crate::error::Result;
use crate::format::*;
use crate::image::AtrImage;
use log::debug;
use std::fmt;
use std::io::{Read, Seek, Write};

/// Directory entry flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags(pub u8);

impl EntryFlags {
    /// File opened for output - Bit 0
    pub const OPENED: u8 = 0x01;

    /// Created by DOS 2 - Bit 1
    pub const DOS2: u8 = 0x02;

    /// File locked - Bit 5
    pub const LOCKED: u8 = 0x20;

    /// Entry in use - Bit 6
    pub const IN_USE: u8 = 0x40;

    /// Entry deleted - Bit 7
    pub const DELETED: u8 = 0x80;

    /// Flags DOS 2 writes for a newly closed file
    pub const NEW_FILE: u8 = Self::IN_USE | Self::DOS2;

    /// Create flags from a raw byte
    #[inline]
    pub fn new(value: u8) -> Self {
        EntryFlags(value)
    }

    /// Check if the entry is in use
    #[inline]
    pub fn in_use(&self) -> bool {
        (self.0 & Self::IN_USE) != 0
    }

    /// Check if the entry is deleted
    #[inline]
    pub fn deleted(&self) -> bool {
        (self.0 & Self::DELETED) != 0
    }

    /// Check if the file is locked
    #[inline]
    pub fn locked(&self) -> bool {
        (self.0 & Self::LOCKED) != 0
    }

    /// Check if the file was left open for output
    #[inline]
    pub fn opened(&self) -> bool {
        (self.0 & Self::OPENED) != 0
    }

    /// Check if the file was created by DOS 2
    #[inline]
    pub fn dos2(&self) -> bool {
        (self.0 & Self::DOS2) != 0
    }
}

impl fmt::Display for EntryFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "Never used");
        }
        let mut flags = Vec::new();
        if self.deleted() {
            flags.push("Deleted");
        }
        if self.in_use() {
            flags.push("In use");
        }
        if self.locked() {
            flags.push("Locked");
        }
        if self.dos2() {
            flags.push("DOS 2");
        }
        if self.opened() {
            flags.push("Open");
        }
        write!(f, "{}", flags.join(", "))
    }
}

/// One 16-byte directory slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirEntry {
    /// Slot index (0..64), also the file number
    pub slot: usize,
    /// Flag byte
    pub flags: EntryFlags,
    /// Number of sectors in the file
    pub sector_count: u16,
    /// First sector of the file
    pub start_sector: u16,
    /// Space padded upper case name
    pub name: [u8; DIR_NAME_LEN],
    /// Space padded upper case extension
    pub ext: [u8; DIR_EXT_LEN],
}

impl RawDirEntry {
    /// Parse a directory entry from 16 bytes
    pub fn parse(data: &[u8], slot: usize) -> Option<Self> {
        if data.len() < DIR_ENTRY_SIZE {
            return None;
        }

        let mut name = [0u8; DIR_NAME_LEN];
        let mut ext = [0u8; DIR_EXT_LEN];
        name.copy_from_slice(&data[DIR_NAME_OFFSET..DIR_NAME_OFFSET + DIR_NAME_LEN]);
        ext.copy_from_slice(&data[DIR_EXT_OFFSET..DIR_EXT_OFFSET + DIR_EXT_LEN]);

        Some(Self {
            slot,
            flags: EntryFlags::new(data[DIR_FLAG_OFFSET]),
            sector_count: u16::from_le_bytes([data[DIR_COUNT_OFFSET], data[DIR_COUNT_OFFSET + 1]]),
            start_sector: u16::from_le_bytes([data[DIR_START_OFFSET], data[DIR_START_OFFSET + 1]]),
            name,
            ext,
        })
    }

    /// Create a new in-use entry, truncating the name to 8.3
    pub fn new(slot: usize, filename: &str, start_sector: u16, sector_count: u16) -> Self {
        let (name, ext) = encode_name(filename);
        Self {
            slot,
            flags: EntryFlags::new(EntryFlags::NEW_FILE),
            sector_count,
            start_sector,
            name,
            ext,
        }
    }

    /// Encode to the on-disk 16 bytes
    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut data = [0u8; DIR_ENTRY_SIZE];
        data[DIR_FLAG_OFFSET] = self.flags.0;
        data[DIR_COUNT_OFFSET..DIR_COUNT_OFFSET + 2].copy_from_slice(&self.sector_count.to_le_bytes());
        data[DIR_START_OFFSET..DIR_START_OFFSET + 2].copy_from_slice(&self.start_sector.to_le_bytes());
        data[DIR_NAME_OFFSET..DIR_NAME_OFFSET + DIR_NAME_LEN].copy_from_slice(&self.name);
        data[DIR_EXT_OFFSET..DIR_EXT_OFFSET + DIR_EXT_LEN].copy_from_slice(&self.ext);
        data
    }

    /// Name as stored, e.g. "DOS.SYS"
    pub fn atari_name(&self) -> String {
        decode_name(&self.name, &self.ext)
    }

    /// Name as presented on the host, e.g. "dos.sys"
    pub fn filename(&self) -> String {
        self.atari_name().to_ascii_lowercase()
    }

    /// Does the stored name match, ignoring case
    pub fn matches(&self, name: &str) -> bool {
        self.atari_name().eq_ignore_ascii_case(name)
    }

    /// Is this a .SYS file (hidden from plain listings)
    pub fn is_system(&self) -> bool {
        &self.ext == b"SYS"
    }
}

/// Encode a host name into space padded 8.3 fields
///
/// Lower case is raised. Characters past 8 in the name or 3 in the extension
/// are dropped without complaint.
pub fn encode_name(filename: &str) -> ([u8; DIR_NAME_LEN], [u8; DIR_EXT_LEN]) {
    let mut name = [b' '; DIR_NAME_LEN];
    let mut ext = [b' '; DIR_EXT_LEN];

    let (base, suffix) = match filename.split_once('.') {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (filename, None),
    };

    for (slot, byte) in name.iter_mut().zip(base.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    if let Some(suffix) = suffix {
        for (slot, byte) in ext.iter_mut().zip(suffix.bytes()) {
            *slot = byte.to_ascii_uppercase();
        }
    }

    (name, ext)
}

/// Decode 8.3 fields to "NAME.EXT", dropping the period when there is no extension
pub fn decode_name(name: &[u8], ext: &[u8]) -> String {
    let name = String::from_utf8_lossy(name).trim_end().to_string();
    let ext = String::from_utf8_lossy(ext).trim_end().to_string();

    if ext.is_empty() {
        name
    } else {
        format!("{}.{}", name, ext)
    }
}

/// Directory sector and byte offset holding a slot
fn slot_location(slot: usize) -> (u16, usize) {
    let sector = SECTOR_DIR + (slot / DIR_ENTRIES_PER_SECTOR) as u16;
    let offset = (slot % DIR_ENTRIES_PER_SECTOR) * DIR_ENTRY_SIZE;
    (sector, offset)
}

/// Read every slot, in use or not, in slot order
pub fn read_slots<S: Read + Write + Seek>(image: &mut AtrImage<S>) -> Result<Vec<RawDirEntry>> {
    let mut entries = Vec::with_capacity(DIR_SLOTS);

    for index in 0..DIR_SECTORS {
        let sector = image.read_sector(SECTOR_DIR + index)?;
        for (i, chunk) in sector.chunks(DIR_ENTRY_SIZE).enumerate() {
            let slot = index as usize * DIR_ENTRIES_PER_SECTOR + i;
            if let Some(entry) = RawDirEntry::parse(chunk, slot) {
                entries.push(entry);
            }
        }
    }

    Ok(entries)
}

/// List in-use entries in slot order
pub fn list_entries<S: Read + Write + Seek>(image: &mut AtrImage<S>) -> Result<Vec<RawDirEntry>> {
    Ok(read_slots(image)?
        .into_iter()
        .filter(|e| e.flags.in_use())
        .collect())
}

/// Find the first in-use entry with this name
///
/// With `delete` set the entry's flag byte becomes the deleted marker and its
/// directory sector is written back straight away.
pub fn find_by_name<S: Read + Write + Seek>(
    image: &mut AtrImage<S>,
    name: &str,
    delete: bool,
) -> Result<Option<RawDirEntry>> {
    let Some(entry) = list_entries(image)?.into_iter().find(|e| e.matches(name)) else {
        return Ok(None);
    };

    if delete {
        delete_slot(image, entry.slot)?;
    }

    Ok(Some(entry))
}

/// Overwrite a slot's flag byte with the deleted marker
pub fn delete_slot<S: Read + Write + Seek>(image: &mut AtrImage<S>, slot: usize) -> Result<()> {
    let (sector, offset) = slot_location(slot);
    let mut buf = image.read_sector(sector)?;
    buf[offset + DIR_FLAG_OFFSET] = EntryFlags::DELETED;
    image.write_sector(sector, &buf)?;
    debug!("Marked slot {} deleted", slot);
    Ok(())
}

/// First slot whose in-use bit is clear
pub fn find_free_slot<S: Read + Write + Seek>(image: &mut AtrImage<S>) -> Result<Option<usize>> {
    Ok(read_slots(image)?
        .into_iter()
        .find(|e| !e.flags.in_use())
        .map(|e| e.slot))
}

/// Write a new in-use entry into a slot
pub fn write_entry<S: Read + Write + Seek>(
    image: &mut AtrImage<S>,
    slot: usize,
    name: &str,
    first_sector: u16,
    sector_count: u16,
) -> Result<RawDirEntry> {
    let entry = RawDirEntry::new(slot, name, first_sector, sector_count);
    let (sector, offset) = slot_location(slot);

    let mut buf = image.read_sector(sector)?;
    buf[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
    image.write_sector(sector, &buf)?;

    debug!(
        "Wrote slot {}: {} start={} sectors={}",
        slot,
        entry.atari_name(),
        first_sector,
        sector_count
    );
    Ok(entry)
}
