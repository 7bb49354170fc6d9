/// ATR image and Atari DOS 2 byte-layout constants

/// ATR image header magic (little-endian 0x0296, "NICKATARI" checksum)
pub const ATR_MAGIC: [u8; 2] = [0x96, 0x02];

/// Size of the ATR header preceding sector 1
pub const ATR_HEADER_SIZE: usize = 16;

/// Offset of the image size in 16-byte paragraphs (low word)
pub const ATR_HEADER_PARAGRAPHS_OFFSET: usize = 2;

/// Offset of the sector size field
pub const ATR_HEADER_SECTOR_SIZE_OFFSET: usize = 4;

/// Offset of the high byte of the paragraph count
pub const ATR_HEADER_PARAGRAPHS_HIGH_OFFSET: usize = 6;

/// Sector size in bytes
pub const SECTOR_SIZE: usize = 128;

/// Tracks per disk for both supported densities
pub const TRACKS: usize = 40;

/// Boot sectors occupy 1..=3
pub const BOOT_SECTORS: [u16; 3] = [1, 2, 3];

/// VTOC / free space bitmap sector
pub const SECTOR_VTOC: u16 = 360;

/// VTOC2 sector (enhanced density only)
pub const SECTOR_VTOC2: u16 = 1024;

/// First directory sector
pub const SECTOR_DIR: u16 = 361;

/// Number of directory sectors
pub const DIR_SECTORS: u16 = 8;

/// Size of a directory entry
pub const DIR_ENTRY_SIZE: usize = 16;

/// Directory entries per sector
pub const DIR_ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / DIR_ENTRY_SIZE;

/// Total directory slots
pub const DIR_SLOTS: usize = DIR_SECTORS as usize * DIR_ENTRIES_PER_SECTOR;

/// Directory entry field offsets
pub const DIR_FLAG_OFFSET: usize = 0;
/// Sector count, little-endian word
pub const DIR_COUNT_OFFSET: usize = 1;
/// Starting sector, little-endian word
pub const DIR_START_OFFSET: usize = 3;
/// 8-byte space padded name
pub const DIR_NAME_OFFSET: usize = 5;
/// 3-byte space padded extension
pub const DIR_EXT_OFFSET: usize = 13;
/// Name field length
pub const DIR_NAME_LEN: usize = 8;
/// Extension field length
pub const DIR_EXT_LEN: usize = 3;

/// Payload bytes in a data sector
pub const DATA_SIZE: usize = 125;

/// File number (upper 6 bits) and next sector high bits (lower 2 bits)
pub const DATA_FILE_NUM: usize = 125;
/// Next sector low byte
pub const DATA_NEXT_LOW: usize = 126;
/// Count of payload bytes used in this sector
pub const DATA_BYTES: usize = 127;

/// VTOC type code offset
pub const VTOC_TYPE: usize = 0;
/// Total usable sectors, little-endian word
pub const VTOC_NUM_SECTS: usize = 1;
/// Free sector count, little-endian word
pub const VTOC_NUM_UNUSED: usize = 3;
/// Reserved byte
pub const VTOC_RESERVED: usize = 5;
/// Bitmap offset inside the VTOC sector
pub const VTOC_BITMAP: usize = 10;

/// DOS 2 VTOC type code
pub const VTOC_DOS2_TYPE: u8 = 2;

/// Bitmap bytes held by the VTOC (sectors 0..=719)
pub const SD_BITMAP_SIZE: usize = 90;

/// Bitmap bytes for an enhanced density disk (sectors 0..=1023)
pub const ED_BITMAP_SIZE: usize = 128;

/// First logical bitmap byte mirrored into VTOC2 (sector 48)
pub const ED_BITMAP_START: usize = 6;

/// Free count above sector 719, little-endian word inside VTOC2
pub const VTOC2_NUM_UNUSED: usize = 122;

/// Byte holding the end-of-line character in Atari text files
pub const ATASCII_EOL: u8 = 0x9B;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_geometry() {
        assert_eq!(DIR_ENTRIES_PER_SECTOR, 8);
        assert_eq!(DIR_SLOTS, 64);
        assert_eq!(DIR_EXT_OFFSET + DIR_EXT_LEN, DIR_ENTRY_SIZE);
    }

    #[test]
    fn test_bitmap_geometry() {
        // VTOC bitmap ends at byte 99 of the sector
        assert_eq!(VTOC_BITMAP + SD_BITMAP_SIZE, 100);
        // VTOC2 carries logical bytes 6..128 and its count follows them
        assert_eq!(ED_BITMAP_SIZE - ED_BITMAP_START, VTOC2_NUM_UNUSED);
    }
}
