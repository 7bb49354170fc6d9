/// Free space bitmap (VTOC / VTOC2)
///
/// On disk a set bit means the sector is free, most significant bit first.
/// The VTOC holds bits for sectors 0..=719 at offset 10. Enhanced density disks
/// add VTOC2 whose bytes 84..122 hold sectors 720..=1023; its first 84 bytes
/// repeat sectors 48..=719 and are written but never read.

use crate::error::Result;
use crate::format::*;
use crate::image::AtrImage;
use bit_vec::BitVec;
use log::{debug, warn};
use std::fmt;
use std::io::{Read, Seek, Write};
use std::ops::Range;

/// Logical free-space map covering every addressable sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: BitVec,
}

impl Bitmap {
    /// Decode raw MSB-first bitmap bytes, keeping `disk_size` bits
    ///
    /// Every bit is kept as stored, including the one for sector 0, so a VTOC
    /// that wrongly marks sector 0 free shows up in counts and checks. The
    /// allocator never hands it out.
    pub fn from_bytes(bytes: &[u8], disk_size: u16) -> Self {
        let mut bits = BitVec::from_bytes(bytes);
        bits.truncate(disk_size as usize);
        Self { bits }
    }

    /// Bitmap of a freshly formatted disk
    pub fn blank(density: Density) -> Self {
        let mut bits = BitVec::from_elem(density.disk_size() as usize, true);
        for sector in reserved_sectors() {
            bits.set(sector as usize, false);
        }
        Self { bits }
    }

    /// Encode back to MSB-first bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }

    /// Number of sectors covered
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True when the map covers no sectors
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Is the sector covered by this map
    pub fn contains(&self, sector: u16) -> bool {
        (sector as usize) < self.bits.len()
    }

    /// Is the sector free (sectors outside the map are never free)
    pub fn is_free(&self, sector: u16) -> bool {
        self.bits.get(sector as usize).unwrap_or(false)
    }

    /// Release a sector; sector 0 and sectors outside the map are ignored
    pub fn mark_free(&mut self, sector: u16) {
        if sector != 0 && self.contains(sector) {
            self.bits.set(sector as usize, true);
        }
    }

    /// Mark a sector in use; sectors outside the map are ignored
    pub fn mark_allocated(&mut self, sector: u16) {
        if self.contains(sector) {
            self.bits.set(sector as usize, false);
        }
    }

    /// Count of free sectors
    pub fn free_count(&self) -> usize {
        self.bits.iter().filter(|free| *free).count()
    }

    /// Count of free sectors within a range, clipped to the map
    pub fn free_count_in(&self, range: Range<u16>) -> usize {
        let end = (range.end as usize).min(self.bits.len());
        let start = (range.start as usize).min(end);
        (start..end).filter(|&i| self.bits[i]).count()
    }

    /// Iterate over free sector numbers in ascending order
    pub fn free_sectors(&self) -> impl Iterator<Item = u16> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, free)| *free)
            .map(|(sector, _)| sector as u16)
    }
}

/// Problem found while validating the VTOC header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VtocWarning {
    /// VTOC free count differs from its bitmap
    FreeCountMismatch {
        /// Free sectors counted in the bitmap
        bitmap: usize,
        /// Count stored in the VTOC
        recorded: usize,
    },
    /// VTOC usable sector total is not the value for this density
    UsableSectorsMismatch {
        /// Expected total
        expected: usize,
        /// Stored total
        found: usize,
    },
    /// VTOC type code is not DOS 2
    WrongTypeCode {
        /// Stored type code
        found: u8,
    },
    /// VTOC2 free count differs from its bitmap
    Vtoc2FreeCountMismatch {
        /// Free sectors counted in the bitmap
        bitmap: usize,
        /// Count stored in VTOC2
        recorded: usize,
    },
}

impl fmt::Display for VtocWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VtocWarning::FreeCountMismatch { bitmap, recorded } => write!(
                f,
                "VTOC unused count doesn't match: bitmap has {} free, but VTOC count is {}",
                bitmap, recorded
            ),
            VtocWarning::UsableSectorsMismatch { expected, found } => write!(
                f,
                "VTOC usable sector count should be {}, found {}",
                expected, found
            ),
            VtocWarning::WrongTypeCode { found } => write!(
                f,
                "VTOC type code should be {}, found {}",
                VTOC_DOS2_TYPE, found
            ),
            VtocWarning::Vtoc2FreeCountMismatch { bitmap, recorded } => write!(
                f,
                "VTOC2 unused count doesn't match: bitmap has {} free, but VTOC2 count is {}",
                bitmap, recorded
            ),
        }
    }
}

fn read_word(buf: &[u8], offset: usize) -> usize {
    u16::from_le_bytes([buf[offset], buf[offset + 1]]) as usize
}

fn write_word(buf: &mut [u8], offset: usize, value: usize) {
    buf[offset..offset + 2].copy_from_slice(&(value as u16).to_le_bytes());
}

/// VTOC-held range of sectors
fn vtoc_range() -> Range<u16> {
    0..(SD_BITMAP_SIZE * 8) as u16
}

/// VTOC2-authoritative range of sectors
fn vtoc2_range() -> Range<u16> {
    (SD_BITMAP_SIZE * 8) as u16..(ED_BITMAP_SIZE * 8) as u16
}

/// Load the bitmap, optionally validating the VTOC header fields
///
/// Validation never fails the load; every problem found is returned as a warning.
pub fn load_bitmap<S: Read + Write + Seek>(
    image: &mut AtrImage<S>,
    validate: bool,
) -> Result<(Bitmap, Vec<VtocWarning>)> {
    let density = image.density();
    let vtoc = image.read_sector(SECTOR_VTOC)?;
    let mut bytes = vtoc[VTOC_BITMAP..VTOC_BITMAP + SD_BITMAP_SIZE].to_vec();

    let vtoc2 = if density.has_vtoc2() {
        let vtoc2 = image.read_sector(SECTOR_VTOC2)?;
        let high = SD_BITMAP_SIZE - ED_BITMAP_START;
        bytes.extend_from_slice(&vtoc2[high..high + ED_BITMAP_SIZE - SD_BITMAP_SIZE]);
        Some(vtoc2)
    } else {
        None
    };

    let bitmap = Bitmap::from_bytes(&bytes, density.disk_size());

    let mut warnings = Vec::new();
    if validate {
        let count = bitmap.free_count_in(vtoc_range());
        let recorded = read_word(&vtoc, VTOC_NUM_UNUSED);
        if count != recorded {
            warnings.push(VtocWarning::FreeCountMismatch {
                bitmap: count,
                recorded,
            });
        }

        let total = read_word(&vtoc, VTOC_NUM_SECTS);
        let expected = density.usable_sectors() as usize;
        if total != expected {
            warnings.push(VtocWarning::UsableSectorsMismatch {
                expected,
                found: total,
            });
        }

        if vtoc[VTOC_TYPE] != VTOC_DOS2_TYPE {
            warnings.push(VtocWarning::WrongTypeCode {
                found: vtoc[VTOC_TYPE],
            });
        }

        if let Some(vtoc2) = vtoc2 {
            let count = bitmap.free_count_in(vtoc2_range());
            let recorded = read_word(&vtoc2, VTOC2_NUM_UNUSED);
            if count != recorded {
                warnings.push(VtocWarning::Vtoc2FreeCountMismatch {
                    bitmap: count,
                    recorded,
                });
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
    }

    Ok((bitmap, warnings))
}

/// Write the bitmap back, recomputing the free counts
pub fn store_bitmap<S: Read + Write + Seek>(image: &mut AtrImage<S>, bitmap: &Bitmap) -> Result<()> {
    let mut bytes = bitmap.to_bytes();
    bytes.resize(ED_BITMAP_SIZE, 0);

    let mut vtoc = image.read_sector(SECTOR_VTOC)?;
    vtoc[VTOC_BITMAP..VTOC_BITMAP + SD_BITMAP_SIZE].copy_from_slice(&bytes[..SD_BITMAP_SIZE]);
    let count = bitmap.free_count_in(vtoc_range());
    write_word(&mut vtoc, VTOC_NUM_UNUSED, count);
    image.write_sector(SECTOR_VTOC, &vtoc)?;

    if image.density().has_vtoc2() {
        let mut vtoc2 = image.read_sector(SECTOR_VTOC2)?;
        vtoc2[..ED_BITMAP_SIZE - ED_BITMAP_START].copy_from_slice(&bytes[ED_BITMAP_START..]);
        let count2 = bitmap.free_count_in(vtoc2_range());
        write_word(&mut vtoc2, VTOC2_NUM_UNUSED, count2);
        image.write_sector(SECTOR_VTOC2, &vtoc2)?;
        debug!("Stored bitmap: {} free in VTOC, {} free in VTOC2", count, count2);
    } else {
        debug!("Stored bitmap: {} free", count);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn image(density: Density) -> AtrImage<Cursor<Vec<u8>>> {
        AtrImage::create(Cursor::new(Vec::new()), density).unwrap()
    }

    #[test]
    fn test_bit_order_is_msb_first() {
        let bitmap = Bitmap::from_bytes(&[0b0100_0000, 0b0000_0001], 16);
        assert!(bitmap.is_free(1));
        assert!(bitmap.is_free(15));
        assert!(!bitmap.is_free(0));
        assert!(!bitmap.is_free(2));
    }

    #[test]
    fn test_sector_zero_bit_kept_as_stored() {
        let bitmap = Bitmap::from_bytes(&[0xFF; 90], 720);
        assert!(bitmap.is_free(0));
        assert_eq!(bitmap.free_count(), 720);
        assert_eq!(bitmap.to_bytes(), vec![0xFF; 90]);
    }

    #[test]
    fn test_mark_free_ignores_sector_zero() {
        let mut bitmap = Bitmap::blank(Density::Single);
        bitmap.mark_free(0);
        assert!(!bitmap.is_free(0));
        assert_eq!(bitmap.free_count(), 707);
    }

    #[test]
    fn test_load_keeps_sector_zero_free_bit() {
        let mut image = image(Density::Single);
        let mut vtoc = image.read_sector(SECTOR_VTOC).unwrap();
        vtoc[VTOC_BITMAP] |= 0x80;
        write_word(&mut vtoc, VTOC_NUM_UNUSED, 708);
        image.write_sector(SECTOR_VTOC, &vtoc).unwrap();

        let (bitmap, warnings) = load_bitmap(&mut image, true).unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert!(bitmap.is_free(0));
        assert_eq!(bitmap.free_count(), 708);
    }

    #[test]
    fn test_mark_outside_map_is_ignored() {
        let mut bitmap = Bitmap::blank(Density::Single);
        let before = bitmap.clone();
        bitmap.mark_free(720);
        bitmap.mark_allocated(1000);
        assert_eq!(bitmap, before);
        assert!(!bitmap.is_free(720));
    }

    #[test]
    fn test_blank_free_counts() {
        assert_eq!(Bitmap::blank(Density::Single).free_count(), 707);
        assert_eq!(Bitmap::blank(Density::Enhanced).free_count(), 1011);
    }

    #[test]
    fn test_load_blank_has_no_warnings() {
        for density in [Density::Single, Density::Enhanced] {
            let mut image = image(density);
            let (bitmap, warnings) = load_bitmap(&mut image, true).unwrap();
            assert!(warnings.is_empty(), "{:?}", warnings);
            assert_eq!(bitmap, Bitmap::blank(density));
        }
    }

    #[test]
    fn test_store_recomputes_counts() {
        let mut image = image(Density::Enhanced);
        let (mut bitmap, _) = load_bitmap(&mut image, false).unwrap();
        bitmap.mark_allocated(4);
        bitmap.mark_allocated(800);
        bitmap.mark_allocated(801);
        store_bitmap(&mut image, &bitmap).unwrap();

        let vtoc = image.read_sector(SECTOR_VTOC).unwrap();
        assert_eq!(read_word(&vtoc, VTOC_NUM_UNUSED), 706);
        let vtoc2 = image.read_sector(SECTOR_VTOC2).unwrap();
        assert_eq!(read_word(&vtoc2, VTOC2_NUM_UNUSED), 302);

        let (reloaded, warnings) = load_bitmap(&mut image, true).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(reloaded, bitmap);
    }

    #[test]
    fn test_vtoc2_mirrors_low_range() {
        let mut image = image(Density::Enhanced);
        let (mut bitmap, _) = load_bitmap(&mut image, false).unwrap();
        bitmap.mark_allocated(48);
        store_bitmap(&mut image, &bitmap).unwrap();

        let vtoc2 = image.read_sector(SECTOR_VTOC2).unwrap();
        // Sector 48 is the top bit of VTOC2 byte 0
        assert_eq!(vtoc2[0] & 0x80, 0);
        assert_eq!(vtoc2[0] & 0x40, 0x40);
    }

    #[test]
    fn test_vtoc2_low_range_is_not_read() {
        let mut image = image(Density::Enhanced);
        let mut vtoc2 = image.read_sector(SECTOR_VTOC2).unwrap();
        vtoc2[..84].fill(0);
        image.write_sector(SECTOR_VTOC2, &vtoc2).unwrap();

        let (bitmap, warnings) = load_bitmap(&mut image, true).unwrap();
        assert!(warnings.is_empty());
        assert!(bitmap.is_free(48));
    }

    #[test]
    fn test_validation_warnings() {
        let mut image = image(Density::Single);
        let mut vtoc = image.read_sector(SECTOR_VTOC).unwrap();
        vtoc[VTOC_TYPE] = 0;
        write_word(&mut vtoc, VTOC_NUM_SECTS, 1011);
        write_word(&mut vtoc, VTOC_NUM_UNUSED, 700);
        image.write_sector(SECTOR_VTOC, &vtoc).unwrap();

        let (_, warnings) = load_bitmap(&mut image, true).unwrap();
        assert_eq!(
            warnings,
            vec![
                VtocWarning::FreeCountMismatch {
                    bitmap: 707,
                    recorded: 700
                },
                VtocWarning::UsableSectorsMismatch {
                    expected: 707,
                    found: 1011
                },
                VtocWarning::WrongTypeCode { found: 0 },
            ]
        );

        let (_, unchecked) = load_bitmap(&mut image, false).unwrap();
        assert!(unchecked.is_empty());
    }

    #[test]
    fn test_vtoc2_count_warning() {
        let mut image = image(Density::Enhanced);
        let mut vtoc2 = image.read_sector(SECTOR_VTOC2).unwrap();
        write_word(&mut vtoc2, VTOC2_NUM_UNUSED, 0);
        image.write_sector(SECTOR_VTOC2, &vtoc2).unwrap();

        let (_, warnings) = load_bitmap(&mut image, true).unwrap();
        assert_eq!(
            warnings,
            vec![VtocWarning::Vtoc2FreeCountMismatch {
                bitmap: 304,
                recorded: 0
            }]
        );
    }
}
