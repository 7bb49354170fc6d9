/// ATR geometry and byte-layout constants

/// Format constants
pub mod constants;

pub use constants::*;

/// Disk density, fixed when an image is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Density {
    /// DOS 2.0S single density: 40 tracks of 18 sectors
    Single,
    /// DOS 2.5 enhanced density: 40 tracks of 26 sectors, with VTOC2
    Enhanced,
}

impl Density {
    /// Sectors per track
    pub fn sectors_per_track(&self) -> usize {
        match self {
            Density::Single => 18,
            Density::Enhanced => 26,
        }
    }

    /// Number of sectors stored in the image
    pub fn image_sectors(&self) -> u16 {
        (TRACKS * self.sectors_per_track()) as u16
    }

    /// Largest reachable sector + 1 (bits in the logical bitmap)
    ///
    /// Single density cannot reach sector 720 because the VTOC has no bit for it.
    /// Enhanced density stops at 1023 because chain links are 10 bits.
    pub fn disk_size(&self) -> u16 {
        match self {
            Density::Single => 720,
            Density::Enhanced => 1024,
        }
    }

    /// Usable sector count DOS records in the VTOC
    pub fn usable_sectors(&self) -> u16 {
        match self {
            Density::Single => 707,
            Density::Enhanced => 1011,
        }
    }

    /// Does this density carry a VTOC2 sector
    pub fn has_vtoc2(&self) -> bool {
        matches!(self, Density::Enhanced)
    }

    /// Size of the whole image file in bytes, header included
    pub fn image_len(&self) -> u64 {
        (ATR_HEADER_SIZE + self.image_sectors() as usize * SECTOR_SIZE) as u64
    }

    /// Identify density from the image file length
    pub fn from_image_len(len: u64) -> Option<Self> {
        [Density::Single, Density::Enhanced]
            .into_iter()
            .find(|d| d.image_len() == len)
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Density::Single => "DOS 2.0S single density",
            Density::Enhanced => "DOS 2.5 enhanced density",
        }
    }
}

/// Sectors DOS never gives to files: the non-existent sector 0, boot, VTOC and directory
pub fn reserved_sectors() -> impl Iterator<Item = u16> {
    std::iter::once(0)
        .chain(BOOT_SECTORS)
        .chain(std::iter::once(SECTOR_VTOC))
        .chain(SECTOR_DIR..SECTOR_DIR + DIR_SECTORS)
}

impl std::fmt::Display for Density {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_sizes() {
        assert_eq!(Density::Single.image_len(), 92_176);
        assert_eq!(Density::Enhanced.image_len(), 133_136);
    }

    #[test]
    fn test_detect_density() {
        assert_eq!(Density::from_image_len(92_176), Some(Density::Single));
        assert_eq!(Density::from_image_len(133_136), Some(Density::Enhanced));
        assert_eq!(Density::from_image_len(92_160), None);
        assert_eq!(Density::from_image_len(184_336), None);
    }

    #[test]
    fn test_usable_sectors() {
        // Everything below disk_size except sector 0, boot, VTOC and directory
        for density in [Density::Single, Density::Enhanced] {
            let reserved = reserved_sectors().count() as u16;
            assert_eq!(density.usable_sectors(), density.disk_size() - reserved);
        }
    }
}
