/// Sector map visualization

use crate::error::Result;
use crate::filesystem::bitmap::{load_bitmap, Bitmap};
use crate::format::{reserved_sectors, Density, TRACKS};
use crate::image::AtrImage;
use std::fmt;
use std::io::{Read, Seek, Write};

/// ANSI color codes for sector map
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT_WHITE: &str = "\x1b[97m";
    pub const DARK_WHITE: &str = "\x1b[37m";
    pub const DARK_RED: &str = "\x1b[2;31m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
}

const BLOCK_NO_DATA: &str = "\u{2591}"; // ░ - Light shade (free)
const BLOCK_HAS_DATA: &str = "\u{2593}"; // ▓ - Dark shade (in-use)

/// How a sector is used according to the bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorUse {
    /// Boot, VTOC, directory or VTOC2
    Reserved,
    /// Marked in use
    Allocated,
    /// Marked free
    Free,
    /// Present in the image but beyond what DOS can address
    Unreachable,
}

/// Classify one sector
pub fn classify(bitmap: &Bitmap, density: Density, sector: u16) -> SectorUse {
    if reserved_sectors().any(|s| s == sector) || (density.has_vtoc2() && sector == 1024) {
        SectorUse::Reserved
    } else if !bitmap.contains(sector) {
        SectorUse::Unreachable
    } else if bitmap.is_free(sector) {
        SectorUse::Free
    } else {
        SectorUse::Allocated
    }
}

/// Allocation map of one image, drawn through Display
pub struct SectorMap {
    bitmap: Bitmap,
    density: Density,
}

impl SectorMap {
    /// Load the bitmap without validation
    pub fn load<S: Read + Write + Seek>(image: &mut AtrImage<S>) -> Result<Self> {
        let (bitmap, _) = load_bitmap(image, false)?;
        Ok(Self {
            bitmap,
            density: image.density(),
        })
    }
}

impl fmt::Display for SectorMap {
    /// One column per track, sector position up the side
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_track = self.density.sectors_per_track();

        writeln!(f, "=== Sector Map ({}) ===", self.density)?;
        writeln!(
            f,
            "Legend: {}In Use{} {}Free{} {}Reserved{} {}Unreachable{}",
            colors::BRIGHT_WHITE,
            colors::RESET,
            colors::DARK_WHITE,
            colors::RESET,
            colors::BRIGHT_YELLOW,
            colors::RESET,
            colors::DARK_RED,
            colors::RESET
        )?;
        writeln!(f)?;

        // Bottom row is the first sector of each track
        for pos in (0..per_track).rev() {
            write!(f, "{:>2} ", pos + 1)?;
            for track in 0..TRACKS {
                let sector = (track * per_track + pos + 1) as u16;
                let (color, block) = match classify(&self.bitmap, self.density, sector) {
                    SectorUse::Reserved => (colors::BRIGHT_YELLOW, BLOCK_HAS_DATA),
                    SectorUse::Allocated => (colors::BRIGHT_WHITE, BLOCK_HAS_DATA),
                    SectorUse::Free => (colors::DARK_WHITE, BLOCK_NO_DATA),
                    SectorUse::Unreachable => (colors::DARK_RED, BLOCK_NO_DATA),
                };
                write!(f, "{}{}{}", color, block, colors::RESET)?;
            }
            writeln!(f)?;
        }

        // Track axis, labels every 5 tracks
        write!(f, "   ")?;
        let mut track = 0;
        while track < TRACKS {
            if track % 5 == 0 {
                let label = track.to_string();
                write!(f, "{}", label)?;
                track += label.len();
            } else {
                write!(f, " ")?;
                track += 1;
            }
        }
        writeln!(f)
    }
}

/// Render the allocation map to a string
pub fn render_sector_map<S: Read + Write + Seek>(image: &mut AtrImage<S>) -> Result<String> {
    Ok(SectorMap::load(image)?.to_string())
}

/// Print the allocation map to stdout
pub fn draw_sector_map<S: Read + Write + Seek>(image: &mut AtrImage<S>) -> Result<()> {
    print!("{}", render_sector_map(image)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_classify() {
        let bitmap = Bitmap::blank(Density::Enhanced);
        let d = Density::Enhanced;
        assert_eq!(classify(&bitmap, d, 1), SectorUse::Reserved);
        assert_eq!(classify(&bitmap, d, 360), SectorUse::Reserved);
        assert_eq!(classify(&bitmap, d, 4), SectorUse::Free);
        assert_eq!(classify(&bitmap, d, 1024), SectorUse::Reserved);
        assert_eq!(classify(&bitmap, d, 1030), SectorUse::Unreachable);
    }

    #[test]
    fn test_render_dimensions() {
        let mut image = AtrImage::create(Cursor::new(Vec::new()), Density::Single).unwrap();
        let map = render_sector_map(&mut image).unwrap();
        let lines: Vec<&str> = map.lines().collect();
        // Title, legend, blank, 18 rows, axis
        assert_eq!(lines.len(), 22);
        assert!(lines[3].starts_with("18 "));
        assert_eq!(lines[3].matches(BLOCK_HAS_DATA).count() + lines[3].matches(BLOCK_NO_DATA).count(), 40);
        assert!(lines[21].starts_with("   0    5    10"));
    }
}
