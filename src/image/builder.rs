/// Builder for creating blank formatted ATR images

use crate::error::Result;
use crate::filesystem::bitmap::{store_bitmap, Bitmap};
use crate::format::*;
use crate::image::AtrImage;
use log::debug;
use std::io::{Read, Seek, SeekFrom, Write};

/// Builder for constructing empty DOS 2 disks
#[derive(Debug, Clone)]
pub struct AtrImageBuilder {
    density: Density,
}

impl Default for AtrImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AtrImageBuilder {
    /// Create a new builder for a single density disk
    pub fn new() -> Self {
        Self {
            density: Density::Single,
        }
    }

    /// Set the density
    pub fn density(mut self, density: Density) -> Self {
        self.density = density;
        self
    }

    /// Build the 16-byte ATR header
    fn header(&self) -> [u8; ATR_HEADER_SIZE] {
        let mut header = [0u8; ATR_HEADER_SIZE];
        let paragraphs = (self.density.image_sectors() as usize * SECTOR_SIZE / 16) as u32;
        let paragraph_bytes = paragraphs.to_le_bytes();

        header[..ATR_MAGIC.len()].copy_from_slice(&ATR_MAGIC);
        header[ATR_HEADER_PARAGRAPHS_OFFSET] = paragraph_bytes[0];
        header[ATR_HEADER_PARAGRAPHS_OFFSET + 1] = paragraph_bytes[1];
        header[ATR_HEADER_SECTOR_SIZE_OFFSET..ATR_HEADER_SECTOR_SIZE_OFFSET + 2]
            .copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        header[ATR_HEADER_PARAGRAPHS_HIGH_OFFSET] = paragraph_bytes[2];
        header
    }

    /// Write a blank disk into `storage`, which should be empty
    pub fn build<S: Read + Write + Seek>(self, mut storage: S) -> Result<AtrImage<S>> {
        storage.seek(SeekFrom::Start(0))?;
        storage.write_all(&self.header())?;
        let data = vec![0u8; self.density.image_sectors() as usize * SECTOR_SIZE];
        storage.write_all(&data)?;

        let mut image = AtrImage::with_density(storage, self.density);

        let mut vtoc = [0u8; SECTOR_SIZE];
        vtoc[VTOC_TYPE] = VTOC_DOS2_TYPE;
        vtoc[VTOC_NUM_SECTS..VTOC_NUM_SECTS + 2]
            .copy_from_slice(&self.density.usable_sectors().to_le_bytes());
        image.write_sector(SECTOR_VTOC, &vtoc)?;

        store_bitmap(&mut image, &Bitmap::blank(self.density))?;
        image.flush()?;

        debug!("Formatted blank {} image", self.density);
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header() {
        let header = AtrImageBuilder::new().header();
        assert_eq!(&header[..2], &[0x96, 0x02]);
        // 92160 / 16 = 5760 = 0x1680
        assert_eq!(header[2], 0x80);
        assert_eq!(header[3], 0x16);
        assert_eq!(header[4], 0x80);
        assert_eq!(header[5], 0x00);
        assert_eq!(header[6], 0x00);
    }

    #[test]
    fn test_build_sizes() {
        for density in [Density::Single, Density::Enhanced] {
            let image = AtrImageBuilder::new()
                .density(density)
                .build(Cursor::new(Vec::new()))
                .unwrap();
            let raw = image.into_inner().into_inner();
            assert_eq!(raw.len() as u64, density.image_len());

            // The result must be recognised when reopened
            let reopened = AtrImage::from_storage(Cursor::new(raw)).unwrap();
            assert_eq!(reopened.density(), density);
        }
    }

    #[test]
    fn test_blank_vtoc() {
        let mut image = AtrImageBuilder::new()
            .density(Density::Enhanced)
            .build(Cursor::new(Vec::new()))
            .unwrap();
        let vtoc = image.read_sector(SECTOR_VTOC).unwrap();
        assert_eq!(vtoc[VTOC_TYPE], 2);
        assert_eq!(u16::from_le_bytes([vtoc[1], vtoc[2]]), 1011);
        assert_eq!(u16::from_le_bytes([vtoc[3], vtoc[4]]), 707);
        let vtoc2 = image.read_sector(SECTOR_VTOC2).unwrap();
        assert_eq!(u16::from_le_bytes([vtoc2[122], vtoc2[123]]), 304);
    }
}
