/// ATR image sector store

/// Builder for blank formatted images
pub mod builder;

pub use builder::AtrImageBuilder;

use crate::error::{AtrError, Result};
use crate::format::{Density, ATR_HEADER_SIZE, SECTOR_SIZE};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// One 128-byte sector
pub type SectorBuf = [u8; SECTOR_SIZE];

/// Sector-addressed access to an ATR image
///
/// Sector numbers are 1-based and every call is a direct positioned read or
/// write on the underlying storage; nothing is cached.
#[derive(Debug)]
pub struct AtrImage<S = File> {
    storage: S,
    density: Density,
    filename: Option<String>,
}

impl AtrImage<File> {
    /// Open an existing ATR file for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let filename = path
            .as_ref()
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string());

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut image = Self::from_storage(file)?;
        image.filename = filename;
        Ok(image)
    }

    /// Create a new blank formatted ATR file, replacing any existing one
    pub fn create_file<P: AsRef<Path>>(path: P, density: Density) -> Result<Self> {
        let filename = path
            .as_ref()
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let mut image = AtrImageBuilder::new().density(density).build(file)?;
        image.filename = filename;
        Ok(image)
    }
}

impl<S: Read + Write + Seek> AtrImage<S> {
    /// Wrap existing storage, detecting density from its length
    pub fn from_storage(mut storage: S) -> Result<Self> {
        let len = storage.seek(SeekFrom::End(0))?;
        let density = Density::from_image_len(len).ok_or_else(|| {
            AtrError::invalid_format(format!(
                "unknown disk size {} bytes, expected {} ({}) or {} ({})",
                len,
                Density::Single.image_len(),
                Density::Single,
                Density::Enhanced.image_len(),
                Density::Enhanced
            ))
        })?;
        debug!("{} image assumed ({} bytes)", density, len);

        Ok(Self {
            storage,
            density,
            filename: None,
        })
    }

    /// Format blank storage as an empty DOS 2 disk
    pub fn create(storage: S, density: Density) -> Result<Self> {
        AtrImageBuilder::new().density(density).build(storage)
    }

    /// Create a new builder for blank images
    pub fn builder() -> AtrImageBuilder {
        AtrImageBuilder::new()
    }

    pub(crate) fn with_density(storage: S, density: Density) -> Self {
        Self {
            storage,
            density,
            filename: None,
        }
    }

    /// Get the disk density
    pub fn density(&self) -> Density {
        self.density
    }

    /// Largest reachable sector + 1
    pub fn disk_size(&self) -> u16 {
        self.density.disk_size()
    }

    /// Get the original filename if opened from a path
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Byte offset of a sector, rejecting sector 0 and sectors past the image
    fn offset(&self, sector: u16) -> Result<u64> {
        let max = self.density.image_sectors();
        if sector == 0 || sector > max {
            return Err(AtrError::InvalidSector { sector, max });
        }
        Ok(((sector as usize - 1) * SECTOR_SIZE + ATR_HEADER_SIZE) as u64)
    }

    /// Read one sector
    pub fn read_sector(&mut self, sector: u16) -> Result<SectorBuf> {
        let offset = self.offset(sector)?;
        let mut buf = [0u8; SECTOR_SIZE];
        self.storage.seek(SeekFrom::Start(offset))?;
        self.storage.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Write one sector
    pub fn write_sector(&mut self, sector: u16, data: &SectorBuf) -> Result<()> {
        let offset = self.offset(sector)?;
        self.storage.seek(SeekFrom::Start(offset))?;
        self.storage.write_all(data)?;
        Ok(())
    }

    /// Flush pending writes to the storage
    pub fn flush(&mut self) -> Result<()> {
        self.storage.flush()?;
        Ok(())
    }

    /// Give back the underlying storage
    pub fn into_inner(self) -> S {
        self.storage
    }
}
