/// Atari DOS 2.0S / 2.5 filesystem implementation

use crate::binary::BinaryInfo;
use crate::error::{AtrError, Result};
use crate::filesystem::bitmap::{load_bitmap, store_bitmap};
use crate::filesystem::chain::{free_chain, read_chain, read_chain_to, release_chain, write_chain};
use crate::filesystem::check::{check_filesystem, CheckReport};
use crate::filesystem::directory::{
    decode_name, delete_slot, encode_name, find_by_name, read_slots, write_entry, RawDirEntry,
};
use crate::filesystem::{DirEntry, FileAttributes, FileSystem, FileSystemInfo};
use crate::format::{Density, SECTOR_SIZE};
use crate::image::AtrImage;
use log::{debug, info, warn};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

/// DOS 2 filesystem over an open image
///
/// Every operation goes straight to the image; nothing is cached between calls.
pub struct Dos2FileSystem<'a, S = File> {
    image: &'a mut AtrImage<S>,
}

impl<'a, S: Read + Write + Seek> Dos2FileSystem<'a, S> {
    /// Mount the filesystem on an image
    pub fn new(image: &'a mut AtrImage<S>) -> Self {
        Self { image }
    }

    /// Get the disk density
    pub fn density(&self) -> Density {
        self.image.density()
    }

    /// Get the underlying image
    pub fn image(&mut self) -> &mut AtrImage<S> {
        self.image
    }

    fn lookup(&mut self, name: &str) -> Result<RawDirEntry> {
        find_by_name(self.image, name, false)?.ok_or_else(|| AtrError::FileNotFound(name.to_string()))
    }

    fn dir_entry(&mut self, entry: &RawDirEntry) -> Result<DirEntry> {
        let (size, binary) = match read_chain(self.image, entry.start_sector) {
            Ok(data) => (data.len(), BinaryInfo::parse(&data)),
            Err(e @ AtrError::CorruptChain { .. }) => {
                warn!("{}: {}", entry.filename(), e);
                (0, None)
            }
            Err(e) => return Err(e),
        };

        Ok(DirEntry {
            name: entry.filename(),
            slot: entry.slot,
            sectors: entry.sector_count,
            size,
            attributes: FileAttributes {
                locked: entry.flags.locked(),
                system: entry.is_system(),
                executable: binary.is_some(),
            },
            binary,
        })
    }

    /// Stream a file into `out`, optionally turning ATASCII EOL into '\n'
    pub fn read_file_to<W: Write>(&mut self, name: &str, convert_eol: bool, out: &mut W) -> Result<usize> {
        let entry = self.lookup(name)?;
        read_chain_to(self.image, entry.start_sector, convert_eol, out)
    }

    /// Copy a file out to the host, returning the byte count
    pub fn get_file<P: AsRef<Path>>(&mut self, name: &str, local: P) -> Result<usize> {
        let data = self.read_file(name)?;
        std::fs::write(local.as_ref(), &data).map_err(|e| AtrError::local_file(local.as_ref(), e))?;
        info!("Copied {} ({} bytes) to {}", name, data.len(), local.as_ref().display());
        Ok(data.len())
    }

    /// Copy a host file onto the disk
    ///
    /// Without `name` the host file's base name is used. Returns the name as stored.
    pub fn put_file<P: AsRef<Path>>(&mut self, local: P, name: Option<&str>) -> Result<String> {
        let local = local.as_ref();
        let data = std::fs::read(local).map_err(|e| AtrError::local_file(local, e))?;

        let name = match name {
            Some(name) => name.to_string(),
            None => local
                .file_name()
                .and_then(|n| n.to_str())
                .map(|s| s.to_string())
                .ok_or_else(|| AtrError::InvalidFilename(local.display().to_string()))?,
        };

        self.write_file(&name, &data)?;
        let (base, ext) = encode_name(&name);
        Ok(decode_name(&base, &ext))
    }

    /// Delete a file, returning false instead of failing when it is missing
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let Some(entry) = find_by_name(self.image, name, false)? else {
            return Ok(false);
        };

        delete_slot(self.image, entry.slot)?;
        let freed = free_chain(self.image, entry.start_sector)?;
        self.image.flush()?;

        info!("Deleted {} ({} sectors freed)", entry.atari_name(), freed);
        Ok(true)
    }

    /// Run the consistency checker
    pub fn check(&mut self) -> Result<CheckReport> {
        check_filesystem(self.image)
    }
}

impl<S: Read + Write + Seek> FileSystem for Dos2FileSystem<'_, S> {
    fn read_dir(&mut self) -> Result<Vec<DirEntry>> {
        let slots = read_slots(self.image)?;
        let mut entries = Vec::new();
        for entry in slots.iter().filter(|e| e.flags.in_use()) {
            entries.push(self.dir_entry(entry)?);
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self.lookup(name)?;
        read_chain(self.image, entry.start_sector)
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let (base, ext) = encode_name(name);
        if base.iter().all(|&b| b == b' ') {
            return Err(AtrError::InvalidFilename(name.to_string()));
        }
        let stored = decode_name(&base, &ext);

        // The file being replaced gives up its slot and sectors, but only in
        // memory until the new copy is safely written
        let slots = read_slots(self.image)?;
        let existing = slots
            .iter()
            .find(|e| e.flags.in_use() && e.matches(&stored))
            .cloned();
        let slot = slots
            .iter()
            .find(|e| !e.flags.in_use() || existing.as_ref().map(|x| x.slot) == Some(e.slot))
            .map(|e| e.slot)
            .ok_or(AtrError::DirectoryFull)?;

        let (mut bitmap, _) = load_bitmap(self.image, false)?;
        if let Some(existing) = &existing {
            debug!("Replacing {} in slot {}", stored, existing.slot);
            release_chain(self.image, &mut bitmap, existing.start_sector)?;
        }

        let (first, count) = write_chain(self.image, &mut bitmap, data, slot as u8)?;
        if let Some(existing) = &existing {
            if existing.slot != slot {
                delete_slot(self.image, existing.slot)?;
            }
        }
        write_entry(self.image, slot, name, first, count)?;
        store_bitmap(self.image, &bitmap)?;
        self.image.flush()?;

        info!("Wrote {} ({} bytes, {} sectors) to slot {}", stored, data.len(), count, slot);
        Ok(())
    }

    fn delete_file(&mut self, name: &str) -> Result<()> {
        if self.remove(name)? {
            Ok(())
        } else {
            Err(AtrError::FileNotFound(name.to_string()))
        }
    }

    fn info(&mut self) -> Result<FileSystemInfo> {
        let (bitmap, _) = load_bitmap(self.image, false)?;
        let density = self.image.density();
        Ok(FileSystemInfo {
            fs_type: density.name().to_string(),
            total_sectors: density.usable_sectors() as usize,
            free_sectors: bitmap.free_count(),
            sector_size: SECTOR_SIZE,
        })
    }
}
