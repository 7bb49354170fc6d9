/// Filesystem implementations

/// Free space bitmap
pub mod bitmap;
/// Sector allocation
pub mod allocator;
/// Directory slots
pub mod directory;
/// Data sector chains
pub mod chain;
/// Consistency checker
pub mod check;
/// Atari DOS 2 session
pub mod dos2;

pub use check::{CheckReport, Finding};
pub use dos2::Dos2FileSystem;

use crate::binary::BinaryInfo;
use crate::error::Result;
use crate::format::SECTOR_SIZE;

/// File attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributes {
    /// Locked (read-only) flag
    pub locked: bool,
    /// System file (.SYS extension)
    pub system: bool,
    /// Binary load file
    pub executable: bool,
}

/// Directory entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Host form of the name, e.g. "autorun.sys"
    pub name: String,
    /// Directory slot, also the file number
    pub slot: usize,
    /// Sectors recorded in the directory
    pub sectors: u16,
    /// File size in bytes
    pub size: usize,
    /// File attributes
    pub attributes: FileAttributes,
    /// Load addresses when the file is a binary load file
    pub binary: Option<BinaryInfo>,
}

/// Filesystem information
#[derive(Debug)]
pub struct FileSystemInfo {
    /// Filesystem type name
    pub fs_type: String,
    /// Sectors available to files on a blank disk
    pub total_sectors: usize,
    /// Free sectors
    pub free_sectors: usize,
    /// Sector size in bytes
    pub sector_size: usize,
}

impl FileSystemInfo {
    /// Free space in bytes, counting whole sectors
    pub fn free_bytes(&self) -> usize {
        self.free_sectors * SECTOR_SIZE
    }
}

/// Filesystem trait for accessing files on ATR images
pub trait FileSystem {
    /// List directory entries, sorted by name
    fn read_dir(&mut self) -> Result<Vec<DirEntry>>;

    /// Read a file's contents
    fn read_file(&mut self, name: &str) -> Result<Vec<u8>>;

    /// Write a file, replacing any existing file of the same name
    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()>;

    /// Delete a file
    fn delete_file(&mut self, name: &str) -> Result<()>;

    /// Get filesystem information
    fn info(&mut self) -> Result<FileSystemInfo>;
}
