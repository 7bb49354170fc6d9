/*!
# atrmanager

A Rust library for reading and writing Atari ATR disk images with Atari DOS 2.0S
and DOS 2.5 filesystem support.

## Features

- Single density (720 sector) and enhanced density (1040 sector) images
- Sector level access with density detected from the image size
- DOS 2 directory, VTOC/VTOC2 free space bitmap and sector chain handling
- Filesystem consistency checking
- Binary load file header inspection

## Quick Start

```rust,no_run
use atrmanager::{AtrImage, Density, Dos2FileSystem, FileSystem};

// Open an existing ATR file
let mut image = AtrImage::open("disk.atr")?;

// Read a sector
let vtoc = image.read_sector(360)?;

// Mount the DOS 2 filesystem
let mut fs = Dos2FileSystem::new(&mut image);
for entry in fs.read_dir()? {
    println!("{}: {} bytes", entry.name, entry.size);
}

// Read and write files
let contents = fs.read_file("AUTORUN.SYS")?;
fs.write_file("COPY.SYS", &contents)?;

// Check the disk
let report = fs.check()?;
println!("{}", report);

// Create a new blank enhanced density disk
let blank = AtrImage::create_file("blank.atr", Density::Enhanced)?;
# Ok::<(), atrmanager::AtrError>(())
```

## Modules

- `format`: Geometry, density and on-disk layout constants
- `image`: Sector store over an ATR file (AtrImage)
- `filesystem`: DOS 2 directory, bitmap, chains and checker
- `binary`: Binary load file header inspection
- `error`: Error types and Result alias
*/

#![warn(missing_docs)]

/// Binary load file header inspection
pub mod binary;
/// Error types and Result alias
pub mod error;
/// Filesystem implementations (Atari DOS 2)
pub mod filesystem;
/// ATR geometry and layout constants
pub mod format;
/// Sector store over an ATR image
pub mod image;
/// Sector map visualization
pub mod map;

// Re-export common types
pub use binary::BinaryInfo;
pub use error::{AtrError, Result};
pub use filesystem::{
    CheckReport, DirEntry, Dos2FileSystem, FileAttributes, FileSystem, FileSystemInfo, Finding,
};
pub use format::Density;
pub use image::{AtrImage, AtrImageBuilder, SectorBuf};
