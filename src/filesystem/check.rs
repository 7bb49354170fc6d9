/// Filesystem consistency checker
///
/// Rebuilds the allocation map from the directory by walking every file's
/// chain, then compares it against the VTOC bitmap. Nothing is written.

use crate::error::Result;
use crate::filesystem::bitmap::{load_bitmap, VtocWarning};
use crate::filesystem::chain::SectorLink;
use crate::filesystem::directory::list_entries;
use crate::format::*;
use crate::image::AtrImage;
use log::debug;
use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Seek, Write};

/// Who a sector belongs to in the rebuilt map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// Sector 0, boot, VTOC or directory
    Reserved,
    /// A file, by directory slot and name
    File {
        /// Directory slot
        slot: usize,
        /// Host form of the name
        name: String,
    },
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Reserved => write!(f, "reserved"),
            Owner::File { slot, name } => write!(f, "{} ({})", name, slot),
        }
    }
}

/// A single inconsistency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// A file's chain runs into a sector already claimed
    CrossLinked {
        /// File being walked
        file: String,
        /// Sector claimed twice
        sector: u16,
        /// Previous claimant
        owner: Owner,
    },
    /// A file's chain comes back to one of its own sectors
    ChainLoop {
        /// File being walked
        file: String,
        /// Sector revisited
        sector: u16,
    },
    /// A start sector or link is 0 where a sector is expected, or past the disk
    LinkOutOfRange {
        /// File being walked
        file: String,
        /// Bad sector number
        link: u16,
        /// Sector holding the bad link, `None` for the directory's start sector
        from: Option<u16>,
    },
    /// A data sector is tagged with another file number
    FileNumberMismatch {
        /// File being walked
        file: String,
        /// Data sector
        sector: u16,
        /// Directory slot of the file
        expected: usize,
        /// Number found in the sector
        found: u8,
    },
    /// Directory sector count differs from the chain length
    SizeMismatch {
        /// File being walked
        file: String,
        /// Count in the directory
        recorded: u16,
        /// Sectors found in the chain
        found: u16,
    },
    /// Bitmap says allocated, but no file or reserved area uses the sector
    AllocatedButFree {
        /// Sector number
        sector: u16,
    },
    /// Bitmap says free, but the sector is in use
    FreeButUsed {
        /// Sector number
        sector: u16,
    },
    /// VTOC header problem
    Vtoc(VtocWarning),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::CrossLinked { sector, owner, .. } => {
                write!(f, "sector {} already in use by {}", sector, owner)
            }
            Finding::ChainLoop { file, sector } => {
                write!(f, "chain of {} loops back to sector {}", file, sector)
            }
            Finding::LinkOutOfRange { file, link, from } => match from {
                Some(from) => write!(
                    f,
                    "sector {} of {} links to invalid sector {}",
                    from, file, link
                ),
                None => write!(f, "{} starts at invalid sector {}", file, link),
            },
            Finding::FileNumberMismatch {
                file,
                sector,
                expected,
                found,
            } => write!(
                f,
                "sector {} of {} is tagged file_no {}, expected {}",
                sector, file, found, expected
            ),
            Finding::SizeMismatch {
                file,
                recorded,
                found,
            } => write!(
                f,
                "size in directory ({}) does not match size on disk ({}) for file {}",
                recorded, found, file
            ),
            Finding::AllocatedButFree { sector } => write!(
                f,
                "VTOC shows sector {} allocated, but it should be free",
                sector
            ),
            Finding::FreeButUsed { sector } => write!(
                f,
                "VTOC shows sector {} free, but it should be allocated",
                sector
            ),
            Finding::Vtoc(warning) => write!(f, "{}", warning),
        }
    }
}

/// Result of walking one file
#[derive(Debug, Clone)]
pub struct FileCheck {
    /// Directory slot, also the file number
    pub slot: usize,
    /// Host form of the name
    pub name: String,
    /// Sectors found in the chain
    pub sectors: u16,
    /// Problems met while walking
    pub findings: Vec<Finding>,
}

/// Everything the checker found
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Per-file results in slot order
    pub files: Vec<FileCheck>,
    /// Sectors in use, reserved areas included
    pub sectors_used: usize,
    /// Sectors below the disk size nobody uses
    pub sectors_free: usize,
    /// VTOC header problems
    pub vtoc: Vec<VtocWarning>,
    /// Disagreements between the bitmap and the rebuilt map
    pub bitmap: Vec<Finding>,
}

impl CheckReport {
    /// Iterate over every finding
    pub fn findings(&self) -> impl Iterator<Item = Finding> + '_ {
        self.files
            .iter()
            .flat_map(|file| file.findings.iter().cloned())
            .chain(self.vtoc.iter().cloned().map(Finding::Vtoc))
            .chain(self.bitmap.iter().cloned())
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.files {
            writeln!(f, "Checking {} (file_no {})", file.name, file.slot)?;
            for finding in &file.findings {
                writeln!(f, "  ** {}", finding)?;
            }
            writeln!(f, "  Found {} sectors", file.sectors)?;
        }
        writeln!(
            f,
            "{} sectors in use, {} sectors free",
            self.sectors_used, self.sectors_free
        )?;
        writeln!(f, "Checking VTOC...")?;
        for warning in &self.vtoc {
            writeln!(f, "  ** {}", warning)?;
        }
        writeln!(f, "Compare VTOC bitmap with reconstructed bitmap from files...")?;
        for finding in &self.bitmap {
            writeln!(f, "  ** {}", finding)?;
        }
        write!(f, "All done.")
    }
}

/// Check the filesystem without modifying it
pub fn check_filesystem<S: Read + Write + Seek>(image: &mut AtrImage<S>) -> Result<CheckReport> {
    let disk_size = image.disk_size();
    let mut map: Vec<Option<Owner>> = vec![None; disk_size as usize];
    for sector in reserved_sectors() {
        map[sector as usize] = Some(Owner::Reserved);
    }

    let mut files = Vec::new();
    for entry in list_entries(image)? {
        let name = entry.filename();
        let owner = Owner::File {
            slot: entry.slot,
            name: name.clone(),
        };
        let mut findings = Vec::new();
        let mut seen = HashSet::new();
        let mut count: u16 = 0;
        let mut from = None;
        let mut sector = entry.start_sector;

        debug!("Checking {} from sector {}", name, sector);
        loop {
            if sector == 0 || sector >= disk_size {
                findings.push(Finding::LinkOutOfRange {
                    file: name.clone(),
                    link: sector,
                    from,
                });
                break;
            }
            if let Some(previous) = &map[sector as usize] {
                findings.push(Finding::CrossLinked {
                    file: name.clone(),
                    sector,
                    owner: previous.clone(),
                });
            }
            if !seen.insert(sector) {
                findings.push(Finding::ChainLoop {
                    file: name.clone(),
                    sector,
                });
                break;
            }
            map[sector as usize] = Some(owner.clone());
            count += 1;

            let link = SectorLink::decode(&image.read_sector(sector)?);
            if link.file_no as usize != entry.slot {
                findings.push(Finding::FileNumberMismatch {
                    file: name.clone(),
                    sector,
                    expected: entry.slot,
                    found: link.file_no,
                });
            }
            if link.next == 0 {
                break;
            }
            from = Some(sector);
            sector = link.next;
        }

        if count != entry.sector_count {
            findings.push(Finding::SizeMismatch {
                file: name.clone(),
                recorded: entry.sector_count,
                found: count,
            });
        }

        files.push(FileCheck {
            slot: entry.slot,
            name,
            sectors: count,
            findings,
        });
    }

    let sectors_used = map.iter().filter(|owner| owner.is_some()).count();
    let sectors_free = disk_size as usize - sectors_used;

    let (bitmap, vtoc) = load_bitmap(image, true)?;
    let mut differences = Vec::new();
    for (sector, owner) in map.iter().enumerate() {
        let sector = sector as u16;
        match (bitmap.is_free(sector), owner.is_some()) {
            (false, false) => differences.push(Finding::AllocatedButFree { sector }),
            (true, true) => differences.push(Finding::FreeButUsed { sector }),
            _ => {}
        }
    }

    Ok(CheckReport {
        files,
        sectors_used,
        sectors_free,
        vtoc,
        bitmap: differences,
    })
}
