/// First-fit sector allocation

use crate::error::{AtrError, Result};
use crate::filesystem::bitmap::Bitmap;
use log::debug;

/// Allocate `count` sectors, lowest numbered first
///
/// Each sector picked is marked in use in `bitmap`. When the disk runs out the
/// sectors already taken stay marked; the caller must discard the bitmap.
pub fn allocate(bitmap: &mut Bitmap, count: usize) -> Result<Vec<u16>> {
    let picked: Vec<u16> = bitmap
        .free_sectors()
        .filter(|&sector| sector != 0)
        .take(count)
        .collect();

    for &sector in &picked {
        bitmap.mark_allocated(sector);
    }

    if picked.len() < count {
        debug!("Not enough space: wanted {}, found {}", count, picked.len());
        return Err(AtrError::DiskFull {
            requested: count,
            available: picked.len(),
        });
    }

    debug!("Allocated {} sectors starting at {:?}", count, picked.first());
    Ok(picked)
}
