/// File data sector chains
///
/// Every data sector carries 125 payload bytes followed by a 3-byte link:
/// - Byte 125: file number in bits 7..2, bits 9..8 of the next sector in bits 1..0
/// - Byte 126: low 8 bits of the next sector
/// - Byte 127: number of payload bytes used
///
/// A next sector of 0 ends the chain.

use crate::error::{AtrError, Result};
use crate::filesystem::allocator::allocate;
use crate::filesystem::bitmap::{load_bitmap, store_bitmap, Bitmap};
use crate::format::*;
use crate::image::{AtrImage, SectorBuf};
use log::{debug, trace, warn};
use std::collections::HashSet;
use std::io::{Read, Seek, Write};

/// Decoded link bytes of a data sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorLink {
    /// Directory slot of the owning file
    pub file_no: u8,
    /// Next sector in the chain, 0 at the end
    pub next: u16,
    /// Payload bytes used in this sector
    pub bytes: u8,
}

impl SectorLink {
    /// Decode the link bytes of a sector
    pub fn decode(sector: &SectorBuf) -> Self {
        Self {
            file_no: sector[DATA_FILE_NUM] >> 2,
            next: (((sector[DATA_FILE_NUM] & 0x03) as u16) << 8) | sector[DATA_NEXT_LOW] as u16,
            bytes: sector[DATA_BYTES],
        }
    }

    /// Encode into the link bytes of a sector
    pub fn encode(&self, sector: &mut SectorBuf) {
        sector[DATA_FILE_NUM] = (self.file_no << 2) | ((self.next >> 8) & 0x03) as u8;
        sector[DATA_NEXT_LOW] = (self.next & 0xFF) as u8;
        sector[DATA_BYTES] = self.bytes;
    }

    /// Payload bytes actually usable, never more than a sector holds
    pub fn payload_len(&self) -> usize {
        (self.bytes as usize).min(DATA_SIZE)
    }
}

/// Stream a file's contents into `out`, one sector at a time
///
/// With `convert_eol` every ATASCII end-of-line (0x9B) becomes '\n'.
/// Returns the number of bytes written.
///
/// Fails with `CorruptChain` when `start` is 0, or a link points past the end
/// of the disk or back at a sector already visited. Sectors before the bad
/// link have already been written to `out` by then.
pub fn read_chain_to<S: Read + Write + Seek, W: Write>(
    image: &mut AtrImage<S>,
    start: u16,
    convert_eol: bool,
    out: &mut W,
) -> Result<usize> {
    let disk_size = image.disk_size();
    if start == 0 || start >= disk_size {
        return Err(AtrError::corrupt_chain(start, start, "is not a valid first sector"));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    let mut sector = start;
    while sector != 0 {
        if sector >= disk_size {
            return Err(AtrError::corrupt_chain(
                start,
                sector,
                format!("is past the end of the disk ({})", disk_size - 1),
            ));
        }
        if !seen.insert(sector) {
            return Err(AtrError::corrupt_chain(start, sector, "is visited twice"));
        }

        let buf = image.read_sector(sector)?;
        let link = SectorLink::decode(&buf);
        trace!(
            "Sector {}: next={}, bytes={}, file_no={}",
            sector, link.next, link.bytes, link.file_no
        );
        if link.bytes as usize > DATA_SIZE {
            warn!(
                "Sector {} claims {} data bytes, using {}",
                sector, link.bytes, DATA_SIZE
            );
        }

        let data = &buf[..link.payload_len()];
        if convert_eol {
            let converted: Vec<u8> = data
                .iter()
                .map(|&b| if b == ATASCII_EOL { b'\n' } else { b })
                .collect();
            out.write_all(&converted)?;
        } else {
            out.write_all(data)?;
        }
        total += data.len();
        sector = link.next;
    }
    Ok(total)
}

/// Read a whole file's contents
pub fn read_chain<S: Read + Write + Seek>(image: &mut AtrImage<S>, start: u16) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    read_chain_to(image, start, false, &mut data)?;
    Ok(data)
}

/// Sectors needed to hold `len` bytes; an empty file still takes one
pub fn sectors_needed(len: usize) -> usize {
    len.div_ceil(DATA_SIZE).max(1)
}

/// Write `payload` as a new chain tagged with `file_no`
///
/// Sectors come from `bitmap` first-fit and are all allocated before anything
/// is written, so running out of space leaves the image untouched. The bitmap
/// is not stored. Returns the first sector and the sector count.
pub fn write_chain<S: Read + Write + Seek>(
    image: &mut AtrImage<S>,
    bitmap: &mut Bitmap,
    payload: &[u8],
    file_no: u8,
) -> Result<(u16, u16)> {
    let sectors = allocate(bitmap, sectors_needed(payload.len()))?;

    for (i, &sector) in sectors.iter().enumerate() {
        let start = i * DATA_SIZE;
        let chunk = &payload[start.min(payload.len())..(start + DATA_SIZE).min(payload.len())];

        let mut buf = [0u8; SECTOR_SIZE];
        buf[..chunk.len()].copy_from_slice(chunk);
        SectorLink {
            file_no,
            next: sectors.get(i + 1).copied().unwrap_or(0),
            bytes: chunk.len() as u8,
        }
        .encode(&mut buf);
        image.write_sector(sector, &buf)?;
    }

    debug!(
        "Wrote {} bytes as file {} in {} sectors from {}",
        payload.len(),
        file_no,
        sectors.len(),
        sectors[0]
    );
    Ok((sectors[0], sectors.len() as u16))
}

/// Mark every sector of a chain free in `bitmap`
///
/// A damaged chain is followed as far as it stays valid; the rest is left
/// for the checker to report. Returns the number of sectors freed.
pub fn release_chain<S: Read + Write + Seek>(
    image: &mut AtrImage<S>,
    bitmap: &mut Bitmap,
    start: u16,
) -> Result<usize> {
    let disk_size = image.disk_size();
    let mut seen = HashSet::new();
    let mut sector = start;
    while sector != 0 {
        if sector >= disk_size || !seen.insert(sector) {
            warn!(
                "Chain from sector {} breaks at sector {}, {} sectors freed",
                start,
                sector,
                seen.len()
            );
            break;
        }
        let link = SectorLink::decode(&image.read_sector(sector)?);
        bitmap.mark_free(sector);
        sector = link.next;
    }
    Ok(seen.len())
}

/// Free a chain directly in the on-disk bitmap
pub fn free_chain<S: Read + Write + Seek>(image: &mut AtrImage<S>, start: u16) -> Result<usize> {
    let (mut bitmap, _) = load_bitmap(image, false)?;
    let freed = release_chain(image, &mut bitmap, start)?;
    store_bitmap(image, &bitmap)?;
    Ok(freed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn image(density: Density) -> AtrImage<Cursor<Vec<u8>>> {
        AtrImage::create(Cursor::new(Vec::new()), density).unwrap()
    }

    fn link(image: &mut AtrImage<Cursor<Vec<u8>>>, sector: u16, next: u16, bytes: u8) {
        let mut buf = [0u8; SECTOR_SIZE];
        SectorLink {
            file_no: 0,
            next,
            bytes,
        }
        .encode(&mut buf);
        image.write_sector(sector, &buf).unwrap();
    }

    #[test]
    fn test_link_bytes() {
        let mut buf = [0u8; SECTOR_SIZE];
        SectorLink {
            file_no: 5,
            next: 0x2F3,
            bytes: 125,
        }
        .encode(&mut buf);
        assert_eq!(buf[125], (5 << 2) | 0x02);
        assert_eq!(buf[126], 0xF3);
        assert_eq!(buf[127], 125);

        let decoded = SectorLink::decode(&buf);
        assert_eq!(decoded.file_no, 5);
        assert_eq!(decoded.next, 0x2F3);
    }

    #[test]
    fn test_sectors_needed() {
        assert_eq!(sectors_needed(0), 1);
        assert_eq!(sectors_needed(1), 1);
        assert_eq!(sectors_needed(125), 1);
        assert_eq!(sectors_needed(126), 2);
        assert_eq!(sectors_needed(250), 2);
    }

    #[test]
    fn test_write_then_read() {
        let mut image = image(Density::Single);
        let mut bitmap = Bitmap::blank(Density::Single);
        let payload: Vec<u8> = (0..300).map(|i| i as u8).collect();

        let (first, count) = write_chain(&mut image, &mut bitmap, &payload, 7).unwrap();
        assert_eq!((first, count), (4, 3));
        assert_eq!(read_chain(&mut image, first).unwrap(), payload);

        let last = SectorLink::decode(&image.read_sector(6).unwrap());
        assert_eq!(last.next, 0);
        assert_eq!(last.bytes, 50);
        assert_eq!(last.file_no, 7);
    }

    #[test]
    fn test_empty_file() {
        let mut image = image(Density::Single);
        let mut bitmap = Bitmap::blank(Density::Single);
        let (first, count) = write_chain(&mut image, &mut bitmap, &[], 0).unwrap();
        assert_eq!(count, 1);
        assert_eq!(SectorLink::decode(&image.read_sector(first).unwrap()).bytes, 0);
        assert!(read_chain(&mut image, first).unwrap().is_empty());
    }

    #[test]
    fn test_eol_conversion() {
        let mut image = image(Density::Single);
        let mut bitmap = Bitmap::blank(Density::Single);
        let (first, _) = write_chain(&mut image, &mut bitmap, b"10 PRINT\x9b20 END\x9b", 0).unwrap();

        let mut out = Vec::new();
        let n = read_chain_to(&mut image, first, true, &mut out).unwrap();
        assert_eq!(out, b"10 PRINT\n20 END\n");
        assert_eq!(n, 16);
    }

    #[test]
    fn test_high_sector_links() {
        // Enhanced density chains cross into sectors needing all 10 link bits
        let mut image = image(Density::Enhanced);
        let mut bitmap = Bitmap::blank(Density::Enhanced);
        for sector in 0..1000 {
            bitmap.mark_allocated(sector);
        }
        let payload = vec![0xAA; 1000];
        let (first, count) = write_chain(&mut image, &mut bitmap, &payload, 63).unwrap();
        assert_eq!((first, count), (1000, 8));
        assert_eq!(read_chain(&mut image, first).unwrap(), payload);
    }

    #[test]
    fn test_disk_full_writes_nothing() {
        let mut image = image(Density::Single);
        let mut bitmap = Bitmap::blank(Density::Single);
        let before = image.read_sector(4).unwrap();
        let result = write_chain(&mut image, &mut bitmap, &vec![1u8; 708 * DATA_SIZE], 0);
        assert!(matches!(result, Err(AtrError::DiskFull { .. })));
        assert_eq!(image.read_sector(4).unwrap(), before);
    }

    #[test]
    fn test_loop_detected() {
        let mut image = image(Density::Single);
        link(&mut image, 10, 11, 125);
        link(&mut image, 11, 10, 125);
        let result = read_chain(&mut image, 10);
        assert!(matches!(
            result,
            Err(AtrError::CorruptChain {
                start: 10,
                sector: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_loop_streams_sectors_before_failing() {
        let mut image = image(Density::Single);
        let mut first = [0x41u8; SECTOR_SIZE];
        SectorLink {
            file_no: 0,
            next: 11,
            bytes: 3,
        }
        .encode(&mut first);
        image.write_sector(10, &first).unwrap();
        link(&mut image, 11, 10, 125);

        let mut out = Vec::new();
        let result = read_chain_to(&mut image, 10, false, &mut out);
        assert!(matches!(result, Err(AtrError::CorruptChain { sector: 10, .. })));
        assert_eq!(&out[..3], b"AAA");
        assert_eq!(out.len(), 3 + DATA_SIZE);
    }

    #[test]
    fn test_link_past_end() {
        let mut image = image(Density::Single);
        link(&mut image, 10, 720, 125);
        assert!(matches!(
            read_chain(&mut image, 10),
            Err(AtrError::CorruptChain { sector: 720, .. })
        ));
        assert!(read_chain(&mut image, 0).is_err());
    }

    #[test]
    fn test_oversized_count_is_clamped() {
        let mut image = image(Density::Single);
        link(&mut image, 10, 0, 200);
        assert_eq!(read_chain(&mut image, 10).unwrap().len(), DATA_SIZE);
    }

    #[test]
    fn test_free_chain() {
        let mut image = image(Density::Single);
        let (mut bitmap, _) = load_bitmap(&mut image, false).unwrap();
        let (first, count) = write_chain(&mut image, &mut bitmap, &[0u8; 400], 0).unwrap();
        store_bitmap(&mut image, &bitmap).unwrap();
        assert_eq!(count, 4);

        assert_eq!(free_chain(&mut image, first).unwrap(), 4);
        let (bitmap, warnings) = load_bitmap(&mut image, true).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(bitmap, Bitmap::blank(Density::Single));
    }

    #[test]
    fn test_release_broken_chain() {
        let mut image = image(Density::Single);
        let mut bitmap = Bitmap::blank(Density::Single);
        for sector in [10, 11] {
            bitmap.mark_allocated(sector);
        }
        link(&mut image, 10, 11, 125);
        link(&mut image, 11, 10, 125);
        assert_eq!(release_chain(&mut image, &mut bitmap, 10).unwrap(), 2);
        assert!(bitmap.is_free(10));
        assert!(bitmap.is_free(11));
    }
}
