use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ATR operations
pub type Result<T> = std::result::Result<T, AtrError>;

/// Errors that can occur when working with ATR images
#[derive(Debug, Error)]
pub enum AtrError {
    /// I/O error occurred while reading or writing the image
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unrecognized ATR image
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Sector number outside the image (sector 0 never exists)
    #[error("Invalid sector {sector} (valid: 1..={max})")]
    InvalidSector {
        /// Requested sector number
        sector: u16,
        /// Highest sector the image holds
        max: u16,
    },

    /// File not found in the directory
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// All 64 directory slots are in use
    #[error("Directory full: no free directory entry")]
    DirectoryFull,

    /// Not enough free sectors for the request
    #[error("Disk full: {requested} sectors requested, {available} available")]
    DiskFull {
        /// Sectors requested
        requested: usize,
        /// Sectors that were free
        available: usize,
    },

    /// A file's sector chain loops or links outside the disk
    #[error("Corrupt sector chain starting at {start}: sector {sector} {reason}")]
    CorruptChain {
        /// First sector of the chain
        start: u16,
        /// Offending sector number
        sector: u16,
        /// What is wrong with it
        reason: String,
    },

    /// Invalid filename
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// Host file could not be read or written
    #[error("Local file '{}': {source}", path.display())]
    LocalFile {
        /// Host path
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },
}

impl AtrError {
    /// Create an invalid format error
    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        AtrError::InvalidFormat(message.into())
    }

    /// Create a corrupt chain error
    pub fn corrupt_chain<S: Into<String>>(start: u16, sector: u16, reason: S) -> Self {
        AtrError::CorruptChain {
            start,
            sector,
            reason: reason.into(),
        }
    }

    /// Wrap a host I/O failure with the path it concerns
    pub fn local_file<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        AtrError::LocalFile {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AtrError::InvalidSector { sector: 0, max: 720 };
        assert_eq!(err.to_string(), "Invalid sector 0 (valid: 1..=720)");
    }

    #[test]
    fn test_corrupt_chain() {
        let err = AtrError::corrupt_chain(4, 9, "is visited twice");
        assert_eq!(
            err.to_string(),
            "Corrupt sector chain starting at 4: sector 9 is visited twice"
        );
    }

    #[test]
    fn test_disk_full() {
        let err = AtrError::DiskFull {
            requested: 10,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Disk full: 10 sectors requested, 3 available"
        );
    }
}
