//! Loader utilities for emubridge-core.
//!
//! Responsibilities:
//! - Turn what libretro hands us (a path, the image bytes, or both) into a
//!   [`LoadRequest`] for `Bridge::init` and the machine.
//! - Sniff the disk image kind from its bytes.
//!
//! Notes:
//! - Extensions are unreliable (`.img`, `.dsk` and `.hfv` are all used for
//!   every kind of image), so we look at filesystem signatures instead.
//! - An unrecognised image is not an error; the emulated machine may still
//!   know what to do with it. Only an empty load is refused.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// RAM given to the machine when the caller does not ask for a size.
pub const DEFAULT_RAM_MB: u32 = 128;

/// Bytes needed to see every signature we check.
const SNIFF_LEN: usize = ISO9660_OFFSET + 5;

const HFS_OFFSET: usize = 1024;
const ISO9660_OFFSET: usize = 32769;
const PARTITION_ENTRY_OFFSET: usize = 512;

/// Error returned by loader helpers.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Neither a path nor any image bytes were provided.
    #[error("nothing to load (no path and no data)")]
    Empty,
    /// The image path could not be read.
    #[error("failed to read disk image: {0}")]
    Io(#[source] std::io::Error),
}

/// What kind of disk image the loader inferred from the bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DiskKind {
    /// Bare HFS volume (`BD` signature in the master directory block).
    Hfs,
    /// Bare HFS+ or HFSX volume.
    HfsPlus,
    /// ISO 9660 (CD-ROM) image.
    Iso9660,
    /// Partitioned disk with an Apple partition map.
    ApplePartitionMap,
    Unknown,
}

/// Everything the bridge and the machine need to start a session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadRequest {
    pub path: Option<PathBuf>,
    pub ram_mb: u32,
    pub kind: DiskKind,
}

impl LoadRequest {
    /// Build a request from libretro's game data.
    ///
    /// When only a path is given, the head of the file is read for sniffing.
    /// `ram_mb == 0` selects [`DEFAULT_RAM_MB`].
    pub fn from_parts(
        path: Option<&str>,
        data: Option<&[u8]>,
        ram_mb: u32,
    ) -> Result<Self, LoadError> {
        let path = path.filter(|p| !p.is_empty()).map(PathBuf::from);
        let data = data.filter(|d| !d.is_empty());

        let kind = match (data, path.as_deref()) {
            (Some(bytes), _) => detect_kind(bytes),
            (None, Some(path)) => detect_kind(&read_head(path)?),
            (None, None) => return Err(LoadError::Empty),
        };

        Ok(Self {
            path,
            ram_mb: if ram_mb == 0 { DEFAULT_RAM_MB } else { ram_mb },
            kind,
        })
    }
}

fn read_head(path: &Path) -> Result<Vec<u8>, LoadError> {
    let file = File::open(path).map_err(LoadError::Io)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .map_err(LoadError::Io)?;
    Ok(head)
}

/// Best-effort detection.
///
/// Rules, in order:
/// - `ER` at offset 0 followed by a `PM` entry at 512: Apple partition map.
/// - `BD` at 1024: HFS. `H+` or `HX` at 1024: HFS+.
/// - `CD001` at 32769: ISO 9660.
pub fn detect_kind(bytes: &[u8]) -> DiskKind {
    if has_signature(bytes, 0, b"ER") && has_signature(bytes, PARTITION_ENTRY_OFFSET, b"PM") {
        return DiskKind::ApplePartitionMap;
    }
    if has_signature(bytes, HFS_OFFSET, b"BD") {
        return DiskKind::Hfs;
    }
    if has_signature(bytes, HFS_OFFSET, b"H+") || has_signature(bytes, HFS_OFFSET, b"HX") {
        return DiskKind::HfsPlus;
    }
    if has_signature(bytes, ISO9660_OFFSET, b"CD001") {
        return DiskKind::Iso9660;
    }
    DiskKind::Unknown
}

fn has_signature(bytes: &[u8], offset: usize, sig: &[u8]) -> bool {
    bytes.get(offset..offset + sig.len()) == Some(sig)
}
