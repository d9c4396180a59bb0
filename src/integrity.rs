//! Structural checks on video containers before they are uploaded.
//!
//! Only cheap, format-level signals are checked: container magic bytes, and for ISO-BMFF
//! (MP4/MOV) the presence of a `moov` atom near either end of the file. A recording that was cut
//! off before its index was written fails here instead of producing a broken asset remotely.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::IntegrityError;

/// Smallest file accepted as a video at all.
pub const MIN_VIDEO_BYTES: u64 = 1024;

/// Window searched for the `moov` atom at each end of an ISO-BMFF file.
pub const MOOV_SEARCH_WINDOW: u64 = 1024 * 1024;

/// Extensions that receive integrity verification.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "3gp", "avi", "mkv", "webm", "wmv", "flv",
];

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

pub fn is_video_extension(extension: &str) -> bool {
    let ext = extension.to_lowercase();
    VIDEO_EXTENSIONS.contains(&ext.as_str())
}

/// Container family recognised from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// MP4, MOV and relatives (`ftyp` at offset 4).
    IsoBmff,
    Avi,
    /// Matroska or WebM (EBML header).
    Matroska,
    Unknown,
}

pub fn detect_container(header: &[u8]) -> Container {
    if header.len() >= 8 && &header[4..8] == b"ftyp" {
        Container::IsoBmff
    } else if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"AVI " {
        Container::Avi
    } else if header.len() >= 4 && header[0..4] == EBML_MAGIC {
        Container::Matroska
    } else {
        Container::Unknown
    }
}

pub fn verify_video_file(path: &Path) -> Result<Container, IntegrityError> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    verify_video(&mut file, len)
}

/// Verifies a video stream of `len` bytes.
///
/// Unrecognised containers pass if the whole stream can be read without error.
pub fn verify_video<R: Read + Seek>(reader: &mut R, len: u64) -> Result<Container, IntegrityError> {
    if len < MIN_VIDEO_BYTES {
        return Err(IntegrityError::TooSmall { size: len });
    }

    let mut header = [0u8; 12];
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut header)?;

    let container = detect_container(&header);
    match container {
        Container::IsoBmff => {
            if !has_moov_atom(reader, len)? {
                return Err(IntegrityError::MissingMoov);
            }
        }
        Container::Avi | Container::Matroska => {}
        Container::Unknown => {
            reader.seek(SeekFrom::Start(0))?;
            io::copy(reader, &mut io::sink()).map_err(IntegrityError::Unreadable)?;
        }
    }
    Ok(container)
}

fn has_moov_atom<R: Read + Seek>(reader: &mut R, len: u64) -> io::Result<bool> {
    let head_len = len.min(MOOV_SEARCH_WINDOW);
    if window_contains_moov(reader, 0, head_len)? {
        return Ok(true);
    }
    if len > MOOV_SEARCH_WINDOW {
        let tail_start = len - MOOV_SEARCH_WINDOW;
        return window_contains_moov(reader, tail_start, MOOV_SEARCH_WINDOW);
    }
    Ok(false)
}

fn window_contains_moov<R: Read + Seek>(reader: &mut R, start: u64, len: u64) -> io::Result<bool> {
    reader.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity(len as usize);
    reader.by_ref().take(len).read_to_end(&mut buf)?;
    Ok(buf.windows(4).any(|w| w == b"moov"))
}
