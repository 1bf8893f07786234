//! WAV gatekeeper: validates a captured file against the STT input contract.
//!
//! The STT engine only accepts **RIFF/WAVE, linear PCM, mono, 16 kHz, 16-bit**
//! audio.  Every recording passes through [`check_file`] before a subprocess
//! is spawned.
//!
//! The check is a pure header parser: it reads the 12-byte RIFF header, walks
//! the sub-chunks until it finds `fmt ` (skipping `LIST`, `JUNK`, … chunks
//! that some writers emit first), validates the declared format, and finally
//! confirms that a non-empty `data` chunk follows.  Sample data is never read.
//!
//! ```text
//! offset  size  field
//!      0     4  "RIFF"
//!      4     4  riff size
//!      8     4  "WAVE"
//!     12     …  chunks: id[4] size[4] body[size] (+1 pad byte if size is odd)
//! ```

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;

// ---------------------------------------------------------------------------
// Input contract
// ---------------------------------------------------------------------------

/// Sample rate the STT engine requires (Hz).
pub const REQUIRED_SAMPLE_RATE: u32 = 16_000;
/// Channel count the STT engine requires.
pub const REQUIRED_CHANNELS: u16 = 1;
/// Bit depth the STT engine requires.
pub const REQUIRED_BITS_PER_SAMPLE: u16 = 16;

/// `WAVE_FORMAT_PCM` format tag.
pub const WAVE_FORMAT_PCM: u16 = 0x0001;
/// `WAVE_FORMAT_EXTENSIBLE` format tag, accepted when its sub-format is PCM.
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// RIFF header (12) + `fmt ` header (8) + minimal PCM `fmt ` body (16) +
/// `data` header (8).
pub const MIN_FILE_LEN: u64 = 44;

const RIFF_HEADER_LEN: u64 = 12;
const CHUNK_HEADER_LEN: u64 = 8;
const MIN_FMT_LEN: u32 = 16;
/// `fmt ` body size of a WAVE_FORMAT_EXTENSIBLE header (includes sub-format GUID).
const EXTENSIBLE_FMT_LEN: u32 = 40;

// ---------------------------------------------------------------------------
// WavFormatViolation
// ---------------------------------------------------------------------------

/// Why a candidate file was rejected.
///
/// Mismatch variants carry both the expected and the actual value so the
/// error presenter can show a precise diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WavFormatViolation {
    /// The file could not be opened or read.
    #[error("cannot read audio file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// The file is smaller than the smallest possible valid WAV.
    #[error("audio file too short: expected at least {expected_min} bytes, found {actual}")]
    TooShort { expected_min: u64, actual: u64 },

    /// `RIFF` or `WAVE` tag missing.
    #[error("bad container tag at offset {offset}: expected {expected:?}, found {actual:?}")]
    BadContainerTag {
        offset: u64,
        expected: &'static str,
        actual: String,
    },

    /// No `fmt ` chunk before the end of the file (or before `data`).
    #[error("no `fmt ` chunk found")]
    MissingFmtChunk,

    /// The declared `fmt ` chunk is too small to describe PCM audio.
    #[error("`fmt ` chunk too small: expected at least {expected_min} bytes, found {actual}")]
    FmtChunkTooSmall { expected_min: u32, actual: u32 },

    /// Not linear PCM.
    #[error("unsupported encoding: expected PCM (format tag {expected}), found format tag {actual}")]
    UnsupportedEncoding { expected: u16, actual: u16 },

    #[error("wrong channel count: expected {expected}, found {actual}")]
    ChannelMismatch { expected: u16, actual: u16 },

    #[error("wrong sample rate: expected {expected} Hz, found {actual} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("wrong bit depth: expected {expected} bits, found {actual} bits")]
    BitDepthMismatch { expected: u16, actual: u16 },

    /// Format is fine but there is no `data` chunk.
    #[error("no `data` chunk found after `fmt `")]
    MissingDataChunk,

    /// The `data` chunk holds zero bytes.
    #[error("`data` chunk is empty, nothing was recorded")]
    EmptyAudio,
}

// ---------------------------------------------------------------------------
// WavInfo
// ---------------------------------------------------------------------------

/// Header facts of a file that passed the gatekeeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Bytes of sample data (clamped to what is actually present on disk).
    pub data_len: u64,
}

impl WavInfo {
    /// Recording length in seconds derived from the `data` chunk size.
    pub fn duration_secs(&self) -> f64 {
        let bytes_per_sec =
            self.sample_rate as u64 * self.channels as u64 * (self.bits_per_sample as u64 / 8);
        if bytes_per_sec == 0 {
            return 0.0;
        }
        self.data_len as f64 / bytes_per_sec as f64
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Validate the WAV file at `path` against the STT input contract.
///
/// # Errors
///
/// Returns the first [`WavFormatViolation`] found, in header order.
pub fn check_file(path: &Path) -> Result<WavInfo, WavFormatViolation> {
    let unreadable = |e: io::Error| WavFormatViolation::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let file = File::open(path).map_err(unreadable)?;
    let len = file.metadata().map_err(unreadable)?.len();

    inspect(BufReader::new(file), len, path)
}

/// Validate an in-memory WAV image.  Same rules as [`check_file`].
pub fn check_bytes(bytes: &[u8]) -> Result<WavInfo, WavFormatViolation> {
    inspect(Cursor::new(bytes), bytes.len() as u64, Path::new("<memory>"))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct FmtChunk {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

fn inspect<R: Read + Seek>(
    mut reader: R,
    len: u64,
    origin: &Path,
) -> Result<WavInfo, WavFormatViolation> {
    let io_err = |e: io::Error| WavFormatViolation::Unreadable {
        path: origin.to_path_buf(),
        reason: e.to_string(),
    };

    if len < MIN_FILE_LEN {
        return Err(WavFormatViolation::TooShort {
            expected_min: MIN_FILE_LEN,
            actual: len,
        });
    }

    let mut header = [0u8; RIFF_HEADER_LEN as usize];
    reader.read_exact(&mut header).map_err(io_err)?;
    expect_tag(&header[0..4], "RIFF", 0)?;
    expect_tag(&header[8..12], "WAVE", 8)?;

    let mut fmt: Option<FmtChunk> = None;
    let mut pos = RIFF_HEADER_LEN;

    while pos + CHUNK_HEADER_LEN <= len {
        reader.seek(SeekFrom::Start(pos)).map_err(io_err)?;

        let mut chunk_header = [0u8; CHUNK_HEADER_LEN as usize];
        reader.read_exact(&mut chunk_header).map_err(io_err)?;
        let id = &chunk_header[0..4];
        let size = u32::from_le_bytes([
            chunk_header[4],
            chunk_header[5],
            chunk_header[6],
            chunk_header[7],
        ]);
        let body = pos + CHUNK_HEADER_LEN;

        match id {
            b"fmt " if fmt.is_none() => {
                fmt = Some(read_fmt(&mut reader, size).map_err(|e| match e {
                    FmtError::Io(e) => io_err(e),
                    FmtError::Violation(v) => v,
                })?);
            }
            b"data" => {
                let fmt = fmt.ok_or(WavFormatViolation::MissingFmtChunk)?;
                // Streaming writers sometimes leave an oversized placeholder;
                // trust only the bytes that are actually there.
                let data_len = (size as u64).min(len - body);
                if data_len == 0 {
                    return Err(WavFormatViolation::EmptyAudio);
                }
                return Ok(WavInfo {
                    channels: fmt.channels,
                    sample_rate: fmt.sample_rate,
                    bits_per_sample: fmt.bits_per_sample,
                    data_len,
                });
            }
            _ => {}
        }

        // Chunks are word-aligned.
        pos = body + size as u64 + (size as u64 & 1);
    }

    Err(match fmt {
        None => WavFormatViolation::MissingFmtChunk,
        Some(_) => WavFormatViolation::MissingDataChunk,
    })
}

fn expect_tag(actual: &[u8], expected: &'static str, offset: u64) -> Result<(), WavFormatViolation> {
    if actual == expected.as_bytes() {
        return Ok(());
    }
    Err(WavFormatViolation::BadContainerTag {
        offset,
        expected,
        actual: String::from_utf8_lossy(actual).into_owned(),
    })
}

enum FmtError {
    Io(io::Error),
    Violation(WavFormatViolation),
}

impl From<io::Error> for FmtError {
    fn from(e: io::Error) -> Self {
        FmtError::Io(e)
    }
}

impl From<WavFormatViolation> for FmtError {
    fn from(v: WavFormatViolation) -> Self {
        FmtError::Violation(v)
    }
}

/// Read and validate the body of a `fmt ` chunk.  The reader is positioned at
/// the start of the body.
fn read_fmt<R: Read>(reader: &mut R, size: u32) -> Result<FmtChunk, FmtError> {
    if size < MIN_FMT_LEN {
        return Err(WavFormatViolation::FmtChunkTooSmall {
            expected_min: MIN_FMT_LEN,
            actual: size,
        }
        .into());
    }

    let wanted = size.min(EXTENSIBLE_FMT_LEN) as usize;
    let mut body = vec![0u8; wanted];
    reader.read_exact(&mut body)?;

    let u16_at = |i: usize| u16::from_le_bytes([body[i], body[i + 1]]);
    let u32_at = |i: usize| u32::from_le_bytes([body[i], body[i + 1], body[i + 2], body[i + 3]]);

    let format_tag = u16_at(0);
    let channels = u16_at(2);
    let sample_rate = u32_at(4);
    let bits_per_sample = u16_at(14);

    // For WAVE_FORMAT_EXTENSIBLE the real encoding is the first two bytes of
    // the sub-format GUID at offset 24.
    let encoding = if format_tag == WAVE_FORMAT_EXTENSIBLE && body.len() >= EXTENSIBLE_FMT_LEN as usize
    {
        u16_at(24)
    } else {
        format_tag
    };

    if encoding != WAVE_FORMAT_PCM {
        return Err(WavFormatViolation::UnsupportedEncoding {
            expected: WAVE_FORMAT_PCM,
            actual: encoding,
        }
        .into());
    }
    if channels != REQUIRED_CHANNELS {
        return Err(WavFormatViolation::ChannelMismatch {
            expected: REQUIRED_CHANNELS,
            actual: channels,
        }
        .into());
    }
    if sample_rate != REQUIRED_SAMPLE_RATE {
        return Err(WavFormatViolation::SampleRateMismatch {
            expected: REQUIRED_SAMPLE_RATE,
            actual: sample_rate,
        }
        .into());
    }
    if bits_per_sample != REQUIRED_BITS_PER_SAMPLE {
        return Err(WavFormatViolation::BitDepthMismatch {
            expected: REQUIRED_BITS_PER_SAMPLE,
            actual: bits_per_sample,
        }
        .into());
    }

    Ok(FmtChunk {
        channels,
        sample_rate,
        bits_per_sample,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
