use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::RecorderError;
use crate::models::recording_result::ContainerSummary;
use crate::models::stream::{BufferInfo, FormatDescriptor, SampleFlags, TrackIndex};
use crate::traits::container_writer::ContainerWriter;

pub const MAGIC: &[u8; 4] = b"AVMX";
pub const VERSION: u16 = 1;

/// Offset of the sample count patched on finalize.
const SAMPLE_COUNT_OFFSET: u64 = 8;
/// Magic, version, track count, sample count, track table length.
const FIXED_HEADER_SIZE: usize = 4 + 2 + 2 + 8 + 4;
/// Track, flags, presentation time, payload length.
const RECORD_HEADER_SIZE: usize = 4 + 4 + 8 + 4;

/// Append-only interleaved track file.
///
/// ## File Format
///
/// ```text
/// [4-byte magic "AVMX"][u16 version][u16 track count][u64 sample count]
/// [u32 track table length][track table: JSON array of FormatDescriptor]
/// [record 1: u32 track | u32 flags | i64 pts (µs) | u32 length | payload]
/// [record 2: ...]
/// ```
///
/// All integers are little-endian. The header is written when the container
/// starts; the sample count is patched on finalize.
///
/// A write that fails part way through a record poisons the writer: later
/// samples are refused and finalize truncates the file back to the last
/// complete record.
pub struct TrackFileWriter {
    file_path: Option<PathBuf>,
    file: Option<BufWriter<File>>,
    tracks: Vec<FormatDescriptor>,
    is_started: bool,
    samples_written: u64,
    total_bytes_written: u64,
    failed: bool,
}

impl TrackFileWriter {
    pub fn new() -> Self {
        Self {
            file_path: None,
            file: None,
            tracks: Vec::new(),
            is_started: false,
            samples_written: 0,
            total_bytes_written: 0,
            failed: false,
        }
    }

    /// Total bytes written so far, header included.
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), RecorderError> {
        if self.failed {
            return Err(RecorderError::StorageError("track file is unusable after a failed write".into()));
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| RecorderError::StorageError("file is not open".into()))?;
        if let Err(e) = file.write_all(data) {
            self.failed = true;
            log::error!("track file write failed after {} bytes: {}", self.total_bytes_written, e);
            return Err(RecorderError::StorageError(format!("write failed: {}", e)));
        }
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}

impl Default for TrackFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerWriter for TrackFileWriter {
    fn open(&mut self, path: &Path) -> Result<(), RecorderError> {
        if self.file.is_some() {
            return Err(RecorderError::InvalidState("track file already open".into()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| RecorderError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(path)
            .map_err(|e| RecorderError::StorageError(format!("failed to create file: {}", e)))?;
        self.file = Some(BufWriter::new(file));
        self.file_path = Some(path.to_path_buf());
        Ok(())
    }

    fn add_track(&mut self, format: &FormatDescriptor) -> Result<TrackIndex, RecorderError> {
        if self.is_started {
            return Err(RecorderError::AlreadyStarted);
        }
        if self.tracks.len() >= u16::MAX as usize {
            return Err(RecorderError::StorageError("too many tracks".into()));
        }
        self.tracks.push(format.clone());
        Ok(TrackIndex(self.tracks.len() as u32 - 1))
    }

    fn start(&mut self) -> Result<(), RecorderError> {
        if self.is_started {
            return Err(RecorderError::AlreadyStarted);
        }

        let table = serde_json::to_vec(&self.tracks)
            .map_err(|e| RecorderError::StorageError(format!("failed to serialize track table: {}", e)))?;

        let mut header = Vec::with_capacity(FIXED_HEADER_SIZE + table.len());
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&(self.tracks.len() as u16).to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes()); // sample count placeholder
        header.extend_from_slice(&(table.len() as u32).to_le_bytes());
        header.extend_from_slice(&table);

        self.write_raw(&header)?;
        self.is_started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<(), RecorderError> {
        if !self.is_started {
            return Err(RecorderError::StorageError("track file is not started".into()));
        }
        if track.0 as usize >= self.tracks.len() {
            return Err(RecorderError::StorageError(format!("unknown track {}", track)));
        }
        let len = u32::try_from(data.len())
            .map_err(|_| RecorderError::StorageError(format!("sample of {} bytes is too large", data.len())))?;

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + data.len());
        record.extend_from_slice(&track.0.to_le_bytes());
        record.extend_from_slice(&info.flags.bits().to_le_bytes());
        record.extend_from_slice(&info.presentation_time_us.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(data);

        self.write_raw(&record)?;
        self.samples_written += 1;
        Ok(())
    }

    /// Patch the sample count, flush, and checksum the finished file.
    fn finalize(&mut self) -> Result<ContainerSummary, RecorderError> {
        if !self.is_started {
            return Err(RecorderError::StorageError("track file is not started".into()));
        }
        let mut writer = self
            .file
            .take()
            .ok_or_else(|| RecorderError::StorageError("file is not open".into()))?;

        writer.flush().map_err(|e| RecorderError::StorageError(e.to_string()))?;
        let mut file = writer
            .into_inner()
            .map_err(|e| RecorderError::StorageError(e.to_string()))?;
        if self.failed {
            // drop the torn record
            file.set_len(self.total_bytes_written)
                .map_err(|e| RecorderError::StorageError(e.to_string()))?;
        }

        file.seek(SeekFrom::Start(SAMPLE_COUNT_OFFSET))
            .map_err(|e| RecorderError::StorageError(e.to_string()))?;
        file.write_all(&self.samples_written.to_le_bytes())
            .map_err(|e| RecorderError::StorageError(e.to_string()))?;
        file.sync_all().map_err(|e| RecorderError::StorageError(e.to_string()))?;
        drop(file);
        self.is_started = false;

        let path = self
            .file_path
            .as_deref()
            .ok_or_else(|| RecorderError::StorageError("file path unknown".into()))?;
        let checksum = sha256_file(path)?;
        log::debug!(
            "track file finalized: {} sample(s), {} bytes",
            self.samples_written,
            self.total_bytes_written
        );

        Ok(ContainerSummary {
            bytes_written: self.total_bytes_written,
            checksum: Some(checksum),
        })
    }

    /// Close and delete the partial file.
    fn abandon(&mut self) {
        self.file = None;
        self.is_started = false;
        if let Some(path) = &self.file_path {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("failed to remove abandoned file {}: {}", path.display(), e);
            }
        }
    }
}

/// One sample record read back from a track file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub track: TrackIndex,
    pub flags: SampleFlags,
    pub presentation_time_us: i64,
    pub data: Vec<u8>,
}

/// Parsed contents of a finalized track file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFile {
    pub tracks: Vec<FormatDescriptor>,
    pub sample_count: u64,
    pub samples: Vec<SampleRecord>,
}

/// Read a finalized track file back into memory.
pub fn read_track_file(path: &Path) -> Result<TrackFile, RecorderError> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| RecorderError::StorageError(format!("failed to read track file: {}", e)))?;

    let mut cursor = Cursor { bytes: &bytes, pos: 0 };
    if cursor.take(4)? != MAGIC {
        return Err(RecorderError::StorageError("not a track file".into()));
    }
    let version = u16::from_le_bytes(cursor.array()?);
    if version != VERSION {
        return Err(RecorderError::StorageError(format!("unsupported version {}", version)));
    }
    let track_count = u16::from_le_bytes(cursor.array()?) as usize;
    let sample_count = u64::from_le_bytes(cursor.array()?);
    let table_len = u32::from_le_bytes(cursor.array()?) as usize;
    let tracks: Vec<FormatDescriptor> = serde_json::from_slice(cursor.take(table_len)?)
        .map_err(|e| RecorderError::StorageError(format!("corrupt track table: {}", e)))?;
    if tracks.len() != track_count {
        return Err(RecorderError::StorageError("track count mismatch".into()));
    }

    let mut samples = Vec::new();
    while cursor.remaining() > 0 {
        let track = TrackIndex(u32::from_le_bytes(cursor.array()?));
        let flags = SampleFlags::from_bits(u32::from_le_bytes(cursor.array()?));
        let presentation_time_us = i64::from_le_bytes(cursor.array()?);
        let len = u32::from_le_bytes(cursor.array()?) as usize;
        let data = cursor.take(len)?.to_vec();
        samples.push(SampleRecord {
            track,
            flags,
            presentation_time_us,
            data,
        });
    }

    Ok(TrackFile {
        tracks,
        sample_count,
        samples,
    })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], RecorderError> {
        if self.remaining() < len {
            return Err(RecorderError::StorageError("truncated track file".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], RecorderError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, RecorderError> {
    let data = fs::read(path)
        .map_err(|e| RecorderError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
