//! RKV archive handling
//!
//! This module provides the main [`Archive`] type for reading RKV containers.
//! It supports:
//! - Both container generations (RKV1 and RKV2)
//! - Case-insensitive lookup
//! - On-demand extraction of raw file blobs

use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// RKV2 archive magic (`"RKV2"`)
pub const RKV2_MAGIC: [u8; 4] = *b"RKV2";

/// Size of one RKV1 record table entry
pub const RKV1_RECORD_SIZE: u64 = 64;

/// Size of one RKV1 folder table entry
pub const RKV1_FOLDER_SIZE: u64 = 256;

/// Size of one RKV2 record table entry
pub const RKV2_RECORD_SIZE: u64 = 20;

/// Maximum length of a name in the RKV2 name blob (including NUL)
const RKV2_NAME_MAX: usize = 0x100;

/// RKV container generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Record table and counts anchored at the end of the file, no magic
    Rkv1,
    /// `RKV2` magic, sequential record entries, separate name blob
    Rkv2,
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatVersion::Rkv1 => write!(f, "RKV1"),
            FormatVersion::Rkv2 => write!(f, "RKV2"),
        }
    }
}

/// One named record in an RKV container. Immutable after load.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File name as stored in the container
    pub name: String,
    /// Absolute byte offset of the data
    pub offset: u32,
    /// Size of the data in bytes
    pub size: u32,
    /// Folder id (RKV1 only, zero for RKV2)
    pub folder: u32,
    /// Timestamp (RKV1 only, zero for RKV2)
    pub timestamp: u32,
}

impl FileEntry {
    /// Lowercased extension (without the dot), if any
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

/// An opened RKV container with a case-insensitive name index.
///
/// The underlying file is reopened per [`Archive::read_file`] call, so a
/// shared `Archive` can serve concurrent independent reads.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    version: FormatVersion,
    file_size: u64,
    entries: HashMap<String, FileEntry>,
}

impl Archive {
    /// Open an RKV container and build its name index.
    ///
    /// A `RKV2` magic selects the current generation; any other leading bytes
    /// are treated as RKV1. There is no reliable RKV1 magic, so that path
    /// validates the trailing record table before accepting the file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("archive file is empty: {}", path.display()),
            )));
        }

        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 4];
        let version = if file_size >= 4 {
            reader.read_exact(&mut magic)?;
            if magic == RKV2_MAGIC {
                FormatVersion::Rkv2
            } else {
                FormatVersion::Rkv1
            }
        } else {
            FormatVersion::Rkv1
        };

        log::debug!("identified {} as {version} format", path.display());

        let entries = match version {
            FormatVersion::Rkv1 => load_rkv1(&mut reader, file_size)?,
            FormatVersion::Rkv2 => load_rkv2(&mut reader, file_size)?,
        };

        log::info!(
            "loaded {} files from {version} archive {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            version,
            file_size,
            entries,
        })
    }

    /// Path of the underlying container file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detected container generation
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Number of records in the index
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    /// Size of the container file on disk in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Look up a record by name (case-insensitive)
    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    /// Check whether a record exists (case-insensitive)
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Names of all records (unordered)
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|e| e.name.as_str())
    }

    /// Names of records whose extension matches `ext` (case-insensitive,
    /// leading dot optional)
    pub fn files_by_extension(&self, ext: &str) -> Vec<&str> {
        let want = ext.trim_start_matches('.').to_ascii_lowercase();
        self.entries
            .values()
            .filter(|e| e.extension().as_deref() == Some(want.as_str()))
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Read the raw bytes of a record.
    ///
    /// Fails with [`Error::FileNotFound`] on a lookup miss, and with
    /// [`Error::TruncatedData`] if the declared range exceeds the container.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .file(name)
            .ok_or_else(|| Error::FileNotFound(name.to_string()))?;

        let end = u64::from(entry.offset) + u64::from(entry.size);
        if end > self.file_size {
            return Err(Error::TruncatedData {
                name: entry.name.clone(),
                expected: end,
                actual: self.file_size,
            });
        }

        // Fresh handle per call so concurrent reads don't contend on a seek
        // position.
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(u64::from(entry.offset)))?;
        let mut data = vec![0u8; entry.size as usize];
        file.read_exact(&mut data)?;
        Ok(data)
    }
}

/// Read the trailing record table of an RKV1 container.
///
/// Layout, back to front: 8-byte trailer `{u32 file_count, u32 folder_count}`,
/// preceded by `folder_count` 256-byte folder entries, preceded by
/// `file_count` 64-byte records.
fn load_rkv1<R: Read + Seek>(reader: &mut R, file_size: u64) -> Result<HashMap<String, FileEntry>> {
    if file_size < 8 {
        return Err(Error::unknown_format(
            "file too small for an RKV1 trailer".to_string(),
        ));
    }

    reader.seek(SeekFrom::End(-8))?;
    let file_count = reader.read_u32::<LittleEndian>()?;
    let folder_count = reader.read_u32::<LittleEndian>()?;

    let table_bytes = 8u64
        .checked_add(u64::from(folder_count) * RKV1_FOLDER_SIZE)
        .and_then(|n| n.checked_add(u64::from(file_count) * RKV1_RECORD_SIZE))
        .ok_or_else(|| Error::unknown_format("RKV1 table size overflows"))?;
    let table_start = file_size
        .checked_sub(table_bytes)
        .ok_or_else(|| Error::unknown_format("RKV1 record table does not fit in file"))?;

    reader.seek(SeekFrom::Start(table_start))?;

    let mut entries = HashMap::with_capacity(file_count as usize);
    let mut record = [0u8; RKV1_RECORD_SIZE as usize];
    for _ in 0..file_count {
        reader.read_exact(&mut record)?;

        let name = read_nul_terminated(&record[..32]);
        let folder = u32::from_le_bytes([record[32], record[33], record[34], record[35]]);
        let size = u32::from_le_bytes([record[36], record[37], record[38], record[39]]);
        let offset = u32::from_le_bytes([record[44], record[45], record[46], record[47]]);
        let timestamp = u32::from_le_bytes([record[52], record[53], record[54], record[55]]);

        let key = name.to_ascii_lowercase();
        entries.insert(
            key,
            FileEntry {
                name,
                offset,
                size,
                folder,
                timestamp,
            },
        );
    }

    Ok(entries)
}

/// Read the leading record table of an RKV2 container.
///
/// Record entries are walked with a sequential cursor starting at
/// `info_offset`; names live in a blob at `file_count * 20 + info_offset`.
fn load_rkv2<R: Read + Seek>(reader: &mut R, file_size: u64) -> Result<HashMap<String, FileEntry>> {
    reader.seek(SeekFrom::Start(4))?;

    let file_count = reader.read_u32::<LittleEndian>()?;
    let _name_blob_size = reader.read_u32::<LittleEndian>()?;
    let _fullname_file_count = reader.read_u32::<LittleEndian>()?;
    let _reserved1 = reader.read_u32::<LittleEndian>()?;
    let info_offset = reader.read_u32::<LittleEndian>()?;
    let _reserved2 = reader.read_u32::<LittleEndian>()?;

    let name_blob_start = u64::from(file_count)
        .checked_mul(RKV2_RECORD_SIZE)
        .and_then(|n| n.checked_add(u64::from(info_offset)))
        .ok_or_else(|| Error::unknown_format("RKV2 name blob offset overflows"))?;

    let table_end = u64::from(info_offset) + u64::from(file_count) * RKV2_RECORD_SIZE;
    if table_end > file_size {
        return Err(Error::unknown_format(format!(
            "RKV2 record table ends at {table_end} but file is {file_size} bytes"
        )));
    }

    let mut entries = HashMap::with_capacity(file_count as usize);
    let mut cursor = u64::from(info_offset);
    let mut record = [0u8; RKV2_RECORD_SIZE as usize];
    let mut name_buf = [0u8; RKV2_NAME_MAX];

    for _ in 0..file_count {
        reader.seek(SeekFrom::Start(cursor))?;
        reader.read_exact(&mut record)?;
        cursor += RKV2_RECORD_SIZE;

        let name_offset = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let size = u32::from_le_bytes([record[8], record[9], record[10], record[11]]);
        let offset = u32::from_le_bytes([record[12], record[13], record[14], record[15]]);
        let _crc = u32::from_le_bytes([record[16], record[17], record[18], record[19]]);

        let name_pos = name_blob_start + u64::from(name_offset);
        if name_pos >= file_size {
            return Err(Error::unknown_format(format!(
                "RKV2 name offset {name_pos} past end of file"
            )));
        }
        reader.seek(SeekFrom::Start(name_pos))?;
        let readable = usize::try_from((file_size - name_pos).min(RKV2_NAME_MAX as u64))
            .unwrap_or(RKV2_NAME_MAX);
        reader.read_exact(&mut name_buf[..readable])?;
        let name = read_nul_terminated(&name_buf[..readable]);

        let key = name.to_ascii_lowercase();
        entries.insert(
            key,
            FileEntry {
                name,
                offset,
                size,
                folder: 0,
                timestamp: 0,
            },
        );
    }

    Ok(entries)
}

/// Decode a NUL-terminated (or buffer-length-bounded) name
fn read_nul_terminated(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
