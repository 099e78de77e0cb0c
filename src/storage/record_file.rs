//! On-disk heap persistence.
//!
//! The record file is the durable mirror of the VM heap:
//!
//! ```text
//! +-----------+-------------+--------------------------------------+
//! | format_id | entry_count | entry_count x (key, length, bytes)   |
//! |  i32 LE   |   i32 LE    |  i32 LE, i32 LE, `length` raw bytes  |
//! +-----------+-------------+--------------------------------------+
//! ```
//!
//! Every mutation rewrites the whole file. The new contents are written to a
//! sibling `.tmp` file which is then renamed over the original, so readers
//! see either the old or the new file and never a torn one.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_bytes};
use crate::warn;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zvm_derive::{BinaryCodec, Error};

/// Format id written into freshly created files.
pub const FORMAT_ID: i32 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt record file {path}: {reason}")]
    Corrupt { path: String, reason: DecodeError },
}

/// Leading header of a record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub struct StorageHeader {
    pub format_id: i32,
    pub entry_count: i32,
}

/// One persisted heap entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: i32,
    pub data: Vec<u8>,
}

impl Encode for Record {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.key.encode(out);
        (self.data.len() as i32).encode(out);
        self.data[..].encode(out);
    }
}

impl Decode for Record {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let key = i32::decode(input)?;
        let len = i32::decode(input)?;
        let len = usize::try_from(len).map_err(|_| DecodeError::InvalidValue("negative record length"))?;
        let data = read_bytes(input, len)?.to_vec();
        Ok(Self { key, data })
    }
}

/// Decoded contents of a record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub format_id: i32,
    pub records: Vec<Record>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            format_id: FORMAT_ID,
            records: Vec::new(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        StorageHeader {
            format_id: self.format_id,
            entry_count: self.records.len() as i32,
        }
        .encode(&mut out);
        for record in &self.records {
            record.encode(&mut out);
        }
        out
    }

    /// Decodes header and records.
    ///
    /// Bytes after the last announced record are ignored.
    fn decode(mut input: &[u8]) -> Result<(Self, usize), DecodeError> {
        let header = StorageHeader::decode(&mut input)?;
        let count = usize::try_from(header.entry_count)
            .map_err(|_| DecodeError::InvalidValue("negative entry count"))?;
        let records = (0..count)
            .map(|_| Record::decode(&mut input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((
            Self {
                format_id: header.format_id,
                records,
            },
            input.len(),
        ))
    }
}

/// Handle to a record file on disk. Holds only the path; every operation
/// opens, reads and rewrites the file.
#[derive(Debug, Clone)]
pub struct RecordFile {
    path: PathBuf,
}

impl RecordFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Writes an empty file (format id 1, no records), replacing any existing one.
    pub fn create<P: Into<PathBuf>>(path: P) -> Result<Self, StorageError> {
        let file = Self::new(path);
        file.write(&Snapshot::empty())?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads and decodes the whole file.
    pub fn read(&self) -> Result<Snapshot, StorageError> {
        let bytes = fs::read(&self.path)?;
        let (snapshot, trailing) = Snapshot::decode(&bytes).map_err(|reason| StorageError::Corrupt {
            path: self.path.display().to_string(),
            reason,
        })?;
        if trailing > 0 {
            warn!(
                "{}: ignoring {} bytes after the last record",
                self.path.display(),
                trailing
            );
        }
        Ok(snapshot)
    }

    /// Replaces the file contents with `snapshot`.
    pub fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&snapshot.to_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Stores `data` under `key`, dropping any previous record for that key.
    pub fn append(&self, key: i32, data: &[u8]) -> Result<(), StorageError> {
        let mut snapshot = self.read()?;
        snapshot.records.retain(|r| r.key != key);
        snapshot.records.push(Record {
            key,
            data: data.to_vec(),
        });
        self.write(&snapshot)
    }

    /// Removes the record for `key`. Returns whether one was present.
    pub fn remove(&self, key: i32) -> Result<bool, StorageError> {
        let mut snapshot = self.read()?;
        let before = snapshot.records.len();
        snapshot.records.retain(|r| r.key != key);
        if snapshot.records.len() == before {
            return Ok(false);
        }
        self.write(&snapshot)?;
        Ok(true)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
