//! Checksummed snapshot file holding the live records of one collection.
//!
//! A snapshot is always written whole: the new image goes to a temporary
//! file which is synced and then renamed over the old one, so readers see
//! either the previous snapshot or the new one.
//!
//! # Format
//!
//! ```text
//! [magic:"QVR1"][count:u64][checksum:u32][body]
//! body   := record*
//! record := [id_len:u32][id:utf8][dim:u32][vector:f32*dim][meta_len:u32][metadata:json]
//! ```
//!
//! All integers and floats are little-endian; the checksum covers the body.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::vector::{Metadata, VectorRecord};

const MAGIC: &[u8; 4] = b"QVR1";
const HEADER_LEN: usize = 4 + 8 + 4;

/// Snapshot file of a collection.
#[derive(Debug, Clone)]
pub struct DataFile {
    /// Path to the data file.
    path: PathBuf,
}

impl DataFile {
    /// Points at a snapshot path. Nothing is touched until read or write.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the path to the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the snapshot with `records`.
    pub fn write(&self, records: &[VectorRecord]) -> Result<()> {
        let mut body = Vec::new();
        for record in records {
            encode_record(&mut body, record)?;
        }

        let mut image = Vec::with_capacity(HEADER_LEN + body.len());
        image.extend_from_slice(MAGIC);
        image.extend_from_slice(&(records.len() as u64).to_le_bytes());
        image.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        image.extend_from_slice(&body);

        let tmp = self.path.with_extension("qvr.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&image)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Reads every record. A missing file is an empty snapshot.
    pub fn read(&self) -> Result<Vec<VectorRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let bytes = fs::read(&self.path)?;
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(Error::SnapshotCorrupted(format!(
                "{}: bad header",
                self.path.display()
            )));
        }

        let mut header = Reader::new(&bytes[4..HEADER_LEN]);
        let count = header.u64()? as usize;
        let expected = header.u32()?;

        let body = &bytes[HEADER_LEN..];
        let actual = crc32fast::hash(body);
        if actual != expected {
            return Err(Error::SnapshotCorrupted(format!(
                "{}: checksum mismatch: expected {}, got {}",
                self.path.display(),
                expected,
                actual
            )));
        }

        let mut reader = Reader::new(body);
        let mut records = Vec::with_capacity(count.min(body.len()));
        for _ in 0..count {
            records.push(reader.record()?);
        }
        if !reader.is_done() {
            return Err(Error::SnapshotCorrupted("trailing bytes after records".into()));
        }

        Ok(records)
    }
}

fn encode_record(out: &mut Vec<u8>, record: &VectorRecord) -> Result<()> {
    let metadata = serde_json::to_vec(&record.metadata)?;

    out.extend_from_slice(&(record.id.len() as u32).to_le_bytes());
    out.extend_from_slice(record.id.as_bytes());
    out.extend_from_slice(&(record.vector.len() as u32).to_le_bytes());
    for &val in &record.vector {
        out.extend_from_slice(&val.to_le_bytes());
    }
    out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
    out.extend_from_slice(&metadata);
    Ok(())
}

/// Bounds-checked cursor over a snapshot body.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_done(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::SnapshotCorrupted("record runs past end of file".into()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn record(&mut self) -> Result<VectorRecord> {
        let id_len = self.u32()? as usize;
        let id = std::str::from_utf8(self.take(id_len)?)
            .map_err(|e| Error::SnapshotCorrupted(format!("id is not utf-8: {}", e)))?
            .to_string();

        let dim = self.u32()? as usize;
        let raw = self.take(dim.saturating_mul(4))?;
        let vector = raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let meta_len = self.u32()? as usize;
        let metadata: Metadata = serde_json::from_slice(self.take(meta_len)?)
            .map_err(|e| Error::SnapshotCorrupted(format!("bad metadata for '{}': {}", id, e)))?;

        Ok(VectorRecord {
            id,
            vector,
            metadata,
        })
    }
}
