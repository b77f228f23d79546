//! Building synthetic RKV containers
//!
//! Writes syntactically valid RKV1/RKV2 archives from `(name, bytes)` pairs.
//! Primarily used by tests and fixtures; output follows the documented
//! layouts but makes no attempt to byte-match retail archives beyond that
//! (retail RKV1 folder tables, CRCs and fullname tables are left zeroed).

use crate::archive::{RKV1_RECORD_SIZE, RKV2_MAGIC, RKV2_RECORD_SIZE};
use crate::{Error, FormatVersion, Result};
use std::fs;
use std::path::Path;

/// Builder for RKV containers
#[derive(Debug)]
pub struct RkvBuilder {
    version: FormatVersion,
    files: Vec<(String, Vec<u8>)>,
}

impl RkvBuilder {
    /// Create a builder targeting the given container generation
    pub fn new(version: FormatVersion) -> Self {
        Self {
            version,
            files: Vec::new(),
        }
    }

    /// Add a file from memory
    pub fn add_file_data<S: Into<String>>(mut self, name: S, data: Vec<u8>) -> Self {
        self.files.push((name.into(), data));
        self
    }

    /// Serialize the container to bytes
    pub fn build(&self) -> Result<Vec<u8>> {
        match self.version {
            FormatVersion::Rkv1 => self.build_rkv1(),
            FormatVersion::Rkv2 => self.build_rkv2(),
        }
    }

    /// Serialize the container to a file
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.build()?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// RKV1: data blobs, then the 64-byte record table, then the
    /// `{file_count, folder_count}` trailer. No folder entries are emitted.
    fn build_rkv1(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut records = Vec::with_capacity(self.files.len());

        for (name, data) in &self.files {
            if name.len() >= 32 {
                return Err(Error::InvalidEntry(format!(
                    "RKV1 name too long ({} bytes, max 31): {name}",
                    name.len()
                )));
            }
            let offset = u32::try_from(out.len())
                .map_err(|_| Error::InvalidEntry(format!("archive too large at {name}")))?;
            records.push((name.as_str(), offset, data.len() as u32));
            out.extend_from_slice(data);
        }

        for (name, offset, size) in records {
            let mut record = [0u8; RKV1_RECORD_SIZE as usize];
            record[..name.len()].copy_from_slice(name.as_bytes());
            record[36..40].copy_from_slice(&size.to_le_bytes());
            record[44..48].copy_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&record);
        }

        out.extend_from_slice(&(self.files.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // folder count
        Ok(out)
    }

    /// RKV2: magic + 24-byte header, data blobs, record table at
    /// `info_offset`, name blob directly after the table.
    fn build_rkv2(&self) -> Result<Vec<u8>> {
        const HEADER_SIZE: usize = 4 + 24;

        let file_count = self.files.len() as u32;
        let data_size: usize = self.files.iter().map(|(_, d)| d.len()).sum();
        let info_offset = (HEADER_SIZE + data_size) as u32;

        let mut name_blob = Vec::new();
        let mut name_offsets = Vec::with_capacity(self.files.len());
        for (name, _) in &self.files {
            name_offsets.push(name_blob.len() as u32);
            name_blob.extend_from_slice(name.as_bytes());
            name_blob.push(0);
        }

        let mut out = Vec::with_capacity(HEADER_SIZE + data_size);
        out.extend_from_slice(&RKV2_MAGIC);
        out.extend_from_slice(&file_count.to_le_bytes());
        out.extend_from_slice(&(name_blob.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // fullname file count
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved
        out.extend_from_slice(&info_offset.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved

        let mut data_offsets = Vec::with_capacity(self.files.len());
        for (_, data) in &self.files {
            data_offsets.push(out.len() as u32);
            out.extend_from_slice(data);
        }

        debug_assert_eq!(out.len(), info_offset as usize);
        for (i, (_, data)) in self.files.iter().enumerate() {
            let mut record = [0u8; RKV2_RECORD_SIZE as usize];
            record[..4].copy_from_slice(&name_offsets[i].to_le_bytes());
            record[8..12].copy_from_slice(&(data.len() as u32).to_le_bytes());
            record[12..16].copy_from_slice(&data_offsets[i].to_le_bytes());
            out.extend_from_slice(&record);
        }

        out.extend_from_slice(&name_blob);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rkv1_layout() {
        let bytes = RkvBuilder::new(FormatVersion::Rkv1)
            .add_file_data("a.bin", vec![1, 2, 3])
            .build()
            .unwrap();
        // data + one record + trailer
        assert_eq!(bytes.len(), 3 + 64 + 8);
        let trailer = &bytes[bytes.len() - 8..];
        assert_eq!(u32::from_le_bytes(trailer[..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(trailer[4..].try_into().unwrap()), 0);
    }

    #[test]
    fn test_rkv1_rejects_long_names() {
        let result = RkvBuilder::new(FormatVersion::Rkv1)
            .add_file_data("x".repeat(40), vec![])
            .build();
        assert!(matches!(result, Err(Error::InvalidEntry(_))));
    }

    #[test]
    fn test_rkv2_layout() {
        let bytes = RkvBuilder::new(FormatVersion::Rkv2)
            .add_file_data("a.bin", vec![9; 7])
            .build()
            .unwrap();
        assert_eq!(&bytes[..4], b"RKV2");
        let info_offset = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
        assert_eq!(info_offset as usize, 28 + 7);
    }
}
