//! Archive capability used by the container builder.

use std::io::{Cursor, Write};

use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Stored,
    Deflated,
}

/// Somewhere entries can be appended in order. Implementations must keep
/// entries in the order they were added.
pub trait ArchiveSink {
    fn add_entry(&mut self, name: &str, data: &[u8], compression: Compression) -> Result<()>;

    /// Finalize and hand back the complete archive.
    fn finish(self) -> Result<Vec<u8>>;
}

/// In-memory zip archive.
pub struct ZipArchiveSink {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipArchiveSink {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }
}

impl Default for ZipArchiveSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSink for ZipArchiveSink {
    fn add_entry(&mut self, name: &str, data: &[u8], compression: Compression) -> Result<()> {
        let method = match compression {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        };
        let options = FileOptions::default().compression_method(method);

        self.writer.start_file(name, options)?;
        self.writer.write_all(data)?;
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        let cursor = self.writer.finish()?;
        Ok(cursor.into_inner())
    }
}
