// Backup targets and sources: opaque handles to where a backup is written
// or read from. The caller picks the location; the engine only opens it.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Something a backup can be written into
pub trait BackupTarget: Send + Sync {
    fn open_writer(&self) -> io::Result<Box<dyn Write + Send>>;
}

/// Something a backup can be read from
pub trait BackupSource: Send + Sync {
    fn open_reader(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// A backup file on disk
#[derive(Debug, Clone)]
pub struct FileLocation {
    path: PathBuf,
}

impl FileLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackupTarget for FileLocation {
    fn open_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(File::create(&self.path)?))
    }
}

impl BackupSource for FileLocation {
    fn open_reader(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// In-memory backup buffer. Bytes become visible once the writer is flushed.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocation {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes)),
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

struct MemoryWriter {
    pending: Vec<u8>,
    target: Arc<Mutex<Vec<u8>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        *self.target.lock() = self.pending.clone();
        Ok(())
    }
}

impl BackupTarget for MemoryLocation {
    fn open_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(MemoryWriter {
            pending: Vec::new(),
            target: self.bytes.clone(),
        }))
    }
}

impl BackupSource for MemoryLocation {
    fn open_reader(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.bytes())))
    }
}
