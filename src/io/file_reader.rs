use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;

use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of RangeReader.
///
/// The file size is read once on creation; every read seeks and reads
/// exactly the requested span.
pub struct FileRangeReader {
    file: Mutex<File>,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open a file for range reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let identifier = path.display().to_string();

        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(identifier.clone()),
            _ => IoError::Read {
                path: identifier.clone(),
                message: e.to_string(),
            },
        })?;
        let size = file
            .metadata()
            .map_err(|e| IoError::Read {
                path: identifier.clone(),
                message: e.to_string(),
            })?
            .len();

        Ok(Self {
            file: Mutex::new(file),
            size,
            identifier,
        })
    }

    fn read_error(&self, message: impl ToString) -> IoError {
        IoError::Read {
            path: self.identifier.clone(),
            message: message.to_string(),
        }
    }
}

impl RangeReader for FileRangeReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.size => {}
            _ => {
                return Err(IoError::RangeOutOfBounds {
                    offset,
                    requested: len as u64,
                    size: self.size,
                })
            }
        }

        let mut file = self
            .file
            .lock()
            .map_err(|_| self.read_error("file lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| self.read_error(e))?;

        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).map_err(|e| self.read_error(e))?;
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
