use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tempfile::NamedTempFile;
use tracing::debug;

/// Allocates randomly named backing files; shared by every connection.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        DiskStore {
            dir: dir.unwrap_or_else(std::env::temp_dir),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create(&self) -> io::Result<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        debug!(path = %file.path().display(), "spilling upload to disk");
        Ok(file)
    }
}

/// Upload content, held in memory or in a temp file removed on drop.
#[derive(Debug)]
pub enum FileData {
    Memory(Bytes),
    Disk(NamedTempFile),
}

#[derive(Debug)]
pub struct FileUpload {
    pub(crate) name: String,
    pub(crate) filename: String,
    pub(crate) content_type: Option<String>,
    pub(crate) len: u64,
    pub(crate) data: FileData,
}

impl FileUpload {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.data, FileData::Memory(_))
    }

    /// Backing file, if the upload was spilled.
    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            FileData::Memory(_) => None,
            FileData::Disk(file) => Some(file.path()),
        }
    }

    pub fn bytes(&self) -> io::Result<Bytes> {
        match &self.data {
            FileData::Memory(b) => Ok(b.clone()),
            FileData::Disk(file) => fs::read(file.path()).map(Bytes::from),
        }
    }
}

/// Receives a file part's body while it streams in.
#[derive(Debug)]
pub(crate) struct UploadSink {
    buf: BytesMut,
    file: Option<NamedTempFile>,
    len: u64,
    threshold: usize,
}

impl UploadSink {
    pub fn new(threshold: usize) -> Self {
        UploadSink {
            buf: BytesMut::new(),
            file: None,
            len: 0,
            threshold,
        }
    }

    pub fn write(&mut self, data: &[u8], store: &DiskStore) -> io::Result<()> {
        if self.file.is_none() && self.buf.len() + data.len() > self.threshold {
            let mut file = store.create()?;
            file.write_all(&self.buf)?;
            self.buf.clear();
            self.file = Some(file);
        }

        match self.file.as_mut() {
            Some(file) => file.write_all(data)?,
            None => self.buf.extend_from_slice(data),
        }
        self.len += data.len() as u64;
        Ok(())
    }

    pub fn finish(self) -> io::Result<(FileData, u64)> {
        let data = match self.file {
            Some(mut file) => {
                file.flush()?;
                FileData::Disk(file)
            }
            None => FileData::Memory(self.buf.freeze()),
        };
        Ok((data, self.len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_uploads_stay_in_memory() {
        let store = DiskStore::new(None);
        let mut sink = UploadSink::new(16);
        sink.write(b"hello ", &store).unwrap();
        sink.write(b"world", &store).unwrap();

        let (data, len) = sink.finish().unwrap();
        assert_eq!(len, 11);
        assert!(matches!(data, FileData::Memory(ref b) if &b[..] == b"hello world"));
    }

    #[test]
    fn large_uploads_spill_and_are_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(Some(dir.path().to_path_buf()));
        let mut sink = UploadSink::new(4);
        sink.write(b"abc", &store).unwrap();
        sink.write(b"defgh", &store).unwrap();

        let (data, len) = sink.finish().unwrap();
        let upload = FileUpload {
            name: "f".into(),
            filename: "f.bin".into(),
            content_type: None,
            len,
            data,
        };
        let path = upload.path().unwrap().to_path_buf();
        assert!(path.starts_with(dir.path()));
        assert_eq!(&upload.bytes().unwrap()[..], b"abcdefgh");

        drop(upload);
        assert!(!path.exists());
    }
}
