//! Disk side of a capture: streams a response body into its mirror file.
//!
//! The body goes straight to the target path (no temp file, no rename). A
//! failed transfer can leave a partial file behind; it is not cleaned up and
//! will be replaced by the next successful capture of the same resource.

use crate::network::ResponseSink;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const WRITE_BUF_SIZE: usize = 64 * 1024;

/// Creates the parent directory of `path` (and ancestors). Tolerates
/// concurrent creation of the same directories.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// [`ResponseSink`] that writes the body to one mirror file.
///
/// The file is created (truncating any previous copy) when the response
/// starts, so a rejected response never touches the existing copy.
pub struct MirrorFileWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl MirrorFileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MirrorFileWriter {
            path: path.into(),
            file: None,
            bytes_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn file(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "response body before response start")
        })
    }
}

impl ResponseSink for MirrorFileWriter {
    fn on_response(&mut self, _status: u32) -> io::Result<()> {
        ensure_parent_dir(&self.path)?;
        let file = File::create(&self.path)?;
        self.file = Some(BufWriter::with_capacity(WRITE_BUF_SIZE, file));
        self.bytes_written = 0;
        Ok(())
    }

    fn on_data(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file()?.write_all(chunk)?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    fn on_end(&mut self) -> io::Result<()> {
        let mut file = self.file.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "response end before response start")
        })?;
        file.flush()?;
        file.get_ref().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_body_into_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.com/game/data/assets.swf");
        let mut w = MirrorFileWriter::new(&path);
        w.on_response(200).unwrap();
        w.on_data(b"hello ").unwrap();
        w.on_data(b"world").unwrap();
        w.on_end().unwrap();

        assert_eq!(w.bytes_written(), 11);
        assert_eq!(fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn replaces_existing_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.com/a.js");
        ensure_parent_dir(&path).unwrap();
        fs::write(&path, b"old old old").unwrap();

        let mut w = MirrorFileWriter::new(&path);
        w.on_response(200).unwrap();
        w.on_data(b"new").unwrap();
        w.on_end().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn empty_body_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.com/empty.txt");
        let mut w = MirrorFileWriter::new(&path);
        w.on_response(204).unwrap();
        w.on_end().unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn data_before_start_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = MirrorFileWriter::new(dir.path().join("x.bin"));
        assert!(w.on_data(b"x").is_err());
        assert!(w.on_end().is_err());
    }

    #[test]
    fn parent_that_is_a_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("blocker"), b"file").unwrap();
        let mut w = MirrorFileWriter::new(dir.path().join("blocker/child.js"));
        assert!(w.on_response(200).is_err());
    }

    #[test]
    fn ensure_parent_dir_is_idempotent_under_races() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c/d.txt");
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| ensure_parent_dir(&path).unwrap());
            }
        });
        assert!(dir.path().join("a/b/c").is_dir());
    }
}
