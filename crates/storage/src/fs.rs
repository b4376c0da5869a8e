//! Filesystem-backed storage rooted at a directory

use crate::{RandomReadFile, StorageBackend, StorageError, StorageResult, WriteFile};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local filesystem storage; paths are interpreted relative to `root`
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl StorageBackend for FilesystemStorage {
    fn random_read_file(&self, path: &str) -> StorageResult<Box<dyn RandomReadFile>> {
        let full = self.resolve(path);
        let file = File::open(&full).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Box::new(FsReadFile { file }))
    }

    fn write_file(&self, path: &str) -> StorageResult<Box<dyn WriteFile>> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write into a sibling temp file and rename on save so readers never
        // observe a partially written blob.
        let tmp = full.with_extension("tmp");
        let file = File::create(&tmp)?;
        debug!(path, "opened write file");
        Ok(Box::new(FsWriteFile {
            file,
            tmp,
            dest: full,
        }))
    }

    fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.resolve(path).exists())
    }

    fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = self.resolve(prefix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        collect_files(&dir, &self.root, &mut entries)?;
        entries.sort();
        Ok(entries)
    }
}

fn collect_files(dir: &Path, root: &Path, out: &mut Vec<String>) -> StorageResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, root, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

struct FsReadFile {
    file: File,
}

impl RandomReadFile for FsReadFile {
    fn read_at(&mut self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        let mut read = 0;
        while read < len {
            let n = self.file.read(&mut buf[read..])?;
            if n == 0 {
                return Err(StorageError::ShortRead {
                    offset,
                    wanted: len,
                    got: read,
                });
            }
            read += n;
        }
        Ok(buf)
    }

    fn size(&mut self) -> StorageResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

struct FsWriteFile {
    file: File,
    tmp: PathBuf,
    dest: PathBuf,
}

impl WriteFile for FsWriteFile {
    fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn save(mut self: Box<Self>) -> StorageResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        fs::rename(&self.tmp, &self.dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{read_all, write_all};

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path()).unwrap();

        write_all(&storage, "jobs/0/blob.bin", b"hello frames").unwrap();
        assert!(storage.exists("jobs/0/blob.bin").unwrap());
        assert_eq!(read_all(&storage, "jobs/0/blob.bin").unwrap(), b"hello frames");
    }

    #[test]
    fn read_at_returns_requested_window() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path()).unwrap();
        write_all(&storage, "window.bin", b"0123456789").unwrap();

        let mut file = storage.random_read_file("window.bin").unwrap();
        assert_eq!(file.size().unwrap(), 10);
        assert_eq!(file.read_at(3, 4).unwrap(), b"3456");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path()).unwrap();
        match storage.random_read_file("nope.bin") {
            Err(StorageError::NotFound(path)) => assert_eq!(path, "nope.bin"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn unsaved_write_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path()).unwrap();

        let mut file = storage.write_file("pending.bin").unwrap();
        file.append(b"half").unwrap();
        assert!(!storage.exists("pending.bin").unwrap());

        file.save().unwrap();
        assert!(storage.exists("pending.bin").unwrap());
    }

    #[test]
    fn list_prefix_walks_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path()).unwrap();
        write_all(&storage, "jobs/0/a.bin", b"a").unwrap();
        write_all(&storage, "jobs/0/tables/1/b.bin", b"b").unwrap();
        write_all(&storage, "other/c.bin", b"c").unwrap();

        let listed = storage.list_prefix("jobs").unwrap();
        assert_eq!(listed, vec!["jobs/0/a.bin", "jobs/0/tables/1/b.bin"]);
    }
}
