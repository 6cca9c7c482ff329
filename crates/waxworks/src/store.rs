//! FileCatalog: filesystem-backed archive catalog.
//!
//! Layout:
//! ```text
//! {archive_dir}/
//! ├── 0/
//! │   ├── descriptor.json   # StreamDescriptor sidecar
//! │   ├── chunk-000.dat     # recorded bytes, pre-sized then sealed
//! │   └── chunk-001.dat
//! └── 1/
//!     └── ...
//! ```
//!
//! Chunks are created at their full configured size and mmap'd so the write
//! path is a bounded copy, never a growing file append. Sealing a chunk
//! truncates it to the bytes actually written, which doubles as the length
//! record: a reader just streams chunk files in order.

use std::cell::Cell;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use waxproto::{StreamDescriptor, StreamIdentity, NO_STREAM_INSTANCE};

use crate::catalog::{Catalog, RecordingReader, RecordingWriter};

const DESCRIPTOR_FILE: &str = "descriptor.json";

fn chunk_file_name(index: u32) -> String {
    format!("chunk-{:03}.dat", index)
}

/// Filesystem-backed [`Catalog`].
pub struct FileCatalog {
    root: PathBuf,
    chunk_bytes: u64,
    next_id: Cell<i64>,
}

impl FileCatalog {
    /// Open (or create) a catalog rooted at `root`. Existing recordings are
    /// scanned to recover the id sequence.
    pub fn new(root: impl AsRef<Path>, chunk_bytes: u64) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create archive directory {}", root.display()))?;

        let mut max_id = NO_STREAM_INSTANCE;
        for entry in fs::read_dir(&root).context("failed to scan archive directory")? {
            let entry = entry?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i64>().ok())
            {
                max_id = max_id.max(id);
            }
        }

        debug!(root = %root.display(), max_id, "opened file catalog");

        Ok(Self {
            root,
            chunk_bytes,
            next_id: Cell::new(max_id + 1),
        })
    }

    fn instance_dir(&self, stream_instance_id: i64) -> PathBuf {
        self.root.join(stream_instance_id.to_string())
    }

    fn write_descriptor(dir: &Path, descriptor: &StreamDescriptor) -> Result<()> {
        let json = serde_json::to_string_pretty(descriptor)
            .context("failed to serialize descriptor")?;
        fs::write(dir.join(DESCRIPTOR_FILE), json)
            .with_context(|| format!("failed to write descriptor in {}", dir.display()))?;
        Ok(())
    }

    fn read_descriptor_file(dir: &Path) -> Result<StreamDescriptor> {
        let raw = fs::read(dir.join(DESCRIPTOR_FILE))
            .with_context(|| format!("failed to read descriptor in {}", dir.display()))?;
        serde_json::from_slice(&raw).context("failed to parse descriptor")
    }
}

impl Catalog for FileCatalog {
    fn begin_recording(
        &self,
        source: &StreamIdentity,
    ) -> Result<(i64, Box<dyn RecordingWriter>)> {
        let id = self.next_id.get();
        let dir = self.instance_dir(id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create recording dir {}", dir.display()))?;

        let descriptor = StreamDescriptor {
            stream_instance_id: id,
            source: source.clone(),
            started_at: Utc::now(),
            stopped_at: None,
            archived_bytes: 0,
            chunk_count: 0,
        };
        Self::write_descriptor(&dir, &descriptor)?;
        self.next_id.set(id + 1);

        let writer = FileRecordingWriter {
            dir,
            chunk_bytes: self.chunk_bytes,
            descriptor,
            chunk: None,
            sealed: false,
        };
        Ok((id, Box::new(writer)))
    }

    fn open_replay(
        &self,
        stream_instance_id: i64,
        offset: u64,
        length: u64,
    ) -> Result<Option<Box<dyn RecordingReader>>> {
        let dir = self.instance_dir(stream_instance_id);
        if !dir.join(DESCRIPTOR_FILE).exists() {
            return Ok(None);
        }
        let descriptor = Self::read_descriptor_file(&dir)?;
        let chunks = (0..descriptor.chunk_count)
            .map(|index| dir.join(chunk_file_name(index)))
            .collect();

        Ok(Some(Box::new(FileRecordingReader {
            chunks,
            current: None,
            next_chunk: 0,
            to_skip: offset,
            remaining: length,
        })))
    }

    fn read_descriptor(&self, stream_instance_id: i64) -> Result<Option<StreamDescriptor>> {
        let dir = self.instance_dir(stream_instance_id);
        if !dir.join(DESCRIPTOR_FILE).exists() {
            return Ok(None);
        }
        Self::read_descriptor_file(&dir).map(Some)
    }

    fn max_stream_instance_id(&self) -> i64 {
        self.next_id.get() - 1
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// One pre-sized, mmap'd chunk being written.
struct ChunkHandle {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    written: u64,
}

impl ChunkHandle {
    fn create(path: PathBuf, chunk_bytes: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to create chunk file {}", path.display()))?;
        file.set_len(chunk_bytes).context("failed to pre-size chunk file")?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(chunk_bytes as usize)
                .map_mut(&file)
                .context("failed to mmap chunk file")?
        };

        Ok(Self {
            path,
            file,
            mmap,
            written: 0,
        })
    }

    /// Copy as much of `data` as fits, returning the number of bytes taken.
    fn write(&mut self, data: &[u8]) -> usize {
        let remaining = self.mmap.len() - self.written as usize;
        let taking = data.len().min(remaining);
        if taking == 0 {
            return 0;
        }
        let offset = self.written as usize;
        self.mmap[offset..offset + taking].copy_from_slice(&data[..taking]);
        self.written += taking as u64;
        taking
    }

    fn is_full(&self) -> bool {
        self.written >= self.mmap.len() as u64
    }

    /// Flush and truncate to the bytes actually written.
    fn seal(self) -> Result<()> {
        self.mmap.flush().context("failed to flush chunk mmap")?;
        let Self {
            path,
            file,
            mmap,
            written,
        } = self;
        drop(mmap);
        file.set_len(written)
            .with_context(|| format!("failed to seal chunk {}", path.display()))?;
        debug!(chunk = %path.display(), written, "sealed chunk");
        Ok(())
    }
}

struct FileRecordingWriter {
    dir: PathBuf,
    chunk_bytes: u64,
    descriptor: StreamDescriptor,
    chunk: Option<ChunkHandle>,
    sealed: bool,
}

impl FileRecordingWriter {
    fn open_next_chunk(&mut self) -> Result<()> {
        let index = self.descriptor.chunk_count;
        let path = self.dir.join(chunk_file_name(index));
        self.chunk = Some(ChunkHandle::create(path, self.chunk_bytes)?);
        self.descriptor.chunk_count = index + 1;
        Ok(())
    }

    fn seal_current(&mut self) -> Result<()> {
        if let Some(chunk) = self.chunk.take() {
            chunk.seal()?;
        }
        Ok(())
    }
}

impl RecordingWriter for FileRecordingWriter {
    fn write(&mut self, mut data: &[u8]) -> Result<()> {
        if self.sealed {
            anyhow::bail!(
                "recording {} already sealed",
                self.descriptor.stream_instance_id
            );
        }
        while !data.is_empty() {
            if self.chunk.is_none() {
                self.open_next_chunk()?;
            }
            let chunk = self.chunk.as_mut().expect("chunk just opened");
            let taken = chunk.write(data);
            data = &data[taken..];
            self.descriptor.archived_bytes += taken as u64;

            if chunk.is_full() {
                self.seal_current()?;
            }
        }
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.descriptor.archived_bytes
    }

    fn finish(&mut self) -> Result<()> {
        if self.sealed {
            return Ok(());
        }
        self.sealed = true;
        self.seal_current()?;
        self.descriptor.stopped_at = Some(Utc::now());
        FileCatalog::write_descriptor(&self.dir, &self.descriptor)
    }
}

impl Drop for FileRecordingWriter {
    fn drop(&mut self) {
        if !self.sealed {
            if let Err(e) = self.finish() {
                warn!(
                    stream_instance_id = self.descriptor.stream_instance_id,
                    "failed to seal recording on drop: {e:#}"
                );
            }
        }
    }
}

struct FileRecordingReader {
    chunks: Vec<PathBuf>,
    current: Option<File>,
    next_chunk: usize,
    to_skip: u64,
    remaining: u64,
}

impl RecordingReader for FileRecordingReader {
    fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        while self.remaining > 0 {
            if self.current.is_none() {
                if self.next_chunk >= self.chunks.len() {
                    return Ok(None);
                }
                let path = &self.chunks[self.next_chunk];
                self.next_chunk += 1;

                let mut file = File::open(path)
                    .with_context(|| format!("failed to open chunk {}", path.display()))?;
                let len = file.metadata()?.len();
                if self.to_skip >= len {
                    // Whole chunk falls before the requested offset.
                    self.to_skip -= len;
                    continue;
                }
                if self.to_skip > 0 {
                    file.seek(SeekFrom::Start(self.to_skip))?;
                    self.to_skip = 0;
                }
                self.current = Some(file);
            }

            let want = (max as u64).min(self.remaining) as usize;
            let mut buffer = vec![0u8; want];
            let file = self.current.as_mut().expect("current chunk open");
            let read = file.read(&mut buffer)?;
            if read == 0 {
                // Exhausted this chunk; move on to the next.
                self.current = None;
                continue;
            }
            buffer.truncate(read);
            self.remaining -= read as u64;
            return Ok(Some(buffer));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> StreamIdentity {
        StreamIdentity {
            channel: "transport:media".to_string(),
            stream_id: 7,
            session_id: 42,
        }
    }

    #[test]
    fn test_record_seal_replay() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::new(dir.path(), 1024).unwrap();

        let (id, mut writer) = catalog.begin_recording(&identity()).unwrap();
        writer.write(b"the quick brown fox").unwrap();
        writer.finish().unwrap();

        let descriptor = catalog.read_descriptor(id).unwrap().unwrap();
        assert_eq!(descriptor.archived_bytes, 19);
        assert_eq!(descriptor.chunk_count, 1);
        assert!(descriptor.stopped_at.is_some());

        let mut reader = catalog.open_replay(id, 4, 5).unwrap().unwrap();
        let chunk = reader.read(64).unwrap().unwrap();
        assert_eq!(&chunk, b"quick");
        assert!(reader.read(64).unwrap().is_none());
    }

    #[test]
    fn test_chunk_rotation() {
        let dir = tempfile::tempdir().unwrap();
        // Tiny chunks force rotation mid-write.
        let catalog = FileCatalog::new(dir.path(), 8).unwrap();

        let (id, mut writer) = catalog.begin_recording(&identity()).unwrap();
        writer.write(b"0123456789abcdefghij").unwrap();
        writer.finish().unwrap();

        let descriptor = catalog.read_descriptor(id).unwrap().unwrap();
        assert_eq!(descriptor.chunk_count, 3);
        assert_eq!(descriptor.archived_bytes, 20);

        // Read the whole thing back across chunk boundaries, in small bites.
        let mut reader = catalog.open_replay(id, 0, 20).unwrap().unwrap();
        let mut assembled = Vec::new();
        while let Some(chunk) = reader.read(3).unwrap() {
            assembled.extend_from_slice(&chunk);
        }
        assert_eq!(&assembled, b"0123456789abcdefghij");
    }

    #[test]
    fn test_offset_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::new(dir.path(), 4).unwrap();

        let (id, mut writer) = catalog.begin_recording(&identity()).unwrap();
        writer.write(b"aaaabbbbcccc").unwrap();
        writer.finish().unwrap();

        // Offset lands inside the second chunk.
        let mut reader = catalog.open_replay(id, 6, 4).unwrap().unwrap();
        let mut assembled = Vec::new();
        while let Some(chunk) = reader.read(64).unwrap() {
            assembled.extend_from_slice(&chunk);
        }
        assert_eq!(&assembled, b"bbcc");
    }

    #[test]
    fn test_id_recovery_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let catalog = FileCatalog::new(dir.path(), 64).unwrap();
            let (id, mut writer) = catalog.begin_recording(&identity()).unwrap();
            assert_eq!(id, 0);
            writer.write(b"first").unwrap();
            writer.finish().unwrap();
        }

        let reopened = FileCatalog::new(dir.path(), 64).unwrap();
        assert_eq!(reopened.max_stream_instance_id(), 0);
        let (id, _) = reopened.begin_recording(&identity()).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_unknown_instance() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::new(dir.path(), 64).unwrap();

        assert!(catalog.read_descriptor(9).unwrap().is_none());
        assert!(catalog.open_replay(9, 0, 1).unwrap().is_none());
        assert_eq!(catalog.max_stream_instance_id(), NO_STREAM_INSTANCE);
    }
}
