//! Archive catalog collaborator.
//!
//! The catalog owns everything durable: it issues stream-instance ids,
//! stores descriptors, and hands out the writers and readers that move
//! recorded bytes. The conductor and its sessions only ever see these
//! traits; [`FileCatalog`](crate::store::FileCatalog) is the on-disk
//! implementation and [`MemoryCatalog`] backs tests and embedders.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{bail, Result};
use chrono::Utc;

use waxproto::{StreamDescriptor, StreamIdentity, NO_STREAM_INSTANCE};

/// Sink for one recording's bytes.
pub trait RecordingWriter {
    fn write(&mut self, data: &[u8]) -> Result<()>;

    fn bytes_written(&self) -> u64;

    /// Seal the recording and stamp its descriptor. Idempotent.
    fn finish(&mut self) -> Result<()>;
}

/// Source for one recording's bytes, bounded to the range it was opened with.
pub trait RecordingReader {
    /// Read up to `max` bytes. `Ok(None)` signals the end of the range.
    fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>>;
}

/// Catalog of archived stream instances.
///
/// Methods take `&self`: implementations carry their own interior state and
/// live on the conductor thread behind an `Rc`.
pub trait Catalog {
    /// Issue the next stream-instance id and open a writer for it. The
    /// descriptor is registered immediately with no stop time.
    fn begin_recording(&self, source: &StreamIdentity)
        -> Result<(i64, Box<dyn RecordingWriter>)>;

    /// Open a bounded reader over a recorded byte range. `Ok(None)` when the
    /// instance id is unknown.
    fn open_replay(
        &self,
        stream_instance_id: i64,
        offset: u64,
        length: u64,
    ) -> Result<Option<Box<dyn RecordingReader>>>;

    /// `Ok(None)` when the instance id is unknown.
    fn read_descriptor(&self, stream_instance_id: i64) -> Result<Option<StreamDescriptor>>;

    /// Highest id ever issued, or [`NO_STREAM_INSTANCE`] if none.
    fn max_stream_instance_id(&self) -> i64;

    /// Idempotent.
    fn close(&self) -> Result<()>;
}

// === In-memory catalog ===

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    recordings: BTreeMap<i64, (StreamDescriptor, Vec<u8>)>,
    closed: bool,
}

/// Heap-backed catalog for tests and embedders.
#[derive(Default)]
pub struct MemoryCatalog {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryCatalog {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}

struct MemoryWriter {
    state: Rc<RefCell<MemoryState>>,
    stream_instance_id: i64,
    finished: bool,
}

impl RecordingWriter for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.finished {
            bail!("recording {} already sealed", self.stream_instance_id);
        }
        let mut state = self.state.borrow_mut();
        let (descriptor, bytes) = state
            .recordings
            .get_mut(&self.stream_instance_id)
            .expect("writer outlived its catalog entry");
        bytes.extend_from_slice(data);
        descriptor.archived_bytes = bytes.len() as u64;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        let state = self.state.borrow();
        state.recordings[&self.stream_instance_id].1.len() as u64
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let mut state = self.state.borrow_mut();
        let (descriptor, _) = state
            .recordings
            .get_mut(&self.stream_instance_id)
            .expect("writer outlived its catalog entry");
        descriptor.stopped_at = Some(Utc::now());
        Ok(())
    }
}

struct MemoryReader {
    data: Vec<u8>,
    cursor: usize,
}

impl RecordingReader for MemoryReader {
    fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        if self.cursor >= self.data.len() {
            return Ok(None);
        }
        let end = (self.cursor + max).min(self.data.len());
        let chunk = self.data[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(Some(chunk))
    }
}

impl Catalog for MemoryCatalog {
    fn begin_recording(
        &self,
        source: &StreamIdentity,
    ) -> Result<(i64, Box<dyn RecordingWriter>)> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            bail!("catalog is closed");
        }
        let id = state.next_id;
        state.next_id += 1;

        let descriptor = StreamDescriptor {
            stream_instance_id: id,
            source: source.clone(),
            started_at: Utc::now(),
            stopped_at: None,
            archived_bytes: 0,
            chunk_count: 1,
        };
        state.recordings.insert(id, (descriptor, Vec::new()));

        Ok((
            id,
            Box::new(MemoryWriter {
                state: Rc::clone(&self.state),
                stream_instance_id: id,
                finished: false,
            }),
        ))
    }

    fn open_replay(
        &self,
        stream_instance_id: i64,
        offset: u64,
        length: u64,
    ) -> Result<Option<Box<dyn RecordingReader>>> {
        let state = self.state.borrow();
        let Some((_, bytes)) = state.recordings.get(&stream_instance_id) else {
            return Ok(None);
        };
        let start = (offset as usize).min(bytes.len());
        let end = (start + length as usize).min(bytes.len());
        Ok(Some(Box::new(MemoryReader {
            data: bytes[start..end].to_vec(),
            cursor: 0,
        })))
    }

    fn read_descriptor(&self, stream_instance_id: i64) -> Result<Option<StreamDescriptor>> {
        let state = self.state.borrow();
        Ok(state
            .recordings
            .get(&stream_instance_id)
            .map(|(descriptor, _)| descriptor.clone()))
    }

    fn max_stream_instance_id(&self) -> i64 {
        let state = self.state.borrow();
        if state.next_id == 0 {
            NO_STREAM_INSTANCE
        } else {
            state.next_id - 1
        }
    }

    fn close(&self) -> Result<()> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> StreamIdentity {
        StreamIdentity {
            channel: "transport:media".to_string(),
            stream_id: 7,
            session_id: 1,
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let catalog = MemoryCatalog::new();
        assert_eq!(catalog.max_stream_instance_id(), NO_STREAM_INSTANCE);

        let (a, _) = catalog.begin_recording(&identity()).unwrap();
        let (b, _) = catalog.begin_recording(&identity()).unwrap();

        assert_eq!((a, b), (0, 1));
        assert_eq!(catalog.max_stream_instance_id(), 1);
    }

    #[test]
    fn test_record_then_replay_range() {
        let catalog = MemoryCatalog::new();
        let (id, mut writer) = catalog.begin_recording(&identity()).unwrap();
        writer.write(b"hello archived world").unwrap();
        writer.finish().unwrap();

        let mut reader = catalog.open_replay(id, 6, 8).unwrap().unwrap();
        let chunk = reader.read(64).unwrap().unwrap();
        assert_eq!(&chunk, b"archived");
        assert!(reader.read(64).unwrap().is_none());
    }

    #[test]
    fn test_descriptor_lifecycle() {
        let catalog = MemoryCatalog::new();
        let (id, mut writer) = catalog.begin_recording(&identity()).unwrap();

        let open = catalog.read_descriptor(id).unwrap().unwrap();
        assert!(open.stopped_at.is_none());

        writer.write(b"abcd").unwrap();
        writer.finish().unwrap();

        let sealed = catalog.read_descriptor(id).unwrap().unwrap();
        assert!(sealed.stopped_at.is_some());
        assert_eq!(sealed.archived_bytes, 4);
    }

    #[test]
    fn test_unknown_instance() {
        let catalog = MemoryCatalog::new();
        assert!(catalog.read_descriptor(5).unwrap().is_none());
        assert!(catalog.open_replay(5, 0, 10).unwrap().is_none());
    }
}
