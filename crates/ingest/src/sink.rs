use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use handoff::NamedSemaphore;

use crate::error::IngestError;

/// Receives decoded frames paired with their wire timestamps.
pub trait FrameSink: Send {
    fn publish(&mut self, timestamp_ns: u64, frame: &[u8]) -> Result<(), IngestError>;
}

/// Shared-memory frameset record header.
///
/// Writer protocol: store the timestamp and payload first, then publish the
/// sequence with `Ordering::Release`. Readers load the sequence with
/// Acquire; a changed value guarantees the record is fully visible.
/// Sequence 0 means "no frame written yet".
#[repr(C, align(8))]
struct FramesetHeader {
    sequence: AtomicU64,
    timestamp_ns: AtomicU64,
}

impl FramesetHeader {
    const SIZE: usize = size_of::<Self>();
}

/// Publishes `{timestamp, frame}` records into shared memory for dataset
/// consumers, posting a named consumer-ready semaphore per record.
pub struct FramesetWriter {
    mmap: MmapMut,
    sequence: u64,
    consumer_ready: NamedSemaphore,
}

impl FramesetWriter {
    pub fn create(
        shm_path: impl AsRef<Path>,
        frame_bytes: usize,
        sem_name: &str,
    ) -> Result<Self, IngestError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(shm_path)?;

        let size = FramesetHeader::SIZE + frame_bytes;
        if file.metadata()?.len() < size as u64 {
            file.set_len(size as u64)?;
        }

        // SAFETY: the mapping is private to this process tree; consumers
        // re-map the same file and synchronize on the sequence field.
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        let header = unsafe { &*(mmap.as_ptr() as *const FramesetHeader) };
        header.sequence.store(0, Ordering::Release);

        let consumer_ready = NamedSemaphore::ensure(sem_name, 0)
            .map_err(|err| IngestError::Sink(err.to_string()))?;

        Ok(Self {
            mmap,
            sequence: 0,
            consumer_ready,
        })
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl FrameSink for FramesetWriter {
    fn publish(&mut self, timestamp_ns: u64, frame: &[u8]) -> Result<(), IngestError> {
        let available = self.mmap.len() - FramesetHeader::SIZE;
        if frame.len() > available {
            return Err(IngestError::Sink(format!(
                "Frame of {} bytes exceeds the {} byte frameset slot",
                frame.len(),
                available
            )));
        }

        self.mmap[FramesetHeader::SIZE..FramesetHeader::SIZE + frame.len()]
            .copy_from_slice(frame);

        self.sequence += 1;
        let header = unsafe { &*(self.mmap.as_ptr() as *const FramesetHeader) };
        header.timestamp_ns.store(timestamp_ns, Ordering::Relaxed);
        header.sequence.store(self.sequence, Ordering::Release);

        self.consumer_ready
            .post()
            .map_err(|err| IngestError::Sink(err.to_string()))?;
        Ok(())
    }
}
