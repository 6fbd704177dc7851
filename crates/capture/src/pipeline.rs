use handoff::{HandoffError, Semaphore, SpscRing};

/// Read lease on a mapped DMA frame buffer.
///
/// The pointee is owned by the camera backend for the program's lifetime and
/// identified by its cookie-indexed slot. Between `claim` and the next time
/// the same buffer's request is filled, the consumer may read it; the
/// backpressure gate in the camera handler keeps the hardware from
/// overwriting a leased buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    ptr: *const u8,
    len: usize,
}

impl FrameSlot {
    pub fn new(ptr: *const u8, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    ///
    /// The caller must hold the read lease described on the type: the slot
    /// was claimed from the pipeline and the buffer's request has not been
    /// resubmitted and refilled since.
    pub unsafe fn bytes<'a>(&self) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

// SAFETY: the slot is a token for backend-owned memory that stays mapped for
// the program's lifetime; carrying it to the consumer thread is the
// pipeline's purpose.
unsafe impl Send for FrameSlot {}
unsafe impl Sync for FrameSlot {}

/// Zero-copy frame conduit between the camera completion thread and the
/// encoder thread: a lock-free ring of buffer leases plus the counting
/// semaphore the consumer sleeps on.
pub struct FramePipeline {
    queue: SpscRing<FrameSlot>,
    counter: Semaphore,
    capacity: usize,
}

impl FramePipeline {
    pub fn new(capacity: usize) -> Result<Self, HandoffError> {
        Ok(Self {
            queue: SpscRing::with_capacity(capacity),
            counter: Semaphore::new(0)?,
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Completion side: publish a filled buffer, then wake the consumer.
    /// Called from the vendor's completion thread.
    pub fn deliver(&self, slot: FrameSlot) -> Result<(), HandoffError> {
        self.queue
            .push(slot)
            .map_err(|_| HandoffError::QueueFull)?;
        self.counter.post()
    }

    /// Consumer side: sleep until a frame or an external wake arrives.
    pub fn wait(&self) -> Result<(), HandoffError> {
        self.counter.wait()
    }

    /// Consumer side: take the next frame, or `None` after a frameless wake.
    pub fn claim(&self) -> Option<FrameSlot> {
        self.queue.pop()
    }

    /// Post the counter without enqueuing a frame, unblocking the consumer
    /// so it can re-check its running flag. Async-signal-safe.
    pub fn wake(&self) {
        let _ = self.counter.post();
    }

    /// Racy-tolerant count of enqueued frames. May lag the true queue depth
    /// by one (between the consumer's `wait` and its `claim`); the
    /// backpressure margin absorbs that. Fails closed on error.
    pub fn queued_hint(&self) -> i32 {
        self.counter.value().unwrap_or(i32::MAX)
    }
}
