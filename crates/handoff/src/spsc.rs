use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded single-producer/single-consumer ring.
///
/// SAFETY & MEMORY ORDERING:
///
/// `push` publishes the slot contents before storing the tail with
/// `Ordering::Release`; `pop` loads the tail with `Ordering::Acquire` before
/// reading the slot. The pair guarantees the consumer observes fully written
/// values, including the DMA buffer bytes a published pointer refers to.
///
/// The caller upholds the SPSC contract: `push` from exactly one producer
/// context and `pop` from exactly one consumer context at a time. A signal
/// handler counts as the consumer context because handlers of one signal do
/// not nest, and it may safely interrupt the producer mid-`push`.
pub struct SpscRing<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: values cross from the producer to the consumer thread exactly
// once, synchronized by the Release/Acquire pair on `tail`.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Producer side. Wait-free; hands the value back when the ring is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) == self.slots.len() {
            return Err(value);
        }

        let slot = &self.slots[tail % self.slots.len()];
        // SAFETY: the slot at `tail` is unreachable by the consumer until the
        // tail store below, and the producer is single-threaded.
        unsafe { (*slot.get()).write(value) };

        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer side. Returns `None` when momentarily empty, which also
    /// covers the externally-posted wake used for shutdown.
    pub fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let slot = &self.slots[head % self.slots.len()];
        // SAFETY: the Acquire load of `tail` proves the producer finished
        // writing this slot; the head store below releases it for reuse.
        let value = unsafe { (*slot.get()).assume_init_read() };

        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Approximate occupancy; exact only when both sides are quiescent.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
