//! Bounded single-producer / single-consumer ring buffer.
//!
//! ```text
//!   head (consumer)          tail (producer)
//!        │                        │
//!   ┌────▼───┬────────┬────────┬──▼─────┬────────┐
//!   │ item 0 │ item 1 │ item 2 │ (free) │ (free) │   capacity + 1 slots
//!   └────────┴────────┴────────┴────────┴────────┘
//! ```
//!
//! One slot always stays empty so that `head == tail` means empty and
//! `tail + 1 == head` means full. The producer publishes a slot with a
//! release store of `tail`; the consumer frees it with a release store of
//! `head`. Each side reads the other's index with an acquire load.
//!
//! The two halves are separate owned handles, and both `push` and `pop`
//! take `&mut self`, so there can only ever be one producer and one consumer.
//! A push on a full buffer drops the item and bumps a counter.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Next slot to read. Written only by the consumer.
    head: AtomicUsize,
    /// Next slot to write. Written only by the producer.
    tail: AtomicUsize,
    /// Items rejected because the buffer was full.
    dropped: AtomicU64,
}

// Slots are handed between exactly one producer and one consumer; the
// index protocol above keeps their accesses disjoint.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (tail + self.slots.len() - head) % self.slots.len()
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    fn is_full(&self) -> bool {
        let tail = self.tail.load(Ordering::Acquire);
        self.advance(tail) == self.head.load(Ordering::Acquire)
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        while head != tail {
            // Every slot in [head, tail) holds an initialized item.
            unsafe { self.slots[head].get_mut().assume_init_drop() };
            head = (head + 1) % self.slots.len();
        }
    }
}

/// Create a ring buffer holding at most `capacity` items.
///
/// # Panics
///
/// Panics if `capacity` is `usize::MAX`.
///
/// # Example
///
/// ```
/// use sd_rpc_host::pipeline::ring_buffer;
///
/// let (mut producer, mut consumer) = ring_buffer::<u32>(2);
/// assert!(producer.push(1));
/// assert!(producer.push(2));
/// assert!(!producer.push(3)); // full, dropped
///
/// assert_eq!(consumer.pop(), Some(1));
/// assert_eq!(consumer.pop(), Some(2));
/// assert_eq!(consumer.pop(), None);
/// ```
pub fn ring_buffer<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    // One slot stays empty to tell a full buffer from an empty one.
    let Some(slot_count) = capacity.checked_add(1) else {
        panic!("ring buffer capacity {} is too large", capacity);
    };
    let slots = (0..slot_count)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(Shared {
        slots,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        dropped: AtomicU64::new(0),
    });

    (
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    )
}

/// Writing half of a ring buffer.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Producer<T> {
    /// Append `item`. Returns `false` and drops the item if the buffer is full.
    pub fn push(&mut self, item: T) -> bool {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        let next = shared.advance(tail);

        if next == shared.head.load(Ordering::Acquire) {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // The consumer never touches the slot at `tail` until it observes
        // the store below.
        unsafe { (*shared.slots[tail].get()).write(item) };
        shared.tail.store(next, Ordering::Release);
        true
    }

    /// Snapshot; may be stale by the time it is read.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Number of items rejected so far.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Reading half of a ring buffer.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Consumer<T> {
    /// Remove the oldest item, or `None` if the buffer is empty.
    pub fn pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);

        if head == shared.tail.load(Ordering::Acquire) {
            return None;
        }

        // The acquire load of `tail` makes the producer's write visible.
        let item = unsafe { (*shared.slots[head].get()).assume_init_read() };
        shared.head.store(shared.advance(head), Ordering::Release);
        Some(item)
    }

    /// Pop every currently visible item into `batch`, oldest first.
    ///
    /// Returns the number of items moved.
    pub fn drain_into(&mut self, batch: &mut Vec<T>) -> usize {
        let before = batch.len();
        while let Some(item) = self.pop() {
            batch.push(item);
        }
        batch.len() - before
    }

    /// Snapshot; may be stale by the time it is read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Number of items the producer has rejected so far.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
