//! Fixed-capacity single-producer single-consumer handoff queue.
//!
//! Moves values from interrupt context to task context without locks. The
//! producer side never blocks and never allocates; the consumer side may poll
//! or spin until a value arrives.
//!
//! # Safety Contract
//!
//! - [`HandoffQueue::split()`] hands out exactly one [`Producer`] and one
//!   [`Consumer`]. Neither handle is `Clone` or `Sync`, so each is used from
//!   a single execution context.
//! - The producer is the only writer of the write index (`tail`), the
//!   consumer the only writer of the read index (`head`). Each side publishes
//!   its index with `Release` after touching the slot and reads the other
//!   side's index with `Acquire`.
//! - Only plain atomic loads and stores are used, so the queue also works on
//!   cores without compare-and-swap (Cortex-M0).

use core::cell::{Cell, UnsafeCell};
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A lock-free single-producer single-consumer queue holding up to `N` values.
///
/// Indices run modulo `2N`, which keeps "full" and "empty" distinguishable
/// without sacrificing a slot: all `N` slots are usable.
///
/// # Type Parameters
///
/// - `T`: The element type. Must be `Send` for cross-context use.
/// - `N`: Capacity. Must be at least 1; `N = 0` fails to compile.
pub struct HandoffQueue<T, const N: usize> {
    buffer: [UnsafeCell<MaybeUninit<T>>; N],
    /// Read position (only modified by the consumer).
    head: AtomicUsize,
    /// Write position (only modified by the producer).
    tail: AtomicUsize,
    split: AtomicBool,
}

// SAFETY: T: Send is required because values cross interrupt/task boundaries.
// The SPSC contract (one Producer, one Consumer, enforced by `split`) ensures
// head and tail are only modified by their respective sides, and the
// Acquire/Release pairs make slot writes visible before the index moves.
unsafe impl<T: Send, const N: usize> Sync for HandoffQueue<T, N> {}
unsafe impl<T: Send, const N: usize> Send for HandoffQueue<T, N> {}

impl<T, const N: usize> HandoffQueue<T, N> {
    const NONZERO: () = assert!(N > 0, "handoff queue capacity must be at least 1");

    /// Create a new empty queue.
    ///
    /// Usable in `static` initializers.
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONZERO;

        HandoffQueue {
            // SAFETY: An array of uninitialized MaybeUninit<T> is always valid.
            // UnsafeCell is a transparent wrapper that doesn't affect validity.
            buffer: unsafe {
                MaybeUninit::<[UnsafeCell<MaybeUninit<T>>; N]>::uninit().assume_init()
            },
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            split: AtomicBool::new(false),
        }
    }

    /// Number of values the queue can hold.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Split the queue into its producer and consumer handles.
    ///
    /// # Panics
    ///
    /// If the queue was already split. Two producers or two consumers would
    /// break the index ownership everything else relies on.
    pub fn split(&self) -> (Producer<'_, T, N>, Consumer<'_, T, N>) {
        self.try_split().expect("handoff queue already split")
    }

    /// Split the queue, or `None` if the handles were already taken.
    pub fn try_split(&self) -> Option<(Producer<'_, T, N>, Consumer<'_, T, N>)> {
        // Load/store inside a critical section: no CAS needed on thumbv6m.
        let claimed = critical_section::with(|_| {
            if self.split.load(Ordering::Relaxed) {
                false
            } else {
                self.split.store(true, Ordering::Relaxed);
                true
            }
        });
        if !claimed {
            return None;
        }
        Some((
            Producer {
                queue: self,
                _not_sync: PhantomData,
            },
            Consumer {
                queue: self,
                _not_sync: PhantomData,
            },
        ))
    }

    /// Store `val` unless the queue is full.
    ///
    /// # Safety
    ///
    /// The caller must be the queue's only producer for as long as the
    /// queue's consumer handle exists.
    unsafe fn enqueue(&self, val: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if Self::distance(head, tail) == N {
            return Err(val);
        }

        // SAFETY: We are the sole producer and `tail` is only advanced by us.
        // Fewer than N values are stored, so this slot is not owned by the consumer.
        unsafe {
            (*self.buffer[Self::slot(tail)].get()).write(val);
        }

        // Release ordering ensures the slot write is visible before tail advances.
        self.tail.store(Self::advance(tail), Ordering::Release);
        Ok(())
    }

    /// # Safety
    ///
    /// The caller must be the queue's only consumer.
    unsafe fn dequeue(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);

        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: We are the sole consumer and `head` is only advanced by us.
        // `head != tail` guarantees this slot holds a published value.
        let val = unsafe { (*self.buffer[Self::slot(head)].get()).assume_init_read() };

        // Release ordering ensures the read completes before head advances,
        // freeing the slot for the producer.
        self.head.store(Self::advance(head), Ordering::Release);
        Some(val)
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        Self::distance(head, tail)
    }

    fn distance(head: usize, tail: usize) -> usize {
        if tail >= head {
            tail - head
        } else {
            tail + 2 * N - head
        }
    }

    fn slot(index: usize) -> usize {
        if index >= N {
            index - N
        } else {
            index
        }
    }

    fn advance(index: usize) -> usize {
        if index + 1 == 2 * N {
            0
        } else {
            index + 1
        }
    }
}

impl<T, const N: usize> Default for HandoffQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for HandoffQueue<T, N> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no handle is alive.
        while unsafe { self.dequeue() }.is_some() {}
    }
}

/// Producer half of a [`HandoffQueue`]. Owned by the interrupt handler.
pub struct Producer<'a, T, const N: usize> {
    queue: &'a HandoffQueue<T, N>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T, const N: usize> Producer<'_, T, N> {
    /// Push a value, or return it as `Err(val)` if the queue is full.
    ///
    /// Returns in bounded time regardless of queue state. The caller decides
    /// what to do with a rejected value; the queue never overwrites.
    pub fn try_push(&self, val: T) -> Result<(), T> {
        // SAFETY: this handle is the only producer (see `split`).
        unsafe { self.queue.enqueue(val) }
    }

    /// Whether the next push would be rejected.
    pub fn is_full(&self) -> bool {
        self.queue.len() == N
    }

    /// Number of values the queue can hold.
    pub const fn capacity(&self) -> usize {
        N
    }
}

/// Consumer half of a [`HandoffQueue`]. Owned by the application task.
pub struct Consumer<'a, T, const N: usize> {
    queue: &'a HandoffQueue<T, N>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T, const N: usize> Consumer<'_, T, N> {
    /// Pop the oldest value, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        // SAFETY: this handle is the only consumer (see `split`).
        unsafe { self.queue.dequeue() }
    }

    /// Wait for the next value, spinning between polls.
    ///
    /// Must only be called from task context: an interrupt handler that
    /// waits here would never let its producer run.
    pub fn pop(&self) -> T {
        self.pop_with(core::hint::spin_loop)
    }

    /// Wait for the next value, calling `idle` between polls.
    ///
    /// Pass `cortex_m::asm::wfi` to sleep until the producer's interrupt
    /// fires instead of burning cycles.
    pub fn pop_with(&self, mut idle: impl FnMut()) -> T {
        loop {
            if let Some(val) = self.try_pop() {
                return val;
            }
            idle();
        }
    }

    /// Number of values waiting. Advisory: the producer may add more at any time.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no values are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of values the queue can hold.
    pub const fn capacity(&self) -> usize {
        N
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[test]
    fn every_slot_is_usable() {
        let q: HandoffQueue<u16, 3> = HandoffQueue::new();
        let (tx, rx) = q.split();
        assert_eq!(tx.capacity(), 3);
        assert!(rx.is_empty());

        for v in [10, 20, 30] {
            assert!(!tx.is_full());
            tx.try_push(v).unwrap();
        }
        // No slot is held back to tell full from empty.
        assert!(tx.is_full());
        assert_eq!(rx.len(), rx.capacity());
        assert_eq!(tx.try_push(40), Err(40));

        let drained: Vec<u16> = core::iter::from_fn(|| rx.try_pop()).collect();
        assert_eq!(drained, [10, 20, 30]);
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn full_queue_accepts_after_one_pop() {
        let q: HandoffQueue<u8, 4> = HandoffQueue::new();
        let (tx, rx) = q.split();
        for i in 0..4 {
            tx.try_push(i).unwrap();
        }
        assert_eq!(tx.try_push(99), Err(99));

        assert_eq!(rx.try_pop(), Some(0));
        tx.try_push(4).unwrap();

        let drained: Vec<u8> = core::iter::from_fn(|| rx.try_pop()).collect();
        assert_eq!(drained, [1, 2, 3, 4]);
    }

    #[test]
    fn single_slot_mailbox_refuses_overwrite() {
        let q: HandoffQueue<i32, 1> = HandoffQueue::new();
        let (tx, rx) = q.split();
        tx.try_push(42).unwrap();
        assert!(tx.is_full());
        assert_eq!(tx.try_push(99), Err(99));
        assert_eq!(rx.try_pop(), Some(42));
        assert!(rx.is_empty());
        tx.try_push(7).unwrap();
        assert_eq!(rx.try_pop(), Some(7));
    }

    #[test]
    fn index_helpers_run_modulo_twice_capacity() {
        type Q = HandoffQueue<u8, 3>;
        assert_eq!(Q::advance(2), 3);
        assert_eq!(Q::advance(5), 0);
        assert_eq!(Q::slot(1), 1);
        assert_eq!(Q::slot(4), 1);
        // Same slot one lap apart is full, not empty.
        assert_eq!(Q::distance(1, 4), 3);
        assert_eq!(Q::distance(4, 1), 3);
        assert_eq!(Q::distance(5, 5), 0);
        assert_eq!(Q::distance(5, 0), 1);
    }

    #[test]
    fn indices_stay_below_twice_capacity_while_wrapping() {
        let q: HandoffQueue<u32, 2> = HandoffQueue::new();
        let (tx, rx) = q.split();

        // Uneven bursts so head and tail cross the 2N boundary at
        // different points.
        let mut next = 0u32;
        let mut expected = 0u32;
        for round in 0..20usize {
            let burst = 1 + round % 2;
            for _ in 0..burst {
                tx.try_push(next).unwrap();
                next += 1;
            }
            assert_eq!(rx.len(), burst);
            assert!(q.head.load(Ordering::Relaxed) < 4);
            assert!(q.tail.load(Ordering::Relaxed) < 4);
            while let Some(v) = rx.try_pop() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        assert_eq!(expected, next);
    }

    #[test]
    fn split_is_per_queue() {
        let a: HandoffQueue<u8, 1> = HandoffQueue::new();
        let b: HandoffQueue<u8, 1> = HandoffQueue::new();
        let (tx_a, rx_a) = a.split();
        let (tx_b, rx_b) = b.split();

        tx_a.try_push(1).unwrap();
        assert!(rx_b.is_empty());
        tx_b.try_push(2).unwrap();
        assert_eq!(rx_a.try_pop(), Some(1));
        assert_eq!(rx_b.try_pop(), Some(2));
        assert!(a.try_split().is_none());
        assert!(b.try_split().is_none());
    }

    #[test]
    #[should_panic(expected = "already split")]
    fn second_split_panics() {
        let q: HandoffQueue<u8, 2> = HandoffQueue::new();
        let _first = q.split();
        let _second = q.split();
    }

    #[test]
    fn try_split_reports_taken_handles() {
        let q: HandoffQueue<u8, 2> = HandoffQueue::new();
        assert!(q.try_split().is_some());
        assert!(q.try_split().is_none());
    }

    #[test]
    fn static_queue() {
        static EVENTS: HandoffQueue<u16, 3> = HandoffQueue::new();
        let (tx, rx) = EVENTS.split();
        tx.try_push(12).unwrap();
        assert_eq!(rx.pop(), 12);
        assert_eq!(rx.capacity(), 3);
    }

    #[test]
    fn blocking_pop_waits_for_producer_thread() {
        let q: HandoffQueue<u32, 4> = HandoffQueue::new();
        let (tx, rx) = q.split();

        std::thread::scope(|s| {
            s.spawn(move || {
                for i in 0..1_000u32 {
                    let mut val = i;
                    // Retry on full; a real ISR would drop instead.
                    while let Err(back) = tx.try_push(val) {
                        val = back;
                        std::thread::yield_now();
                    }
                }
            });

            for expected in 0..1_000u32 {
                assert_eq!(rx.pop_with(std::thread::yield_now), expected);
            }
        });
        assert!(rx.is_empty());
    }

    #[test]
    fn dropping_queue_releases_values_across_the_wrap() {
        static LIVE: AtomicUsize = AtomicUsize::new(0);

        struct Tracked;
        impl Tracked {
            fn new() -> Self {
                LIVE.fetch_add(1, Ordering::Relaxed);
                Tracked
            }
        }
        impl Drop for Tracked {
            fn drop(&mut self) {
                LIVE.fetch_sub(1, Ordering::Relaxed);
            }
        }

        {
            let q: HandoffQueue<Tracked, 3> = HandoffQueue::new();
            let (tx, rx) = q.split();
            for _ in 0..3 {
                assert!(tx.try_push(Tracked::new()).is_ok());
            }
            drop(rx.try_pop());
            drop(rx.try_pop());
            // The stored values now straddle the end of the buffer.
            assert!(tx.try_push(Tracked::new()).is_ok());
            assert!(tx.try_push(Tracked::new()).is_ok());
            assert_eq!(LIVE.load(Ordering::Relaxed), 3);

            // A rejected value goes back to the caller.
            let rejected = tx.try_push(Tracked::new());
            assert!(rejected.is_err());
            drop(rejected);
            assert_eq!(LIVE.load(Ordering::Relaxed), 3);
        }
        assert_eq!(LIVE.load(Ordering::Relaxed), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u32),
        Pop,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u32>().prop_map(Op::Push), Just(Op::Pop)]
    }

    proptest! {
        #[test]
        fn matches_bounded_fifo_model(ops in proptest::collection::vec(op(), 0..200)) {
            let q: HandoffQueue<u32, 5> = HandoffQueue::new();
            let (tx, rx) = q.split();
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    Op::Push(v) => {
                        let accepted = tx.try_push(v).is_ok();
                        prop_assert_eq!(accepted, model.len() < 5);
                        if accepted {
                            model.push_back(v);
                        }
                    }
                    Op::Pop => prop_assert_eq!(rx.try_pop(), model.pop_front()),
                }
                prop_assert_eq!(rx.len(), model.len());
            }
        }
    }
}
