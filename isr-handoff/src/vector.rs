//! Interrupt routing from vector numbers to registered handlers.
//!
//! A [`HandlerTable`] maps an [`IrqId`] to a handler capability and the
//! [`Entry`] it should run. The table is built once during initialization
//! and never changes afterwards; the platform's vector stubs only call
//! [`HandlerTable::dispatch`] (or [`VectorSlot::dispatch`]).
//!
//! ```ignore
//! static VECTORS: VectorSlot<4> = VectorSlot::new();
//!
//! // init, after the stream is in its StaticCell:
//! let table = TABLE.init(
//!     HandlerTable::new()
//!         .register(IrqId::new(11), Entry::TransferComplete, stream)
//!         .register(IrqId::new(18), Entry::TransferError, stream),
//! );
//! VECTORS.install(table);
//!
//! #[interrupt]
//! fn DMA1_CHANNEL1() {
//!     VECTORS.dispatch(IrqId::new(11));
//! }
//! ```

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Interrupt number as seen by the NVIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqId(u16);

impl IrqId {
    /// Wrap a raw interrupt number.
    pub const fn new(irq: u16) -> Self {
        IrqId(irq)
    }

    /// The raw interrupt number.
    pub const fn get(self) -> u16 {
        self.0
    }
}

/// Which entry point of a handler an interrupt is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Entry {
    /// Transfer engine finished a transfer.
    TransferComplete,
    /// Transfer engine reported an error.
    TransferError,
    /// Any other event source (EXTI line, timer update, ...).
    External,
}

/// A capability that can be run from interrupt context.
pub trait InterruptHandler: Sync {
    /// Service one interrupt routed to `entry`. Must not block.
    fn on_interrupt(&self, entry: Entry);
}

#[derive(Clone, Copy)]
struct Registration {
    irq: IrqId,
    entry: Entry,
    handler: &'static dyn InterruptHandler,
}

/// Fixed-size interrupt routing table with room for `N` registrations.
pub struct HandlerTable<const N: usize> {
    slots: [Option<Registration>; N],
    len: usize,
}

impl<const N: usize> HandlerTable<N> {
    /// Create an empty table.
    pub const fn new() -> Self {
        HandlerTable {
            slots: [None; N],
            len: 0,
        }
    }

    /// Route `irq` to `entry` of `handler`.
    ///
    /// # Panics
    ///
    /// If `irq` is already registered or the table is full. In a `static`
    /// initializer both are compile errors.
    pub const fn register(
        mut self,
        irq: IrqId,
        entry: Entry,
        handler: &'static dyn InterruptHandler,
    ) -> Self {
        let mut i = 0;
        while i < self.len {
            if let Some(existing) = &self.slots[i] {
                if existing.irq.0 == irq.0 {
                    panic!("interrupt already registered");
                }
            }
            i += 1;
        }
        if self.len == N {
            panic!("interrupt handler table is full");
        }
        self.slots[self.len] = Some(Registration {
            irq,
            entry,
            handler,
        });
        self.len += 1;
        self
    }

    /// Run the handler registered for `irq`. Returns `false` if there is none.
    pub fn dispatch(&self, irq: IrqId) -> bool {
        match self.slots[..self.len]
            .iter()
            .flatten()
            .find(|reg| reg.irq == irq)
        {
            Some(reg) => {
                reg.handler.on_interrupt(reg.entry);
                true
            }
            None => false,
        }
    }

    /// Whether `irq` has a handler.
    pub fn contains(&self, irq: IrqId) -> bool {
        self.slots[..self.len].iter().flatten().any(|reg| reg.irq == irq)
    }

    /// Number of registrations.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is registered.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for HandlerTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide home for a [`HandlerTable`] built at run time.
///
/// Installed once; dispatching before installation is a no-op.
pub struct VectorSlot<const N: usize> {
    table: AtomicPtr<HandlerTable<N>>,
}

impl<const N: usize> VectorSlot<N> {
    /// Create an empty slot.
    pub const fn new() -> Self {
        VectorSlot {
            table: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Publish `table` to the vector stubs.
    ///
    /// # Panics
    ///
    /// If a table was already installed.
    pub fn install(&self, table: &'static HandlerTable<N>) {
        let fresh = critical_section::with(|_| {
            if !self.table.load(Ordering::Relaxed).is_null() {
                return false;
            }
            self.table
                .store(table as *const HandlerTable<N> as *mut _, Ordering::Release);
            true
        });
        if !fresh {
            panic!("interrupt handler table already installed");
        }
    }

    /// The installed table, if any.
    pub fn table(&self) -> Option<&'static HandlerTable<N>> {
        // SAFETY: only ever set from a `&'static HandlerTable<N>`, never mutated.
        unsafe { self.table.load(Ordering::Acquire).as_ref() }
    }

    /// Run the handler registered for `irq` in the installed table.
    pub fn dispatch(&self, irq: IrqId) -> bool {
        self.table().is_some_and(|table| table.dispatch(irq))
    }
}

impl<const N: usize> Default for VectorSlot<N> {
    fn default() -> Self {
        Self::new()
    }
}
