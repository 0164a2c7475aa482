use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::time::Instant;
use crate::Closeable;

/// One pooled value plus its bookkeeping; the unit of hand-out.
///
/// A cell is in exactly one of three states: idle (queued in its slot), in
/// use (moved into a [`Handle`]), or gone (its value has been closed and the
/// cell dropped). Exclusive use is enforced by ownership: whoever holds the
/// cell is the only one who can touch the value.
pub(crate) struct Cell<V> {
    pub(crate) value: V,
    pub(crate) last_used: Instant,
    /// The idle queue this cell returns itself to. Rebinding this pointer is
    /// how reconfiguration moves a cell into the new regime.
    pub(crate) slot: Arc<ReturnSlot<V>>,
}

impl<V> Cell<V> {
    pub(crate) fn new(value: V, slot: Arc<ReturnSlot<V>>) -> Self {
        Self {
            value,
            last_used: Instant::now(),
            slot,
        }
    }
}

/// The idle queue of one pool entry.
///
/// A FIFO of idle cells paired with a semaphore carrying one permit per
/// queued cell, so acquisitions can wait on "an idle cell is available"
/// alongside other alternatives. Cells are pushed before the permit is added;
/// a receiver that won a permit always finds a cell.
pub(crate) struct ReturnSlot<V> {
    idle: Mutex<IdleQueue<V>>,
    pub(crate) signal: Semaphore,
}

struct IdleQueue<V> {
    cells: VecDeque<Cell<V>>,
    closed: bool,
}

impl<V> ReturnSlot<V> {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(IdleQueue {
                cells: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            signal: Semaphore::new(0),
        })
    }

    /// Queues a cell, then signals its availability.
    ///
    /// Fails once the slot has been closed, handing the cell back so the
    /// caller can close its value. The closed check happens under the same
    /// lock that [`close`](Self::close) drains under, so a returning cell is
    /// either drained by shutdown or rejected here, never stranded.
    pub(crate) fn push(&self, cell: Cell<V>) -> Result<(), Cell<V>> {
        let mut idle = self.idle.lock();
        if idle.closed {
            return Err(cell);
        }
        idle.cells.push_back(cell);
        drop(idle);
        self.signal.add_permits(1);
        Ok(())
    }

    /// Removes the oldest idle cell. The caller must have consumed one
    /// permit from [`signal`](Self::signal) first.
    pub(crate) fn pop(&self) -> Option<Cell<V>> {
        self.idle.lock().cells.pop_front()
    }

    /// Removes the oldest idle cell if one is queued right now.
    pub(crate) fn try_take(&self) -> Option<Cell<V>> {
        let permit = self.signal.try_acquire().ok()?;
        permit.forget();
        let cell = self.pop();
        debug_assert!(cell.is_some(), "idle queue lost a signalled cell");
        cell
    }

    /// Waits for the next cell to pass through this slot.
    ///
    /// Returns `None` once the slot is closed and drained.
    pub(crate) async fn recv(&self) -> Option<Cell<V>> {
        let permit = self.signal.acquire().await.ok()?;
        permit.forget();
        self.pop()
    }

    /// Closes the slot and drains whatever is queued.
    ///
    /// Later pushes are rejected and waiting receivers are woken.
    pub(crate) fn close(&self) -> Vec<Cell<V>> {
        let mut idle = self.idle.lock();
        idle.closed = true;
        let cells = idle.cells.drain(..).collect();
        drop(idle);
        self.signal.close();
        cells
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.idle.lock().cells.len()
    }
}

/// An exclusively held pooled value.
///
/// Dereferences to the value. Dropping the handle returns the value to its
/// pool; if the pool has been shut down in the meantime, the value is closed
/// in a background task instead.
pub struct Handle<V: Closeable> {
    cell: Option<Cell<V>>,
}

impl<V: Closeable> Handle<V> {
    /// Marks the cell as used and wraps it for hand-out.
    pub(crate) fn acquire(mut cell: Cell<V>) -> Self {
        cell.last_used = Instant::now();
        Self { cell: Some(cell) }
    }

    fn cell(&self) -> &Cell<V> {
        self.cell
            .as_ref()
            .expect("pool handle accessed after drop")
    }
}

impl<V: Closeable> Deref for Handle<V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.cell().value
    }
}

impl<V: Closeable> DerefMut for Handle<V> {
    fn deref_mut(&mut self) -> &mut V {
        &mut self
            .cell
            .as_mut()
            .expect("pool handle accessed after drop")
            .value
    }
}

impl<V: Closeable> fmt::Debug for Handle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

impl<V: Closeable> Drop for Handle<V> {
    fn drop(&mut self) {
        let Some(cell) = self.cell.take() else {
            return;
        };
        let slot = Arc::clone(&cell.slot);
        if let Err(cell) = slot.push(cell) {
            let value = cell.value;
            tokio::spawn(async move {
                if let Err(error) = value.close().await {
                    tracing::debug!("failed to close pooled value after shutdown: {error:#}");
                }
            });
        }
    }
}
