use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::cell::{Cell, Handle, ReturnSlot};
use crate::{Closeable, Factory, PoolError};

/// The per-key sub-pool owning up to `max_capacity` cells.
///
/// Capacity accounting is split between two places: the idle queue holds
/// cells that exist but are unused, and the `capacity` semaphore holds one
/// permit per value that may still be created. At any quiescent moment
/// `idle + in_use + free_slots == max_capacity`.
pub(crate) struct Entry<V> {
    shared: RwLock<EntryShared<V>>,
}

/// The reconfigurable innards of an entry, swapped wholesale by
/// [`Entry::reconfigure`].
pub(crate) struct EntryShared<V> {
    pub(crate) slot: Arc<ReturnSlot<V>>,
    pub(crate) capacity: Arc<Semaphore>,
    pub(crate) max_capacity: usize,
    pub(crate) factory: Factory<V>,
}

impl<V> EntryShared<V> {
    /// Free creation slots right now. Only meaningful while the entry lock
    /// is held, so no concurrent acquisition can interleave.
    pub(crate) fn available_capacity(&self) -> usize {
        self.capacity.available_permits()
    }
}

impl<V: Closeable> EntryShared<V> {
    async fn create_cell(&self) -> Result<Cell<V>, PoolError> {
        let value = (self.factory)().await.map_err(PoolError::Factory)?;
        Ok(Cell::new(value, Arc::clone(&self.slot)))
    }
}

impl<V: Closeable> Entry<V> {
    /// Creates an entry with one creation slot already reserved for the
    /// initial value, which the caller constructs via
    /// [`create_first`](Self::create_first).
    pub(crate) fn with_reserved_slot(factory: Factory<V>, max_capacity: usize) -> Self {
        debug_assert!(max_capacity > 0);
        Self {
            shared: RwLock::new(EntryShared {
                slot: ReturnSlot::new(max_capacity),
                capacity: Arc::new(Semaphore::new(max_capacity - 1)),
                max_capacity,
                factory,
            }),
        }
    }

    /// Constructs the initial value against the reserved creation slot.
    ///
    /// On failure the reserved slot is handed back, leaving the entry empty
    /// but at full capacity so later acquisitions can retry.
    pub(crate) async fn create_first(&self) -> Result<Handle<V>, PoolError> {
        let shared = self.shared.read().await;
        match shared.create_cell().await {
            Ok(cell) => Ok(Handle::acquire(cell)),
            Err(err) => {
                shared.capacity.add_permits(1);
                Err(err)
            }
        }
    }

    /// Acquires one value, waiting on whichever happens first: the caller's
    /// cancellation, an idle cell becoming available, or a free creation
    /// slot.
    ///
    /// The race between the idle and creation alternatives is deliberately
    /// unresolved; when both are ready, either may win.
    pub(crate) async fn get_value(&self, ctx: &CancellationToken) -> Result<Handle<V>, PoolError> {
        let shared = self.shared.read().await;
        tokio::select! {
            _ = ctx.cancelled() => Err(PoolError::Cancelled),
            permit = shared.slot.signal.acquire() => {
                let permit = permit.map_err(|_| PoolError::ShutDown)?;
                permit.forget();
                let cell = shared
                    .slot
                    .pop()
                    .expect("idle queue lost a signalled cell");
                Ok(Handle::acquire(cell))
            }
            permit = shared.capacity.acquire() => {
                let permit = permit.map_err(|_| PoolError::ShutDown)?;
                permit.forget();
                match shared.create_cell().await {
                    Ok(cell) => Ok(Handle::acquire(cell)),
                    Err(err) => {
                        shared.capacity.add_permits(1);
                        Err(err)
                    }
                }
            }
        }
    }

    /// Closes idle values that have outlived `idle_timeout` and returns their
    /// creation slots.
    ///
    /// Returns true iff the entry is fully idle at full capacity afterwards,
    /// i.e. it owns no values at all and can be removed.
    pub(crate) async fn cleanup_values(&self, idle_timeout: Duration) -> bool {
        let shared = self.shared.write().await;

        let mut kept = Vec::new();
        while let Some(cell) = shared.slot.try_take() {
            if cell.last_used.elapsed() >= idle_timeout {
                tracing::trace!("closing pooled value idle past its timeout");
                close_value(cell.value).await;
                shared.capacity.add_permits(1);
            } else {
                kept.push(cell);
            }
        }
        for cell in kept {
            if let Err(cell) = shared.slot.push(cell) {
                close_value(cell.value).await;
            }
        }

        shared.available_capacity() == shared.max_capacity
    }

    /// Hot-swaps the factory and capacity without disturbing values that are
    /// currently in use.
    ///
    /// The old idle queue is detached and every cell of the old regime passes
    /// through it exactly once — idle cells immediately, in-use cells as
    /// their holders release them. Each is rebuilt on the new factory and
    /// moved into the new regime, or closed once the new capacity is full.
    /// This call therefore waits until all old holders have released.
    pub(crate) async fn reconfigure(
        &self,
        factory: Factory<V>,
        max_capacity: usize,
    ) -> Result<(), PoolError> {
        let new_slot = ReturnSlot::new(max_capacity);
        let new_capacity = Arc::new(Semaphore::new(0));

        let (old_slot, outstanding, mut granted) = {
            let mut shared = self.shared.write().await;

            // With the entry lock held nothing is mid-acquisition, so the
            // semaphore level is an exact count of cells that exist.
            let outstanding = shared.max_capacity - shared.available_capacity();
            let old_slot = std::mem::replace(&mut shared.slot, Arc::clone(&new_slot));

            shared.capacity = Arc::clone(&new_capacity);
            shared.max_capacity = max_capacity;
            shared.factory = Arc::clone(&factory);

            // Free slots left over after the cap change.
            let prefilled = max_capacity.saturating_sub(outstanding);
            new_capacity.add_permits(prefilled);

            (old_slot, outstanding, prefilled)
        };

        // `granted` counts new-regime slots already spoken for, whether as a
        // free ticket or as a rebuilt cell. It caps both the keeps and the
        // failure refunds so the new regime never exceeds its capacity.
        let mut errors = Vec::new();
        for _ in 0..outstanding {
            let Some(cell) = old_slot.recv().await else {
                break;
            };
            if granted >= max_capacity {
                close_value(cell.value).await;
                continue;
            }
            granted += 1;
            match rebuild(cell, &factory, &new_slot).await {
                Ok(cell) => {
                    if let Err(cell) = new_slot.push(cell) {
                        close_value(cell.value).await;
                    }
                }
                Err(err) => {
                    new_capacity.add_permits(1);
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PoolError::Rebuild(errors))
        }
    }

    /// Closes every value the entry still owns and refuses all further
    /// traffic: queued cells are closed here, waiting acquirers are woken
    /// with an error, and handles still out will close their value on drop.
    pub(crate) async fn dispose(&self) {
        let shared = self.shared.write().await;
        shared.capacity.close();
        for cell in shared.slot.close() {
            close_value(cell.value).await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn counts(&self) -> (usize, usize, usize) {
        let shared = self.shared.read().await;
        (
            shared.slot.len(),
            shared.available_capacity(),
            shared.max_capacity,
        )
    }
}

/// Replaces a cell's value with one built by the new factory and rebinds the
/// cell to the new idle queue. The old value is closed either way; on factory
/// failure the cell is gone and its creation slot must be handed back by the
/// caller.
async fn rebuild<V: Closeable>(
    cell: Cell<V>,
    factory: &Factory<V>,
    slot: &Arc<ReturnSlot<V>>,
) -> anyhow::Result<Cell<V>> {
    let Cell {
        value, last_used, ..
    } = cell;
    close_value(value).await;
    let value = factory().await?;
    Ok(Cell {
        value,
        last_used,
        slot: Arc::clone(slot),
    })
}

/// Closes a value that is being discarded. Close failures are not surfaced;
/// the value is gone regardless.
pub(crate) async fn close_value<V: Closeable>(value: V) {
    if let Err(error) = value.close().await {
        tracing::debug!("failed to close discarded pooled value: {error:#}");
    }
}
