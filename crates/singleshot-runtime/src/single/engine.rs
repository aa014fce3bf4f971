use super::handle::{self, HandleId, SINGLE_MAGIC};
use super::pending::{BufferId, PendingReleases};
use super::state::WorkerState;
use crate::backend::{Hardware, Nnfw, SharedBackend};
use crate::error::{MlError, MlResult};
use crate::tensor::{TensorsData, TensorsInfo};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// One submitted invocation, owned by the worker once taken from the slot.
pub(crate) struct Job {
    pub(crate) ticket: u64,
    pub(crate) input: TensorsData,
    pub(crate) out_info: TensorsInfo,
}

/// Output of a finished invocation until its caller picks it up.
pub(crate) enum Delivery {
    /// Backend-allocated, still tracked in the pending-release set.
    Pending(BufferId),
    /// Engine-allocated.
    Owned(TensorsData),
}

pub(crate) struct Finished {
    pub(crate) ticket: u64,
    pub(crate) result: MlResult<Delivery>,
}

/// Engine state shared by callers and the worker, behind a single lock.
pub(crate) struct Slot {
    pub(crate) state: WorkerState,
    pub(crate) job: Option<Job>,
    /// Ticket of the last submitted job.
    pub(crate) ticket: u64,
    /// Ticket of a job whose caller stopped waiting.
    pub(crate) abandoned: Option<u64>,
    pub(crate) finished: Option<Finished>,
    pub(crate) pending: PendingReleases,
    pub(crate) in_info: TensorsInfo,
    pub(crate) out_info: TensorsInfo,
    pub(crate) timeout: Duration,
    pub(crate) backend: Option<SharedBackend>,
}

impl Slot {
    pub(crate) fn new(
        in_info: TensorsInfo,
        out_info: TensorsInfo,
        timeout: Duration,
        backend: SharedBackend,
    ) -> Self {
        Self {
            state: WorkerState::Idle,
            job: None,
            ticket: 0,
            abandoned: None,
            finished: None,
            pending: PendingReleases::default(),
            in_info,
            out_info,
            timeout,
            backend: Some(backend),
        }
    }

    pub(crate) fn backend(&self) -> MlResult<SharedBackend> {
        self.backend.clone().ok_or(MlError::InvalidHandle)
    }

    /// Takes the result of `ticket` if the worker recorded it.
    pub(crate) fn take_finished(&mut self, ticket: u64) -> Option<MlResult<TensorsData>> {
        if self.finished.as_ref()?.ticket != ticket {
            return None;
        }
        let finished = self.finished.take()?;
        Some(finished.result.and_then(|delivery| match delivery {
            Delivery::Owned(data) => Ok(data),
            Delivery::Pending(id) => self
                .pending
                .claim(id)
                .ok_or_else(|| MlError::Unknown(format!("{id} was released before delivery"))),
        }))
    }

    /// Drops a recorded result nobody is going to pick up.
    pub(crate) fn discard_finished(&mut self) {
        if let Some(Finished {
            result: Ok(Delivery::Pending(id)),
            ..
        }) = self.finished.take()
        {
            self.pending.release(id);
        }
    }

    /// Releases every pending output except one still awaited by a caller.
    pub(crate) fn release_unclaimed(&mut self) -> usize {
        let awaited = match &self.finished {
            Some(Finished {
                result: Ok(Delivery::Pending(id)),
                ..
            }) => Some(*id),
            _ => None,
        };
        self.pending.release_all_except(awaited)
    }
}

pub(crate) struct Shared {
    pub(crate) slot: Mutex<Slot>,
    pub(crate) cond: Condvar,
}

impl Shared {
    pub(crate) fn new(slot: Slot) -> Self {
        Self {
            slot: Mutex::new(slot),
            cond: Condvar::new(),
        }
    }

    /// Lock for the worker and teardown paths, which must make progress even
    /// after a caller panicked while holding the slot.
    pub(crate) fn lock_recover(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct Engine {
    pub(crate) id: HandleId,
    magic: AtomicU32,
    pub(crate) framework: Nnfw,
    pub(crate) accelerator: Hardware,
    pub(crate) shared: Arc<Shared>,
    pub(crate) worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub(crate) fn new(
        id: HandleId,
        framework: Nnfw,
        accelerator: Hardware,
        shared: Arc<Shared>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            magic: AtomicU32::new(SINGLE_MAGIC),
            framework,
            accelerator,
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.magic.load(Ordering::Acquire) == SINGLE_MAGIC
    }

    /// Returns whether this call cleared the marker.
    pub(crate) fn clear_magic(&self) -> bool {
        self.magic
            .compare_exchange(SINGLE_MAGIC, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Checks the marker, then takes the slot lock.
    ///
    /// In destruction mode the marker is cleared first, so no later caller can
    /// get past the check while teardown waits for the lock.
    pub(crate) fn acquire(&self, for_destruction: bool) -> MlResult<MutexGuard<'_, Slot>> {
        if for_destruction {
            handle::invalidate(self)?;
            return Ok(self.shared.lock_recover());
        }
        if !self.is_valid() {
            return Err(MlError::InvalidHandle);
        }
        Ok(self.shared.slot.lock()?)
    }
}
