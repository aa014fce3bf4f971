use super::engine::{Delivery, Finished, Job, Shared, Slot};
use super::handle::HandleId;
use super::state::WorkerState;
use crate::backend::SharedBackend;
use crate::error::{MlError, MlResult};
use crate::tensor::{Ownership, TensorsData, check_sizes};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, MutexGuard, PoisonError};

/// Body of the worker thread of engine `id`.
///
/// Parks while idle, runs every submitted job with the slot unlocked, and
/// exits once a join is requested and no job is left.
pub(crate) fn run(shared: Arc<Shared>, id: HandleId) {
    log::debug!("Worker of single-shot handle {id} started");
    let mut slot = shared.lock_recover();
    loop {
        slot = shared
            .cond
            .wait_while(slot, |s| s.state == WorkerState::Idle)
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(job) = slot.job.take() {
            let backend = slot.backend.clone();
            drop(slot);

            let produced = execute(backend, &job);

            slot = shared.lock_recover();
            finish(&mut slot, job, produced, id);
            shared.cond.notify_all();
            continue;
        }

        if slot.state.is_join_requested() {
            break;
        }
        // Running without a job, nothing to wait for.
        slot.state.complete();
    }
    log::debug!("Worker of single-shot handle {id} exited");
}

/// Records the outcome of `job` under the slot lock and frees its input.
fn finish(slot: &mut MutexGuard<'_, Slot>, job: Job, produced: MlResult<TensorsData>, id: HandleId) {
    let Job { ticket, input, .. } = job;
    drop(input);

    if slot.abandoned == Some(ticket) {
        slot.abandoned = None;
        match produced {
            Ok(output) => {
                log::debug!("Releasing the output of timed out invocation {ticket} on {id}");
                drop(output);
            }
            Err(e) => log::warn!("Timed out invocation {ticket} on {id} failed: {e}"),
        }
    } else {
        if let Err(e) = &produced {
            log::warn!("Invocation {ticket} on single-shot handle {id} failed: {e}");
        }
        let result = produced.map(|output| match output.ownership() {
            Ownership::Backend => Delivery::Pending(slot.pending.track(output)),
            _ => Delivery::Owned(output),
        });
        slot.finished = Some(Finished { ticket, result });
    }
    slot.state.complete();
}

/// Runs the backend on `job`. Called without the slot lock.
fn execute(backend: Option<SharedBackend>, job: &Job) -> MlResult<TensorsData> {
    let backend = backend.ok_or_else(|| MlError::StreamError("the backend was released".into()))?;
    let inputs = job.input.slices()?;
    let sizes = job.out_info.tensor_sizes();

    let mut guard = backend.lock().unwrap_or_else(PoisonError::into_inner);
    let backend_alloc = guard.allocates_output();
    let mut outputs: Vec<Vec<u8>> = if backend_alloc {
        vec![Vec::new(); sizes.len()]
    } else {
        sizes.iter().map(|&size| vec![0u8; size]).collect()
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        guard.invoke(&inputs, &mut outputs, backend_alloc)
    }));
    let failure = match outcome {
        Ok(Ok(())) => check_sizes(&job.out_info, &outputs)
            .err()
            .map(|e| MlError::StreamError(format!("the backend produced a malformed output: {e}"))),
        Ok(Err(e)) => Some(MlError::StreamError(format!("{e:#}"))),
        Err(panic) => Some(MlError::StreamError(format!(
            "the backend panicked: {}",
            panic_message(&*panic)
        ))),
    };

    if let Some(error) = failure {
        if backend_alloc {
            guard.release_backend_allocated(outputs);
        }
        return Err(error);
    }
    drop(guard);

    if backend_alloc {
        let owner = backend.clone();
        Ok(TensorsData::from_backend(
            &job.out_info,
            outputs,
            Box::new(move |buffers| {
                owner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .release_backend_allocated(buffers)
            }),
        ))
    } else {
        let mut output = TensorsData::from_buffers(&job.out_info, outputs)?;
        output.set_ownership(Ownership::Engine);
        Ok(output)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}
