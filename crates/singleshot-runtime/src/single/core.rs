use super::engine::{Engine, Job, Shared, Slot};
use super::handle::{self, HandleId};
use super::options::OpenOptions;
use super::worker;
use crate::backend::{Backend, Hardware, Nnfw, find_factory};
use crate::error::{MlError, MlResult};
use crate::tensor::{Ownership, TensorsData, TensorsInfo};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Handle to an opened model, invoked one frame at a time.
///
/// Every operation checks that the handle is still open, so calls racing with
/// [`SingleShot::close`] on another thread fail with
/// [`MlError::InvalidHandle`] instead of touching a half-destroyed engine.
/// Dropping an open handle closes it.
pub struct SingleShot {
    engine: Arc<Engine>,
}

impl SingleShot {
    /// Opens the model described by `options` with the backend registered for
    /// its framework.
    pub fn open(options: OpenOptions) -> MlResult<Self> {
        let nnfw = options.resolve_nnfw()?;
        let factory = find_factory(nnfw)?;
        if !factory.supports(options.hardware()) {
            return Err(MlError::unsupported(format!(
                "the {nnfw} backend cannot run on {}",
                options.hardware()
            )));
        }
        let backend = factory.open(&options).map_err(|e| {
            MlError::invalid(format!(
                "failed to open '{}' with {nnfw}: {e:#}",
                options.models().join(",")
            ))
        })?;
        Self::start(backend, &options, nnfw)
    }

    /// Opens an engine around an already loaded backend instance.
    pub fn open_with_backend(backend: Box<dyn Backend>, options: OpenOptions) -> MlResult<Self> {
        Self::start(backend, &options, options.nnfw())
    }

    fn start(mut backend: Box<dyn Backend>, options: &OpenOptions, framework: Nnfw) -> MlResult<Self> {
        let (in_info, out_info) = negotiate(backend.as_mut(), options)?;

        let id = HandleId::next();
        let slot = Slot::new(
            in_info,
            out_info,
            options.timeout(),
            Arc::new(Mutex::new(backend)),
        );
        let shared = Arc::new(Shared::new(slot));
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(format!("single-shot-{id}"))
            .spawn(move || worker::run(worker_shared, id))
            .map_err(|e| MlError::Unknown(format!("failed to spawn the worker thread: {e}")))?;

        let engine = Arc::new(Engine::new(
            id,
            framework,
            options.hardware(),
            shared,
            worker,
        ));
        handle::register(&engine);
        log::debug!(
            "Opened single-shot handle {id} ({framework} on {})",
            options.hardware()
        );
        Ok(Self { engine })
    }

    pub fn id(&self) -> HandleId {
        self.engine.id
    }

    pub fn is_valid(&self) -> bool {
        self.engine.is_valid()
    }

    pub fn framework(&self) -> Nnfw {
        self.engine.framework
    }

    pub fn hardware(&self) -> Hardware {
        self.engine.accelerator
    }

    /// Closes the handle, waiting for an in-flight invocation to finish.
    ///
    /// The handle is invalid for every other caller as soon as this starts. An
    /// invocation already waiting on another thread still receives its result.
    pub fn close(&self) -> MlResult<()> {
        let engine = &self.engine;
        let id = engine.id;
        let mut slot = engine.acquire(true)?;
        slot.state.request_join();
        engine.shared.cond.notify_all();
        drop(slot);

        let worker = engine.worker.lock()?.take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("Worker of single-shot handle {id} panicked");
            }
        }

        let mut slot = engine.shared.lock_recover();
        let released = slot.release_unclaimed();
        let awaited = slot.pending.len();
        let backend = slot.backend.take();
        drop(slot);
        drop(backend);

        if released > 0 {
            log::debug!("Released {released} unclaimed outputs of single-shot handle {id}");
        }
        if awaited > 0 {
            log::debug!("Single-shot handle {id} closed with an output still awaited");
        }
        log::debug!("Closed single-shot handle {id}");
        Ok(())
    }

    /// Fresh copy of the negotiated input descriptor.
    pub fn input_info(&self) -> MlResult<TensorsInfo> {
        Ok(self.engine.acquire(false)?.in_info.clone())
    }

    /// Fresh copy of the negotiated output descriptor.
    pub fn output_info(&self) -> MlResult<TensorsInfo> {
        Ok(self.engine.acquire(false)?.out_info.clone())
    }

    /// Renegotiates the input shape with the backend.
    ///
    /// Fails with [`MlError::NotSupported`] for fixed-shape backends, leaving
    /// both descriptors untouched.
    pub fn set_input_info(&self, info: &TensorsInfo) -> MlResult<()> {
        info.validate()?;
        let mut slot = self.engine.acquire(false)?;
        reconfigure(&mut slot, info)
    }

    /// Sets the default invoke timeout. Zero waits indefinitely.
    pub fn set_timeout(&self, timeout: Duration) -> MlResult<()> {
        self.engine.acquire(false)?.timeout = timeout;
        Ok(())
    }

    pub fn timeout(&self) -> MlResult<Duration> {
        Ok(self.engine.acquire(false)?.timeout)
    }

    /// Runs one inference pass on `input` within the configured timeout.
    ///
    /// `input` is copied before it reaches the worker, so it stays usable and
    /// may be dropped even if the call times out.
    pub fn invoke(&self, input: &TensorsData) -> MlResult<TensorsData> {
        let timeout = self.engine.acquire(false)?.timeout;
        self.invoke_with_timeout(input, timeout)
    }

    pub fn invoke_with_timeout(
        &self,
        input: &TensorsData,
        timeout: Duration,
    ) -> MlResult<TensorsData> {
        self.run_job(input, timeout, None)
    }

    /// Invokes and copies the result into `output`, which must already be
    /// shaped like the output descriptor.
    pub fn invoke_into(&self, input: &TensorsData, output: &mut TensorsData) -> MlResult<()> {
        {
            let slot = self.engine.acquire(false)?;
            if output.sizes() != slot.out_info.tensor_sizes() {
                return Err(MlError::invalid(format!(
                    "the output holds tensors of {:?} bytes, the model produces {:?}",
                    output.sizes(),
                    slot.out_info.tensor_sizes()
                )));
            }
        }
        let timeout = self.timeout()?;
        let result = self.run_job(input, timeout, None)?;
        for index in 0..result.count() {
            output.set_tensor(index, result.tensor(index)?)?;
        }
        Ok(())
    }

    /// Invokes with `info` as the input shape, renegotiating it first when it
    /// differs from the current one. Returns the output with its descriptor.
    ///
    /// Renegotiation and submission happen under one lock.
    pub fn invoke_dynamic(
        &self,
        input: &TensorsData,
        info: &TensorsInfo,
    ) -> MlResult<(TensorsData, TensorsInfo)> {
        info.validate()?;
        let timeout = self.timeout()?;
        let output = self.run_job(input, timeout, Some(info))?;
        let out_info = output.info().clone();
        Ok((output, out_info))
    }

    fn run_job(
        &self,
        input: &TensorsData,
        timeout: Duration,
        reshape: Option<&TensorsInfo>,
    ) -> MlResult<TensorsData> {
        let engine = &self.engine;
        let mut slot = engine.acquire(false)?;
        if let Some(info) = reshape {
            if slot.in_info != *info {
                reconfigure(&mut slot, info)?;
            }
        }

        let expected = slot.in_info.tensor_sizes();
        if input.sizes() != expected {
            return Err(MlError::invalid(format!(
                "the input holds tensors of {:?} bytes, the model expects {:?}",
                input.sizes(),
                expected
            )));
        }
        input.slices()?;

        slot.state.submit()?;
        slot.discard_finished();
        slot.ticket += 1;
        let ticket = slot.ticket;
        let out_info = slot.out_info.clone();
        slot.job = Some(Job {
            ticket,
            input: input.copy_with(Ownership::Engine),
            out_info,
        });
        engine.shared.cond.notify_all();

        let pending = |s: &mut Slot| s.finished.as_ref().is_none_or(|f| f.ticket != ticket);
        let mut slot: MutexGuard<'_, Slot> = if timeout.is_zero() {
            engine.shared.cond.wait_while(slot, pending)?
        } else {
            engine.shared.cond.wait_timeout_while(slot, timeout, pending)?.0
        };

        match slot.take_finished(ticket) {
            Some(result) => result.map(|mut output| {
                if output.ownership() == Ownership::Engine {
                    output.set_ownership(Ownership::Caller);
                }
                output
            }),
            None => {
                slot.abandoned = Some(ticket);
                log::warn!(
                    "Invocation {ticket} on single-shot handle {} timed out after {timeout:?}",
                    engine.id
                );
                Err(MlError::TimedOut)
            }
        }
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Drop for SingleShot {
    fn drop(&mut self) {
        if self.engine.is_valid() {
            if let Err(e) = self.close() {
                log::warn!("Failed to close single-shot handle {}: {e}", self.engine.id);
            }
        }
    }
}

impl std::fmt::Debug for SingleShot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleShot")
            .field("id", &self.engine.id)
            .field("framework", &self.engine.framework)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Works out the descriptors an engine starts with.
fn negotiate(
    backend: &mut dyn Backend,
    options: &OpenOptions,
) -> MlResult<(TensorsInfo, TensorsInfo)> {
    let mut in_info = backend.input_info();
    let mut out_info = backend.output_info();

    if let Some(requested) = options.input_info() {
        requested.validate()?;
        if *requested != in_info {
            out_info = backend.configure(requested).map_err(|e| {
                MlError::invalid(format!(
                    "the model does not accept input {}: {e}",
                    requested.dimensions_string()
                ))
            })?;
        }
        in_info = requested.clone();
    }

    if let Some(requested) = options.output_info() {
        requested.validate()?;
        if *requested != out_info {
            return Err(MlError::invalid(format!(
                "the model produces {} but {} was requested",
                out_info.dimensions_string(),
                requested.dimensions_string()
            )));
        }
        out_info = requested.clone();
    }

    in_info
        .validate()
        .map_err(|e| MlError::invalid(format!("the input descriptor is not usable: {e}")))?;
    out_info
        .validate()
        .map_err(|e| MlError::invalid(format!("the output descriptor is not usable: {e}")))?;
    Ok((in_info, out_info))
}

/// Replaces the input descriptor of an idle engine.
pub(crate) fn reconfigure(slot: &mut Slot, info: &TensorsInfo) -> MlResult<()> {
    if slot.state.is_running() {
        return Err(MlError::TryAgain);
    }
    if *info == slot.in_info {
        slot.in_info = info.clone();
        return Ok(());
    }
    let backend = slot.backend()?;
    let out_info = backend.lock()?.configure(info)?;
    out_info.validate().map_err(|e| {
        MlError::StreamError(format!("the backend negotiated an unusable output: {e}"))
    })?;
    slot.in_info = info.clone();
    slot.out_info = out_info;
    Ok(())
}
