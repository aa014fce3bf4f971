use super::TensorsInfo;
use crate::error::{MlError, MlResult};
use std::fmt::{Debug, Formatter};

/// Callback receiving the memory of a [`TensorsData`] when it is destroyed.
///
/// Ownership of the regions moves into the callback, which runs at most once.
pub type ReleaseFn = Box<dyn FnOnce(Vec<Vec<u8>>) + Send + 'static>;

/// Who is responsible for the memory of a [`TensorsData`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Ownership {
    /// Created or handed over to the application; freed when it is dropped.
    Caller,
    /// Private to the engine.
    Engine,
    /// Allocated by the backend; returned to it through the release callback.
    Backend,
}

/// One frame of tensor memory, shaped by a [`TensorsInfo`].
///
/// Regions may be left unpopulated (see [`TensorsData::new_unallocated`]);
/// reading one fails until it is written with [`TensorsData::set_tensor`].
/// Dropping the set runs the release callback, if any, exactly once.
///
/// Memory allocated by a backend goes back through that backend, which serves
/// one call at a time. Dropping such an output while the same engine runs
/// another invocation blocks until that invocation returns.
pub struct TensorsData {
    info: TensorsInfo,
    buffers: Vec<Option<Vec<u8>>>,
    ownership: Ownership,
    release: Option<ReleaseFn>,
}

impl TensorsData {
    /// Allocates zero-filled memory for every tensor of `info`.
    pub fn new(info: &TensorsInfo) -> MlResult<Self> {
        info.validate()?;
        let buffers = info
            .tensor_sizes()
            .into_iter()
            .map(|size| Some(vec![0u8; size]))
            .collect();
        Ok(Self::with_buffers(info.clone(), buffers, Ownership::Caller))
    }

    /// Creates the set without allocating any tensor memory.
    pub fn new_unallocated(info: &TensorsInfo) -> MlResult<Self> {
        info.validate()?;
        let buffers = (0..info.count()).map(|_| None).collect();
        Ok(Self::with_buffers(info.clone(), buffers, Ownership::Caller))
    }

    /// Wraps existing memory. Every buffer must match the size `info` implies.
    pub fn from_buffers(info: &TensorsInfo, buffers: Vec<Vec<u8>>) -> MlResult<Self> {
        info.validate()?;
        check_sizes(info, &buffers)?;
        Ok(Self::with_buffers(
            info.clone(),
            buffers.into_iter().map(Some).collect(),
            Ownership::Caller,
        ))
    }

    /// Wraps memory owned by a backend; `release` hands it back on drop.
    pub(crate) fn from_backend(
        info: &TensorsInfo,
        buffers: Vec<Vec<u8>>,
        release: ReleaseFn,
    ) -> Self {
        let mut data = Self::with_buffers(
            info.clone(),
            buffers.into_iter().map(Some).collect(),
            Ownership::Backend,
        );
        data.release = Some(release);
        data
    }

    fn with_buffers(info: TensorsInfo, buffers: Vec<Option<Vec<u8>>>, ownership: Ownership) -> Self {
        Self {
            info,
            buffers,
            ownership,
            release: None,
        }
    }

    pub fn info(&self) -> &TensorsInfo {
        &self.info
    }

    pub fn count(&self) -> usize {
        self.buffers.len()
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub(crate) fn set_ownership(&mut self, ownership: Ownership) {
        self.ownership = ownership;
    }

    pub fn has_release_callback(&self) -> bool {
        self.release.is_some()
    }

    /// Expected byte size of every tensor.
    pub fn sizes(&self) -> Vec<usize> {
        self.info.tensor_sizes()
    }

    pub fn is_populated(&self, index: usize) -> bool {
        matches!(self.buffers.get(index), Some(Some(_)))
    }

    fn slot(&self, index: usize) -> MlResult<&Option<Vec<u8>>> {
        self.buffers.get(index).ok_or_else(|| {
            MlError::invalid(format!(
                "index {index} is out of bounds, the set holds {} tensors",
                self.buffers.len()
            ))
        })
    }

    pub fn tensor(&self, index: usize) -> MlResult<&[u8]> {
        self.slot(index)?
            .as_deref()
            .ok_or_else(|| MlError::invalid(format!("tensor {index} has no memory")))
    }

    pub fn tensor_mut(&mut self, index: usize) -> MlResult<&mut [u8]> {
        self.slot(index)?;
        self.buffers[index]
            .as_deref_mut()
            .ok_or_else(|| MlError::invalid(format!("tensor {index} has no memory")))
    }

    /// Copies `bytes` to the start of the tensor at `index`, allocating it if
    /// needed. `bytes` must not be empty nor larger than the tensor.
    pub fn set_tensor(&mut self, index: usize, bytes: &[u8]) -> MlResult<()> {
        self.slot(index)?;
        let size = self.info.tensor_size(Some(index))?;
        if bytes.is_empty() || bytes.len() > size {
            return Err(MlError::invalid(format!(
                "tensor {index} holds {size} bytes, cannot write {}",
                bytes.len()
            )));
        }
        let buffer = self.buffers[index].get_or_insert_with(|| vec![0u8; size]);
        buffer[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Borrowed view of every region, failing if one is unpopulated.
    pub(crate) fn slices(&self) -> MlResult<Vec<&[u8]>> {
        (0..self.count()).map(|i| self.tensor(i)).collect()
    }

    /// Deep copy of the memory only, without the release callback.
    pub(crate) fn copy_with(&self, ownership: Ownership) -> Self {
        Self::with_buffers(self.info.clone(), self.buffers.clone(), ownership)
    }

    /// Destroys the set, handing its memory to the release callback if one is
    /// attached.
    ///
    /// For backend-allocated memory this waits for an invocation in progress
    /// on the owning backend.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Clone for TensorsData {
    /// Caller-owned deep copy. The release callback is not copied.
    fn clone(&self) -> Self {
        self.copy_with(Ownership::Caller)
    }
}

impl Drop for TensorsData {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            let buffers = self.buffers.drain(..).flatten().collect();
            release(buffers);
        }
    }
}

impl Debug for TensorsData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorsData")
            .field("count", &self.count())
            .field("sizes", &self.sizes())
            .field("ownership", &self.ownership)
            .field("release", &self.release.is_some())
            .finish()
    }
}

pub(crate) fn check_sizes(info: &TensorsInfo, buffers: &[Vec<u8>]) -> MlResult<()> {
    if buffers.len() != info.count() {
        return Err(MlError::invalid(format!(
            "expected {} tensors, got {}",
            info.count(),
            buffers.len()
        )));
    }
    for (index, (buffer, size)) in buffers.iter().zip(info.tensor_sizes()).enumerate() {
        if buffer.len() != size {
            return Err(MlError::invalid(format!(
                "tensor {index} should hold {size} bytes, got {}",
                buffer.len()
            )));
        }
    }
    Ok(())
}
