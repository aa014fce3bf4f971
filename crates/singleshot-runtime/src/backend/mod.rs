//! Capability contract between the invocation engine and an inference backend.
//!
//! The engine never loads models itself. A [`BackendFactory`] registered for an
//! [`Nnfw`] kind opens a [`Backend`] instance, which the engine then owns
//! exclusively and drives from its worker thread.
mod custom;
mod registry;

pub use custom::{CustomEasyFn, register_custom_easy, unregister_custom_easy};
pub use registry::{
    Hardware, Nnfw, check_nnfw_availability, register_backend, unregister_backend,
};
pub(crate) use registry::find_factory;

use crate::error::{MlError, MlResult};
use crate::single::OpenOptions;
use crate::tensor::TensorsInfo;
use std::sync::{Arc, Mutex};

/// A loaded inference backend instance.
pub trait Backend: Send {
    /// Input descriptor the backend currently expects. May be empty when the
    /// model does not fix its input until [`Backend::configure`] is called.
    fn input_info(&self) -> TensorsInfo;

    /// Output descriptor matching the current input descriptor.
    fn output_info(&self) -> TensorsInfo;

    /// Negotiates a new input descriptor and returns the resulting output
    /// descriptor. Fixed-shape backends keep the default.
    fn configure(&mut self, input: &TensorsInfo) -> MlResult<TensorsInfo> {
        let _ = input;
        Err(MlError::unsupported(
            "the backend does not support changing its input shape",
        ))
    }

    /// Runs one inference pass.
    ///
    /// When the engine pre-allocates the output, every region of `output` has
    /// the size of the output descriptor and is written in place. When
    /// `allow_backend_alloc` is set and [`Backend::allocates_output`] is true,
    /// the regions are empty and the backend replaces them with its own
    /// memory, later given back through [`Backend::release_backend_allocated`].
    fn invoke(
        &mut self,
        input: &[&[u8]],
        output: &mut [Vec<u8>],
        allow_backend_alloc: bool,
    ) -> anyhow::Result<()>;

    fn allocates_output(&self) -> bool {
        false
    }

    /// Receives memory that the backend handed out from
    /// [`Backend::invoke`]. Called exactly once per backend-allocated output.
    fn release_backend_allocated(&mut self, output: Vec<Vec<u8>>) {
        drop(output);
    }

    fn get_property(&self, key: &str) -> MlResult<String> {
        Err(MlError::unsupported(format!("unknown property '{key}'")))
    }

    fn set_property(&mut self, key: &str, value: &str) -> MlResult<()> {
        let _ = value;
        Err(MlError::unsupported(format!("unknown property '{key}'")))
    }
}

/// Opens backend instances for one framework kind.
pub trait BackendFactory: Send + Sync {
    fn open(&self, options: &OpenOptions) -> anyhow::Result<Box<dyn Backend>>;

    fn supports(&self, hardware: Hardware) -> bool {
        matches!(hardware, Hardware::Any | Hardware::Auto | Hardware::Cpu)
    }
}

/// Backend instance shared between the engine, its worker and the release
/// callbacks of outputs it allocated.
pub(crate) type SharedBackend = Arc<Mutex<Box<dyn Backend>>>;
