//! Timeout-bounded, synchronous inference over asynchronous backends.
//!
//! Open a model with [`SingleShot::open`] (or inject a [`Backend`] with
//! [`SingleShot::open_with_backend`]), describe tensors with [`TensorsInfo`]
//! and pass frames as [`TensorsData`].
//!
//! ```
//! use singleshot_runtime::{
//!     Nnfw, OpenOptions, SingleShot, TensorType, TensorsData, TensorsInfo, register_custom_easy,
//! };
//!
//! let mut info = TensorsInfo::new();
//! info.push_tensor(TensorType::Float32, &[1])?;
//! register_custom_easy("doc-add2", &info, &info, |input, output| {
//!     let value = f32::from_ne_bytes(input[0].try_into()?);
//!     output[0].copy_from_slice(&(value + 2.0).to_ne_bytes());
//!     Ok(())
//! })?;
//!
//! let single = SingleShot::open(OpenOptions::new("doc-add2").with_nnfw(Nnfw::CustomFilter))?;
//! let mut input = TensorsData::new(&single.input_info()?)?;
//! input.set_tensor(0, &10.0f32.to_ne_bytes())?;
//! let output = single.invoke(&input)?;
//! assert_eq!(output.tensor(0)?, &12.0f32.to_ne_bytes());
//! single.close()?;
//! # Ok::<(), singleshot_runtime::MlError>(())
//! ```
pub mod backend;
mod error;
mod single;
pub mod tensor;

#[cfg(feature = "cli")]
pub mod cli;

pub use backend::{
    Backend, BackendFactory, CustomEasyFn, Hardware, Nnfw, check_nnfw_availability,
    register_backend, register_custom_easy, unregister_backend, unregister_custom_easy,
};
pub use error::{MlError, MlResult};
pub use single::{HandleId, OpenOptions, SingleShot};
pub use tensor::{Ownership, TensorType, TensorsData, TensorsInfo};
