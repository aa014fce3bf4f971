//! Tensor value model: shape descriptors and the memory frames they describe.
mod data;
mod dtype;
mod info;

pub use data::{Ownership, ReleaseFn, TensorsData};
pub(crate) use data::check_sizes;
pub use dtype::TensorType;
pub use info::{
    TENSOR_RANK_LIMIT, TENSOR_RANK_LIMIT_PREV, TENSOR_SIZE_LIMIT, TensorDimension, TensorInfo,
    TensorsInfo,
};
