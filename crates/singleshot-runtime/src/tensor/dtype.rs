use serde::{Deserialize, Serialize};

/// Element type of a tensor.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TensorType {
    Int32,
    Uint32,
    Int16,
    Uint16,
    Int8,
    Uint8,
    Float64,
    Float32,
    Int64,
    Uint64,
    Float16,
    /// Entry that has not been configured yet.
    #[default]
    Unknown,
}

impl TensorType {
    /// Width of one element in bytes, `0` for [`TensorType::Unknown`].
    pub const fn element_size(self) -> usize {
        match self {
            TensorType::Int8 | TensorType::Uint8 => 1,
            TensorType::Int16 | TensorType::Uint16 | TensorType::Float16 => 2,
            TensorType::Int32 | TensorType::Uint32 | TensorType::Float32 => 4,
            TensorType::Int64 | TensorType::Uint64 | TensorType::Float64 => 8,
            TensorType::Unknown => 0,
        }
    }

    pub const fn is_known(self) -> bool {
        !matches!(self, TensorType::Unknown)
    }
}
