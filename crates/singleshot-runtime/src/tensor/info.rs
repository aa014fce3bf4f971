use super::TensorType;
use crate::error::{MlError, MlResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Maximum number of tensors a [`TensorsInfo`] can describe.
pub const TENSOR_SIZE_LIMIT: usize = 16;
/// Rank limit of extended descriptors.
pub const TENSOR_RANK_LIMIT: usize = 16;
/// Rank limit of standard descriptors.
pub const TENSOR_RANK_LIMIT_PREV: usize = 4;

pub type TensorDimension = [u32; TENSOR_RANK_LIMIT];

/// Type, shape and optional name of a single tensor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: TensorType,
    pub dimension: TensorDimension,
}

impl TensorInfo {
    fn validate(&self, rank_limit: usize) -> Result<(), String> {
        if !self.ty.is_known() {
            return Err("the tensor type is not set".to_string());
        }
        if let Some(axis) = self.dimension.iter().position(|d| *d == 0) {
            return Err(format!("dimension {axis} is zero"));
        }
        if let Some(axis) = self.dimension[rank_limit..].iter().position(|d| *d != 1) {
            return Err(format!(
                "dimension {} exceeds the rank limit {rank_limit} and must be 1",
                axis + rank_limit
            ));
        }
        if self.byte_size(rank_limit).is_none() {
            return Err("the tensor size does not fit in memory".to_string());
        }
        Ok(())
    }

    /// `None` when the size overflows `usize`.
    fn byte_size(&self, rank_limit: usize) -> Option<usize> {
        self.dimension[..rank_limit]
            .iter()
            .try_fold(self.ty.element_size(), |size, d| size.checked_mul(*d as usize))
    }

    fn same_shape(&self, other: &TensorInfo, rank_limit: usize) -> bool {
        self.ty == other.ty && self.dimension[..rank_limit] == other.dimension[..rank_limit]
    }
}

/// Describes the element type and shape of up to [`TENSOR_SIZE_LIMIT`] tensors.
///
/// A descriptor is created empty and populated index by index. It is
/// considered valid once it holds at least one tensor and every tensor has a
/// known type and non-zero dimensions. Standard descriptors pin every axis
/// beyond [`TENSOR_RANK_LIMIT_PREV`] to `1`.
///
/// Equality is structural: tensor count, element types and the dimensions
/// within the active rank are compared, names are ignored. A standard and an
/// extended descriptor never compare equal, even with identical content.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TensorsInfo {
    extended: bool,
    tensors: Vec<TensorInfo>,
}

impl PartialEq for TensorsInfo {
    fn eq(&self, other: &Self) -> bool {
        let rank = self.rank_limit();
        self.extended == other.extended
            && self.tensors.len() == other.tensors.len()
            && self
                .tensors
                .iter()
                .zip(&other.tensors)
                .all(|(a, b)| a.same_shape(b, rank))
    }
}

impl TensorsInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor using the larger [`TENSOR_RANK_LIMIT`].
    pub fn new_extended() -> Self {
        Self {
            extended: true,
            tensors: Vec::new(),
        }
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn rank_limit(&self) -> usize {
        if self.extended {
            TENSOR_RANK_LIMIT
        } else {
            TENSOR_RANK_LIMIT_PREV
        }
    }

    pub fn count(&self) -> usize {
        self.tensors.len()
    }

    pub fn set_count(&mut self, count: usize) -> MlResult<()> {
        if count == 0 || count > TENSOR_SIZE_LIMIT {
            return Err(MlError::invalid(format!(
                "the number of tensors should be between 1 and {TENSOR_SIZE_LIMIT}, got {count}"
            )));
        }
        self.tensors.resize_with(count, TensorInfo::default);
        Ok(())
    }

    pub fn tensors(&self) -> &[TensorInfo] {
        &self.tensors
    }

    fn entry(&self, index: usize) -> MlResult<&TensorInfo> {
        self.tensors.get(index).ok_or_else(|| {
            MlError::invalid(format!(
                "index {index} is out of bounds, the descriptor holds {} tensors",
                self.tensors.len()
            ))
        })
    }

    fn entry_mut(&mut self, index: usize) -> MlResult<&mut TensorInfo> {
        let count = self.tensors.len();
        self.tensors.get_mut(index).ok_or_else(|| {
            MlError::invalid(format!(
                "index {index} is out of bounds, the descriptor holds {count} tensors"
            ))
        })
    }

    pub fn tensor_name(&self, index: usize) -> MlResult<Option<&str>> {
        Ok(self.entry(index)?.name.as_deref())
    }

    pub fn set_tensor_name(&mut self, index: usize, name: Option<&str>) -> MlResult<()> {
        self.entry_mut(index)?.name = name.map(str::to_string);
        Ok(())
    }

    pub fn tensor_type(&self, index: usize) -> MlResult<TensorType> {
        Ok(self.entry(index)?.ty)
    }

    pub fn set_tensor_type(&mut self, index: usize, ty: TensorType) -> MlResult<()> {
        if !ty.is_known() {
            return Err(MlError::invalid("the tensor type cannot be set to unknown"));
        }
        self.entry_mut(index)?.ty = ty;
        Ok(())
    }

    /// Dimensions of the tensor at `index` up to the active rank limit.
    pub fn tensor_dimension(&self, index: usize) -> MlResult<&[u32]> {
        let rank = self.rank_limit();
        Ok(&self.entry(index)?.dimension[..rank])
    }

    /// Sets the dimensions of the tensor at `index`. Axes not covered by
    /// `dimension` are set to `1`.
    pub fn set_tensor_dimension(&mut self, index: usize, dimension: &[u32]) -> MlResult<()> {
        let rank = self.rank_limit();
        if dimension.len() > rank {
            return Err(MlError::invalid(format!(
                "rank {} exceeds the rank limit {rank} of this descriptor",
                dimension.len()
            )));
        }
        let entry = self.entry_mut(index)?;
        entry.dimension = [1; TENSOR_RANK_LIMIT];
        entry.dimension[..dimension.len()].copy_from_slice(dimension);
        Ok(())
    }

    /// Appends a tensor and returns its index.
    pub fn push_tensor(&mut self, ty: TensorType, dimension: &[u32]) -> MlResult<usize> {
        let index = self.tensors.len();
        self.set_count(index + 1)?;
        let res = self
            .set_tensor_type(index, ty)
            .and_then(|_| self.set_tensor_dimension(index, dimension));
        if res.is_err() {
            self.tensors.truncate(index);
        }
        res.map(|_| index)
    }

    /// Byte size of the tensor at `index`, or of all tensors when `index` is `None`.
    pub fn tensor_size(&self, index: Option<usize>) -> MlResult<usize> {
        let rank = self.rank_limit();
        let size = match index {
            Some(index) => self.entry(index)?.byte_size(rank),
            None => self.total_size(),
        };
        size.ok_or_else(|| MlError::invalid("the tensor size does not fit in memory"))
    }

    /// Byte size of every tensor, in order.
    ///
    /// Sizes that overflow saturate at `usize::MAX`. A descriptor that passes
    /// [`TensorsInfo::validate`] never overflows.
    pub fn tensor_sizes(&self) -> Vec<usize> {
        let rank = self.rank_limit();
        self.tensors
            .iter()
            .map(|t| t.byte_size(rank).unwrap_or(usize::MAX))
            .collect()
    }

    fn total_size(&self) -> Option<usize> {
        let rank = self.rank_limit();
        self.tensors
            .iter()
            .try_fold(0usize, |total, t| total.checked_add(t.byte_size(rank)?))
    }

    pub fn validate(&self) -> MlResult<()> {
        if self.tensors.is_empty() {
            return Err(MlError::invalid("the descriptor holds no tensors"));
        }
        if self.tensors.len() > TENSOR_SIZE_LIMIT {
            return Err(MlError::invalid(format!(
                "the descriptor holds {} tensors, the limit is {TENSOR_SIZE_LIMIT}",
                self.tensors.len()
            )));
        }
        let rank = self.rank_limit();
        for (index, tensor) in self.tensors.iter().enumerate() {
            tensor
                .validate(rank)
                .map_err(|reason| MlError::invalid(format!("tensor {index}: {reason}")))?;
        }
        if self.total_size().is_none() {
            return Err(MlError::invalid("the total tensor size does not fit in memory"));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Dimensions in the textual form `3:224:224:1`, tensors separated by `,`.
    pub fn dimensions_string(&self) -> String {
        let rank = self.rank_limit();
        self.tensors
            .iter()
            .map(|t| dimension_to_string(&t.dimension[..rank]))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parses `3:224:224:1,10` style dimensions. The tensor count follows the
    /// number of entries; types and names of kept tensors are preserved.
    pub fn set_dimensions_str(&mut self, dims: &str) -> MlResult<()> {
        let rank = self.rank_limit();
        let parsed = split_list(dims)
            .map(|d| parse_dimension(d, rank))
            .collect::<MlResult<Vec<_>>>()?;
        self.set_count(parsed.len())?;
        for (index, dimension) in parsed.iter().enumerate() {
            self.set_tensor_dimension(index, dimension)?;
        }
        Ok(())
    }

    pub fn types_string(&self) -> String {
        self.tensors
            .iter()
            .map(|t| t.ty.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn set_types_str(&mut self, types: &str) -> MlResult<()> {
        let parsed = split_list(types)
            .map(|t| {
                TensorType::from_str(t)
                    .map_err(|_| MlError::invalid(format!("unknown tensor type '{t}'")))
            })
            .collect::<MlResult<Vec<_>>>()?;
        self.set_count(parsed.len())?;
        for (index, ty) in parsed.into_iter().enumerate() {
            self.set_tensor_type(index, ty)?;
        }
        Ok(())
    }

    pub fn names_string(&self) -> String {
        self.tensors
            .iter()
            .map(|t| t.name.as_deref().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn set_names_str(&mut self, names: &str) -> MlResult<()> {
        let parsed: Vec<&str> = split_list(names).collect();
        self.set_count(parsed.len())?;
        for (index, name) in parsed.into_iter().enumerate() {
            let name = (!name.is_empty()).then_some(name);
            self.set_tensor_name(index, name)?;
        }
        Ok(())
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim)
}

fn dimension_to_string(dimension: &[u32]) -> String {
    let shown = dimension
        .iter()
        .rposition(|d| *d != 1)
        .map_or(1, |last| last + 1)
        .max(dimension.len().min(TENSOR_RANK_LIMIT_PREV));
    dimension[..shown]
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(":")
}

fn parse_dimension(dims: &str, rank_limit: usize) -> MlResult<Vec<u32>> {
    let parsed = dims
        .split(':')
        .map(|d| match d.trim().parse::<u32>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(MlError::invalid(format!("invalid dimension '{d}' in '{dims}'"))),
        })
        .collect::<MlResult<Vec<_>>>()?;
    if parsed.len() > rank_limit {
        return Err(MlError::invalid(format!(
            "'{dims}' has rank {}, the limit is {rank_limit}",
            parsed.len()
        )));
    }
    Ok(parsed)
}
