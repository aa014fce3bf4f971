pub mod bench;
pub mod describe;
pub mod invoke;

use anyhow::Context as _;
use singleshot_runtime::{TensorType, TensorsData, TensorsInfo};

/// Parses `1.0,2.5` style value lists.
pub fn parse_values(values: &str) -> anyhow::Result<Vec<f32>> {
    values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<f32>()
                .with_context(|| format!("'{v}' is not a number"))
        })
        .collect()
}

/// Fills a new input frame of `info` with `values`, tensor after tensor.
pub fn build_input(info: &TensorsInfo, values: &[f32]) -> anyhow::Result<TensorsData> {
    let mut data = TensorsData::new(info)?;
    let expected: usize = info
        .tensor_sizes()
        .iter()
        .map(|size| size / TensorType::Float32.element_size())
        .sum();

    for (index, tensor) in info.tensors().iter().enumerate() {
        anyhow::ensure!(
            tensor.ty == TensorType::Float32,
            "input tensor {index} is {}, only float32 inputs can be given as values",
            tensor.ty
        );
    }
    anyhow::ensure!(
        values.len() == expected,
        "the model takes {expected} values, {} were given",
        values.len()
    );

    let mut remaining = values;
    for (index, size) in info.tensor_sizes().into_iter().enumerate() {
        let (head, tail) = remaining.split_at(size / TensorType::Float32.element_size());
        let bytes: Vec<u8> = head.iter().flat_map(|v| v.to_ne_bytes()).collect();
        data.set_tensor(index, &bytes)?;
        remaining = tail;
    }
    Ok(data)
}

/// Human readable rendering of one output tensor.
pub fn format_tensor(data: &TensorsData, index: usize) -> anyhow::Result<String> {
    let bytes = data.tensor(index)?;
    let rendered = match data.info().tensor_type(index)? {
        TensorType::Float32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]).to_string())
            .collect::<Vec<_>>(),
        _ => bytes.iter().map(|b| format!("{b:#04x}")).collect(),
    };
    Ok(format!("[{}]", rendered.join(", ")))
}
