//! Custom models shipped with the binary, opened with `--framework custom`.
use singleshot_runtime::{MlResult, TensorType, TensorsInfo, register_custom_easy};

pub const ADD2: &str = "add2";
pub const IDENTITY4: &str = "identity4";

fn float_info(len: u32) -> MlResult<TensorsInfo> {
    let mut info = TensorsInfo::new();
    info.push_tensor(TensorType::Float32, &[len])?;
    Ok(info)
}

pub fn register() -> MlResult<()> {
    let scalar = float_info(1)?;
    register_custom_easy(ADD2, &scalar, &scalar, |input, output| {
        let value = f32::from_ne_bytes(input[0].try_into()?);
        output[0].copy_from_slice(&(value + 2.0).to_ne_bytes());
        Ok(())
    })?;

    let vector = float_info(4)?;
    register_custom_easy(IDENTITY4, &vector, &vector, |input, output| {
        output[0].copy_from_slice(input[0]);
        Ok(())
    })?;

    log::debug!("Registered built-in models {ADD2} and {IDENTITY4}");
    Ok(())
}
