use super::SingleShot;
use super::core::reconfigure;
use crate::error::{MlError, MlResult};
use std::time::Duration;

impl SingleShot {
    /// Reads a property of the engine, falling back to the backend for keys
    /// the engine does not know.
    ///
    /// Engine keys: `input`, `inputtype`, `inputname`, `output`, `outputtype`,
    /// `outputname`, `timeout` (milliseconds), `framework`, `accelerator`.
    pub fn get_property(&self, key: &str) -> MlResult<String> {
        let engine = self.engine();
        let slot = engine.acquire(false)?;
        let value = match key {
            "input" => slot.in_info.dimensions_string(),
            "inputtype" => slot.in_info.types_string(),
            "inputname" => slot.in_info.names_string(),
            "output" => slot.out_info.dimensions_string(),
            "outputtype" => slot.out_info.types_string(),
            "outputname" => slot.out_info.names_string(),
            "timeout" => slot.timeout.as_millis().to_string(),
            "framework" => engine.framework.to_string(),
            "accelerator" => engine.accelerator.to_string(),
            _ => {
                if slot.state.is_running() {
                    return Err(MlError::TryAgain);
                }
                let backend = slot.backend()?;
                backend.lock()?.get_property(key)?
            }
        };
        Ok(value)
    }

    /// Writes a property. Changing `input` or `inputtype` renegotiates the
    /// input shape like [`SingleShot::set_input_info`].
    pub fn set_property(&self, key: &str, value: &str) -> MlResult<()> {
        let mut slot = self.engine().acquire(false)?;
        // Descriptors and the backend are off limits while the worker runs.
        if slot.state.is_running() && key != "timeout" {
            return Err(MlError::TryAgain);
        }
        match key {
            "input" | "inputtype" => {
                let mut info = slot.in_info.clone();
                if key == "input" {
                    info.set_dimensions_str(value)?;
                } else {
                    info.set_types_str(value)?;
                }
                info.validate()?;
                reconfigure(&mut slot, &info)
            }
            "inputname" => slot.in_info.set_names_str(value),
            "outputname" => slot.out_info.set_names_str(value),
            "timeout" => {
                let millis: u64 = value.trim().parse().map_err(|_| {
                    MlError::invalid(format!("'{value}' is not a timeout in milliseconds"))
                })?;
                slot.timeout = Duration::from_millis(millis);
                Ok(())
            }
            "output" | "outputtype" => Err(MlError::unsupported(
                "the output shape follows the input shape and cannot be set",
            )),
            "framework" | "accelerator" => Err(MlError::unsupported(format!(
                "'{key}' is fixed when the model is opened"
            ))),
            _ => {
                let backend = slot.backend()?;
                let mut backend = backend.lock()?;
                backend.set_property(key, value)
            }
        }
    }
}
