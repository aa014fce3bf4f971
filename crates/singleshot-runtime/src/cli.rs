use crate::backend::{Hardware, Nnfw};
use crate::error::{MlError, MlResult};
use crate::single::OpenOptions;
use crate::tensor::TensorsInfo;
use clap::Args;
use std::time::Duration;

/// Command line form of [`OpenOptions`].
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model file(s), separated by `,`, or the name of a custom model
    pub model: String,
    #[arg(long, default_value = "any")]
    pub framework: Nnfw,
    #[arg(long, default_value = "any")]
    pub hardware: Hardware,
    /// Input dimensions, e.g. `3:224:224:1`
    #[arg(long)]
    pub input_dims: Option<String>,
    /// Input element types, e.g. `uint8`
    #[arg(long)]
    pub input_types: Option<String>,
    #[arg(long)]
    pub output_dims: Option<String>,
    #[arg(long)]
    pub output_types: Option<String>,
    /// Invoke timeout in milliseconds, 0 waits indefinitely
    #[arg(long, default_value_t = 0)]
    pub timeout_ms: u64,
    /// Backend option as `key=value`, may be repeated
    #[arg(long, value_name = "KEY=VALUE")]
    pub custom: Vec<String>,
}

impl ModelArgs {
    pub fn to_options(&self) -> MlResult<OpenOptions> {
        let mut options = OpenOptions::new(&self.model)
            .with_nnfw(self.framework)
            .with_hardware(self.hardware)
            .with_timeout(Duration::from_millis(self.timeout_ms));

        if let Some(info) = parse_info("input", &self.input_dims, &self.input_types)? {
            options = options.with_input_info(info);
        }
        if let Some(info) = parse_info("output", &self.output_dims, &self.output_types)? {
            options = options.with_output_info(info);
        }
        for pair in &self.custom {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                MlError::invalid(format!("custom option '{pair}' is not in the form key=value"))
            })?;
            options = options.with_custom(key.trim(), value.trim());
        }
        Ok(options)
    }
}

fn parse_info(
    what: &str,
    dims: &Option<String>,
    types: &Option<String>,
) -> MlResult<Option<TensorsInfo>> {
    let (dims, types) = match (dims, types) {
        (None, None) => return Ok(None),
        (Some(dims), Some(types)) => (dims, types),
        _ => {
            return Err(MlError::invalid(format!(
                "--{what}-dims and --{what}-types must be given together"
            )));
        }
    };
    let mut info = TensorsInfo::new();
    info.set_dimensions_str(dims)?;
    let count = info.count();
    info.set_types_str(types)?;
    if info.count() != count {
        return Err(MlError::invalid(format!(
            "{count} {what} dimensions but {} {what} types",
            info.count()
        )));
    }
    info.validate()?;
    Ok(Some(info))
}
