use crate::backend::{Hardware, Nnfw};
use crate::error::{MlError, MlResult};
use crate::tensor::TensorsInfo;
use std::time::Duration;

/// Everything needed to open a [`SingleShot`](super::SingleShot).
///
/// ```
/// # use singleshot_runtime::{Hardware, Nnfw, OpenOptions};
/// # use std::time::Duration;
/// let options = OpenOptions::new("mobilenet.tflite")
///     .with_nnfw(Nnfw::TensorflowLite)
///     .with_hardware(Hardware::Cpu)
///     .with_timeout(Duration::from_millis(500))
///     .with_custom("NumThreads", "2");
/// assert_eq!(options.custom("NumThreads"), Some("2"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct OpenOptions {
    models: Vec<String>,
    input_info: Option<TensorsInfo>,
    output_info: Option<TensorsInfo>,
    nnfw: Nnfw,
    hardware: Hardware,
    timeout: Duration,
    custom: Vec<(String, String)>,
}

impl OpenOptions {
    /// `model` may list several files separated by `,`, as some frameworks
    /// split a model across files.
    pub fn new(model: &str) -> Self {
        Self {
            models: model
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect(),
            ..Default::default()
        }
    }

    /// Input shape to negotiate with the backend instead of the model's own.
    pub fn with_input_info(mut self, info: TensorsInfo) -> Self {
        self.input_info = Some(info);
        self
    }

    /// Output shape the caller expects. Opening fails if the model disagrees.
    pub fn with_output_info(mut self, info: TensorsInfo) -> Self {
        self.output_info = Some(info);
        self
    }

    pub fn with_nnfw(mut self, nnfw: Nnfw) -> Self {
        self.nnfw = nnfw;
        self
    }

    pub fn with_hardware(mut self, hardware: Hardware) -> Self {
        self.hardware = hardware;
        self
    }

    /// Initial invoke timeout. Zero waits indefinitely.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Backend specific option, replacing an earlier value for `key`.
    pub fn with_custom(mut self, key: &str, value: &str) -> Self {
        self.custom.retain(|(k, _)| k != key);
        self.custom.push((key.to_string(), value.to_string()));
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn input_info(&self) -> Option<&TensorsInfo> {
        self.input_info.as_ref()
    }

    pub fn output_info(&self) -> Option<&TensorsInfo> {
        self.output_info.as_ref()
    }

    pub fn nnfw(&self) -> Nnfw {
        self.nnfw
    }

    pub fn hardware(&self) -> Hardware {
        self.hardware
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn custom(&self, key: &str) -> Option<&str> {
        self.custom
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn custom_options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.custom.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Framework to open the model with, guessing from the first model file
    /// when [`Nnfw::Any`] was requested.
    pub(crate) fn resolve_nnfw(&self) -> MlResult<Nnfw> {
        let Some(model) = self.models.first() else {
            return Err(MlError::invalid("no model was given"));
        };
        match self.nnfw {
            Nnfw::Any => Nnfw::from_model_path(model).ok_or_else(|| {
                MlError::invalid(format!(
                    "cannot tell the framework of '{model}' from its extension"
                ))
            }),
            nnfw => Ok(nnfw),
        }
    }
}
