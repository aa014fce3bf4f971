use super::BackendFactory;
use super::custom::CustomEasyFactory;
use crate::error::{MlError, MlResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Neural network framework behind a model.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Nnfw {
    /// Resolved from the model file extension.
    #[default]
    Any,
    #[strum(to_string = "custom", serialize = "custom-filter", serialize = "custom-easy")]
    CustomFilter,
    #[strum(to_string = "tensorflow-lite", serialize = "tflite")]
    TensorflowLite,
    Tensorflow,
    Nnfw,
    Mvnc,
    #[strum(to_string = "openvino")]
    OpenVino,
    Vivante,
    #[strum(to_string = "edgetpu")]
    EdgeTpu,
    #[strum(to_string = "armnn")]
    ArmNn,
    Snpe,
    Pytorch,
    #[strum(to_string = "nntrainer")]
    NntrInf,
    #[strum(to_string = "vd-aifw")]
    VdAifw,
    TrixEngine,
    Mxnet,
    Tvm,
    Snap,
}

impl Nnfw {
    /// Guesses the framework from the extension of a model file.
    pub fn from_model_path(model: &str) -> Option<Nnfw> {
        let ext = Path::new(model).extension()?.to_str()?.to_ascii_lowercase();
        let nnfw = match ext.as_str() {
            "tflite" => Nnfw::TensorflowLite,
            "pb" => Nnfw::Tensorflow,
            "pt" => Nnfw::Pytorch,
            "so" | "dylib" => Nnfw::CustomFilter,
            "circle" | "nnpackage" => Nnfw::Nnfw,
            "xml" | "bin" => Nnfw::OpenVino,
            "dlc" => Nnfw::Snpe,
            "tvn" => Nnfw::TrixEngine,
            "nb" => Nnfw::Vivante,
            "graph" => Nnfw::Mvnc,
            "ini" => Nnfw::NntrInf,
            "params" | "json" => Nnfw::Mxnet,
            _ => return None,
        };
        Some(nnfw)
    }
}

/// Accelerator a backend should run on.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Hardware {
    #[default]
    #[strum(serialize = "any")]
    Any,
    #[strum(serialize = "auto")]
    Auto,
    #[strum(serialize = "cpu")]
    Cpu,
    #[strum(to_string = "cpu.simd", serialize = "cpu.neon")]
    CpuSimd,
    #[strum(serialize = "gpu")]
    Gpu,
    #[strum(serialize = "npu")]
    Npu,
    #[strum(serialize = "npu.movidius")]
    NpuMovidius,
    #[strum(serialize = "npu.edgetpu")]
    NpuEdgeTpu,
    #[strum(serialize = "npu.vivante")]
    NpuVivante,
    #[strum(serialize = "npu.slsi")]
    NpuSlsi,
    #[strum(serialize = "npu.sr")]
    NpuSr,
}

type FactoryMap = HashMap<Nnfw, Arc<dyn BackendFactory>>;

static FACTORIES: Lazy<RwLock<FactoryMap>> = Lazy::new(|| {
    let mut factories: FactoryMap = HashMap::new();
    factories.insert(Nnfw::CustomFilter, Arc::new(CustomEasyFactory));
    RwLock::new(factories)
});

/// Registers the factory opening backends of kind `nnfw`, replacing any
/// previous one.
pub fn register_backend(nnfw: Nnfw, factory: Arc<dyn BackendFactory>) -> MlResult<()> {
    if nnfw == Nnfw::Any {
        return Err(MlError::invalid("cannot register a backend for 'any'"));
    }
    if FACTORIES.write()?.insert(nnfw, factory).is_some() {
        log::debug!("Replaced the backend registered for '{nnfw}'");
    } else {
        log::debug!("Registered a backend for '{nnfw}'");
    }
    Ok(())
}

/// Removes the factory of kind `nnfw`. Returns whether one was registered.
pub fn unregister_backend(nnfw: Nnfw) -> bool {
    match FACTORIES.write() {
        Ok(mut factories) => factories.remove(&nnfw).is_some(),
        Err(_) => false,
    }
}

/// Whether a backend of kind `nnfw` is registered and runs on `hardware`.
pub fn check_nnfw_availability(nnfw: Nnfw, hardware: Hardware) -> bool {
    find_factory(nnfw)
        .map(|factory| factory.supports(hardware))
        .unwrap_or(false)
}

pub(crate) fn find_factory(nnfw: Nnfw) -> MlResult<Arc<dyn BackendFactory>> {
    FACTORIES
        .read()?
        .get(&nnfw)
        .cloned()
        .ok_or_else(|| MlError::unsupported(format!("no backend is registered for '{nnfw}'")))
}
