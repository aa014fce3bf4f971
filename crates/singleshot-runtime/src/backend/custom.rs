use super::{Backend, BackendFactory};
use crate::error::{MlError, MlResult};
use crate::single::OpenOptions;
use crate::tensor::TensorsInfo;
use derive_new::new;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Inference function of a custom-easy model. Receives the input regions and
/// writes the pre-allocated output regions in place.
pub type CustomEasyFn =
    Arc<dyn Fn(&[&[u8]], &mut [Vec<u8>]) -> anyhow::Result<()> + Send + Sync + 'static>;

#[derive(new, Clone)]
struct CustomEasyModel {
    input: TensorsInfo,
    output: TensorsInfo,
    invoke: CustomEasyFn,
}

static MODELS: Lazy<RwLock<HashMap<String, CustomEasyModel>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `invoke` as a fixed-shape model named `name`.
///
/// The model is opened with [`Nnfw::CustomFilter`](super::Nnfw::CustomFilter)
/// and `name` as the model locator.
pub fn register_custom_easy<F>(
    name: &str,
    input: &TensorsInfo,
    output: &TensorsInfo,
    invoke: F,
) -> MlResult<()>
where
    F: Fn(&[&[u8]], &mut [Vec<u8>]) -> anyhow::Result<()> + Send + Sync + 'static,
{
    if name.is_empty() {
        return Err(MlError::invalid("a custom model needs a name"));
    }
    input.validate()?;
    output.validate()?;

    let mut models = MODELS.write()?;
    if models.contains_key(name) {
        return Err(MlError::invalid(format!(
            "a custom model named '{name}' is already registered"
        )));
    }
    models.insert(
        name.to_string(),
        CustomEasyModel::new(input.clone(), output.clone(), Arc::new(invoke)),
    );
    log::debug!("Registered custom model '{name}'");
    Ok(())
}

/// Removes a custom model. Engines already opened on it keep working.
pub fn unregister_custom_easy(name: &str) -> MlResult<()> {
    MODELS
        .write()?
        .remove(name)
        .map(|_| log::debug!("Unregistered custom model '{name}'"))
        .ok_or_else(|| MlError::invalid(format!("no custom model named '{name}'")))
}

pub(crate) struct CustomEasyFactory;

impl BackendFactory for CustomEasyFactory {
    fn open(&self, options: &OpenOptions) -> anyhow::Result<Box<dyn Backend>> {
        let name = options
            .models()
            .first()
            .ok_or_else(|| anyhow::anyhow!("no custom model name given"))?;
        let model = MODELS
            .read()
            .map_err(|e| anyhow::anyhow!("custom model table is poisoned: {e}"))?
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no custom model named '{name}'"))?;
        Ok(Box::new(CustomEasyBackend { model }))
    }
}

struct CustomEasyBackend {
    model: CustomEasyModel,
}

impl Backend for CustomEasyBackend {
    fn input_info(&self) -> TensorsInfo {
        self.model.input.clone()
    }

    fn output_info(&self) -> TensorsInfo {
        self.model.output.clone()
    }

    fn invoke(
        &mut self,
        input: &[&[u8]],
        output: &mut [Vec<u8>],
        _allow_backend_alloc: bool,
    ) -> anyhow::Result<()> {
        (self.model.invoke)(input, output)
    }
}
