use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use serde::Serialize;

use crate::error::ModelError;
use crate::llm::decoding::DecodingConfig;
use crate::llm::models::{LoadedModel, ModelLoader};

enum ResourceState {
    Unloaded,
    Loading,
    Ready(LoadedModel),
    Failed(String),
}

/// Snapshot of the resource lifecycle, safe to hand out to health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    Failed { reason: String },
}

impl ModelStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ModelStatus::Unloaded => "unloaded",
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Failed { .. } => "failed",
        }
    }
}

/// Owns the tokenizer/generator pair for the lifetime of the process.
///
/// The state moves `Unloaded -> Loading -> Ready` or `Unloaded -> Loading -> Failed`
/// exactly once. The lock is only held to flip or read the state, never while the
/// loader or the generator runs, so status queries stay responsive during loading.
pub struct ModelResource {
    model_name: String,
    loader: Box<dyn ModelLoader + Send + Sync>,
    state: RwLock<ResourceState>,
}

impl ModelResource {
    pub fn new(loader: impl ModelLoader + Send + Sync + 'static) -> Self {
        Self {
            model_name: loader.model_name().to_string(),
            loader: Box::new(loader),
            state: RwLock::new(ResourceState::Unloaded),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Loads the model. Blocking; run it off the async runtime.
    pub fn initialize(&self) -> Result<(), ModelError> {
        {
            let mut state = self.write_state();
            if !matches!(*state, ResourceState::Unloaded) {
                return Err(ModelError::AlreadyInitialized);
            }
            *state = ResourceState::Loading;
        }

        tracing::info!(
            "Loading model '{}'... (this may take a few minutes on first run)",
            self.model_name
        );
        let started = Instant::now();

        match self.loader.load() {
            Ok(model) => {
                *self.write_state() = ResourceState::Ready(model);
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model loaded successfully!"
                );
                Ok(())
            }
            Err(source) => {
                let reason = format!("{source:#}");
                tracing::error!("Failed to load model: {}", reason);
                *self.write_state() = ResourceState::Failed(reason);
                Err(ModelError::Load {
                    model: self.model_name.clone(),
                    source,
                })
            }
        }
    }

    pub fn state(&self) -> ModelStatus {
        match &*self.read_state() {
            ResourceState::Unloaded => ModelStatus::Unloaded,
            ResourceState::Loading => ModelStatus::Loading,
            ResourceState::Ready(_) => ModelStatus::Ready,
            ResourceState::Failed(reason) => ModelStatus::Failed {
                reason: reason.clone(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.read_state(), ResourceState::Ready(_))
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        self.loaded()?
            .tokenizer
            .encode(text)
            .map_err(ModelError::Backend)
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String, ModelError> {
        self.loaded()?
            .tokenizer
            .decode(ids)
            .map_err(ModelError::Backend)
    }

    pub fn generate(
        &self,
        input_ids: &[u32],
        config: &DecodingConfig,
    ) -> Result<Vec<Vec<u32>>, ModelError> {
        self.loaded()?
            .generator
            .generate(input_ids, config)
            .map_err(ModelError::Backend)
    }

    fn loaded(&self) -> Result<LoadedModel, ModelError> {
        match &*self.read_state() {
            ResourceState::Ready(model) => Ok(model.clone()),
            _ => Err(ModelError::NotReady),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ResourceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ResourceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
