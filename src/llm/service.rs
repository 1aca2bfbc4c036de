use std::sync::Arc;

use crate::error::{ModelError, ParaphraseError};
use crate::llm::decoding::{DecodingConfig, Strength};
use crate::llm::resource::ModelResource;

/// Instruction prefix expected by T5 paraphrase checkpoints.
pub const PARAPHRASE_PREFIX: &str = "paraphrase: ";

#[derive(Debug, Clone)]
pub struct ParaphraseRequest {
    pub text: String,
    pub strength: i64,
}

impl ParaphraseRequest {
    pub fn new(text: impl Into<String>, strength: i64) -> Self {
        Self {
            text: text.into(),
            strength,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParaphraseResult {
    pub paraphrase: String,
    pub original_text: String,
    pub strength: Strength,
}

#[derive(Clone)]
pub struct ParaphraseService {
    resource: Arc<ModelResource>,
}

impl ParaphraseService {
    pub fn new(resource: Arc<ModelResource>) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &Arc<ModelResource> {
        &self.resource
    }

    /// Runs one paraphrase. Blocking: generation may take seconds.
    ///
    /// Cheap checks run first: empty text, then model readiness. Failures after
    /// that point are reported as `InferenceFailure` and never retried here.
    pub fn paraphrase(&self, request: &ParaphraseRequest) -> Result<ParaphraseResult, ParaphraseError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(ParaphraseError::InvalidInput("Text cannot be empty".to_string()));
        }

        if !self.resource.is_ready() {
            return Err(ModelError::NotReady.into());
        }

        let strength = Strength::clamped(request.strength);
        tracing::info!(
            "Paraphrasing text (length: {}, strength: {})",
            text.chars().count(),
            strength.value()
        );

        let config = DecodingConfig::derive(strength);
        tracing::info!(
            "Generation params - temp: {:.2}, beams: {}, sample: {}",
            config.temperature,
            config.num_beams,
            config.do_sample
        );

        let paraphrase = self.run(text, &config).map_err(|err| {
            let err = ParaphraseError::from(err);
            tracing::error!("Error during paraphrasing: {}", err);
            err
        })?;

        tracing::info!(
            "Paraphrase generated successfully (length: {})",
            paraphrase.chars().count()
        );

        Ok(ParaphraseResult {
            paraphrase,
            original_text: text.to_string(),
            strength,
        })
    }

    fn run(&self, text: &str, config: &DecodingConfig) -> Result<String, ModelError> {
        let input_ids = self.resource.encode(&format!("{PARAPHRASE_PREFIX}{text}"))?;
        tracing::debug!(tokens = input_ids.len(), "Encoded input");

        let outputs = self.resource.generate(&input_ids, config)?;
        let first = outputs
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Backend(anyhow::anyhow!("generator returned no sequences")))?;

        self.resource.decode(&first)
    }
}
