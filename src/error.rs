use thiserror::Error;

/// Errors raised by the model resource and its capabilities.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Encode, decode or generate was called before the model became ready.
    #[error("model is not ready")]
    NotReady,

    /// `initialize` was called on a resource that already left `Unloaded`.
    #[error("model resource was already initialized")]
    AlreadyInitialized,

    #[error("failed to load model '{model}': {source}")]
    Load {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    /// Tokenizer or generator failure while the model was ready.
    #[error("{0}")]
    Backend(#[source] anyhow::Error),
}

/// Outcome taxonomy of a paraphrase request.
#[derive(Debug, Error)]
pub enum ParaphraseError {
    /// Client-correctable input problem.
    #[error("{0}")]
    InvalidInput(String),

    /// The model has not reached the ready state. Retryable.
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Failed to paraphrase text: {0}")]
    InferenceFailure(String),

    /// The model could not be loaded. Fatal for the process.
    #[error("{0}")]
    ResourceLoadFailure(String),
}

impl ParaphraseError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ParaphraseError::ServiceUnavailable(_) | ParaphraseError::InferenceFailure(_)
        )
    }
}

impl From<ModelError> for ParaphraseError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NotReady => ParaphraseError::ServiceUnavailable(
                "Model not loaded. Please wait for the service to initialize.".to_string(),
            ),
            ModelError::Backend(source) => ParaphraseError::InferenceFailure(format!("{source:#}")),
            other => ParaphraseError::ResourceLoadFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_map_to_request_taxonomy() {
        assert!(matches!(
            ParaphraseError::from(ModelError::NotReady),
            ParaphraseError::ServiceUnavailable(_)
        ));

        let err = ParaphraseError::from(ModelError::Backend(anyhow::anyhow!("out of memory")));
        assert_eq!(err.to_string(), "Failed to paraphrase text: out of memory");
        assert!(err.is_retryable());

        let err = ParaphraseError::from(ModelError::Load {
            model: "t5".to_string(),
            source: anyhow::anyhow!("404"),
        });
        assert!(matches!(err, ParaphraseError::ResourceLoadFailure(_)));
        assert!(!err.is_retryable());
    }
}
