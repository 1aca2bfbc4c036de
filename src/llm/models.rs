use std::ops::Deref;
use std::sync::Arc;

use anyhow::Error;
use tokenizers::Tokenizer;

use crate::llm::decoding::DecodingConfig;

pub trait TextTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, Error>;
    /// Decodes token ids, dropping special tokens such as `</s>` and `<pad>`.
    fn decode(&self, ids: &[u32]) -> Result<String, Error>;
}

pub trait SequenceGenerator {
    /// Returns at most `config.num_return_sequences` output sequences.
    fn generate(&self, input_ids: &[u32], config: &DecodingConfig) -> Result<Vec<Vec<u32>>, Error>;
}

/// Produces the tokenizer/generator pair. Called once by `ModelResource::initialize`.
pub trait ModelLoader {
    fn model_name(&self) -> &str;
    fn load(&self) -> Result<LoadedModel, Error>;
}

/// The ready pair, shared read-only by every request.
#[derive(Clone)]
pub struct LoadedModel {
    pub tokenizer: Arc<dyn TextTokenizer + Send + Sync>,
    pub generator: Arc<dyn SequenceGenerator + Send + Sync>,
}

impl LoadedModel {
    pub fn new(
        tokenizer: impl TextTokenizer + Send + Sync + 'static,
        generator: impl SequenceGenerator + Send + Sync + 'static,
    ) -> Self {
        Self {
            tokenizer: Arc::new(tokenizer),
            generator: Arc::new(generator),
        }
    }
}

// `Tokenizer` only reaches the encode/decode of `TokenizerImpl` through `Deref`.
impl TextTokenizer for Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, Error> {
        let encoding = self.deref().encode(text, true).map_err(|e| anyhow::anyhow!(e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String, Error> {
        self.deref().decode(ids, true).map_err(|e| anyhow::anyhow!(e))
    }
}

/// Word-level tokenizer with T5-style `<pad>`/`</s>` specials and a trailing `</s>`.
#[cfg(test)]
pub(crate) fn word_level_tokenizer() -> Tokenizer {
    let json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "<pad>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 1, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 2, "content": "<unk>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "WhitespaceSplit"},
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                {"Sequence": {"id": "A", "type_id": 0}},
                {"SpecialToken": {"id": "</s>", "type_id": 0}}
            ],
            "pair": [
                {"Sequence": {"id": "A", "type_id": 0}},
                {"SpecialToken": {"id": "</s>", "type_id": 0}},
                {"Sequence": {"id": "B", "type_id": 0}},
                {"SpecialToken": {"id": "</s>", "type_id": 0}}
            ],
            "special_tokens": {
                "</s>": {"id": "</s>", "ids": [1], "tokens": ["</s>"]}
            }
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {
                "<pad>": 0, "</s>": 1, "<unk>": 2,
                "paraphrase:": 3, "hello": 4, "world": 5, "again": 6
            },
            "unk_token": "<unk>"
        }
    });
    json.to_string().parse().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_encodes_with_trailing_eos() {
        let tokenizer = word_level_tokenizer();
        let ids = TextTokenizer::encode(&tokenizer, "paraphrase: hello world").unwrap();
        assert_eq!(ids, vec![3, 4, 5, 1]);
    }

    #[test]
    fn tokenizer_decode_drops_special_tokens() {
        let tokenizer = word_level_tokenizer();
        let text = TextTokenizer::decode(&tokenizer, &[0, 4, 5, 6, 1, 0, 0]).unwrap();
        assert_eq!(text, "hello world again");
    }

    #[test]
    fn tokenizer_maps_unknown_words() {
        let tokenizer = word_level_tokenizer();
        let ids = TextTokenizer::encode(&tokenizer, "hello zebra").unwrap();
        assert_eq!(ids, vec![4, 2, 1]);
        assert_eq!(TextTokenizer::decode(&tokenizer, &ids).unwrap(), "hello");
    }
}
