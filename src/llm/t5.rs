use std::fs::File;
use std::path::PathBuf;

use anyhow::Error;
use candle_core::{DType, Device, Result as CandleResult, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5::{self, T5ForConditionalGeneration};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use rand::{rngs::StdRng, SeedableRng};
use tokenizers::{Tokenizer, TruncationParams};

use crate::config::ServerConfig;
use crate::llm::decoding::{DecodingConfig, MAX_LENGTH};
use crate::llm::inference::beam_search;
use crate::llm::models::{LoadedModel, ModelLoader, SequenceGenerator};

/// Fetches a T5 checkpoint and its tokenizer from the Hugging Face hub.
pub struct T5Loader {
    pub model_id: String,
    pub tokenizer_id: Option<String>,
    pub revision: String,
    pub device: Device,
    pub seed: Option<u64>,
}

impl T5Loader {
    pub fn from_config(config: &ServerConfig, device: Device) -> Self {
        Self {
            model_id: config.model_id.clone(),
            tokenizer_id: config.tokenizer_id.clone().filter(|id| !id.is_empty()),
            revision: config.revision.clone(),
            device,
            seed: config.seed,
        }
    }

    fn load_weights(&self, repo: &ApiRepo) -> Result<VarBuilder<'static>, Error> {
        match repo.get("model.safetensors") {
            Ok(path) => {
                tracing::info!("Weights downloaded from: {:?}", path);
                let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, &self.device)? };
                Ok(vb)
            }
            Err(err) => {
                tracing::warn!("No safetensors weights ({}), falling back to pytorch_model.bin", err);
                let path = repo.get("pytorch_model.bin")?;
                tracing::info!("Weights downloaded from: {:?}", path);
                Ok(VarBuilder::from_pth(path, DType::F32, &self.device)?)
            }
        }
    }

    fn tokenizer_path(&self, api: &Api, repo: &ApiRepo) -> Result<PathBuf, Error> {
        let path = match &self.tokenizer_id {
            Some(id) => api.model(id.clone()).get("tokenizer.json")?,
            None => repo.get("tokenizer.json")?,
        };
        Ok(path)
    }
}

impl ModelLoader for T5Loader {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    fn load(&self) -> Result<LoadedModel, Error> {
        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            self.model_id.clone(),
            RepoType::Model,
            self.revision.clone(),
        ));

        let config_path = repo.get("config.json")?;
        let mut cfg = serde_json::from_reader::<File, t5::Config>(File::open(&config_path)?)?;
        // Every decoding step re-feeds the full prefix, so the decoder keeps no cache.
        cfg.use_cache = false;
        tracing::debug!("Model config: {:?}", cfg);

        let vb = self.load_weights(&repo)?;
        let model = T5ForConditionalGeneration::load(vb, &cfg)?;

        let tokenizer = load_tokenizer(self.tokenizer_path(&api, &repo)?)?;

        let generator = T5Generator::new(model, &cfg, self.device.clone(), self.seed);

        Ok(LoadedModel::new(tokenizer, generator))
    }
}

fn load_tokenizer(path: PathBuf) -> Result<Tokenizer, Error> {
    let tokenizer = Tokenizer::from_file(&path).map_err(|e| anyhow::anyhow!(e))?;
    configure_tokenizer(tokenizer)
}

/// Inputs longer than the model window are cut, keeping the trailing `</s>`.
fn configure_tokenizer(mut tokenizer: Tokenizer) -> Result<Tokenizer, Error> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_LENGTH,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!(e))?;
    tokenizer.with_padding(None);
    Ok(tokenizer)
}

pub struct T5Generator {
    model: T5ForConditionalGeneration,
    device: Device,
    decoder_start_token_id: u32,
    eos_token_id: u32,
    seed: Option<u64>,
}

impl T5Generator {
    pub fn new(model: T5ForConditionalGeneration, cfg: &t5::Config, device: Device, seed: Option<u64>) -> Self {
        Self {
            model,
            device,
            decoder_start_token_id: cfg.decoder_start_token_id.unwrap_or(cfg.pad_token_id) as u32,
            eos_token_id: cfg.eos_token_id as u32,
            seed,
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

impl SequenceGenerator for T5Generator {
    fn generate(&self, input_ids: &[u32], config: &DecodingConfig) -> Result<Vec<Vec<u32>>, Error> {
        // Weights are reference counted; the clone only gives this call its own scratch state.
        let mut model = self.model.clone();
        model.clear_kv_cache();

        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encode(&input)?;

        let mut rng = self.rng();
        let device = &self.device;
        let sequences = beam_search(
            self.decoder_start_token_id,
            self.eos_token_id,
            config,
            &mut rng,
            |prefixes: &[Vec<u32>]| -> CandleResult<Vec<Vec<f32>>> {
                let batch = prefixes.len();
                let len = prefixes.first().map_or(0, Vec::len);
                let decoder_ids = Tensor::from_vec(prefixes.concat(), (batch, len), device)?;
                let encoder_output = if batch == 1 {
                    encoder_output.clone()
                } else {
                    encoder_output.repeat((batch, 1, 1))?
                };
                model
                    .decode(&decoder_ids, &encoder_output)?
                    .to_dtype(DType::F32)?
                    .to_vec2::<f32>()
            },
        )?;

        tracing::debug!(
            input_tokens = input_ids.len(),
            output_tokens = sequences.first().map_or(0, Vec::len),
            "Generation finished"
        );
        Ok(sequences)
    }
}

#[cfg(test)]
mod tests {
    use candle_nn::VarMap;

    use super::*;
    use crate::llm::decoding::Strength;
    use crate::llm::models::{word_level_tokenizer, TextTokenizer};

    const VOCAB: usize = 32;

    fn tiny_config() -> t5::Config {
        serde_json::from_value(serde_json::json!({
            "vocab_size": VOCAB,
            "d_model": 8,
            "d_kv": 4,
            "d_ff": 16,
            "num_layers": 1,
            "num_decoder_layers": 1,
            "num_heads": 2,
            "relative_attention_num_buckets": 8,
            "relative_attention_max_distance": 16,
            "dropout_rate": 0.0,
            "layer_norm_epsilon": 1e-6,
            "initializer_factor": 1.0,
            "feed_forward_proj": "relu",
            "tie_word_embeddings": true,
            "is_decoder": false,
            "is_encoder_decoder": true,
            "use_cache": false,
            "pad_token_id": 0,
            "eos_token_id": 1,
            "decoder_start_token_id": 0
        }))
        .unwrap()
    }

    fn tiny_generator() -> T5Generator {
        let cfg = tiny_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = T5ForConditionalGeneration::load(vb, &cfg).unwrap();
        T5Generator::new(model, &cfg, Device::Cpu, Some(7))
    }

    #[test]
    fn generator_returns_one_sequence_for_each_decoding_mode() {
        let generator = tiny_generator();
        // 0: four-beam search, 35: four-beam sampling, 80: two-beam sampling.
        for strength in [0u8, 35, 80] {
            let mut config = DecodingConfig::derive(Strength::from(strength));
            config.max_length = 6;

            let out = generator.generate(&[3, 4, 5, 1], &config).unwrap();

            assert_eq!(out.len(), 1, "strength {strength}");
            assert!(out[0].len() <= 6, "strength {strength}: {:?}", out[0]);
            assert!(out[0].iter().all(|&t| (t as usize) < VOCAB && t != 1));
        }
    }

    #[test]
    fn seeded_generator_is_reproducible() {
        let generator = tiny_generator();
        let mut config = DecodingConfig::derive(Strength::from(90));
        config.max_length = 5;

        let first = generator.generate(&[4, 5, 1], &config).unwrap();
        let second = generator.generate(&[4, 5, 1], &config).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn generator_reads_special_tokens_from_config() {
        let generator = tiny_generator();
        assert_eq!(generator.decoder_start_token_id, 0);
        assert_eq!(generator.eos_token_id, 1);
    }

    #[test]
    fn configured_tokenizer_truncates_to_model_window() {
        let tokenizer = configure_tokenizer(word_level_tokenizer()).unwrap();
        let text = vec!["hello"; 600].join(" ");

        let ids = TextTokenizer::encode(&tokenizer, &text).unwrap();

        assert_eq!(ids.len(), MAX_LENGTH);
        assert_eq!(ids.last(), Some(&1));
        assert!(ids[..MAX_LENGTH - 1].iter().all(|&id| id == 4));
    }

    #[test]
    fn configured_tokenizer_keeps_short_inputs() {
        let tokenizer = configure_tokenizer(word_level_tokenizer()).unwrap();
        let ids = TextTokenizer::encode(&tokenizer, "paraphrase: hello world").unwrap();
        assert_eq!(ids, vec![3, 4, 5, 1]);
    }
}
