use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_MODEL_ID: &str = "ramsrigouthamg/t5_paraphraser";

#[derive(Parser, Debug, Clone)]
#[command(name = "paraphrase_serve")]
#[command(about = "Text paraphrasing service backed by a T5 model", long_about = None)]
#[command(version)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "PARAPHRASE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, env = "PARAPHRASE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Hugging Face model repository holding the T5 paraphraser
    #[arg(short, long, env = "PARAPHRASE_MODEL", default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,

    /// Repository to take tokenizer.json from; an empty value uses the model repository
    #[arg(long, env = "PARAPHRASE_TOKENIZER", default_value = "t5-base")]
    pub tokenizer_id: Option<String>,

    #[arg(long, env = "PARAPHRASE_REVISION", default_value = "main")]
    pub revision: String,

    /// Run on CPU even if a GPU is available
    #[arg(long, env = "PARAPHRASE_CPU")]
    pub cpu: bool,

    /// Fixed seed for sampled paraphrases
    #[arg(long, env = "PARAPHRASE_SEED")]
    pub seed: Option<u64>,

    /// Per-request generation timeout in seconds (0 disables it)
    #[arg(long, env = "PARAPHRASE_REQUEST_TIMEOUT", default_value_t = 120)]
    pub request_timeout_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "PARAPHRASE_LOG", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(addr)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}
