//! Embedding-based similarity backend.
//!
//! Wraps an E5 model behind the `SimilarityOracle` seam: each normalized
//! document is embedded (mean-pooled, L2-normalized), and pairwise cosine
//! fills the matrix. Model weights and tokenizer are fetched on first use
//! and cached on disk; the loaded model is process-wide and read-only.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result as AnyResult;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{
    BertModel, Config as BertConfig, HiddenAct, PositionEmbeddingType,
};
use once_cell::sync::OnceCell;
use tokenizers::Tokenizer;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{DedupError, Result};
use crate::similarity::{SimilarityMatrix, SimilarityOracle};
use crate::TARGET_SIMILARITY;

static MODEL: OnceCell<Arc<BertModel>> = OnceCell::new();
static TOKENIZER: OnceCell<Arc<Tokenizer>> = OnceCell::new();

const MODEL_URL: &str =
    "https://huggingface.co/intfloat/e5-large-v2/resolve/main/model.safetensors";
const TOKENIZER_URL: &str =
    "https://huggingface.co/intfloat/e5-large-v2/resolve/main/tokenizer.json";

struct E5Config {
    model_path: String,
    tokenizer_path: String,
    dimensions: usize,
    max_length: usize,
    device: Device,
}

impl Default for E5Config {
    fn default() -> Self {
        Self {
            model_path: "models/e5-large-v2.safetensors".to_string(),
            tokenizer_path: "models/e5-tokenizer.json".to_string(),
            dimensions: 1024,
            max_length: 512,
            device: Device::Cpu,
        }
    }
}

impl E5Config {
    async fn ensure_models_exist(&self) -> AnyResult<()> {
        if !Path::new("models").exists() {
            fs::create_dir("models").await?;
        }

        if !Path::new(&self.model_path).exists() {
            info!(target: TARGET_SIMILARITY, "Downloading E5 model from {}", MODEL_URL);
            let response = reqwest::get(MODEL_URL).await?;
            let bytes = response.bytes().await?;
            fs::write(&self.model_path, bytes).await?;
            info!(target: TARGET_SIMILARITY, "Downloaded E5 model to {}", self.model_path);
        }

        if !Path::new(&self.tokenizer_path).exists() {
            info!(target: TARGET_SIMILARITY, "Downloading E5 tokenizer from {}", TOKENIZER_URL);
            let response = reqwest::get(TOKENIZER_URL).await?;
            let bytes = response.bytes().await?;
            fs::write(&self.tokenizer_path, bytes).await?;
            info!(target: TARGET_SIMILARITY, "Downloaded E5 tokenizer to {}", self.tokenizer_path);
        }

        Ok(())
    }

    fn load_model(&self) -> AnyResult<()> {
        let bert_config = BertConfig {
            hidden_size: self.dimensions,
            intermediate_size: 4096,
            max_position_embeddings: self.max_length,
            num_attention_heads: 16,
            num_hidden_layers: 24,
            vocab_size: 250000,
            layer_norm_eps: 1e-12,
            pad_token_id: 0,
            hidden_act: HiddenAct::Gelu,
            hidden_dropout_prob: 0.0,
            type_vocab_size: 1,
            initializer_range: 0.02,
            position_embedding_type: PositionEmbeddingType::Absolute,
            use_cache: false,
            classifier_dropout: None,
            model_type: None,
        };

        info!(target: TARGET_SIMILARITY, "Loading E5 model from {}", self.model_path);
        let tensors = candle_core::safetensors::load_buffer(
            &std::fs::read(&self.model_path)?,
            &self.device,
        )?;
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &self.device);
        let model = BertModel::load(vb, &bert_config)?;
        MODEL
            .set(Arc::new(model))
            .map_err(|_| anyhow::anyhow!("E5 model already initialized"))?;

        let tokenizer = Tokenizer::from_file(&self.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        TOKENIZER
            .set(Arc::new(tokenizer))
            .map_err(|_| anyhow::anyhow!("E5 tokenizer already initialized"))?;
        Ok(())
    }
}

/// Embedding-backed oracle. Construct via [`EmbeddingOracle::prepare`] so
/// the model files exist and the weights are loaded before any worker asks
/// for a matrix.
pub struct EmbeddingOracle {
    config: E5Config,
}

impl EmbeddingOracle {
    pub async fn prepare() -> AnyResult<Self> {
        let config = E5Config::default();
        if MODEL.get().is_none() {
            config.ensure_models_exist().await?;
            config.load_model()?;
        }
        Ok(Self { config })
    }

    fn embed(&self, text: &str) -> AnyResult<Vec<f32>> {
        let model = MODEL
            .get()
            .ok_or_else(|| anyhow::anyhow!("E5 model not initialized"))?;
        let tokenizer = TOKENIZER
            .get()
            .ok_or_else(|| anyhow::anyhow!("E5 tokenizer not initialized"))?;

        let prefixed_text = format!("passage: {}", text);
        let encoding = tokenizer
            .encode(prefixed_text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let input_ids = Tensor::new(
            encoding
                .get_ids()
                .iter()
                .map(|&x| x as i64)
                .collect::<Vec<_>>(),
            &self.config.device,
        )?
        .unsqueeze(0)?;
        let attention_mask = Tensor::new(
            encoding
                .get_attention_mask()
                .iter()
                .map(|&x| x as i64)
                .collect::<Vec<_>>(),
            &self.config.device,
        )?
        .unsqueeze(0)?;

        let hidden_state = model.forward(&input_ids, &attention_mask, None)?;

        // Mean-pool over the attention mask, then L2-normalize.
        let mask = attention_mask.unsqueeze(2)?.to_dtype(DType::F32)?;
        let masked = hidden_state.mul(&mask)?;
        let summed = masked.sum(1)?;
        let counts = mask.sum(1)?;
        let mean_pooled = summed.div(&counts)?;

        let norm = mean_pooled.sqr()?.sum_all()?.sqrt()?;
        let normalized = mean_pooled.broadcast_div(&norm)?;

        Ok(normalized.squeeze(0)?.to_vec1::<f32>()?)
    }
}

impl SimilarityOracle for EmbeddingOracle {
    fn name(&self) -> &'static str {
        "embedding"
    }

    fn similarity_matrix(&self, docs: &[String]) -> Result<SimilarityMatrix> {
        let start = Instant::now();

        // Empty documents stay as zero vectors so they score 0 everywhere.
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(docs.len());
        for doc in docs {
            if doc.is_empty() {
                vectors.push(None);
                continue;
            }
            let vector = self
                .embed(doc)
                .map_err(|e| DedupError::Compute(e.to_string()))?;
            if vector.len() != self.config.dimensions {
                return Err(DedupError::Compute(format!(
                    "unexpected embedding dimensions: got {}, expected {}",
                    vector.len(),
                    self.config.dimensions
                )));
            }
            vectors.push(Some(vector));
        }

        let mut matrix = SimilarityMatrix::new(docs.len());
        for i in 0..docs.len() {
            for j in (i + 1)..docs.len() {
                if let (Some(a), Some(b)) = (&vectors[i], &vectors[j]) {
                    // Vectors are unit-length, so cosine is a plain dot.
                    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                    matrix.set(i, j, f64::from(dot).clamp(0.0, 1.0));
                }
            }
        }

        debug!(
            target: TARGET_SIMILARITY,
            documents = docs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "embedding similarity matrix computed"
        );
        Ok(matrix)
    }
}
