//! Local embedding generation using all-MiniLM-L6-v2 via candle.
//!
//! Short email texts (subject + snippet) embed to 384-dimensional unit-length
//! vectors entirely on-device; no API quota is spent on the clustering pass.

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, HiddenAct, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::OnceLock;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

const MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
const REVISION: &str = "main";

/// Output dimensionality of the MiniLM sentence encoder
pub const EMBEDDING_DIM: usize = 384;

/// Texts per forward pass; keeps peak tensor memory bounded on large scans
const ENCODE_CHUNK: usize = 64;

/// Anything that can turn a batch of texts into one vector per text,
/// in input order. Implemented by [`LocalEmbedder`] in production and by
/// deterministic stubs in tests.
pub trait TextEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String>;
}

/// Global model instance (lazy loaded)
static EMBEDDER: OnceLock<Result<LocalEmbedder, String>> = OnceLock::new();

/// MiniLM sentence encoder held in process for the session lifetime
pub struct LocalEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LocalEmbedder {
    /// Load model from Hugging Face Hub (downloads on first use).
    /// A load failure here is fatal to the clustering run.
    pub fn new() -> Result<Self, String> {
        let device = Device::Cpu;

        let api = Api::new().map_err(|e| format!("Failed to create HF API: {}", e))?;
        let repo = api.repo(Repo::with_revision(
            MODEL_ID.to_string(),
            RepoType::Model,
            REVISION.to_string(),
        ));

        let config_path = repo
            .get("config.json")
            .map_err(|e| format!("Failed to download config: {}", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| format!("Failed to download tokenizer: {}", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| format!("Failed to download weights: {}", e))?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| format!("Failed to read config: {}", e))?;
        let mut config: Config =
            serde_json::from_str(&config_str).map_err(|e| format!("Failed to parse config: {}", e))?;

        // MiniLM uses gelu activation
        config.hidden_act = HiddenAct::Gelu;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| format!("Failed to load tokenizer: {}", e))?;

        let padding = PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        };
        let truncation = TruncationParams {
            max_length: 512,
            ..Default::default()
        };
        tokenizer.with_padding(Some(padding));
        tokenizer
            .with_truncation(Some(truncation))
            .map_err(|e| format!("Failed to set truncation: {}", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .map_err(|e| format!("Failed to load weights: {}", e))?
        };

        let model = BertModel::load(vb, &config)
            .map_err(|e| format!("Failed to build model: {}", e))?;

        println!("[Embeddings] Model loaded: {}", MODEL_ID);

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Encode one chunk of texts into normalized vectors
    fn encode_chunk(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| format!("Tokenization failed: {}", e))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let mut all_ids = Vec::with_capacity(batch_size * seq_len);
        let mut all_mask = Vec::with_capacity(batch_size * seq_len);
        let mut all_type_ids = Vec::with_capacity(batch_size * seq_len);

        for encoding in &encodings {
            all_ids.extend(encoding.get_ids().iter().map(|&x| x as i64));
            all_mask.extend(encoding.get_attention_mask().iter().map(|&x| x as i64));
            all_type_ids.extend(encoding.get_type_ids().iter().map(|&x| x as i64));
        }

        let input_ids = Tensor::from_vec(all_ids, (batch_size, seq_len), &self.device)
            .map_err(|e| format!("Failed to create input_ids tensor: {}", e))?;
        let attention_mask = Tensor::from_vec(all_mask, (batch_size, seq_len), &self.device)
            .map_err(|e| format!("Failed to create attention_mask tensor: {}", e))?;
        let token_type_ids = Tensor::from_vec(all_type_ids, (batch_size, seq_len), &self.device)
            .map_err(|e| format!("Failed to create token_type_ids tensor: {}", e))?;

        let hidden_states = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| format!("Model forward failed: {}", e))?;

        let pooled = mean_pool(&hidden_states, &attention_mask)?;

        // L2 normalize so downstream cosine math can assume unit vectors
        let norm = pooled
            .sqr()
            .and_then(|t| t.sum_keepdim(1))
            .and_then(|t| t.sqrt())
            .and_then(|t| t.clamp(1e-12, f64::MAX))
            .map_err(|e| format!("Norm computation failed: {}", e))?;
        let normalized = pooled
            .broadcast_div(&norm)
            .map_err(|e| format!("Normalize failed: {}", e))?;

        let rows: Vec<Vec<f32>> = normalized
            .to_vec2()
            .map_err(|e| format!("To vec failed: {}", e))?;

        Ok(rows)
    }
}

/// Attention-masked mean pooling over the token dimension
fn mean_pool(hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor, String> {
    let mask_expanded = attention_mask
        .unsqueeze(2)
        .and_then(|t| t.to_dtype(DTYPE))
        .and_then(|t| t.broadcast_as(hidden_states.shape()))
        .map_err(|e| format!("Mask expansion failed: {}", e))?;

    let summed = hidden_states
        .mul(&mask_expanded)
        .and_then(|t| t.sum(1))
        .map_err(|e| format!("Masked sum failed: {}", e))?;

    let counts = mask_expanded
        .sum(1)
        .and_then(|t| t.clamp(1e-9, f64::MAX))
        .map_err(|e| format!("Mask count failed: {}", e))?;

    summed
        .div(&counts)
        .map_err(|e| format!("Pooling division failed: {}", e))
}

impl TextEmbedder for LocalEmbedder {
    /// Embed a batch of texts, one vector per input, same order.
    /// Empty input returns empty output without touching the model.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let mut results = Vec::with_capacity(texts.len());
        for chunk in refs.chunks(ENCODE_CHUNK) {
            results.extend(self.encode_chunk(chunk)?);
        }
        Ok(results)
    }
}

/// Get or initialize the global embedder.
/// Does NOT trigger a model download for empty workloads; callers short-circuit
/// empty input before reaching here.
pub fn get_embedder() -> Result<&'static LocalEmbedder, String> {
    EMBEDDER
        .get_or_init(LocalEmbedder::new)
        .as_ref()
        .map_err(|e| e.clone())
}

/// Check if the model is loaded
pub fn is_loaded() -> bool {
    EMBEDDER.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Model-dependent tests download MiniLM from the HF Hub; they are ignored
    // by default so the unit suite stays offline.

    #[test]
    #[ignore]
    fn test_embedding_dimension() {
        let embedder = get_embedder().unwrap();
        let out = embedder.embed(&["Hello, world!".to_string()]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), EMBEDDING_DIM);
    }

    #[test]
    #[ignore]
    fn test_embedding_normalized() {
        let embedder = get_embedder().unwrap();
        let out = embedder.embed(&["Test text".to_string()]).unwrap();
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    #[ignore]
    fn test_batch_order_preserved() {
        let embedder = get_embedder().unwrap();
        let texts: Vec<String> = vec!["alpha".into(), "beta".into(), "gamma".into()];
        let batch = embedder.embed(&texts).unwrap();
        let single = embedder.embed(&texts[1..2].to_vec()).unwrap();
        assert_eq!(batch.len(), 3);
        // The middle batch row matches the same text embedded alone
        let sim: f32 = batch[1].iter().zip(single[0].iter()).map(|(a, b)| a * b).sum();
        assert!(sim > 0.999);
    }
}
