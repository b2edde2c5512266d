//! all-MiniLM-L6-v2 sentence embeddings through `fastembed` (ONNX runtime).

use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use skillbridge_core::EmbeddingMatrix;
use tracing::info;

use crate::{EmbedError, TextEncoder};

pub const MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

static INSTANCE: Mutex<Option<Arc<FastEmbedEncoder>>> = parking_lot::const_mutex(None);

pub struct FastEmbedEncoder {
    // Calls go through one lock; the ONNX session is not assumed reentrant.
    model: Mutex<TextEmbedding>,
}

impl FastEmbedEncoder {
    pub fn load() -> Result<Self, EmbedError> {
        info!(model = MODEL_ID, "loading sentence embedding model");
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| EmbedError::Unavailable(e.to_string()))?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }

    /// Loads the model on first use and hands out the same instance afterwards.
    pub fn shared() -> Result<Arc<Self>, EmbedError> {
        let mut slot = INSTANCE.lock();
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        let encoder = Arc::new(Self::load()?);
        *slot = Some(encoder.clone());
        Ok(encoder)
    }
}

impl TextEncoder for FastEmbedEncoder {
    fn model_id(&self) -> &str {
        MODEL_ID
    }

    fn encode(&self, texts: &[String]) -> Result<EmbeddingMatrix, EmbedError> {
        if texts.is_empty() {
            return Ok(EmbeddingMatrix::empty());
        }
        let model = self.model.lock();
        let rows = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbedError::Encode(e.to_string()))?;
        if rows.len() != texts.len() {
            return Err(EmbedError::RowCount {
                expected: texts.len(),
                found: rows.len(),
            });
        }
        Ok(EmbeddingMatrix::from_rows(rows)?)
    }
}
