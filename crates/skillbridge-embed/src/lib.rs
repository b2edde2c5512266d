//! Embedding producer: one shared text encoder behind a "texts in, vectors out" contract.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use skillbridge_core::{EmbeddingMatrix, MatrixError};
use thiserror::Error;
use tracing::{debug, info};

mod hashing;
#[cfg(feature = "fastembed")]
mod minilm;

pub use hashing::{HashingEncoder, DEFAULT_HASHING_DIMENSION};
#[cfg(feature = "fastembed")]
pub use minilm::FastEmbedEncoder;

pub const CRATE_NAME: &str = "skillbridge-embed";

/// Texts per encoder call when embedding a whole corpus.
pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum EmbedError {
    /// The model could not be loaded or is not compiled in.
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error("encoder returned {found} vectors for {expected} texts")]
    RowCount { expected: usize, found: usize },
    #[error(transparent)]
    Shape(#[from] MatrixError),
}

/// A pretrained (or stand-in) text embedding model.
///
/// Implementations must be safe to call from several threads at once; models
/// whose bindings are not reentrant serialize calls internally.
pub trait TextEncoder: Send + Sync {
    /// Stable identifier recorded in artifacts built with this encoder.
    fn model_id(&self) -> &str;

    /// One row per input text, same order. Empty input yields an empty matrix.
    fn encode(&self, texts: &[String]) -> Result<EmbeddingMatrix, EmbedError>;

    fn encode_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let matrix = self.encode(&[text.to_string()])?;
        matrix
            .row(0)
            .map(<[f32]>::to_vec)
            .ok_or(EmbedError::RowCount { expected: 1, found: 0 })
    }
}

pub type SharedEncoder = Arc<dyn TextEncoder>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Hashing,
    FastEmbed,
}

impl FromStr for EncoderKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" | "hash" => Ok(EncoderKind::Hashing),
            "fastembed" | "minilm" | "all-minilm-l6-v2" => Ok(EncoderKind::FastEmbed),
            other => Err(EmbedError::Unavailable(format!("unknown encoder `{other}`"))),
        }
    }
}

/// MiniLM when the `fastembed` feature is compiled in, the offline hashing
/// encoder otherwise.
impl Default for EncoderKind {
    fn default() -> Self {
        if cfg!(feature = "fastembed") {
            EncoderKind::FastEmbed
        } else {
            EncoderKind::Hashing
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderKind::Hashing => f.write_str("hashing"),
            EncoderKind::FastEmbed => f.write_str("fastembed"),
        }
    }
}

/// Returns the process-wide encoder for `kind`.
pub fn load_encoder(
    kind: EncoderKind,
    hashing_dimension: usize,
) -> Result<SharedEncoder, EmbedError> {
    match kind {
        EncoderKind::Hashing => Ok(Arc::new(HashingEncoder::new(hashing_dimension))),
        #[cfg(feature = "fastembed")]
        EncoderKind::FastEmbed => {
            let encoder: SharedEncoder = FastEmbedEncoder::shared()?;
            Ok(encoder)
        }
        #[cfg(not(feature = "fastembed"))]
        EncoderKind::FastEmbed => Err(EmbedError::Unavailable(
            "built without the `fastembed` feature".to_string(),
        )),
    }
}

/// Encodes a whole corpus in fixed-size batches, logging progress.
pub fn encode_batched(
    encoder: &dyn TextEncoder,
    texts: &[String],
    batch_size: usize,
) -> Result<EmbeddingMatrix, EmbedError> {
    if texts.is_empty() {
        return Ok(EmbeddingMatrix::empty());
    }
    let batch_size = batch_size.max(1);
    let mut dimension = 0usize;
    let mut values = Vec::new();
    let mut done = 0usize;
    for chunk in texts.chunks(batch_size) {
        let part = encoder.encode(chunk)?;
        if part.len() != chunk.len() {
            return Err(EmbedError::RowCount {
                expected: chunk.len(),
                found: part.len(),
            });
        }
        if dimension == 0 {
            dimension = part.dimension();
        }
        for row in part.rows() {
            if row.len() != dimension {
                return Err(MatrixError::RaggedRow {
                    row: done,
                    expected: dimension,
                    found: row.len(),
                }
                .into());
            }
            values.extend_from_slice(row);
            done += 1;
        }
        debug!(model = encoder.model_id(), done, total = texts.len(), "encoded batch");
    }
    info!(model = encoder.model_id(), rows = done, dimension, "encoded corpus");
    Ok(EmbeddingMatrix::from_flat(dimension, values)?)
}
