//! Deterministic feature-hashing encoder.
//!
//! Projects unigrams and bigrams into a fixed number of signed buckets and
//! L2-normalizes the result. It needs no model download, so it is the default
//! for offline builds and tests; texts sharing vocabulary score higher.

use sha2::{Digest, Sha256};
use skillbridge_core::EmbeddingMatrix;

use crate::{EmbedError, TextEncoder};

pub const DEFAULT_HASHING_DIMENSION: usize = 384;

#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
    model_id: String,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hashing-v1-{dimension}"),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens: Vec<String> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        for token in &tokens {
            let (bucket, sign) = self.bucket(token);
            vector[bucket] += sign;
        }
        for pair in tokens.windows(2) {
            let (bucket, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[bucket] += 0.5 * sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

impl TextEncoder for HashingEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn encode(&self, texts: &[String]) -> Result<EmbeddingMatrix, EmbedError> {
        if texts.is_empty() {
            return Ok(EmbeddingMatrix::empty());
        }
        let mut values = Vec::with_capacity(texts.len() * self.dimension);
        for text in texts {
            values.extend(self.embed_text(text));
        }
        Ok(EmbeddingMatrix::from_flat(self.dimension, values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillbridge_core::cosine_similarity;

    #[test]
    fn encoding_is_deterministic_and_normalized() {
        let encoder = HashingEncoder::new(64);
        let a = encoder.encode_one("Senior Rust developer").unwrap();
        let b = encoder.encode_one("senior rust DEVELOPER").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_a_zero_vector() {
        let encoder = HashingEncoder::new(16);
        let v = encoder.encode_one("   ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let encoder = HashingEncoder::default();
        let query = encoder.encode_one("python data engineer").unwrap();
        let close = encoder.encode_one("data engineer with python and sql").unwrap();
        let far = encoder.encode_one("registered nurse night shift").unwrap();
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn model_id_carries_dimension() {
        assert_eq!(HashingEncoder::new(128).model_id(), "hashing-v1-128");
    }
}
