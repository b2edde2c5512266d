//! Row-aligned embedding matrices and the corpus artifacts that own them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("row {row} has dimension {found}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("buffer of {len} values is not a multiple of dimension {dimension}")]
    BadBuffer { len: usize, dimension: usize },
}

/// Records and embeddings disagree on how many rows exist.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{records} records but {embeddings} embedding rows")]
pub struct IntegrityError {
    pub records: usize,
    pub embeddings: usize,
}

/// Dense row-major matrix of fixed-dimension vectors.
///
/// An empty matrix has zero rows and dimension zero. The dimension is always read
/// from the matrix, never assumed by callers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    dimension: usize,
    rows: usize,
    values: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, MatrixError> {
        let Some(first) = rows.first() else {
            return Ok(Self::empty());
        };
        let dimension = first.len();
        let mut values = Vec::with_capacity(dimension * rows.len());
        for (row, vector) in rows.iter().enumerate() {
            if vector.len() != dimension {
                return Err(MatrixError::RaggedRow {
                    row,
                    expected: dimension,
                    found: vector.len(),
                });
            }
            values.extend_from_slice(vector);
        }
        Ok(Self {
            dimension,
            rows: rows.len(),
            values,
        })
    }

    pub fn from_flat(dimension: usize, values: Vec<f32>) -> Result<Self, MatrixError> {
        if values.is_empty() {
            return Ok(Self::empty());
        }
        if dimension == 0 || values.len() % dimension != 0 {
            return Err(MatrixError::BadBuffer {
                len: values.len(),
                dimension,
            });
        }
        Ok(Self {
            dimension,
            rows: values.len() / dimension,
            values,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.dimension;
        Some(&self.values[start..start + self.dimension])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.rows).map(move |i| {
            let start = i * self.dimension;
            &self.values[start..start + self.dimension]
        })
    }

    /// Checks the internal shape after deserialization.
    pub fn is_consistent(&self) -> bool {
        if self.rows == 0 {
            return self.values.is_empty();
        }
        self.dimension > 0 && self.values.len() == self.rows * self.dimension
    }
}

/// One record table paired with its index-aligned embedding matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusArtifact<R> {
    records: Vec<R>,
    embeddings: EmbeddingMatrix,
}

impl<R> CorpusArtifact<R> {
    pub fn new(records: Vec<R>, embeddings: EmbeddingMatrix) -> Result<Self, IntegrityError> {
        if records.len() != embeddings.len() {
            return Err(IntegrityError {
                records: records.len(),
                embeddings: embeddings.len(),
            });
        }
        Ok(Self { records, embeddings })
    }

    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            embeddings: EmbeddingMatrix::empty(),
        }
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_parts(self) -> (Vec<R>, EmbeddingMatrix) {
        (self.records, self.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_rejects_ragged_input() {
        let err = EmbeddingMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            MatrixError::RaggedRow {
                row: 1,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn empty_input_yields_empty_matrix() {
        let m = EmbeddingMatrix::from_rows(Vec::new()).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.dimension(), 0);
        assert!(m.is_consistent());
        assert_eq!(m.rows().count(), 0);
    }

    #[test]
    fn rows_are_index_aligned() {
        let m = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]])
            .unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.dimension(), 2);
        assert_eq!(m.row(1), Some(&[0.0, 1.0][..]));
        assert_eq!(m.row(3), None);
        assert_eq!(m.rows().nth(2), Some(&[0.5, 0.5][..]));
    }

    #[test]
    fn from_flat_checks_buffer_shape() {
        assert!(EmbeddingMatrix::from_flat(3, vec![0.0; 7]).is_err());
        let m = EmbeddingMatrix::from_flat(3, vec![0.0; 6]).unwrap();
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn artifact_requires_matching_row_counts() {
        let m = EmbeddingMatrix::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        let err = CorpusArtifact::new(vec!["only-one"], m).unwrap_err();
        assert_eq!(
            err,
            IntegrityError {
                records: 1,
                embeddings: 2
            }
        );
    }
}
