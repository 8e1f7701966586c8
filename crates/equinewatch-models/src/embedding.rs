//! Appearance embeddings produced by the external embedder.

use serde::{Deserialize, Serialize};

/// Dimensionality of the appearance embedding for this system.
pub const EMBEDDING_DIM: usize = 768;

/// A unit-norm (in L2) real vector of fixed dimension [`EMBEDDING_DIM`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppearanceEmbedding(pub Vec<f32>);

impl AppearanceEmbedding {
    /// Build from raw values and normalize to unit length.
    ///
    /// Returns `None` for a zero vector (e.g. an out-of-frame crop), which the
    /// tracker treats as ineligible for appearance matching (§4.2 Failure).
    pub fn from_raw(values: Vec<f32>) -> Option<Self> {
        let norm = Self::l2_norm(&values);
        if norm < 1e-9 {
            return None;
        }
        Some(Self(values.into_iter().map(|v| v / norm).collect()))
    }

    /// An all-zero placeholder, used only to signal "no embedding computed".
    pub fn zero() -> Self {
        Self(vec![0.0; EMBEDDING_DIM])
    }

    pub fn is_zero(&self) -> bool {
        Self::l2_norm(&self.0) < 1e-9
    }

    fn l2_norm(values: &[f32]) -> f32 {
        values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn norm(&self) -> f32 {
        Self::l2_norm(&self.0)
    }

    /// Cosine similarity; both vectors are expected to already be unit-norm,
    /// but this does not assume it.
    pub fn cosine_similarity(&self, other: &AppearanceEmbedding) -> f32 {
        let dot: f32 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        let denom = self.norm() * other.norm();
        if denom < 1e-9 {
            0.0
        } else {
            (dot / denom).clamp(-1.0, 1.0)
        }
    }

    /// Blend two embeddings with the given weight on `self`, then renormalize.
    /// `weight=0.8` implements the tracker's per-frame EMA (§4.2 step 6);
    /// `weight=0.3` implements the warm tier's one-shot blend (§4.3), called
    /// as `old.blend(new, 0.3)`.
    pub fn blend(&self, other: &AppearanceEmbedding, weight: f32) -> AppearanceEmbedding {
        let blended: Vec<f32> = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| weight * a + (1.0 - weight) * b)
            .collect();
        Self::from_raw(blended).unwrap_or_else(|| self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_normalizes_to_unit_length() {
        let e = AppearanceEmbedding::from_raw(vec![3.0, 4.0]).unwrap();
        assert!((e.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_has_no_embedding() {
        assert!(AppearanceEmbedding::from_raw(vec![0.0; EMBEDDING_DIM]).is_none());
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let e = AppearanceEmbedding::from_raw(vec![1.0, 2.0, 3.0]).unwrap();
        assert!((e.cosine_similarity(&e) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blend_stays_unit_norm() {
        let a = AppearanceEmbedding::from_raw(vec![1.0, 0.0]).unwrap();
        let b = AppearanceEmbedding::from_raw(vec![0.0, 1.0]).unwrap();
        let blended = a.blend(&b, 0.8);
        assert!((blended.norm() - 1.0).abs() < 1e-5);
    }
}
