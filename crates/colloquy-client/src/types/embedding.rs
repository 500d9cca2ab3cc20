use colloquy_config::EmbeddingParameters;
use serde::{Deserialize, Serialize};

use super::{ApiError, ErrorPayload, Usage};

/// Embedding request body
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(flatten)]
    pub parameters: EmbeddingParameters,
}

/// Embedding response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// One entry per input, in input order
    #[serde(default)]
    pub data: Vec<EmbeddingData>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingData {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl EmbeddingResponse {
    pub const fn is_successful(&self) -> bool {
        self.error.is_none()
    }

    /// Vector for the first input
    pub fn first_embedding(&self) -> Option<&[f32]> {
        self.data.first().map(|data| data.embedding.as_slice())
    }

    /// Vectors in input order
    pub fn embeddings(&self) -> impl Iterator<Item = &[f32]> {
        self.data.iter().map(|data| data.embedding.as_slice())
    }
}

impl ErrorPayload for EmbeddingResponse {
    fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    fn set_error(&mut self, error: ApiError) {
        self.error = Some(error);
    }
}

/// Cosine of the angle between two vectors
///
/// Returns `None` when the lengths differ or either vector has zero
/// magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (x.mul_add(*y, dot), x.mul_add(*x, na), y.mul_add(*y, nb))
        });

    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if !magnitude.is_normal() {
        return None;
    }

    Some(dot / magnitude)
}
