use std::time::Duration;

use serde::Deserialize;

use crate::error::AttestError;

const EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent";
const EMBED_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Sentence encoder over the Gemini embedding API. Vectors come back at the
/// fixed dimension and leave here unit-normalized, so inner product equals
/// cosine similarity.
pub struct Embedder {
    client: reqwest::Client,
    api_key: Option<String>,
    dim: usize,
}

impl Embedder {
    pub fn new(api_key: Option<String>, dim: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(EMBED_TIMEOUT)
            .build()
            .expect("failed to build embedding client");
        Self {
            client,
            api_key,
            dim,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AttestError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AttestError::Other("GEMINI_API_KEY required for embeddings".to_string()))?;

        let body = serde_json::json!({
            "model": "models/text-embedding-004",
            "content": {"parts": [{"text": text}]},
        });
        let response = self
            .client
            .post(EMBED_URL)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AttestError::RateLimited {
                provider: "gemini".to_string(),
            });
        }
        if !status.is_success() {
            return Err(AttestError::Upstream {
                provider: "gemini".to_string(),
                message: status.to_string(),
                status: Some(status.as_u16()),
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        let mut values = parsed
            .embedding
            .map(|e| e.values)
            .ok_or_else(|| AttestError::Malformed("embedding response had no values".to_string()))?;
        if values.len() != self.dim {
            return Err(AttestError::Malformed(format!(
                "embedding dimension {} != expected {}",
                values.len(),
                self.dim
            )));
        }
        l2_normalize(&mut values);
        Ok(values)
    }
}

/// Scale a vector to unit length. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Inner product. For unit vectors this is cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn dot_of_identical_unit_vectors_is_one() {
        let mut v = vec![1.0, 2.0, 2.0];
        l2_normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
    }
}
