//! Embedding providers — convert text to fixed-dimension vectors.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Dimension of every vector crossing the store boundary. A provider
/// returning anything else is treated as a retrieval failure, not a crash.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

pub trait EmbeddingProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Embedding dimensions
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts into vectors
    fn embed<'a>(
        &'a self,
        texts: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Vec<f32>>>> + Send + 'a>>;

    /// Embed a single text
    fn embed_one<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<f32>>> + Send + 'a>> {
        Box::pin(async move {
            let mut results = self.embed(&[text]).await?;
            results
                .pop()
                .ok_or_else(|| anyhow::anyhow!("Empty embedding result"))
        })
    }
}

// ── Noop provider (no semantic evidence) ─────────────────────

pub struct NoopEmbedding;

impl EmbeddingProvider for NoopEmbedding {
    fn name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn embed<'a>(
        &'a self,
        _texts: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Vec<f32>>>> + Send + 'a>> {
        Box::pin(async move { Ok(Vec::new()) })
    }
}

// ── OpenAI-compatible embedding provider ─────────────────────

pub struct OpenAiEmbedding {
    client: reqwest::Client,
    cached_embeddings_url: String,
    cached_auth_header: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            cached_embeddings_url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            cached_auth_header: format!("Bearer {api_key}"),
            model: model.to_string(),
        }
    }
}

impl EmbeddingProvider for OpenAiEmbedding {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn embed<'a>(
        &'a self,
        texts: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Vec<f32>>>> + Send + 'a>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let request = EmbeddingRequest {
                model: &self.model,
                input: texts,
            };

            let response = self
                .client
                .post(&self.cached_embeddings_url)
                .header("Authorization", &self.cached_auth_header)
                .json(&request)
                .send()
                .await
                .map_err(|error| anyhow::anyhow!("embedding request failed: {error}"))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("embedding service returned {status}: {body}");
            }

            let parsed: EmbeddingResponse = response
                .json()
                .await
                .map_err(|error| anyhow::anyhow!("embedding JSON decode failed: {error}"))?;

            // The API documents index-ordered rows; sort defensively anyway.
            let mut rows = parsed.data;
            rows.sort_by_key(|row| row.index);
            Ok(rows.into_iter().map(|row| row.embedding).collect())
        })
    }
}

// ── Deterministic test embedder ──────────────────────────────

#[cfg(test)]
pub(crate) struct DeterministicEmbedding {
    dims: usize,
}

#[cfg(test)]
impl DeterministicEmbedding {
    pub(crate) fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn fnv1a64(bytes: &[u8]) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for &b in bytes {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }

    fn splitmix64(mut x: u64) -> u64 {
        x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = x;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    #[allow(clippy::cast_precision_loss)]
    fn u64_to_unit_f32(x: u64) -> f32 {
        const U24_MAX: f32 = ((1u32 << 24) - 1) as f32;
        let top_u24: u32 = (x >> 40) as u32;
        (top_u24 as f32 / U24_MAX) * 2.0 - 1.0
    }
}

#[cfg(test)]
impl EmbeddingProvider for DeterministicEmbedding {
    fn name(&self) -> &str {
        "deterministic_test"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embed<'a>(
        &'a self,
        texts: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<Vec<f32>>>> + Send + 'a>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(texts.len());
            for &t in texts {
                let base = Self::fnv1a64(t.as_bytes());
                let mut v = Vec::with_capacity(self.dims);
                for i in 0..self.dims {
                    let mixed = Self::splitmix64(base ^ (i as u64));
                    v.push(Self::u64_to_unit_f32(mixed));
                }
                out.push(v);
            }
            Ok(out)
        })
    }
}
