//! Sentence embedding backends and the provider vector cache

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::ApiError;

/// Dimension of [`HashingEmbedder`] vectors
pub const HASHING_DIM: usize = 512;

/// Turns texts into fixed-size vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    /// Short backend name for status output
    fn name(&self) -> &str;
}

/// Local, deterministic embedder.
///
/// Hashes the character bigrams and trigrams of each `#`-padded token into
/// signed buckets. A name missing a letter or with a doubled one shares most
/// of its n-grams with the original, so it stays close to it.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dim: HASHING_DIM }
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let padded: Vec<char> = format!("#{}#", token).chars().collect();
            for gram in padded.windows(2).chain(padded.windows(3)) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut v, &gram, 1.0);
            }
        }
        l2_normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let idx = u16::from_le_bytes([digest[0], digest[1]]) as usize % self.dim;
        let sign = if digest[2] % 2 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

/// Remote sentence-embedding server
///
/// Sends `{"inputs": [...]}` and accepts either a bare list of vectors or
/// an OpenAI-style `{"data": [{"embedding": [...]}]}` body.
pub struct HttpEmbedder {
    http: HttpClient,
    url: String,
}

impl HttpEmbedder {
    pub fn new(url: &str, timeout: std::time::Duration) -> Result<Self, ApiError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(&self.url)
            .json(&EmbedRequest { inputs: texts })
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Embedding(format!("HTTP status: {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse embeddings: {}", e)))?;

        let vectors = parse_embeddings(&body)
            .ok_or_else(|| ApiError::InvalidResponse("Unrecognised embedding response".to_string()))?;
        if vectors.len() != texts.len() {
            return Err(ApiError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn parse_embeddings(body: &Value) -> Option<Vec<Vec<f32>>> {
    let rows: Vec<&Value> = match body {
        Value::Array(rows) => rows.iter().collect(),
        Value::Object(_) => body
            .get("data")?
            .as_array()?
            .iter()
            .map(|item| item.get("embedding"))
            .collect::<Option<Vec<_>>>()?,
        _ => return None,
    };

    rows.into_iter()
        .map(|row| {
            row.as_array()?
                .iter()
                .map(|x| x.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<f32>>>()
        })
        .collect()
}

/// Scale `v` to unit length (zero vectors are left alone)
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for empty, mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

struct CachedBatch {
    roster_hash: String,
    vectors: Arc<Vec<Vec<f32>>>,
}

/// Provider vectors memoised per roster.
///
/// Callers serialise only while the batch is being (re)built.
#[derive(Default)]
pub struct EmbeddingCache {
    entry: Mutex<Option<CachedBatch>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the vectors for `roster_hash`, embedding `texts` on a miss
    pub async fn get_or_build(
        &self,
        roster_hash: &str,
        texts: &[String],
        embedder: &dyn Embedder,
    ) -> Result<Arc<Vec<Vec<f32>>>, ApiError> {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref()
            && cached.roster_hash == roster_hash
        {
            return Ok(cached.vectors.clone());
        }

        debug!(
            "Embedding {} providers with the {} backend",
            texts.len(),
            embedder.name()
        );
        let vectors = Arc::new(embedder.embed(texts).await?);
        *entry = Some(CachedBatch {
            roster_hash: roster_hash.to_string(),
            vectors: vectors.clone(),
        });
        Ok(vectors)
    }

    /// Drop the memoised batch
    pub async fn clear(&self) {
        *self.entry.lock().await = None;
    }

    pub async fn is_warm(&self) -> bool {
        self.entry.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_is_deterministic_and_normalised() {
        let e = HashingEmbedder::default();
        let a = e.embed_one("ziggo");
        assert_eq!(a, e.embed_one("ziggo"));

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_prefers_similar_strings() {
        let e = HashingEmbedder::default();
        let provider = e.embed_one("vodafone");
        let close = e.embed_one("vodafon");
        let far = e.embed_one("random ssid xyz");
        assert!(cosine_similarity(&provider, &close) > cosine_similarity(&provider, &far));
    }

    #[test]
    fn test_hashing_scores_misspellings_close() {
        let e = HashingEmbedder::default();
        let score = |a: &str, b: &str| cosine_similarity(&e.embed_one(a), &e.embed_one(b));

        assert!(score("vodafon", "vodafone") > 0.8);
        assert!(score("zigo", "ziggo") > 0.8);
        assert!(score("glasfasr", "glasfaser") > 0.8);
        assert!(score("linksys", "ziggo") < 0.3);
        assert!(score("cafe", "vodafone") < 0.3);
    }

    #[test]
    fn test_empty_text_gives_zero_vector() {
        let e = HashingEmbedder::new(8);
        assert!(e.embed_one("").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_embedding_shapes() {
        let bare: Value = serde_json::from_str("[[0.1, 0.2], [0.3, 0.4]]").unwrap();
        assert_eq!(parse_embeddings(&bare).unwrap().len(), 2);

        let openai: Value =
            serde_json::from_str(r#"{"data":[{"embedding":[1.0,0.0]},{"embedding":[0.0,1.0]}]}"#)
                .unwrap();
        assert_eq!(parse_embeddings(&openai).unwrap()[1], vec![0.0, 1.0]);

        let junk: Value = serde_json::from_str(r#"{"error":"nope"}"#).unwrap();
        assert!(parse_embeddings(&junk).is_none());
    }

    #[tokio::test]
    async fn test_http_embedder() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/embed")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"inputs":["kpn","ziggo"]}"#.to_string(),
            ))
            .with_status(200)
            .with_body("[[1.0, 0.0], [0.0, 1.0]]")
            .create_async()
            .await;

        let embedder =
            HttpEmbedder::new(&format!("{}/embed", server.url()), std::time::Duration::from_secs(5))
                .unwrap();
        let vectors = embedder
            .embed(&["kpn".to_string(), "ziggo".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_embedder_count_mismatch() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(200)
            .with_body("[[1.0, 0.0]]")
            .create_async()
            .await;

        let embedder = HttpEmbedder::new(&server.url(), std::time::Duration::from_secs(5)).unwrap();
        let err = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_cache_reuses_and_clears() {
        let cache = EmbeddingCache::new();
        let embedder = HashingEmbedder::new(16);
        let texts = vec!["kpn".to_string()];

        let first = cache.get_or_build("h1", &texts, &embedder).await.unwrap();
        let second = cache.get_or_build("h1", &texts, &embedder).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let rebuilt = cache.get_or_build("h2", &texts, &embedder).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));

        cache.clear().await;
        assert!(!cache.is_warm().await);
    }
}
