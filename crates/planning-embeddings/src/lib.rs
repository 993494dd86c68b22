//! The Embedding Service (§4.4, C4): text and application embeddings backed by
//! the unified [`planning_core::LlmClient`], with deterministic source-text
//! composition and a semantic-search helper.

mod composition;

use std::sync::Arc;

use planning_core::{normalized_text_hash, LlmClient, PlanningApplication, Result, DEFAULT_EMBEDDING_DIMENSIONS};
use tracing::warn;

pub use composition::{compose_text, ApplicationEmbeddingType};

const MIN_CONFIDENT_CHARS: usize = 10;

/// The result of a single embedding call (§4.4).
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub embedding: Vec<f32>,
    pub model_used: String,
    pub token_count: u64,
    pub cost_usd: f64,
    pub confidence_score: f64,
    pub text_hash: String,
}

/// A scored candidate returned by [`EmbeddingService::semantic_search`].
#[derive(Debug, Clone)]
pub struct SemanticMatch {
    pub id: String,
    pub score: f64,
}

pub struct EmbeddingService {
    client: Arc<dyn LlmClient>,
    model: String,
    dimensions: usize,
}

impl EmbeddingService {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }

    fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.dimensions]
    }

    /// `confidence` from (a) non-empty input, (b) length >= 10 chars, (c) provider
    /// success. Zero when any factor fails (§4.4).
    fn confidence_for(text: &str, provider_succeeded: bool) -> f64 {
        if !provider_succeeded || text.trim().is_empty() {
            return 0.0;
        }
        if text.trim().chars().count() < MIN_CONFIDENT_CHARS {
            0.5
        } else {
            1.0
        }
    }

    /// `GenerateTextEmbedding` (§4.4). Never fails outright: a provider error
    /// degrades to a zero vector with `confidence_score=0` so callers can still
    /// index/search without the document blocking on embedding availability.
    pub async fn generate_text_embedding(&self, text: &str) -> Result<EmbeddingResult> {
        let text_hash = normalized_text_hash(text);

        if text.trim().is_empty() {
            return Ok(EmbeddingResult {
                embedding: self.zero_vector(),
                model_used: self.model.clone(),
                token_count: 0,
                cost_usd: 0.0,
                confidence_score: 0.0,
                text_hash,
            });
        }

        match self.client.embed(&[text.to_string()], &self.model).await {
            Ok(batch) => {
                let cost_usd = batch.cost_usd;
                let embedding = batch.vectors.into_iter().next().unwrap_or_else(|| self.zero_vector());
                Ok(EmbeddingResult {
                    embedding,
                    model_used: self.model.clone(),
                    token_count: batch.tokens_used,
                    cost_usd,
                    confidence_score: Self::confidence_for(text, true),
                    text_hash,
                })
            }
            Err(err) => {
                warn!(error = %err, "embedding provider call failed, falling back to zero vector");
                Ok(EmbeddingResult {
                    embedding: self.zero_vector(),
                    model_used: self.model.clone(),
                    token_count: 0,
                    cost_usd: 0.0,
                    confidence_score: 0.0,
                    text_hash,
                })
            }
        }
    }

    /// `GenerateApplicationEmbedding` (§4.4): composes the source text for
    /// `embedding_type` then embeds it.
    pub async fn generate_application_embedding(
        &self,
        app: &PlanningApplication,
        embedding_type: ApplicationEmbeddingType,
    ) -> Result<EmbeddingResult> {
        let text = compose_text(app, embedding_type);
        self.generate_text_embedding(&text).await
    }

    /// `BatchGenerate` (§4.4): one embedding-API call for the whole batch,
    /// preserving input order. The provider backend sub-batches internally at its
    /// own request-size limit.
    pub async fn batch_generate(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let non_empty: Vec<String> = texts.to_vec();
        match self.client.embed(&non_empty, &self.model).await {
            Ok(batch) => {
                let cost_per_text = batch.cost_usd / texts.len().max(1) as f64;
                Ok(texts
                    .iter()
                    .zip(batch.vectors)
                    .map(|(text, embedding)| EmbeddingResult {
                        embedding,
                        model_used: self.model.clone(),
                        token_count: batch.tokens_used / texts.len().max(1) as u64,
                        cost_usd: cost_per_text,
                        confidence_score: Self::confidence_for(text, true),
                        text_hash: normalized_text_hash(text),
                    })
                    .collect())
            }
            Err(err) => {
                warn!(error = %err, count = texts.len(), "batch embedding call failed, falling back to zero vectors");
                Ok(texts
                    .iter()
                    .map(|text| EmbeddingResult {
                        embedding: self.zero_vector(),
                        model_used: self.model.clone(),
                        token_count: 0,
                        cost_usd: 0.0,
                        confidence_score: 0.0,
                        text_hash: normalized_text_hash(text),
                    })
                    .collect())
            }
        }
    }

    /// `SemanticSearch` (§4.4): embeds `query`, scores each candidate by cosine
    /// similarity against its own embedding, and returns the top `k`.
    pub async fn semantic_search(&self, query: &str, candidates: &[(String, Vec<f32>)], k: usize) -> Result<Vec<SemanticMatch>> {
        let query_embedding = self.generate_text_embedding(query).await?.embedding;

        let mut scored: Vec<SemanticMatch> = candidates
            .iter()
            .map(|(id, embedding)| SemanticMatch {
                id: id.clone(),
                score: cosine_similarity(&query_embedding, embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use planning_core::{CompletionRequest, CompletionStream, EmbeddingBatch, LlmResponse, UsageStats};

    struct FakeLlm {
        fail: bool,
        dims: usize,
    }

    #[async_trait]
    impl LlmClient for FakeLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<LlmResponse> {
            unimplemented!("not exercised by embedding tests")
        }

        async fn stream_complete(&self, _request: CompletionRequest) -> Result<CompletionStream> {
            unimplemented!("not exercised by embedding tests")
        }

        async fn embed(&self, texts: &[String], _model: &str) -> Result<EmbeddingBatch> {
            if self.fail {
                return Err(planning_core::PlanningError::ai_service_unavailable("provider down"));
            }
            Ok(EmbeddingBatch {
                vectors: texts.iter().map(|_| vec![1.0; self.dims]).collect(),
                tokens_used: texts.len() as u64 * 4,
                cost_usd: texts.len() as f64 * 0.0001,
            })
        }

        fn usage_stats(&self) -> UsageStats {
            UsageStats::default()
        }
    }

    fn service(fail: bool) -> EmbeddingService {
        EmbeddingService::new(Arc::new(FakeLlm { fail, dims: 8 }), "text-embedding-3-small")
    }

    #[tokio::test]
    async fn empty_text_short_circuits_to_zero_vector() {
        let result = service(false).generate_text_embedding("   ").await.unwrap();
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.embedding.iter().all(|&v| v == 0.0));
    }

    #[tokio::test]
    async fn short_text_gets_partial_confidence() {
        let result = service(false).generate_text_embedding("hi").await.unwrap();
        assert_eq!(result.confidence_score, 0.5);
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_zero_vector_with_zero_confidence() {
        let result = service(true).generate_text_embedding("a perfectly good description").await.unwrap();
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.embedding.iter().all(|&v| v == 0.0));
    }

    #[tokio::test]
    async fn batch_generate_preserves_order() {
        let texts = vec!["alpha description text".to_string(), "beta description text".to_string()];
        let results = service(false).batch_generate(&texts).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text_hash, normalized_text_hash(&texts[0]));
        assert_eq!(results[1].text_hash, normalized_text_hash(&texts[1]));
    }

    #[tokio::test]
    async fn generate_text_embedding_carries_real_provider_cost() {
        let result = service(false).generate_text_embedding("a perfectly good description").await.unwrap();
        assert!(result.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn batch_generate_apportions_cost_across_texts() {
        let texts = vec!["alpha description text".to_string(), "beta description text".to_string()];
        let results = service(false).batch_generate(&texts).await.unwrap();
        assert!(results.iter().all(|r| r.cost_usd > 0.0));
    }

    #[tokio::test]
    async fn semantic_search_ranks_identical_vector_highest() {
        let svc = service(false);
        let candidates = vec![
            ("exact".to_string(), vec![1.0; 8]),
            ("orthogonal".to_string(), vec![0.0; 8]),
        ];
        let matches = svc.semantic_search("query text long enough", &candidates, 2).await.unwrap();
        assert_eq!(matches[0].id, "exact");
        assert!(matches[0].score > matches[1].score);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
