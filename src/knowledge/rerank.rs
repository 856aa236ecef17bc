//! 시맨틱 리랭킹
//!
//! 규칙 보정으로 정렬된 상위 후보를 임베딩 코사인 유사도와 섞어 다시 정렬합니다.
//!
//! fused = lexical_weight * BM25 + semantic_weight * cosine

use std::sync::Arc;

use anyhow::Result;

use crate::config::RerankConfig;
use crate::embedding::EmbeddingProvider;

use super::rules::ScoredCandidate;

/// 노름 안정화 항
const NORM_EPSILON: f32 = 1e-9;

/// 두 벡터 간의 코사인 유사도
///
/// 각 노름에 `1e-9`를 더하므로 영벡터도 0을 돌려줍니다.
/// 길이가 다르거나 비어 있으면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    dot_product / (norm_a + NORM_EPSILON) / (norm_b + NORM_EPSILON)
}

/// 임베딩 기반 리랭커
pub struct SemanticReranker {
    provider: Arc<dyn EmbeddingProvider>,
    lexical_weight: f64,
    semantic_weight: f64,
}

impl SemanticReranker {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &RerankConfig) -> Self {
        Self {
            provider,
            lexical_weight: config.lexical_weight,
            semantic_weight: config.semantic_weight,
        }
    }

    /// 후보를 fused 점수 내림차순으로 재정렬해 상위 `top_k`개의 청크 인덱스를 반환
    ///
    /// `query`와 `texts`는 정규화된 텍스트여야 합니다.
    /// `texts[i]`는 `candidates[i]`의 본문입니다.
    /// 임베딩 수가 맞지 않으면 에러를 돌려주며, 호출자는 어휘 순서로 물러납니다.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[ScoredCandidate],
        texts: &[&str],
        top_k: usize,
    ) -> Result<Vec<usize>> {
        if candidates.is_empty() {
            return Ok(vec![]);
        }
        if candidates.len() != texts.len() {
            anyhow::bail!(
                "Candidate/text count mismatch: {} vs {}",
                candidates.len(),
                texts.len()
            );
        }

        let mut inputs = Vec::with_capacity(texts.len() + 1);
        inputs.push(query.to_string());
        inputs.extend(texts.iter().map(|t| t.to_string()));

        let mut vectors = self.provider.embed_batch(&inputs).await?;
        if vectors.len() != inputs.len() {
            anyhow::bail!(
                "Encoder returned {} vectors for {} inputs",
                vectors.len(),
                inputs.len()
            );
        }

        let query_vector = vectors.remove(0);
        let mut fused: Vec<(usize, f64)> = candidates
            .iter()
            .zip(vectors.iter())
            .map(|(candidate, vector)| {
                let cosine = cosine_similarity(&query_vector, vector) as f64;
                (
                    candidate.chunk_index,
                    self.lexical_weight * candidate.lexical_score + self.semantic_weight * cosine,
                )
            })
            .collect();

        fused.sort_by(|a, b| b.1.total_cmp(&a.1));
        fused.truncate(top_k);

        tracing::debug!(
            "Reranked {} candidates with {}",
            candidates.len(),
            self.provider.name()
        );

        Ok(fused.into_iter().map(|(i, _)| i).collect())
    }
}

impl std::fmt::Debug for SemanticReranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticReranker")
            .field("provider", &self.provider.name())
            .field("lexical_weight", &self.lexical_weight)
            .field("semantic_weight", &self.semantic_weight)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
