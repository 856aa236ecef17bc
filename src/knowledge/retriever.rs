//! 검색기
//!
//! 질의 흐름:
//! 1. 정규화 + 토큰화
//! 2. BM25 점수
//! 3. 필수 키워드 그룹으로 후보 풀 선택 (both → either → all)
//! 4. 보너스/패널티 보정 후 상위 후보 유지
//! 5. (선택) 임베딩 리랭킹
//!
//! 공개된 스냅샷은 `RwLock<Arc<Snapshot>>` 뒤에 있습니다.
//! 질의는 시작 시점에 `Arc`를 복제해 두고 잠금 없이 진행하므로,
//! 리로드가 새 스냅샷을 공개해도 진행 중인 질의는 이전 데이터를 계속 봅니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::collector::{CorpusCollector, Document};
use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::KbResult;

use super::chunker::Chunk;
use super::rerank::SemanticReranker;
use super::rules::{CandidateSelector, ScoreBlender, ScoredCandidate};
use super::snapshot::{Indexer, Snapshot, SnapshotStats};
use super::tokenizer::Tokenizer;

/// 기본 반환 개수
pub const DEFAULT_TOP_K: usize = 4;

// ============================================================================
// Hit
// ============================================================================

/// 검색 결과 한 건
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    /// BM25 점수 (규칙 보정/리랭킹 전)
    pub score: f64,
    pub text: String,
    pub source: String,
    pub idx: usize,
}

/// 분할 미리보기 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewLevel {
    /// 문단
    Paragraph,
    /// 패킹된 블록 (오버랩 전)
    Block,
}

// ============================================================================
// Retriever
// ============================================================================

/// BM25 + 규칙 + 선택적 시맨틱 리랭킹 검색기
pub struct Retriever {
    config: RetrievalConfig,
    indexer: Indexer,
    selector: CandidateSelector,
    blender: ScoreBlender,
    reranker: Option<SemanticReranker>,
    current: RwLock<Arc<Snapshot>>,
    next_version: AtomicU64,
}

impl Retriever {
    /// 설정의 코퍼스 디렉터리에서 첫 스냅샷을 만들어 생성
    pub fn open(config: RetrievalConfig) -> KbResult<Self> {
        config.validate()?;
        let documents = CorpusCollector::new(config.corpus.clone()).collect()?;
        Ok(Self::from_documents(config, documents))
    }

    /// 문서 목록으로 바로 생성 (디렉터리 없이)
    pub fn from_documents(config: RetrievalConfig, documents: Vec<Document>) -> Self {
        let indexer = Indexer::new(&config);
        Self::with_indexer(config, indexer, documents)
    }

    /// 토크나이저를 교체한 인덱서로 생성
    pub fn with_tokenizer(
        config: RetrievalConfig,
        tokenizer: Arc<dyn Tokenizer>,
        documents: Vec<Document>,
    ) -> Self {
        let indexer = Indexer::new(&config).with_tokenizer(tokenizer);
        Self::with_indexer(config, indexer, documents)
    }

    fn with_indexer(config: RetrievalConfig, indexer: Indexer, documents: Vec<Document>) -> Self {
        let snapshot = indexer.build(&documents, 1);
        tracing::info!(
            "Published snapshot v1 ({} chunks from {} documents)",
            snapshot.len(),
            documents.len()
        );

        Self {
            selector: CandidateSelector::new(&config.rules),
            blender: ScoreBlender::new(&config.rules),
            reranker: None,
            current: RwLock::new(Arc::new(snapshot)),
            next_version: AtomicU64::new(2),
            indexer,
            config,
        }
    }

    /// 리랭킹용 인코더 연결
    ///
    /// `rerank.enabled = false`이면 무시됩니다.
    pub fn with_reranker(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        if self.config.rerank.enabled {
            tracing::info!("Semantic rerank enabled ({})", provider.name());
            self.reranker = Some(SemanticReranker::new(provider, &self.config.rerank));
        } else {
            tracing::info!("Semantic rerank disabled by configuration");
        }
        self
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// 현재 공개된 스냅샷
    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// 더 새 버전일 때만 교체하고, 교체 후 공개 중인 스냅샷을 반환
    fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if snapshot.version() <= guard.version() {
            tracing::warn!(
                "Discarding stale snapshot v{} (live v{})",
                snapshot.version(),
                guard.version()
            );
            return Arc::clone(&*guard);
        }

        let snapshot = Arc::new(snapshot);
        *guard = Arc::clone(&snapshot);
        drop(guard);

        tracing::info!(
            "Published snapshot v{} ({} chunks)",
            snapshot.version(),
            snapshot.len()
        );
        snapshot
    }

    /// 코퍼스 디렉터리에서 다시 읽어 새 스냅샷 공개
    ///
    /// 실패하면 이전 스냅샷이 그대로 유지됩니다.
    pub fn reload(&self) -> KbResult<Arc<Snapshot>> {
        let documents = match CorpusCollector::new(self.config.corpus.clone()).collect() {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!("Reload failed, keeping current snapshot: {}", e);
                return Err(e);
            }
        };
        Ok(self.reload_from(&documents))
    }

    /// 주어진 문서로 새 스냅샷 공개
    ///
    /// 리로드가 겹치면 나중에 시작한 쪽(높은 버전)이 남습니다.
    /// 먼저 시작해 늦게 끝난 빌드는 버려지고, 현재 공개된 스냅샷이 반환됩니다.
    pub fn reload_from(&self, documents: &[Document]) -> Arc<Snapshot> {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.indexer.build(documents, version);
        self.publish(snapshot)
    }

    /// 현재 스냅샷에서 검색
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Vec<Hit> {
        let snapshot = self.snapshot();
        self.retrieve_in(&snapshot, query, top_k).await
    }

    /// 지정한 스냅샷에서 검색
    pub async fn retrieve_in(&self, snapshot: &Snapshot, query: &str, top_k: usize) -> Vec<Hit> {
        if snapshot.is_empty() {
            return vec![];
        }

        let top_k = top_k.max(1);
        let (normalized_query, tokens) = self.indexer.prepare_query(query);
        let lexical = snapshot.index().score(&tokens);
        let texts = snapshot.normalized();

        let pool = self.selector.select(texts, top_k);
        let mut ranked = self.blender.rank(&pool.indices, &lexical, texts);

        let keep = self.config.rerank.candidates.max(top_k).min(ranked.len());
        ranked.truncate(keep);
        let top_k = top_k.min(ranked.len());

        tracing::debug!(
            "Query {:?}: {} tokens, pool {:?} ({}), {} candidates",
            normalized_query,
            tokens.len(),
            pool.kind,
            pool.len(),
            ranked.len()
        );

        let order = match &self.reranker {
            Some(reranker) => {
                let candidate_texts: Vec<&str> =
                    ranked.iter().map(|c| texts[c.chunk_index].as_str()).collect();
                match reranker
                    .rerank(&normalized_query, &ranked, &candidate_texts, top_k)
                    .await
                {
                    Ok(order) => order,
                    Err(e) => {
                        tracing::warn!("Semantic rerank skipped: {}", e);
                        lexical_order(&ranked, top_k)
                    }
                }
            }
            None => lexical_order(&ranked, top_k),
        };

        order
            .into_iter()
            .map(|i| {
                let chunk = &snapshot.chunks()[i];
                Hit {
                    score: lexical[i],
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    idx: chunk.idx,
                }
            })
            .collect()
    }

    /// (source, idx)로 청크 조회
    pub fn get_chunk(&self, source: &str, idx: usize) -> Option<Chunk> {
        self.snapshot().get_chunk(source, idx).cloned()
    }

    /// 현재 스냅샷 통계
    pub fn stats(&self) -> SnapshotStats {
        self.snapshot().stats()
    }

    /// 문서 텍스트 분할 미리보기
    pub fn split_preview(&self, text: &str, level: PreviewLevel) -> Vec<String> {
        let chunker = self.indexer.chunker();
        match level {
            PreviewLevel::Paragraph => chunker.paragraphs(text),
            PreviewLevel::Block => chunker.blocks(text),
        }
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("indexer", &self.indexer)
            .field("reranker", &self.reranker)
            .field("snapshot", &self.snapshot().version())
            .finish()
    }
}

fn lexical_order(ranked: &[ScoredCandidate], top_k: usize) -> Vec<usize> {
    ranked.iter().take(top_k).map(|c| c.chunk_index).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::rules::{RuleConfig, WeightedKeyword};
    use crate::knowledge::tokenizer::VocabularyTokenizer;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config() -> RetrievalConfig {
        RetrievalConfig::default()
    }

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("points.txt", "积分规则\n\n积分可以兑换礼品"),
            Document::new("renew.txt", "年卡续费\n\n续费后有效期顺延"),
            Document::new("invoice.txt", "发票开具说明"),
        ]
    }

    /// 질의와 같은 글자가 있으면 같은 방향
    struct MatchEncoder {
        needle: &'static str,
    }

    #[async_trait]
    impl EmbeddingProvider for MatchEncoder {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    if i == 0 || t.contains(self.needle) {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
        fn dimension(&self) -> usize {
            2
        }
        fn name(&self) -> &str {
            "match"
        }
    }

    struct FailingEncoder;

    #[async_trait]
    impl EmbeddingProvider for FailingEncoder {
        async fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("encoder offline")
        }
        fn dimension(&self) -> usize {
            2
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    /// "slow"가 들어간 텍스트에서만 잠시 멈추는 토크나이저
    struct SlowTokenizer {
        inner: VocabularyTokenizer,
        slow_started: AtomicBool,
    }

    impl Tokenizer for SlowTokenizer {
        fn segment(&self, text: &str) -> Vec<String> {
            if text.contains("slow") {
                self.slow_started.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
            }
            self.inner.segment(text)
        }

        fn register(&mut self, term: &str) {
            self.inner.register(term);
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_nothing() {
        let retriever = Retriever::from_documents(config(), vec![]);
        assert!(retriever.retrieve("积分", 4).await.is_empty());
        assert_eq!(retriever.stats().chunks, 0);
    }

    #[tokio::test]
    async fn test_best_match_first() {
        let retriever = Retriever::from_documents(config(), corpus());
        let hits = retriever.retrieve("续费", 1).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "renew.txt");
        assert_eq!(hits[0].idx, 1);
        assert!(hits[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_top_k_is_clamped() {
        let retriever = Retriever::from_documents(config(), corpus());
        assert_eq!(retriever.retrieve("积分", 100).await.len(), 3);
    }

    #[tokio::test]
    async fn test_zero_top_k_returns_single_best_hit() {
        let retriever = Retriever::from_documents(config(), corpus());
        let hits = retriever.retrieve("续费", 0).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0], retriever.retrieve("续费", 1).await[0]);
        assert_eq!(hits[0].source, "renew.txt");
    }

    #[tokio::test]
    async fn test_empty_query_ranks_by_chunk_order() {
        let retriever = Retriever::from_documents(config(), corpus());
        let hits = retriever.retrieve("!!!", 3).await;
        let sources: Vec<&str> = hits.iter().map(|h| h.source.as_str()).collect();
        assert_eq!(sources, vec!["points.txt", "renew.txt", "invoice.txt"]);
        assert!(hits.iter().all(|h| h.score == 0.0));
    }

    #[tokio::test]
    async fn test_pool_fallback_result_count() {
        let mut config = config();
        config.rules = RuleConfig {
            left: vec!["积分".to_string()],
            right: vec!["兑换".to_string()],
            ..Default::default()
        };
        let retriever = Retriever::from_documents(config, corpus());

        // both = [points] 하나뿐이므로 top_k=2면 either, 그것도 하나라 all
        let hits = retriever.retrieve("积分", 2).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "points.txt");

        let hits = retriever.retrieve("积分", 1).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "points.txt");
    }

    #[tokio::test]
    async fn test_bonus_changes_order_but_not_score() {
        let mut config = config();
        config.rules.bonus = vec![WeightedKeyword {
            keyword: "发票".to_string(),
            weight: 100.0,
        }];
        let retriever = Retriever::from_documents(config, corpus());
        let hits = retriever.retrieve("积分", 3).await;
        assert_eq!(hits[0].source, "invoice.txt");
        assert_eq!(hits[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_rerank_reorders_with_encoder() {
        let retriever = Retriever::from_documents(config(), corpus())
            .with_reranker(Arc::new(MatchEncoder { needle: "发票" }));
        assert!(retriever.has_reranker());

        // 发票 문서에는 "积分"이 없지만 인코더가 질의와 같은 방향으로 봄
        let hits = retriever.retrieve("积分", 3).await;
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].source, "invoice.txt");
        assert_eq!(hits[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_rerank_only_sees_top_candidates() {
        let mut config = config();
        config.rerank.candidates = 2;
        let retriever = Retriever::from_documents(config, corpus())
            .with_reranker(Arc::new(MatchEncoder { needle: "发票" }));

        // 보정 순서: points, renew, invoice -> invoice는 상위 2개 밖
        let hits = retriever.retrieve("积分", 2).await;
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.source != "invoice.txt"));
    }

    #[tokio::test]
    async fn test_fusion_weights_change_order() {
        let mut config = config();
        config.rerank.lexical_weight = 1.0;
        config.rerank.semantic_weight = 0.0;
        let lexical_only = Retriever::from_documents(config, corpus())
            .with_reranker(Arc::new(MatchEncoder { needle: "发票" }));
        let default_weights = Retriever::from_documents(RetrievalConfig::default(), corpus())
            .with_reranker(Arc::new(MatchEncoder { needle: "发票" }));

        assert_eq!(lexical_only.retrieve("积分", 1).await[0].source, "points.txt");
        assert_eq!(default_weights.retrieve("积分", 1).await[0].source, "invoice.txt");
    }

    #[tokio::test]
    async fn test_rerank_disabled_by_config() {
        let mut config = config();
        config.rerank.enabled = false;
        let retriever = Retriever::from_documents(config, corpus())
            .with_reranker(Arc::new(MatchEncoder { needle: "发票" }));
        assert!(!retriever.has_reranker());
        let hits = retriever.retrieve("积分", 1).await;
        assert_eq!(hits[0].source, "points.txt");
    }

    #[tokio::test]
    async fn test_failing_encoder_degrades_to_lexical() {
        let plain = Retriever::from_documents(config(), corpus());
        let degraded =
            Retriever::from_documents(config(), corpus()).with_reranker(Arc::new(FailingEncoder));

        assert_eq!(
            plain.retrieve("续费", 3).await,
            degraded.retrieve("续费", 3).await
        );
    }

    #[tokio::test]
    async fn test_held_snapshot_survives_reload() {
        let retriever = Retriever::from_documents(config(), corpus());
        let held = retriever.snapshot();
        assert_eq!(held.version(), 1);

        let fresh = retriever.reload_from(&[Document::new("new.txt", "会员等级说明")]);
        assert_eq!(fresh.version(), 2);
        assert_eq!(retriever.snapshot().version(), 2);

        let old_hits = retriever.retrieve_in(&held, "续费", 1).await;
        assert_eq!(old_hits[0].source, "renew.txt");

        let new_hits = retriever.retrieve("续费", 1).await;
        assert_eq!(new_hits[0].source, "new.txt");
        assert!(retriever.get_chunk("renew.txt", 1).is_none());
        assert!(held.get_chunk("renew.txt", 1).is_some());
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let retriever = Arc::new(Retriever::from_documents(config(), corpus()));
        let other = vec![Document::new("solo.txt", "只有一个文档")];

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let retriever = Arc::clone(&retriever);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let snapshot = retriever.snapshot();
                        let expected = if snapshot.version() % 2 == 1 { 3 } else { 1 };
                        assert_eq!(snapshot.len(), expected);
                        assert_eq!(snapshot.normalized().len(), snapshot.len());
                        assert_eq!(snapshot.index().len(), snapshot.len());
                    }
                })
            })
            .collect();

        for i in 0..20 {
            if i % 2 == 0 {
                retriever.reload_from(&other);
            } else {
                retriever.reload_from(&corpus());
            }
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_overlapping_reloads_keep_newest_snapshot() {
        let tokenizer = Arc::new(SlowTokenizer {
            inner: VocabularyTokenizer::new(),
            slow_started: AtomicBool::new(false),
        });
        let retriever = Arc::new(Retriever::with_tokenizer(
            config(),
            tokenizer.clone(),
            corpus(),
        ));

        // v2를 먼저 받지만 빌드가 늦게 끝남
        let slow = {
            let retriever = Arc::clone(&retriever);
            std::thread::spawn(move || {
                retriever
                    .reload_from(&[Document::new("old.txt", "slow old")])
                    .version()
            })
        };
        while !tokenizer.slow_started.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }

        let fresh = retriever.reload_from(&[Document::new("new.txt", "fresh new")]);
        assert_eq!(fresh.version(), 3);

        assert_eq!(slow.join().unwrap(), 3);
        let live = retriever.snapshot();
        assert_eq!(live.version(), 3);
        assert_eq!(live.chunks()[0].source, "new.txt");
    }

    #[tokio::test]
    async fn test_open_and_reload_from_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "积分规则说明").unwrap();

        let mut config = config();
        config.corpus.dir = temp.path().to_path_buf();
        let retriever = Retriever::open(config).unwrap();
        assert_eq!(retriever.stats().chunks, 1);

        std::fs::write(temp.path().join("b.txt"), "年卡续费说明").unwrap();
        let snapshot = retriever.reload().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(retriever.retrieve("续费", 1).await[0].source, "b.txt");
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_snapshot() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("kb");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), "积分规则说明").unwrap();

        let mut config = config();
        config.corpus.dir = dir.clone();
        let retriever = Retriever::open(config).unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
        assert!(retriever.reload().is_err());
        assert_eq!(retriever.snapshot().version(), 1);
        assert_eq!(retriever.retrieve("积分", 1).await.len(), 1);
    }

    #[test]
    fn test_open_missing_directory() {
        let temp = TempDir::new().unwrap();
        let mut config = config();
        config.corpus.dir = temp.path().join("missing");
        assert!(Retriever::open(config).is_err());
    }

    #[test]
    fn test_get_chunk() {
        let retriever = Retriever::from_documents(config(), corpus());
        let chunk = retriever.get_chunk("invoice.txt", 1).unwrap();
        assert_eq!(chunk.text, "发票开具说明");
        assert!(retriever.get_chunk("invoice.txt", 9).is_none());
    }

    #[test]
    fn test_split_preview_levels() {
        let retriever = Retriever::from_documents(config(), vec![]);
        let text = "Q：为什么积分只有9分？\nA：因为订单未完成。\n\n1. 第二段";
        let paragraphs = retriever.split_preview(text, PreviewLevel::Paragraph);
        assert_eq!(
            paragraphs,
            vec!["Q：为什么积分只有9分？\nA：因为订单未完成。", "1. 第二段"]
        );
        let blocks = retriever.split_preview(text, PreviewLevel::Block);
        assert_eq!(blocks.len(), 1);
    }
}
