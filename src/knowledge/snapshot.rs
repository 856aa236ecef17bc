//! 색인 스냅샷
//!
//! 스냅샷은 청크, 정규화된 청크 텍스트, BM25 색인을 한데 묶은 불변 값입니다.
//! 전부 만들어진 뒤에만 공개되며, 공개 후에는 절대 바뀌지 않습니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collector::Document;
use crate::config::RetrievalConfig;

use super::chunker::{Chunk, StructuredChunker};
use super::lexical::{Bm25Config, Bm25Index};
use super::normalizer::Normalizer;
use super::tokenizer::{Tokenizer, VocabularyTokenizer};

// ============================================================================
// Snapshot
// ============================================================================

/// 불변 색인 스냅샷
#[derive(Debug)]
pub struct Snapshot {
    version: u64,
    chunks: Vec<Chunk>,
    /// `chunks[i]`의 정규화 텍스트
    normalized: Vec<String>,
    index: Bm25Index,
    /// (source, idx) -> 청크 위치
    lookup: HashMap<(String, usize), usize>,
    built_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn normalized(&self) -> &[String] {
        &self.normalized
    }

    pub fn index(&self) -> &Bm25Index {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// (source, idx)로 청크 조회
    pub fn get_chunk(&self, source: &str, idx: usize) -> Option<&Chunk> {
        self.lookup
            .get(&(source.to_string(), idx))
            .map(|&i| &self.chunks[i])
    }

    /// 스냅샷 통계
    pub fn stats(&self) -> SnapshotStats {
        let sources: BTreeSet<&str> = self.chunks.iter().map(|c| c.source.as_str()).collect();
        let total_chars: usize = self.chunks.iter().map(|c| c.text.chars().count()).sum();
        let total_bytes: usize = self.chunks.iter().map(|c| c.text.len()).sum();

        SnapshotStats {
            version: self.version,
            sources: sources.len(),
            chunks: self.chunks.len(),
            vocabulary: self.index.vocabulary_len(),
            avg_chunk_chars: if self.chunks.is_empty() {
                0.0
            } else {
                total_chars as f64 / self.chunks.len() as f64
            },
            total_bytes,
            built_at: self.built_at,
        }
    }
}

/// 스냅샷 통계
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStats {
    pub version: u64,
    pub sources: usize,
    pub chunks: usize,
    /// 색인된 고유 토큰 수
    pub vocabulary: usize,
    pub avg_chunk_chars: f64,
    pub total_bytes: usize,
    pub built_at: DateTime<Utc>,
}

// ============================================================================
// Indexer
// ============================================================================

/// 문서 -> 스냅샷 빌더
///
/// 문서와 질의는 같은 `Normalizer`/`Tokenizer`를 거칩니다.
#[derive(Clone)]
pub struct Indexer {
    chunker: StructuredChunker,
    normalizer: Normalizer,
    tokenizer: Arc<dyn Tokenizer>,
    bm25: Bm25Config,
}

impl Indexer {
    /// 설정으로 생성 (기본 사전 토크나이저 사용)
    pub fn new(config: &RetrievalConfig) -> Self {
        let tokenizer = VocabularyTokenizer::with_vocabulary(&config.tokenizer.vocabulary);
        Self {
            chunker: StructuredChunker::new(config.chunk.clone()),
            normalizer: Normalizer::new(&config.normalize),
            tokenizer: Arc::new(tokenizer),
            bm25: config.bm25,
        }
    }

    /// 토크나이저 교체
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn chunker(&self) -> &StructuredChunker {
        &self.chunker
    }

    /// 질의 정규화 + 토큰화
    pub fn prepare_query(&self, query: &str) -> (String, Vec<String>) {
        let normalized = self.normalizer.normalize(query);
        let tokens = self.tokenizer.segment(&normalized);
        (normalized, tokens)
    }

    /// 문서 목록으로 스냅샷 생성
    pub fn build(&self, documents: &[Document], version: u64) -> Snapshot {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunker.chunk_document(doc))
            .collect();

        let normalized: Vec<String> = chunks
            .iter()
            .map(|c| self.normalizer.normalize(&c.text))
            .collect();

        let tokenized: Vec<Vec<String>> = normalized
            .iter()
            .map(|text| self.tokenizer.segment(text))
            .collect();

        let index = Bm25Index::build(&tokenized, self.bm25);

        let lookup = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| ((c.source.clone(), c.idx), i))
            .collect();

        tracing::debug!(
            "Built snapshot v{}: {} documents -> {} chunks",
            version,
            documents.len(),
            chunks.len()
        );

        Snapshot {
            version,
            chunks,
            normalized,
            index,
            lookup,
            built_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("chunk", self.chunker.config())
            .field("tokenizer", &self.tokenizer.name())
            .field("bm25", &self.bm25)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
