//! Knowledge 모듈 - 업무 지식베이스 검색 코어
//!
//! - Normalizer: 원문 정리 + 문서/질의 공용 정규화
//! - Segmenter: Q&A, 제목 경계를 보존하는 문단 분할
//! - Chunker: 문단 패킹 + 비누적 오버랩
//! - Lexical: BM25 색인
//! - Rules: 필수 키워드 후보 풀 + 보너스/패널티 보정
//! - Rerank: 임베딩 코사인 유사도 혼합 리랭킹
//! - Retriever: 불변 스냅샷 교체 + 질의 파이프라인

mod chunker;
mod lexical;
mod normalizer;
mod rerank;
mod retriever;
mod rules;
mod segmenter;
mod snapshot;
mod tokenizer;

// Re-exports
pub use chunker::{apply_overlap, pack_paragraphs, Chunk, ChunkConfig, Chunker, StructuredChunker};
pub use lexical::{Bm25Config, Bm25Index};
pub use normalizer::{clean_text, Normalizer};
pub use rerank::{cosine_similarity, SemanticReranker};
pub use retriever::{Hit, PreviewLevel, Retriever, DEFAULT_TOP_K};
pub use rules::{
    CandidatePool, CandidateSelector, PairBonus, PoolKind, RuleConfig, ScoreBlender,
    ScoredCandidate, WeightedKeyword,
};
pub use segmenter::{classify_line, LineKind, SegmentMode, SegmentState, Segmenter};
pub use snapshot::{Indexer, Snapshot, SnapshotStats};
pub use tokenizer::{Tokenizer, VocabularyTokenizer};
