//! kb-retriever - 업무 지식베이스 검색기
//!
//! 고객 상담용 텍스트 지식베이스를 구조 인식 청크로 나누고,
//! BM25 + 업무 키워드 규칙 + 선택적 시맨틱 리랭킹으로 검색합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;

// Re-exports
pub use collector::{CorpusCollector, Document};
pub use config::RetrievalConfig;
pub use embedding::{create_embedder, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use error::{KbError, KbResult};
pub use knowledge::{Chunk, Hit, PreviewLevel, Retriever, Snapshot, SnapshotStats};
