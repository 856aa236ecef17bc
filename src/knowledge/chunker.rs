//! Text Chunking Module
//!
//! 구조 인식 문단을 크기 제한 청크로 묶습니다.
//!
//! 1. `clean_text`로 원문 정리
//! 2. `Segmenter`로 문단 분할 (Q&A, 제목 경계 보존)
//! 3. 문단 경계를 깨지 않고 `size` 이하로 탐욕적 패킹
//! 4. 인접 청크 사이에 앞 청크 끝 `overlap` 문자를 붙여 문맥 연결

use serde::{Deserialize, Serialize};

use crate::collector::Document;

use super::normalizer::clean_text;
use super::segmenter::Segmenter;

/// 문단/오버랩 구분자
const SEPARATOR: &str = "\n\n";

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub size: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 500,
            overlap: 150,
        }
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 검색 단위 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 청크 본문 (오버랩 포함)
    pub text: String,
    /// 원본 파일 이름
    pub source: String,
    /// 소스 내 순번 (1부터 시작)
    pub idx: usize,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;
}

// ============================================================================
// StructuredChunker
// ============================================================================

/// 구조 인식 청커
///
/// 문단은 청크 안에서 절대 쪼개지지 않습니다.
/// 단일 문단이 `size`를 넘으면 그 문단 하나가 초과 크기 청크가 됩니다.
#[derive(Debug, Clone)]
pub struct StructuredChunker {
    config: ChunkConfig,
    segmenter: Segmenter,
}

impl StructuredChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        let segmenter = Segmenter::new(config.size);
        Self { config, segmenter }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 문단 단계까지만 분할
    pub fn paragraphs(&self, text: &str) -> Vec<String> {
        self.segmenter.split_paragraphs(&clean_text(text))
    }

    /// 패킹까지 수행 (오버랩 전)
    pub fn blocks(&self, text: &str) -> Vec<String> {
        pack_paragraphs(&self.paragraphs(text), self.config.size)
    }

    /// 문서를 `Chunk` 목록으로 변환 (`idx`는 1부터)
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        self.chunk(&doc.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                text,
                source: doc.source.clone(),
                idx: i + 1,
            })
            .collect()
    }
}

impl Chunker for StructuredChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        apply_overlap(self.blocks(text), self.config.overlap)
    }
}

// ============================================================================
// Packing
// ============================================================================

/// 문단을 `max_chars` 이하 블록으로 탐욕적 패킹
pub fn pack_paragraphs(paragraphs: &[String], max_chars: usize) -> Vec<String> {
    let separator_chars = SEPARATOR.chars().count();
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for para in paragraphs {
        let para_chars = para.chars().count();

        if current.is_empty() {
            current.push_str(para);
            current_chars = para_chars;
        } else if current_chars + separator_chars + para_chars <= max_chars {
            current.push_str(SEPARATOR);
            current.push_str(para);
            current_chars += separator_chars + para_chars;
        } else {
            blocks.push(std::mem::take(&mut current).trim().to_string());
            current.push_str(para);
            current_chars = para_chars;
        }
    }

    if !current.is_empty() {
        blocks.push(current.trim().to_string());
    }

    blocks
}

/// 오버랩 적용
///
/// `blocks[i + 1]` 앞에는 오버랩이 붙기 전의 `blocks[i]` 끝부분이 붙습니다.
pub fn apply_overlap(blocks: Vec<String>, overlap_chars: usize) -> Vec<String> {
    if overlap_chars == 0 || blocks.len() < 2 {
        return blocks;
    }

    let mut result = Vec::with_capacity(blocks.len());

    for (i, block) in blocks.iter().enumerate() {
        if i == 0 {
            result.push(block.clone());
        } else {
            let tail = tail_chars(&blocks[i - 1], overlap_chars);
            result.push(format!("{}{}{}", tail, SEPARATOR, block));
        }
    }

    result
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 마지막 `n`개 문자 (UTF-8 안전)
#[inline]
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let total = s.chars().count();
    if total <= n {
        return s;
    }
    match s.char_indices().nth(total - n) {
        Some((start, _)) => &s[start..],
        None => s,
    }
}

// ============================================================================
// Tests
// ============================================================================
