//! 구조 인식 문단 분할
//!
//! 정리된 문서 텍스트를 줄 단위 상태 기계로 읽어
//! 의미 단위(일반 문단, 제목으로 시작하는 문단, Q&A 묶음)로 나눕니다.
//!
//! 줄 분류 우선순위: 제목/번호 → 질문(`Q:`/`问：`) → 답변(`A:`/`答：`) → 빈 줄 → 일반
//!
//! 청크 크기를 넘는 문단은 문장 종결 부호 뒤에서 다시 나누되,
//! 한 문장 자체가 길면 자르지 않고 그대로 둡니다.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};

/// 제목/번호 목록 패턴
static HEADING_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // 1. / 1.1 / 1.2.3 / 1、 / 1)
        r"^\s*\d+(?:\.\d+)*[、\.)]?\s+",
        // ① ~ ⑳
        r"^\s*[\x{2460}-\x{2473}]",
        // （一）（二）
        r"^\s*[（(][一二三四五六七八九十]+[)）]\s*",
        // 一、二、
        r"^\s*[一二三四五六七八九十]+、\s*",
        // - • · *
        r"^\s*[-•·*]\s+",
    ])
    .unwrap()
});

static QUESTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:Q:|Q：|问:|问：)").unwrap());

static ANSWER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:A:|A：|答:|答：)").unwrap());

/// 문장 종결 부호
const SENTENCE_TERMINATORS: [char; 6] = ['。', '；', '！', '!', '？', '?'];

// ============================================================================
// Line Classification
// ============================================================================

/// 줄 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Heading,
    Question,
    Answer,
    Blank,
    Plain,
}

/// 우선순위에 따라 줄 분류
pub fn classify_line(line: &str) -> LineKind {
    if HEADING_PATTERNS.is_match(line) {
        LineKind::Heading
    } else if QUESTION_PATTERN.is_match(line) {
        LineKind::Question
    } else if ANSWER_PATTERN.is_match(line) {
        LineKind::Answer
    } else if line.trim().is_empty() {
        LineKind::Blank
    } else {
        LineKind::Plain
    }
}

// ============================================================================
// Segmentation State
// ============================================================================

/// 현재 누적 중인 버퍼 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentMode {
    #[default]
    Plain,
    Qa,
}

/// 분할 상태 기계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentState {
    pub mode: SegmentMode,
    pub plain_buffer: Vec<String>,
    pub qa_buffer: Vec<String>,
    pub answer_seen: bool,
}

impl SegmentState {
    /// 한 줄을 소비하고 (다음 상태, 완성된 문단)을 반환
    pub fn step(self, line: &str) -> (SegmentState, Option<String>) {
        match classify_line(line) {
            LineKind::Heading => {
                let (mut next, done) = self.flush();
                next.plain_buffer.push(line.to_string());
                (next, done)
            }
            LineKind::Blank => self.flush(),
            LineKind::Question => {
                let (mut next, done) = self.flush();
                next.mode = SegmentMode::Qa;
                next.qa_buffer.push(line.to_string());
                next.answer_seen = false;
                (next, done)
            }
            LineKind::Answer if self.mode == SegmentMode::Qa => {
                let mut next = self;
                next.qa_buffer.push(line.to_string());
                next.answer_seen = true;
                (next, None)
            }
            LineKind::Answer | LineKind::Plain => {
                let mut next = self;
                match next.mode {
                    SegmentMode::Qa => next.qa_buffer.push(line.to_string()),
                    SegmentMode::Plain => next.plain_buffer.push(line.to_string()),
                }
                (next, None)
            }
        }
    }

    /// 입력 종료 시 남은 버퍼 반환
    pub fn finish(self) -> Option<String> {
        self.flush().1
    }

    /// 열린 버퍼를 문단으로 내보내고 빈 상태로 초기화
    fn flush(self) -> (SegmentState, Option<String>) {
        let buffer = match self.mode {
            SegmentMode::Plain => self.plain_buffer,
            SegmentMode::Qa => self.qa_buffer,
        };
        (SegmentState::default(), join_lines(&buffer))
    }
}

fn join_lines(lines: &[String]) -> Option<String> {
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Segmenter
// ============================================================================

/// 문단 분할기
#[derive(Debug, Clone)]
pub struct Segmenter {
    /// 문단 최대 크기 (문자 수)
    max_chars: usize,
}

impl Segmenter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// 정리된 텍스트를 문단 목록으로 분할
    pub fn split_paragraphs(&self, text: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut state = SegmentState::default();

        for line in text.split('\n') {
            let (next, done) = state.step(line);
            state = next;
            parts.extend(done);
        }
        parts.extend(state.finish());

        parts
            .into_iter()
            .flat_map(|p| self.split_long(p))
            .collect()
    }

    /// 긴 문단을 문장 단위로 다시 묶기
    fn split_long(&self, paragraph: String) -> Vec<String> {
        if paragraph.chars().count() <= self.max_chars {
            return vec![paragraph];
        }

        let mut pieces = Vec::new();
        let mut buf = String::new();
        let mut buf_chars = 0;

        for sentence in split_sentences(&paragraph) {
            let sentence_chars = sentence.chars().count();
            if buf_chars + sentence_chars <= self.max_chars {
                buf.push_str(sentence);
                buf_chars += sentence_chars;
            } else {
                push_trimmed(&mut pieces, &buf);
                buf = sentence.to_string();
                buf_chars = sentence_chars;
            }
        }
        push_trimmed(&mut pieces, &buf);

        pieces
    }
}

/// 종결 부호를 앞 문장에 붙인 채로 분리
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if SENTENCE_TERMINATORS.contains(&c) {
            let end = i + c.len_utf8();
            sentences.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

fn push_trimmed(pieces: &mut Vec<String>, buf: &str) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
}

// ============================================================================
// Tests
// ============================================================================
