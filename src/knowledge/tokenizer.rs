//! 단어 분할(토크나이저)
//!
//! BM25 색인과 질의에 쓰이는 토큰을 만듭니다.
//! 언어별 형태소 분석기는 `Tokenizer` 트레이트로 교체할 수 있고,
//! 기본 구현은 사용자 사전 최장 일치 + 한자 단위 분할입니다.
//!
//! 사전에 없는 중국어 단어는 글자마다 토큰이 되므로 IDF도 글자 단위로 계산됩니다.
//! 예를 들어 "服务"를 찾으면 "服装"처럼 한 글자만 겹치는 청크도 점수를 받습니다.
//! 단어 단위 순위가 필요하면 자주 쓰는 용어를 `tokenizer.vocabulary`에 넣거나,
//! 형태소 분석기를 `Tokenizer`로 감싸 `Retriever::with_tokenizer`에 넘기면 됩니다.

use std::collections::HashSet;

// ============================================================================
// Tokenizer Trait
// ============================================================================

/// 단어 분할 트레이트
pub trait Tokenizer: Send + Sync {
    /// 텍스트를 토큰 목록으로 분할
    fn segment(&self, text: &str) -> Vec<String>;

    /// 분리되지 않아야 하는 도메인 용어 등록
    fn register(&mut self, term: &str);

    /// 토크나이저 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// VocabularyTokenizer
// ============================================================================

/// 사전 기반 기본 토크나이저
///
/// - 등록된 용어는 최장 일치로 하나의 토큰
/// - 한자는 글자 단위
/// - 그 외 문자/숫자 연속은 소문자 단어 하나
/// - 공백과 문장부호는 버림
#[derive(Debug, Clone, Default)]
pub struct VocabularyTokenizer {
    vocabulary: HashSet<String>,
    /// 사전 용어 최대 길이 (문자 수)
    max_term_chars: usize,
}

impl VocabularyTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 사전과 함께 생성
    pub fn with_vocabulary<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokenizer = Self::new();
        for term in terms {
            tokenizer.register(term.as_ref());
        }
        tokenizer
    }

    /// 사전 크기
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// `chars[start..]`에서 시작하는 가장 긴 사전 용어 길이
    fn longest_match(&self, chars: &[char], start: usize) -> Option<usize> {
        if self.max_term_chars == 0 {
            return None;
        }

        let upper = self.max_term_chars.min(chars.len() - start);
        (1..=upper).rev().find(|&len| {
            let candidate: String = chars[start..start + len].iter().collect();
            self.vocabulary.contains(&candidate)
        })
    }
}

impl Tokenizer for VocabularyTokenizer {
    fn segment(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if c.is_whitespace() {
                i += 1;
                continue;
            }

            if let Some(len) = self.longest_match(&chars, i) {
                tokens.push(chars[i..i + len].iter().collect());
                i += len;
                continue;
            }

            if is_cjk(c) {
                tokens.push(c.to_string());
                i += 1;
            } else if c.is_alphanumeric() {
                let start = i;
                while i < chars.len() && chars[i].is_alphanumeric() && !is_cjk(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(word.to_lowercase());
            } else {
                i += 1;
            }
        }

        tokens
    }

    fn register(&mut self, term: &str) {
        let term = term.trim();
        if term.is_empty() {
            return;
        }
        self.max_term_chars = self.max_term_chars.max(term.chars().count());
        self.vocabulary.insert(term.to_string());
    }

    fn name(&self) -> &'static str {
        "VocabularyTokenizer"
    }
}

/// CJK 통합 한자 (기본 + 확장 A)
#[inline]
fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_mixed_text() {
        let tokenizer = VocabularyTokenizer::new();
        assert_eq!(
            tokenizer.segment("PLUS会员 Hello, World 42"),
            vec!["plus", "会", "员", "hello", "world", "42"]
        );
    }

    #[test]
    fn test_vocabulary_terms_kept_whole() {
        let tokenizer = VocabularyTokenizer::with_vocabulary(["PLUS会员", "积分", "折算积分"]);
        assert_eq!(
            tokenizer.segment("PLUS会员折算积分"),
            vec!["PLUS会员", "折算积分"]
        );
        assert_eq!(tokenizer.segment("积分规则"), vec!["积分", "规", "则"]);
        assert_eq!(tokenizer.vocabulary_len(), 3);
    }

    #[test]
    fn test_register_ignores_blank() {
        let mut tokenizer = VocabularyTokenizer::new();
        tokenizer.register("   ");
        assert_eq!(tokenizer.vocabulary_len(), 0);
        tokenizer.register("年卡");
        assert_eq!(tokenizer.segment("年卡到期"), vec!["年卡", "到", "期"]);
    }

    #[test]
    fn test_unregistered_words_split_per_character() {
        let plain = VocabularyTokenizer::new();
        assert_eq!(plain.segment("洗车服务"), vec!["洗", "车", "服", "务"]);
        // 한 글자만 겹쳐도 공통 토큰이 생김
        assert!(plain.segment("服装").contains(&"服".to_string()));

        let tuned = VocabularyTokenizer::with_vocabulary(["洗车", "服务"]);
        assert_eq!(tuned.segment("洗车服务"), vec!["洗车", "服务"]);
        assert!(!tuned.segment("服装").contains(&"服务".to_string()));
    }

    #[test]
    fn test_segment_empty() {
        let tokenizer = VocabularyTokenizer::new();
        assert!(tokenizer.segment("").is_empty());
        assert!(tokenizer.segment(" ，。 ").is_empty());
    }
}
