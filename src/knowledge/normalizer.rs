//! 텍스트 정리 및 정규화
//!
//! - `clean_text`: BOM/제로폭 문자, OCR 잔재(`???`), 구분 기호 정리
//! - `Normalizer`: 불용어 제거, 허용 문자 필터, 동의어 치환
//!
//! 문서 색인과 질의 점수 계산 모두 같은 `Normalizer`를 거쳐야
//! BM25 점수가 서로 비교 가능합니다.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::NormalizeConfig;

/// 3개 이상 연속된 물음표 (OCR 잔재)
static QUESTION_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?{3,}").unwrap());

/// 구분 기호 및 탭
static SEPARATOR_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[·•◦\t]+").unwrap());

/// 허용 목록(한자, 영문, 숫자, 일부 문장부호, 공백) 밖의 문자
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\x{4E00}-\x{9FA5}A-Za-z0-9，。；：、\-\(\)（）/ ]+").unwrap()
});

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// clean
// ============================================================================

/// 원문 텍스트 정리 (멱등)
pub fn clean_text(text: &str) -> String {
    let s = text.replace(&['\u{FEFF}', '\u{200B}'][..], "");
    let s = QUESTION_RUN.replace_all(&s, "");
    let s = SEPARATOR_RUN.replace_all(&s, " ");
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    s.trim().to_string()
}

// ============================================================================
// Normalizer
// ============================================================================

/// 문서/질의 공용 정규화기
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    stopwords: Vec<String>,
    synonyms: Vec<(String, String)>,
}

impl Normalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            stopwords: config
                .stopwords
                .iter()
                .filter(|w| !w.is_empty())
                .cloned()
                .collect(),
            synonyms: config
                .synonyms
                .iter()
                .filter(|(from, _)| !from.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// 정규화
    ///
    /// 불용어와 동의어는 단어 경계를 보지 않는 부분 문자열 치환입니다.
    /// 불용어가 더 긴 토큰 내부에서도 지워질 수 있습니다.
    pub fn normalize(&self, text: &str) -> String {
        let mut s = text.to_string();

        for stopword in &self.stopwords {
            s = s.replace(stopword.as_str(), " ");
        }

        let mut s = DISALLOWED.replace_all(&s, " ").into_owned();

        for (from, to) in &self.synonyms {
            s = s.replace(from.as_str(), to);
        }

        MULTI_SPACE.replace_all(&s, " ").trim().to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
