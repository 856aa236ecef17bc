//! BM25 어휘 색인
//!
//! 토큰화된 청크 목록으로 한 번 만들고, 이후에는 읽기 전용입니다.
//! ref: Robertson & Zaragoza (2009), The Probabilistic Relevance Framework: BM25 and Beyond
//!
//! idf가 음수인 용어(절반 이상의 문서에 등장)는 `EPSILON * 평균 idf`로 대체합니다.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// 음수 idf 대체 비율
const EPSILON: f64 = 0.25;

// ============================================================================
// Bm25Config
// ============================================================================

/// BM25 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Config {
    /// 용어 빈도 포화
    pub k1: f64,
    /// 문서 길이 정규화 가중치
    pub b: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

// ============================================================================
// Bm25Index
// ============================================================================

/// BM25 (Okapi) 색인
#[derive(Debug, Clone)]
pub struct Bm25Index {
    config: Bm25Config,
    /// 문서별 용어 빈도
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Index {
    /// 토큰화된 문서 목록으로 색인 생성
    pub fn build(corpus: &[Vec<String>], config: Bm25Config) -> Self {
        let mut term_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_len = 0usize;

        for tokens in corpus {
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += tokens.len();
            doc_lens.push(tokens.len());
            term_freqs.push(freqs);
        }

        let avg_doc_len = if corpus.is_empty() {
            0.0
        } else {
            total_len as f64 / corpus.len() as f64
        };

        let idf = compute_idf(&doc_freq, corpus.len());

        tracing::debug!(
            "Built BM25 index: docs={}, terms={}, avgdl={:.1}",
            corpus.len(),
            idf.len(),
            avg_doc_len
        );

        Self {
            config,
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    /// 모든 문서에 대한 질의 점수
    ///
    /// 반환 길이는 항상 문서 수와 같습니다. 중복 질의 토큰은 각각 더해집니다.
    pub fn score(&self, query: &[String]) -> Vec<f64> {
        let Bm25Config { k1, b } = self.config;
        let mut scores = vec![0.0; self.term_freqs.len()];

        for term in query {
            let Some(&idf) = self.idf.get(term) else {
                continue;
            };

            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let Some(&tf) = freqs.get(term) else {
                    continue;
                };
                let tf = tf as f64;
                let len_ratio = self.doc_lens[i] as f64 / self.avg_doc_len;
                scores[i] += idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * len_ratio));
            }
        }

        scores
    }

    /// 용어의 idf (색인에 없으면 None)
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    pub fn len(&self) -> usize {
        self.term_freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.term_freqs.is_empty()
    }

    /// 색인된 고유 용어 수
    pub fn vocabulary_len(&self) -> usize {
        self.idf.len()
    }
}

/// idf 계산 (음수 idf는 `EPSILON * 평균 idf`로 대체)
///
/// 합산 순서를 고정하기 위해 정렬된 맵을 받습니다.
fn compute_idf(doc_freq: &BTreeMap<String, usize>, doc_count: usize) -> HashMap<String, f64> {
    let n = doc_count as f64;
    let mut idf = HashMap::with_capacity(doc_freq.len());
    let mut idf_sum = 0.0;
    let mut negative = Vec::new();

    for (term, &freq) in doc_freq {
        let freq = freq as f64;
        let value = (n - freq + 0.5).ln() - (freq + 0.5).ln();
        idf_sum += value;
        if value < 0.0 {
            negative.push(term.clone());
        }
        idf.insert(term.clone(), value);
    }

    if !idf.is_empty() {
        let floor = EPSILON * idf_sum / idf.len() as f64;
        for term in negative {
            idf.insert(term, floor);
        }
    }

    idf
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|d| d.iter().map(|t| t.to_string()).collect())
            .collect()
    }

    fn query(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_known_score() {
        // N=3, avgdl=2, "x"는 문서 0에만 존재
        let index = Bm25Index::build(
            &docs(&[&["x", "y"], &["z"], &["w", "w", "v"]]),
            Bm25Config::default(),
        );
        let scores = index.score(&query(&["x"]));
        let expected = (2.5f64).ln() - (1.5f64).ln();
        assert!((scores[0] - expected).abs() < 1e-9);
        assert_eq!(scores[1], 0.0);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn test_negative_idf_floor() {
        let index = Bm25Index::build(
            &docs(&[&["a", "b"], &["a", "c"], &["a", "d"]]),
            Bm25Config::default(),
        );
        let raw_a = (0.5f64).ln() - (3.5f64).ln();
        let raw_b = (2.5f64).ln() - (1.5f64).ln();
        let floor = EPSILON * (raw_a + 3.0 * raw_b) / 4.0;
        assert!((index.idf("a").unwrap() - floor).abs() < 1e-9);
        assert!((index.idf("b").unwrap() - raw_b).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_query_terms_accumulate() {
        let index = Bm25Index::build(
            &docs(&[&["积", "分"], &["续", "费"], &["年", "卡"]]),
            Bm25Config::default(),
        );
        let once = index.score(&query(&["积"]));
        let twice = index.score(&query(&["积", "积"]));
        assert!((twice[0] - 2.0 * once[0]).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_and_empty_query() {
        let index = Bm25Index::build(&docs(&[&["a"], &["b"]]), Bm25Config::default());
        assert_eq!(index.score(&query(&["zzz"])), vec![0.0, 0.0]);
        assert_eq!(index.score(&[]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_empty_index() {
        let index = Bm25Index::build(&[], Bm25Config::default());
        assert!(index.is_empty());
        assert_eq!(index.vocabulary_len(), 0);
        assert!(index.score(&query(&["a"])).is_empty());
    }

    #[test]
    fn test_empty_documents_do_not_produce_nan() {
        let index = Bm25Index::build(&docs(&[&[], &[]]), Bm25Config::default());
        let scores = index.score(&query(&["a"]));
        assert_eq!(scores, vec![0.0, 0.0]);
    }

    #[test]
    fn test_deterministic() {
        let corpus = docs(&[&["会", "员", "续", "费"], &["积", "分", "兑", "换"], &["会", "员"]]);
        let a = Bm25Index::build(&corpus, Bm25Config { k1: 1.2, b: 0.5 });
        let b = Bm25Index::build(&corpus, Bm25Config { k1: 1.2, b: 0.5 });
        let q = query(&["会", "员", "积"]);
        assert_eq!(a.score(&q), b.score(&q));
    }

    #[test]
    fn test_length_normalization() {
        // 같은 tf라면 짧은 문서가 더 높은 점수
        let index = Bm25Index::build(
            &docs(&[&["k", "x"], &["k", "x", "y", "z", "w"], &["q"], &["r"], &["s"]]),
            Bm25Config::default(),
        );
        let scores = index.score(&query(&["k"]));
        assert!(scores[0] > scores[1]);
    }
}
