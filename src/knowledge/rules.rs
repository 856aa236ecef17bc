//! 업무 규칙 기반 후보 선택 및 점수 가중
//!
//! - `CandidateSelector`: 좌/우 키워드 그룹으로 후보 풀을 좁히되,
//!   `top_k`보다 작으면 더 넓은 풀로 물러납니다 (both → either → all).
//! - `ScoreBlender`: 보너스/패널티/쌍 보너스 키워드로 BM25 점수를 보정합니다.
//!
//! 모든 키워드 매칭은 정규화된 청크 텍스트에 대한 부분 문자열 검사입니다.
//! 규칙이 비어 있으면 아무 효과가 없습니다.

use serde::{Deserialize, Serialize};

// ============================================================================
// Rule Configuration
// ============================================================================

/// 가중치가 붙은 키워드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedKeyword {
    pub keyword: String,
    pub weight: f64,
}

/// 두 키워드가 모두 있을 때 주는 보너스
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairBonus {
    pub left: String,
    pub right: String,
    pub weight: f64,
}

/// 키워드 규칙 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// 왼쪽 필수 그룹 (하나라도 있으면 충족, 비어 있으면 항상 충족)
    pub left: Vec<String>,
    /// 오른쪽 필수 그룹
    pub right: Vec<String>,
    pub bonus: Vec<WeightedKeyword>,
    pub penalty: Vec<WeightedKeyword>,
    pub pair_bonus: Vec<PairBonus>,
}

// ============================================================================
// CandidateSelector
// ============================================================================

/// 선택된 후보 풀 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// 두 그룹 모두 충족
    Both,
    /// 한 그룹 이상 충족
    Either,
    /// 전체 청크
    All,
}

/// 후보 풀
#[derive(Debug, Clone)]
pub struct CandidatePool {
    pub kind: PoolKind,
    /// 청크 인덱스 (오름차순)
    pub indices: Vec<usize>,
}

impl CandidatePool {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// 필수 키워드 그룹 기반 후보 선택기
#[derive(Debug, Clone, Default)]
pub struct CandidateSelector {
    left: Vec<String>,
    right: Vec<String>,
}

impl CandidateSelector {
    pub fn new(config: &RuleConfig) -> Self {
        Self {
            left: config.left.clone(),
            right: config.right.clone(),
        }
    }

    /// 후보 풀 선택
    ///
    /// `both`가 `top_k` 이상이면 `both`, 아니면 `either`, 그것도 부족하면 전체.
    pub fn select(&self, texts: &[String], top_k: usize) -> CandidatePool {
        let mut both = Vec::new();
        let mut either = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let has_left = group_satisfied(&self.left, text);
            let has_right = group_satisfied(&self.right, text);
            if has_left && has_right {
                both.push(i);
            }
            if has_left || has_right {
                either.push(i);
            }
        }

        let pool = if both.len() >= top_k {
            CandidatePool {
                kind: PoolKind::Both,
                indices: both,
            }
        } else if either.len() >= top_k {
            CandidatePool {
                kind: PoolKind::Either,
                indices: either,
            }
        } else {
            CandidatePool {
                kind: PoolKind::All,
                indices: (0..texts.len()).collect(),
            }
        };

        tracing::debug!("Candidate pool: {:?} ({} chunks)", pool.kind, pool.len());
        pool
    }
}

fn group_satisfied(group: &[String], text: &str) -> bool {
    group.is_empty() || group.iter().any(|k| text.contains(k.as_str()))
}

// ============================================================================
// ScoreBlender
// ============================================================================

/// 질의별 후보 점수
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub chunk_index: usize,
    /// BM25 점수
    pub lexical_score: f64,
    /// 규칙 보정 후 점수
    pub adjusted_score: f64,
}

/// 키워드 가중 점수 보정기
#[derive(Debug, Clone, Default)]
pub struct ScoreBlender {
    bonus: Vec<WeightedKeyword>,
    penalty: Vec<WeightedKeyword>,
    pair_bonus: Vec<PairBonus>,
}

impl ScoreBlender {
    pub fn new(config: &RuleConfig) -> Self {
        Self {
            bonus: config.bonus.clone(),
            penalty: config.penalty.clone(),
            pair_bonus: config.pair_bonus.clone(),
        }
    }

    /// 텍스트에 대한 총 보정값
    pub fn adjustment(&self, text: &str) -> f64 {
        let bonus: f64 = self
            .bonus
            .iter()
            .filter(|k| text.contains(k.keyword.as_str()))
            .map(|k| k.weight)
            .sum();
        let pair: f64 = self
            .pair_bonus
            .iter()
            .filter(|p| text.contains(p.left.as_str()) && text.contains(p.right.as_str()))
            .map(|p| p.weight)
            .sum();
        let penalty: f64 = self
            .penalty
            .iter()
            .filter(|k| text.contains(k.keyword.as_str()))
            .map(|k| k.weight)
            .sum();

        bonus + pair - penalty
    }

    /// 풀의 후보를 보정 점수 내림차순으로 정렬
    ///
    /// 동점은 청크 순서를 유지합니다.
    pub fn rank(&self, pool: &[usize], lexical: &[f64], texts: &[String]) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = pool
            .iter()
            .map(|&i| ScoredCandidate {
                chunk_index: i,
                lexical_score: lexical[i],
                adjusted_score: lexical[i] + self.adjustment(&texts[i]),
            })
            .collect();

        scored.sort_by(|a, b| b.adjusted_score.total_cmp(&a.adjusted_score));
        scored
    }
}

// ============================================================================
// Tests
// ============================================================================
