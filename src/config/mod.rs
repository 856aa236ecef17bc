//! 설정 모듈
//!
//! Figment로 기본값 → TOML 파일 → 환경변수 순서로 설정을 병합합니다.
//!
//! - 기본 파일: `./kb-retriever.toml`, `<config_dir>/kb-retriever/config.toml`
//! - 환경변수: `KB_` 접두사, `__`로 중첩 (예: `KB_BM25__K1=1.2`)
//! - 호환: `BM25_K1`, `BM25_B`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{KbError, KbResult};
use crate::knowledge::{Bm25Config, ChunkConfig, RuleConfig};

/// 로컬 설정 파일 이름
pub const CONFIG_FILE_NAME: &str = "kb-retriever.toml";

// ============================================================================
// Sections
// ============================================================================

/// 코퍼스(문서 디렉토리) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// 문서 디렉토리
    pub dir: PathBuf,
    /// 수집할 확장자
    pub extensions: Vec<String>,
    /// 하위 디렉토리 포함 여부
    pub recursive: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("kb"),
            extensions: vec!["txt".to_string()],
            recursive: false,
        }
    }
}

/// 정규화 설정 (불용어, 동의어)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// 부분 문자열 단위로 제거되는 불용어
    pub stopwords: Vec<String>,
    /// 순서대로 적용되는 `[from, to]` 치환 목록
    pub synonyms: Vec<(String, String)>,
}

/// 토크나이저 사용자 사전
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// 분리되지 않아야 하는 도메인 용어
    pub vocabulary: Vec<String>,
}

/// 시맨틱 리랭킹 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    /// 리랭킹 후보 상한
    pub candidates: usize,
    pub lexical_weight: f64,
    pub semantic_weight: f64,
    /// 임베딩 차원
    pub dimension: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            candidates: 30,
            lexical_weight: 0.4,
            semantic_weight: 0.6,
            dimension: 768,
        }
    }
}

// ============================================================================
// RetrievalConfig
// ============================================================================

/// 검색 코어 전체 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub corpus: CorpusConfig,
    pub chunk: ChunkConfig,
    pub bm25: Bm25Config,
    pub normalize: NormalizeConfig,
    pub tokenizer: TokenizerConfig,
    pub rules: RuleConfig,
    pub rerank: RerankConfig,
}

impl RetrievalConfig {
    /// 설정 로드 및 검증
    ///
    /// `path`가 주어지면 그 파일만, 아니면 기본 위치의 파일들을 병합합니다.
    pub fn load(path: Option<&Path>) -> KbResult<Self> {
        let config: Self = Self::figment(path)
            .extract()
            .map_err(|e| KbError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 병합 순서가 적용된 Figment
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match path {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                if let Some(user) = user_config_path() {
                    figment = figment.merge(Toml::file(user));
                }
                figment = figment.merge(Toml::file(CONFIG_FILE_NAME));
            }
        }

        figment
            .merge(Env::prefixed("KB_").split("__"))
            .merge(Env::raw().filter_map(|key| {
                if key.as_str().eq_ignore_ascii_case("BM25_K1") {
                    Some("bm25.k1".into())
                } else if key.as_str().eq_ignore_ascii_case("BM25_B") {
                    Some("bm25.b".into())
                } else {
                    None
                }
            }))
    }

    /// 값 범위 검증
    pub fn validate(&self) -> KbResult<()> {
        if self.chunk.size == 0 {
            return Err(KbError::InvalidConfig("chunk.size must be > 0".into()));
        }
        if !(self.bm25.k1.is_finite() && self.bm25.k1 >= 0.0) {
            return Err(KbError::InvalidConfig(format!(
                "bm25.k1 must be >= 0 (got {})",
                self.bm25.k1
            )));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(KbError::InvalidConfig(format!(
                "bm25.b must be within [0, 1] (got {})",
                self.bm25.b
            )));
        }
        if self.rerank.candidates == 0 {
            return Err(KbError::InvalidConfig(
                "rerank.candidates must be > 0".into(),
            ));
        }
        if !(self.rerank.lexical_weight.is_finite() && self.rerank.semantic_weight.is_finite()) {
            return Err(KbError::InvalidConfig("rerank weights must be finite".into()));
        }
        if let Some(term) = find_synonym_cycle(&self.normalize.synonyms) {
            return Err(KbError::InvalidConfig(format!(
                "cyclic synonym mapping through '{}'",
                term
            )));
        }
        Ok(())
    }
}

/// 사용자 설정 파일 경로 (`<config_dir>/kb-retriever/config.toml`)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kb-retriever").join("config.toml"))
}

/// 동의어 치환이 자기 자신으로 되돌아오는 항목 탐지
///
/// 정확히 일치하는 `from`/`to` 연결만 추적합니다.
fn find_synonym_cycle(synonyms: &[(String, String)]) -> Option<String> {
    let map: HashMap<&str, &str> = synonyms
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();

    for &start in map.keys() {
        let mut current = start;
        for _ in 0..map.len() {
            match map.get(current) {
                Some(&next) if next == start => return Some(start.to_string()),
                Some(&next) => current = next,
                None => break,
            }
        }
    }

    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RetrievalConfig::default();
        assert_eq!(config.chunk.size, 500);
        assert_eq!(config.chunk.overlap, 150);
        assert_eq!(config.bm25.k1, 1.5);
        assert_eq!(config.bm25.b, 0.75);
        assert_eq!(config.rerank.candidates, 30);
        assert!(config.normalize.stopwords.is_empty());
        assert!(config.rules.bonus.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[chunk]
size = 300

[normalize]
stopwords = ["您好"]
synonyms = [["续约", "续费"]]

[[rules.bonus]]
keyword = "积分"
weight = 2.0
"#,
        )
        .unwrap();

        let config: RetrievalConfig = RetrievalConfig::figment(Some(&path)).extract().unwrap();
        assert_eq!(config.chunk.size, 300);
        assert_eq!(config.chunk.overlap, 150);
        assert_eq!(config.normalize.stopwords, vec!["您好".to_string()]);
        assert_eq!(
            config.normalize.synonyms,
            vec![("续约".to_string(), "续费".to_string())]
        );
        assert_eq!(config.rules.bonus.len(), 1);
        assert_eq!(config.rules.bonus[0].weight, 2.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = RetrievalConfig::default();
        config.chunk.size = 0;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.bm25.b = 1.5;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.rerank.candidates = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_synonym_cycle_detected() {
        let mut config = RetrievalConfig::default();
        config.normalize.synonyms = vec![
            ("开通".to_string(), "开卡".to_string()),
            ("开卡".to_string(), "开通".to_string()),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cyclic synonym"));

        config.normalize.synonyms = vec![
            ("续约".to_string(), "续费".to_string()),
            ("开通".to_string(), "开卡".to_string()),
        ];
        assert!(config.validate().is_ok());
    }
}
