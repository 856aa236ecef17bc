//! 라이브러리 경계 에러 타입
//!
//! 설정 검증과 코퍼스 디렉터리 누락만 타입으로 구분합니다.
//! 개별 파일 읽기 실패는 경고 후 건너뛰므로 에러가 되지 않습니다.
//! 나머지 애플리케이션 흐름(CLI, 임베딩)은 `anyhow`를 사용합니다.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KbError {
    #[error("Corpus directory not found: {0:?}")]
    CorpusNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type KbResult<T> = std::result::Result<T, KbError>;
