//! 코퍼스 수집 모듈
//!
//! 지식베이스 디렉터리에서 텍스트 문서를 읽어 `Document` 목록을 만듭니다.
//! 파일은 경로 순으로 정렬되어 읽히므로 청크 순서가 매번 같습니다.
//! 잘못된 UTF-8 바이트는 U+FFFD로 대체되며, 읽을 수 없는 파일은 경고 후 건너뜁니다.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::config::CorpusConfig;
use crate::error::{KbError, KbResult};

// ============================================================================
// Document
// ============================================================================

/// 수집된 원문 문서
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// 코퍼스 디렉터리 기준 파일 이름 (하위 폴더는 `/`로 연결)
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

// ============================================================================
// CorpusCollector
// ============================================================================

/// 코퍼스 디렉터리 수집기
#[derive(Debug, Clone)]
pub struct CorpusCollector {
    config: CorpusConfig,
}

impl CorpusCollector {
    pub fn new(config: CorpusConfig) -> Self {
        Self { config }
    }

    /// 대상 파일 경로 목록 (정렬됨)
    pub fn list_files(&self) -> KbResult<Vec<PathBuf>> {
        let root = &self.config.dir;
        if !root.is_dir() {
            return Err(KbError::CorpusNotFound(root.clone()));
        }

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .hidden(true)
            .sort_by_file_name(|a, b| a.cmp(b));
        if !self.config.recursive {
            builder.max_depth(Some(1));
        }

        let mut files = Vec::new();

        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            if self.has_allowed_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// 모든 문서 읽기
    pub fn collect(&self) -> KbResult<Vec<Document>> {
        let files = self.list_files()?;
        let mut documents = Vec::with_capacity(files.len());

        for path in files {
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!("Skipping unreadable file {:?}: {}", path, e);
                    continue;
                }
            };

            documents.push(Document {
                source: self.source_name(&path),
                text: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        tracing::info!(
            "Collected {} documents from {:?}",
            documents.len(),
            self.config.dir
        );
        Ok(documents)
    }

    fn has_allowed_extension(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self
                .config
                .extensions
                .iter()
                .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    fn source_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.config.dir).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

// ============================================================================
// Tests
// ============================================================================
