//! CLI 모듈
//!
//! kb-retriever CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{user_config_path, RetrievalConfig, CONFIG_FILE_NAME};
use crate::embedding::{create_embedder, has_api_key};
use crate::knowledge::{Hit, PreviewLevel, Retriever, DEFAULT_TOP_K};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "kb-retriever")]
#[command(version, about = "업무 지식베이스 검색기 (BM25 + 규칙 + 시맨틱 리랭킹)", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 코퍼스 디렉터리 (설정의 corpus.dir 대신 사용)
    #[arg(long, global = true)]
    pub corpus: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 지식베이스 검색
    Search {
        /// 질문
        query: String,

        /// 결과 개수
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,

        /// 결과를 텍스트 파일로 저장
        #[arg(long, conflicts_with = "export_auto")]
        export: Option<PathBuf>,

        /// 결과를 hits_<시각>.txt로 저장
        #[arg(long)]
        export_auto: bool,
    },

    /// 청크 하나의 전체 텍스트
    Chunk {
        /// 소스 파일 이름
        #[arg(short, long)]
        source: String,

        /// 청크 번호 (1부터)
        #[arg(short, long)]
        idx: usize,
    },

    /// 로드된 청크 미리보기
    Chunks {
        /// 표시할 청크 수
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// 청크당 표시 글자 수
        #[arg(short, long, default_value = "120")]
        chars: usize,
    },

    /// 파일 분할 미리보기
    Split {
        /// 분할할 파일
        file: PathBuf,

        /// 분할 단계
        #[arg(long, value_enum, default_value = "block")]
        level: SplitLevel,

        /// 표시할 조각 수
        #[arg(short, long, default_value = "30")]
        limit: usize,

        /// 조각당 표시 글자 수 (생략 시 전체)
        #[arg(short, long)]
        chars: Option<usize>,
    },

    /// 시스템 상태 확인
    Status,
}

/// 분할 미리보기 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SplitLevel {
    /// 문단
    Para,
    /// 패킹된 블록 (오버랩 전)
    Block,
}

impl From<SplitLevel> for PreviewLevel {
    fn from(level: SplitLevel) -> Self {
        match level {
            SplitLevel::Para => PreviewLevel::Paragraph,
            SplitLevel::Block => PreviewLevel::Block,
        }
    }
}

// ============================================================================
// Command Execution
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.corpus)?;

    match cli.command {
        Commands::Search {
            query,
            top_k,
            json,
            export,
            export_auto,
        } => {
            let export = if export_auto {
                Some(auto_export_path())
            } else {
                export
            };
            cmd_search(config, &query, top_k, json, export).await
        }
        Commands::Chunk { source, idx } => cmd_chunk(config, &source, idx),
        Commands::Chunks { limit, chars } => cmd_chunks(config, limit, chars),
        Commands::Split {
            file,
            level,
            limit,
            chars,
        } => cmd_split(config, &file, level, limit, chars),
        Commands::Status => cmd_status(config),
    }
}

fn load_config(path: Option<&Path>, corpus: Option<PathBuf>) -> Result<RetrievalConfig> {
    let mut config = RetrievalConfig::load(path).context("설정 로드 실패")?;
    if let Some(dir) = corpus {
        config.corpus.dir = dir;
    }
    Ok(config)
}

fn open_retriever(config: RetrievalConfig) -> Result<Retriever> {
    let dir = config.corpus.dir.clone();
    Retriever::open(config).with_context(|| format!("코퍼스 로드 실패: {}", dir.display()))
}

/// 검색용 검색기 (API 키가 있으면 리랭커 연결)
fn open_search_retriever(config: RetrievalConfig) -> Result<Retriever> {
    let rerank = config.rerank.clone();
    let retriever = open_retriever(config)?;

    if !rerank.enabled {
        return Ok(retriever);
    }

    match create_embedder(rerank.dimension) {
        Ok(embedder) => Ok(retriever.with_reranker(embedder)),
        Err(e) => {
            tracing::info!("Semantic rerank unavailable, lexical only: {}", e);
            Ok(retriever)
        }
    }
}

/// 검색 명령어 (search)
async fn cmd_search(
    config: RetrievalConfig,
    query: &str,
    top_k: usize,
    json: bool,
    export: Option<PathBuf>,
) -> Result<()> {
    let retriever = open_search_retriever(config)?;
    let hits = retriever.retrieve(query, top_k).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&hits).context("JSON 직렬화 실패")?
        );
    } else {
        println!("[*] 검색 중: \"{}\"", query);

        if hits.is_empty() {
            println!("\n[!] 검색 결과가 없습니다.");
        } else {
            println!("\n[OK] 검색 결과 ({} 건):\n", hits.len());
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. {}#{} [점수: {:.3}]",
                    i + 1,
                    hit.source,
                    hit.idx,
                    hit.score
                );
                println!("   {}", truncate_text(&hit.text, 200));
                println!();
            }
        }
    }

    if let Some(path) = export {
        std::fs::write(&path, render_hits(query, &hits))
            .with_context(|| format!("결과 저장 실패: {}", path.display()))?;
        println!("[OK] 결과 저장: {}", path.display());
    }

    Ok(())
}

/// 청크 전문 명령어 (chunk)
fn cmd_chunk(config: RetrievalConfig, source: &str, idx: usize) -> Result<()> {
    let retriever = open_retriever(config)?;

    let chunk = retriever
        .get_chunk(source, idx)
        .ok_or_else(|| anyhow::anyhow!("청크를 찾을 수 없습니다: {}#{}", source, idx))?;

    println!("[OK] {}#{} ({} chars)\n", chunk.source, chunk.idx, chunk.text.chars().count());
    println!("{}", chunk.text);
    Ok(())
}

/// 청크 목록 명령어 (chunks)
fn cmd_chunks(config: RetrievalConfig, limit: usize, chars: usize) -> Result<()> {
    let retriever = open_retriever(config)?;
    let snapshot = retriever.snapshot();

    if snapshot.is_empty() {
        println!("[!] 로드된 청크가 없습니다.");
        return Ok(());
    }

    println!("[OK] 로드된 청크: {} 개\n", snapshot.len());

    for chunk in snapshot.chunks().iter().take(limit) {
        println!(
            "  {}#{} ({} chars)",
            chunk.source,
            chunk.idx,
            chunk.text.chars().count()
        );
        println!("        {}", truncate_text(&chunk.text, chars));
    }

    Ok(())
}

/// 분할 미리보기 명령어 (split)
fn cmd_split(
    config: RetrievalConfig,
    file: &Path,
    level: SplitLevel,
    limit: usize,
    chars: Option<usize>,
) -> Result<()> {
    if !file.is_file() {
        bail!("파일을 찾을 수 없습니다: {}", file.display());
    }

    let bytes =
        std::fs::read(file).with_context(|| format!("파일 읽기 실패: {}", file.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    // 미리보기에는 코퍼스가 필요 없음
    let retriever = Retriever::from_documents(config, vec![]);
    let pieces = retriever.split_preview(&text, level.into());

    println!("[OK] {:?}: {} 개\n", level, pieces.len());

    for (i, piece) in pieces.iter().take(limit).enumerate() {
        let len = piece.chars().count();
        println!("[{}] ({} chars)", i + 1, len);
        match chars {
            Some(max) => println!("{}", truncate_text(piece, max)),
            None => println!("{}", piece),
        }
        println!("{}", "-".repeat(60));
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: RetrievalConfig) -> Result<()> {
    println!("kb-retriever v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if let Some(path) = user_config_path() {
        println!("[*] 사용자 설정: {}", path.display());
    }
    println!("[*] 로컬 설정: ./{}", CONFIG_FILE_NAME);
    println!("[*] 코퍼스 디렉터리: {}", config.corpus.dir.display());
    println!(
        "[*] 청크: size={} overlap={} | BM25: k1={} b={}",
        config.chunk.size, config.chunk.overlap, config.bm25.k1, config.bm25.b
    );

    // 리랭킹 가능 여부
    if !config.rerank.enabled {
        println!("[*] 시맨틱 리랭킹: 비활성화");
    } else if has_api_key() {
        println!(
            "[OK] 시맨틱 리랭킹: 사용 가능 (후보 {}개, 가중치 {}/{})",
            config.rerank.candidates, config.rerank.lexical_weight, config.rerank.semantic_weight
        );
    } else {
        println!("[!] 시맨틱 리랭킹: API 키 미설정 (BM25만 사용)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match Retriever::open(config) {
        Ok(retriever) => {
            let stats = retriever.stats();
            println!("[OK] 소스 파일: {} 개", stats.sources);
            println!("[OK] 청크: {} 개 (평균 {:.1} chars)", stats.chunks, stats.avg_chunk_chars);
            println!("     색인 어휘: {} 개", stats.vocabulary);
            println!("     총 콘텐츠: {}", format_bytes(stats.total_bytes));
            println!(
                "     스냅샷: v{} ({} UTC)",
                stats.version,
                stats.built_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Err(e) => {
            println!("[!] 코퍼스 로드 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 자동 저장 경로 (hits_YYYYmmdd_HHMMSS.txt)
fn auto_export_path() -> PathBuf {
    PathBuf::from(format!(
        "hits_{}.txt",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// 저장용 결과 텍스트
fn render_hits(query: &str, hits: &[Hit]) -> String {
    let mut lines = vec![format!("[질문] {}\n", query)];
    for (i, hit) in hits.iter().enumerate() {
        lines.push(format!(
            "[Top{}] {}#{} | 점수={:.3}",
            i + 1,
            hit.source,
            hit.idx,
            hit.score
        ));
        lines.push(hit.text.clone());
        lines.push(format!("\n{}\n", "=".repeat(80)));
    }
    lines.join("\n")
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
