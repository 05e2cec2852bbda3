//! CLI 모듈
//!
//! apphelper-rag CLI 명령어 정의 및 구현

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::embedding::embedder_handle;
use crate::ingest::{self, DEFAULT_JSONL_CHUNK_SIZE, DEFAULT_PDF_CHUNK_SIZE, DEFAULT_PDF_OVERLAP};
use crate::knowledge::{store_handle, Retriever, DEFAULT_TOP_K};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "apphelper-rag")]
#[command(version, about = "앱 헬퍼 RAG 챗봇", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTP 서버 실행
    Serve,

    /// JSONL 문서를 단어 단위 청크로 분할
    Chunk {
        /// 입력 JSONL (`{"text": ...}` 한 줄에 하나)
        input: PathBuf,

        /// 출력 JSONL
        output: PathBuf,

        /// 청크 크기 (단어)
        #[arg(long, default_value_t = DEFAULT_JSONL_CHUNK_SIZE)]
        size: usize,

        /// 청크 간 겹치는 단어 수
        #[arg(long, default_value_t = 0)]
        overlap: usize,
    },

    /// PDF 페이지 텍스트를 JSONL로 추출
    ExtractPdf {
        /// 입력 PDF
        input: PathBuf,

        /// 출력 JSONL
        output: PathBuf,
    },

    /// PDF 파일(또는 폴더의 PDF들)을 저장소에 적재
    LoadPdf {
        /// 대상 앱 ID
        #[arg(long)]
        app_id: String,

        /// PDF 파일 또는 폴더
        #[arg(long)]
        path: PathBuf,

        /// 청크 크기 (단어)
        #[arg(long, default_value_t = DEFAULT_PDF_CHUNK_SIZE)]
        chunk_size: usize,

        /// 청크 간 겹치는 단어 수
        #[arg(long, default_value_t = DEFAULT_PDF_OVERLAP)]
        overlap: usize,
    },

    /// 저장소 검색
    Query {
        /// 대상 앱 ID
        #[arg(long)]
        app_id: String,

        /// 검색 질의
        question: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value_t = DEFAULT_TOP_K)]
        limit: usize,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Serve => crate::server::start_server(settings).await,
        Commands::Chunk {
            input,
            output,
            size,
            overlap,
        } => cmd_chunk(&input, &output, size, overlap),
        Commands::ExtractPdf { input, output } => cmd_extract_pdf(input, output).await,
        Commands::LoadPdf {
            app_id,
            path,
            chunk_size,
            overlap,
        } => cmd_load_pdf(&settings, &app_id, &path, chunk_size, overlap).await,
        Commands::Query {
            app_id,
            question,
            limit,
        } => cmd_query(&settings, &app_id, &question, limit).await,
    }
}

fn retriever_from(settings: &Settings) -> Arc<Retriever> {
    Arc::new(Retriever::new(
        Arc::new(embedder_handle(&settings.embedding)),
        Arc::new(store_handle(&settings.store)),
    ))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 청킹 명령어 (chunk)
fn cmd_chunk(input: &Path, output: &Path, size: usize, overlap: usize) -> Result<()> {
    tracing::info!("Chunking {}", input.display());

    let reader = BufReader::new(
        File::open(input).with_context(|| format!("Failed to open {}", input.display()))?,
    );
    let writer = BufWriter::new(
        File::create(output).with_context(|| format!("Failed to create {}", output.display()))?,
    );

    let stats = ingest::chunk_jsonl(reader, writer, size, overlap)?;

    println!(
        "[OK] {} 줄 -> {} 청크 ({} 줄 건너뜀): {}",
        stats.lines,
        stats.chunks,
        stats.skipped,
        output.display()
    );
    Ok(())
}

/// PDF 추출 명령어 (extract-pdf)
async fn cmd_extract_pdf(input: PathBuf, output: PathBuf) -> Result<()> {
    tracing::info!("Extracting text from {}", input.display());

    let pages = tokio::task::spawn_blocking(move || ingest::extract_pdf_pages(&input))
        .await
        .context("PDF extraction task panicked")??;

    tracing::info!("Writing JSONL to {}", output.display());
    let writer = BufWriter::new(
        File::create(&output).with_context(|| format!("Failed to create {}", output.display()))?,
    );
    let written = ingest::write_pages_jsonl(&pages, writer)?;

    println!("[OK] {} 페이지 추출: {}", written, output.display());
    Ok(())
}

/// PDF 적재 명령어 (load-pdf)
async fn cmd_load_pdf(
    settings: &Settings,
    app_id: &str,
    path: &Path,
    chunk_size: usize,
    overlap: usize,
) -> Result<()> {
    let retriever = retriever_from(settings);
    let total = ingest::load_path(retriever, app_id, path, chunk_size, overlap).await?;

    println!("[OK] {} 청크 적재 (app_id: {})", total, app_id);
    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(settings: &Settings, app_id: &str, question: &str, limit: usize) -> Result<()> {
    let retriever = retriever_from(settings);
    let result = retriever.retrieve(app_id, question, limit).await?;

    if result.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", result.len());

    for (i, doc) in result.hits().iter().enumerate() {
        let citation = doc.citation();
        println!(
            "{}. [{}]",
            i + 1,
            if citation.is_empty() { "-" } else { citation }
        );
        println!("   {}", truncate_text(&doc.text, 200));
        println!();
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

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

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("Το ERP\nσύστημα", 20), "Το ERP σύστημα");
    }

    #[test]
    fn test_parse_load_pdf_defaults() {
        let cli = Cli::try_parse_from([
            "apphelper-rag",
            "load-pdf",
            "--app-id",
            "acme",
            "--path",
            "docs",
        ])
        .unwrap();

        match cli.command {
            Commands::LoadPdf {
                app_id,
                chunk_size,
                overlap,
                ..
            } => {
                assert_eq!(app_id, "acme");
                assert_eq!(chunk_size, 400);
                assert_eq!(overlap, 50);
            }
            _ => panic!("expected load-pdf"),
        }
    }

    #[test]
    fn test_parse_chunk_defaults() {
        let cli = Cli::try_parse_from(["apphelper-rag", "chunk", "in.jsonl", "out.jsonl"]).unwrap();
        match cli.command {
            Commands::Chunk { size, overlap, .. } => {
                assert_eq!(size, 500);
                assert_eq!(overlap, 0);
            }
            _ => panic!("expected chunk"),
        }
    }

    #[test]
    fn test_chunk_command_writes_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.jsonl");
        let output = dir.path().join("out.jsonl");
        std::fs::write(&input, "{\"text\": \"a b c d e\"}\n").unwrap();

        cmd_chunk(&input, &output, 2, 0).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written.lines().count(), 3);
    }
}
