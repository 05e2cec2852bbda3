//! Ingest 모듈 - 문서 청킹, PDF 추출, 저장소 적재
//!
//! JSONL 형식은 한 줄에 `{"text": "..."}` 레코드 하나입니다.

mod pdf;

pub use pdf::{extract_pdf_pages, write_pages_jsonl, PdfPage};

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::knowledge::{Document, Retriever};

/// JSONL 청킹 기본 크기 (단어)
pub const DEFAULT_JSONL_CHUNK_SIZE: usize = 500;
/// PDF 적재 기본 청크 크기 (단어)
pub const DEFAULT_PDF_CHUNK_SIZE: usize = 400;
/// PDF 적재 기본 오버랩 (단어)
pub const DEFAULT_PDF_OVERLAP: usize = 50;

/// JSONL 텍스트 레코드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRecord {
    pub text: String,
}

// ============================================================================
// Chunking
// ============================================================================

/// 공백 기준 단어 윈도우로 분할
///
/// 윈도우 크기는 `size`, 이동 간격은 `max(size - overlap, 1)`입니다.
/// 빈 텍스트는 청크를 만들지 않습니다.
pub fn chunk_words(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);

    (0..words.len())
        .step_by(step)
        .map(|start| {
            let end = (start + size).min(words.len());
            words[start..end].join(" ")
        })
        .collect()
}

/// JSONL 청킹 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub lines: usize,
    pub skipped: usize,
    pub chunks: usize,
}

/// JSONL 레코드를 청크 레코드로 변환
///
/// 파싱할 수 없는 줄은 에러로 기록하고 건너뜁니다.
pub fn chunk_jsonl<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    size: usize,
    overlap: usize,
) -> Result<ChunkStats> {
    let mut stats = ChunkStats::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input line")?;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let record: TextRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Invalid JSON line {}: {}", idx + 1, e);
                stats.skipped += 1;
                continue;
            }
        };

        for chunk in chunk_words(&record.text, size, overlap) {
            serde_json::to_writer(&mut writer, &TextRecord { text: chunk })
                .context("Failed to serialize chunk")?;
            writer.write_all(b"\n").context("Failed to write chunk")?;
            stats.chunks += 1;
        }
    }

    writer.flush().context("Failed to flush output")?;
    Ok(stats)
}

// ============================================================================
// PDF loading
// ============================================================================

/// 적재 대상 PDF 목록
///
/// 파일이면 그 파일 하나, 디렉토리면 바로 아래의 `*.pdf` (하위 디렉토리 제외).
pub fn pdf_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("Path does not exist: {:?}", path);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();

    files.sort();
    Ok(files)
}

/// 페이지 목록을 청크 문서로 변환 (`source = "{file_name}#page={n}"`)
pub fn page_documents(
    file_name: &str,
    pages: &[PdfPage],
    size: usize,
    overlap: usize,
) -> Vec<Document> {
    pages
        .iter()
        .flat_map(|page| {
            let source = format!("{}#page={}", file_name, page.number);
            chunk_words(&page.text, size, overlap)
                .into_iter()
                .map(move |chunk| Document::with_source(chunk, source.clone()))
        })
        .collect()
}

/// PDF 하나를 청킹하여 저장소에 적재, 적재한 청크 수 반환
pub async fn load_pdf(
    retriever: &Retriever,
    app_id: &str,
    path: &Path,
    size: usize,
    overlap: usize,
) -> Result<usize> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    // PDF 파싱은 CPU 작업이므로 블로킹 풀에서 실행
    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || extract_pdf_pages(&owned))
        .await
        .context("PDF extraction task panicked")??;

    let docs = page_documents(&file_name, &pages, size, overlap);
    let count = retriever.add_documents(app_id, &docs).await?;

    tracing::info!("Loaded {} chunks from {} ({} pages)", count, file_name, pages.len());
    Ok(count)
}

/// 파일 또는 디렉토리의 PDF 적재
pub async fn load_path(
    retriever: Arc<Retriever>,
    app_id: &str,
    path: &Path,
    size: usize,
    overlap: usize,
) -> Result<usize> {
    let files = pdf_files(path)?;
    if files.is_empty() {
        tracing::warn!("No PDF files found in {:?}", path);
    }

    let mut total = 0;
    for file in &files {
        total += load_pdf(&retriever, app_id, file, size, overlap).await?;
    }

    tracing::info!("Loaded {} chunks from {} file(s)", total, files.len());
    Ok(total)
}

// ============================================================================
// Tests
// ============================================================================
