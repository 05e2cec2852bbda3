//! PDF 텍스트 추출
//!
//! pdf-extract 크레이트로 페이지마다 텍스트를 따로 뽑습니다.
//! 페이지 번호는 문서 내 순서(1부터)이며, 텍스트가 없는 페이지도 번호를 유지합니다.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use super::TextRecord;

/// PDF 페이지 (번호는 1부터)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfPage {
    pub number: usize,
    pub text: String,
}

/// PDF에서 페이지별 텍스트 추출
///
/// 빈 페이지도 결과에 남기므로 `number`는 항상 실제 페이지 번호와 같습니다.
/// 페이지를 하나도 읽지 못한 PDF는 빈 1페이지로 취급합니다.
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<PdfPage>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let texts = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    let mut pages: Vec<PdfPage> = texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| PdfPage {
            number: i + 1,
            text: text.trim().to_string(),
        })
        .collect();

    if pages.is_empty() {
        pages.push(PdfPage {
            number: 1,
            text: String::new(),
        });
    }

    if pages.iter().all(|p| p.text.is_empty()) {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    Ok(pages)
}

/// 페이지마다 `{"text": ...}` 한 줄씩 기록, 기록한 줄 수 반환
pub fn write_pages_jsonl<W: Write>(pages: &[PdfPage], mut writer: W) -> Result<usize> {
    for page in pages {
        let record = TextRecord {
            text: page.text.clone(),
        };
        serde_json::to_writer(&mut writer, &record).context("Failed to serialize page")?;
        writer.write_all(b"\n").context("Failed to write JSONL")?;
    }
    writer.flush().context("Failed to flush JSONL")?;
    Ok(pages.len())
}

/// 테스트용 최소 PDF 생성 (페이지마다 Helvetica 한 줄, 빈 문자열은 빈 페이지)
#[cfg(test)]
pub(crate) fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        let content = if text.is_empty() {
            "q Q".to_string()
        } else {
            format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET")
        };
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            page_ids[i] + 1
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_at = out.len();
    let size = objects.len() + 1;
    out.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f \n").as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    let trailer = format!("trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n");
    out.extend_from_slice(trailer.as_bytes());
    out
}

// ============================================================================
// Tests
// ============================================================================
