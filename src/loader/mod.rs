//! 문서 로딩 모듈
//!
//! 입력 문서에서 텍스트를 추출합니다.
//! - DOCX: `word/document.xml`의 문단 텍스트
//! - 텍스트 파일 (.txt, .md): 직접 읽기

pub mod docx;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::RagError;

// ============================================================================
// Document Kind
// ============================================================================

/// 지원하는 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Word 문서
    Docx,
    /// 일반 텍스트 / 마크다운
    Text,
}

impl DocumentKind {
    /// 확장자로 문서 형식 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "docx" => Some(DocumentKind::Docx),
            "txt" | "md" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

// ============================================================================
// Loaded Document
// ============================================================================

/// 로드된 문서
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// 원본 경로 (청크 메타데이터의 source)
    pub source: PathBuf,
    /// 추출된 텍스트
    pub text: String,
    /// 원본 파일 SHA-256 (hex)
    pub content_hash: String,
}

/// 문서 로드
///
/// 파일이 없으면 `RagError::DocumentNotFound`, 지원하지 않는 형식이면
/// `RagError::Config`를 반환합니다.
pub async fn load_document(path: &Path) -> Result<LoadedDocument> {
    if !path.exists() {
        return Err(RagError::DocumentNotFound(path.to_path_buf()).into());
    }

    let kind = DocumentKind::from_path(path).ok_or_else(|| {
        RagError::Config(format!("지원하지 않는 문서 형식입니다: {}", path.display()))
    })?;

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read document: {:?}", path))?;
    let content_hash = crate::knowledge::sha256_hex(&bytes);

    let text = match kind {
        DocumentKind::Docx => {
            // 압축 해제 + XML 파싱은 CPU 바운드이므로 spawn_blocking 사용
            tokio::task::spawn_blocking(move || docx::extract_text_from_docx(&bytes))
                .await
                .context("DOCX extraction task failed")??
        }
        DocumentKind::Text => String::from_utf8(bytes)
            .with_context(|| format!("Document is not valid UTF-8: {:?}", path))?,
    };

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from document: {:?}", path);
    }

    tracing::info!(
        "Loaded document {:?} ({} chars)",
        path,
        text.chars().count()
    );

    Ok(LoadedDocument {
        source: path.to_path_buf(),
        text,
        content_hash,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(DocumentKind::from_path(Path::new("tax.docx")), Some(DocumentKind::Docx));
        assert_eq!(DocumentKind::from_path(Path::new("TAX.DOCX")), Some(DocumentKind::Docx));
        assert_eq!(DocumentKind::from_path(Path::new("notes.md")), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_path(Path::new("tax.pdf")), None);
        assert_eq!(DocumentKind::from_path(Path::new("tax")), None);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let err = load_document(Path::new("/nonexistent/tax.docx")).await.err();
        assert!(matches!(
            err.map(RagError::classify),
            Some(RagError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_text_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tax.txt");
        std::fs::write(&path, "제1조(목적) 이 법은 소득세의 과세요건을 규정한다.").unwrap();

        let doc = load_document(&path).await.unwrap();
        assert!(doc.text.contains("소득세"));
        assert_eq!(doc.content_hash.len(), 64);
        assert_eq!(doc.source, path);
    }

    #[tokio::test]
    async fn test_load_docx_document() {
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tax.docx");
        {
            let mut writer = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
            writer
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer
                .write_all(
                    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>제20조(근로소득)</w:t></w:r></w:p>
<w:p><w:r><w:t>근로소득은 봉급으로 한다.</w:t></w:r></w:p>
<w:p><w:r><w:t>제94조(양도소득)</w:t></w:r></w:p>
</w:body></w:document>"#
                        .as_bytes(),
                )
                .unwrap();
            writer.finish().unwrap();
        }

        let doc = load_document(&path).await.unwrap();
        assert_eq!(
            doc.text,
            "제20조(근로소득)\n\n근로소득은 봉급으로 한다.\n\n제94조(양도소득)"
        );
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(doc.content_hash, crate::knowledge::sha256_hex(&bytes));
        assert_eq!(doc.source, path);
    }

    #[tokio::test]
    async fn test_unsupported_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tax.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let err = load_document(&path).await.err();
        assert!(matches!(err.map(RagError::classify), Some(RagError::Config(_))));
    }
}
