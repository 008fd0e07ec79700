//! DOCX 텍스트 추출
//!
//! DOCX는 zip 컨테이너이며 본문은 `word/document.xml`(WordprocessingML)에 있습니다.
//! `<w:p>` 문단 단위로 `<w:t>` 텍스트를 모으고, 문단 사이는 빈 줄로 구분합니다.
//! ref: https://learn.microsoft.com/en-us/office/open-xml/word/structure-of-a-wordprocessingml-document

use std::io::{Cursor, Read};

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// 본문 XML 경로
const DOCUMENT_XML: &str = "word/document.xml";

/// DOCX 바이트에서 텍스트 추출
pub fn extract_text_from_docx(bytes: &[u8]) -> Result<String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).context("Failed to open DOCX archive")?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_XML)
        .context("DOCX is missing word/document.xml")?
        .read_to_string(&mut xml)
        .context("Failed to read word/document.xml")?;

    extract_paragraphs(&xml).map(|paragraphs| paragraphs.join("\n\n"))
}

/// WordprocessingML에서 비어 있지 않은 문단 목록 추출
pub fn extract_paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().context("Malformed document.xml")? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:p" => current.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                current.push_str(&t.unescape().context("Invalid XML text")?);
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let paragraph = current.trim();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>소득세법</w:t></w:r></w:p>
    <w:p>
      <w:r><w:t xml:space="preserve">제1조(목적) </w:t></w:r>
      <w:r><w:t>이 법은 개인의 소득에 대하여 과세한다.</w:t></w:r>
    </w:p>
    <w:p></w:p>
    <w:p><w:r><w:t>A</w:t><w:tab/><w:t>B &amp; C</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn build_docx(xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(DOCUMENT_XML, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_paragraphs_in_order() {
        let paragraphs = extract_paragraphs(SAMPLE_XML).unwrap();
        assert_eq!(paragraphs.len(), 3);
        assert_eq!(paragraphs[0], "소득세법");
        assert_eq!(paragraphs[1], "제1조(목적) 이 법은 개인의 소득에 대하여 과세한다.");
        assert_eq!(paragraphs[2], "A\tB & C");
    }

    #[test]
    fn test_extract_text_from_docx() {
        let bytes = build_docx(SAMPLE_XML);
        let text = extract_text_from_docx(&bytes).unwrap();
        assert!(text.starts_with("소득세법\n\n제1조(목적)"));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(extract_text_from_docx(b"plain text").is_err());
    }

    #[test]
    fn test_missing_document_xml() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("other.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<x/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = extract_text_from_docx(&bytes).unwrap_err();
        assert!(format!("{:#}", err).contains("word/document.xml"));
    }
}
