//! Text extraction for uploaded documents.
//!
//! Each [`MimeKind`] has its own extractor; all of them return raw UTF-8
//! text which [`extract`] then runs through
//! [`normalize_text`](docent_core::normalize::normalize_text).
//!
//! | Kind | Source | Separator |
//! |------|--------|-----------|
//! | text | bytes decoded as UTF-8, BOM stripped | as written |
//! | pdf  | `pdf-extract`, one string per page | `\n` between pages |
//! | docx | `word/document.xml` `<w:t>` runs | `\n` between paragraphs |
//!
//! Failures never panic: malformed input is an [`ExtractionError`] naming
//! the document.

use std::io::{Cursor, Read};

use docent_core::error::{ExtractFailure, ExtractionError};
use docent_core::models::{Document, MimeKind};
use docent_core::normalize::normalize_text;
use quick_xml::events::Event;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Extract and normalize the text of `doc`.
pub fn extract(doc: &Document) -> Result<String, ExtractionError> {
    let raw = extract_raw(doc)?;
    Ok(normalize_text(&raw))
}

/// Extract text without normalization.
pub fn extract_raw(doc: &Document) -> Result<String, ExtractionError> {
    extract_bytes(&doc.raw_bytes, doc.mime_kind)
        .map_err(|kind| ExtractionError::new(&doc.name, kind))
}

/// Extract from a declared content type, e.g. one read from an HTTP header.
pub fn extract_by_content_type(
    name: &str,
    bytes: &[u8],
    content_type: &str,
) -> Result<String, ExtractionError> {
    let kind = MimeKind::from_content_type(content_type).ok_or_else(|| {
        ExtractionError::new(
            name,
            ExtractFailure::UnsupportedContentType(content_type.to_string()),
        )
    })?;
    extract(&Document::new(name, kind, bytes))
}

fn extract_bytes(bytes: &[u8], kind: MimeKind) -> Result<String, ExtractFailure> {
    match kind {
        MimeKind::Text => extract_plain(bytes),
        MimeKind::Pdf => extract_pdf(bytes),
        MimeKind::Docx => extract_docx(bytes),
    }
}

fn extract_plain(bytes: &[u8]) -> Result<String, ExtractFailure> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| ExtractFailure::InvalidUtf8(e.to_string()))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractFailure> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractFailure::Pdf(e.to_string()))?;
    Ok(pages.join("\n"))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractFailure> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractFailure::Ooxml(format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractFailure::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractFailure::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractFailure> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractFailure::Ooxml(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, DOCX_BODY, MAX_XML_ENTRY_BYTES)?;
    docx_paragraphs(&xml).map(|paragraphs| paragraphs.join("\n"))
}

/// Text of each `<w:p>`, in document order.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractFailure> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_run_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(te)) if in_run_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractFailure::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractFailure::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file(DOCX_BODY, options).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
            )
            .unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn plain_text_strips_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"hello");
        let doc = Document::new("a.txt", MimeKind::Text, bytes);
        assert_eq!(extract_raw(&doc).unwrap(), "hello");
    }

    #[test]
    fn invalid_utf8_names_the_document() {
        let doc = Document::new("bad.txt", MimeKind::Text, vec![0xff, 0xfe, 0x00]);
        let err = extract(&doc).unwrap_err();
        assert_eq!(err.document, "bad.txt");
        assert!(matches!(err.kind, ExtractFailure::InvalidUtf8(_)));
    }

    #[test]
    fn extract_normalizes_text() {
        let doc = Document::new(
            "a.txt",
            MimeKind::Text,
            "An exam-\nple of\nwrapped text.\r\n\r\n\r\nNext paragraph.",
        );
        assert_eq!(
            extract(&doc).unwrap(),
            "An example of wrapped text.\n\nNext paragraph."
        );
    }

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_by_content_type("x.bin", b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err.kind, ExtractFailure::UnsupportedContentType(_)));
    }

    #[test]
    fn content_type_with_parameters_is_accepted() {
        let text = extract_by_content_type("x", b"hi there", "text/plain; charset=utf-8").unwrap();
        assert_eq!(text, "hi there");
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let doc = Document::new("x.pdf", MimeKind::Pdf, b"not a pdf".to_vec());
        let err = extract(&doc).unwrap_err();
        assert!(matches!(err.kind, ExtractFailure::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let doc = Document::new("x.docx", MimeKind::Docx, b"not a zip".to_vec());
        let err = extract(&doc).unwrap_err();
        assert!(matches!(err.kind, ExtractFailure::Ooxml(_)));
    }

    #[test]
    fn docx_without_body_is_an_error() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let doc = Document::new("x.docx", MimeKind::Docx, buf.into_inner());
        let err = extract(&doc).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn docx_paragraphs_are_newline_separated() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>First</w:t></w:r><w:r><w:t xml:space=\"preserve\"> paragraph</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Second</w:t><w:tab/><w:t>one</w:t></w:r></w:p>",
        );
        let doc = Document::new("x.docx", MimeKind::Docx, bytes);
        assert_eq!(extract_raw(&doc).unwrap(), "First paragraph\nSecond\tone");
    }

    #[test]
    fn docx_unescapes_entities() {
        let bytes = docx_with_body("<w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>");
        let doc = Document::new("x.docx", MimeKind::Docx, bytes);
        assert_eq!(extract(&doc).unwrap(), "Fish & chips");
    }
}
