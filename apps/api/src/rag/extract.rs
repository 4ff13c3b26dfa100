//! Resume text extraction: format detection, PDF text layer, plain text.

use serde::Serialize;
use thiserror::Error;

const PDF_MAGIC: &[u8] = b"%PDF-";
const TEXT_EXTENSIONS: [&str; 3] = ["txt", "text", "md"];
/// Containers whose text layer needs a parser this service does not have.
const BINARY_EXTENSIONS: [&str; 12] = [
    "doc", "docx", "odt", "rtf", "pages", "zip", "gz", "png", "jpg", "jpeg", "gif", "webp",
];
/// Leading bytes of zip (docx, odt), OLE (doc), PNG, JPEG and GIF files.
const BINARY_MAGIC: [&[u8]; 5] = [
    b"PK\x03\x04",
    b"\xd0\xcf\x11\xe0",
    b"\x89PNG",
    b"\xff\xd8\xff",
    b"GIF8",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported resume format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeFormat {
    Pdf,
    PlainText,
}

/// Detects the format from the filename, falling back to the content.
///
/// Unrecognised extensions ("Alice.Smith", "cv.csv") are sniffed: PDF magic
/// means PDF, anything else that is not binary is read as plain text.
pub fn detect_format(bytes: &[u8], filename: &str) -> Result<ResumeFormat, ExtractError> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => Ok(ResumeFormat::Pdf),
        Some(ext) if TEXT_EXTENSIONS.contains(&ext) => Ok(ResumeFormat::PlainText),
        Some(ext) if BINARY_EXTENSIONS.contains(&ext) => {
            Err(ExtractError::UnsupportedFormat(filename.to_string()))
        }
        _ if bytes.starts_with(PDF_MAGIC) => Ok(ResumeFormat::Pdf),
        _ if !looks_binary(bytes) => Ok(ResumeFormat::PlainText),
        _ => Err(ExtractError::UnsupportedFormat(filename.to_string())),
    }
}

/// Known binary magic, or NUL bytes in the first KiB.
fn looks_binary(bytes: &[u8]) -> bool {
    BINARY_MAGIC.iter().any(|magic| bytes.starts_with(magic))
        || bytes.iter().take(1024).any(|&b| b == 0)
}

/// Extracts the full text, pages joined by newlines.
pub fn extract_text(bytes: &[u8], format: ResumeFormat) -> Result<String, ExtractError> {
    match format {
        ResumeFormat::Pdf => Ok(extract_pdf_pages(bytes)?.join("\n")),
        ResumeFormat::PlainText => Ok(decode_plain_text(bytes)),
    }
}

/// Page texts in document order; a page without a text layer yields `""`.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract panics on some malformed documents.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("malformed PDF".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .map(|page| page.trim_end().to_string())
        .collect())
}

/// Invalid UTF-8 sequences become U+FFFD instead of failing.
pub fn decode_plain_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}
