//! Input format detection.
//!
//! Content wins over names: magic bytes are checked first, and the file
//! extension or MIME hint is consulted only when the bytes do not settle it.
//! Only the first [`DETECT_WINDOW`] bytes are ever inspected.

use std::fmt;

use memchr::memmem;
use serde::Serialize;

use crate::card::mime::extension_of;
use crate::import::error::ImportError;
use crate::import::png_text::PNG_SIGNATURE;

pub const DETECT_WINDOW: usize = 64 * 1024;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";
const ZIP_LOCAL_HEADER_LEN: usize = 30;
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardFormat {
    Png,
    Charx,
    Voxta,
    Json,
}

impl CardFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardFormat::Png => "png",
            CardFormat::Charx => "charx",
            CardFormat::Voxta => "voxta",
            CardFormat::Json => "json",
        }
    }

    fn from_extension(ext: &str) -> Option<CardFormat> {
        match ext {
            "png" => Some(CardFormat::Png),
            "charx" => Some(CardFormat::Charx),
            "voxpkg" | "voxta" => Some(CardFormat::Voxta),
            "json" => Some(CardFormat::Json),
            _ => None,
        }
    }

    fn from_mime(mime: &str) -> Option<CardFormat> {
        match mime.split(';').next().unwrap_or("").trim() {
            "image/png" => Some(CardFormat::Png),
            "application/json" | "text/json" => Some(CardFormat::Json),
            _ => None,
        }
    }
}

impl fmt::Display for CardFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the parser for an input.
pub fn detect_format(
    bytes: &[u8],
    filename: Option<&str>,
    mime: Option<&str>,
) -> Result<CardFormat, ImportError> {
    let window = &bytes[..bytes.len().min(DETECT_WINDOW)];
    let ext_format = filename.and_then(|name| CardFormat::from_extension(&extension_of(name)));

    if window.starts_with(&PNG_SIGNATURE) {
        return Ok(CardFormat::Png);
    }

    if window.starts_with(ZIP_LOCAL_HEADER) || window.starts_with(ZIP_EMPTY_ARCHIVE) {
        if let Some(format) = classify_zip_window(window) {
            return Ok(format);
        }
        return match ext_format {
            Some(format @ (CardFormat::Charx | CardFormat::Voxta)) => Ok(format),
            _ => Err(ImportError::UnsupportedFormat {
                hint: Some("ZIP archive is neither a CHARX nor a Voxta package".to_string()),
            }),
        };
    }

    if looks_like_json(window) {
        return Ok(CardFormat::Json);
    }

    ext_format
        .or_else(|| mime.and_then(CardFormat::from_mime))
        .ok_or_else(|| ImportError::UnsupportedFormat {
            hint: filename.map(str::to_string),
        })
}

fn looks_like_json(window: &[u8]) -> bool {
    let body = window.strip_prefix(UTF8_BOM).unwrap_or(window);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

/// Classifies a ZIP by the entry names visible in its local file headers.
fn classify_zip_window(window: &[u8]) -> Option<CardFormat> {
    let names = local_entry_names(window);
    if names.iter().any(|name| name.eq_ignore_ascii_case(b"card.json")) {
        return Some(CardFormat::Charx);
    }
    let is_voxta = names.iter().any(|name| {
        name.eq_ignore_ascii_case(b"package.json")
            || starts_with_ignore_case(name, b"characters/")
            || starts_with_ignore_case(name, b"scenarios/")
    });
    is_voxta.then_some(CardFormat::Voxta)
}

fn local_entry_names(window: &[u8]) -> Vec<&[u8]> {
    let mut names = Vec::new();
    for pos in memmem::find_iter(window, ZIP_LOCAL_HEADER) {
        let header_end = pos + ZIP_LOCAL_HEADER_LEN;
        if header_end > window.len() {
            break;
        }
        let name_len = u16::from_le_bytes([window[pos + 26], window[pos + 27]]) as usize;
        let name_end = header_end + name_len;
        if name_end > window.len() {
            break;
        }
        names.push(&window[header_end..name_end]);
    }
    names
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}
