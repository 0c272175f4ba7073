use std::fmt;

use crc32fast::Hasher;
use tracing::debug;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, PartialEq, Eq)]
pub enum PngTextError {
    InvalidSignature,
    TruncatedChunk,
    InvalidChunkLength,
    InvalidCrc { chunk_type: [u8; 4] },
    MalformedText(&'static str),
    MissingKeyword(Vec<String>),
}

impl fmt::Display for PngTextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PngTextError::InvalidSignature => write!(f, "file is not a PNG"),
            PngTextError::TruncatedChunk => write!(f, "unexpected end of PNG data"),
            PngTextError::InvalidChunkLength => {
                write!(f, "chunk length exceeds PNG bounds")
            }
            PngTextError::InvalidCrc { chunk_type } => {
                write!(
                    f,
                    "chunk {} failed CRC validation",
                    display_chunk_type(chunk_type)
                )
            }
            PngTextError::MalformedText(reason) => {
                write!(f, "malformed text chunk: {}", reason)
            }
            PngTextError::MissingKeyword(keywords) => {
                write!(f, "missing '{}' text metadata", keywords.join("' / '"))
            }
        }
    }
}

impl std::error::Error for PngTextError {}

/// A decoded `tEXt` or `iTXt` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub keyword: String,
    pub text: String,
}

/// Walks the chunk stream and returns every readable text chunk in order.
///
/// CRCs are verified for every chunk. Compressed `iTXt` chunks are skipped.
pub fn read_text_chunks(data: &[u8]) -> Result<Vec<TextChunk>, PngTextError> {
    if data.len() < PNG_SIGNATURE.len() || data[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
        return Err(PngTextError::InvalidSignature);
    }

    let mut chunks = Vec::new();
    let mut offset = PNG_SIGNATURE.len();
    let mut saw_iend = false;
    while offset + 12 <= data.len() {
        let length = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        let chunk_type = [
            data[offset + 4],
            data[offset + 5],
            data[offset + 6],
            data[offset + 7],
        ];
        let data_start = offset + 8;
        let data_end = data_start
            .checked_add(length)
            .ok_or(PngTextError::InvalidChunkLength)?;
        if data_end + 4 > data.len() {
            return Err(PngTextError::TruncatedChunk);
        }
        let chunk_data = &data[data_start..data_end];
        let actual_crc = u32::from_be_bytes([
            data[data_end],
            data[data_end + 1],
            data[data_end + 2],
            data[data_end + 3],
        ]);
        let mut hasher = Hasher::new();
        hasher.update(&chunk_type);
        hasher.update(chunk_data);
        if actual_crc != hasher.finalize() {
            return Err(PngTextError::InvalidCrc { chunk_type });
        }

        match &chunk_type {
            b"tEXt" => chunks.push(parse_text(chunk_data)?),
            b"iTXt" => {
                if let Some(chunk) = parse_itext(chunk_data)? {
                    chunks.push(chunk);
                }
            }
            _ => {}
        }

        offset = data_end + 4;
        if &chunk_type == b"IEND" {
            saw_iend = true;
            break;
        }
    }

    if !saw_iend && offset != data.len() {
        return Err(PngTextError::TruncatedChunk);
    }

    Ok(chunks)
}

/// Returns the text of the first keyword in `keywords` (priority order) that
/// the PNG carries.
pub fn extract_text(data: &[u8], keywords: &[&str]) -> Result<String, PngTextError> {
    let chunks = read_text_chunks(data)?;
    for keyword in keywords {
        if let Some(chunk) = chunks.iter().find(|chunk| chunk.keyword == *keyword) {
            return Ok(chunk.text.clone());
        }
    }
    Err(PngTextError::MissingKeyword(
        keywords.iter().map(|k| k.to_string()).collect(),
    ))
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn parse_text(chunk_data: &[u8]) -> Result<TextChunk, PngTextError> {
    let Some(null_pos) = chunk_data.iter().position(|&b| b == 0) else {
        return Err(PngTextError::MalformedText("missing keyword separator"));
    };
    Ok(TextChunk {
        keyword: latin1(&chunk_data[..null_pos]),
        text: latin1(&chunk_data[null_pos + 1..]),
    })
}

// keyword \0 compression-flag compression-method language \0 translated \0 text
fn parse_itext(chunk_data: &[u8]) -> Result<Option<TextChunk>, PngTextError> {
    let Some(null_pos) = chunk_data.iter().position(|&b| b == 0) else {
        return Err(PngTextError::MalformedText("missing keyword separator"));
    };
    let keyword = latin1(&chunk_data[..null_pos]);
    let rest = &chunk_data[null_pos + 1..];
    if rest.len() < 2 {
        return Err(PngTextError::MalformedText("missing compression fields"));
    }
    if rest[0] != 0 {
        debug!(keyword = %keyword, "skipping compressed iTXt chunk");
        return Ok(None);
    }
    let rest = &rest[2..];
    let Some(lang_end) = rest.iter().position(|&b| b == 0) else {
        return Err(PngTextError::MalformedText("missing language tag separator"));
    };
    let rest = &rest[lang_end + 1..];
    let Some(translated_end) = rest.iter().position(|&b| b == 0) else {
        return Err(PngTextError::MalformedText("missing translated keyword separator"));
    };
    let text = std::str::from_utf8(&rest[translated_end + 1..])
        .map_err(|_| PngTextError::MalformedText("iTXt text is not UTF-8"))?;
    Ok(Some(TextChunk {
        keyword,
        text: text.to_string(),
    }))
}

fn display_chunk_type(chunk_type: &[u8; 4]) -> String {
    chunk_type
        .iter()
        .map(|&b| {
            if (32..=126).contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}
