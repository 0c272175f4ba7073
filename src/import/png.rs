use base64::Engine as _;

use crate::card::ParsedCharacter;
use crate::import::detect::CardFormat;
use crate::import::error::ImportError;
use crate::import::json::parse_json_bytes;
use crate::import::png_text::{extract_text, PngTextError};

/// Text chunk keywords carrying card JSON, highest priority first.
pub const CARD_KEYWORDS: &[&str] = &["ccv3", "chara"];

/// Parses a PNG character card.
///
/// The embedded payload is decoded and handed to the JSON parser unchanged;
/// the PNG file itself becomes the thumbnail.
pub fn parse_png(bytes: &[u8]) -> Result<ParsedCharacter, ImportError> {
    let text = extract_text(bytes, CARD_KEYWORDS).map_err(|err| match err {
        PngTextError::MissingKeyword(keywords) => ImportError::MissingEmbeddedData { keywords },
        other => ImportError::malformed(CardFormat::Png, other.to_string()),
    })?;

    let payload = decode_payload(&text)?;
    let character = parse_json_bytes(&payload)?;
    Ok(character.with_thumbnail(Some(bytes.to_vec())))
}

/// Decodes the embedded card payload to JSON bytes.
pub fn decode_payload(text: &str) -> Result<Vec<u8>, ImportError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed.as_bytes().to_vec());
    }
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| {
            ImportError::malformed(CardFormat::Png, format!("card payload is not base64: {err}"))
        })
}
