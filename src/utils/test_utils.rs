//! Fixture builders shared by the unit and integration tests.

use std::io::{Cursor, Write};

use base64::Engine as _;
use crc32fast::Hasher;
use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::import::png_text::PNG_SIGNATURE;

/// 1x1 RGB image header.
pub const TEST_IHDR: [u8; 13] = [
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00,
];

pub const TEST_IDAT: [u8; 12] = [
    0x78, 0xDA, 0x63, 0x60, 0x60, 0x60, 0x00, 0x00, 0x00, 0x04, 0x00, 0x01,
];

pub fn png_chunk(chunk_type: [u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + data.len());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&chunk_type);
    out.extend_from_slice(data);
    let mut hasher = Hasher::new();
    hasher.update(&chunk_type);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
    out
}

/// A 1x1 PNG with the given extra chunks placed between IHDR and IDAT.
pub fn build_png_with_chunks(extra: &[Vec<u8>]) -> Vec<u8> {
    let mut png = Vec::new();
    png.extend_from_slice(&PNG_SIGNATURE);
    png.extend_from_slice(&png_chunk(*b"IHDR", &TEST_IHDR));
    for chunk in extra {
        png.extend_from_slice(chunk);
    }
    png.extend_from_slice(&png_chunk(*b"IDAT", &TEST_IDAT));
    png.extend_from_slice(&png_chunk(*b"IEND", &[]));
    png
}

/// A 1x1 PNG carrying `(keyword, text)` pairs as tEXt chunks.
pub fn build_png(text_chunks: &[(&str, &str)]) -> Vec<u8> {
    let chunks: Vec<Vec<u8>> = text_chunks
        .iter()
        .map(|(keyword, text)| {
            let mut data = Vec::new();
            data.extend_from_slice(keyword.as_bytes());
            data.push(0);
            data.extend_from_slice(text.as_bytes());
            png_chunk(*b"tEXt", &data)
        })
        .collect();
    build_png_with_chunks(&chunks)
}

/// A PNG card with `card` base64-encoded under `keyword`.
pub fn card_png(keyword: &str, card: &Value) -> Vec<u8> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(card.to_string());
    build_png(&[(keyword, encoded.as_str())])
}

/// A stored (uncompressed) ZIP archive with entries in the given order.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Minimal WebP container; `animated` adds an `ANIM` chunk.
pub fn webp_bytes(animated: bool) -> Vec<u8> {
    let mut body = b"WEBP".to_vec();
    body.extend_from_slice(b"VP8X");
    body.extend_from_slice(&10u32.to_le_bytes());
    body.extend_from_slice(&[if animated { 0x02 } else { 0x00 }, 0, 0, 0]);
    body.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    if animated {
        body.extend_from_slice(b"ANIM");
        body.extend_from_slice(&6u32.to_le_bytes());
        body.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    }
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

const GIF_GRAPHIC_CONTROL: [u8; 8] = [0x21, 0xF9, 0x04, 0x00, 0x0A, 0x00, 0x00, 0x00];

/// Minimal GIF stream with `frames` graphic-control extensions and an
/// optional Netscape looping extension.
pub fn gif_bytes(frames: usize, looping: bool) -> Vec<u8> {
    let mut out = b"GIF89a".to_vec();
    out.extend_from_slice(&[0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    if looping {
        out.extend_from_slice(&[0x21, 0xFF, 0x0B]);
        out.extend_from_slice(b"NETSCAPE2.0");
        out.extend_from_slice(&[0x03, 0x01, 0x00, 0x00, 0x00]);
    }
    for _ in 0..frames {
        out.extend_from_slice(&GIF_GRAPHIC_CONTROL);
    }
    out.push(0x3B);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn built_zip_is_readable() {
        let zip = build_zip(&[("card.json", b"{}".as_slice()), ("assets/a.png", b"png")]);
        let mut archive = zip::ZipArchive::new(Cursor::new(zip)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut contents = String::new();
        archive
            .by_name("card.json")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "{}");
    }

    #[test]
    fn webp_fixture_has_riff_header() {
        let webp = webp_bytes(false);
        assert_eq!(&webp[..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");
    }
}
