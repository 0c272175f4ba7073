//! Static extension → MIME type table used for every extracted asset.

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("avif", "image/avif"),
    ("wav", "audio/wav"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("json", "application/json"),
];

/// Returns the MIME type for a file extension (case-insensitive, leading dot
/// optional). Unknown extensions map to [`DEFAULT_MIME_TYPE`].
pub fn mime_for_extension(ext: &str) -> &'static str {
    let ext = ext.trim_start_matches('.');
    MIME_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}

/// Lower-cased extension of a path-like name, without the dot.
pub fn extension_of(name: &str) -> String {
    let file = name.rsplit('/').next().unwrap_or(name);
    match file.rfind('.') {
        Some(pos) if pos + 1 < file.len() => file[pos + 1..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// File name without directories or extension.
pub fn stem_of(name: &str) -> &str {
    let file = name.rsplit('/').next().unwrap_or(name);
    match file.rfind('.') {
        Some(pos) if pos > 0 => &file[..pos],
        _ => file,
    }
}

/// Guesses an image MIME type from magic bytes, for buffers that arrive
/// without a file name (card thumbnails).
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        DEFAULT_MIME_TYPE
    }
}

pub fn is_image_mime(mime: &str) -> bool {
    mime.starts_with("image/")
}

pub fn is_audio_mime(mime: &str) -> bool {
    mime.starts_with("audio/")
}

pub fn is_video_mime(mime: &str) -> bool {
    mime.starts_with("video/")
}
