//! ZIP-based card packages.
//!
//! Both package formats are read fully into memory first; the per-format
//! parsers then work over the flat entry list in central-directory order.

pub mod charx;
pub mod voxta;

use std::collections::HashMap;
use std::io::{Cursor, Read};

use serde_json::Value;
use tracing::debug;
use zip::ZipArchive;

use crate::card::mime::{extension_of, is_audio_mime, is_video_mime, mime_for_extension};
use crate::card::meta::SPEC_MARKER_V3;
use crate::card::{AssetType, CardSpec};
use crate::import::detect::CardFormat;
use crate::import::error::ImportError;

const JUNK_PREFIXES: &[&str] = &["__MACOSX/"];
const JUNK_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// One file inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl PackageEntry {
    /// Path segments, ignoring empty ones produced by leading or doubled
    /// slashes.
    pub fn segments(&self) -> Vec<&str> {
        self.name.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// Reads every file entry of a ZIP archive.
pub fn read_entries(bytes: &[u8], format: CardFormat) -> Result<Vec<PackageEntry>, ImportError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ImportError::malformed(format, format!("cannot read archive: {err}")))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(|err| {
            ImportError::malformed(format, format!("cannot read entry {index}: {err}"))
        })?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().replace('\\', "/");
        if is_junk(&name) {
            debug!(entry = %name, "skipping platform metadata entry");
            continue;
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data).map_err(|err| {
            ImportError::malformed(format, format!("cannot decompress {name}: {err}"))
        })?;
        entries.push(PackageEntry { name, data });
    }
    Ok(entries)
}

fn is_junk(name: &str) -> bool {
    if JUNK_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return true;
    }
    let file = name.rsplit('/').next().unwrap_or(name);
    JUNK_FILES.contains(&file) || file.starts_with("._")
}

/// Parses a JSON manifest entry, failing the whole package when it is not a
/// JSON object.
pub(crate) fn parse_manifest(
    entry: &PackageEntry,
    format: CardFormat,
) -> Result<Value, ImportError> {
    let body = entry
        .data
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(&entry.data);
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        ImportError::malformed(format, format!("{} is not valid JSON: {err}", entry.name))
    })?;
    if !value.is_object() {
        return Err(ImportError::malformed(
            format,
            format!("{} is not a JSON object", entry.name),
        ));
    }
    Ok(value)
}

/// Package manifests only distinguish v3 from everything else; unknown or
/// missing markers are treated as v2.
pub(crate) fn manifest_spec(manifest: &Value) -> CardSpec {
    match manifest.get("spec").and_then(Value::as_str) {
        Some(SPEC_MARKER_V3) => CardSpec::V3,
        _ => CardSpec::V2,
    }
}

/// Asset type for a file that carries no directory hint.
pub fn asset_type_for_extension(name: &str) -> AssetType {
    let mime = mime_for_extension(&extension_of(name));
    if is_audio_mime(mime) {
        AssetType::Audio
    } else if is_video_mime(mime) {
        AssetType::Video
    } else {
        AssetType::Other
    }
}

/// Hands out per-type order numbers in the order assets are discovered.
#[derive(Debug, Default)]
pub(crate) struct AssetOrdering {
    next: HashMap<AssetType, u32>,
}

impl AssetOrdering {
    pub fn next(&mut self, asset_type: AssetType) -> u32 {
        let slot = self.next.entry(asset_type).or_insert(0);
        let order = *slot;
        *slot += 1;
        order
    }
}
