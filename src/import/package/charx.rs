//! CHARX packages: a `card.json` manifest at the archive root plus an
//! `assets/` tree described by `data.assets`.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::card::mime::{extension_of, stem_of};
use crate::card::{
    asset::enforce_single_main, AssetLink, AssetType, CardData, CardSpec, ParsedAsset,
    ParsedCharacter,
};
use crate::import::detect::CardFormat;
use crate::import::error::ImportError;
use crate::import::json::{string_field, CardFields};
use crate::import::package::{
    asset_type_for_extension, manifest_spec, parse_manifest, read_entries, AssetOrdering,
    PackageEntry,
};

pub const MANIFEST: &str = "card.json";
const EMBEDDED_SCHEMES: &[&str] = &["embeded://", "embedded://"];
const DEFAULT_SCHEME: &str = "ccdefault:";
const METADATA_DIR: &str = "x_meta/";
const ASSETS_DIR: &str = "assets/";
const MAIN_ASSET_NAME: &str = "main";

/// An entry of the manifest's `data.assets` list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AssetDescriptor {
    label: String,
    uri: String,
    name: Option<String>,
    ext: Option<String>,
}

impl AssetDescriptor {
    fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            label: string_field(value, "type").unwrap_or_default(),
            uri: string_field(value, "uri")?,
            name: string_field(value, "name"),
            ext: string_field(value, "ext"),
        })
    }

    /// Archive path for URIs that point inside the package.
    fn entry_path(&self) -> Option<&str> {
        EMBEDDED_SCHEMES
            .iter()
            .find_map(|scheme| self.uri.strip_prefix(scheme))
            .map(|path| path.trim_start_matches('/'))
    }

    fn asset_type(&self) -> AssetType {
        AssetType::from_label(&self.label)
    }

    fn is_main_icon(&self) -> bool {
        self.asset_type() == AssetType::Icon && self.name.as_deref() == Some(MAIN_ASSET_NAME)
    }
}

pub fn parse_charx(bytes: &[u8]) -> Result<ParsedCharacter, ImportError> {
    let entries = read_entries(bytes, CardFormat::Charx)?;
    let manifest_entry = entries
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(MANIFEST))
        .ok_or_else(|| ImportError::malformed(CardFormat::Charx, "package has no card.json"))?;
    let manifest = parse_manifest(manifest_entry, CardFormat::Charx)?;

    let spec = manifest_spec(&manifest);
    let fields = match spec {
        CardSpec::V3 => CardFields::from_nested(&manifest),
        _ => CardFields::from_nested_or_flat(&manifest),
    };
    debug!(name = %fields.name, spec = %spec, "parsed CHARX manifest");

    let descriptors: Vec<AssetDescriptor> = manifest
        .get("data")
        .and_then(|data| data.get("assets"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(AssetDescriptor::from_value).collect())
        .unwrap_or_default();

    let mut ordering = AssetOrdering::default();
    let mut claimed: HashSet<&str> = HashSet::new();
    claimed.insert(manifest_entry.name.as_str());
    let mut thumbnail: Option<Vec<u8>> = None;
    let mut assets = Vec::new();

    for descriptor in &descriptors {
        let Some(path) = descriptor.entry_path() else {
            if !descriptor.uri.starts_with(DEFAULT_SCHEME) {
                debug!(uri = %descriptor.uri, "ignoring asset outside the package");
            }
            continue;
        };
        let Some(entry) = find_entry(&entries, path) else {
            warn!(uri = %descriptor.uri, "asset descriptor points at a missing entry");
            continue;
        };
        if !claimed.insert(entry.name.as_str()) {
            continue;
        }
        if thumbnail.is_none() && descriptor.is_main_icon() {
            thumbnail = Some(entry.data.clone());
            continue;
        }
        assets.push(described_asset(entry, descriptor, &mut ordering));
    }

    for entry in &entries {
        if claimed.contains(entry.name.as_str()) || entry.name.starts_with(METADATA_DIR) {
            continue;
        }
        assets.push(undescribed_asset(entry, &mut ordering));
    }

    if thumbnail.is_none() {
        if let Some(pos) = assets
            .iter()
            .position(|asset| asset.link.asset_type == AssetType::Icon && asset.is_image())
        {
            thumbnail = Some(assets.remove(pos).data);
        }
    }
    enforce_single_main(&mut assets);

    let meta = fields.into_meta(spec);
    Ok(ParsedCharacter::new(CardData::new(meta, manifest))
        .with_thumbnail(thumbnail)
        .with_assets(assets))
}

fn find_entry<'a>(entries: &'a [PackageEntry], path: &str) -> Option<&'a PackageEntry> {
    entries
        .iter()
        .find(|entry| entry.name == path)
        .or_else(|| entries.iter().find(|entry| entry.name.eq_ignore_ascii_case(path)))
}

fn described_asset(
    entry: &PackageEntry,
    descriptor: &AssetDescriptor,
    ordering: &mut AssetOrdering,
) -> ParsedAsset {
    let asset_type = descriptor.asset_type();
    let name = descriptor
        .name
        .clone()
        .unwrap_or_else(|| stem_of(&entry.name).to_string());
    let ext = descriptor
        .ext
        .clone()
        .unwrap_or_else(|| extension_of(&entry.name));
    let is_main = name == MAIN_ASSET_NAME;
    let link = AssetLink::new(asset_type, name, ext)
        .with_order(ordering.next(asset_type))
        .main(is_main);
    ParsedAsset::new(entry.data.clone(), file_name(&entry.name), link)
}

/// `assets/<type>/...` names the type; anything else falls back to the
/// extension.
fn undescribed_asset(entry: &PackageEntry, ordering: &mut AssetOrdering) -> ParsedAsset {
    let segments = entry.segments();
    let asset_type = match segments.as_slice() {
        [root, label, _, ..] if root.eq_ignore_ascii_case(ASSETS_DIR.trim_end_matches('/')) => {
            AssetType::from_label(label)
        }
        _ => asset_type_for_extension(&entry.name),
    };
    let link = AssetLink::new(asset_type, stem_of(&entry.name), extension_of(&entry.name))
        .with_order(ordering.next(asset_type));
    ParsedAsset::new(entry.data.clone(), file_name(&entry.name), link)
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::build_zip;
    use serde_json::json;

    fn charx(manifest: &Value, files: &[(&str, &[u8])]) -> Vec<u8> {
        let manifest = manifest.to_string();
        let mut entries: Vec<(&str, &[u8])> = vec![(MANIFEST, manifest.as_bytes())];
        entries.extend_from_slice(files);
        build_zip(&entries)
    }

    fn asset<'a>(parsed: &'a ParsedCharacter, name: &str) -> &'a ParsedAsset {
        parsed
            .assets
            .iter()
            .find(|asset| asset.link.name == name)
            .unwrap_or_else(|| panic!("asset {name} missing"))
    }

    #[test]
    fn v3_manifest_with_descriptors() {
        let manifest = json!({
            "spec": "chara_card_v3",
            "data": {
                "name": "Nova",
                "tags": ["sci-fi"],
                "assets": [
                    {"type": "icon", "uri": "embeded://assets/icon/images/main.png", "name": "main", "ext": "png"},
                    {"type": "background", "uri": "embeded://assets/background/images/sky.webp", "name": "main", "ext": "webp"},
                    {"type": "emotion", "uri": "embeded://assets/emotion/images/happy.png", "name": "happy", "ext": "png"},
                    {"type": "icon", "uri": "ccdefault:", "name": "main", "ext": "png"}
                ]
            }
        });
        let zip = charx(
            &manifest,
            &[
                ("assets/icon/images/main.png", b"icon".as_slice()),
                ("assets/background/images/sky.webp", b"sky"),
                ("assets/emotion/images/happy.png", b"happy"),
                ("x_meta/1.json", b"{}"),
            ],
        );

        let parsed = parse_charx(&zip).unwrap();
        assert_eq!(parsed.card.meta.name, "Nova");
        assert_eq!(parsed.card.spec(), CardSpec::V3);
        assert_eq!(parsed.card.meta.tags, vec!["sci-fi".to_string()]);
        assert_eq!(parsed.thumbnail.as_deref(), Some(b"icon".as_slice()));
        assert_eq!(parsed.assets.len(), 2);

        let background = asset(&parsed, "main");
        assert_eq!(background.link.asset_type, AssetType::Background);
        assert!(background.link.is_main);
        assert_eq!(background.mimetype, "image/webp");

        let happy = asset(&parsed, "happy");
        assert_eq!(happy.link.asset_type, AssetType::Emotion);
        assert_eq!(happy.filename, "happy.png");
        assert!(!happy.link.is_main);
    }

    #[test]
    fn unknown_marker_defaults_to_v2() {
        let manifest = json!({"spec": "something_else", "data": {"name": "Lenient"}});
        let parsed = parse_charx(&charx(&manifest, &[])).unwrap();
        assert_eq!(parsed.card.spec(), CardSpec::V2);
        assert_eq!(parsed.card.meta.name, "Lenient");
    }

    #[test]
    fn missing_name_defaults() {
        let parsed = parse_charx(&charx(&json!({"spec": "chara_card_v3"}), &[])).unwrap();
        assert_eq!(parsed.card.meta.name, "Unknown Character");
    }

    #[test]
    fn undescribed_entries_classified_by_directory_then_extension() {
        let manifest = json!({"spec": "chara_card_v2", "name": "Flat"});
        let zip = charx(
            &manifest,
            &[
                ("assets/icon/portrait.png", b"first".as_slice()),
                ("assets/icon/alt.png", b"second"),
                ("assets/emotions/sad.webp", b"sad"),
                ("theme.mp3", b"audio"),
                ("module.risum", b"module"),
            ],
        );
        let parsed = parse_charx(&zip).unwrap();
        assert_eq!(parsed.card.meta.name, "Flat");
        // First icon stands in for the missing main icon.
        assert_eq!(parsed.thumbnail.as_deref(), Some(b"first".as_slice()));
        assert_eq!(asset(&parsed, "alt").link.asset_type, AssetType::Icon);
        assert_eq!(asset(&parsed, "sad").link.asset_type, AssetType::Emotion);
        assert_eq!(asset(&parsed, "theme").link.asset_type, AssetType::Audio);
        assert_eq!(asset(&parsed, "theme").mimetype, "audio/mpeg");
        let module = asset(&parsed, "module");
        assert_eq!(module.link.asset_type, AssetType::Other);
        assert_eq!(module.mimetype, "application/octet-stream");
    }

    #[test]
    fn duplicate_main_flags_are_cleared() {
        let manifest = json!({
            "spec": "chara_card_v3",
            "data": {
                "name": "Twins",
                "assets": [
                    {"type": "background", "uri": "embeded://a.png", "name": "main", "ext": "png"},
                    {"type": "background", "uri": "embeded://b.png", "name": "main", "ext": "png"}
                ]
            }
        });
        let zip = charx(&manifest, &[("a.png", b"a".as_slice()), ("b.png", b"b")]);
        let parsed = parse_charx(&zip).unwrap();
        let mains = parsed.assets.iter().filter(|a| a.link.is_main).count();
        assert_eq!(mains, 1);
        assert!(parsed.assets[0].link.is_main);
    }

    #[test]
    fn missing_or_invalid_manifest_is_malformed() {
        let no_manifest = build_zip(&[("assets/icon/a.png", b"a".as_slice())]);
        assert!(matches!(
            parse_charx(&no_manifest),
            Err(ImportError::MalformedContainer {
                format: CardFormat::Charx,
                ..
            })
        ));

        let broken = build_zip(&[(MANIFEST, b"{not json".as_slice())]);
        assert!(matches!(
            parse_charx(&broken),
            Err(ImportError::MalformedContainer { .. })
        ));

        assert!(matches!(
            parse_charx(b"PK\x03\x04truncated"),
            Err(ImportError::MalformedContainer { .. })
        ));
    }
}
