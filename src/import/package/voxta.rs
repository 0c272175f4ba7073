//! Voxta packages.
//!
//! Layout:
//!
//! ```text
//! package.json
//! thumbnail.png
//! Characters/<id>/character.json
//! Characters/<id>/thumbnail.png
//! Characters/<id>/Assets/Avatars/**
//! Characters/<id>/Assets/VoiceSamples/**
//! Scenarios/<id>/scenario.json
//! Scenarios/<id>/thumbnail.png
//! ```
//!
//! A package with several characters becomes a collection; a package with
//! one character imports as that character alone.

use serde_json::Value;
use tracing::{debug, warn};

use crate::card::mime::{extension_of, is_image_mime, mime_for_extension, stem_of};
use crate::card::{
    asset::enforce_single_main, AssetLink, AssetType, CardData, CardMeta, CardSpec, ParsedAsset,
    ParsedCharacter, ParsedCollection, ParsedCollectionMember, ParsedData, ParsedScenario,
};
use crate::import::detect::CardFormat;
use crate::import::error::ImportError;
use crate::import::json::{string_field, tags_field, UNKNOWN_CHARACTER};
use crate::import::package::{
    asset_type_for_extension, manifest_spec, parse_manifest, read_entries, AssetOrdering,
    PackageEntry,
};

pub const UNNAMED_PACKAGE: &str = "Unnamed Package";

const PACKAGE_MANIFEST: &str = "package.json";
const CHARACTERS_DIR: &str = "Characters";
const SCENARIOS_DIR: &str = "Scenarios";
const CHARACTER_MANIFEST: &str = "character.json";
const SCENARIO_MANIFEST: &str = "scenario.json";
const THUMBNAIL_STEM: &str = "thumbnail";
const ASSETS_DIR: &str = "Assets";
const AVATARS_DIR: &str = "Avatars";
const VOICE_SAMPLES_DIR: &str = "VoiceSamples";

/// Files of one `Characters/<id>/` or `Scenarios/<id>/` directory, keyed by
/// the path below it.
#[derive(Debug)]
struct Group<'a> {
    id: String,
    files: Vec<(Vec<&'a str>, &'a PackageEntry)>,
}

impl<'a> Group<'a> {
    fn file(&self, name: &str) -> Option<&'a PackageEntry> {
        self.files.iter().find_map(|(rest, entry)| match rest.as_slice() {
            [only] if only.eq_ignore_ascii_case(name) => Some(*entry),
            _ => None,
        })
    }

    fn thumbnail(&self) -> Option<&'a PackageEntry> {
        self.files.iter().find_map(|(rest, entry)| match rest.as_slice() {
            [only] if is_thumbnail(only) => Some(*entry),
            _ => None,
        })
    }
}

fn is_thumbnail(file: &str) -> bool {
    stem_of(file).eq_ignore_ascii_case(THUMBNAIL_STEM) && is_image_mime(mime_for_extension(&extension_of(file)))
}

/// Buckets entries under `<dir>/<id>/`, keeping first-seen order.
fn group_under<'a>(entries: &'a [PackageEntry], dir: &str) -> Vec<Group<'a>> {
    let mut groups: Vec<Group<'a>> = Vec::new();
    for entry in entries {
        let segments = entry.segments();
        let [top, id, rest @ ..] = segments.as_slice() else {
            continue;
        };
        if !top.eq_ignore_ascii_case(dir) || rest.is_empty() {
            continue;
        }
        let rest = rest.to_vec();
        match groups.iter_mut().find(|group| group.id == *id) {
            Some(group) => group.files.push((rest, entry)),
            None => groups.push(Group {
                id: id.to_string(),
                files: vec![(rest, entry)],
            }),
        }
    }
    groups
}

pub fn parse_voxta(bytes: &[u8]) -> Result<ParsedData, ImportError> {
    let entries = read_entries(bytes, CardFormat::Voxta)?;

    let mut characters: Vec<(String, ParsedCharacter)> = Vec::new();
    for group in group_under(&entries, CHARACTERS_DIR) {
        let Some(manifest) = group.file(CHARACTER_MANIFEST) else {
            warn!(character = %group.id, "character directory has no character.json");
            continue;
        };
        let manifest = parse_manifest(manifest, CardFormat::Voxta)?;
        let id = string_field(&manifest, "Id").unwrap_or_else(|| group.id.clone());
        characters.push((id, parse_character(&group, manifest)));
    }

    if characters.is_empty() {
        return Err(ImportError::malformed(
            CardFormat::Voxta,
            "package contains no characters",
        ));
    }

    if characters.len() == 1 {
        let (_, character) = characters.remove(0);
        debug!(name = %character.card.name(), "single-character Voxta package");
        return Ok(ParsedData::single(character));
    }

    let scenarios = group_under(&entries, SCENARIOS_DIR)
        .iter()
        .enumerate()
        .filter_map(|(order, group)| parse_scenario(group, order as u32).transpose())
        .collect::<Result<Vec<_>, _>>()?;

    let package = match entries
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(PACKAGE_MANIFEST))
    {
        Some(entry) => parse_manifest(entry, CardFormat::Voxta)?,
        None => Value::Object(Default::default()),
    };

    let members: Vec<ParsedCollectionMember> = characters
        .iter()
        .enumerate()
        .map(|(order, (id, character))| ParsedCollectionMember {
            external_id: Some(id.clone()),
            name: character.card.name().to_string(),
            order: order as u32,
            scenario_ids: scenarios
                .iter()
                .filter(|scenario| scenario.character_ids.iter().any(|c| c == id))
                .map(|scenario| scenario.external_id.clone())
                .collect(),
        })
        .collect();

    let thumbnail = entries
        .iter()
        .find(|entry| !entry.name.contains('/') && is_thumbnail(&entry.name))
        .map(|entry| entry.data.clone())
        .or_else(|| characters.iter().find_map(|(_, c)| c.thumbnail.clone()));

    let meta = CardMeta::new(
        string_field(&package, "Name").unwrap_or_else(|| UNNAMED_PACKAGE.to_string()),
        CardSpec::Collection,
    )
    .with_creator(string_field(&package, "Creator"))
    .with_character_version(string_field(&package, "Version"))
    .with_member_count(members.len() as u32)
    .with_package_id(string_field(&package, "Id"));
    debug!(
        name = %meta.name,
        members = members.len(),
        scenarios = scenarios.len(),
        "parsed Voxta collection"
    );

    let collection = ParsedCollection {
        card: CardData::new(meta, package),
        thumbnail,
        members,
        scenarios,
        original_package: Some(bytes.to_vec()),
    };
    let characters = characters.into_iter().map(|(_, c)| c).collect();
    Ok(ParsedData::with_collection(collection, characters))
}

fn parse_character(group: &Group<'_>, manifest: Value) -> ParsedCharacter {
    let meta = CardMeta::new(
        string_field(&manifest, "Name").unwrap_or_else(|| UNKNOWN_CHARACTER.to_string()),
        manifest_spec(&manifest),
    )
    .with_tags(tags_field(&manifest, "Tags"))
    .with_creator(string_field(&manifest, "Creator"))
    .with_character_version(string_field(&manifest, "Version"));

    let thumbnail = group.thumbnail();
    let mut ordering = AssetOrdering::default();
    let mut assets = Vec::new();
    for (rest, entry) in &group.files {
        let is_manifest = matches!(rest.as_slice(), [only] if only.eq_ignore_ascii_case(CHARACTER_MANIFEST));
        if is_manifest || thumbnail.is_some_and(|thumb| std::ptr::eq(thumb, *entry)) {
            continue;
        }
        let asset_type = character_asset_type(rest);
        let file = rest.last().copied().unwrap_or_default();
        let link = AssetLink::new(asset_type, stem_of(file), extension_of(file))
            .with_order(ordering.next(asset_type));
        assets.push(ParsedAsset::new(entry.data.clone(), file, link));
    }
    enforce_single_main(&mut assets);

    ParsedCharacter::new(CardData::new(meta, manifest))
        .with_thumbnail(thumbnail.map(|entry| entry.data.clone()))
        .with_assets(assets)
}

fn character_asset_type(rest: &[&str]) -> AssetType {
    match rest {
        [assets, kind, _, ..] if assets.eq_ignore_ascii_case(ASSETS_DIR) => {
            if kind.eq_ignore_ascii_case(AVATARS_DIR) {
                AssetType::Emotion
            } else if kind.eq_ignore_ascii_case(VOICE_SAMPLES_DIR) {
                AssetType::Sound
            } else {
                asset_type_for_extension(rest.last().copied().unwrap_or_default())
            }
        }
        _ => asset_type_for_extension(rest.last().copied().unwrap_or_default()),
    }
}

fn parse_scenario(group: &Group<'_>, order: u32) -> Result<Option<ParsedScenario>, ImportError> {
    let Some(manifest) = group.file(SCENARIO_MANIFEST) else {
        return Ok(None);
    };
    let manifest = parse_manifest(manifest, CardFormat::Voxta)?;
    let character_ids = manifest
        .get("Roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(|role| string_field(role, "DefaultCharacterId"))
                .collect()
        })
        .unwrap_or_default();
    Ok(Some(ParsedScenario {
        external_id: string_field(&manifest, "Id").unwrap_or_else(|| group.id.clone()),
        name: string_field(&manifest, "Name").unwrap_or_else(|| group.id.clone()),
        description: string_field(&manifest, "Description"),
        version: string_field(&manifest, "Version"),
        creator: string_field(&manifest, "Creator"),
        character_ids,
        order,
        explicit_content: manifest.get("ExplicitContent").and_then(Value::as_bool),
        has_thumbnail: Some(group.thumbnail().is_some()),
    }))
}
