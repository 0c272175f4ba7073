//! JSON card classification.
//!
//! Documents are parsed into an untyped tree first, then run through ordered
//! structural rules that settle on exactly one [`CardDocument`] variant:
//!
//! 1. a `definition` wrapper whose own `spec` is a card marker is unwrapped
//! 2. `spec: chara_card_v3` → [`CardDocument::V3Card`]
//! 3. `spec: chara_card_v2` → [`CardDocument::V2Card`] (fields nested or flat)
//! 4. `entries`, `spec: lorebook_v3`, or a bare `name` → [`CardDocument::Lorebook`]
//! 5. `name` or `description` → [`CardDocument::LegacyV2`]
//! 6. anything else is [`ImportError::UnrecognizedSchema`]

use serde_json::Value;

use crate::card::meta::{SPEC_MARKER_LOREBOOK_V3, SPEC_MARKER_V2, SPEC_MARKER_V3};
use crate::card::{CardData, CardMeta, CardSpec, ParsedCharacter};
use crate::import::error::ImportError;

pub const UNKNOWN_CHARACTER: &str = "Unknown Character";
pub const UNNAMED_LOREBOOK: &str = "Unnamed Lorebook";

/// Fields that mark a flat document as a character rather than a lorebook.
const CHARACTER_FIELDS: &[&str] = &[
    "description",
    "personality",
    "scenario",
    "first_mes",
    "mes_example",
    "data",
];

/// Fields every character rule guarantees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardFields {
    pub name: String,
    pub tags: Vec<String>,
    pub creator: Option<String>,
    pub character_version: Option<String>,
}

impl CardFields {
    /// Reads fields from the nested `data` object only (v3 layout).
    pub fn from_nested(doc: &Value) -> Self {
        let data = doc.get("data").unwrap_or(&Value::Null);
        Self::read(&[data])
    }

    /// Reads fields from `data`, falling back to the top level (v2 variance).
    pub fn from_nested_or_flat(doc: &Value) -> Self {
        match doc.get("data").filter(|data| data.is_object()) {
            Some(data) => Self::read(&[data, doc]),
            None => Self::read(&[doc]),
        }
    }

    fn read(sources: &[&Value]) -> Self {
        let first_string = |key: &str| sources.iter().find_map(|src| string_field(src, key));
        let tags = sources
            .iter()
            .map(|src| tags_field(src, "tags"))
            .find(|tags| !tags.is_empty())
            .unwrap_or_default();
        Self {
            name: first_string("name").unwrap_or_else(|| UNKNOWN_CHARACTER.to_string()),
            tags,
            creator: first_string("creator"),
            character_version: first_string("character_version"),
        }
    }

    pub fn into_meta(self, spec: CardSpec) -> CardMeta {
        CardMeta::new(self.name, spec)
            .with_tags(self.tags)
            .with_creator(self.creator)
            .with_character_version(self.character_version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LorebookFields {
    pub name: String,
    pub entry_count: usize,
}

/// Closed set of JSON shapes the importer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardDocument {
    V3Card(CardFields),
    V2Card(CardFields),
    Lorebook(LorebookFields),
    LegacyV2(CardFields),
}

impl CardDocument {
    pub fn spec(&self) -> CardSpec {
        match self {
            CardDocument::V3Card(_) => CardSpec::V3,
            CardDocument::V2Card(_) | CardDocument::LegacyV2(_) => CardSpec::V2,
            CardDocument::Lorebook(_) => CardSpec::Lorebook,
        }
    }

    pub fn into_meta(self) -> CardMeta {
        let spec = self.spec();
        match self {
            CardDocument::V3Card(fields)
            | CardDocument::V2Card(fields)
            | CardDocument::LegacyV2(fields) => fields.into_meta(spec),
            CardDocument::Lorebook(fields) => CardMeta::new(fields.name, spec),
        }
    }
}

/// A classified document together with the (possibly unwrapped) payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedDocument {
    pub kind: CardDocument,
    pub document: Value,
}

pub fn classify(value: Value) -> Result<ClassifiedDocument, ImportError> {
    if !value.is_object() {
        return Err(ImportError::UnrecognizedSchema(
            "top-level JSON value is not an object".to_string(),
        ));
    }

    let document = match value.get("definition") {
        Some(definition) if card_spec_of(definition).is_some() => definition.clone(),
        _ => value,
    };

    let kind = match spec_marker(&document) {
        Some(SPEC_MARKER_V3) => CardDocument::V3Card(CardFields::from_nested(&document)),
        Some(SPEC_MARKER_V2) => CardDocument::V2Card(CardFields::from_nested_or_flat(&document)),
        marker => {
            if is_lorebook(&document, marker) {
                CardDocument::Lorebook(lorebook_fields(&document))
            } else if document.get("name").is_some() || document.get("description").is_some() {
                CardDocument::LegacyV2(CardFields::read(&[&document]))
            } else {
                return Err(ImportError::UnrecognizedSchema(
                    "document has no spec marker, entries, name, or description".to_string(),
                ));
            }
        }
    };

    Ok(ClassifiedDocument { kind, document })
}

/// Parses raw JSON bytes into a character. Shared by the PNG parser.
pub fn parse_json_bytes(bytes: &[u8]) -> Result<ParsedCharacter, ImportError> {
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| ImportError::UnrecognizedSchema(format!("invalid JSON: {err}")))?;
    parse_json_value(value)
}

pub fn parse_json_value(value: Value) -> Result<ParsedCharacter, ImportError> {
    let ClassifiedDocument { kind, document } = classify(value)?;
    Ok(ParsedCharacter::new(CardData::new(kind.into_meta(), document)))
}

fn spec_marker(doc: &Value) -> Option<&str> {
    doc.get("spec").and_then(Value::as_str)
}

fn card_spec_of(doc: &Value) -> Option<CardSpec> {
    spec_marker(doc).and_then(CardSpec::from_card_marker)
}

fn is_lorebook(doc: &Value, marker: Option<&str>) -> bool {
    if marker == Some(SPEC_MARKER_LOREBOOK_V3) || doc.get("entries").is_some() {
        return true;
    }
    marker.is_none()
        && doc.get("name").is_some()
        && !CHARACTER_FIELDS.iter().any(|field| doc.get(*field).is_some())
}

fn lorebook_fields(doc: &Value) -> LorebookFields {
    let data = doc.get("data").filter(|data| data.is_object());
    let name = string_field(doc, "name")
        .or_else(|| data.and_then(|data| string_field(data, "name")))
        .unwrap_or_else(|| UNNAMED_LOREBOOK.to_string());
    let entries = doc
        .get("entries")
        .or_else(|| data.and_then(|data| data.get("entries")));
    let entry_count = match entries {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        _ => 0,
    };
    LorebookFields { name, entry_count }
}

/// Non-empty string field.
pub(crate) fn string_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Tags as an array of strings, or a comma-separated string.
pub(crate) fn tags_field(obj: &Value, key: &str) -> Vec<String> {
    let raw: Vec<String> = match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(joined)) => joined.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
