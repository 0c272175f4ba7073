use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version or category a card was imported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardSpec {
    V2,
    V3,
    Collection,
    Lorebook,
}

pub const SPEC_MARKER_V2: &str = "chara_card_v2";
pub const SPEC_MARKER_V3: &str = "chara_card_v3";
pub const SPEC_MARKER_LOREBOOK_V3: &str = "lorebook_v3";

impl CardSpec {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardSpec::V2 => "v2",
            CardSpec::V3 => "v3",
            CardSpec::Collection => "collection",
            CardSpec::Lorebook => "lorebook",
        }
    }

    /// Maps a `spec` marker string found in card JSON to a character spec.
    ///
    /// Only the two character-card markers are recognized here; lorebook and
    /// package markers are handled by their own classifiers.
    pub fn from_card_marker(marker: &str) -> Option<CardSpec> {
        match marker {
            SPEC_MARKER_V3 => Some(CardSpec::V3),
            SPEC_MARKER_V2 => Some(CardSpec::V2),
            _ => None,
        }
    }
}

impl fmt::Display for CardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized metadata extracted from any supported input format.
///
/// `spec` is fixed when the value is constructed. Later edits go through
/// [`CardUpdate`], which deliberately has no way to change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMeta {
    pub name: String,
    spec: CardSpec,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
}

impl CardMeta {
    pub fn new(name: impl Into<String>, spec: CardSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            tags: Vec::new(),
            creator: None,
            character_version: None,
            member_count: None,
            package_id: None,
        }
    }

    pub fn spec(&self) -> CardSpec {
        self.spec
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_creator(mut self, creator: Option<String>) -> Self {
        self.creator = creator;
        self
    }

    pub fn with_character_version(mut self, version: Option<String>) -> Self {
        self.character_version = version;
        self
    }

    pub fn with_member_count(mut self, count: u32) -> Self {
        self.member_count = Some(count);
        self
    }

    pub fn with_package_id(mut self, package_id: Option<String>) -> Self {
        self.package_id = package_id;
        self
    }

    /// Applies a partial update. The spec is never touched.
    pub fn apply(&mut self, update: &CardUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(tags) = &update.tags {
            self.tags = tags.clone();
        }
        if let Some(creator) = &update.creator {
            self.creator = Some(creator.clone());
        }
        if let Some(version) = &update.character_version {
            self.character_version = Some(version.clone());
        }
        if let Some(count) = update.member_count {
            self.member_count = Some(count);
        }
        if let Some(package_id) = &update.package_id {
            self.package_id = Some(package_id.clone());
        }
    }
}

/// A card record: normalized metadata plus the spec-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardData {
    pub meta: CardMeta,
    pub data: Value,
}

impl CardData {
    pub fn new(meta: CardMeta, data: Value) -> Self {
        Self { meta, data }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn spec(&self) -> CardSpec {
        self.meta.spec()
    }

    pub fn apply(&mut self, update: &CardUpdate) {
        self.meta.apply(update);
        if let Some(data) = &update.data {
            self.data = data.clone();
        }
    }
}

/// Partial card update accepted by storage adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CardUpdate {
    pub fn is_empty(&self) -> bool {
        self == &CardUpdate::default()
    }
}
