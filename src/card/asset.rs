use std::fmt;

use serde::{Deserialize, Serialize};

use crate::card::mime::{extension_of, is_image_mime, mime_for_extension};

pub const ANIMATED_TAG: &str = "animated";

/// Role an asset plays for its card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetType {
    Icon,
    Background,
    Emotion,
    Avatar,
    Gallery,
    Audio,
    Video,
    Sound,
    Custom,
    Other,
    PackageOriginal,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Icon => "icon",
            AssetType::Background => "background",
            AssetType::Emotion => "emotion",
            AssetType::Avatar => "avatar",
            AssetType::Gallery => "gallery",
            AssetType::Audio => "audio",
            AssetType::Video => "video",
            AssetType::Sound => "sound",
            AssetType::Custom => "custom",
            AssetType::Other => "other",
            AssetType::PackageOriginal => "package-original",
        }
    }

    /// Maps a type label as written by card editors (CHARX descriptors,
    /// directory names) to an asset type. Labels nobody agreed on become
    /// `Custom`.
    pub fn from_label(label: &str) -> AssetType {
        match label.trim().to_ascii_lowercase().as_str() {
            "icon" | "icons" => AssetType::Icon,
            "background" | "backgrounds" => AssetType::Background,
            "emotion" | "emotions" | "expression" | "expressions" => AssetType::Emotion,
            "avatar" | "avatars" | "user_icon" => AssetType::Avatar,
            "gallery" => AssetType::Gallery,
            "audio" | "music" | "bgm" => AssetType::Audio,
            "video" | "videos" => AssetType::Video,
            "sound" | "sounds" | "voice" | "voicesamples" => AssetType::Sound,
            "other" | "others" | "misc" => AssetType::Other,
            "package-original" => AssetType::PackageOriginal,
            _ => AssetType::Custom,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an asset is attached to a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetLink {
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub name: String,
    pub ext: String,
    pub order: u32,
    pub is_main: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AssetLink {
    pub fn new(asset_type: AssetType, name: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            asset_type,
            name: name.into(),
            ext: ext.into(),
            order: 0,
            is_main: false,
            tags: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn main(mut self, is_main: bool) -> Self {
        self.is_main = is_main;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing == tag)
    }

    /// Appends a tag unless present. Returns whether it was added.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if self.has_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }
}

/// A binary asset pulled out of an input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAsset {
    pub data: Vec<u8>,
    pub filename: String,
    pub mimetype: String,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub link: AssetLink,
}

impl ParsedAsset {
    /// Builds an asset, deriving MIME type from the file extension and size
    /// from the buffer.
    pub fn new(data: Vec<u8>, filename: impl Into<String>, link: AssetLink) -> Self {
        let filename = filename.into();
        let mimetype = mime_for_extension(&extension_of(&filename)).to_string();
        let size = data.len() as u64;
        Self {
            data,
            filename,
            mimetype,
            size,
            width: None,
            height: None,
            link,
        }
    }

    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mimetype)
    }

    pub fn has_dimensions(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }
}

/// Clears `is_main` on every asset after the first main one of each type.
pub fn enforce_single_main(assets: &mut [ParsedAsset]) {
    let mut seen: Vec<AssetType> = Vec::new();
    for asset in assets.iter_mut() {
        if !asset.link.is_main {
            continue;
        }
        if seen.contains(&asset.link.asset_type) {
            asset.link.is_main = false;
        } else {
            seen.push(asset.link.asset_type);
        }
    }
}

/// True when no asset type has more than one main asset.
pub fn has_single_main_per_type(assets: &[ParsedAsset]) -> bool {
    let mut seen: Vec<AssetType> = Vec::new();
    for asset in assets.iter().filter(|asset| asset.link.is_main) {
        if seen.contains(&asset.link.asset_type) {
            return false;
        }
        seen.push(asset.link.asset_type);
    }
    true
}
