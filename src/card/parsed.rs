use serde::{Deserialize, Serialize};

use crate::card::asset::ParsedAsset;
use crate::card::meta::CardData;

/// One character extracted from an input file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCharacter {
    pub card: CardData,
    pub thumbnail: Option<Vec<u8>>,
    pub assets: Vec<ParsedAsset>,
}

impl ParsedCharacter {
    pub fn new(card: CardData) -> Self {
        Self {
            card,
            thumbnail: None,
            assets: Vec::new(),
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<Vec<u8>>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn with_assets(mut self, assets: Vec<ParsedAsset>) -> Self {
        self.assets = assets;
        self
    }
}

/// Reference from a collection to one of its member characters.
///
/// Members are matched by order and name; storage IDs do not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCollectionMember {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub name: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenario_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedScenario {
    pub external_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default)]
    pub character_ids: Vec<String>,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_content: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_thumbnail: Option<bool>,
}

/// A package grouping several characters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCollection {
    pub card: CardData,
    pub thumbnail: Option<Vec<u8>>,
    pub members: Vec<ParsedCollectionMember>,
    pub scenarios: Vec<ParsedScenario>,
    pub original_package: Option<Vec<u8>>,
}

/// Top-level parser output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedData {
    pub characters: Vec<ParsedCharacter>,
    pub collection: Option<ParsedCollection>,
}

impl ParsedData {
    pub fn single(character: ParsedCharacter) -> Self {
        Self {
            characters: vec![character],
            collection: None,
        }
    }

    pub fn characters(characters: Vec<ParsedCharacter>) -> Self {
        Self {
            characters,
            collection: None,
        }
    }

    /// Pairs a collection with its resolved members.
    ///
    /// `characters[i]` must be the character referenced by
    /// `collection.members[i]`.
    pub fn with_collection(collection: ParsedCollection, characters: Vec<ParsedCharacter>) -> Self {
        debug_assert_eq!(collection.members.len(), characters.len());
        Self {
            characters,
            collection: Some(collection),
        }
    }

    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::meta::{CardMeta, CardSpec};
    use serde_json::json;

    fn character(name: &str) -> ParsedCharacter {
        ParsedCharacter::new(CardData::new(CardMeta::new(name, CardSpec::V2), json!({})))
    }

    #[test]
    fn single_is_not_collection() {
        let parsed = ParsedData::single(character("Aria"));
        assert!(!parsed.is_collection());
        assert_eq!(parsed.characters.len(), 1);
    }

    #[test]
    fn collection_keeps_member_order() {
        let members = ["Aria", "Bram"]
            .iter()
            .enumerate()
            .map(|(order, name)| ParsedCollectionMember {
                external_id: None,
                name: name.to_string(),
                order: order as u32,
                scenario_ids: Vec::new(),
            })
            .collect();
        let collection = ParsedCollection {
            card: CardData::new(CardMeta::new("Pack", CardSpec::Collection), json!({})),
            thumbnail: None,
            members,
            scenarios: Vec::new(),
            original_package: None,
        };
        let parsed =
            ParsedData::with_collection(collection, vec![character("Aria"), character("Bram")]);

        assert!(parsed.is_collection());
        let collection = parsed.collection.as_ref().unwrap();
        for (member, character) in collection.members.iter().zip(&parsed.characters) {
            assert_eq!(member.name, character.card.name());
        }
    }

    #[test]
    fn member_serialization_skips_empty_fields() {
        let member = ParsedCollectionMember {
            external_id: None,
            name: "Aria".into(),
            order: 0,
            scenario_ids: Vec::new(),
        };
        let json = serde_json::to_value(&member).unwrap();
        assert_eq!(json, json!({"name": "Aria", "order": 0}));
    }
}
