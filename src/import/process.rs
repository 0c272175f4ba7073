//! Card and collection processing between parse and persist.
//!
//! Processing currently accepts every parsed entity unchanged apart from
//! re-asserting the single-main-per-type rule; rejections would surface as
//! [`ImportError::ValidationFailed`].

use crate::card::asset::enforce_single_main;
use crate::card::{
    CardData, ParsedAsset, ParsedCharacter, ParsedCollection, ParsedCollectionMember,
    ParsedData, ParsedScenario,
};
use crate::import::error::ImportError;

/// A character ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedCharacter {
    pub card: CardData,
    pub thumbnail: Option<Vec<u8>>,
    pub assets: Vec<ParsedAsset>,
}

/// A collection ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedCollection {
    pub card: CardData,
    pub thumbnail: Option<Vec<u8>>,
    pub members: Vec<ParsedCollectionMember>,
    pub scenarios: Vec<ParsedScenario>,
    pub original_package: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedData {
    pub characters: Vec<ProcessedCharacter>,
    pub collection: Option<ProcessedCollection>,
}

impl ProcessedData {
    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }
}

pub fn process_card(parsed: ParsedCharacter) -> Result<ProcessedCharacter, ImportError> {
    let ParsedCharacter {
        card,
        thumbnail,
        mut assets,
    } = parsed;
    enforce_single_main(&mut assets);
    Ok(ProcessedCharacter {
        card,
        thumbnail,
        assets,
    })
}

pub fn process_collection(parsed: ParsedCollection) -> Result<ProcessedCollection, ImportError> {
    let ParsedCollection {
        card,
        thumbnail,
        members,
        scenarios,
        original_package,
    } = parsed;
    Ok(ProcessedCollection {
        card,
        thumbnail,
        members,
        scenarios,
        original_package,
    })
}

/// Processes every entity; the first rejection fails the whole input.
pub fn process_data(parsed: ParsedData) -> Result<ProcessedData, ImportError> {
    let ParsedData {
        characters,
        collection,
    } = parsed;
    let characters = characters
        .into_iter()
        .map(process_card)
        .collect::<Result<Vec<_>, _>>()?;
    let collection = collection.map(process_collection).transpose()?;
    Ok(ProcessedData {
        characters,
        collection,
    })
}
