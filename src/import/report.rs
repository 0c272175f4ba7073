use std::fmt;

use crate::import::detect::CardFormat;
use crate::import::error::ImportError;
use crate::storage::{AssetId, CardId};

/// A card that made it into storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCard {
    pub card_id: CardId,
    pub asset_ids: Vec<AssetId>,
}

/// A collection card that made it into storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCollection {
    pub card_id: CardId,
    /// Member cards linked to the collection, in member order.
    pub member_ids: Vec<CardId>,
    pub package_asset: Option<AssetId>,
}

/// Result of persisting one entity.
#[derive(Debug)]
pub struct EntityOutcome<T> {
    pub name: String,
    pub result: Result<T, ImportError>,
}

impl<T> EntityOutcome<T> {
    pub fn is_saved(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&ImportError> {
        self.result.as_ref().err()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Complete,
    Partial { saved: usize, total: usize },
    Failed,
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStatus::Complete => write!(f, "complete"),
            ImportStatus::Partial { saved, total } => write!(f, "partial ({saved}/{total} saved)"),
            ImportStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-entity outcome of one file import.
///
/// Characters are listed in input order. A collection, when present, counts
/// as one more entity.
#[derive(Debug)]
pub struct ImportReport {
    pub file: String,
    pub format: CardFormat,
    pub characters: Vec<EntityOutcome<PersistedCard>>,
    pub collection: Option<EntityOutcome<PersistedCollection>>,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.characters.len() + usize::from(self.collection.is_some())
    }

    pub fn saved(&self) -> usize {
        self.characters.iter().filter(|c| c.is_saved()).count()
            + usize::from(self.collection.as_ref().is_some_and(|c| c.is_saved()))
    }

    pub fn status(&self) -> ImportStatus {
        let (saved, total) = (self.saved(), self.total());
        if saved == 0 {
            ImportStatus::Failed
        } else if saved == total {
            ImportStatus::Complete
        } else {
            ImportStatus::Partial { saved, total }
        }
    }

    /// IDs of saved character cards, in input order.
    pub fn saved_card_ids(&self) -> Vec<&CardId> {
        self.characters
            .iter()
            .filter_map(|c| c.result.as_ref().ok())
            .map(|persisted| &persisted.card_id)
            .collect()
    }

    /// Names and errors of every entity that failed.
    pub fn failures(&self) -> Vec<(&str, &ImportError)> {
        let characters = self
            .characters
            .iter()
            .filter_map(|c| c.error().map(|err| (c.name.as_str(), err)));
        let collection = self
            .collection
            .iter()
            .filter_map(|c| c.error().map(|err| (c.name.as_str(), err)));
        characters.chain(collection).collect()
    }
}
