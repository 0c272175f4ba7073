//! Persistence boundary for imported cards.
//!
//! The import service talks to storage exclusively through [`StorageAdapter`].
//! Two reference adapters ship with the crate: [`memory::MemoryStorage`] keeps
//! everything in process with inline `data:` URLs for blobs, and
//! [`directory::DirectoryStorage`] writes JSON records and blob files under a
//! root directory.
//!
//! Adapters own the atomicity of a card's write sequence. The service always
//! creates the card first, then its image and assets, and calls
//! [`StorageAdapter::abort_card`] when a later call fails; the adapter must then
//! remove the card together with every asset created with it as owner.

pub mod directory;
pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::card::{AssetLink, CardData, CardUpdate};

pub use directory::DirectoryStorage;
pub use memory::MemoryStorage;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(CardId);
string_id!(AssetId);

/// Asset payload handed to [`StorageAdapter::create_asset`].
#[derive(Debug, Clone)]
pub struct AssetData<'a> {
    /// Card the asset is being created for; adapters use it to clean up when
    /// the card's write sequence is aborted.
    pub owner: &'a CardId,
    pub filename: &'a str,
    pub mimetype: &'a str,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAsset {
    pub asset_id: AssetId,
    pub url: String,
}

#[derive(Debug)]
pub enum StorageError {
    /// A referenced card or asset does not exist.
    NotFound { kind: &'static str, id: String },
    /// Filesystem failure in a disk-backed adapter.
    Io(std::io::Error),
    /// A record could not be encoded or decoded.
    Serialization(serde_json::Error),
    /// Any other backend failure.
    Backend(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound { kind, id } => write!(f, "{kind} '{id}' not found"),
            StorageError::Io(err) => write!(f, "I/O error: {err}"),
            StorageError::Serialization(err) => write!(f, "serialization error: {err}"),
            StorageError::Backend(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            StorageError::Serialization(err) => Some(err),
            StorageError::NotFound { .. } | StorageError::Backend(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err)
    }
}

/// Capability interface every storage backend implements.
#[async_trait::async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn create_card(&self, card: &CardData) -> Result<CardId, StorageError>;

    async fn update_card(&self, card_id: &CardId, update: &CardUpdate) -> Result<(), StorageError>;

    async fn set_card_image(&self, card_id: &CardId, image: &[u8]) -> Result<(), StorageError>;

    async fn create_asset(&self, asset: &AssetData<'_>) -> Result<CreatedAsset, StorageError>;

    async fn link_asset_to_card(
        &self,
        card_id: &CardId,
        asset_id: &AssetId,
        link: &AssetLink,
    ) -> Result<(), StorageError>;

    async fn link_card_to_collection(
        &self,
        child_card_id: &CardId,
        collection_card_id: &CardId,
    ) -> Result<(), StorageError>;

    /// Compensating delete for a card whose write sequence failed midway.
    ///
    /// Removes the card and every asset created with it as owner, linked or
    /// not. Must succeed when the card is already gone.
    async fn abort_card(&self, card_id: &CardId) -> Result<(), StorageError>;
}
