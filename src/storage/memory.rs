//! Ephemeral in-process storage.
//!
//! Blobs are stored inline as `data:` URLs, the way the browser-local backend
//! keeps them. Everything lives behind one async mutex so concurrent imports
//! serialize their writes.

use std::collections::HashMap;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::card::mime::sniff_image_mime;
use crate::card::{AssetLink, CardData, CardUpdate};
use crate::storage::{AssetData, AssetId, CardId, CreatedAsset, StorageAdapter, StorageError};

#[derive(Debug, Clone)]
pub struct StoredCard {
    pub card: CardData,
    pub image_url: Option<String>,
    pub assets: Vec<(AssetId, AssetLink)>,
    pub collections: Vec<CardId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub owner: CardId,
    pub filename: String,
    pub mimetype: String,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub url: String,
}

#[derive(Default)]
struct MemoryState {
    cards: HashMap<CardId, StoredCard>,
    card_order: Vec<CardId>,
    assets: HashMap<AssetId, StoredAsset>,
}

impl MemoryState {
    fn card_mut(&mut self, card_id: &CardId) -> Result<&mut StoredCard, StorageError> {
        self.cards.get_mut(card_id).ok_or_else(|| StorageError::NotFound {
            kind: "card",
            id: card_id.to_string(),
        })
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn card(&self, card_id: &CardId) -> Option<StoredCard> {
        self.state.lock().await.cards.get(card_id).cloned()
    }

    /// Cards in creation order.
    pub async fn cards(&self) -> Vec<(CardId, StoredCard)> {
        let state = self.state.lock().await;
        state
            .card_order
            .iter()
            .filter_map(|id| state.cards.get(id).map(|card| (id.clone(), card.clone())))
            .collect()
    }

    pub async fn asset(&self, asset_id: &AssetId) -> Option<StoredAsset> {
        self.state.lock().await.assets.get(asset_id).cloned()
    }

    pub async fn card_count(&self) -> usize {
        self.state.lock().await.cards.len()
    }

    pub async fn asset_count(&self) -> usize {
        self.state.lock().await.assets.len()
    }

    /// Assets whose owning card no longer exists.
    pub async fn orphaned_assets(&self) -> Vec<AssetId> {
        let state = self.state.lock().await;
        let mut orphans: Vec<AssetId> = state
            .assets
            .iter()
            .filter(|(_, asset)| !state.cards.contains_key(&asset.owner))
            .map(|(id, _)| id.clone())
            .collect();
        orphans.sort();
        orphans
    }
}

pub(crate) fn data_url(mimetype: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mimetype,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[async_trait::async_trait]
impl StorageAdapter for MemoryStorage {
    async fn create_card(&self, card: &CardData) -> Result<CardId, StorageError> {
        let mut state = self.state.lock().await;
        let mut card_id = CardId::generate();
        while state.cards.contains_key(&card_id) {
            card_id = CardId::generate();
        }
        state.cards.insert(
            card_id.clone(),
            StoredCard {
                card: card.clone(),
                image_url: None,
                assets: Vec::new(),
                collections: Vec::new(),
                created_at: Utc::now(),
            },
        );
        state.card_order.push(card_id.clone());
        debug!(card_id = %card_id, name = card.name(), "memory: card created");
        Ok(card_id)
    }

    async fn update_card(&self, card_id: &CardId, update: &CardUpdate) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.card_mut(card_id)?.card.apply(update);
        Ok(())
    }

    async fn set_card_image(&self, card_id: &CardId, image: &[u8]) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.card_mut(card_id)?.image_url = Some(data_url(sniff_image_mime(image), image));
        Ok(())
    }

    async fn create_asset(&self, asset: &AssetData<'_>) -> Result<CreatedAsset, StorageError> {
        let mut state = self.state.lock().await;
        if !state.cards.contains_key(asset.owner) {
            return Err(StorageError::NotFound {
                kind: "card",
                id: asset.owner.to_string(),
            });
        }
        let mut asset_id = AssetId::generate();
        while state.assets.contains_key(&asset_id) {
            asset_id = AssetId::generate();
        }
        let url = data_url(asset.mimetype, asset.data);
        state.assets.insert(
            asset_id.clone(),
            StoredAsset {
                owner: asset.owner.clone(),
                filename: asset.filename.to_string(),
                mimetype: asset.mimetype.to_string(),
                size: asset.size,
                width: asset.width,
                height: asset.height,
                url: url.clone(),
            },
        );
        Ok(CreatedAsset { asset_id, url })
    }

    async fn link_asset_to_card(
        &self,
        card_id: &CardId,
        asset_id: &AssetId,
        link: &AssetLink,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        if !state.assets.contains_key(asset_id) {
            return Err(StorageError::NotFound {
                kind: "asset",
                id: asset_id.to_string(),
            });
        }
        state
            .card_mut(card_id)?
            .assets
            .push((asset_id.clone(), link.clone()));
        Ok(())
    }

    async fn link_card_to_collection(
        &self,
        child_card_id: &CardId,
        collection_card_id: &CardId,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        if !state.cards.contains_key(collection_card_id) {
            return Err(StorageError::NotFound {
                kind: "card",
                id: collection_card_id.to_string(),
            });
        }
        let child = state.card_mut(child_card_id)?;
        if !child.collections.contains(collection_card_id) {
            child.collections.push(collection_card_id.clone());
        }
        Ok(())
    }

    async fn abort_card(&self, card_id: &CardId) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.cards.remove(card_id);
        state.card_order.retain(|id| id != card_id);
        for card in state.cards.values_mut() {
            card.collections.retain(|id| id != card_id);
        }
        let before = state.assets.len();
        state.assets.retain(|_, asset| &asset.owner != card_id);
        debug!(
            card_id = %card_id,
            removed_assets = before - state.assets.len(),
            "memory: card aborted"
        );
        Ok(())
    }
}
