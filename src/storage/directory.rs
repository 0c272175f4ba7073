//! Durable storage rooted at a directory.
//!
//! Layout:
//! - `cards/<id>.json`   card record with its asset links and collection links
//! - `assets/<id>.json`  asset record (owner, MIME type, dimensions)
//! - `blobs/<id>.<ext>`  asset bytes and card images
//!
//! Records and blobs are written to a synced temporary file in the target
//! directory and persisted over the final name, so a crash never leaves a
//! half-written file behind.
//!
//! A card record lists the assets it owns and, for collections, its member
//! cards, so rolling a card back only touches the files of that card.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::card::mime::{extension_of, sniff_image_mime};
use crate::card::{AssetLink, CardData, CardUpdate};
use crate::storage::{AssetData, AssetId, CardId, CreatedAsset, StorageAdapter, StorageError};

const CARDS_DIR: &str = "cards";
const ASSETS_DIR: &str = "assets";
const BLOBS_DIR: &str = "blobs";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAsset {
    pub asset_id: AssetId,
    pub link: AssetLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub id: CardId,
    pub card: CardData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub assets: Vec<LinkedAsset>,
    #[serde(default)]
    pub collections: Vec<CardId>,
    /// Assets created with this card as owner, linked or not.
    #[serde(default)]
    pub owned_assets: Vec<AssetId>,
    /// Cards linked into this card as a collection.
    #[serde(default)]
    pub members: Vec<CardId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub id: AssetId,
    pub owner: CardId,
    pub filename: String,
    pub mimetype: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub blob: String,
}

pub struct DirectoryStorage {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DirectoryStorage {
    /// Opens (creating if needed) a storage root.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        for dir in [CARDS_DIR, ASSETS_DIR, BLOBS_DIR] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn card_path(&self, card_id: &CardId) -> PathBuf {
        self.root
            .join(CARDS_DIR)
            .join(format!("{}.json", card_id.as_str()))
    }

    fn asset_path(&self, asset_id: &AssetId) -> PathBuf {
        self.root
            .join(ASSETS_DIR)
            .join(format!("{}.json", asset_id.as_str()))
    }

    fn blob_path(&self, blob: &str) -> PathBuf {
        self.root.join(BLOBS_DIR).join(blob)
    }

    pub async fn load_card(&self, card_id: &CardId) -> Result<CardRecord, StorageError> {
        read_json(&self.card_path(card_id), "card", card_id.as_str()).await
    }

    pub async fn load_asset(&self, asset_id: &AssetId) -> Result<AssetRecord, StorageError> {
        read_json(&self.asset_path(asset_id), "asset", asset_id.as_str()).await
    }

    /// IDs of every stored card, sorted.
    pub async fn card_ids(&self) -> Result<Vec<CardId>, StorageError> {
        let mut ids = list_record_ids(&self.root.join(CARDS_DIR)).await?;
        ids.sort();
        Ok(ids.into_iter().map(CardId::new).collect())
    }

    pub async fn asset_ids(&self) -> Result<Vec<AssetId>, StorageError> {
        let mut ids = list_record_ids(&self.root.join(ASSETS_DIR)).await?;
        ids.sort();
        Ok(ids.into_iter().map(AssetId::new).collect())
    }

    async fn update_record<F>(&self, card_id: &CardId, mutate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut CardRecord) + Send,
    {
        let mut record = self.load_card(card_id).await?;
        mutate(&mut record);
        write_json(&self.card_path(card_id), &record).await
    }

    /// Removes the blob before the record, so a failure leaves a record that
    /// still names the blob.
    async fn remove_asset_files(&self, record: &AssetRecord) -> Result<(), StorageError> {
        remove_if_exists(&self.blob_path(&record.blob)).await?;
        remove_if_exists(&self.asset_path(&record.id)).await
    }

    /// Removes every owned asset and the card image. Returns a description of
    /// each file that could not be removed.
    async fn remove_card_files(&self, record: &CardRecord) -> Vec<String> {
        let mut leftovers = Vec::new();
        for asset_id in &record.owned_assets {
            let result = match self.load_asset(asset_id).await {
                Ok(asset) => self.remove_asset_files(&asset).await,
                Err(StorageError::NotFound { .. }) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                leftovers.push(format!("asset {asset_id}: {err}"));
            }
        }
        if let Some(image) = &record.image {
            if let Err(err) = remove_if_exists(&self.blob_path(image)).await {
                leftovers.push(format!("image {image}: {err}"));
            }
        }
        leftovers
    }

    /// Applies `mutate` to a related card, tolerating one that is already gone.
    async fn update_related<F>(&self, card_id: &CardId, mutate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut CardRecord) + Send,
    {
        match self.update_record(card_id, mutate).await {
            Err(StorageError::NotFound { .. }) => Ok(()),
            other => other,
        }
    }
}

async fn read_json<T: DeserializeOwned>(
    path: &Path,
    kind: &'static str,
    id: &str,
) -> Result<T, StorageError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(StorageError::NotFound {
                kind,
                id: id.to_string(),
            })
        }
        Err(err) => return Err(StorageError::Io(err)),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let contents = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &contents).await
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let path = path.to_path_buf();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || persist_synced(&path, &contents))
        .await
        .map_err(|err| StorageError::Backend(format!("write task failed: {err}")))?
}

fn persist_synced(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or_else(|| StorageError::Backend(format!("{} has no parent directory", path.display())))?;
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(contents)?;
    temp_file.as_file_mut().sync_all()?;
    temp_file
        .persist(path)
        .map_err(|err| StorageError::Io(err.error))?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StorageError::Io(err)),
    }
}

async fn list_record_ids(dir: &Path) -> Result<Vec<String>, StorageError> {
    let mut ids = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            ids.push(stem.to_string());
        }
    }
    Ok(ids)
}

fn blob_extension(filename: &str, mimetype: &str) -> String {
    let ext = extension_of(filename);
    if !ext.is_empty() {
        return ext;
    }
    mimetype
        .rsplit('/')
        .next()
        .filter(|sub| !sub.is_empty() && *sub != "octet-stream")
        .unwrap_or("bin")
        .to_string()
}

#[async_trait::async_trait]
impl StorageAdapter for DirectoryStorage {
    async fn create_card(&self, card: &CardData) -> Result<CardId, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut card_id = CardId::generate();
        while fs::try_exists(self.card_path(&card_id)).await? {
            card_id = CardId::generate();
        }
        let record = CardRecord {
            id: card_id.clone(),
            card: card.clone(),
            image: None,
            assets: Vec::new(),
            collections: Vec::new(),
            owned_assets: Vec::new(),
            members: Vec::new(),
            created_at: Utc::now(),
        };
        write_json(&self.card_path(&card_id), &record).await?;
        debug!(card_id = %card_id, name = card.name(), "directory: card created");
        Ok(card_id)
    }

    async fn update_card(&self, card_id: &CardId, update: &CardUpdate) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.update_record(card_id, |record| record.card.apply(update))
            .await
    }

    async fn set_card_image(&self, card_id: &CardId, image: &[u8]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        // Existence check before touching blobs.
        self.load_card(card_id).await?;
        let blob = format!(
            "{}-image.{}",
            card_id.as_str(),
            blob_extension("", sniff_image_mime(image))
        );
        write_atomic(&self.blob_path(&blob), image).await?;
        self.update_record(card_id, |record| record.image = Some(blob))
            .await
    }

    async fn create_asset(&self, asset: &AssetData<'_>) -> Result<CreatedAsset, StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut asset_id = AssetId::generate();
        while fs::try_exists(self.asset_path(&asset_id)).await? {
            asset_id = AssetId::generate();
        }
        // Registered on the owner before any file exists, so an abort always
        // knows about it.
        self.update_record(asset.owner, |record| record.owned_assets.push(asset_id.clone()))
            .await?;

        let blob = format!(
            "{}.{}",
            asset_id.as_str(),
            blob_extension(asset.filename, asset.mimetype)
        );
        let blob_path = self.blob_path(&blob);
        write_atomic(&blob_path, asset.data).await?;

        let record = AssetRecord {
            id: asset_id.clone(),
            owner: asset.owner.clone(),
            filename: asset.filename.to_string(),
            mimetype: asset.mimetype.to_string(),
            size: asset.size,
            width: asset.width,
            height: asset.height,
            blob,
        };
        if let Err(err) = write_json(&self.asset_path(&asset_id), &record).await {
            if let Err(cleanup) = remove_if_exists(&blob_path).await {
                warn!(path = %blob_path.display(), error = %cleanup, "failed to remove unrecorded blob");
            }
            return Err(err);
        }
        Ok(CreatedAsset {
            asset_id,
            url: blob_path.display().to_string(),
        })
    }

    async fn link_asset_to_card(
        &self,
        card_id: &CardId,
        asset_id: &AssetId,
        link: &AssetLink,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.load_asset(asset_id).await?;
        self.update_record(card_id, |record| {
            record.assets.push(LinkedAsset {
                asset_id: asset_id.clone(),
                link: link.clone(),
            })
        })
        .await
    }

    async fn link_card_to_collection(
        &self,
        child_card_id: &CardId,
        collection_card_id: &CardId,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.load_card(child_card_id).await?;
        // The collection learns about the member first, so aborting the
        // collection can always find the back-reference.
        self.update_record(collection_card_id, |record| {
            if !record.members.contains(child_card_id) {
                record.members.push(child_card_id.clone());
            }
        })
        .await?;
        self.update_record(child_card_id, |record| {
            if !record.collections.contains(collection_card_id) {
                record.collections.push(collection_card_id.clone());
            }
        })
        .await
    }

    async fn abort_card(&self, card_id: &CardId) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let record = match self.load_card(card_id).await {
            Ok(record) => record,
            Err(StorageError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };

        // The card record stays while any owned file remains, so the abort
        // can be retried.
        let leftovers = self.remove_card_files(&record).await;
        if !leftovers.is_empty() {
            return Err(StorageError::Backend(format!(
                "rollback of card {card_id} left files behind: {}",
                leftovers.join("; ")
            )));
        }

        for member in &record.members {
            self.update_related(member, |member| member.collections.retain(|id| id != card_id))
                .await?;
        }
        for collection in &record.collections {
            self.update_related(collection, |collection| {
                collection.members.retain(|id| id != card_id)
            })
            .await?;
        }

        remove_if_exists(&self.card_path(card_id)).await?;
        debug!(card_id = %card_id, "directory: card aborted");
        Ok(())
    }
}
