//! Unified import service.
//!
//! This module provides the [`ImportService`], which runs one input file
//! through Detect → Parse → Process → Persist. Every stage up to Persist is
//! pure; a failure there aborts the whole file before storage is touched.
//! During Persist each character is written independently, and a character
//! whose write sequence fails is rolled back through
//! [`StorageAdapter::abort_card`] so no asset outlives its card.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::card::mime::extension_of;
use crate::card::{AssetLink, AssetType, CardUpdate, ParsedAsset, ParsedData};
use crate::import::assets::process_asset;
use crate::import::detect::{detect_format, CardFormat};
use crate::import::error::{ImportError, ImportFailure};
use crate::import::json::parse_json_bytes;
use crate::import::package::{charx::parse_charx, voxta::parse_voxta};
use crate::import::png::parse_png;
use crate::import::process::{
    process_data, ProcessedCharacter, ProcessedCollection, ProcessedData,
};
use crate::import::report::{EntityOutcome, ImportReport, PersistedCard, PersistedCollection};
use crate::storage::{AssetData, AssetId, CardId, StorageAdapter, StorageError};

const UNNAMED_SOURCE: &str = "<memory>";
const PACKAGE_ORIGINAL_NAME: &str = "original";
const ZIP_MIME_TYPE: &str = "application/zip";

/// Raw input plus whatever the caller knows about where it came from.
#[derive(Debug, Clone, Default)]
pub struct ImportSource {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub mime: Option<String>,
}

impl ImportSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            filename: None,
            mime: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Name used in logs and reports.
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or(UNNAMED_SOURCE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Store the raw package bytes as a `package-original` asset on the
    /// collection card.
    pub keep_original_package: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            keep_original_package: true,
        }
    }
}

/// Runs the import pipeline against one storage backend.
///
/// The service never names a concrete backend; anything implementing
/// [`StorageAdapter`] can receive imports.
pub struct ImportService {
    storage: Arc<dyn StorageAdapter>,
    options: ImportOptions,
}

impl ImportService {
    pub fn new(storage: Arc<dyn StorageAdapter>, options: ImportOptions) -> Self {
        Self { storage, options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Identifies the input format from content first, then name hints.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::UnsupportedFormat`] when neither content nor
    /// hints identify a supported format.
    pub fn detect(&self, source: &ImportSource) -> Result<CardFormat, ImportError> {
        detect_format(
            &source.bytes,
            source.filename.as_deref(),
            source.mime.as_deref(),
        )
    }

    /// Detects and parses an input into the canonical parsed shape.
    ///
    /// # Errors
    ///
    /// Returns the detection error, or the format parser's error.
    pub fn parse(&self, source: &ImportSource) -> Result<ParsedData, ImportError> {
        let format = self.detect(source)?;
        parse_as(format, &source.bytes)
    }

    /// Enriches assets, then runs the card and collection processors.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::ValidationFailed`] when a processor rejects an
    /// entity.
    pub fn process(&self, parsed: ParsedData) -> Result<ProcessedData, ImportError> {
        let ParsedData {
            characters,
            collection,
        } = parsed;
        let characters = characters
            .into_iter()
            .map(|mut character| {
                character.assets = character.assets.into_iter().map(process_asset).collect();
                character
            })
            .collect();
        let parsed = match collection {
            Some(collection) => ParsedData::with_collection(collection, characters),
            None => ParsedData::characters(characters),
        };
        process_data(parsed)
    }

    /// Imports one file end to end.
    ///
    /// # Errors
    ///
    /// Returns an [`ImportFailure`] when detection, parsing, or processing
    /// fails; nothing has been written in that case. Persist failures are
    /// reported per entity inside the returned [`ImportReport`].
    pub async fn import(&self, source: ImportSource) -> Result<ImportReport, ImportFailure> {
        let file = source.display_name().to_string();
        let fail = |error: ImportError| {
            warn!(file = %file, stage = %error.stage(), error = %error, "import failed");
            ImportFailure {
                file: file.clone(),
                error,
            }
        };

        let format = self.detect(&source).map_err(&fail)?;
        debug!(file = %file, format = %format, "detected format");
        let parsed = parse_as(format, &source.bytes).map_err(&fail)?;
        let processed = self.process(parsed).map_err(&fail)?;

        let report = self.persist(&source, format, processed).await;
        info!(
            file = %report.file,
            format = %report.format,
            status = %report.status(),
            "import finished"
        );
        Ok(report)
    }

    async fn persist(
        &self,
        source: &ImportSource,
        format: CardFormat,
        processed: ProcessedData,
    ) -> ImportReport {
        let ProcessedData {
            characters,
            collection,
        } = processed;

        let mut outcomes = Vec::with_capacity(characters.len());
        for character in &characters {
            let result = self.persist_character(character).await;
            if let Err(err) = &result {
                warn!(name = %character.card.name(), error = %err, "character not saved");
            }
            outcomes.push(EntityOutcome {
                name: character.card.name().to_string(),
                result,
            });
        }

        let collection = match collection {
            Some(collection) => {
                let member_ids: Vec<Option<CardId>> = outcomes
                    .iter()
                    .map(|outcome| outcome.result.as_ref().ok().map(|p| p.card_id.clone()))
                    .collect();
                let result = self
                    .persist_collection(source, &collection, &member_ids)
                    .await;
                if let Err(err) = &result {
                    warn!(name = %collection.card.name(), error = %err, "collection not saved");
                }
                Some(EntityOutcome {
                    name: collection.card.name().to_string(),
                    result,
                })
            }
            None => None,
        };

        ImportReport {
            file: source.display_name().to_string(),
            format,
            characters: outcomes,
            collection,
        }
    }

    async fn persist_character(
        &self,
        character: &ProcessedCharacter,
    ) -> Result<PersistedCard, ImportError> {
        let card_id = self.storage.create_card(&character.card).await?;
        debug!(card_id = %card_id, name = %character.card.name(), "card created");

        match self
            .write_card_contents(&card_id, character.thumbnail.as_deref(), &character.assets)
            .await
        {
            Ok(asset_ids) => Ok(PersistedCard { card_id, asset_ids }),
            Err(err) => {
                self.abort(&card_id).await;
                Err(err.into())
            }
        }
    }

    async fn write_card_contents(
        &self,
        card_id: &CardId,
        thumbnail: Option<&[u8]>,
        assets: &[ParsedAsset],
    ) -> Result<Vec<AssetId>, StorageError> {
        if let Some(image) = thumbnail {
            self.storage.set_card_image(card_id, image).await?;
        }
        let mut asset_ids = Vec::with_capacity(assets.len());
        for asset in assets {
            let data = AssetData {
                owner: card_id,
                filename: &asset.filename,
                mimetype: &asset.mimetype,
                size: asset.size,
                width: asset.width,
                height: asset.height,
                data: &asset.data,
            };
            let created = self.storage.create_asset(&data).await?;
            self.storage
                .link_asset_to_card(card_id, &created.asset_id, &asset.link)
                .await?;
            asset_ids.push(created.asset_id);
        }
        Ok(asset_ids)
    }

    /// Writes the collection card after its members. `member_ids[i]` is the
    /// stored card for `collection.members[i]`, if that member was saved.
    async fn persist_collection(
        &self,
        source: &ImportSource,
        collection: &ProcessedCollection,
        member_ids: &[Option<CardId>],
    ) -> Result<PersistedCollection, ImportError> {
        let saved: Vec<&CardId> = member_ids.iter().flatten().collect();
        if saved.is_empty() {
            return Err(ImportError::NoMembersSaved {
                members: member_ids.len(),
            });
        }

        let card_id = self.storage.create_card(&collection.card).await?;
        debug!(card_id = %card_id, name = %collection.card.name(), "collection card created");

        match self
            .write_collection_contents(source, &card_id, collection, &saved)
            .await
        {
            Ok(package_asset) => Ok(PersistedCollection {
                card_id,
                member_ids: saved.into_iter().cloned().collect(),
                package_asset,
            }),
            Err(err) => {
                self.abort(&card_id).await;
                Err(err.into())
            }
        }
    }

    async fn write_collection_contents(
        &self,
        source: &ImportSource,
        card_id: &CardId,
        collection: &ProcessedCollection,
        saved: &[&CardId],
    ) -> Result<Option<AssetId>, StorageError> {
        if let Some(image) = collection.thumbnail.as_deref() {
            self.storage.set_card_image(card_id, image).await?;
        }

        let mut package_asset = None;
        if self.options.keep_original_package {
            if let Some(package) = collection.original_package.as_deref() {
                package_asset = Some(self.store_original_package(source, card_id, package).await?);
            }
        }

        for member_id in saved {
            self.storage.link_card_to_collection(member_id, card_id).await?;
        }

        let expected = collection.members.len();
        if saved.len() < expected {
            debug!(
                card_id = %card_id,
                linked = saved.len(),
                expected,
                "collection saved with missing members"
            );
            let update = CardUpdate {
                member_count: Some(saved.len() as u32),
                ..CardUpdate::default()
            };
            self.storage.update_card(card_id, &update).await?;
        }
        Ok(package_asset)
    }

    async fn store_original_package(
        &self,
        source: &ImportSource,
        card_id: &CardId,
        package: &[u8],
    ) -> Result<AssetId, StorageError> {
        let filename = source
            .filename
            .as_deref()
            .and_then(|name| name.rsplit(['/', '\\']).next())
            .filter(|name| !name.is_empty())
            .unwrap_or("package.zip");
        let ext = match extension_of(filename) {
            ext if ext.is_empty() => "zip".to_string(),
            ext => ext,
        };
        let data = AssetData {
            owner: card_id,
            filename,
            mimetype: ZIP_MIME_TYPE,
            size: package.len() as u64,
            width: None,
            height: None,
            data: package,
        };
        let created = self.storage.create_asset(&data).await?;
        let link = AssetLink::new(AssetType::PackageOriginal, PACKAGE_ORIGINAL_NAME, ext);
        self.storage
            .link_asset_to_card(card_id, &created.asset_id, &link)
            .await?;
        Ok(created.asset_id)
    }

    async fn abort(&self, card_id: &CardId) {
        if let Err(err) = self.storage.abort_card(card_id).await {
            error!(card_id = %card_id, error = %err, "failed to roll back partially written card");
        } else {
            debug!(card_id = %card_id, "rolled back partially written card");
        }
    }
}

/// Runs the parser for an already detected format.
///
/// # Errors
///
/// Returns the format parser's error.
pub fn parse_as(format: CardFormat, bytes: &[u8]) -> Result<ParsedData, ImportError> {
    match format {
        CardFormat::Png => parse_png(bytes).map(ParsedData::single),
        CardFormat::Json => parse_json_bytes(bytes).map(ParsedData::single),
        CardFormat::Charx => parse_charx(bytes).map(ParsedData::single),
        CardFormat::Voxta => parse_voxta(bytes),
    }
}
