// End-to-end import tests across detection, parsing, processing and storage.

#[cfg(test)]
mod integration_tests {

    use std::collections::HashSet;
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    use crate::card::{AssetLink, AssetType, CardData, CardSpec, CardUpdate, ANIMATED_TAG};
    use crate::import::assets::process_asset;
    use crate::import::json::parse_json_value;
    use crate::import::png::{decode_payload, parse_png};
    use crate::import::png_text::extract_text;
    use crate::import::{
        CardFormat, ImportError, ImportOptions, ImportReport, ImportService, ImportSource,
        ImportStage, ImportStatus,
    };
    use crate::storage::directory::DirectoryStorage;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{
        AssetData, AssetId, CardId, CreatedAsset, StorageAdapter, StorageError,
    };
    use crate::utils::test_utils::{build_png, build_zip, card_png, webp_bytes};

    /// Memory storage that refuses to link assets for the named cards.
    struct FlakyStorage {
        inner: Arc<MemoryStorage>,
        fail_for: Vec<String>,
        doomed: Mutex<HashSet<CardId>>,
    }

    impl FlakyStorage {
        fn new(fail_for: &[&str]) -> Self {
            Self {
                inner: Arc::new(MemoryStorage::new()),
                fail_for: fail_for.iter().map(|name| name.to_string()).collect(),
                doomed: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl StorageAdapter for FlakyStorage {
        async fn create_card(&self, card: &CardData) -> Result<CardId, StorageError> {
            let id = self.inner.create_card(card).await?;
            if self.fail_for.iter().any(|name| name == card.name()) {
                self.doomed.lock().await.insert(id.clone());
            }
            Ok(id)
        }

        async fn update_card(&self, id: &CardId, update: &CardUpdate) -> Result<(), StorageError> {
            self.inner.update_card(id, update).await
        }

        async fn set_card_image(&self, id: &CardId, image: &[u8]) -> Result<(), StorageError> {
            self.inner.set_card_image(id, image).await
        }

        async fn create_asset(&self, asset: &AssetData<'_>) -> Result<CreatedAsset, StorageError> {
            self.inner.create_asset(asset).await
        }

        async fn link_asset_to_card(
            &self,
            card_id: &CardId,
            asset_id: &AssetId,
            link: &AssetLink,
        ) -> Result<(), StorageError> {
            if self.doomed.lock().await.contains(card_id) {
                return Err(StorageError::Backend("disk full".to_string()));
            }
            self.inner.link_asset_to_card(card_id, asset_id, link).await
        }

        async fn link_card_to_collection(
            &self,
            child: &CardId,
            collection: &CardId,
        ) -> Result<(), StorageError> {
            self.inner.link_card_to_collection(child, collection).await
        }

        async fn abort_card(&self, card_id: &CardId) -> Result<(), StorageError> {
            self.inner.abort_card(card_id).await
        }
    }

    fn voxta_trio() -> Vec<u8> {
        let manifests: Vec<(String, String)> = ["one", "two", "three"]
            .iter()
            .map(|id| {
                (
                    format!("Characters/{id}/character.json"),
                    json!({"Name": format!("Char {id}")}).to_string(),
                )
            })
            .collect();
        let package = json!({"Id": "trio", "Name": "Trio"}).to_string();
        let png = build_png(&[]);
        let mut entries: Vec<(String, Vec<u8>)> =
            vec![("package.json".to_string(), package.into_bytes())];
        for (i, (path, manifest)) in manifests.into_iter().enumerate() {
            let id = ["one", "two", "three"][i];
            entries.push((path, manifest.into_bytes()));
            entries.push((
                format!("Characters/{id}/Assets/Avatars/Default/Smile_{i}.png"),
                png.clone(),
            ));
            entries.push((
                format!("Characters/{id}/Assets/VoiceSamples/hello_{i}.wav"),
                b"RIFF".to_vec(),
            ));
        }
        let borrowed: Vec<(&str, &[u8])> = entries
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();
        build_zip(&borrowed)
    }

    #[test]
    fn png_parser_delegates_to_json_parser() {
        let doc = json!({
            "spec": "chara_card_v2",
            "data": {"name": "Aria", "tags": "fantasy, elf", "creator": "someone"}
        });
        let png = card_png("chara", &doc);

        let from_png = parse_png(&png).unwrap();
        let payload = decode_payload(&extract_text(&png, &["ccv3", "chara"]).unwrap()).unwrap();
        let decoded: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded, doc);
        let from_json = parse_json_value(decoded).unwrap();
        assert_eq!(from_png.card, from_json.card);
    }

    #[test]
    fn asset_processing_twice_matches_once() {
        let link = AssetLink::new(AssetType::Emotion, "wave", "webp");
        let asset = crate::card::ParsedAsset::new(webp_bytes(true), "wave.webp", link);
        let once = process_asset(asset);
        let twice = process_asset(once.clone());
        assert_eq!(once.width, twice.width);
        assert_eq!(once.height, twice.height);
        assert_eq!(once.link.tags, twice.link.tags);
        assert_eq!(twice.link.tags, vec![ANIMATED_TAG.to_string()]);
    }

    async fn import_error(svc: &ImportService, source: ImportSource) -> ImportError {
        let failure = svc.import(source).await.unwrap_err();
        assert_ne!(failure.stage(), ImportStage::Persist);
        failure.error
    }

    #[tokio::test]
    async fn malformed_input_fails_with_matching_error() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = ImportService::new(storage.clone(), ImportOptions::default());
        let png = card_png("chara", &json!({"spec": "chara_card_v2", "name": "Aria"}));

        let truncated = ImportSource::new(png[..png.len() - 30].to_vec());
        assert!(matches!(
            import_error(&svc, truncated).await,
            ImportError::MalformedContainer {
                format: CardFormat::Png,
                ..
            }
        ));

        let bare = ImportSource::new(build_png(&[]));
        assert!(matches!(
            import_error(&svc, bare).await,
            ImportError::MissingEmbeddedData { .. }
        ));

        let charx = ImportSource::new(build_zip(&[("card.json", b"{oops".as_slice())]));
        assert!(matches!(
            import_error(&svc, charx).await,
            ImportError::MalformedContainer {
                format: CardFormat::Charx,
                ..
            }
        ));

        let voxta = ImportSource::new(build_zip(&[("package.json", b"{}".as_slice())]));
        assert!(matches!(
            import_error(&svc, voxta).await,
            ImportError::MalformedContainer {
                format: CardFormat::Voxta,
                ..
            }
        ));

        let json = ImportSource::new(b"{\"spec\": \"chara_card_v2\", ".to_vec());
        assert!(matches!(
            import_error(&svc, json).await,
            ImportError::UnrecognizedSchema(_)
        ));

        let unknown = ImportSource::new(b"\x00\x01binary".to_vec()).with_filename("blob.bin");
        assert!(matches!(
            import_error(&svc, unknown).await,
            ImportError::UnsupportedFormat { .. }
        ));

        assert_eq!(storage.card_count().await, 0);
    }

    #[test]
    fn definition_wrapper_wins_over_legacy_shape() {
        let parsed = parse_json_value(json!({
            "name": "Outer",
            "definition": {"spec": "chara_card_v3", "data": {"name": "Wrapped"}}
        }))
        .unwrap();
        assert_eq!(parsed.card.spec(), CardSpec::V3);
        assert_eq!(parsed.card.meta.name, "Wrapped");
    }

    #[tokio::test]
    async fn aria_json_example() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = ImportService::new(storage.clone(), ImportOptions::default());
        let bytes = br#"{"spec":"chara_card_v2","name":"Aria","tags":["fantasy"]}"#.to_vec();

        let parsed = svc.parse(&ImportSource::new(bytes.clone())).unwrap();
        assert_eq!(parsed.characters.len(), 1);
        assert!(!parsed.is_collection());
        let meta = &parsed.characters[0].card.meta;
        assert_eq!(meta.name, "Aria");
        assert_eq!(meta.spec(), CardSpec::V2);
        assert_eq!(meta.tags, vec!["fantasy".to_string()]);

        let report = svc.import(ImportSource::new(bytes)).await.unwrap();
        assert_eq!(report.status(), ImportStatus::Complete);
        assert_eq!(storage.card_count().await, 1);
        assert_eq!(storage.asset_count().await, 0);
    }

    #[test]
    fn entries_without_marker_is_lorebook() {
        let parsed = parse_json_value(json!({"entries": [{"keys": ["elf"], "content": "..."}]}))
            .unwrap();
        assert_eq!(parsed.card.spec(), CardSpec::Lorebook);
    }

    #[tokio::test]
    async fn charx_without_marker_imports_as_v2() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = ImportService::new(storage.clone(), ImportOptions::default());
        let manifest = json!({"data": {"name": "Plain"}}).to_string();
        let icon = build_png(&[]);
        let zip = build_zip(&[
            ("card.json", manifest.as_bytes()),
            ("assets/icon/main.png", icon.as_slice()),
            ("assets/background/sky.png", icon.as_slice()),
        ]);

        let report = svc
            .import(ImportSource::new(zip).with_filename("plain.charx"))
            .await
            .unwrap();
        assert_eq!(report.format, CardFormat::Charx);
        let saved = report.characters[0].result.as_ref().unwrap();
        let stored = storage.card(&saved.card_id).await.unwrap();
        assert_eq!(stored.card.spec(), CardSpec::V2);
        assert!(stored.image_url.is_some());
        assert_eq!(stored.assets.len(), 1);
        assert_eq!(stored.assets[0].1.asset_type, AssetType::Background);

        let asset = storage.asset(&stored.assets[0].0).await.unwrap();
        assert_eq!((asset.width, asset.height), (Some(1), Some(1)));
    }

    #[tokio::test]
    async fn webp_anim_tag_survives_persist() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = ImportService::new(storage.clone(), ImportOptions::default());
        let manifest = json!({"spec": "chara_card_v3", "data": {"name": "Waver"}}).to_string();
        let animated = webp_bytes(true);
        let still = webp_bytes(false);
        let zip = build_zip(&[
            ("card.json", manifest.as_bytes()),
            ("assets/emotion/wave.webp", animated.as_slice()),
            ("assets/emotion/idle.webp", still.as_slice()),
        ]);

        let report = svc.import(ImportSource::new(zip)).await.unwrap();
        let card_id = report.saved_card_ids()[0].clone();
        let stored = storage.card(&card_id).await.unwrap();
        let tags_of = |name: &str| {
            stored
                .assets
                .iter()
                .find(|(_, link)| link.name == name)
                .map(|(_, link)| link.tags.clone())
                .unwrap()
        };
        assert_eq!(tags_of("wave"), vec![ANIMATED_TAG.to_string()]);
        assert!(tags_of("idle").is_empty());
    }

    #[tokio::test]
    async fn second_of_three_characters_fails_without_orphans() {
        let storage = Arc::new(FlakyStorage::new(&["Char two"]));
        let inner = storage.inner.clone();
        let svc = ImportService::new(storage, ImportOptions::default());

        let report = svc
            .import(ImportSource::new(voxta_trio()).with_filename("trio.voxpkg"))
            .await
            .unwrap();

        assert_eq!(report.format, CardFormat::Voxta);
        let names: Vec<&str> = report.characters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Char one", "Char two", "Char three"]);
        assert!(report.characters[0].is_saved());
        assert!(matches!(
            report.characters[1].error(),
            Some(ImportError::StorageWriteFailed(_))
        ));
        assert!(report.characters[2].is_saved());
        assert_eq!(report.status(), ImportStatus::Partial { saved: 3, total: 4 });

        assert!(inner.orphaned_assets().await.is_empty());
        let cards = inner.cards().await;
        assert!(cards.iter().all(|(_, card)| card.card.name() != "Char two"));

        // The collection still links the two saved members.
        let collection = report.collection.as_ref().unwrap().result.as_ref().unwrap();
        assert_eq!(collection.member_ids.len(), 2);
        assert!(collection.package_asset.is_some());
        let stored = inner.card(&collection.card_id).await.unwrap();
        assert_eq!(stored.card.meta.member_count, Some(2));
        assert_eq!(stored.card.spec(), CardSpec::Collection);
        for member in &collection.member_ids {
            let member = inner.card(member).await.unwrap();
            assert_eq!(member.collections, vec![collection.card_id.clone()]);
        }
        // Two saved characters with two assets each, plus the package.
        assert_eq!(inner.asset_count().await, 5);
    }

    #[tokio::test]
    async fn collection_is_skipped_when_no_member_is_saved() {
        let storage = Arc::new(FlakyStorage::new(&["Char one", "Char two", "Char three"]));
        let inner = storage.inner.clone();
        let svc = ImportService::new(storage, ImportOptions::default());

        let report = svc
            .import(ImportSource::new(voxta_trio()).with_filename("trio.voxpkg"))
            .await
            .unwrap();

        assert_eq!(report.status(), ImportStatus::Failed);
        let collection = report.collection.as_ref().unwrap();
        assert!(matches!(
            collection.error(),
            Some(ImportError::NoMembersSaved { members: 3 })
        ));
        assert_eq!(collection.error().unwrap().stage(), ImportStage::Persist);
        assert_eq!(inner.card_count().await, 0);
        assert_eq!(inner.asset_count().await, 0);
    }

    /// Starts eight imports at once against one adapter and returns their
    /// reports in spawn order.
    async fn import_concurrently(storage: Arc<dyn StorageAdapter>) -> Vec<ImportReport> {
        let svc = Arc::new(ImportService::new(storage, ImportOptions::default()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let source = if i % 2 == 0 {
                ImportSource::new(voxta_trio()).with_filename(format!("trio-{i}.voxpkg"))
            } else {
                let doc = json!({"spec": "chara_card_v2", "data": {"name": format!("Solo {i}")}});
                ImportSource::new(card_png("chara", &doc)).with_filename(format!("solo-{i}.png"))
            };
            let svc = svc.clone();
            handles.push(tokio::spawn(async move { svc.import(source).await }));
        }
        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            reports.push(handle.await.unwrap().unwrap());
        }
        reports
    }

    /// Every card and asset id reported as saved, checked for uniqueness.
    fn saved_ids(reports: &[ImportReport]) -> (HashSet<CardId>, HashSet<AssetId>) {
        let mut cards = Vec::new();
        let mut assets = Vec::new();
        for report in reports {
            assert_eq!(report.status(), ImportStatus::Complete, "{}", report.file);
            for character in &report.characters {
                let persisted = character.result.as_ref().unwrap();
                cards.push(persisted.card_id.clone());
                assets.extend(persisted.asset_ids.iter().cloned());
            }
            if let Some(collection) = &report.collection {
                let persisted = collection.result.as_ref().unwrap();
                cards.push(persisted.card_id.clone());
                assets.extend(persisted.package_asset.iter().cloned());
            }
        }
        let (card_total, asset_total) = (cards.len(), assets.len());
        let cards: HashSet<CardId> = cards.into_iter().collect();
        let assets: HashSet<AssetId> = assets.into_iter().collect();
        assert_eq!(cards.len(), card_total, "duplicate card ids");
        assert_eq!(assets.len(), asset_total, "duplicate asset ids");
        (cards, assets)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_imports_share_memory_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let reports = import_concurrently(storage.clone()).await;
        let (cards, assets) = saved_ids(&reports);

        // Four trios (3 members + collection, 7 assets) and four single cards.
        assert_eq!(cards.len(), 4 * 4 + 4);
        assert_eq!(assets.len(), 4 * 7);
        assert_eq!(storage.card_count().await, cards.len());
        assert_eq!(storage.asset_count().await, assets.len());
        assert!(storage.orphaned_assets().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_imports_share_directory_storage() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(DirectoryStorage::open(dir.path()).await.unwrap());
        let reports = import_concurrently(storage.clone()).await;
        let (cards, assets) = saved_ids(&reports);

        let stored_cards: HashSet<CardId> = storage.card_ids().await.unwrap().into_iter().collect();
        let stored_assets: HashSet<AssetId> =
            storage.asset_ids().await.unwrap().into_iter().collect();
        assert_eq!(stored_cards, cards);
        assert_eq!(stored_assets, assets);
    }

    #[tokio::test]
    async fn original_package_can_be_skipped() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = ImportService::new(
            storage.clone(),
            ImportOptions {
                keep_original_package: false,
            },
        );
        let report = svc.import(ImportSource::new(voxta_trio())).await.unwrap();
        assert_eq!(report.status(), ImportStatus::Complete);
        let collection = report.collection.unwrap().result.unwrap();
        assert!(collection.package_asset.is_none());
        assert_eq!(storage.asset_count().await, 6);
        assert_eq!(storage.card_count().await, 4);
    }

    #[tokio::test]
    async fn directory_storage_end_to_end() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(DirectoryStorage::open(dir.path()).await.unwrap());
        let svc = ImportService::new(storage.clone(), ImportOptions::default());

        let report = svc
            .import(ImportSource::new(voxta_trio()).with_filename("trio.voxpkg"))
            .await
            .unwrap();
        assert_eq!(report.status(), ImportStatus::Complete);
        assert_eq!(storage.card_ids().await.unwrap().len(), 4);
        assert_eq!(storage.asset_ids().await.unwrap().len(), 7);

        let collection = report.collection.unwrap().result.unwrap();
        let record = storage.load_card(&collection.card_id).await.unwrap();
        assert_eq!(record.card.meta.package_id.as_deref(), Some("trio"));
        assert_eq!(record.card.meta.member_count, Some(3));
    }
}
