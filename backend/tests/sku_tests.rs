//! SKU composer tests
//!
//! Composition on item creation, previews, bulk regeneration after
//! taxonomy changes and the effect of display flags.

mod common;

use common::{snapshot, test_app, test_app_with};
use proptest::prelude::*;
use shared::sku::Composition;
use shared::{AttributeValueChanges, CategoryChanges, ItemKind, ValueId};
use warehouse_engine::services::ledger::CreateItemInput;
use warehouse_engine::services::sku::{PreviewInput, RegenerationReport};
use warehouse_engine::services::taxonomy::{CreateAttributeTypeInput, CreateAttributeValueInput};
use warehouse_engine::services::SkuService;
use warehouse_engine::Config;

const TEE: &[(&str, &str)] = &[
    ("brand", "MSW"),
    ("quality", "BS"),
    ("material", "KUL"),
    ("color", "BLK"),
    ("size", "M"),
];

// ============================================================================
// Composition on create
// ============================================================================

mod composition {
    use super::*;

    #[tokio::test]
    async fn test_clothing_item_gets_composed_sku_and_name() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("tsh")).await;

        let created = app.clothing_item(&tees, TEE, 10).await;
        let item = &created.item.item;
        assert_eq!(item.sku.as_deref(), Some("TSH-MSW-BS-KUL-BLK-M"));
        // material stays out of the name
        assert_eq!(item.name, "Футболка Muse Wear Base Черный M");
    }

    #[tokio::test]
    async fn test_explicit_name_wins_over_composed_name() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;

        let created = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    name: "Футболка для выставки".into(),
                    category_id: Some(tees.id),
                    attributes: snapshot(TEE),
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.item.item.name, "Футболка для выставки");
        assert_eq!(created.item.item.sku.as_deref(), Some("TSH-MSW-BS-KUL-BLK-M"));
    }

    #[tokio::test]
    async fn test_incomplete_attributes_fall_back_to_manual_sku() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;

        let created = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    sku: Some("tsh-draft".into()),
                    category_id: Some(tees.id),
                    attributes: snapshot(&[("quality", "BS")]),
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.item.item.sku.as_deref(), Some("TSH-DRAFT"));
        assert_eq!(created.item.item.name, "Футболка Base");
    }

    #[tokio::test]
    async fn test_packaging_is_never_composed() {
        let app = test_app().await;
        let boxes = app.category("Коробки", Some("BOX")).await;

        let created = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    name: "Коробка".into(),
                    item_kind: ItemKind::Packaging,
                    category_id: Some(boxes.id),
                    attributes: snapshot(TEE),
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.item.item.sku, None);
    }

    #[tokio::test]
    async fn test_custom_type_appends_after_builtin_slots() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        app.taxonomy()
            .create_attribute_type(
                app.admin,
                CreateAttributeTypeInput {
                    name: "Принт".into(),
                    slug: None,
                    category_id: None,
                    is_system: false,
                    show_in_sku: true,
                    show_in_name: true,
                    sort_order: None,
                },
            )
            .await
            .unwrap();

        let mut attrs = TEE.to_vec();
        attrs.push(("print", "LOGO"));
        let created = app.clothing_item(&tees, &attrs, 1).await;
        assert_eq!(created.item.item.sku.as_deref(), Some("TSH-MSW-BS-KUL-BLK-M-LOGO"));
    }
}

// ============================================================================
// Preview
// ============================================================================

mod preview {
    use super::*;

    #[tokio::test]
    async fn test_preview_writes_nothing() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;

        let preview = SkuService::new(&app.state)
            .preview(PreviewInput {
                category_id: Some(tees.id),
                item_kind: ItemKind::Clothing,
                attributes: snapshot(TEE),
            })
            .await
            .unwrap();
        assert_eq!(preview.composition.sku(), Some("TSH-MSW-BS-KUL-BLK-M"));
        assert_eq!(app.store.item_count().await, 0);
    }

    #[tokio::test]
    async fn test_preview_lists_missing_slots() {
        let app = test_app().await;

        let preview = SkuService::new(&app.state)
            .preview(PreviewInput {
                category_id: None,
                item_kind: ItemKind::Clothing,
                attributes: snapshot(&[("color", "WHT")]),
            })
            .await
            .unwrap();
        assert_eq!(
            preview.composition,
            Composition::Incomplete {
                missing: vec!["prefix".into(), "quality".into(), "size".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_hidden_seed_value_drops_out_of_sku() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;

        app.taxonomy()
            .update_attribute_value(
                app.admin,
                &ValueId::Seed {
                    type_slug: "brand".into(),
                    code: "MSW".into(),
                },
                AttributeValueChanges {
                    show_in_sku: Some(false),
                    ..AttributeValueChanges::default()
                },
            )
            .await
            .unwrap();

        let preview = SkuService::new(&app.state)
            .preview(PreviewInput {
                category_id: Some(tees.id),
                item_kind: ItemKind::Clothing,
                attributes: snapshot(TEE),
            })
            .await
            .unwrap();
        assert_eq!(preview.composition.sku(), Some("TSH-BS-KUL-BLK-M"));
        assert_eq!(preview.name.as_deref(), Some("Футболка Muse Wear Base Черный M"));
    }
}

// ============================================================================
// Regeneration
// ============================================================================

mod regeneration {
    use super::*;

    #[tokio::test]
    async fn test_prefix_change_is_applied_by_regeneration() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let id = app.clothing_item(&tees, TEE, 3).await.item.item.id;

        app.taxonomy()
            .update_category(
                app.admin,
                tees.id,
                CategoryChanges {
                    prefix: Some("TEE".into()),
                    ..CategoryChanges::default()
                },
            )
            .await
            .unwrap();

        let service = SkuService::new(&app.state);
        let report = service.regenerate_all(false).await.unwrap();
        assert_eq!(
            report,
            RegenerationReport {
                scanned: 1,
                changed: 1,
                skipped: 0
            }
        );
        let item = app.ledger().get_item(id).await.unwrap().item;
        assert_eq!(item.sku.as_deref(), Some("TEE-MSW-BS-KUL-BLK-M"));

        // second run is a no-op
        let again = service.regenerate_all(false).await.unwrap();
        assert_eq!(again.changed, 0);
        assert_eq!(again.scanned, 1);
    }

    #[tokio::test]
    async fn test_incomplete_items_keep_their_sku() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let created = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    name: "Черновик".into(),
                    sku: Some("DRAFT-1".into()),
                    category_id: Some(tees.id),
                    attributes: snapshot(&[("color", "BLK")]),
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap();

        let report = SkuService::new(&app.state).regenerate_all(false).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.changed, 0);
        let item = app.ledger().get_item(created.item.item.id).await.unwrap().item;
        assert_eq!(item.sku.as_deref(), Some("DRAFT-1"));
        assert_eq!(item.name, "Черновик");
    }

    #[tokio::test]
    async fn test_incomplete_item_counted_once_when_renamed() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let created = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    name: "Черновик".into(),
                    sku: Some("DRAFT-1".into()),
                    category_id: Some(tees.id),
                    attributes: snapshot(&[("color", "BLK")]),
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap();

        let report = SkuService::new(&app.state).regenerate_all(true).await.unwrap();
        assert_eq!(
            report,
            RegenerationReport {
                scanned: 1,
                changed: 1,
                skipped: 0
            }
        );
        let item = app.ledger().get_item(created.item.item.id).await.unwrap().item;
        assert_eq!(item.sku.as_deref(), Some("DRAFT-1"));
        assert_eq!(item.name, "Футболка Черный");
    }

    #[tokio::test]
    async fn test_names_only_change_when_requested() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let id = app.clothing_item(&tees, TEE, 1).await.item.item.id;

        app.taxonomy()
            .update_category(
                app.admin,
                tees.id,
                CategoryChanges {
                    name: Some("Футболка оверсайз".into()),
                    ..CategoryChanges::default()
                },
            )
            .await
            .unwrap();

        let service = SkuService::new(&app.state);
        assert_eq!(service.regenerate_all(false).await.unwrap().changed, 0);
        assert_eq!(service.regenerate_all(true).await.unwrap().changed, 1);

        let item = app.ledger().get_item(id).await.unwrap().item;
        assert_eq!(item.name, "Футболка оверсайз Muse Wear Base Черный M");
    }

    #[tokio::test]
    async fn test_code_change_flows_into_regenerated_skus() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let value = app
            .taxonomy()
            .create_attribute_value(
                app.admin,
                "color",
                CreateAttributeValueInput {
                    name: "Хаки".into(),
                    code: "KHK".into(),
                    show_in_name: true,
                    show_in_sku: true,
                    hex: Some("#78866b".into()),
                },
            )
            .await
            .unwrap();
        let attrs = [("quality", "BS"), ("color", "KHK"), ("size", "L")];
        let id = app.clothing_item(&tees, &attrs, 1).await.item.item.id;

        let updated = app
            .taxonomy()
            .update_attribute_value(
                app.admin,
                &value.value.id,
                AttributeValueChanges {
                    code: Some("khaki".into()),
                    ..AttributeValueChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.items_rewritten, 1);

        SkuService::new(&app.state).regenerate_all(false).await.unwrap();
        let item = app.ledger().get_item(id).await.unwrap().item;
        assert_eq!(item.attributes.get("color").map(String::as_str), Some("KHAKI"));
        assert_eq!(item.sku.as_deref(), Some("TSH-BS-KHAKI-L"));
    }

    #[tokio::test]
    async fn test_archived_items_are_not_regenerated() {
        use warehouse_engine::services::lifecycle::ArchiveInput;
        use warehouse_engine::services::LifecycleService;

        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let id = app.clothing_item(&tees, TEE, 0).await.item.item.id;
        LifecycleService::new(&app.state)
            .archive(app.admin, ArchiveInput { ids: vec![id], reason: "снят".into() })
            .await
            .unwrap();

        let report = SkuService::new(&app.state).regenerate_all(true).await.unwrap();
        assert_eq!(report.scanned, 0);
    }

    #[tokio::test]
    async fn test_stale_rename_skips_archived_item() {
        use shared::ItemRename;
        use warehouse_engine::services::lifecycle::ArchiveInput;
        use warehouse_engine::services::LifecycleService;
        use warehouse_engine::store::WarehouseStore;

        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let item = app.clothing_item(&tees, TEE, 0).await.item.item;
        LifecycleService::new(&app.state)
            .archive(app.admin, ArchiveInput { ids: vec![item.id], reason: "снят".into() })
            .await
            .unwrap();

        // planned while the item was still active
        let rename = ItemRename {
            item_id: item.id,
            expected_sku: item.sku.clone(),
            expected_name: item.name.clone(),
            sku: Some("TEE-MSW-BS-KUL-BLK-M".into()),
            name: item.name.clone(),
        };
        assert_eq!(app.store.apply_renames(&[rename]).await.unwrap(), 0);

        let after = app.ledger().get_item(item.id).await.unwrap().item;
        assert_eq!(after.sku, item.sku);
    }

    #[tokio::test]
    async fn test_regeneration_walks_every_chunk() {
        let mut config = Config::default();
        config.inventory.regeneration_chunk_size = 2;
        let app = test_app_with(config).await;
        let tees = app.category("Футболка", Some("TSH")).await;
        for _ in 0..5 {
            app.clothing_item(&tees, TEE, 1).await;
        }
        app.taxonomy()
            .update_category(
                app.admin,
                tees.id,
                CategoryChanges {
                    prefix: Some("TEE".into()),
                    ..CategoryChanges::default()
                },
            )
            .await
            .unwrap();

        let report = SkuService::new(&app.state).regenerate_all(false).await.unwrap();
        assert_eq!(report.scanned, 5);
        assert_eq!(report.changed, 5);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod property_tests {
    use super::*;

    fn code_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 /-]{0,8}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Composed SKUs only ever contain uppercase letters, digits and
        /// separators, and never end in a separator
        #[test]
        fn prop_composed_sku_charset(
            quality in code_strategy(),
            color in code_strategy(),
            size in code_strategy(),
        ) {
            tokio_test::block_on(async {
                let app = test_app().await;
                let preview = SkuService::new(&app.state)
                    .preview(PreviewInput {
                        category_id: Some(app.category("Футболка", Some("TSH")).await.id),
                        item_kind: ItemKind::Clothing,
                        attributes: snapshot(&[
                            ("quality", quality.as_str()),
                            ("color", color.as_str()),
                            ("size", size.as_str()),
                        ]),
                    })
                    .await
                    .unwrap();
                if let Some(sku) = preview.composition.sku() {
                    prop_assert!(sku.starts_with("TSH-"));
                    prop_assert!(sku.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-'));
                    prop_assert!(!sku.ends_with('-'));
                }
                Ok(())
            })?;
        }
    }
}
