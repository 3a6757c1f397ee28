//! Stock ledger tests
//!
//! Covers item creation with its opening row, signed movements, absolute
//! quantity changes, atomicity of item + ledger writes and reconciliation.

mod common;

use common::{snapshot, test_app, TestApp};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{ItemKind, StockStatus, TransactionKind, OPENING_REASON};
use warehouse_engine::error::AppError;
use warehouse_engine::services::ledger::{
    AdjustQuantityInput, CreateItemInput, MoveItemsInput, SetQuantityInput, UpdateItemInput,
};
use warehouse_engine::store::ItemFilter;

fn movement(delta: i32, kind: &str) -> AdjustQuantityInput {
    AdjustQuantityInput {
        delta,
        kind: kind.to_string(),
        reason: None,
        cost_price: None,
        allow_negative: false,
    }
}

async fn adjust(app: &TestApp, item_id: uuid::Uuid, delta: i32, kind: &str) -> Result<i32, AppError> {
    app.ledger()
        .adjust_quantity(app.operator, item_id, movement(delta, kind))
        .await
        .map(|m| m.item.item.quantity)
}

// ============================================================================
// Item creation
// ============================================================================

mod creation {
    use super::*;

    #[tokio::test]
    async fn test_create_writes_opening_transaction() {
        let app = test_app().await;
        let created = app.packaging_item("Коробка 20x20", 15).await;

        assert_eq!(created.item.item.quantity, 15);
        assert_eq!(created.opening_transaction.change_amount, 15);
        assert_eq!(created.opening_transaction.kind, TransactionKind::In);
        assert_eq!(created.opening_transaction.reason.as_deref(), Some(OPENING_REASON));
        assert_eq!(created.opening_transaction.created_by, Some(app.admin.id));

        let history = app.ledger().list_transactions(created.item.item.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_quantity_still_writes_opening_row() {
        let app = test_app().await;
        let created = app.packaging_item("Скотч", 0).await;
        assert_eq!(created.opening_transaction.change_amount, 0);

        let report = app.ledger().reconcile(created.item.item.id).await.unwrap();
        assert!(report.matches);
        assert_eq!(report.transaction_count, 1);
    }

    #[tokio::test]
    async fn test_create_applies_configured_defaults() {
        let app = test_app().await;
        let created = app.packaging_item("Пакет", 5).await;
        let item = &created.item.item;
        assert_eq!(item.low_stock_threshold, 10);
        assert_eq!(item.critical_stock_threshold, 0);
        assert_eq!(item.unit, "шт");
        assert_eq!(created.item.stock_status, StockStatus::Low);
    }

    #[tokio::test]
    async fn test_negative_initial_quantity_is_rejected() {
        let app = test_app().await;
        let err = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    name: "Лента".into(),
                    item_kind: ItemKind::Consumables,
                    quantity: -1,
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));
        assert_eq!(app.store.item_count().await, 0);
    }

    #[tokio::test]
    async fn test_negative_price_is_rejected() {
        let app = test_app().await;
        let err = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    name: "Лента".into(),
                    item_kind: ItemKind::Consumables,
                    cost_price: Some(Decimal::new(-100, 2)),
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "cost_price"));
    }

    #[tokio::test]
    async fn test_name_required_when_nothing_to_compose() {
        let app = test_app().await;
        let err = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    item_kind: ItemKind::Packaging,
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "name"));
    }

    #[tokio::test]
    async fn test_manual_sku_is_sanitized_and_duplicates_flagged() {
        let app = test_app().await;
        let input = || CreateItemInput {
            name: "Коробка".into(),
            sku: Some(" box-20/20 ".into()),
            item_kind: ItemKind::Packaging,
            ..CreateItemInput::default()
        };

        let first = app.ledger().create_item(app.admin, input()).await.unwrap();
        assert_eq!(first.item.item.sku.as_deref(), Some("BOX-2020"));
        assert!(!first.duplicate_sku);

        let second = app.ledger().create_item(app.admin, input()).await.unwrap();
        assert!(second.duplicate_sku);

        let found = app.ledger().find_by_sku("box-2020").await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_category_is_not_found() {
        let app = test_app().await;
        let err = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    name: "Футболка".into(),
                    category_id: Some(uuid::Uuid::new_v4()),
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

// ============================================================================
// Editing
// ============================================================================

mod editing {
    use super::*;
    use warehouse_engine::services::lifecycle::ArchiveInput;
    use warehouse_engine::services::LifecycleService;

    const TEE: &[(&str, &str)] = &[("quality", "BS"), ("color", "BLK"), ("size", "M")];

    #[tokio::test]
    async fn test_attribute_change_recomposes_sku_and_name() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let created = app.clothing_item(&tees, TEE, 6).await.item.item;
        assert_eq!(created.name, "Футболка Base Черный M");

        let edited = app
            .ledger()
            .update_item(
                app.manager,
                created.id,
                UpdateItemInput {
                    attributes: Some(snapshot(&[("quality", "BS"), ("color", "WHT"), ("size", "M")])),
                    ..UpdateItemInput::default()
                },
            )
            .await
            .unwrap();
        let item = edited.item.item;
        assert_eq!(item.sku.as_deref(), Some("TSH-BS-WHT-M"));
        assert_eq!(item.name, "Футболка Base Белый M");
        assert_eq!(item.quantity, 6);
        assert!(!edited.duplicate_sku);

        let history = app.ledger().list_transactions(created.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(app.audit.actions().contains(&"item.update".to_string()));
    }

    #[tokio::test]
    async fn test_hand_written_name_survives_recomposition() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let polo = app.category("Поло", Some("POL")).await;
        let created = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    name: "Промо футболка".into(),
                    category_id: Some(tees.id),
                    attributes: snapshot(TEE),
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap();

        let edited = app
            .ledger()
            .update_item(
                app.admin,
                created.item.item.id,
                UpdateItemInput {
                    category_id: Some(polo.id),
                    ..UpdateItemInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.item.item.sku.as_deref(), Some("POL-BS-BLK-M"));
        assert_eq!(edited.item.item.name, "Промо футболка");
    }

    #[tokio::test]
    async fn test_threshold_edit_changes_stock_status() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 5).await.item.item.id;

        let edited = app
            .ledger()
            .update_item(
                app.operator,
                id,
                UpdateItemInput {
                    low_stock_threshold: Some(10),
                    critical_stock_threshold: Some(2),
                    ..UpdateItemInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.item.stock_status, StockStatus::Low);

        let err = app
            .ledger()
            .update_item(
                app.operator,
                id,
                UpdateItemInput {
                    critical_stock_threshold: Some(-1),
                    ..UpdateItemInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "critical_stock_threshold"));
        let item = app.ledger().get_item(id).await.unwrap().item;
        assert_eq!(item.critical_stock_threshold, 2);
    }

    #[tokio::test]
    async fn test_manual_sku_and_description_edits() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 1).await.item.item.id;

        let edited = app
            .ledger()
            .update_item(
                app.admin,
                id,
                UpdateItemInput {
                    name: Some("  Коробка малая ".into()),
                    sku: Some("box/s".into()),
                    description: Some("20x20x10".into()),
                    selling_price: Some(Decimal::new(4500, 2)),
                    ..UpdateItemInput::default()
                },
            )
            .await
            .unwrap()
            .item
            .item;
        assert_eq!(edited.name, "Коробка малая");
        assert_eq!(edited.sku.as_deref(), Some("BOXS"));
        assert_eq!(edited.description.as_deref(), Some("20x20x10"));
        assert_eq!(edited.selling_price, Some(Decimal::new(4500, 2)));

        let cleared = app
            .ledger()
            .update_item(
                app.admin,
                id,
                UpdateItemInput {
                    sku: Some(String::new()),
                    description: Some(" ".into()),
                    ..UpdateItemInput::default()
                },
            )
            .await
            .unwrap()
            .item
            .item;
        assert_eq!(cleared.sku, None);
        assert_eq!(cleared.description, None);
    }

    #[tokio::test]
    async fn test_noop_edit_writes_nothing() {
        let app = test_app().await;
        let item = app.packaging_item("Коробка", 1).await.item.item;

        let edited = app
            .ledger()
            .update_item(app.admin, item.id, UpdateItemInput::default())
            .await
            .unwrap();
        assert_eq!(edited.item.item.updated_at, item.updated_at);
        assert!(!app.audit.actions().contains(&"item.update".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_category_and_archived_items_are_refused() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 1).await.item.item.id;

        let err = app
            .ledger()
            .update_item(
                app.admin,
                id,
                UpdateItemInput {
                    category_id: Some(uuid::Uuid::new_v4()),
                    ..UpdateItemInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        LifecycleService::new(&app.state)
            .archive(app.admin, ArchiveInput { ids: vec![id], reason: "сезон".into() })
            .await
            .unwrap();
        let err = app
            .ledger()
            .update_item(
                app.admin,
                id,
                UpdateItemInput {
                    name: Some("Коробка 2".into()),
                    ..UpdateItemInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
    }

    #[tokio::test]
    async fn test_move_recomposes_every_item() {
        let app = test_app().await;
        let tees = app.category("Футболка", Some("TSH")).await;
        let polo = app.category("Поло", Some("POL")).await;
        let first = app.clothing_item(&tees, TEE, 1).await.item.item.id;
        let second = app
            .clothing_item(&tees, &[("quality", "PRM"), ("color", "BLK"), ("size", "L")], 1)
            .await
            .item
            .item
            .id;
        let boxes = app.packaging_item("Коробка", 1).await.item.item.id;

        let result = app
            .ledger()
            .move_to_category(
                app.manager,
                MoveItemsInput {
                    ids: vec![first, second, boxes, first],
                    category_id: Some(polo.id),
                },
            )
            .await
            .unwrap();
        assert_eq!(result.affected, 3);

        let first = app.ledger().get_item(first).await.unwrap().item;
        assert_eq!(first.sku.as_deref(), Some("POL-BS-BLK-M"));
        assert_eq!(first.name, "Поло Base Черный M");
        let second = app.ledger().get_item(second).await.unwrap().item;
        assert_eq!(second.sku.as_deref(), Some("POL-PRM-BLK-L"));
        let boxes = app.ledger().get_item(boxes).await.unwrap().item;
        assert_eq!(boxes.category_id, Some(polo.id));
        assert_eq!(boxes.sku, None);

        let moves = app.audit.actions().iter().filter(|a| *a == "item.move").count();
        assert_eq!(moves, 3);
    }

    #[tokio::test]
    async fn test_move_is_all_or_none() {
        let app = test_app().await;
        let polo = app.category("Поло", Some("POL")).await;
        let kept = app.packaging_item("Коробка", 1).await.item.item.id;
        let archived = app.packaging_item("Пакет", 0).await.item.item.id;
        LifecycleService::new(&app.state)
            .archive(app.admin, ArchiveInput { ids: vec![archived], reason: "снят".into() })
            .await
            .unwrap();

        let err = app
            .ledger()
            .move_to_category(
                app.manager,
                MoveItemsInput {
                    ids: vec![kept, archived],
                    category_id: Some(polo.id),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
        let kept = app.ledger().get_item(kept).await.unwrap().item;
        assert_eq!(kept.category_id, None);
    }
}

// ============================================================================
// Movements
// ============================================================================

mod movements {
    use super::*;

    #[tokio::test]
    async fn test_in_and_out_update_quantity_and_ledger() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 10).await.item.item.id;

        assert_eq!(adjust(&app, id, 5, "in").await.unwrap(), 15);
        assert_eq!(adjust(&app, id, -12, "out").await.unwrap(), 3);

        let history = app.ledger().list_transactions(id).await.unwrap();
        let amounts: Vec<i32> = history.iter().map(|t| t.change_amount).collect();
        // newest first
        assert_eq!(amounts, vec![-12, 5, 10]);
    }

    #[tokio::test]
    async fn test_ten_minus_three_plus_five() {
        let app = test_app().await;
        let id = app.packaging_item("Пакет", 10).await.item.item.id;

        adjust(&app, id, -3, "out").await.unwrap();
        assert_eq!(adjust(&app, id, 5, "in").await.unwrap(), 12);

        let report = app.ledger().reconcile(id).await.unwrap();
        assert_eq!(report.ledger_sum, 12);
        assert!(report.matches);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adjustments_lose_nothing() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 0).await.item.item.id;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let ledger = app.ledger();
                let actor = app.operator;
                tokio::spawn(async move { ledger.adjust_quantity(actor, id, movement(1, "in")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let item = app.ledger().get_item(id).await.unwrap().item;
        assert_eq!(item.quantity, 20);
        assert_eq!(app.ledger().list_transactions(id).await.unwrap().len(), 21);
        assert!(app.ledger().reconcile(id).await.unwrap().matches);
    }

    #[tokio::test]
    async fn test_sign_must_match_type() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 10).await.item.item.id;

        for (delta, kind) in [(-1, "in"), (1, "out"), (0, "adjustment")] {
            let err = adjust(&app, id, delta, kind).await.unwrap_err();
            assert!(
                matches!(err, AppError::Validation { ref field, .. } if field == "delta"),
                "{} {} should be rejected",
                kind,
                delta
            );
        }
        assert!(matches!(
            adjust(&app, id, 1, "transfer").await.unwrap_err(),
            AppError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn test_going_negative_is_refused_without_writing() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 3).await.item.item.id;

        let err = adjust(&app, id, -5, "out").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidQuantity { current: 3, delta: -5 }));

        let item = app.ledger().get_item(id).await.unwrap();
        assert_eq!(item.item.quantity, 3);
        assert_eq!(app.ledger().list_transactions(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_allow_negative_override() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 3).await.item.item.id;

        let moved = app
            .ledger()
            .adjust_quantity(
                app.admin,
                id,
                AdjustQuantityInput {
                    allow_negative: true,
                    ..movement(-5, "adjustment")
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.item.item.quantity, -2);
        assert!(app.ledger().reconcile(id).await.unwrap().matches);
    }

    #[tokio::test]
    async fn test_reason_and_cost_are_recorded() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 0).await.item.item.id;

        let moved = app
            .ledger()
            .adjust_quantity(
                app.operator,
                id,
                AdjustQuantityInput {
                    reason: Some("  Поставка №42 ".into()),
                    cost_price: Some(Decimal::new(1250, 2)),
                    ..movement(20, "in")
                },
            )
            .await
            .unwrap();
        let tx = moved.transaction.unwrap();
        assert_eq!(tx.reason.as_deref(), Some("Поставка №42"));
        assert_eq!(tx.cost_price, Some(Decimal::new(1250, 2)));
        assert_eq!(tx.created_by, Some(app.operator.id));
    }

    #[tokio::test]
    async fn test_archived_items_still_accept_movements() {
        use warehouse_engine::services::lifecycle::ArchiveInput;
        use warehouse_engine::services::LifecycleService;

        let app = test_app().await;
        let id = app.packaging_item("Коробка", 4).await.item.item.id;
        LifecycleService::new(&app.state)
            .archive(
                app.admin,
                ArchiveInput {
                    ids: vec![id],
                    reason: "сезон".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(adjust(&app, id, -4, "out").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_item_is_not_found() {
        let app = test_app().await;
        let err = adjust(&app, uuid::Uuid::new_v4(), 1, "in").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

// ============================================================================
// Set quantity
// ============================================================================

mod set_quantity {
    use super::*;

    #[tokio::test]
    async fn test_set_writes_one_adjustment_for_the_difference() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 10).await.item.item.id;

        let moved = app
            .ledger()
            .set_quantity(
                app.operator,
                id,
                SetQuantityInput {
                    quantity: 4,
                    reason: Some("инвентаризация".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.item.item.quantity, 4);
        let tx = moved.transaction.unwrap();
        assert_eq!(tx.change_amount, -6);
        assert_eq!(tx.kind, TransactionKind::Adjustment);
    }

    #[tokio::test]
    async fn test_set_to_current_writes_nothing() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 10).await.item.item.id;

        let moved = app
            .ledger()
            .set_quantity(app.operator, id, SetQuantityInput { quantity: 10, reason: None })
            .await
            .unwrap();
        assert!(moved.transaction.is_none());
        assert_eq!(app.ledger().list_transactions(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_target_is_rejected() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 10).await.item.item.id;

        let err = app
            .ledger()
            .set_quantity(app.operator, id, SetQuantityInput { quantity: -1, reason: None })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}

// ============================================================================
// Atomicity and reconciliation
// ============================================================================

mod atomicity {
    use super::*;

    #[tokio::test]
    async fn test_failed_ledger_append_leaves_no_item() {
        let app = test_app().await;
        app.store.fail_ledger_writes(true);

        let err = app
            .ledger()
            .create_item(
                app.admin,
                CreateItemInput {
                    name: "Коробка".into(),
                    item_kind: ItemKind::Packaging,
                    quantity: 7,
                    ..CreateItemInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
        assert_eq!(app.store.item_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_ledger_append_keeps_quantity() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 7).await.item.item.id;

        app.store.fail_ledger_writes(true);
        assert!(adjust(&app, id, 3, "in").await.is_err());
        app.store.fail_ledger_writes(false);

        assert_eq!(app.ledger().get_item(id).await.unwrap().item.quantity, 7);
        assert!(app.ledger().reconcile(id).await.unwrap().matches);
    }

    #[tokio::test]
    async fn test_reconcile_reports_drift_without_repairing() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 7).await.item.item.id;
        app.packaging_item("Пакет", 2).await;

        app.store.force_quantity(id, 9).await.unwrap();

        let report = app.ledger().reconcile(id).await.unwrap();
        assert!(!report.matches);
        assert_eq!(report.cached_quantity, 9);
        assert_eq!(report.ledger_sum, 7);

        let summary = app.ledger().reconcile_all().await.unwrap();
        assert_eq!(summary.items, 2);
        assert_eq!(summary.drifted, 1);

        // still drifted: reconciliation never writes
        assert_eq!(app.ledger().get_item(id).await.unwrap().item.quantity, 9);
    }

    #[tokio::test]
    async fn test_csv_export_lists_every_row() {
        let app = test_app().await;
        let id = app.packaging_item("Коробка", 7).await.item.item.id;
        adjust(&app, id, -2, "out").await.unwrap();

        let csv = app.ledger().export_transactions_csv(id).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,item_id,created_at,type,change_amount"));
        assert!(lines[1].contains(",out,-2,"));
        assert!(lines[2].contains(",in,7,"));
    }
}

// ============================================================================
// Listing
// ============================================================================

mod listing {
    use super::*;

    #[tokio::test]
    async fn test_filter_by_status_and_search() {
        let app = test_app().await;
        app.packaging_item("Коробка большая", 50).await;
        app.packaging_item("Коробка малая", 5).await;
        app.packaging_item("Скотч", 5).await;

        let low = app
            .ledger()
            .list_items(&ItemFilter {
                status: Some(StockStatus::Low),
                ..ItemFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(low.pagination.total_items, 2);

        let boxes = app
            .ledger()
            .list_items(&ItemFilter {
                search: Some("коробка".into()),
                ..ItemFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(boxes.data.len(), 2);
    }

    #[tokio::test]
    async fn test_pagination() {
        let app = test_app().await;
        for i in 0..5 {
            app.packaging_item(&format!("Коробка {}", i), 1).await;
        }
        let page = app
            .ledger()
            .list_items(&ItemFilter {
                pagination: shared::Pagination { page: 2, per_page: 2 },
                ..ItemFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.pagination.total_items, 5);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod property_tests {
    use super::*;

    fn step_strategy() -> impl Strategy<Value = (i32, &'static str)> {
        prop_oneof![
            (1..50i32).prop_map(|d| (d, "in")),
            (-50..0i32).prop_map(|d| (d, "out")),
            (-50..50i32)
                .prop_filter("non-zero", |d| *d != 0)
                .prop_map(|d| (d, "adjustment")),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Whatever sequence of movements is attempted, the cached
        /// quantity equals the ledger sum and never goes below zero
        #[test]
        fn prop_quantity_always_matches_ledger(
            opening in 0..100i32,
            steps in prop::collection::vec(step_strategy(), 1..20),
        ) {
            tokio_test::block_on(async {
                let app = test_app().await;
                let id = app.packaging_item("Коробка", opening).await.item.item.id;
                let mut expected = opening;
                for (delta, kind) in steps {
                    match adjust(&app, id, delta, kind).await {
                        Ok(q) => {
                            expected += delta;
                            prop_assert_eq!(q, expected);
                        }
                        Err(AppError::InvalidQuantity { current, .. }) => {
                            prop_assert_eq!(current, expected);
                            prop_assert!(expected + delta < 0);
                        }
                        Err(e) => prop_assert!(false, "unexpected error {:?}", e),
                    }
                }
                let report = app.ledger().reconcile(id).await.unwrap();
                prop_assert!(report.matches);
                prop_assert!(expected >= 0);
                Ok(())
            })?;
        }
    }
}
