//! Shared fixtures for the backend integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use shared::{AttributeSnapshot, Category, Role, UserRecord};
use uuid::Uuid;
use warehouse_engine::audit::MemoryAuditSink;
use warehouse_engine::services::auth::BcryptVerifier;
use warehouse_engine::services::ledger::{CreateItemInput, CreatedItem};
use warehouse_engine::services::taxonomy::CreateCategoryInput;
use warehouse_engine::services::{Actor, StockLedgerService, TaxonomyService};
use warehouse_engine::store::MemoryWarehouseStore;
use warehouse_engine::{AppState, Config};

pub const ADMIN_EMAIL: &str = "admin@warehouse.test";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const OPERATOR_EMAIL: &str = "operator@warehouse.test";
pub const OPERATOR_PASSWORD: &str = "operator-password";

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryWarehouseStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub admin: Actor,
    pub manager: Actor,
    pub operator: Actor,
}

impl TestApp {
    pub fn ledger(&self) -> StockLedgerService {
        StockLedgerService::new(&self.state)
    }

    pub fn taxonomy(&self) -> TaxonomyService {
        TaxonomyService::new(&self.state)
    }

    pub async fn category(&self, name: &str, prefix: Option<&str>) -> Category {
        self.taxonomy()
            .create_category(
                self.admin,
                CreateCategoryInput {
                    name: name.to_string(),
                    prefix: prefix.map(str::to_string),
                    parent_id: None,
                    sort_order: 0,
                },
            )
            .await
            .expect("category")
    }

    /// Non-composed item with a manual SKU
    pub async fn packaging_item(&self, name: &str, quantity: i32) -> CreatedItem {
        self.ledger()
            .create_item(
                self.admin,
                CreateItemInput {
                    name: name.to_string(),
                    item_kind: shared::ItemKind::Packaging,
                    quantity,
                    ..CreateItemInput::default()
                },
            )
            .await
            .expect("item")
    }

    /// Clothing item composed from `attributes` under `category`
    pub async fn clothing_item(
        &self,
        category: &Category,
        attributes: &[(&str, &str)],
        quantity: i32,
    ) -> CreatedItem {
        self.ledger()
            .create_item(
                self.admin,
                CreateItemInput {
                    category_id: Some(category.id),
                    quantity,
                    attributes: snapshot(attributes),
                    ..CreateItemInput::default()
                },
            )
            .await
            .expect("clothing item")
    }
}

pub fn snapshot(pairs: &[(&str, &str)]) -> AttributeSnapshot {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>()
}

fn user(email: &str, password: &str, role: Role) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: role.as_str().to_string(),
        password_hash: bcrypt::hash(password, 4).expect("hash"),
        role,
        is_active: true,
    }
}

/// App over an in-memory store seeded with the built-in attribute types,
/// an admin, a manager and an operator
pub async fn test_app() -> TestApp {
    test_app_with(Config::default()).await
}

pub async fn test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryWarehouseStore::with_system_types());
    let audit = Arc::new(MemoryAuditSink::new());

    let admin = user(ADMIN_EMAIL, ADMIN_PASSWORD, Role::Admin);
    let manager = user("manager@warehouse.test", "manager-password", Role::Manager);
    let operator = user(OPERATOR_EMAIL, OPERATOR_PASSWORD, Role::Operator);
    let actors = (
        Actor::new(admin.id, admin.role),
        Actor::new(manager.id, manager.role),
        Actor::new(operator.id, operator.role),
    );
    store.add_user(admin).await;
    store.add_user(manager).await;
    store.add_user(operator).await;

    let state = AppState::new(store.clone(), audit.clone(), Arc::new(BcryptVerifier), config);
    TestApp {
        state,
        store,
        audit,
        admin: actors.0,
        manager: actors.1,
        operator: actors.2,
    }
}
