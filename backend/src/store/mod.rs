//! Storage for the warehouse
//!
//! [`WarehouseStore`] is the transactional boundary of the engine: every
//! method that touches `quantity` writes the item and its ledger row in a
//! single unit of work, and privileged deletes verify the credential in the
//! same unit of work that removes the rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::ledger::ReconcileReport;
use shared::{
    AttributeType, AttributeTypeChanges, AttributeValue, AttributeValueChanges, Category,
    CategoryChanges, InventoryItem, ItemKind, ItemRename, ItemState, ItemUpdate, NewAttributeType,
    NewAttributeValue, NewCategory, NewItem, Pagination, SeedOverride, StockChange, StockStatus,
    StockTransaction, UserRecord,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::auth::CredentialVerifier;

mod memory;
mod postgres;

pub use memory::MemoryWarehouseStore;
pub use postgres::PgWarehouseStore;

/// A row before and after an update
#[derive(Debug, Clone, Serialize)]
pub struct Updated<T> {
    pub before: T,
    pub after: T,
}

/// Result of updating a persisted attribute value
#[derive(Debug, Clone, Serialize)]
pub struct ValueUpdate {
    pub before: AttributeValue,
    pub after: AttributeValue,
    /// Items whose attribute snapshot was rewritten to the new code
    pub items_rewritten: u64,
}

/// A deleted category and how many items it left uncategorized
#[derive(Debug, Clone, Serialize)]
pub struct CategoryRemoval {
    pub category: Category,
    pub items_detached: u64,
}

/// Item written by a stock change, with the ledger row it produced.
/// `transaction` is `None` only for a set-to that changed nothing.
#[derive(Debug, Clone, Serialize)]
pub struct StockMovement {
    pub item: InventoryItem,
    pub transaction: Option<StockTransaction>,
}

/// Credential proof for a privileged action
#[derive(Clone, Copy)]
pub struct Reauth<'a> {
    pub actor_id: Uuid,
    pub password: &'a str,
    pub verifier: &'a dyn CredentialVerifier,
}

impl std::fmt::Debug for Reauth<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reauth")
            .field("actor_id", &self.actor_id)
            .finish_non_exhaustive()
    }
}

/// Item listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFilter {
    /// Defaults to active items
    pub state: Option<ItemState>,
    pub category_id: Option<Uuid>,
    /// Only items without a category
    #[serde(default)]
    pub uncategorized: bool,
    pub item_kind: Option<ItemKind>,
    pub status: Option<StockStatus>,
    /// Case-insensitive match on name or SKU
    pub search: Option<String>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl ItemFilter {
    pub fn state(&self) -> ItemState {
        self.state.unwrap_or(ItemState::Active)
    }

    pub fn matches(&self, item: &InventoryItem) -> bool {
        if item.state != self.state() {
            return false;
        }
        if self.uncategorized && item.category_id.is_some() {
            return false;
        }
        if let Some(category_id) = self.category_id {
            if item.category_id != Some(category_id) {
                return false;
            }
        }
        if let Some(kind) = self.item_kind {
            if item.item_kind != kind {
                return false;
            }
        }
        if let Some(status) = self.status {
            if item.stock_status() != status {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let in_name = item.name.to_lowercase().contains(&needle);
            let in_sku = item
                .sku
                .as_deref()
                .is_some_and(|sku| sku.to_lowercase().contains(&needle));
            if !in_name && !in_sku {
                return false;
            }
        }
        true
    }
}

/// Only active items take edits
fn ensure_editable(item: &InventoryItem) -> AppResult<()> {
    if item.is_active() {
        Ok(())
    } else {
        Err(AppError::InvalidStateTransition(format!(
            "Item {} is {} and cannot be edited",
            item.id, item.state
        )))
    }
}

fn has_subcategories() -> AppError {
    AppError::conflict(
        "category",
        "Delete or move the subcategories first",
        "Сначала удалите или переместите подкатегории",
    )
}

fn owns_types() -> AppError {
    AppError::conflict(
        "category",
        "Delete the attribute types of this category first",
        "Сначала удалите типы атрибутов этой категории",
    )
}

#[async_trait]
pub trait WarehouseStore: Send + Sync {
    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    async fn list_categories(&self) -> AppResult<Vec<Category>>;

    async fn get_category(&self, id: Uuid) -> AppResult<Category>;

    /// Fails with `Conflict` when the name is taken
    async fn insert_category(&self, category: NewCategory) -> AppResult<Category>;

    async fn update_category(&self, id: Uuid, changes: CategoryChanges) -> AppResult<Updated<Category>>;

    /// Deletes a category that has no subcategories and owns no attribute
    /// types; its items become uncategorized in the same transaction. A
    /// system category needs `reauth`.
    async fn delete_category(&self, id: Uuid, reauth: Option<Reauth<'_>>) -> AppResult<CategoryRemoval>;

    // ------------------------------------------------------------------
    // Attribute types
    // ------------------------------------------------------------------

    /// Types owned by `category_id`, or the uncategorized types for `None`
    async fn list_attribute_types(&self, category_id: Option<Uuid>) -> AppResult<Vec<AttributeType>>;

    async fn all_attribute_types(&self) -> AppResult<Vec<AttributeType>>;

    async fn get_attribute_type(&self, id: Uuid) -> AppResult<AttributeType>;

    async fn find_attribute_type(&self, slug: &str) -> AppResult<Option<AttributeType>>;

    /// Fails with `Conflict` when the slug is taken
    async fn insert_attribute_type(&self, attribute_type: NewAttributeType) -> AppResult<AttributeType>;

    async fn update_attribute_type(
        &self,
        id: Uuid,
        changes: AttributeTypeChanges,
    ) -> AppResult<Updated<AttributeType>>;

    /// Deletes a type that has no persisted values. A system type needs
    /// `reauth`, verified inside the deleting transaction.
    async fn delete_attribute_type(&self, id: Uuid, reauth: Option<Reauth<'_>>) -> AppResult<AttributeType>;

    // ------------------------------------------------------------------
    // Attribute values
    // ------------------------------------------------------------------

    async fn list_attribute_values(&self, type_slug: &str) -> AppResult<Vec<AttributeValue>>;

    async fn all_attribute_values(&self) -> AppResult<Vec<AttributeValue>>;

    async fn get_attribute_value(&self, id: Uuid) -> AppResult<AttributeValue>;

    async fn insert_attribute_value(&self, value: NewAttributeValue) -> AppResult<AttributeValue>;

    /// Updates a value; a code change rewrites item snapshots that
    /// reference the old code in the same transaction
    async fn update_attribute_value(&self, id: Uuid, changes: AttributeValueChanges) -> AppResult<ValueUpdate>;

    /// Deletes a value. Values of a system type need `reauth`.
    async fn delete_attribute_value(&self, id: Uuid, reauth: Option<Reauth<'_>>) -> AppResult<AttributeValue>;

    async fn list_seed_overrides(&self) -> AppResult<Vec<SeedOverride>>;

    async fn upsert_seed_override(&self, seed_override: SeedOverride) -> AppResult<SeedOverride>;

    // ------------------------------------------------------------------
    // Items and ledger
    // ------------------------------------------------------------------

    /// Page of matching items, newest first, and the total match count
    async fn list_items(&self, filter: &ItemFilter) -> AppResult<(Vec<InventoryItem>, u64)>;

    async fn get_item(&self, id: Uuid) -> AppResult<InventoryItem>;

    async fn find_items_by_sku(&self, sku: &str) -> AppResult<Vec<InventoryItem>>;

    /// Inserts the item and its opening ledger row atomically
    async fn create_item(&self, item: NewItem) -> AppResult<(InventoryItem, StockTransaction)>;

    /// Writes edits to active items, all or none. Quantity is untouched.
    async fn update_items(&self, updates: &[(Uuid, ItemUpdate)]) -> AppResult<Vec<Updated<InventoryItem>>>;

    /// Locks the item, applies the change and appends the ledger row
    async fn apply_stock_change(&self, item_id: Uuid, change: &StockChange) -> AppResult<StockMovement>;

    /// Cached quantity against the ledger sum, read in one statement
    async fn reconcile(&self, item_id: Uuid) -> AppResult<ReconcileReport>;

    /// Reconciliation for every stored item
    async fn reconcile_all(&self) -> AppResult<Vec<ReconcileReport>>;

    /// Ledger rows for an item id, newest first. Works for deleted items.
    async fn list_transactions(&self, item_id: Uuid) -> AppResult<Vec<StockTransaction>>;

    // ------------------------------------------------------------------
    // SKU regeneration
    // ------------------------------------------------------------------

    /// Active composable items with id greater than `after`, ordered by id
    async fn list_composable_items_after(&self, after: Option<Uuid>, limit: u32) -> AppResult<Vec<InventoryItem>>;

    /// Applies renames in one transaction; each is skipped if the item no
    /// longer carries the expected SKU and name. Returns the applied count.
    async fn apply_renames(&self, renames: &[ItemRename]) -> AppResult<u64>;

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Archives all items or none
    async fn archive_items(&self, ids: &[Uuid], reason: &str, actor_id: Uuid) -> AppResult<Vec<Updated<InventoryItem>>>;

    /// Restores all items or none
    async fn restore_items(&self, ids: &[Uuid]) -> AppResult<Vec<Updated<InventoryItem>>>;

    /// Verifies the credential, then deletes all items or none. Ledger
    /// rows are kept.
    async fn delete_items(&self, ids: &[Uuid], reauth: Reauth<'_>) -> AppResult<Vec<InventoryItem>>;

    /// Archives active zero-quantity items last updated before `cutoff`
    async fn archive_stale_items(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
        actor_id: Uuid,
    ) -> AppResult<Vec<InventoryItem>>;

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>>;

    /// Cheap round trip used by the health check
    async fn ping(&self) -> AppResult<()>;
}
