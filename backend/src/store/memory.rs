//! In-memory warehouse store
//!
//! All writes run behind one async mutex on a staged copy of the state; the
//! copy replaces the live state only if the whole unit of work succeeds, so
//! a failed write leaves nothing behind.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::ledger::{apply_delta, resolve_delta, ReconcileReport};
use shared::lifecycle::{transition, LifecycleAction};
use shared::taxonomy::BUILTIN_SLUGS;
use shared::{
    AttributeType, AttributeTypeChanges, AttributeValue, AttributeValueChanges, Category,
    CategoryChanges, InventoryItem, ItemRename, ItemState, ItemUpdate, NewAttributeType, NewAttributeValue,
    NewCategory, NewItem, SeedOverride, StockChange, StockTransaction, TransactionKind,
    UserRecord, OPENING_REASON,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ensure_editable, has_subcategories, owns_types, CategoryRemoval, ItemFilter, Reauth,
    StockMovement, Updated, ValueUpdate, WarehouseStore,
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    categories: Vec<Category>,
    types: Vec<AttributeType>,
    values: Vec<AttributeValue>,
    overrides: Vec<SeedOverride>,
    items: Vec<InventoryItem>,
    transactions: Vec<StockTransaction>,
    users: Vec<UserRecord>,
}

impl MemoryState {
    fn item_mut(&mut self, id: Uuid) -> AppResult<&mut InventoryItem> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::NotFound("Item".to_string()))
    }

    fn verify(&self, reauth: &Reauth<'_>) -> AppResult<()> {
        let user = self
            .users
            .iter()
            .find(|u| u.id == reauth.actor_id && u.is_active)
            .ok_or(AppError::AuthenticationFailed)?;
        if reauth.verifier.verify(reauth.password, &user.password_hash)? {
            Ok(())
        } else {
            Err(AppError::AuthenticationFailed)
        }
    }

    fn type_is_system(&self, slug: &str) -> bool {
        self.types.iter().any(|t| t.slug == slug && t.is_system)
    }
}

#[derive(Debug, Default)]
pub struct MemoryWarehouseStore {
    state: Mutex<MemoryState>,
    fail_ledger_writes: AtomicBool,
}

impl MemoryWarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding the built-in system attribute types, as after the
    /// initial migration
    pub fn with_system_types() -> Self {
        let now = Utc::now();
        let types = BUILTIN_SLUGS
            .iter()
            .enumerate()
            .map(|(i, slug)| AttributeType {
                id: Uuid::new_v4(),
                slug: slug.to_string(),
                name: slug.to_string(),
                category_id: None,
                is_system: true,
                show_in_sku: true,
                show_in_name: true,
                sort_order: i as i32,
                created_at: now,
                updated_at: now,
            })
            .collect();
        Self {
            state: Mutex::new(MemoryState {
                types,
                ..MemoryState::default()
            }),
            fail_ledger_writes: AtomicBool::new(false),
        }
    }

    pub async fn add_user(&self, user: UserRecord) {
        self.state.lock().await.users.push(user);
    }

    /// Make every following ledger append fail
    pub fn fail_ledger_writes(&self, fail: bool) {
        self.fail_ledger_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite the cached quantity without a ledger row
    pub async fn force_quantity(&self, item_id: Uuid, quantity: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.item_mut(item_id)?.quantity = quantity;
        Ok(())
    }

    /// Pretend the item was last touched at `when`
    pub async fn backdate_item(&self, item_id: Uuid, when: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.item_mut(item_id)?.updated_at = when;
        Ok(())
    }

    pub async fn item_count(&self) -> usize {
        self.state.lock().await.items.len()
    }

    async fn read<T>(&self, f: impl FnOnce(&MemoryState) -> AppResult<T>) -> AppResult<T> {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Run `f` on a staged copy and commit it only on success
    async fn write<T>(&self, f: impl FnOnce(&mut MemoryState) -> AppResult<T>) -> AppResult<T> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        let result = f(&mut staged)?;
        *state = staged;
        Ok(result)
    }

    fn append_ledger(&self, state: &mut MemoryState, tx: StockTransaction) -> AppResult<StockTransaction> {
        if self.fail_ledger_writes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sqlx::Error::Protocol(
                "ledger append failed".to_string(),
            )));
        }
        state.transactions.push(tx.clone());
        Ok(tx)
    }
}

fn reconcile_item(state: &MemoryState, item: &InventoryItem) -> ReconcileReport {
    let rows: Vec<&StockTransaction> = state
        .transactions
        .iter()
        .filter(|t| t.item_id == item.id)
        .collect();
    let sum = rows.iter().map(|t| i64::from(t.change_amount)).sum();
    ReconcileReport::new(item.id, i64::from(item.quantity), sum, rows.len() as i64)
}

fn slug_conflict(slug: &str) -> AppError {
    AppError::conflict(
        "slug",
        format!("Attribute type '{}' already exists", slug),
        format!("Тип атрибута '{}' уже существует", slug),
    )
}

#[async_trait]
impl WarehouseStore for MemoryWarehouseStore {
    async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.read(|s| {
            let mut categories = s.categories.clone();
            categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
            Ok(categories)
        })
        .await
    }

    async fn get_category(&self, id: Uuid) -> AppResult<Category> {
        self.read(|s| {
            s.categories
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Category".to_string()))
        })
        .await
    }

    async fn insert_category(&self, category: NewCategory) -> AppResult<Category> {
        self.write(|s| {
            if s.categories.iter().any(|c| c.name == category.name) {
                return Err(AppError::conflict(
                    "name",
                    format!("Category '{}' already exists", category.name),
                    format!("Категория '{}' уже существует", category.name),
                ));
            }
            let now = Utc::now();
            let created = Category {
                id: Uuid::new_v4(),
                name: category.name,
                prefix: category.prefix,
                parent_id: category.parent_id,
                is_system: category.is_system,
                sort_order: category.sort_order,
                created_at: now,
                updated_at: now,
            };
            s.categories.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn update_category(&self, id: Uuid, changes: CategoryChanges) -> AppResult<Updated<Category>> {
        self.write(|s| {
            if let Some(name) = &changes.name {
                if s.categories.iter().any(|c| c.id != id && &c.name == name) {
                    return Err(AppError::conflict(
                        "name",
                        format!("Category '{}' already exists", name),
                        format!("Категория '{}' уже существует", name),
                    ));
                }
            }
            let category = s
                .categories
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| AppError::NotFound("Category".to_string()))?;
            let before = category.clone();
            changes.apply(category);
            category.updated_at = Utc::now();
            Ok(Updated {
                before,
                after: category.clone(),
            })
        })
        .await
    }

    async fn delete_category(&self, id: Uuid, reauth: Option<Reauth<'_>>) -> AppResult<CategoryRemoval> {
        self.write(|s| {
            let category = s
                .categories
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Category".to_string()))?;
            if category.is_system {
                let reauth = reauth.ok_or(AppError::ReauthenticationRequired)?;
                s.verify(&reauth)?;
            }
            if s.categories.iter().any(|c| c.parent_id == Some(id)) {
                return Err(has_subcategories());
            }
            if s.types.iter().any(|t| t.category_id == Some(id)) {
                return Err(owns_types());
            }

            let now = Utc::now();
            let mut items_detached = 0;
            for item in s.items.iter_mut().filter(|i| i.category_id == Some(id)) {
                item.category_id = None;
                item.updated_at = now;
                items_detached += 1;
            }
            s.categories.retain(|c| c.id != id);
            Ok(CategoryRemoval {
                category,
                items_detached,
            })
        })
        .await
    }

    async fn list_attribute_types(&self, category_id: Option<Uuid>) -> AppResult<Vec<AttributeType>> {
        self.read(|s| {
            let mut types: Vec<_> = s
                .types
                .iter()
                .filter(|t| t.category_id == category_id)
                .cloned()
                .collect();
            types.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.created_at.cmp(&b.created_at)));
            Ok(types)
        })
        .await
    }

    async fn all_attribute_types(&self) -> AppResult<Vec<AttributeType>> {
        self.read(|s| {
            let mut types = s.types.clone();
            types.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.created_at.cmp(&b.created_at)));
            Ok(types)
        })
        .await
    }

    async fn get_attribute_type(&self, id: Uuid) -> AppResult<AttributeType> {
        self.read(|s| {
            s.types
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Attribute type".to_string()))
        })
        .await
    }

    async fn find_attribute_type(&self, slug: &str) -> AppResult<Option<AttributeType>> {
        self.read(|s| Ok(s.types.iter().find(|t| t.slug == slug).cloned()))
            .await
    }

    async fn insert_attribute_type(&self, attribute_type: NewAttributeType) -> AppResult<AttributeType> {
        self.write(|s| {
            if s.types.iter().any(|t| t.slug == attribute_type.slug) {
                return Err(slug_conflict(&attribute_type.slug));
            }
            let now = Utc::now();
            let created = AttributeType {
                id: Uuid::new_v4(),
                slug: attribute_type.slug,
                name: attribute_type.name,
                category_id: attribute_type.category_id,
                is_system: attribute_type.is_system,
                show_in_sku: attribute_type.show_in_sku,
                show_in_name: attribute_type.show_in_name,
                sort_order: attribute_type.sort_order,
                created_at: now,
                updated_at: now,
            };
            s.types.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn update_attribute_type(
        &self,
        id: Uuid,
        changes: AttributeTypeChanges,
    ) -> AppResult<Updated<AttributeType>> {
        self.write(|s| {
            let t = s
                .types
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| AppError::NotFound("Attribute type".to_string()))?;
            let before = t.clone();
            changes.apply(t);
            t.updated_at = Utc::now();
            Ok(Updated {
                before,
                after: t.clone(),
            })
        })
        .await
    }

    async fn delete_attribute_type(&self, id: Uuid, reauth: Option<Reauth<'_>>) -> AppResult<AttributeType> {
        self.write(|s| {
            let t = s
                .types
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Attribute type".to_string()))?;
            if t.is_system {
                let reauth = reauth.ok_or(AppError::ReauthenticationRequired)?;
                s.verify(&reauth)?;
            }
            if s.values.iter().any(|v| v.type_slug == t.slug) {
                return Err(AppError::conflict(
                    "attribute_type",
                    "Delete the values of this type first",
                    "Сначала удалите значения этого типа",
                ));
            }
            s.types.retain(|x| x.id != id);
            Ok(t)
        })
        .await
    }

    async fn list_attribute_values(&self, type_slug: &str) -> AppResult<Vec<AttributeValue>> {
        self.read(|s| {
            Ok(s.values
                .iter()
                .filter(|v| v.type_slug == type_slug)
                .cloned()
                .collect())
        })
        .await
    }

    async fn all_attribute_values(&self) -> AppResult<Vec<AttributeValue>> {
        self.read(|s| Ok(s.values.clone())).await
    }

    async fn get_attribute_value(&self, id: Uuid) -> AppResult<AttributeValue> {
        self.read(|s| {
            s.values
                .iter()
                .find(|v| v.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Attribute value".to_string()))
        })
        .await
    }

    async fn insert_attribute_value(&self, value: NewAttributeValue) -> AppResult<AttributeValue> {
        self.write(|s| {
            if !s.types.iter().any(|t| t.slug == value.type_slug) {
                return Err(AppError::NotFound("Attribute type".to_string()));
            }
            let now = Utc::now();
            let created = AttributeValue {
                id: Uuid::new_v4(),
                type_slug: value.type_slug,
                name: value.name,
                code: value.code,
                meta: value.meta,
                created_at: now,
                updated_at: now,
            };
            s.values.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn update_attribute_value(&self, id: Uuid, changes: AttributeValueChanges) -> AppResult<ValueUpdate> {
        self.write(|s| {
            let value = s
                .values
                .iter_mut()
                .find(|v| v.id == id)
                .ok_or_else(|| AppError::NotFound("Attribute value".to_string()))?;
            let before = value.clone();
            changes.apply(value);
            value.updated_at = Utc::now();
            let after = value.clone();

            let mut items_rewritten = 0;
            if before.code != after.code {
                let now = Utc::now();
                for item in s.items.iter_mut() {
                    if let Some(code) = item.attributes.get_mut(&after.type_slug) {
                        if *code == before.code {
                            *code = after.code.clone();
                            item.updated_at = now;
                            items_rewritten += 1;
                        }
                    }
                }
            }
            Ok(ValueUpdate {
                before,
                after,
                items_rewritten,
            })
        })
        .await
    }

    async fn delete_attribute_value(&self, id: Uuid, reauth: Option<Reauth<'_>>) -> AppResult<AttributeValue> {
        self.write(|s| {
            let value = s
                .values
                .iter()
                .find(|v| v.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Attribute value".to_string()))?;
            if s.type_is_system(&value.type_slug) {
                let reauth = reauth.ok_or(AppError::ReauthenticationRequired)?;
                s.verify(&reauth)?;
            }
            s.values.retain(|v| v.id != id);
            Ok(value)
        })
        .await
    }

    async fn list_seed_overrides(&self) -> AppResult<Vec<SeedOverride>> {
        self.read(|s| Ok(s.overrides.clone())).await
    }

    async fn upsert_seed_override(&self, seed_override: SeedOverride) -> AppResult<SeedOverride> {
        self.write(|s| {
            s.overrides
                .retain(|o| !(o.type_slug == seed_override.type_slug && o.code == seed_override.code));
            s.overrides.push(seed_override.clone());
            Ok(seed_override)
        })
        .await
    }

    async fn list_items(&self, filter: &ItemFilter) -> AppResult<(Vec<InventoryItem>, u64)> {
        self.read(|s| {
            let matching: Vec<_> = s.items.iter().rev().filter(|i| filter.matches(i)).collect();
            let page = filter.pagination.normalized();
            let total = matching.len() as u64;
            let items = matching
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .cloned()
                .collect();
            Ok((items, total))
        })
        .await
    }

    async fn get_item(&self, id: Uuid) -> AppResult<InventoryItem> {
        self.read(|s| {
            s.items
                .iter()
                .find(|i| i.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Item".to_string()))
        })
        .await
    }

    async fn find_items_by_sku(&self, sku: &str) -> AppResult<Vec<InventoryItem>> {
        self.read(|s| {
            Ok(s.items
                .iter()
                .filter(|i| i.sku.as_deref() == Some(sku))
                .cloned()
                .collect())
        })
        .await
    }

    async fn create_item(&self, item: NewItem) -> AppResult<(InventoryItem, StockTransaction)> {
        self.write(|s| {
            let now = Utc::now();
            let created = InventoryItem {
                id: Uuid::new_v4(),
                name: item.name,
                sku: item.sku,
                item_kind: item.item_kind,
                category_id: item.category_id,
                quantity: item.quantity,
                unit: item.unit,
                attributes: item.attributes,
                low_stock_threshold: item.low_stock_threshold,
                critical_stock_threshold: item.critical_stock_threshold,
                description: item.description,
                cost_price: item.cost_price,
                selling_price: item.selling_price,
                state: ItemState::Active,
                archived_at: None,
                archived_by: None,
                archive_reason: None,
                created_by: Some(item.created_by),
                created_at: now,
                updated_at: now,
            };
            s.items.push(created.clone());
            let opening = StockTransaction {
                id: Uuid::new_v4(),
                item_id: created.id,
                change_amount: created.quantity,
                kind: TransactionKind::In,
                reason: Some(OPENING_REASON.to_string()),
                cost_price: created.cost_price,
                created_by: Some(item.created_by),
                created_at: now,
            };
            let opening = self.append_ledger(s, opening)?;
            Ok((created, opening))
        })
        .await
    }

    async fn update_items(&self, updates: &[(Uuid, ItemUpdate)]) -> AppResult<Vec<Updated<InventoryItem>>> {
        self.write(|s| {
            let now = Utc::now();
            let mut written = Vec::with_capacity(updates.len());
            for (id, update) in updates {
                if let Some(category_id) = update.category_id {
                    if !s.categories.iter().any(|c| c.id == category_id) {
                        return Err(AppError::NotFound("Category".to_string()));
                    }
                }
                let item = s.item_mut(*id)?;
                ensure_editable(item)?;
                let before = item.clone();
                update.clone().apply(item);
                item.updated_at = now;
                written.push(Updated {
                    before,
                    after: item.clone(),
                });
            }
            Ok(written)
        })
        .await
    }

    async fn apply_stock_change(&self, item_id: Uuid, change: &StockChange) -> AppResult<StockMovement> {
        self.write(|s| {
            let item = s.item_mut(item_id)?;
            let delta = resolve_delta(item.quantity, change.change)?;
            if delta == 0 {
                return Ok(StockMovement {
                    item: item.clone(),
                    transaction: None,
                });
            }
            item.quantity = apply_delta(item.quantity, delta, change.allow_negative)?;
            item.updated_at = Utc::now();
            let item = item.clone();
            let tx = StockTransaction {
                id: Uuid::new_v4(),
                item_id,
                change_amount: delta,
                kind: change.kind,
                reason: change.reason.clone(),
                cost_price: change.cost_price,
                created_by: Some(change.actor_id),
                created_at: Utc::now(),
            };
            let tx = self.append_ledger(s, tx)?;
            Ok(StockMovement {
                item,
                transaction: Some(tx),
            })
        })
        .await
    }

    async fn reconcile(&self, item_id: Uuid) -> AppResult<ReconcileReport> {
        self.read(|s| {
            let item = s
                .items
                .iter()
                .find(|i| i.id == item_id)
                .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
            Ok(reconcile_item(s, item))
        })
        .await
    }

    async fn reconcile_all(&self) -> AppResult<Vec<ReconcileReport>> {
        self.read(|s| Ok(s.items.iter().map(|i| reconcile_item(s, i)).collect()))
            .await
    }

    async fn list_transactions(&self, item_id: Uuid) -> AppResult<Vec<StockTransaction>> {
        self.read(|s| {
            Ok(s.transactions
                .iter()
                .rev()
                .filter(|t| t.item_id == item_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn list_composable_items_after(&self, after: Option<Uuid>, limit: u32) -> AppResult<Vec<InventoryItem>> {
        self.read(|s| {
            let mut items: Vec<_> = s
                .items
                .iter()
                .filter(|i| i.is_active() && i.item_kind.supports_composition())
                .filter(|i| after.map_or(true, |a| i.id > a))
                .cloned()
                .collect();
            items.sort_by_key(|i| i.id);
            items.truncate(limit as usize);
            Ok(items)
        })
        .await
    }

    async fn apply_renames(&self, renames: &[ItemRename]) -> AppResult<u64> {
        self.write(|s| {
            let mut applied = 0;
            let now = Utc::now();
            for rename in renames {
                let Some(item) = s.items.iter_mut().find(|i| i.id == rename.item_id) else {
                    continue;
                };
                if !item.is_active()
                    || item.sku != rename.expected_sku
                    || item.name != rename.expected_name
                {
                    continue;
                }
                item.sku = rename.sku.clone();
                item.name = rename.name.clone();
                item.updated_at = now;
                applied += 1;
            }
            Ok(applied)
        })
        .await
    }

    async fn archive_items(&self, ids: &[Uuid], reason: &str, actor_id: Uuid) -> AppResult<Vec<Updated<InventoryItem>>> {
        self.write(|s| {
            let now = Utc::now();
            let mut updated = Vec::with_capacity(ids.len());
            for id in ids {
                let item = s.item_mut(*id)?;
                let before = item.clone();
                item.state = transition(item.state, LifecycleAction::Archive)?;
                item.archived_at = Some(now);
                item.archived_by = Some(actor_id);
                item.archive_reason = Some(reason.to_string());
                item.updated_at = now;
                updated.push(Updated {
                    before,
                    after: item.clone(),
                });
            }
            Ok(updated)
        })
        .await
    }

    async fn restore_items(&self, ids: &[Uuid]) -> AppResult<Vec<Updated<InventoryItem>>> {
        self.write(|s| {
            let now = Utc::now();
            let mut updated = Vec::with_capacity(ids.len());
            for id in ids {
                let item = s.item_mut(*id)?;
                let before = item.clone();
                item.state = transition(item.state, LifecycleAction::Restore)?;
                item.archived_at = None;
                item.archived_by = None;
                item.archive_reason = None;
                item.updated_at = now;
                updated.push(Updated {
                    before,
                    after: item.clone(),
                });
            }
            Ok(updated)
        })
        .await
    }

    async fn delete_items(&self, ids: &[Uuid], reauth: Reauth<'_>) -> AppResult<Vec<InventoryItem>> {
        self.write(|s| {
            s.verify(&reauth)?;
            let mut deleted = Vec::with_capacity(ids.len());
            for id in ids {
                let item = s.item_mut(*id)?;
                transition(item.state, LifecycleAction::Delete)?;
                deleted.push(item.clone());
            }
            s.items.retain(|i| !ids.contains(&i.id));
            Ok(deleted)
        })
        .await
    }

    async fn archive_stale_items(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
        actor_id: Uuid,
    ) -> AppResult<Vec<InventoryItem>> {
        self.write(|s| {
            let now = Utc::now();
            let mut archived = Vec::new();
            for item in s
                .items
                .iter_mut()
                .filter(|i| i.is_active() && i.quantity == 0 && i.updated_at < cutoff)
            {
                item.state = ItemState::Archived;
                item.archived_at = Some(now);
                item.archived_by = Some(actor_id);
                item.archive_reason = Some(reason.to_string());
                item.updated_at = now;
                archived.push(item.clone());
            }
            Ok(archived)
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        self.read(|s| {
            Ok(s.users
                .iter()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .cloned())
        })
        .await
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
