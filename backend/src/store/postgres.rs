//! PostgreSQL warehouse store
//!
//! Stock writes lock the item row with `SELECT ... FOR UPDATE` inside a
//! read-committed transaction. A transaction the database rolled back for a
//! serialization failure or deadlock is run again, up to
//! `max_conflict_retries` times. Idempotent reads are retried once on a
//! connection-level failure.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::ledger::{apply_delta, resolve_delta, ReconcileReport};
use shared::lifecycle::{transition, LifecycleAction};
use shared::{
    AttributeSnapshot, AttributeType, AttributeTypeChanges, AttributeValue, AttributeValueChanges,
    Category, CategoryChanges, InventoryItem, ItemKind, ItemRename, ItemState, ItemUpdate,
    NewAttributeType,
    NewAttributeValue, NewCategory, NewItem, Role, SeedOverride, StockChange, StockTransaction,
    TransactionKind, UserRecord, ValueMeta, OPENING_REASON,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    ensure_editable, has_subcategories, owns_types, CategoryRemoval, ItemFilter, Reauth,
    StockMovement, Updated, ValueUpdate, WarehouseStore,
};
use crate::error::{AppError, AppResult};

const ITEM_COLUMNS: &str = "id, name, sku, item_kind, category_id, quantity, unit, attributes, \
    low_stock_threshold, critical_stock_threshold, description, cost_price, selling_price, \
    state, archived_at, archived_by, archive_reason, created_by, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, item_id, change_amount, type, reason, cost_price, created_by, created_at";

const TYPE_COLUMNS: &str = "id, slug, name, category_id, is_system, show_in_sku, show_in_name, \
    sort_order, created_at, updated_at";

const VALUE_COLUMNS: &str = "id, type_slug, name, code, meta, created_at, updated_at";

const CATEGORY_COLUMNS: &str =
    "id, name, prefix, parent_id, is_system, sort_order, created_at, updated_at";

/// Shared WHERE clause of the item listing and its count
const ITEM_FILTER: &str = r#"
    WHERE state = $1
      AND ($2::uuid IS NULL OR category_id = $2)
      AND (NOT $3 OR category_id IS NULL)
      AND ($4::text IS NULL OR item_kind = $4)
      AND ($5::text IS NULL OR
           (CASE
                WHEN critical_stock_threshold > 0 AND quantity <= critical_stock_threshold THEN 'critical'
                WHEN low_stock_threshold > 0 AND quantity <= low_stock_threshold THEN 'low'
                ELSE 'ok'
            END) = $5)
      AND ($6::text IS NULL OR name ILIKE $6 OR sku ILIKE $6)
"#;

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    name: String,
    sku: Option<String>,
    item_kind: String,
    category_id: Option<Uuid>,
    quantity: i32,
    unit: String,
    attributes: Json<AttributeSnapshot>,
    low_stock_threshold: i32,
    critical_stock_threshold: i32,
    description: Option<String>,
    cost_price: Option<Decimal>,
    selling_price: Option<Decimal>,
    state: String,
    archived_at: Option<DateTime<Utc>>,
    archived_by: Option<Uuid>,
    archive_reason: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for InventoryItem {
    type Error = AppError;

    fn try_from(row: ItemRow) -> AppResult<Self> {
        let item_kind = row
            .item_kind
            .parse::<ItemKind>()
            .map_err(|e| AppError::Internal(format!("Corrupt item {}: {}", row.id, e)))?;
        let state = match row.state.as_str() {
            "active" => ItemState::Active,
            "archived" => ItemState::Archived,
            other => {
                return Err(AppError::Internal(format!(
                    "Corrupt item {}: unknown state {}",
                    row.id, other
                )))
            }
        };
        Ok(InventoryItem {
            id: row.id,
            name: row.name,
            sku: row.sku,
            item_kind,
            category_id: row.category_id,
            quantity: row.quantity,
            unit: row.unit,
            attributes: row.attributes.0,
            low_stock_threshold: row.low_stock_threshold,
            critical_stock_threshold: row.critical_stock_threshold,
            description: row.description,
            cost_price: row.cost_price,
            selling_price: row.selling_price,
            state,
            archived_at: row.archived_at,
            archived_by: row.archived_by,
            archive_reason: row.archive_reason,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_items(rows: Vec<ItemRow>) -> AppResult<Vec<InventoryItem>> {
    rows.into_iter().map(InventoryItem::try_from).collect()
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    item_id: Uuid,
    change_amount: i32,
    #[sqlx(rename = "type")]
    kind: String,
    reason: Option<String>,
    cost_price: Option<Decimal>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for StockTransaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> AppResult<Self> {
        let kind = row
            .kind
            .parse::<TransactionKind>()
            .map_err(|e| AppError::Internal(format!("Corrupt transaction {}: {}", row.id, e)))?;
        Ok(StockTransaction {
            id: row.id,
            item_id: row.item_id,
            change_amount: row.change_amount,
            kind,
            reason: row.reason,
            cost_price: row.cost_price,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    prefix: Option<String>,
    parent_id: Option<Uuid>,
    is_system: bool,
    sort_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            prefix: row.prefix,
            parent_id: row.parent_id,
            is_system: row.is_system,
            sort_order: row.sort_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TypeRow {
    id: Uuid,
    slug: String,
    name: String,
    category_id: Option<Uuid>,
    is_system: bool,
    show_in_sku: bool,
    show_in_name: bool,
    sort_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TypeRow> for AttributeType {
    fn from(row: TypeRow) -> Self {
        AttributeType {
            id: row.id,
            slug: row.slug,
            name: row.name,
            category_id: row.category_id,
            is_system: row.is_system,
            show_in_sku: row.show_in_sku,
            show_in_name: row.show_in_name,
            sort_order: row.sort_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ValueRow {
    id: Uuid,
    type_slug: String,
    name: String,
    code: String,
    meta: Json<ValueMeta>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ValueRow> for AttributeValue {
    fn from(row: ValueRow) -> Self {
        AttributeValue {
            id: row.id,
            type_slug: row.type_slug,
            name: row.name,
            code: row.code,
            meta: row.meta.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReconcileRow {
    item_id: Uuid,
    cached_quantity: i64,
    ledger_sum: i64,
    transaction_count: i64,
}

impl From<ReconcileRow> for ReconcileReport {
    fn from(row: ReconcileRow) -> Self {
        ReconcileReport::new(
            row.item_id,
            row.cached_quantity,
            row.ledger_sum,
            row.transaction_count,
        )
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    is_active: bool,
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone)]
pub struct PgWarehouseStore {
    db: PgPool,
    max_conflict_retries: u32,
}

impl PgWarehouseStore {
    pub fn new(db: PgPool, max_conflict_retries: u32) -> Self {
        Self {
            db,
            max_conflict_retries,
        }
    }

    /// Run a write again while the database reports a rolled-back
    /// serialization conflict
    async fn with_conflict_retry<T, F, Fut>(&self, operation: &str, mut f: F) -> AppResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Err(e) if e.is_retryable_conflict() && attempt < self.max_conflict_retries => {
                    attempt += 1;
                    tracing::warn!(operation, attempt, "Retrying after serialization conflict");
                }
                result => return result,
            }
        }
    }

    /// Run an idempotent read once more after a transient failure
    async fn with_read_retry<T, F, Fut>(&self, operation: &str, mut f: F) -> AppResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
        T: Send,
    {
        match f().await {
            Err(e) if e.is_transient() => {
                tracing::warn!(operation, error = %e, "Retrying read after transient failure");
                f().await
            }
            result => result,
        }
    }

    async fn fetch_item(&self, id: Uuid) -> AppResult<InventoryItem> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM inventory_items WHERE id = $1",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
        row.try_into()
    }

    async fn create_item_once(&self, item: &NewItem) -> AppResult<(InventoryItem, StockTransaction)> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            INSERT INTO inventory_items (
                name, sku, item_kind, category_id, quantity, unit, attributes,
                low_stock_threshold, critical_stock_threshold, description,
                cost_price, selling_price, state, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'active', $13)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(&item.name)
        .bind(&item.sku)
        .bind(item.item_kind.as_str())
        .bind(item.category_id)
        .bind(item.quantity)
        .bind(&item.unit)
        .bind(Json(&item.attributes))
        .bind(item.low_stock_threshold)
        .bind(item.critical_stock_threshold)
        .bind(&item.description)
        .bind(item.cost_price)
        .bind(item.selling_price)
        .bind(item.created_by)
        .fetch_one(&mut *tx)
        .await?;
        let created = InventoryItem::try_from(row)?;

        let opening = insert_transaction(
            &mut tx,
            created.id,
            created.quantity,
            TransactionKind::In,
            Some(OPENING_REASON),
            created.cost_price,
            item.created_by,
        )
        .await?;

        tx.commit().await?;
        Ok((created, opening))
    }

    async fn apply_stock_change_once(&self, item_id: Uuid, change: &StockChange) -> AppResult<StockMovement> {
        let mut tx = self.db.begin().await?;

        let current = lock_item(&mut tx, item_id).await?;
        let delta = resolve_delta(current.quantity, change.change)?;
        if delta == 0 {
            tx.rollback().await?;
            return Ok(StockMovement {
                item: current,
                transaction: None,
            });
        }
        let quantity = apply_delta(current.quantity, delta, change.allow_negative)?;

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "UPDATE inventory_items SET quantity = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;
        let item = InventoryItem::try_from(row)?;

        let transaction = insert_transaction(
            &mut tx,
            item_id,
            delta,
            change.kind,
            change.reason.as_deref(),
            change.cost_price,
            change.actor_id,
        )
        .await?;

        tx.commit().await?;
        Ok(StockMovement {
            item,
            transaction: Some(transaction),
        })
    }

    async fn update_items_once(&self, updates: &[(Uuid, ItemUpdate)]) -> AppResult<Vec<Updated<InventoryItem>>> {
        let mut tx = self.db.begin().await?;
        let ids: Vec<Uuid> = updates.iter().map(|(id, _)| *id).collect();
        let locked = lock_items(&mut tx, &ids).await?;

        let mut written = Vec::with_capacity(updates.len());
        for (id, update) in updates {
            let before = locked
                .iter()
                .find(|i| i.id == *id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
            ensure_editable(&before)?;
            let row = sqlx::query_as::<_, ItemRow>(&format!(
                r#"
                UPDATE inventory_items
                SET name = $2, sku = $3, category_id = $4, unit = $5, attributes = $6,
                    low_stock_threshold = $7, critical_stock_threshold = $8,
                    description = $9, cost_price = $10, selling_price = $11,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {}
                "#,
                ITEM_COLUMNS
            ))
            .bind(id)
            .bind(&update.name)
            .bind(&update.sku)
            .bind(update.category_id)
            .bind(&update.unit)
            .bind(Json(&update.attributes))
            .bind(update.low_stock_threshold)
            .bind(update.critical_stock_threshold)
            .bind(&update.description)
            .bind(update.cost_price)
            .bind(update.selling_price)
            .fetch_one(&mut *tx)
            .await
            .map_err(missing_category)?;
            written.push(Updated {
                before,
                after: InventoryItem::try_from(row)?,
            });
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn apply_renames_once(&self, renames: &[ItemRename]) -> AppResult<u64> {
        let mut tx = self.db.begin().await?;
        let mut applied = 0;
        for rename in renames {
            let result = sqlx::query(
                r#"
                UPDATE inventory_items
                SET sku = $2, name = $3, updated_at = NOW()
                WHERE id = $1
                  AND state = 'active'
                  AND sku IS NOT DISTINCT FROM $4
                  AND name = $5
                "#,
            )
            .bind(rename.item_id)
            .bind(&rename.sku)
            .bind(&rename.name)
            .bind(&rename.expected_sku)
            .bind(&rename.expected_name)
            .execute(&mut *tx)
            .await?;
            applied += result.rows_affected();
        }
        tx.commit().await?;
        Ok(applied)
    }

    async fn transition_items(
        &self,
        ids: &[Uuid],
        action: LifecycleAction,
        reason: Option<&str>,
        actor_id: Option<Uuid>,
    ) -> AppResult<Vec<Updated<InventoryItem>>> {
        let mut tx = self.db.begin().await?;
        let before = lock_items(&mut tx, ids).await?;
        for item in &before {
            transition(item.state, action)?;
        }

        let rows = match action {
            LifecycleAction::Archive => {
                sqlx::query_as::<_, ItemRow>(&format!(
                    r#"
                    UPDATE inventory_items
                    SET state = 'archived', archived_at = NOW(), archived_by = $2,
                        archive_reason = $3, updated_at = NOW()
                    WHERE id = ANY($1)
                    RETURNING {}
                    "#,
                    ITEM_COLUMNS
                ))
                .bind(ids)
                .bind(actor_id)
                .bind(reason)
                .fetch_all(&mut *tx)
                .await?
            }
            LifecycleAction::Restore => {
                sqlx::query_as::<_, ItemRow>(&format!(
                    r#"
                    UPDATE inventory_items
                    SET state = 'active', archived_at = NULL, archived_by = NULL,
                        archive_reason = NULL, updated_at = NOW()
                    WHERE id = ANY($1)
                    RETURNING {}
                    "#,
                    ITEM_COLUMNS
                ))
                .bind(ids)
                .fetch_all(&mut *tx)
                .await?
            }
            LifecycleAction::Delete => {
                return Err(AppError::Internal(
                    "Deletion goes through delete_items".to_string(),
                ))
            }
        };
        tx.commit().await?;

        let after = into_items(rows)?;
        Ok(before
            .into_iter()
            .filter_map(|b| {
                after
                    .iter()
                    .find(|a| a.id == b.id)
                    .cloned()
                    .map(|a| Updated { before: b, after: a })
            })
            .collect())
    }
}

// ============================================================================
// Transaction helpers
// ============================================================================

async fn lock_item(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<InventoryItem> {
    let row = sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {} FROM inventory_items WHERE id = $1 FOR UPDATE",
        ITEM_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
    row.try_into()
}

/// Lock every item in `ids` (ordered by id to avoid lock-order deadlocks);
/// `NotFound` unless all exist
async fn lock_items(tx: &mut Transaction<'_, Postgres>, ids: &[Uuid]) -> AppResult<Vec<InventoryItem>> {
    let rows = sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {} FROM inventory_items WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        ITEM_COLUMNS
    ))
    .bind(ids)
    .fetch_all(&mut **tx)
    .await?;
    if rows.len() != ids.len() {
        return Err(AppError::NotFound("Item".to_string()));
    }
    into_items(rows)
}

async fn insert_transaction(
    tx: &mut Transaction<'_, Postgres>,
    item_id: Uuid,
    change_amount: i32,
    kind: TransactionKind,
    reason: Option<&str>,
    cost_price: Option<Decimal>,
    created_by: Uuid,
) -> AppResult<StockTransaction> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        INSERT INTO inventory_transactions (item_id, change_amount, type, reason, cost_price, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(item_id)
    .bind(change_amount)
    .bind(kind.as_str())
    .bind(reason)
    .bind(cost_price)
    .bind(created_by)
    .fetch_one(&mut **tx)
    .await?;
    row.try_into()
}

/// Check the actor's password inside `tx`. The user row is share-locked so
/// a concurrent password change cannot interleave with the action.
async fn verify_credential(tx: &mut Transaction<'_, Postgres>, reauth: &Reauth<'_>) -> AppResult<()> {
    let row = sqlx::query_as::<_, (String, bool)>(
        "SELECT password_hash, is_active FROM users WHERE id = $1 FOR SHARE",
    )
    .bind(reauth.actor_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some((password_hash, true)) = row else {
        return Err(AppError::AuthenticationFailed);
    };
    if reauth.verifier.verify(reauth.password, &password_hash)? {
        Ok(())
    } else {
        tracing::warn!(actor_id = %reauth.actor_id, "Re-authentication rejected");
        Err(AppError::AuthenticationFailed)
    }
}

fn unique_violation(err: sqlx::Error, conflict: impl FnOnce() -> AppError) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict(),
        _ => AppError::DatabaseError(err),
    }
}

/// An item pointing at a category that is gone
fn missing_category(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            AppError::NotFound("Category".to_string())
        }
        _ => AppError::DatabaseError(err),
    }
}

fn slug_conflict(slug: &str) -> AppError {
    AppError::conflict(
        "slug",
        format!("Attribute type '{}' already exists", slug),
        format!("Тип атрибута '{}' уже существует", slug),
    )
}

fn category_conflict(name: &str) -> AppError {
    AppError::conflict(
        "name",
        format!("Category '{}' already exists", name),
        format!("Категория '{}' уже существует", name),
    )
}

/// `%term%` for ILIKE with wildcards in the term escaped
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn composable_kinds() -> Vec<String> {
    [ItemKind::Clothing, ItemKind::Packaging, ItemKind::Consumables]
        .into_iter()
        .filter(ItemKind::supports_composition)
        .map(|k| k.as_str().to_string())
        .collect()
}

#[async_trait]
impl WarehouseStore for PgWarehouseStore {
    async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {} FROM inventory_categories ORDER BY sort_order, name",
            CATEGORY_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get_category(&self, id: Uuid) -> AppResult<Category> {
        sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {} FROM inventory_categories WHERE id = $1",
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(Category::from)
        .ok_or_else(|| AppError::NotFound("Category".to_string()))
    }

    async fn insert_category(&self, category: NewCategory) -> AppResult<Category> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            r#"
            INSERT INTO inventory_categories (name, prefix, parent_id, is_system, sort_order)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            CATEGORY_COLUMNS
        ))
        .bind(&category.name)
        .bind(&category.prefix)
        .bind(category.parent_id)
        .bind(category.is_system)
        .bind(category.sort_order)
        .fetch_one(&self.db)
        .await
        .map_err(|e| unique_violation(e, || category_conflict(&category.name)))?;
        Ok(row.into())
    }

    async fn update_category(&self, id: Uuid, changes: CategoryChanges) -> AppResult<Updated<Category>> {
        let mut tx = self.db.begin().await?;
        let before: Category = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {} FROM inventory_categories WHERE id = $1 FOR UPDATE",
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Category".to_string()))?
        .into();

        let mut next = before.clone();
        changes.apply(&mut next);
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            r#"
            UPDATE inventory_categories
            SET name = $2, prefix = $3, sort_order = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .bind(&next.name)
        .bind(&next.prefix)
        .bind(next.sort_order)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || category_conflict(&next.name)))?;
        tx.commit().await?;

        Ok(Updated {
            before,
            after: row.into(),
        })
    }

    async fn delete_category(&self, id: Uuid, reauth: Option<Reauth<'_>>) -> AppResult<CategoryRemoval> {
        let mut tx = self.db.begin().await?;
        let category: Category = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {} FROM inventory_categories WHERE id = $1 FOR UPDATE",
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Category".to_string()))?
        .into();

        if category.is_system {
            let reauth = reauth.ok_or(AppError::ReauthenticationRequired)?;
            verify_credential(&mut tx, &reauth).await?;
        }

        let (children, types) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM inventory_categories WHERE parent_id = $1),
                (SELECT COUNT(*) FROM inventory_attribute_types WHERE category_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if children > 0 {
            return Err(has_subcategories());
        }
        if types > 0 {
            return Err(owns_types());
        }

        let detached = sqlx::query(
            "UPDATE inventory_items SET category_id = NULL, updated_at = NOW() WHERE category_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM inventory_categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(CategoryRemoval {
            category,
            items_detached: detached.rows_affected(),
        })
    }

    async fn list_attribute_types(&self, category_id: Option<Uuid>) -> AppResult<Vec<AttributeType>> {
        let rows = sqlx::query_as::<_, TypeRow>(&format!(
            r#"
            SELECT {} FROM inventory_attribute_types
            WHERE category_id IS NOT DISTINCT FROM $1
            ORDER BY sort_order, created_at
            "#,
            TYPE_COLUMNS
        ))
        .bind(category_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(AttributeType::from).collect())
    }

    async fn all_attribute_types(&self) -> AppResult<Vec<AttributeType>> {
        let rows = sqlx::query_as::<_, TypeRow>(&format!(
            "SELECT {} FROM inventory_attribute_types ORDER BY sort_order, created_at",
            TYPE_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(AttributeType::from).collect())
    }

    async fn get_attribute_type(&self, id: Uuid) -> AppResult<AttributeType> {
        sqlx::query_as::<_, TypeRow>(&format!(
            "SELECT {} FROM inventory_attribute_types WHERE id = $1",
            TYPE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(AttributeType::from)
        .ok_or_else(|| AppError::NotFound("Attribute type".to_string()))
    }

    async fn find_attribute_type(&self, slug: &str) -> AppResult<Option<AttributeType>> {
        let row = sqlx::query_as::<_, TypeRow>(&format!(
            "SELECT {} FROM inventory_attribute_types WHERE slug = $1",
            TYPE_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(AttributeType::from))
    }

    async fn insert_attribute_type(&self, attribute_type: NewAttributeType) -> AppResult<AttributeType> {
        let row = sqlx::query_as::<_, TypeRow>(&format!(
            r#"
            INSERT INTO inventory_attribute_types
                (slug, name, category_id, is_system, show_in_sku, show_in_name, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            TYPE_COLUMNS
        ))
        .bind(&attribute_type.slug)
        .bind(&attribute_type.name)
        .bind(attribute_type.category_id)
        .bind(attribute_type.is_system)
        .bind(attribute_type.show_in_sku)
        .bind(attribute_type.show_in_name)
        .bind(attribute_type.sort_order)
        .fetch_one(&self.db)
        .await
        .map_err(|e| unique_violation(e, || slug_conflict(&attribute_type.slug)))?;
        Ok(row.into())
    }

    async fn update_attribute_type(
        &self,
        id: Uuid,
        changes: AttributeTypeChanges,
    ) -> AppResult<Updated<AttributeType>> {
        let mut tx = self.db.begin().await?;
        let before: AttributeType = sqlx::query_as::<_, TypeRow>(&format!(
            "SELECT {} FROM inventory_attribute_types WHERE id = $1 FOR UPDATE",
            TYPE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Attribute type".to_string()))?
        .into();

        let mut next = before.clone();
        changes.apply(&mut next);
        let row = sqlx::query_as::<_, TypeRow>(&format!(
            r#"
            UPDATE inventory_attribute_types
            SET name = $2, category_id = $3, is_system = $4, show_in_sku = $5,
                show_in_name = $6, sort_order = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TYPE_COLUMNS
        ))
        .bind(id)
        .bind(&next.name)
        .bind(next.category_id)
        .bind(next.is_system)
        .bind(next.show_in_sku)
        .bind(next.show_in_name)
        .bind(next.sort_order)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Updated {
            before,
            after: row.into(),
        })
    }

    async fn delete_attribute_type(&self, id: Uuid, reauth: Option<Reauth<'_>>) -> AppResult<AttributeType> {
        let mut tx = self.db.begin().await?;
        let existing: AttributeType = sqlx::query_as::<_, TypeRow>(&format!(
            "SELECT {} FROM inventory_attribute_types WHERE id = $1 FOR UPDATE",
            TYPE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Attribute type".to_string()))?
        .into();

        if existing.is_system {
            let reauth = reauth.ok_or(AppError::ReauthenticationRequired)?;
            verify_credential(&mut tx, &reauth).await?;
        }

        let value_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM inventory_attribute_values WHERE type_slug = $1",
        )
        .bind(&existing.slug)
        .fetch_one(&mut *tx)
        .await?;
        if value_count > 0 {
            return Err(AppError::conflict(
                "attribute_type",
                "Delete the values of this type first",
                "Сначала удалите значения этого типа",
            ));
        }

        sqlx::query("DELETE FROM inventory_attribute_types WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(existing)
    }

    async fn list_attribute_values(&self, type_slug: &str) -> AppResult<Vec<AttributeValue>> {
        let rows = sqlx::query_as::<_, ValueRow>(&format!(
            "SELECT {} FROM inventory_attribute_values WHERE type_slug = $1 ORDER BY created_at",
            VALUE_COLUMNS
        ))
        .bind(type_slug)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(AttributeValue::from).collect())
    }

    async fn all_attribute_values(&self) -> AppResult<Vec<AttributeValue>> {
        let rows = sqlx::query_as::<_, ValueRow>(&format!(
            "SELECT {} FROM inventory_attribute_values ORDER BY created_at",
            VALUE_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(AttributeValue::from).collect())
    }

    async fn get_attribute_value(&self, id: Uuid) -> AppResult<AttributeValue> {
        sqlx::query_as::<_, ValueRow>(&format!(
            "SELECT {} FROM inventory_attribute_values WHERE id = $1",
            VALUE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(AttributeValue::from)
        .ok_or_else(|| AppError::NotFound("Attribute value".to_string()))
    }

    async fn insert_attribute_value(&self, value: NewAttributeValue) -> AppResult<AttributeValue> {
        let row = sqlx::query_as::<_, ValueRow>(&format!(
            r#"
            INSERT INTO inventory_attribute_values (type_slug, name, code, meta)
            SELECT slug, $2, $3, $4 FROM inventory_attribute_types WHERE slug = $1
            RETURNING {}
            "#,
            VALUE_COLUMNS
        ))
        .bind(&value.type_slug)
        .bind(&value.name)
        .bind(&value.code)
        .bind(Json(&value.meta))
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Attribute type".to_string()))?;
        Ok(row.into())
    }

    async fn update_attribute_value(&self, id: Uuid, changes: AttributeValueChanges) -> AppResult<ValueUpdate> {
        let mut tx = self.db.begin().await?;
        let before: AttributeValue = sqlx::query_as::<_, ValueRow>(&format!(
            "SELECT {} FROM inventory_attribute_values WHERE id = $1 FOR UPDATE",
            VALUE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Attribute value".to_string()))?
        .into();

        let mut next = before.clone();
        changes.apply(&mut next);
        let after: AttributeValue = sqlx::query_as::<_, ValueRow>(&format!(
            r#"
            UPDATE inventory_attribute_values
            SET name = $2, code = $3, meta = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            VALUE_COLUMNS
        ))
        .bind(id)
        .bind(&next.name)
        .bind(&next.code)
        .bind(Json(&next.meta))
        .fetch_one(&mut *tx)
        .await?
        .into();

        let mut items_rewritten = 0;
        if before.code != after.code {
            items_rewritten = sqlx::query(
                r#"
                UPDATE inventory_items
                SET attributes = jsonb_set(attributes, ARRAY[$1], to_jsonb($3::text)),
                    updated_at = NOW()
                WHERE attributes ->> $1 = $2
                "#,
            )
            .bind(&after.type_slug)
            .bind(&before.code)
            .bind(&after.code)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;

        Ok(ValueUpdate {
            before,
            after,
            items_rewritten,
        })
    }

    async fn delete_attribute_value(&self, id: Uuid, reauth: Option<Reauth<'_>>) -> AppResult<AttributeValue> {
        let mut tx = self.db.begin().await?;
        let existing: AttributeValue = sqlx::query_as::<_, ValueRow>(&format!(
            "SELECT {} FROM inventory_attribute_values WHERE id = $1 FOR UPDATE",
            VALUE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Attribute value".to_string()))?
        .into();

        let type_is_system = sqlx::query_scalar::<_, bool>(
            "SELECT is_system FROM inventory_attribute_types WHERE slug = $1 FOR SHARE",
        )
        .bind(&existing.type_slug)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(false);
        if type_is_system {
            let reauth = reauth.ok_or(AppError::ReauthenticationRequired)?;
            verify_credential(&mut tx, &reauth).await?;
        }

        sqlx::query("DELETE FROM inventory_attribute_values WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(existing)
    }

    async fn list_seed_overrides(&self) -> AppResult<Vec<SeedOverride>> {
        let rows = sqlx::query_as::<_, (String, String, bool, bool)>(
            "SELECT type_slug, code, show_in_name, show_in_sku FROM inventory_seed_overrides",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(type_slug, code, show_in_name, show_in_sku)| SeedOverride {
                type_slug,
                code,
                show_in_name,
                show_in_sku,
            })
            .collect())
    }

    async fn upsert_seed_override(&self, seed_override: SeedOverride) -> AppResult<SeedOverride> {
        sqlx::query(
            r#"
            INSERT INTO inventory_seed_overrides (type_slug, code, show_in_name, show_in_sku)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (type_slug, code)
            DO UPDATE SET show_in_name = EXCLUDED.show_in_name,
                          show_in_sku = EXCLUDED.show_in_sku,
                          updated_at = NOW()
            "#,
        )
        .bind(&seed_override.type_slug)
        .bind(&seed_override.code)
        .bind(seed_override.show_in_name)
        .bind(seed_override.show_in_sku)
        .execute(&self.db)
        .await?;
        Ok(seed_override)
    }

    async fn list_items(&self, filter: &ItemFilter) -> AppResult<(Vec<InventoryItem>, u64)> {
        let page = filter.pagination.normalized();
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);
        let search = search.as_deref();
        let state = filter.state().as_str();
        let kind = filter.item_kind.map(|k| k.as_str());
        let status = filter.status.map(|s| s.as_str());

        self.with_read_retry("list_items", move || async move {
            let rows = sqlx::query_as::<_, ItemRow>(&format!(
                "SELECT {} FROM inventory_items {} ORDER BY created_at DESC, id DESC LIMIT $7 OFFSET $8",
                ITEM_COLUMNS, ITEM_FILTER
            ))
            .bind(state)
            .bind(filter.category_id)
            .bind(filter.uncategorized)
            .bind(kind)
            .bind(status)
            .bind(search)
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.db)
            .await?;

            let total = sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COUNT(*) FROM inventory_items {}",
                ITEM_FILTER
            ))
            .bind(state)
            .bind(filter.category_id)
            .bind(filter.uncategorized)
            .bind(kind)
            .bind(status)
            .bind(search)
            .fetch_one(&self.db)
            .await?;

            Ok((into_items(rows)?, total.max(0) as u64))
        })
        .await
    }

    async fn get_item(&self, id: Uuid) -> AppResult<InventoryItem> {
        self.with_read_retry("get_item", move || self.fetch_item(id)).await
    }

    async fn find_items_by_sku(&self, sku: &str) -> AppResult<Vec<InventoryItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM inventory_items WHERE sku = $1 ORDER BY created_at",
            ITEM_COLUMNS
        ))
        .bind(sku)
        .fetch_all(&self.db)
        .await?;
        into_items(rows)
    }

    async fn create_item(&self, item: NewItem) -> AppResult<(InventoryItem, StockTransaction)> {
        let item = &item;
        self.with_conflict_retry("create_item", move || self.create_item_once(item))
            .await
    }

    async fn update_items(&self, updates: &[(Uuid, ItemUpdate)]) -> AppResult<Vec<Updated<InventoryItem>>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conflict_retry("update_items", move || self.update_items_once(updates))
            .await
    }

    async fn apply_stock_change(&self, item_id: Uuid, change: &StockChange) -> AppResult<StockMovement> {
        self.with_conflict_retry("apply_stock_change", move || {
            self.apply_stock_change_once(item_id, change)
        })
        .await
    }

    async fn reconcile(&self, item_id: Uuid) -> AppResult<ReconcileReport> {
        self.with_read_retry("reconcile", move || async move {
            sqlx::query_as::<_, ReconcileRow>(
                r#"
                SELECT i.id AS item_id,
                       i.quantity::BIGINT AS cached_quantity,
                       COALESCE(SUM(t.change_amount), 0)::BIGINT AS ledger_sum,
                       COUNT(t.id) AS transaction_count
                FROM inventory_items i
                LEFT JOIN inventory_transactions t ON t.item_id = i.id
                WHERE i.id = $1
                GROUP BY i.id, i.quantity
                "#,
            )
            .bind(item_id)
            .fetch_optional(&self.db)
            .await?
            .map(ReconcileReport::from)
            .ok_or_else(|| AppError::NotFound("Item".to_string()))
        })
        .await
    }

    async fn reconcile_all(&self) -> AppResult<Vec<ReconcileReport>> {
        self.with_read_retry("reconcile_all", move || async move {
            let rows = sqlx::query_as::<_, ReconcileRow>(
                r#"
                SELECT i.id AS item_id,
                       i.quantity::BIGINT AS cached_quantity,
                       COALESCE(SUM(t.change_amount), 0)::BIGINT AS ledger_sum,
                       COUNT(t.id) AS transaction_count
                FROM inventory_items i
                LEFT JOIN inventory_transactions t ON t.item_id = i.id
                GROUP BY i.id, i.quantity
                ORDER BY i.id
                "#,
            )
            .fetch_all(&self.db)
            .await?;
            Ok(rows.into_iter().map(ReconcileReport::from).collect())
        })
        .await
    }

    async fn list_transactions(&self, item_id: Uuid) -> AppResult<Vec<StockTransaction>> {
        self.with_read_retry("list_transactions", move || async move {
            let rows = sqlx::query_as::<_, TransactionRow>(&format!(
                r#"
                SELECT {} FROM inventory_transactions
                WHERE item_id = $1
                ORDER BY created_at DESC, id DESC
                "#,
                TRANSACTION_COLUMNS
            ))
            .bind(item_id)
            .fetch_all(&self.db)
            .await?;
            rows.into_iter().map(StockTransaction::try_from).collect()
        })
        .await
    }

    async fn list_composable_items_after(&self, after: Option<Uuid>, limit: u32) -> AppResult<Vec<InventoryItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            SELECT {} FROM inventory_items
            WHERE state = 'active'
              AND item_kind = ANY($1)
              AND ($2::uuid IS NULL OR id > $2)
            ORDER BY id
            LIMIT $3
            "#,
            ITEM_COLUMNS
        ))
        .bind(composable_kinds())
        .bind(after)
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;
        into_items(rows)
    }

    async fn apply_renames(&self, renames: &[ItemRename]) -> AppResult<u64> {
        if renames.is_empty() {
            return Ok(0);
        }
        self.with_conflict_retry("apply_renames", move || self.apply_renames_once(renames))
            .await
    }

    async fn archive_items(&self, ids: &[Uuid], reason: &str, actor_id: Uuid) -> AppResult<Vec<Updated<InventoryItem>>> {
        self.with_conflict_retry("archive_items", move || {
            self.transition_items(ids, LifecycleAction::Archive, Some(reason), Some(actor_id))
        })
        .await
    }

    async fn restore_items(&self, ids: &[Uuid]) -> AppResult<Vec<Updated<InventoryItem>>> {
        self.with_conflict_retry("restore_items", move || {
            self.transition_items(ids, LifecycleAction::Restore, None, None)
        })
        .await
    }

    async fn delete_items(&self, ids: &[Uuid], reauth: Reauth<'_>) -> AppResult<Vec<InventoryItem>> {
        let mut tx = self.db.begin().await?;

        verify_credential(&mut tx, &reauth).await?;

        let items = lock_items(&mut tx, ids).await?;
        for item in &items {
            transition(item.state, LifecycleAction::Delete)?;
        }
        sqlx::query("DELETE FROM inventory_items WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(items)
    }

    async fn archive_stale_items(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
        actor_id: Uuid,
    ) -> AppResult<Vec<InventoryItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            UPDATE inventory_items
            SET state = 'archived', archived_at = NOW(), archived_by = $2,
                archive_reason = $3, updated_at = NOW()
            WHERE state = 'active' AND quantity = 0 AND updated_at < $1
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(cutoff)
        .bind(actor_id)
        .bind(reason)
        .fetch_all(&self.db)
        .await?;
        into_items(rows)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, password_hash, role, is_active
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        row.map(|u| {
            let role = Role::parse(&u.role)
                .ok_or_else(|| AppError::Internal(format!("Unknown role for user {}", u.id)))?;
            Ok(UserRecord {
                id: u.id,
                email: u.email,
                name: u.name,
                password_hash: u.password_hash,
                role,
                is_active: u.is_active,
            })
        })
        .transpose()
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}
