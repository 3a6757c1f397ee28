//! Stock ledger: item creation, quantity changes and reconciliation
//!
//! `quantity` on an item is a cache of the sum of its ledger rows. Every
//! change goes through the store, which writes both in one transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::ledger::ReconcileReport;
use shared::sku::{sanitize_segment, Composition, SkuComposer};
use shared::{
    normalize_code, normalize_slug, require_text, validate_thresholds, AttributeSnapshot,
    Category, InventoryItem, ItemKind, ItemUpdate, NewItem, PaginatedResponse, QuantityChange,
    StockChange, StockStatus, StockTransaction, TransactionKind,
};
use uuid::Uuid;
use validator::Validate;

use super::lifecycle::{dedupe, BatchResult};
use super::sku::compose_for;
use super::{Actor, SkuService};
use crate::audit::{AuditEvent, AuditSink};
use crate::config::InventoryConfig;
use crate::error::{AppError, AppResult};
use crate::store::{ItemFilter, StockMovement, WarehouseStore};
use crate::AppState;

/// Item as returned to clients, with its computed stock status
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub stock_status: StockStatus,
}

impl From<InventoryItem> for ItemView {
    fn from(item: InventoryItem) -> Self {
        let stock_status = item.stock_status();
        Self { item, stock_status }
    }
}

/// Input for creating an item
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateItemInput {
    /// Composed from the category and attributes when empty for
    /// composable kinds
    #[serde(default)]
    #[validate(length(max = 255, message = "Name is too long"))]
    pub name: String,
    /// Used only when no SKU can be composed
    pub sku: Option<String>,
    #[serde(default)]
    pub item_kind: ItemKind,
    pub category_id: Option<Uuid>,
    /// Initial stock
    #[serde(default)]
    pub quantity: i32,
    pub unit: Option<String>,
    #[serde(default)]
    pub attributes: AttributeSnapshot,
    pub low_stock_threshold: Option<i32>,
    pub critical_stock_threshold: Option<i32>,
    pub description: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
}

/// Created item with its opening ledger row
#[derive(Debug, Clone, Serialize)]
pub struct CreatedItem {
    pub item: ItemView,
    pub opening_transaction: StockTransaction,
    /// Another item already carries this SKU
    pub duplicate_sku: bool,
}

/// Input for editing an item. Absent fields keep their value; quantity
/// only changes through the ledger.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateItemInput {
    /// An item whose name followed its composed name keeps following it
    /// unless a name is given here
    #[validate(length(max = 255, message = "Name is too long"))]
    pub name: Option<String>,
    /// Used only when no SKU can be composed; empty clears it
    pub sku: Option<String>,
    pub category_id: Option<Uuid>,
    /// Take the item out of its category
    #[serde(default)]
    pub uncategorized: bool,
    pub unit: Option<String>,
    /// Replaces the whole snapshot
    pub attributes: Option<AttributeSnapshot>,
    pub low_stock_threshold: Option<i32>,
    pub critical_stock_threshold: Option<i32>,
    /// Empty clears it
    pub description: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
}

/// Item after an edit
#[derive(Debug, Clone, Serialize)]
pub struct EditedItem {
    pub item: ItemView,
    /// Another item already carries the new SKU
    pub duplicate_sku: bool,
}

/// Input for moving a batch of items to a category, or out of any
/// category when `category_id` is absent
#[derive(Debug, Deserialize, Validate)]
pub struct MoveItemsInput {
    #[validate(length(min = 1, message = "Select at least one item"))]
    pub ids: Vec<Uuid>,
    pub category_id: Option<Uuid>,
}

/// Input for a signed quantity change
#[derive(Debug, Deserialize)]
pub struct AdjustQuantityInput {
    pub delta: i32,
    /// `in`, `out` or `adjustment`
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: Option<String>,
    pub cost_price: Option<Decimal>,
    #[serde(default)]
    pub allow_negative: bool,
}

/// Input for moving an item to an absolute quantity
#[derive(Debug, Deserialize)]
pub struct SetQuantityInput {
    pub quantity: i32,
    pub reason: Option<String>,
}

/// Item after a stock change, with the ledger row it produced
#[derive(Debug, Clone, Serialize)]
pub struct MovementView {
    pub item: ItemView,
    pub transaction: Option<StockTransaction>,
}

impl From<StockMovement> for MovementView {
    fn from(movement: StockMovement) -> Self {
        Self {
            item: movement.item.into(),
            transaction: movement.transaction,
        }
    }
}

/// Summary of a full reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileSummary {
    pub items: u64,
    pub drifted: u64,
    pub reports: Vec<ReconcileReport>,
}

/// Flat transaction row for CSV export
#[derive(Debug, Serialize)]
pub struct TransactionCsvRow {
    pub id: Uuid,
    pub item_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub change_amount: i32,
    pub reason: String,
    pub cost_price: Option<Decimal>,
    pub created_by: Option<Uuid>,
}

impl From<&StockTransaction> for TransactionCsvRow {
    fn from(tx: &StockTransaction) -> Self {
        Self {
            id: tx.id,
            item_id: tx.item_id,
            created_at: tx.created_at,
            kind: tx.kind.as_str(),
            change_amount: tx.change_amount,
            reason: tx.reason.clone().unwrap_or_default(),
            cost_price: tx.cost_price,
            created_by: tx.created_by,
        }
    }
}

/// Stock ledger service
#[derive(Clone)]
pub struct StockLedgerService {
    store: Arc<dyn WarehouseStore>,
    audit: Arc<dyn AuditSink>,
    sku: SkuService,
    config: InventoryConfig,
}

impl StockLedgerService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            audit: state.audit.clone(),
            sku: SkuService::new(state),
            config: state.config.inventory.clone(),
        }
    }

    // ========================================================================
    // Items
    // ========================================================================

    pub async fn list_items(&self, filter: &ItemFilter) -> AppResult<PaginatedResponse<ItemView>> {
        let (items, total) = self.store.list_items(filter).await?;
        Ok(PaginatedResponse::new(
            items.into_iter().map(ItemView::from).collect(),
            filter.pagination.normalized(),
            total,
        ))
    }

    pub async fn get_item(&self, id: Uuid) -> AppResult<ItemView> {
        Ok(self.store.get_item(id).await?.into())
    }

    /// Items carrying the SKU, after the same sanitization new SKUs get
    pub async fn find_by_sku(&self, sku: &str) -> AppResult<Vec<ItemView>> {
        let sku = sanitize_segment(sku);
        if sku.is_empty() {
            return Ok(Vec::new());
        }
        let items = self.store.find_items_by_sku(&sku).await?;
        Ok(items.into_iter().map(ItemView::from).collect())
    }

    /// Creates the item together with its opening `in` transaction. Both
    /// are written or neither is.
    pub async fn create_item(&self, actor: Actor, input: CreateItemInput) -> AppResult<CreatedItem> {
        input.validate()?;
        if input.quantity < 0 {
            return Err(AppError::validation(
                "quantity",
                "Initial quantity cannot be negative",
                "Начальный остаток не может быть отрицательным",
            ));
        }
        check_prices(input.cost_price, input.selling_price)?;

        let low = input
            .low_stock_threshold
            .unwrap_or(self.config.default_low_stock_threshold);
        let critical = input
            .critical_stock_threshold
            .unwrap_or(self.config.default_critical_stock_threshold);
        validate_thresholds(low, critical)?;

        let category = match input.category_id {
            Some(id) => Some(self.store.get_category(id).await?),
            None => None,
        };
        let attributes = normalize_snapshot(&input.attributes)?;
        let manual_sku = input
            .sku
            .as_deref()
            .map(sanitize_segment)
            .filter(|s| !s.is_empty());

        let (sku, composed_name) = if input.item_kind.supports_composition() {
            let composer = self.sku.composer().await?;
            let (composition, name) =
                compose_for(&composer, category.as_ref(), input.item_kind, &attributes);
            if let Composition::Incomplete { missing } = &composition {
                tracing::debug!(?missing, "SKU not composed, keeping manual SKU");
            }
            (composition.sku().map(str::to_string).or(manual_sku), name)
        } else {
            (manual_sku, None)
        };

        let name = match input.name.trim() {
            "" => composed_name.ok_or_else(|| {
                AppError::validation("name", "Item name is required", "Укажите название товара")
            })?,
            name => name.to_string(),
        };

        let duplicate_sku = match &sku {
            Some(sku) => !self.store.find_items_by_sku(sku).await?.is_empty(),
            None => false,
        };

        let unit = input
            .unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(self.config.default_unit.as_str())
            .to_string();

        let (item, opening) = self
            .store
            .create_item(NewItem {
                name,
                sku,
                item_kind: input.item_kind,
                category_id: input.category_id,
                quantity: input.quantity,
                unit,
                attributes,
                low_stock_threshold: low,
                critical_stock_threshold: critical,
                description: input.description.filter(|d| !d.trim().is_empty()),
                cost_price: input.cost_price,
                selling_price: input.selling_price,
                created_by: actor.id,
            })
            .await?;

        if duplicate_sku {
            tracing::warn!(item_id = %item.id, sku = ?item.sku, "SKU already used by another item");
        }
        tracing::info!(item_id = %item.id, quantity = item.quantity, "Item created");

        Ok(CreatedItem {
            item: item.into(),
            opening_transaction: opening,
            duplicate_sku,
        })
    }

    /// Edits everything but quantity and lifecycle state in one write.
    /// Composable items get their SKU recomposed from the new category and
    /// attributes.
    pub async fn update_item(&self, actor: Actor, id: Uuid, input: UpdateItemInput) -> AppResult<EditedItem> {
        input.validate()?;
        check_prices(input.cost_price, input.selling_price)?;

        let current = self.store.get_item(id).await?;
        let mut update = ItemUpdate::from_item(&current);
        if input.uncategorized {
            update.category_id = None;
        } else if input.category_id.is_some() {
            update.category_id = input.category_id;
        }
        if let Some(attributes) = &input.attributes {
            update.attributes = normalize_snapshot(attributes)?;
        }
        if let Some(unit) = input.unit.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            update.unit = unit.to_string();
        }
        if let Some(low) = input.low_stock_threshold {
            update.low_stock_threshold = low;
        }
        if let Some(critical) = input.critical_stock_threshold {
            update.critical_stock_threshold = critical;
        }
        validate_thresholds(update.low_stock_threshold, update.critical_stock_threshold)?;
        if let Some(description) = input.description {
            update.description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
        }
        if input.cost_price.is_some() {
            update.cost_price = input.cost_price;
        }
        if input.selling_price.is_some() {
            update.selling_price = input.selling_price;
        }
        if let Some(sku) = input.sku.as_deref() {
            update.sku = Some(sanitize_segment(sku)).filter(|s| !s.is_empty());
        }

        let name = input
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let (composer, categories) = self.composition_context().await?;
        recompose(&composer, &categories, &current, &mut update, name.is_some())?;
        if let Some(name) = name {
            update.name = name;
        }

        if update == ItemUpdate::from_item(&current) {
            return Ok(EditedItem {
                item: current.into(),
                duplicate_sku: false,
            });
        }

        let duplicate_sku = match &update.sku {
            Some(sku) if update.sku != current.sku => self
                .store
                .find_items_by_sku(sku)
                .await?
                .iter()
                .any(|other| other.id != id),
            _ => false,
        };

        let updated = self
            .store
            .update_items(&[(id, update)])
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
        self.audit.record(
            AuditEvent::new(actor.id, "item.update", "item", id)
                .before(&updated.before)
                .after(&updated.after),
        );

        if duplicate_sku {
            tracing::warn!(item_id = %id, sku = ?updated.after.sku, "SKU already used by another item");
        }
        tracing::info!(item_id = %id, "Item updated");
        Ok(EditedItem {
            item: updated.after.into(),
            duplicate_sku,
        })
    }

    /// Moves every item to the category or none. SKUs of composable items
    /// follow the new prefix.
    pub async fn move_to_category(&self, actor: Actor, input: MoveItemsInput) -> AppResult<BatchResult> {
        input.validate()?;
        let (composer, categories) = self.composition_context().await?;

        let mut updates = Vec::new();
        for id in dedupe(&input.ids) {
            let current = self.store.get_item(id).await?;
            let mut update = ItemUpdate::from_item(&current);
            update.category_id = input.category_id;
            recompose(&composer, &categories, &current, &mut update, false)?;
            updates.push((id, update));
        }

        let updated = self.store.update_items(&updates).await?;
        for change in &updated {
            self.audit.record(
                AuditEvent::new(actor.id, "item.move", "item", change.after.id)
                    .before(&change.before)
                    .after(&change.after),
            );
        }

        tracing::info!(count = updated.len(), category_id = ?input.category_id, "Items moved");
        Ok(BatchResult {
            affected: updated.len() as u64,
            items: updated.into_iter().map(|u| u.after.into()).collect(),
        })
    }

    async fn composition_context(&self) -> AppResult<(SkuComposer, HashMap<Uuid, Category>)> {
        let composer = self.sku.composer().await?;
        let categories = self
            .store
            .list_categories()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        Ok((composer, categories))
    }

    // ========================================================================
    // Quantity changes
    // ========================================================================

    /// Applies a signed change. `in` must add, `out` must remove and
    /// `adjustment` may do either. A result below zero is refused unless
    /// `allow_negative` is set.
    pub async fn adjust_quantity(
        &self,
        actor: Actor,
        item_id: Uuid,
        input: AdjustQuantityInput,
    ) -> AppResult<MovementView> {
        let kind: TransactionKind = input.kind.parse()?;
        kind.check_delta(input.delta)?;

        let change = StockChange {
            change: QuantityChange::By(input.delta),
            kind,
            reason: clean_reason(input.reason),
            cost_price: input.cost_price,
            actor_id: actor.id,
            allow_negative: input.allow_negative,
        };
        let movement = self.store.apply_stock_change(item_id, &change).await?;

        tracing::info!(
            item_id = %item_id,
            delta = input.delta,
            kind = kind.as_str(),
            quantity = movement.item.quantity,
            "Stock adjusted"
        );
        Ok(movement.into())
    }

    /// Moves the item to an absolute quantity with one `adjustment` row
    /// for the difference. Nothing is written when it already matches.
    pub async fn set_quantity(
        &self,
        actor: Actor,
        item_id: Uuid,
        input: SetQuantityInput,
    ) -> AppResult<MovementView> {
        let change = StockChange {
            change: QuantityChange::SetTo(input.quantity),
            kind: TransactionKind::Adjustment,
            reason: clean_reason(input.reason),
            cost_price: None,
            actor_id: actor.id,
            allow_negative: false,
        };
        let movement = self.store.apply_stock_change(item_id, &change).await?;

        match &movement.transaction {
            Some(tx) => tracing::info!(
                item_id = %item_id,
                delta = tx.change_amount,
                quantity = movement.item.quantity,
                "Stock set"
            ),
            None => tracing::debug!(item_id = %item_id, "Stock already at requested quantity"),
        }
        Ok(movement.into())
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    /// Compares the cached quantity with the ledger sum. Drift is
    /// reported, never repaired.
    pub async fn reconcile(&self, item_id: Uuid) -> AppResult<ReconcileReport> {
        let report = self.store.reconcile(item_id).await?;
        if !report.matches {
            tracing::warn!(
                item_id = %item_id,
                cached_quantity = report.cached_quantity,
                ledger_sum = report.ledger_sum,
                "Stock ledger drift detected"
            );
        }
        Ok(report)
    }

    pub async fn reconcile_all(&self) -> AppResult<ReconcileSummary> {
        let reports = self.store.reconcile_all().await?;
        let drifted = reports.iter().filter(|r| !r.matches).count() as u64;
        if drifted > 0 {
            tracing::warn!(drifted, "Stock ledger drift detected during full reconciliation");
        }
        Ok(ReconcileSummary {
            items: reports.len() as u64,
            drifted,
            reports,
        })
    }

    /// Ledger rows of an item, newest first. Works for deleted items.
    pub async fn list_transactions(&self, item_id: Uuid) -> AppResult<Vec<StockTransaction>> {
        self.store.list_transactions(item_id).await
    }

    pub async fn export_transactions_csv(&self, item_id: Uuid) -> AppResult<String> {
        let transactions = self.store.list_transactions(item_id).await?;
        let rows: Vec<TransactionCsvRow> = transactions.iter().map(TransactionCsvRow::from).collect();
        Self::export_to_csv(&rows)
    }

    /// Export data to CSV format
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

fn check_prices(cost_price: Option<Decimal>, selling_price: Option<Decimal>) -> AppResult<()> {
    for (field, price) in [("cost_price", cost_price), ("selling_price", selling_price)] {
        if price.is_some_and(|p| p.is_sign_negative()) {
            return Err(AppError::validation(
                field,
                "Price cannot be negative",
                "Цена не может быть отрицательной",
            ));
        }
    }
    Ok(())
}

fn category_of(categories: &HashMap<Uuid, Category>, id: Option<Uuid>) -> AppResult<Option<&Category>> {
    match id {
        Some(id) => categories
            .get(&id)
            .map(Some)
            .ok_or_else(|| AppError::NotFound("Category".to_string())),
        None => Ok(None),
    }
}

/// Recompose the SKU of an edited composable item. Without `name_given`,
/// a name equal to the old composed name is replaced by the new one;
/// hand-written names stay.
fn recompose(
    composer: &SkuComposer,
    categories: &HashMap<Uuid, Category>,
    current: &InventoryItem,
    update: &mut ItemUpdate,
    name_given: bool,
) -> AppResult<()> {
    let category = category_of(categories, update.category_id)?;
    if !current.item_kind.supports_composition() {
        return Ok(());
    }

    let old_category = current.category_id.and_then(|id| categories.get(&id));
    let (_, old_name) = compose_for(composer, old_category, current.item_kind, &current.attributes);
    let (composition, new_name) = compose_for(composer, category, current.item_kind, &update.attributes);

    if let Some(sku) = composition.sku() {
        update.sku = Some(sku.to_string());
    }
    let auto_named = old_name.as_deref() == Some(current.name.as_str());
    if let Some(name) = new_name.filter(|_| auto_named && !name_given) {
        update.name = name;
    }
    Ok(())
}

fn clean_reason(reason: Option<String>) -> Option<String> {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

/// Normalize slugs and codes of an attribute snapshot; empty codes drop out
fn normalize_snapshot(raw: &AttributeSnapshot) -> AppResult<AttributeSnapshot> {
    let mut snapshot = AttributeSnapshot::new();
    for (slug, code) in raw {
        let code = normalize_code(code);
        if code.is_empty() {
            continue;
        }
        let slug = normalize_slug(require_text("attributes", slug)?).ok_or_else(|| {
            AppError::validation(
                "attributes",
                format!("Invalid attribute type '{}'", slug),
                format!("Недопустимый тип атрибута '{}'", slug),
            )
        })?;
        snapshot.insert(slug, code);
    }
    Ok(snapshot)
}
