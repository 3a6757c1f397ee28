//! HTTP handlers for items, stock movements and the item lifecycle

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::ledger::ReconcileReport;
use shared::{Action, ItemKind, ItemState, PaginatedResponse, Pagination, Resource, StockStatus};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::ledger::{
    AdjustQuantityInput, CreateItemInput, CreatedItem, EditedItem, ItemView, MoveItemsInput,
    MovementView, ReconcileSummary, SetQuantityInput, UpdateItemInput,
};
use crate::services::lifecycle::{
    ArchiveInput, ArchiveStaleInput, BatchResult, DeleteInput, DeleteResult, RestoreInput,
};
use crate::services::{Actor, LifecycleService, StockLedgerService};
use crate::store::ItemFilter;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    pub state: Option<ItemState>,
    pub category_id: Option<Uuid>,
    pub uncategorized: Option<bool>,
    pub item_kind: Option<ItemKind>,
    pub status: Option<StockStatus>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<ListItemsQuery> for ItemFilter {
    fn from(query: ListItemsQuery) -> Self {
        let defaults = Pagination::default();
        ItemFilter {
            state: query.state,
            category_id: query.category_id,
            uncategorized: query.uncategorized.unwrap_or(false),
            item_kind: query.item_kind,
            status: query.status,
            search: query.search,
            pagination: Pagination {
                page: query.page.unwrap_or(defaults.page),
                per_page: query.per_page.unwrap_or(defaults.per_page),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SkuLookupQuery {
    pub sku: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>, // "json" or "csv"
}

#[derive(Debug, Serialize)]
pub struct ArchiveStaleResponse {
    pub archived: u64,
}

// ============================================================================
// Items
// ============================================================================

/// List items
pub async fn list_items(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListItemsQuery>,
) -> AppResult<Json<PaginatedResponse<ItemView>>> {
    current_user.0.require(Resource::Inventory, Action::View)?;
    let service = StockLedgerService::new(&state);
    let filter = ItemFilter::from(query);
    Ok(Json(service.list_items(&filter).await?))
}

/// Get one item
pub async fn get_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ItemView>> {
    current_user.0.require(Resource::Inventory, Action::View)?;
    let service = StockLedgerService::new(&state);
    Ok(Json(service.get_item(id).await?))
}

/// Items carrying a SKU
pub async fn find_by_sku(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<SkuLookupQuery>,
) -> AppResult<Json<Vec<ItemView>>> {
    current_user.0.require(Resource::Inventory, Action::View)?;
    let service = StockLedgerService::new(&state);
    Ok(Json(service.find_by_sku(&query.sku).await?))
}

/// Create an item with its opening stock
pub async fn create_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateItemInput>,
) -> AppResult<(StatusCode, Json<CreatedItem>)> {
    current_user.0.require(Resource::Inventory, Action::Edit)?;
    let service = StockLedgerService::new(&state);
    let created = service
        .create_item(Actor::from(&current_user.0), input)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Edit an item; quantity changes go through `/adjust`
pub async fn update_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<Json<EditedItem>> {
    current_user.0.require(Resource::Inventory, Action::Edit)?;
    let service = StockLedgerService::new(&state);
    let edited = service
        .update_item(Actor::from(&current_user.0), id, input)
        .await?;
    Ok(Json(edited))
}

/// Move a batch of items to a category
pub async fn move_items(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<MoveItemsInput>,
) -> AppResult<Json<BatchResult>> {
    current_user.0.require(Resource::Inventory, Action::Edit)?;
    let service = StockLedgerService::new(&state);
    Ok(Json(
        service
            .move_to_category(Actor::from(&current_user.0), input)
            .await?,
    ))
}

// ============================================================================
// Stock ledger
// ============================================================================

/// Record a stock movement
pub async fn adjust_quantity(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<AdjustQuantityInput>,
) -> AppResult<Json<MovementView>> {
    current_user.0.require(Resource::Inventory, Action::Edit)?;
    let service = StockLedgerService::new(&state);
    let movement = service
        .adjust_quantity(Actor::from(&current_user.0), id, input)
        .await?;
    Ok(Json(movement))
}

/// Set an absolute quantity
pub async fn set_quantity(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SetQuantityInput>,
) -> AppResult<Json<MovementView>> {
    current_user.0.require(Resource::Inventory, Action::Edit)?;
    let service = StockLedgerService::new(&state);
    let movement = service
        .set_quantity(Actor::from(&current_user.0), id, input)
        .await?;
    Ok(Json(movement))
}

/// Ledger rows of an item, newest first; `?format=csv` for a download
pub async fn list_transactions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Inventory, Action::View)?;
    let service = StockLedgerService::new(&state);

    if query.format.as_deref() == Some("csv") {
        let csv = service.export_transactions_csv(id).await?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"stock_transactions.csv\"",
                ),
            ],
            csv,
        )
            .into_response())
    } else {
        Ok(Json(service.list_transactions(id).await?).into_response())
    }
}

/// Compare an item's cached quantity with its ledger
pub async fn reconcile_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReconcileReport>> {
    current_user.0.require(Resource::Inventory, Action::View)?;
    let service = StockLedgerService::new(&state);
    Ok(Json(service.reconcile(id).await?))
}

/// Reconcile every item
pub async fn reconcile_all(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ReconcileSummary>> {
    current_user.0.require(Resource::Inventory, Action::View)?;
    let service = StockLedgerService::new(&state);
    Ok(Json(service.reconcile_all().await?))
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Archive a batch of items
pub async fn archive_items(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ArchiveInput>,
) -> AppResult<Json<BatchResult>> {
    current_user.0.require(Resource::Inventory, Action::Edit)?;
    let service = LifecycleService::new(&state);
    Ok(Json(service.archive(Actor::from(&current_user.0), input).await?))
}

/// Restore a batch of archived items
pub async fn restore_items(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RestoreInput>,
) -> AppResult<Json<BatchResult>> {
    current_user.0.require(Resource::Inventory, Action::Edit)?;
    let service = LifecycleService::new(&state);
    Ok(Json(service.restore(Actor::from(&current_user.0), input).await?))
}

/// Irreversibly delete a batch of items after password confirmation
pub async fn delete_items(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<DeleteInput>,
) -> AppResult<Json<DeleteResult>> {
    current_user.0.require(Resource::Inventory, Action::Delete)?;
    let service = LifecycleService::new(&state);
    Ok(Json(service.delete(Actor::from(&current_user.0), input).await?))
}

/// Archive stale zero-stock items
pub async fn archive_stale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    input: Option<Json<ArchiveStaleInput>>,
) -> AppResult<Json<ArchiveStaleResponse>> {
    current_user.0.require(Resource::Inventory, Action::Edit)?;
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let service = LifecycleService::new(&state);
    let archived = service
        .auto_archive_stale(Actor::from(&current_user.0), input)
        .await?;
    Ok(Json(ArchiveStaleResponse { archived }))
}
