//! HTTP handlers for SKU preview and regeneration

use axum::{extract::State, Json};
use serde::Deserialize;
use shared::{Action, Resource};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::sku::{PreviewInput, RegenerationReport, SkuPreview};
use crate::services::SkuService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RegenerateInput {
    /// Also recompute display names
    #[serde(default)]
    pub include_names: bool,
}

/// Compose a SKU and name without saving anything
pub async fn preview_sku(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<PreviewInput>,
) -> AppResult<Json<SkuPreview>> {
    current_user.0.require(Resource::Inventory, Action::View)?;
    let service = SkuService::new(&state);
    Ok(Json(service.preview(input).await?))
}

/// Recompute SKUs of all active composable items
pub async fn regenerate_skus(
    State(state): State<AppState>,
    current_user: CurrentUser,
    input: Option<Json<RegenerateInput>>,
) -> AppResult<Json<RegenerationReport>> {
    current_user.0.require(Resource::Inventory, Action::Edit)?;
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let service = SkuService::new(&state);
    tracing::info!(user_id = %current_user.0.user_id, "SKU regeneration requested");
    Ok(Json(service.regenerate_all(input.include_names).await?))
}
