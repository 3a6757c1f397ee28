//! WebAssembly module for the warehouse engine
//!
//! Provides client-side computation for:
//! - SKU and display-name previews while an item form is filled in
//! - Code and slug normalization as the operator types
//! - Stock status badges

use serde::{Deserialize, Serialize};
use shared::sku::{sanitize_segment, Composition, SkuComposer};
use shared::validation::{derive_slug, normalize_code};
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::log_1(&JsValue::from_str("warehouse-engine wasm loaded"));
}

/// Everything the browser already holds when previewing a SKU
#[derive(Debug, Deserialize)]
struct PreviewRequest {
    #[serde(default)]
    item_kind: ItemKind,
    prefix: Option<String>,
    category_name: Option<String>,
    #[serde(default)]
    attributes: AttributeSnapshot,
    /// Attribute types in display order
    #[serde(default)]
    types: Vec<AttributeType>,
    #[serde(default)]
    values: Vec<EffectiveValue>,
}

#[derive(Debug, Serialize)]
struct PreviewResponse {
    composition: Composition,
    name: Option<String>,
}

fn preview(request_json: &str) -> Result<String, String> {
    let request: PreviewRequest =
        serde_json::from_str(request_json).map_err(|e| format!("Invalid preview JSON: {}", e))?;
    let composer = SkuComposer::new(&request.types, request.values);
    let response = PreviewResponse {
        composition: composer.compose_sku(
            request.item_kind,
            request.prefix.as_deref(),
            &request.attributes,
        ),
        name: composer.compose_name(
            request.item_kind,
            request.category_name.as_deref(),
            &request.attributes,
        ),
    };
    serde_json::to_string(&response).map_err(|e| e.to_string())
}

/// Compose a SKU and display name; returns `{composition, name}` as JSON
#[wasm_bindgen]
pub fn preview_sku(request_json: &str) -> Result<String, JsValue> {
    preview(request_json).map_err(|e| js_sys::Error::new(&e).into())
}

/// Force a manually entered SKU segment to `[A-Z0-9-]`
#[wasm_bindgen]
pub fn sanitize_sku_segment(raw: &str) -> String {
    sanitize_segment(raw)
}

/// Normalize an attribute value code
#[wasm_bindgen]
pub fn normalize_attribute_code(raw: &str) -> String {
    normalize_code(raw)
}

/// Suggested slug for an attribute type name; empty when none can be derived
#[wasm_bindgen]
pub fn derive_attribute_slug(name: &str) -> String {
    derive_slug(name).unwrap_or_default()
}

/// `ok`, `low` or `critical`
#[wasm_bindgen]
pub fn stock_status(quantity: i32, low_threshold: i32, critical_threshold: i32) -> String {
    shared::evaluate_stock_status(quantity, low_threshold, critical_threshold)
        .as_str()
        .to_string()
}
