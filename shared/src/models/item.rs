//! Inventory items

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Denormalized attribute selection: type slug -> value code
pub type AttributeSnapshot = BTreeMap<String, String>;

/// Kind of item; decides whether the SKU is composed or free-form
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Clothing,
    Packaging,
    Consumables,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Clothing => "clothing",
            ItemKind::Packaging => "packaging",
            ItemKind::Consumables => "consumables",
        }
    }

    pub fn supports_composition(&self) -> bool {
        matches!(self, ItemKind::Clothing)
    }
}

impl FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clothing" => Ok(ItemKind::Clothing),
            "packaging" => Ok(ItemKind::Packaging),
            "consumables" => Ok(ItemKind::Consumables),
            other => Err(DomainError::validation(
                "item_kind",
                format!("Unknown item kind: {}", other),
            )),
        }
    }
}

/// Lifecycle state. `Deleted` is terminal and never stored: deleted items
/// are removed, only their ledger rows remain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    Active,
    Archived,
    Deleted,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Active => "active",
            ItemState::Archived => "archived",
            ItemState::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub item_kind: ItemKind,
    pub category_id: Option<Uuid>,
    pub quantity: i32,
    pub unit: String,
    pub attributes: AttributeSnapshot,
    pub low_stock_threshold: i32,
    pub critical_stock_threshold: i32,
    pub description: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub state: ItemState,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<Uuid>,
    pub archive_reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn is_active(&self) -> bool {
        self.state == ItemState::Active
    }
}

/// A fully validated item ready to be written together with its opening
/// ledger row. `quantity` is the initial stock.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub sku: Option<String>,
    pub item_kind: ItemKind,
    pub category_id: Option<Uuid>,
    pub quantity: i32,
    pub unit: String,
    pub attributes: AttributeSnapshot,
    pub low_stock_threshold: i32,
    pub critical_stock_threshold: i32,
    pub description: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub created_by: Uuid,
}

/// Editable fields of an item, fully resolved. Quantity and lifecycle
/// state are not part of an edit.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub name: String,
    pub sku: Option<String>,
    pub category_id: Option<Uuid>,
    pub unit: String,
    pub attributes: AttributeSnapshot,
    pub low_stock_threshold: i32,
    pub critical_stock_threshold: i32,
    pub description: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
}

impl ItemUpdate {
    /// The item's current editable fields
    pub fn from_item(item: &InventoryItem) -> Self {
        Self {
            name: item.name.clone(),
            sku: item.sku.clone(),
            category_id: item.category_id,
            unit: item.unit.clone(),
            attributes: item.attributes.clone(),
            low_stock_threshold: item.low_stock_threshold,
            critical_stock_threshold: item.critical_stock_threshold,
            description: item.description.clone(),
            cost_price: item.cost_price,
            selling_price: item.selling_price,
        }
    }

    pub fn apply(self, item: &mut InventoryItem) {
        item.name = self.name;
        item.sku = self.sku;
        item.category_id = self.category_id;
        item.unit = self.unit;
        item.attributes = self.attributes;
        item.low_stock_threshold = self.low_stock_threshold;
        item.critical_stock_threshold = self.critical_stock_threshold;
        item.description = self.description;
        item.cost_price = self.cost_price;
        item.selling_price = self.selling_price;
    }
}

/// Compare-and-swap rename produced by SKU regeneration. Applied only
/// if the item still carries `expected_sku` and `expected_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRename {
    pub item_id: Uuid,
    pub expected_sku: Option<String>,
    pub expected_name: String,
    pub sku: Option<String>,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_clothing_is_composed() {
        assert!(ItemKind::Clothing.supports_composition());
        assert!(!ItemKind::Packaging.supports_composition());
        assert!(!ItemKind::Consumables.supports_composition());
    }

    #[test]
    fn test_item_update_leaves_quantity_and_state() {
        let now = Utc::now();
        let mut item = InventoryItem {
            id: Uuid::new_v4(),
            name: "Коробка".to_string(),
            sku: None,
            item_kind: ItemKind::Packaging,
            category_id: None,
            quantity: 12,
            unit: "шт".to_string(),
            attributes: AttributeSnapshot::new(),
            low_stock_threshold: 5,
            critical_stock_threshold: 0,
            description: None,
            cost_price: None,
            selling_price: None,
            state: ItemState::Active,
            archived_at: None,
            archived_by: None,
            archive_reason: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        let mut update = ItemUpdate::from_item(&item);
        update.name = "Коробка большая".to_string();
        update.low_stock_threshold = 20;
        update.apply(&mut item);

        assert_eq!(item.name, "Коробка большая");
        assert_eq!(item.low_stock_threshold, 20);
        assert_eq!(item.quantity, 12);
        assert!(item.is_active());
    }

    #[test]
    fn test_item_kind_parsing() {
        assert_eq!("packaging".parse::<ItemKind>().unwrap(), ItemKind::Packaging);
        assert!("furniture".parse::<ItemKind>().is_err());
    }
}
