//! SKU composition against the live taxonomy, and bulk regeneration

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::sku::{Composition, SkuComposer};
use shared::{AttributeSnapshot, Category, InventoryItem, ItemKind, ItemRename};
use uuid::Uuid;

use super::TaxonomyService;
use crate::error::AppResult;
use crate::store::WarehouseStore;
use crate::AppState;

/// Input for a SKU preview
#[derive(Debug, Deserialize)]
pub struct PreviewInput {
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub item_kind: ItemKind,
    #[serde(default)]
    pub attributes: AttributeSnapshot,
}

/// Composed SKU and display name, not persisted
#[derive(Debug, Clone, Serialize)]
pub struct SkuPreview {
    pub composition: Composition,
    pub name: Option<String>,
}

/// Outcome of a regeneration pass
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RegenerationReport {
    pub scanned: u64,
    pub changed: u64,
    /// Items left as they were: incomplete attributes with nothing else to
    /// rename, or modified concurrently while the pass ran
    ///
    /// `changed + skipped <= scanned`; the rest were already up to date
    pub skipped: u64,
}

/// SKU service
#[derive(Clone)]
pub struct SkuService {
    store: Arc<dyn WarehouseStore>,
    taxonomy: TaxonomyService,
    chunk_size: u32,
}

impl SkuService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            taxonomy: TaxonomyService::new(state),
            chunk_size: state.config.inventory.regeneration_chunk_size.max(1),
        }
    }

    /// Composer bound to the current types, values and seed overrides
    pub async fn composer(&self) -> AppResult<SkuComposer> {
        let types = self.store.all_attribute_types().await?;
        let values = self.taxonomy.all_effective_values().await?;
        Ok(SkuComposer::new(&types, values))
    }

    pub async fn preview(&self, input: PreviewInput) -> AppResult<SkuPreview> {
        let composer = self.composer().await?;
        let category = match input.category_id {
            Some(id) => Some(self.store.get_category(id).await?),
            None => None,
        };
        let (composition, name) =
            compose_for(&composer, category.as_ref(), input.item_kind, &input.attributes);
        Ok(SkuPreview { composition, name })
    }

    /// Recompute SKUs (and display names when `include_names`) of all
    /// active composable items, one storage transaction per chunk.
    /// Running it twice in a row changes nothing the second time.
    pub async fn regenerate_all(&self, include_names: bool) -> AppResult<RegenerationReport> {
        let composer = self.composer().await?;
        let categories: HashMap<Uuid, Category> = self
            .store
            .list_categories()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut report = RegenerationReport::default();
        let mut after = None;
        loop {
            let chunk = self
                .store
                .list_composable_items_after(after, self.chunk_size)
                .await?;
            let Some(last) = chunk.last() else {
                break;
            };
            after = Some(last.id);

            let mut renames = Vec::new();
            for item in &chunk {
                report.scanned += 1;
                let category = item.category_id.and_then(|id| categories.get(&id));
                match plan_rename(&composer, category, item, include_names) {
                    Planned::Rename(rename) => renames.push(rename),
                    Planned::Unchanged => {}
                    Planned::Incomplete(Some(rename)) => renames.push(rename),
                    Planned::Incomplete(None) => report.skipped += 1,
                }
            }

            if !renames.is_empty() {
                let applied = self.store.apply_renames(&renames).await?;
                report.changed += applied;
                report.skipped += renames.len() as u64 - applied;
            }

            if chunk.len() < self.chunk_size as usize {
                break;
            }
        }

        tracing::info!(
            scanned = report.scanned,
            changed = report.changed,
            skipped = report.skipped,
            include_names,
            "SKU regeneration finished"
        );
        Ok(report)
    }
}

/// SKU and display name for an item kind, category and snapshot
pub(crate) fn compose_for(
    composer: &SkuComposer,
    category: Option<&Category>,
    kind: ItemKind,
    attributes: &AttributeSnapshot,
) -> (Composition, Option<String>) {
    let prefix = category.and_then(|c| c.prefix.as_deref());
    let category_name = category.map(|c| c.name.as_str());
    (
        composer.compose_sku(kind, prefix, attributes),
        composer.compose_name(kind, category_name, attributes),
    )
}

enum Planned {
    Unchanged,
    Rename(ItemRename),
    /// SKU kept; a name-only rename may still apply
    Incomplete(Option<ItemRename>),
}

fn plan_rename(
    composer: &SkuComposer,
    category: Option<&Category>,
    item: &InventoryItem,
    include_names: bool,
) -> Planned {
    let (composition, composed_name) = compose_for(composer, category, item.item_kind, &item.attributes);
    let name = match composed_name {
        Some(name) if include_names => name,
        _ => item.name.clone(),
    };

    let (sku, complete) = match composition {
        Composition::Composed { sku } => (Some(sku), true),
        Composition::NotComposable | Composition::Incomplete { .. } => (item.sku.clone(), false),
    };

    let rename = (sku != item.sku || name != item.name).then(|| ItemRename {
        item_id: item.id,
        expected_sku: item.sku.clone(),
        expected_name: item.name.clone(),
        sku,
        name,
    });

    match (complete, rename) {
        (false, rename) => Planned::Incomplete(rename),
        (true, Some(rename)) => Planned::Rename(rename),
        (true, None) => Planned::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::taxonomy::{COLOR, QUALITY, SIZE};
    use shared::ItemState;

    fn category(prefix: Option<&str>) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: "Футболки".to_string(),
            prefix: prefix.map(str::to_string),
            parent_id: None,
            is_system: false,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(sku: Option<&str>, attributes: &[(&str, &str)]) -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            name: "Футболка".to_string(),
            sku: sku.map(str::to_string),
            item_kind: ItemKind::Clothing,
            category_id: None,
            quantity: 0,
            unit: "шт".to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            low_stock_threshold: 0,
            critical_stock_threshold: 0,
            description: None,
            cost_price: None,
            selling_price: None,
            state: ItemState::Active,
            archived_at: None,
            archived_by: None,
            archive_reason: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_plan_rename_composes_sku() {
        let composer = SkuComposer::default();
        let cat = category(Some("TS"));
        let item = item(None, &[(QUALITY, "BS"), (COLOR, "BLK"), (SIZE, "M")]);

        match plan_rename(&composer, Some(&cat), &item, false) {
            Planned::Rename(r) => {
                assert_eq!(r.sku.as_deref(), Some("TS-BS-BLK-M"));
                assert_eq!(r.name, item.name);
                assert_eq!(r.expected_sku, None);
            }
            _ => panic!("expected a rename"),
        }
    }

    #[test]
    fn test_plan_rename_keeps_sku_when_incomplete() {
        let composer = SkuComposer::default();
        let cat = category(Some("TS"));
        let item = item(Some("OLD-1"), &[(QUALITY, "BS")]);

        assert!(matches!(
            plan_rename(&composer, Some(&cat), &item, false),
            Planned::Incomplete(None)
        ));
    }

    #[test]
    fn test_plan_rename_is_stable_once_applied() {
        let composer = SkuComposer::default();
        let cat = category(Some("TS"));
        let item = item(Some("TS-BS-BLK-M"), &[(QUALITY, "BS"), (COLOR, "BLK"), (SIZE, "M")]);

        assert!(matches!(
            plan_rename(&composer, Some(&cat), &item, false),
            Planned::Unchanged
        ));
    }
}
