//! Attribute taxonomy rules: built-in seed values, value ordering and the
//! merge of seed and persisted values into one effective set.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{AttributeValue, EffectiveValue, SeedOverride, ValueId, ValueMeta, ValueOrigin};

pub const BRAND: &str = "brand";
pub const QUALITY: &str = "quality";
pub const MATERIAL: &str = "material";
pub const COLOR: &str = "color";
pub const SIZE: &str = "size";

/// Slugs with a fixed slot in composed SKUs
pub const BUILTIN_SLUGS: [&str; 5] = [BRAND, QUALITY, MATERIAL, COLOR, SIZE];

pub fn is_builtin_slug(slug: &str) -> bool {
    BUILTIN_SLUGS.contains(&slug)
}

/// A built-in value that exists regardless of persisted data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedValue {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub hex: Option<String>,
}

impl SeedValue {
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
            hex: None,
        }
    }

    pub fn colored(name: &str, code: &str, hex: &str) -> Self {
        Self {
            hex: Some(hex.to_string()),
            ..Self::new(name, code)
        }
    }
}

/// Built-in values per type slug
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedCatalog {
    values: HashMap<String, Vec<SeedValue>>,
}

impl SeedCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The catalog shipped with the warehouse
    pub fn builtin() -> Self {
        Self::empty()
            .with(BRAND, vec![SeedValue::new("Muse Wear", "MSW")])
            .with(
                COLOR,
                vec![
                    SeedValue::colored("Белый", "WHT", "#FFFFFF"),
                    SeedValue::colored("Черный", "BLK", "#000000"),
                    SeedValue::colored("Молочный", "MILK", "#F5F5DC"),
                    SeedValue::colored("Шоколад", "CHOC", "#7B3F00"),
                    SeedValue::colored("Графит", "GRAF", "#383838"),
                    SeedValue::colored("Баблгам", "BUB", "#FFC1CC"),
                ],
            )
            .with(
                SIZE,
                vec![
                    SeedValue::new("Kids", "KDS"),
                    SeedValue::new("S", "S"),
                    SeedValue::new("M", "M"),
                    SeedValue::new("S-M", "SM"),
                    SeedValue::new("L", "L"),
                    SeedValue::new("XL", "XL"),
                ],
            )
            .with(
                MATERIAL,
                vec![
                    SeedValue::new("Кулирка", "KUL"),
                    SeedValue::new("Френч-терри", "FT"),
                ],
            )
            .with(
                QUALITY,
                vec![SeedValue::new("Base", "BS"), SeedValue::new("Premium", "PRM")],
            )
    }

    pub fn with(mut self, type_slug: &str, values: Vec<SeedValue>) -> Self {
        self.values.insert(type_slug.to_string(), values);
        self
    }

    pub fn values(&self, type_slug: &str) -> &[SeedValue] {
        self.values.get(type_slug).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, type_slug: &str, code: &str) -> Option<&SeedValue> {
        self.values(type_slug).iter().find(|v| v.code == code)
    }

    pub fn is_seed_name(&self, type_slug: &str, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.values(type_slug)
            .iter()
            .any(|v| v.name.to_lowercase() == name)
    }
}

/// Explicit per-type value order, injected from configuration.
///
/// Each entry lists lowercase value names (or codes) in display order.
/// Values that do not appear in a type's list come after the ranked ones,
/// alphabetically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueRanking {
    orders: HashMap<String, Vec<String>>,
}

impl Default for ValueRanking {
    fn default() -> Self {
        Self::empty()
            .with(SIZE, &["kids", "s", "s-m", "m", "l", "xl"])
            .with(QUALITY, &["base", "premium"])
    }
}

impl ValueRanking {
    pub fn empty() -> Self {
        Self {
            orders: HashMap::new(),
        }
    }

    pub fn from_map(orders: HashMap<String, Vec<String>>) -> Self {
        let orders = orders
            .into_iter()
            .map(|(slug, names)| (slug, names.into_iter().map(|n| n.to_lowercase()).collect()))
            .collect();
        Self { orders }
    }

    pub fn with(mut self, type_slug: &str, names: &[&str]) -> Self {
        self.orders.insert(
            type_slug.to_string(),
            names.iter().map(|n| n.to_lowercase()).collect(),
        );
        self
    }

    /// Position of a value in its type's order, matched by name then code
    pub fn rank(&self, type_slug: &str, name: &str, code: &str) -> Option<usize> {
        let order = self.orders.get(type_slug)?;
        let name = name.trim().to_lowercase();
        let code = code.trim().to_lowercase();
        order
            .iter()
            .position(|n| *n == name)
            .or_else(|| order.iter().position(|n| *n == code))
    }

    pub fn compare(&self, type_slug: &str, a: &EffectiveValue, b: &EffectiveValue) -> Ordering {
        let ra = self.rank(type_slug, &a.name, &a.code);
        let rb = self.rank(type_slug, &b.name, &b.code);
        match (ra, rb) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a
                .name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.code.cmp(&b.code)),
        }
    }

    pub fn sort(&self, type_slug: &str, values: &mut [EffectiveValue]) {
        values.sort_by(|a, b| self.compare(type_slug, a, b));
    }
}

/// Merge built-in and persisted values for one type.
///
/// Seed values come first with any flag overrides applied. Persisted
/// values whose name (case-insensitive) matches a seed value or an
/// earlier persisted value are dropped.
pub fn merge_values(
    type_slug: &str,
    seeds: &[SeedValue],
    overrides: &[SeedOverride],
    persisted: Vec<AttributeValue>,
) -> Vec<EffectiveValue> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(seeds.len() + persisted.len());

    for seed in seeds {
        if !seen.insert(seed.name.to_lowercase()) {
            continue;
        }
        let mut meta = ValueMeta {
            hex: seed.hex.clone(),
            ..ValueMeta::default()
        };
        if let Some(o) = overrides
            .iter()
            .find(|o| o.type_slug == type_slug && o.code == seed.code)
        {
            meta.show_in_name = o.show_in_name;
            meta.show_in_sku = o.show_in_sku;
        }
        merged.push(EffectiveValue {
            id: ValueId::Seed {
                type_slug: type_slug.to_string(),
                code: seed.code.clone(),
            },
            type_slug: type_slug.to_string(),
            name: seed.name.clone(),
            code: seed.code.clone(),
            meta,
            origin: ValueOrigin::Seed,
        });
    }

    for value in persisted.into_iter().filter(|v| v.type_slug == type_slug) {
        if !seen.insert(value.name.trim().to_lowercase()) {
            continue;
        }
        merged.push(EffectiveValue {
            id: ValueId::Custom(value.id),
            type_slug: value.type_slug,
            name: value.name,
            code: value.code,
            meta: value.meta,
            origin: ValueOrigin::Custom,
        });
    }

    merged
}

/// True if another value in `values` already uses `code`
pub fn code_in_use(values: &[EffectiveValue], code: &str, except: Option<&ValueId>) -> bool {
    values
        .iter()
        .any(|v| v.code == code && Some(&v.id) != except)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn persisted(slug: &str, name: &str, code: &str) -> AttributeValue {
        AttributeValue {
            id: Uuid::new_v4(),
            type_slug: slug.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            meta: ValueMeta::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn names(values: &[EffectiveValue]) -> Vec<&str> {
        values.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_size_ordering_ignores_insertion_order() {
        let values: Vec<_> = ["L", "XL", "S", "M", "Kids"]
            .iter()
            .map(|n| persisted(SIZE, n, n))
            .collect();
        let mut merged = merge_values(SIZE, &[], &[], values);
        ValueRanking::default().sort(SIZE, &mut merged);
        assert_eq!(names(&merged), vec!["Kids", "S", "M", "L", "XL"]);
    }

    #[test]
    fn test_unranked_values_follow_ranked_alphabetically() {
        let values = vec![
            persisted(SIZE, "XXL", "XXL"),
            persisted(SIZE, "3XL", "3XL"),
            persisted(SIZE, "m", "M"),
        ];
        let mut merged = merge_values(SIZE, &[], &[], values);
        ValueRanking::default().sort(SIZE, &mut merged);
        assert_eq!(names(&merged), vec!["m", "3XL", "XXL"]);
    }

    #[test]
    fn test_quality_and_unordered_types() {
        let ranking = ValueRanking::default();
        let mut quality = merge_values(
            QUALITY,
            &[],
            &[],
            vec![persisted(QUALITY, "Premium", "PRM"), persisted(QUALITY, "Base", "BS")],
        );
        ranking.sort(QUALITY, &mut quality);
        assert_eq!(names(&quality), vec!["Base", "Premium"]);

        let mut fits = merge_values(
            "fit",
            &[],
            &[],
            vec![persisted("fit", "Relaxed", "RLX"), persisted("fit", "Boxy", "BOX")],
        );
        ranking.sort("fit", &mut fits);
        assert_eq!(names(&fits), vec!["Boxy", "Relaxed"]);
    }

    #[test]
    fn test_merge_dedupes_by_name_seed_wins() {
        let catalog = SeedCatalog::builtin();
        let merged = merge_values(
            COLOR,
            catalog.values(COLOR),
            &[],
            vec![
                persisted(COLOR, "черный", "BLACK"),
                persisted(COLOR, "Оливковый", "OLV"),
                persisted(COLOR, "оливковый", "OLV2"),
            ],
        );
        assert_eq!(merged.len(), 7);
        let black: Vec<_> = merged
            .iter()
            .filter(|v| v.name.to_lowercase() == "черный")
            .collect();
        assert_eq!(black.len(), 1);
        assert_eq!(black[0].origin, ValueOrigin::Seed);
        assert_eq!(black[0].code, "BLK");
        assert_eq!(merged.last().map(|v| v.code.as_str()), Some("OLV"));
    }

    #[test]
    fn test_overrides_toggle_seed_flags() {
        let catalog = SeedCatalog::builtin();
        let overrides = vec![SeedOverride {
            type_slug: BRAND.to_string(),
            code: "MSW".to_string(),
            show_in_name: false,
            show_in_sku: true,
        }];
        let merged = merge_values(BRAND, catalog.values(BRAND), &overrides, vec![]);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].meta.show_in_name);
        assert!(merged[0].meta.show_in_sku);
    }

    #[test]
    fn test_seed_colors_carry_hex() {
        let catalog = SeedCatalog::builtin();
        let merged = merge_values(COLOR, catalog.values(COLOR), &[], vec![]);
        assert!(merged.iter().all(|v| v.meta.hex.is_some()));
    }

    #[test]
    fn test_empty_catalog_has_no_values() {
        let catalog = SeedCatalog::empty();
        assert!(catalog.values(SIZE).is_empty());
        assert!(catalog.find(SIZE, "KDS").is_none());
        assert!(SeedCatalog::builtin().find(SIZE, "KDS").is_some());
    }

    #[test]
    fn test_code_in_use() {
        let merged = merge_values(
            COLOR,
            SeedCatalog::builtin().values(COLOR),
            &[],
            vec![],
        );
        assert!(code_in_use(&merged, "BLK", None));
        assert!(!code_in_use(&merged, "OLV", None));
        let own = merged[1].id.clone();
        assert!(!code_in_use(&merged, "BLK", Some(&own)));
    }

    #[test]
    fn test_ranking_from_config_map() {
        let mut map = HashMap::new();
        map.insert("volume".to_string(), vec!["250ML".to_string(), "1L".to_string()]);
        let ranking = ValueRanking::from_map(map);
        assert_eq!(ranking.rank("volume", "1 литр", "1L"), Some(1));
        assert_eq!(ranking.rank("volume", "x", "250ml"), Some(0));
        assert_eq!(ranking.rank(SIZE, "S", "S"), None);
    }
}
