//! SKU and display-name composition
//!
//! A composed SKU is the category prefix followed by one segment per
//! filled slot, joined by `-`. Clothing uses the slot order
//! brand, quality, material, color, size and then custom types in type
//! order. Other item kinds are never composed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{AttributeSnapshot, AttributeType, EffectiveValue, ItemKind};
use crate::taxonomy::{is_builtin_slug, BRAND, COLOR, MATERIAL, QUALITY, SIZE};
use crate::validation::normalize_code;

pub const SEPARATOR: &str = "-";

/// Force a manually entered segment to uppercase `[A-Z0-9-]`,
/// dropping leading and trailing separators
pub fn sanitize_segment(raw: &str) -> String {
    normalize_code(raw).trim_matches('-').to_string()
}

/// Join a prefix and codes. Empty codes are skipped; an empty prefix
/// yields no SKU.
pub fn compose(prefix: &str, codes: &[&str]) -> Option<String> {
    let prefix = sanitize_segment(prefix);
    if prefix.is_empty() {
        return None;
    }
    let mut parts = vec![prefix];
    parts.extend(
        codes
            .iter()
            .map(|c| sanitize_segment(c))
            .filter(|c| !c.is_empty()),
    );
    Some(parts.join(SEPARATOR))
}

/// One position in a composed SKU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub type_slug: String,
    pub required: bool,
}

impl Slot {
    fn new(type_slug: &str, required: bool) -> Self {
        Self {
            type_slug: type_slug.to_string(),
            required,
        }
    }
}

/// Slots for an item kind; empty when the kind is not composed
pub fn slots_for(kind: ItemKind, custom_slugs: &[String]) -> Vec<Slot> {
    if !kind.supports_composition() {
        return Vec::new();
    }
    let mut slots = vec![
        Slot::new(BRAND, false),
        Slot::new(QUALITY, true),
        Slot::new(MATERIAL, false),
        Slot::new(COLOR, true),
        Slot::new(SIZE, true),
    ];
    slots.extend(custom_slugs.iter().map(|s| Slot::new(s, false)));
    slots
}

/// Outcome of composing a SKU for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Composition {
    Composed { sku: String },
    /// The item kind never gets a composed SKU
    NotComposable,
    /// A prefix or required slot is missing; the previous SKU stays
    Incomplete { missing: Vec<String> },
}

impl Composition {
    pub fn sku(&self) -> Option<&str> {
        match self {
            Composition::Composed { sku } => Some(sku),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TypeFlags {
    show_in_sku: bool,
    show_in_name: bool,
}

/// Composer bound to a snapshot of the taxonomy
#[derive(Debug, Clone, Default)]
pub struct SkuComposer {
    types: HashMap<String, TypeFlags>,
    custom_slugs: Vec<String>,
    values: HashMap<(String, String), EffectiveValue>,
}

impl SkuComposer {
    /// `types` should already be in display order; custom slots follow it
    pub fn new(types: &[AttributeType], values: impl IntoIterator<Item = EffectiveValue>) -> Self {
        let mut custom_slugs = Vec::new();
        let mut flags = HashMap::new();
        for t in types {
            flags.insert(
                t.slug.clone(),
                TypeFlags {
                    show_in_sku: t.show_in_sku,
                    show_in_name: t.show_in_name,
                },
            );
            if !is_builtin_slug(&t.slug) && !custom_slugs.contains(&t.slug) {
                custom_slugs.push(t.slug.clone());
            }
        }
        let values = values
            .into_iter()
            .map(|v| ((v.type_slug.clone(), v.code.clone()), v))
            .collect();
        Self {
            types: flags,
            custom_slugs,
            values,
        }
    }

    pub fn custom_slugs(&self) -> &[String] {
        &self.custom_slugs
    }

    fn value(&self, slug: &str, code: &str) -> Option<&EffectiveValue> {
        self.values.get(&(slug.to_string(), code.to_string()))
    }

    fn type_flags(&self, slug: &str) -> TypeFlags {
        self.types.get(slug).copied().unwrap_or(TypeFlags {
            show_in_sku: true,
            show_in_name: true,
        })
    }

    fn visible_in_sku(&self, slug: &str, code: &str) -> bool {
        self.type_flags(slug).show_in_sku
            && self.value(slug, code).map_or(true, |v| v.meta.show_in_sku)
    }

    fn visible_in_name(&self, slug: &str, code: &str) -> bool {
        self.type_flags(slug).show_in_name
            && self.value(slug, code).map_or(true, |v| v.meta.show_in_name)
    }

    pub fn compose_sku(
        &self,
        kind: ItemKind,
        prefix: Option<&str>,
        attributes: &AttributeSnapshot,
    ) -> Composition {
        let slots = slots_for(kind, &self.custom_slugs);
        if slots.is_empty() {
            return Composition::NotComposable;
        }

        let mut missing = Vec::new();
        let prefix = prefix.map(sanitize_segment).unwrap_or_default();
        if prefix.is_empty() {
            missing.push("prefix".to_string());
        }

        let mut codes = Vec::new();
        for slot in &slots {
            let code = attributes
                .get(&slot.type_slug)
                .map(|c| sanitize_segment(c))
                .unwrap_or_default();
            if code.is_empty() {
                if slot.required {
                    missing.push(slot.type_slug.clone());
                }
                continue;
            }
            if self.visible_in_sku(&slot.type_slug, &code) {
                codes.push(code);
            }
        }

        if !missing.is_empty() {
            return Composition::Incomplete { missing };
        }
        let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
        match compose(&prefix, &refs) {
            Some(sku) => Composition::Composed { sku },
            None => Composition::Incomplete {
                missing: vec!["prefix".to_string()],
            },
        }
    }

    /// Display name: category name followed by the names of brand,
    /// quality, color, size and custom values shown in names. Unknown
    /// codes are rendered as-is. `None` for kinds that are not composed.
    pub fn compose_name(
        &self,
        kind: ItemKind,
        category_name: Option<&str>,
        attributes: &AttributeSnapshot,
    ) -> Option<String> {
        if !kind.supports_composition() {
            return None;
        }
        let mut parts: Vec<String> = Vec::new();
        if let Some(name) = category_name.map(str::trim).filter(|n| !n.is_empty()) {
            parts.push(name.to_string());
        }
        let slugs = [BRAND, QUALITY, COLOR, SIZE]
            .into_iter()
            .map(str::to_string)
            .chain(self.custom_slugs.iter().cloned());
        for slug in slugs {
            let Some(code) = attributes.get(&slug).filter(|c| !c.trim().is_empty()) else {
                continue;
            };
            if !self.visible_in_name(&slug, code) {
                continue;
            }
            let label = self
                .value(&slug, code)
                .map(|v| v.name.clone())
                .unwrap_or_else(|| code.clone());
            parts.push(label);
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}
