//! Attribute types and values

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A classification axis such as `color` or `size`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeType {
    pub id: Uuid,
    /// Unique lowercase identifier, `[a-z0-9_]`
    pub slug: String,
    pub name: String,
    pub category_id: Option<Uuid>,
    pub is_system: bool,
    pub show_in_sku: bool,
    pub show_in_name: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an attribute type. The slug is already normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttributeType {
    pub slug: String,
    pub name: String,
    pub category_id: Option<Uuid>,
    pub is_system: bool,
    pub show_in_sku: bool,
    pub show_in_name: bool,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeTypeChanges {
    pub name: Option<String>,
    /// `Some(None)` moves the type to the uncategorized bucket
    pub category_id: Option<Option<Uuid>>,
    pub is_system: Option<bool>,
    pub show_in_sku: Option<bool>,
    pub show_in_name: Option<bool>,
    pub sort_order: Option<i32>,
}

impl AttributeTypeChanges {
    pub fn touches_system_flag(&self, current: bool) -> bool {
        matches!(self.is_system, Some(flag) if flag != current)
    }

    pub fn apply(self, attribute_type: &mut AttributeType) {
        if let Some(name) = self.name {
            attribute_type.name = name;
        }
        if let Some(category_id) = self.category_id {
            attribute_type.category_id = category_id;
        }
        if let Some(is_system) = self.is_system {
            attribute_type.is_system = is_system;
        }
        if let Some(show) = self.show_in_sku {
            attribute_type.show_in_sku = show;
        }
        if let Some(show) = self.show_in_name {
            attribute_type.show_in_name = show;
        }
        if let Some(sort_order) = self.sort_order {
            attribute_type.sort_order = sort_order;
        }
    }
}

/// Display and composition flags carried by every value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueMeta {
    #[serde(default = "default_true")]
    pub show_in_name: bool,
    #[serde(default = "default_true")]
    pub show_in_sku: bool,
    /// Swatch for color values, `#RRGGBB`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ValueMeta {
    fn default() -> Self {
        Self {
            show_in_name: true,
            show_in_sku: true,
            hex: None,
        }
    }
}

/// A persisted (operator-defined) attribute value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeValue {
    pub id: Uuid,
    pub type_slug: String,
    pub name: String,
    /// Normalized to `[A-Z0-9-]`
    pub code: String,
    pub meta: ValueMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttributeValue {
    pub type_slug: String,
    pub name: String,
    pub code: String,
    pub meta: ValueMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeValueChanges {
    pub name: Option<String>,
    pub code: Option<String>,
    pub show_in_name: Option<bool>,
    pub show_in_sku: Option<bool>,
    pub hex: Option<String>,
}

impl AttributeValueChanges {
    /// True when only the display flags are touched
    pub fn flags_only(&self) -> bool {
        self.name.is_none() && self.code.is_none() && self.hex.is_none()
    }

    /// An empty `hex` clears the swatch
    pub fn apply(self, value: &mut AttributeValue) {
        if let Some(name) = self.name {
            value.name = name;
        }
        if let Some(code) = self.code {
            value.code = code;
        }
        if let Some(show) = self.show_in_name {
            value.meta.show_in_name = show;
        }
        if let Some(show) = self.show_in_sku {
            value.meta.show_in_sku = show;
        }
        if let Some(hex) = self.hex {
            value.meta.hex = Some(hex).filter(|h| !h.is_empty());
        }
    }
}

/// Persisted flag toggles for a built-in value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedOverride {
    pub type_slug: String,
    pub code: String,
    pub show_in_name: bool,
    pub show_in_sku: bool,
}

/// Where an effective value comes from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueOrigin {
    Seed,
    Custom,
}

/// Identifier of an effective value.
///
/// Seed values have no row of their own, so they are addressed as
/// `seed:<type_slug>:<code>`; persisted values use their row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ValueId {
    Seed { type_slug: String, code: String },
    Custom(Uuid),
}

impl ValueId {
    pub fn origin(&self) -> ValueOrigin {
        match self {
            ValueId::Seed { .. } => ValueOrigin::Seed,
            ValueId::Custom(_) => ValueOrigin::Custom,
        }
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueId::Seed { type_slug, code } => write!(f, "seed:{}:{}", type_slug, code),
            ValueId::Custom(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for ValueId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("seed:") {
            let (type_slug, code) = rest
                .split_once(':')
                .ok_or_else(|| format!("Malformed seed value id: {}", s))?;
            if type_slug.is_empty() || code.is_empty() {
                return Err(format!("Malformed seed value id: {}", s));
            }
            return Ok(ValueId::Seed {
                type_slug: type_slug.to_string(),
                code: code.to_string(),
            });
        }
        Uuid::parse_str(s)
            .map(ValueId::Custom)
            .map_err(|_| format!("Invalid value id: {}", s))
    }
}

impl From<ValueId> for String {
    fn from(id: ValueId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ValueId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A value as seen by consumers: seed and persisted values merged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveValue {
    pub id: ValueId,
    pub type_slug: String,
    pub name: String,
    pub code: String,
    pub meta: ValueMeta,
    pub origin: ValueOrigin,
}
