//! Attribute taxonomy: categories, attribute types and their values
//!
//! Values are the merge of the built-in seed catalog and operator-defined
//! rows. Seed values cannot be renamed or deleted; their display flags are
//! persisted as overrides.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::taxonomy::{code_in_use, merge_values, SeedCatalog, ValueRanking};
use shared::{
    derive_slug, normalize_slug, require_code, require_text, validate_hex, AttributeType,
    AttributeTypeChanges, AttributeValue, AttributeValueChanges, Category, CategoryChanges,
    EffectiveValue, NewAttributeType, NewAttributeValue, NewCategory, SeedOverride, ValueId,
    ValueMeta, ValueOrigin,
};
use uuid::Uuid;
use validator::Validate;

use super::{require_password, Actor};
use crate::audit::{AuditEvent, AuditSink};
use crate::error::{AppError, AppResult};
use crate::services::auth::CredentialVerifier;
use crate::store::{CategoryRemoval, Reauth, WarehouseStore};
use crate::AppState;

/// Input for creating a category
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 100, message = "Category name is required"))]
    pub name: String,
    pub prefix: Option<String>,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub sort_order: i32,
}

/// Input for creating an attribute type
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAttributeTypeInput {
    #[validate(length(max = 100, message = "Name is too long"))]
    pub name: String,
    /// Derived from the name when absent
    pub slug: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default = "default_true")]
    pub show_in_sku: bool,
    #[serde(default = "default_true")]
    pub show_in_name: bool,
    pub sort_order: Option<i32>,
}

fn default_true() -> bool {
    true
}

/// Partial update of an attribute type
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAttributeTypeInput {
    pub name: Option<String>,
    pub category_id: Option<Uuid>,
    /// Move the type to the uncategorized set; wins over `category_id`
    #[serde(default)]
    pub uncategorize: bool,
    pub is_system: Option<bool>,
    pub show_in_sku: Option<bool>,
    pub show_in_name: Option<bool>,
    pub sort_order: Option<i32>,
}

impl From<UpdateAttributeTypeInput> for AttributeTypeChanges {
    fn from(input: UpdateAttributeTypeInput) -> Self {
        let category_id = if input.uncategorize {
            Some(None)
        } else {
            input.category_id.map(Some)
        };
        AttributeTypeChanges {
            name: input.name,
            category_id,
            is_system: input.is_system,
            show_in_sku: input.show_in_sku,
            show_in_name: input.show_in_name,
            sort_order: input.sort_order,
        }
    }
}

/// Input for creating an attribute value
#[derive(Debug, Deserialize)]
pub struct CreateAttributeValueInput {
    pub name: String,
    pub code: String,
    #[serde(default = "default_true")]
    pub show_in_name: bool,
    #[serde(default = "default_true")]
    pub show_in_sku: bool,
    pub hex: Option<String>,
}

/// A value together with whether its code collides with a sibling
#[derive(Debug, Clone, Serialize)]
pub struct ValueWithWarning {
    #[serde(flatten)]
    pub value: EffectiveValue,
    /// Another value of the same type already uses this code
    pub duplicate_code: bool,
}

/// Result of updating a value
#[derive(Debug, Clone, Serialize)]
pub struct UpdatedValue {
    #[serde(flatten)]
    pub value: EffectiveValue,
    pub duplicate_code: bool,
    /// Items whose attribute snapshot now carries the new code
    pub items_rewritten: u64,
}

/// Taxonomy service
#[derive(Clone)]
pub struct TaxonomyService {
    store: Arc<dyn WarehouseStore>,
    audit: Arc<dyn AuditSink>,
    verifier: Arc<dyn CredentialVerifier>,
    seeds: Arc<SeedCatalog>,
    ranking: Arc<ValueRanking>,
}

impl TaxonomyService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            audit: state.audit.clone(),
            verifier: state.verifier.clone(),
            seeds: state.seeds.clone(),
            ranking: state.ranking.clone(),
        }
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.store.list_categories().await
    }

    pub async fn create_category(&self, actor: Actor, input: CreateCategoryInput) -> AppResult<Category> {
        input.validate()?;
        let name = require_text("name", &input.name)?.to_string();

        if let Some(parent_id) = input.parent_id {
            let parent = self.store.get_category(parent_id).await?;
            if !parent.is_root() {
                return Err(AppError::validation(
                    "parent_id",
                    "Categories can only be nested one level deep",
                    "Допускается только один уровень вложенности категорий",
                ));
            }
        }

        let category = self
            .store
            .insert_category(NewCategory {
                name,
                prefix: clean_prefix(input.prefix.as_deref()),
                parent_id: input.parent_id,
                is_system: false,
                sort_order: input.sort_order,
            })
            .await?;

        self.audit.record(
            AuditEvent::new(actor.id, "category.create", "category", category.id).after(&category),
        );
        Ok(category)
    }

    pub async fn update_category(
        &self,
        actor: Actor,
        id: Uuid,
        mut changes: CategoryChanges,
    ) -> AppResult<Category> {
        if let Some(name) = &changes.name {
            changes.name = Some(require_text("name", name)?.to_string());
        }
        if let Some(prefix) = &changes.prefix {
            changes.prefix = Some(clean_prefix(Some(prefix)).unwrap_or_default());
        }

        let updated = self.store.update_category(id, changes).await?;
        self.audit.record(
            AuditEvent::new(actor.id, "category.update", "category", id)
                .before(&updated.before)
                .after(&updated.after),
        );
        Ok(updated.after)
    }

    /// Deletes a category without subcategories or attribute types of its
    /// own. Its items stay, uncategorized. A system category needs an
    /// admin and the actor's password.
    pub async fn delete_category(
        &self,
        actor: Actor,
        id: Uuid,
        password: Option<&str>,
    ) -> AppResult<CategoryRemoval> {
        let existing = self.store.get_category(id).await?;
        let reauth = if existing.is_system {
            actor.require_privileged()?;
            Some(Reauth {
                actor_id: actor.id,
                password: require_password(password)?,
                verifier: self.verifier.as_ref(),
            })
        } else {
            None
        };

        let removal = self.store.delete_category(id, reauth).await?;
        tracing::info!(
            name = %removal.category.name,
            items_detached = removal.items_detached,
            "Category deleted"
        );
        self.audit.record(
            AuditEvent::new(actor.id, "category.delete", "category", id).before(&removal.category),
        );
        Ok(removal)
    }

    // ========================================================================
    // Attribute types
    // ========================================================================

    /// Types of a category, or the uncategorized types for `None`
    pub async fn list_attribute_types(&self, category_id: Option<Uuid>) -> AppResult<Vec<AttributeType>> {
        self.store.list_attribute_types(category_id).await
    }

    pub async fn create_attribute_type(
        &self,
        actor: Actor,
        input: CreateAttributeTypeInput,
    ) -> AppResult<AttributeType> {
        input.validate()?;
        let name = require_text("name", &input.name)?.to_string();

        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => normalize_slug(raw),
            None => derive_slug(&name),
        }
        .ok_or_else(|| {
            AppError::validation(
                "slug",
                "Slug must contain latin letters, digits or underscores",
                "Код типа должен содержать латинские буквы, цифры или подчеркивания",
            )
        })?;

        if input.is_system {
            actor.require_privileged()?;
        }
        if let Some(category_id) = input.category_id {
            self.store.get_category(category_id).await?;
        }

        let sort_order = match input.sort_order {
            Some(order) => order,
            None => self.store.all_attribute_types().await?.len() as i32,
        };

        let created = self
            .store
            .insert_attribute_type(NewAttributeType {
                slug,
                name,
                category_id: input.category_id,
                is_system: input.is_system,
                show_in_sku: input.show_in_sku,
                show_in_name: input.show_in_name,
                sort_order,
            })
            .await?;

        tracing::info!(slug = %created.slug, "Attribute type created");
        self.audit.record(
            AuditEvent::new(actor.id, "attribute_type.create", "attribute_type", created.id)
                .after(&created),
        );
        Ok(created)
    }

    /// Changing `is_system` in either direction needs a privileged actor
    pub async fn update_attribute_type(
        &self,
        actor: Actor,
        id: Uuid,
        mut changes: AttributeTypeChanges,
    ) -> AppResult<AttributeType> {
        let existing = self.store.get_attribute_type(id).await?;
        if changes.touches_system_flag(existing.is_system) {
            actor.require_privileged()?;
        }
        if let Some(name) = &changes.name {
            changes.name = Some(require_text("name", name)?.to_string());
        }
        if let Some(Some(category_id)) = changes.category_id {
            self.store.get_category(category_id).await?;
        }

        let updated = self.store.update_attribute_type(id, changes).await?;
        self.audit.record(
            AuditEvent::new(actor.id, "attribute_type.update", "attribute_type", id)
                .before(&updated.before)
                .after(&updated.after),
        );
        Ok(updated.after)
    }

    /// Deleting a system type needs a privileged actor and their password
    pub async fn delete_attribute_type(
        &self,
        actor: Actor,
        id: Uuid,
        password: Option<&str>,
    ) -> AppResult<()> {
        let existing = self.store.get_attribute_type(id).await?;
        let reauth = if existing.is_system {
            actor.require_privileged()?;
            Some(Reauth {
                actor_id: actor.id,
                password: require_password(password)?,
                verifier: self.verifier.as_ref(),
            })
        } else {
            None
        };

        let deleted = self.store.delete_attribute_type(id, reauth).await?;
        tracing::info!(slug = %deleted.slug, "Attribute type deleted");
        self.audit.record(
            AuditEvent::new(actor.id, "attribute_type.delete", "attribute_type", id).before(&deleted),
        );
        Ok(())
    }

    // ========================================================================
    // Attribute values
    // ========================================================================

    /// Seed and persisted values of a type in display order
    pub async fn list_attribute_values(&self, type_slug: &str) -> AppResult<Vec<EffectiveValue>> {
        self.require_type(type_slug).await?;
        let mut values = self.effective_values(type_slug).await?;
        self.ranking.sort(type_slug, &mut values);
        Ok(values)
    }

    /// Effective values of every type, for SKU composition
    pub async fn all_effective_values(&self) -> AppResult<Vec<EffectiveValue>> {
        let types = self.store.all_attribute_types().await?;
        let persisted = self.store.all_attribute_values().await?;
        let overrides = self.store.list_seed_overrides().await?;

        let mut values = Vec::new();
        for t in &types {
            let own: Vec<AttributeValue> = persisted
                .iter()
                .filter(|v| v.type_slug == t.slug)
                .cloned()
                .collect();
            values.extend(merge_values(&t.slug, self.seeds.values(&t.slug), &overrides, own));
        }
        Ok(values)
    }

    /// Creates a persisted value. Duplicate codes are allowed and reported.
    pub async fn create_attribute_value(
        &self,
        actor: Actor,
        type_slug: &str,
        input: CreateAttributeValueInput,
    ) -> AppResult<ValueWithWarning> {
        self.require_type(type_slug).await?;
        let name = require_text("name", &input.name)?.to_string();
        let code = require_code("code", &input.code)?;
        let hex = clean_hex(input.hex.as_deref())?;

        let existing = self.effective_values(type_slug).await?;
        ensure_name_free(&existing, &name, None)?;
        let duplicate_code = code_in_use(&existing, &code, None);

        let created = self
            .store
            .insert_attribute_value(NewAttributeValue {
                type_slug: type_slug.to_string(),
                name,
                code,
                meta: ValueMeta {
                    show_in_name: input.show_in_name,
                    show_in_sku: input.show_in_sku,
                    hex,
                },
            })
            .await?;

        if duplicate_code {
            tracing::warn!(type_slug, code = %created.code, "Attribute value code is not unique");
        }
        self.audit.record(
            AuditEvent::new(actor.id, "attribute_value.create", "attribute_value", created.id)
                .after(&created),
        );
        Ok(ValueWithWarning {
            value: custom_effective(created),
            duplicate_code,
        })
    }

    /// Seed values accept flag changes only. A code change on a persisted
    /// value rewrites the snapshots of the items that carry the old code.
    pub async fn update_attribute_value(
        &self,
        actor: Actor,
        id: &ValueId,
        changes: AttributeValueChanges,
    ) -> AppResult<UpdatedValue> {
        match id {
            ValueId::Seed { type_slug, code } => {
                self.update_seed_flags(actor, type_slug, code, changes).await
            }
            ValueId::Custom(value_id) => self.update_custom_value(actor, *value_id, changes).await,
        }
    }

    /// Seed values cannot be deleted. Values of a system type need a
    /// privileged actor and their password.
    pub async fn delete_attribute_value(
        &self,
        actor: Actor,
        id: &ValueId,
        password: Option<&str>,
    ) -> AppResult<()> {
        let value_id = match id {
            ValueId::Seed { .. } => return Err(seed_locked()),
            ValueId::Custom(value_id) => *value_id,
        };

        let value = self.store.get_attribute_value(value_id).await?;
        let type_is_system = self
            .store
            .find_attribute_type(&value.type_slug)
            .await?
            .is_some_and(|t| t.is_system);
        let reauth = if type_is_system {
            actor.require_privileged()?;
            Some(Reauth {
                actor_id: actor.id,
                password: require_password(password)?,
                verifier: self.verifier.as_ref(),
            })
        } else {
            None
        };

        let deleted = self.store.delete_attribute_value(value_id, reauth).await?;
        self.audit.record(
            AuditEvent::new(actor.id, "attribute_value.delete", "attribute_value", value_id)
                .before(&deleted),
        );
        Ok(())
    }

    async fn update_seed_flags(
        &self,
        actor: Actor,
        type_slug: &str,
        code: &str,
        changes: AttributeValueChanges,
    ) -> AppResult<UpdatedValue> {
        if !changes.flags_only() {
            return Err(seed_locked());
        }
        if self.seeds.find(type_slug, code).is_none() {
            return Err(AppError::NotFound("Attribute value".to_string()));
        }

        let id = ValueId::Seed {
            type_slug: type_slug.to_string(),
            code: code.to_string(),
        };
        let before = self
            .effective_values(type_slug)
            .await?
            .into_iter()
            .find(|v| v.id == id)
            .ok_or_else(|| AppError::NotFound("Attribute value".to_string()))?;

        let seed_override = self
            .store
            .upsert_seed_override(SeedOverride {
                type_slug: type_slug.to_string(),
                code: code.to_string(),
                show_in_name: changes.show_in_name.unwrap_or(before.meta.show_in_name),
                show_in_sku: changes.show_in_sku.unwrap_or(before.meta.show_in_sku),
            })
            .await?;

        let mut after = before.clone();
        after.meta.show_in_name = seed_override.show_in_name;
        after.meta.show_in_sku = seed_override.show_in_sku;

        self.audit.record(
            AuditEvent::new(actor.id, "attribute_value.update", "attribute_value", &id)
                .before(&before)
                .after(&after),
        );
        Ok(UpdatedValue {
            value: after,
            duplicate_code: false,
            items_rewritten: 0,
        })
    }

    async fn update_custom_value(
        &self,
        actor: Actor,
        value_id: Uuid,
        mut changes: AttributeValueChanges,
    ) -> AppResult<UpdatedValue> {
        let current = self.store.get_attribute_value(value_id).await?;

        if let Some(name) = &changes.name {
            changes.name = Some(require_text("name", name)?.to_string());
        }
        if let Some(code) = &changes.code {
            changes.code = Some(require_code("code", code)?);
        }
        if let Some(hex) = &changes.hex {
            changes.hex = Some(clean_hex(Some(hex))?.unwrap_or_default());
        }

        let own_id = ValueId::Custom(value_id);
        let siblings = self.effective_values(&current.type_slug).await?;
        if let Some(name) = &changes.name {
            ensure_name_free(&siblings, name, Some(&own_id))?;
        }
        let duplicate_code = match &changes.code {
            Some(code) if *code != current.code => code_in_use(&siblings, code, Some(&own_id)),
            _ => false,
        };

        let update = self.store.update_attribute_value(value_id, changes).await?;
        if update.items_rewritten > 0 {
            tracing::info!(
                type_slug = %update.after.type_slug,
                old_code = %update.before.code,
                new_code = %update.after.code,
                items = update.items_rewritten,
                "Attribute code change applied to item snapshots"
            );
        }
        self.audit.record(
            AuditEvent::new(actor.id, "attribute_value.update", "attribute_value", value_id)
                .before(&update.before)
                .after(&update.after),
        );

        Ok(UpdatedValue {
            value: custom_effective(update.after),
            duplicate_code,
            items_rewritten: update.items_rewritten,
        })
    }

    async fn require_type(&self, type_slug: &str) -> AppResult<AttributeType> {
        self.store
            .find_attribute_type(type_slug)
            .await?
            .ok_or_else(|| AppError::NotFound("Attribute type".to_string()))
    }

    async fn effective_values(&self, type_slug: &str) -> AppResult<Vec<EffectiveValue>> {
        let persisted = self.store.list_attribute_values(type_slug).await?;
        let overrides = self.store.list_seed_overrides().await?;
        Ok(merge_values(
            type_slug,
            self.seeds.values(type_slug),
            &overrides,
            persisted,
        ))
    }
}

fn custom_effective(value: AttributeValue) -> EffectiveValue {
    EffectiveValue {
        id: ValueId::Custom(value.id),
        type_slug: value.type_slug,
        name: value.name,
        code: value.code,
        meta: value.meta,
        origin: ValueOrigin::Custom,
    }
}

/// Names are unique per type, case-insensitively, because the merge keeps
/// only the first value of each name
fn ensure_name_free(values: &[EffectiveValue], name: &str, except: Option<&ValueId>) -> AppResult<()> {
    let wanted = name.trim().to_lowercase();
    let taken = values
        .iter()
        .filter(|v| Some(&v.id) != except)
        .any(|v| v.name.trim().to_lowercase() == wanted);
    if taken {
        return Err(AppError::conflict(
            "name",
            format!("Value '{}' already exists", name),
            format!("Значение '{}' уже существует", name),
        ));
    }
    Ok(())
}

fn seed_locked() -> AppError {
    AppError::conflict(
        "attribute_value",
        "Built-in values cannot be renamed or deleted",
        "Встроенные значения нельзя переименовать или удалить",
    )
}

/// Sanitized SKU prefix; `None` when nothing usable remains
fn clean_prefix(raw: Option<&str>) -> Option<String> {
    raw.map(shared::sku::sanitize_segment)
        .filter(|p| !p.is_empty())
}

/// Validated `#RRGGBB` swatch; empty input means none
fn clean_hex(raw: Option<&str>) -> AppResult<Option<String>> {
    match raw.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hex) => {
            validate_hex(hex)?;
            Ok(Some(hex.to_uppercase()))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_prefix() {
        assert_eq!(clean_prefix(Some(" ts ")), Some("TS".to_string()));
        assert_eq!(clean_prefix(Some("--")), None);
        assert_eq!(clean_prefix(None), None);
    }

    #[test]
    fn test_clean_hex() {
        assert_eq!(clean_hex(Some("#ff00aa")).unwrap(), Some("#FF00AA".to_string()));
        assert_eq!(clean_hex(Some("  ")).unwrap(), None);
        assert!(clean_hex(Some("red")).is_err());
    }

    #[test]
    fn test_uncategorize_wins_over_category() {
        let changes: AttributeTypeChanges = UpdateAttributeTypeInput {
            category_id: Some(Uuid::new_v4()),
            uncategorize: true,
            ..Default::default()
        }
        .into();
        assert_eq!(changes.category_id, Some(None));

        let changes: AttributeTypeChanges = UpdateAttributeTypeInput::default().into();
        assert_eq!(changes.category_id, None);
    }
}
