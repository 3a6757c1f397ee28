//! HTTP handlers for categories, attribute types and attribute values

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{
    Action, AttributeType, AttributeValueChanges, Category, CategoryChanges, EffectiveValue,
    Resource, ValueId,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::taxonomy::{
    CreateAttributeTypeInput, CreateAttributeValueInput, CreateCategoryInput,
    UpdateAttributeTypeInput, UpdatedValue, ValueWithWarning,
};
use crate::services::{Actor, TaxonomyService};
use crate::AppState;

#[derive(Deserialize)]
pub struct AttributeTypeQuery {
    pub category_id: Option<Uuid>,
}

/// Body of a delete that may need the actor's password
#[derive(Deserialize, Default)]
pub struct PasswordConfirmation {
    pub password: Option<String>,
}

fn parse_value_id(raw: &str) -> AppResult<ValueId> {
    raw.parse().map_err(|e: String| {
        AppError::validation("id", e, "Некорректный идентификатор значения")
    })
}

// ============================================================================
// Categories
// ============================================================================

/// List categories
pub async fn list_categories(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<Category>>> {
    current_user.0.require(Resource::Taxonomy, Action::View)?;
    let service = TaxonomyService::new(&state);
    Ok(Json(service.list_categories().await?))
}

/// Create a category
pub async fn create_category(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateCategoryInput>,
) -> AppResult<(StatusCode, Json<Category>)> {
    current_user.0.require(Resource::Taxonomy, Action::Edit)?;
    let service = TaxonomyService::new(&state);
    let category = service
        .create_category(Actor::from(&current_user.0), input)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// Update a category
pub async fn update_category(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(changes): Json<CategoryChanges>,
) -> AppResult<Json<Category>> {
    current_user.0.require(Resource::Taxonomy, Action::Edit)?;
    let service = TaxonomyService::new(&state);
    let category = service
        .update_category(Actor::from(&current_user.0), id, changes)
        .await?;
    Ok(Json(category))
}

/// Delete a category; its items become uncategorized. System categories
/// need `{"password": ...}`.
pub async fn delete_category(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    body: Option<Json<PasswordConfirmation>>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Taxonomy, Action::Edit)?;
    let confirmation = body.map(|Json(b)| b).unwrap_or_default();
    let service = TaxonomyService::new(&state);
    service
        .delete_category(
            Actor::from(&current_user.0),
            id,
            confirmation.password.as_deref(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Attribute types
// ============================================================================

/// List attribute types of a category, or the uncategorized ones
pub async fn list_attribute_types(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<AttributeTypeQuery>,
) -> AppResult<Json<Vec<AttributeType>>> {
    current_user.0.require(Resource::Taxonomy, Action::View)?;
    let service = TaxonomyService::new(&state);
    Ok(Json(service.list_attribute_types(query.category_id).await?))
}

/// Create an attribute type
pub async fn create_attribute_type(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateAttributeTypeInput>,
) -> AppResult<(StatusCode, Json<AttributeType>)> {
    current_user.0.require(Resource::Taxonomy, Action::Edit)?;
    let service = TaxonomyService::new(&state);
    let created = service
        .create_attribute_type(Actor::from(&current_user.0), input)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update an attribute type
pub async fn update_attribute_type(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateAttributeTypeInput>,
) -> AppResult<Json<AttributeType>> {
    current_user.0.require(Resource::Taxonomy, Action::Edit)?;
    let service = TaxonomyService::new(&state);
    let updated = service
        .update_attribute_type(Actor::from(&current_user.0), id, input.into())
        .await?;
    Ok(Json(updated))
}

/// Delete an attribute type. System types need `{"password": ...}`.
pub async fn delete_attribute_type(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    body: Option<Json<PasswordConfirmation>>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Taxonomy, Action::Edit)?;
    let confirmation = body.map(|Json(b)| b).unwrap_or_default();
    let service = TaxonomyService::new(&state);
    service
        .delete_attribute_type(
            Actor::from(&current_user.0),
            id,
            confirmation.password.as_deref(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Attribute values
// ============================================================================

/// List the effective values of a type in display order
pub async fn list_attribute_values(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(type_slug): Path<String>,
) -> AppResult<Json<Vec<EffectiveValue>>> {
    current_user.0.require(Resource::Taxonomy, Action::View)?;
    let service = TaxonomyService::new(&state);
    Ok(Json(service.list_attribute_values(&type_slug).await?))
}

/// Create a value for a type
pub async fn create_attribute_value(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(type_slug): Path<String>,
    Json(input): Json<CreateAttributeValueInput>,
) -> AppResult<(StatusCode, Json<ValueWithWarning>)> {
    current_user.0.require(Resource::Taxonomy, Action::Edit)?;
    let service = TaxonomyService::new(&state);
    let created = service
        .create_attribute_value(Actor::from(&current_user.0), &type_slug, input)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a value; `seed:<slug>:<code>` ids accept flag changes only
pub async fn update_attribute_value(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<String>,
    Json(changes): Json<AttributeValueChanges>,
) -> AppResult<Json<UpdatedValue>> {
    current_user.0.require(Resource::Taxonomy, Action::Edit)?;
    let id = parse_value_id(&id)?;
    let service = TaxonomyService::new(&state);
    let updated = service
        .update_attribute_value(Actor::from(&current_user.0), &id, changes)
        .await?;
    Ok(Json(updated))
}

/// Delete a persisted value
pub async fn delete_attribute_value(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<String>,
    body: Option<Json<PasswordConfirmation>>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Taxonomy, Action::Edit)?;
    let id = parse_value_id(&id)?;
    let confirmation = body.map(|Json(b)| b).unwrap_or_default();
    let service = TaxonomyService::new(&state);
    service
        .delete_attribute_value(
            Actor::from(&current_user.0),
            &id,
            confirmation.password.as_deref(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
