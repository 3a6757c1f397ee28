//! Item lifecycle: archive, restore, irreversible delete and the stale
//! stock sweep

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::require_text;
use uuid::Uuid;
use validator::Validate;

use super::ledger::ItemView;
use super::{require_password, Actor};
use crate::audit::{AuditEvent, AuditSink};
use crate::error::{AppError, AppResult};
use crate::services::auth::CredentialVerifier;
use crate::store::{Reauth, WarehouseStore};
use crate::AppState;

/// Input for archiving a batch of items
#[derive(Debug, Deserialize, Validate)]
pub struct ArchiveInput {
    #[validate(length(min = 1, message = "Select at least one item"))]
    pub ids: Vec<Uuid>,
    pub reason: String,
}

/// Input for restoring a batch of archived items
#[derive(Debug, Deserialize, Validate)]
pub struct RestoreInput {
    #[validate(length(min = 1, message = "Select at least one item"))]
    pub ids: Vec<Uuid>,
    pub reason: Option<String>,
}

/// Input for deleting a batch of items. Holds the actor's password and
/// has no `Debug`.
#[derive(Deserialize, Validate)]
pub struct DeleteInput {
    #[validate(length(min = 1, message = "Select at least one item"))]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchiveStaleInput {
    /// Defaults to `inventory.stale_archive_days`
    pub older_than_days: Option<i64>,
    pub reason: Option<String>,
}

/// Items changed by an archive or restore
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub affected: u64,
    pub items: Vec<ItemView>,
}

/// Ids removed by a delete; their ledger rows stay queryable
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub deleted: u64,
    pub ids: Vec<Uuid>,
}

/// Lifecycle service
#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn WarehouseStore>,
    audit: Arc<dyn AuditSink>,
    verifier: Arc<dyn CredentialVerifier>,
    stale_archive_days: i64,
}

impl LifecycleService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            audit: state.audit.clone(),
            verifier: state.verifier.clone(),
            stale_archive_days: state.config.inventory.stale_archive_days,
        }
    }

    /// Archives every item or none. Quantity and ledger are untouched.
    pub async fn archive(&self, actor: Actor, input: ArchiveInput) -> AppResult<BatchResult> {
        input.validate()?;
        let reason = require_text("reason", &input.reason)?;
        let ids = dedupe(&input.ids);

        let updated = self.store.archive_items(&ids, reason, actor.id).await?;
        for change in &updated {
            self.audit.record(
                AuditEvent::new(actor.id, "item.archive", "item", change.after.id)
                    .before(&change.before)
                    .after(&change.after)
                    .reason(Some(reason)),
            );
        }

        tracing::info!(count = updated.len(), "Items archived");
        Ok(BatchResult {
            affected: updated.len() as u64,
            items: updated.into_iter().map(|u| u.after.into()).collect(),
        })
    }

    pub async fn restore(&self, actor: Actor, input: RestoreInput) -> AppResult<BatchResult> {
        input.validate()?;
        let ids = dedupe(&input.ids);
        let reason = input.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());

        let updated = self.store.restore_items(&ids).await?;
        for change in &updated {
            self.audit.record(
                AuditEvent::new(actor.id, "item.restore", "item", change.after.id)
                    .before(&change.before)
                    .after(&change.after)
                    .reason(reason),
            );
        }

        tracing::info!(count = updated.len(), "Items restored");
        Ok(BatchResult {
            affected: updated.len() as u64,
            items: updated.into_iter().map(|u| u.after.into()).collect(),
        })
    }

    /// Irreversibly deletes every item or none. Only privileged actors may
    /// delete, and their password is checked in the same storage
    /// transaction that removes the rows.
    pub async fn delete(&self, actor: Actor, input: DeleteInput) -> AppResult<DeleteResult> {
        input.validate()?;
        actor.require_privileged()?;
        let password = require_password(Some(input.password.as_str()))?;
        let ids = dedupe(&input.ids);

        let reauth = Reauth {
            actor_id: actor.id,
            password,
            verifier: self.verifier.as_ref(),
        };
        let deleted = match self.store.delete_items(&ids, reauth).await {
            Ok(deleted) => deleted,
            Err(AppError::AuthenticationFailed) => {
                tracing::warn!(actor_id = %actor.id, "Item deletion refused: password mismatch");
                return Err(AppError::AuthenticationFailed);
            }
            Err(e) => return Err(e),
        };

        for item in &deleted {
            self.audit
                .record(AuditEvent::new(actor.id, "item.delete", "item", item.id).before(item));
        }

        tracing::info!(count = deleted.len(), "Items deleted");
        Ok(DeleteResult {
            deleted: deleted.len() as u64,
            ids: deleted.into_iter().map(|i| i.id).collect(),
        })
    }

    /// Archives active items with no stock that have not changed within
    /// the window. Returns how many were archived.
    pub async fn auto_archive_stale(&self, actor: Actor, input: ArchiveStaleInput) -> AppResult<u64> {
        let days = input.older_than_days.unwrap_or(self.stale_archive_days);
        if days <= 0 {
            return Err(AppError::validation(
                "older_than_days",
                "The window must be at least one day",
                "Период должен быть не меньше одного дня",
            ));
        }
        let reason = input
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("No stock movement for {} days", days));

        let cutoff = Duration::try_days(days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                AppError::validation(
                    "older_than_days",
                    "The window is too large",
                    "Слишком большой период",
                )
            })?;
        let archived = self
            .store
            .archive_stale_items(cutoff, &reason, actor.id)
            .await?;

        for item in &archived {
            self.audit.record(
                AuditEvent::new(actor.id, "item.archive", "item", item.id)
                    .after(item)
                    .reason(Some(&reason)),
            );
        }

        tracing::info!(count = archived.len(), days, "Stale items archived");
        Ok(archived.len() as u64)
    }
}

/// Ids in first-seen order without repeats
pub(crate) fn dedupe(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_first_seen_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedupe(&[a, b, a, b]), vec![a, b]);
    }
}
