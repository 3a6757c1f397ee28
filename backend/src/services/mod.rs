//! Business logic services for the warehouse engine

use shared::Role;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;

pub mod auth;
pub mod ledger;
pub mod lifecycle;
pub mod sku;
pub mod taxonomy;

pub use auth::AuthService;
pub use ledger::StockLedgerService;
pub use lifecycle::LifecycleService;
pub use sku::SkuService;
pub use taxonomy::TaxonomyService;

/// The user on whose behalf a service call runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }

    pub(crate) fn require_privileged(&self) -> AppResult<()> {
        if self.is_privileged() {
            Ok(())
        } else {
            tracing::debug!(actor_id = %self.id, role = self.role.as_str(), "Privileged action refused");
            Err(AppError::InsufficientPermissions)
        }
    }
}

impl From<&AuthUser> for Actor {
    fn from(user: &AuthUser) -> Self {
        Self::new(user.user_id, user.role)
    }
}

/// Password supplied for a privileged action, or `ReauthenticationRequired`
pub(crate) fn require_password(password: Option<&str>) -> AppResult<&str> {
    password
        .filter(|p| !p.is_empty())
        .ok_or(AppError::ReauthenticationRequired)
}
