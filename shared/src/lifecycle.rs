//! Item lifecycle: active <-> archived, {active, archived} -> deleted

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::models::ItemState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Archive,
    Restore,
    Delete,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Archive => "archive",
            LifecycleAction::Restore => "restore",
            LifecycleAction::Delete => "delete",
        }
    }
}

/// Next state for `action`, or an error if the move is not allowed
pub fn transition(from: ItemState, action: LifecycleAction) -> DomainResult<ItemState> {
    match (from, action) {
        (ItemState::Active, LifecycleAction::Archive) => Ok(ItemState::Archived),
        (ItemState::Archived, LifecycleAction::Restore) => Ok(ItemState::Active),
        (ItemState::Active | ItemState::Archived, LifecycleAction::Delete) => Ok(ItemState::Deleted),
        (from, action) => Err(DomainError::InvalidStateTransition {
            from,
            action: action.as_str(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        assert_eq!(
            transition(ItemState::Active, LifecycleAction::Archive).unwrap(),
            ItemState::Archived
        );
        assert_eq!(
            transition(ItemState::Archived, LifecycleAction::Restore).unwrap(),
            ItemState::Active
        );
        assert_eq!(
            transition(ItemState::Active, LifecycleAction::Delete).unwrap(),
            ItemState::Deleted
        );
        assert_eq!(
            transition(ItemState::Archived, LifecycleAction::Delete).unwrap(),
            ItemState::Deleted
        );
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(transition(ItemState::Archived, LifecycleAction::Archive).is_err());
        assert!(transition(ItemState::Active, LifecycleAction::Restore).is_err());
        for action in [
            LifecycleAction::Archive,
            LifecycleAction::Restore,
            LifecycleAction::Delete,
        ] {
            assert!(transition(ItemState::Deleted, action).is_err());
        }
    }
}
