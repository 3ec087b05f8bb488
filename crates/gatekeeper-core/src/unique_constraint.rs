//! Unique constraints committed together with events.

use serde::{Deserialize, Serialize};

/// What a unique constraint does to the constraint table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniqueConstraintAction {
    /// Claim the `(unique_type, unique_field)` pair; fails if already claimed.
    Add,
    /// Release the pair; releasing an unclaimed pair is a no-op.
    Remove,
}

/// A globally enforced uniqueness assertion attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Namespace of the constraint, e.g. `org_domain`.
    pub unique_type: String,
    /// The value that must be unique within the namespace.
    pub unique_field: String,
    /// Whether the pair is claimed or released.
    pub action: UniqueConstraintAction,
    /// Message reported when an `Add` collides with an existing claim.
    pub error_message: String,
}

impl UniqueConstraint {
    /// Claims `unique_field` within `unique_type`.
    #[must_use]
    pub fn add(
        unique_type: impl Into<String>,
        unique_field: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
            action: UniqueConstraintAction::Add,
            error_message: error_message.into(),
        }
    }

    /// Releases `unique_field` within `unique_type`.
    #[must_use]
    pub fn remove(unique_type: impl Into<String>, unique_field: impl Into<String>) -> Self {
        Self {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
            action: UniqueConstraintAction::Remove,
            error_message: String::new(),
        }
    }
}
