//! Node roles and the transitions between them.

use std::fmt;

/// Promotion ladder: `Normal -> Validator -> LeadValidator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum NodeRole {
    #[default]
    Normal,
    Validator,
    LeadValidator,
}

impl NodeRole {
    pub fn is_validator(&self) -> bool {
        *self >= NodeRole::Validator
    }

    pub fn is_lead(&self) -> bool {
        *self == NodeRole::LeadValidator
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeRole::Normal => "normal",
            NodeRole::Validator => "validator",
            NodeRole::LeadValidator => "lead-validator",
        })
    }
}

/// A role change the node must react to by starting or cancelling tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleChange {
    BecameValidator,
    BecameLeadValidator,
    SteppedDown,
}

/// The changes that take a node from `before` to `after`, in order.
pub fn role_changes(before: NodeRole, after: NodeRole) -> Vec<RoleChange> {
    use NodeRole::*;
    match (before, after) {
        (Normal, Validator) => vec![RoleChange::BecameValidator],
        (Normal, LeadValidator) => vec![RoleChange::BecameValidator, RoleChange::BecameLeadValidator],
        (Validator, LeadValidator) => vec![RoleChange::BecameLeadValidator],
        (LeadValidator, Validator) | (LeadValidator, Normal) => vec![RoleChange::SteppedDown],
        _ => Vec::new(),
    }
}
