//! Per-tenant module lifecycle.
//!
//! ```text
//! Uninstalled --install--> Available --activate--> Activated --deactivate--> Deactivated
//!                                ^                                              |
//!                                +------------------- activate -----------------+
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// No compiled plugin or no catalog row.
    Uninstalled,
    /// In the catalog, never activated for this tenant.
    Available,
    /// Ledger row present, permissions linked.
    Activated,
    /// Ledger row removed; exclusive permissions unlinked.
    Deactivated,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModuleTransition {
    Install,
    Activate,
    Deactivate,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot {transition:?} a module that is {from:?}")]
pub struct TransitionError {
    pub from: ModuleState,
    pub transition: ModuleTransition,
}

impl ModuleState {
    /// Apply a transition. Repeating `Activate` on an active module, or
    /// `Deactivate` on an inactive one, is a no-op rather than an error.
    pub fn transition(self, transition: ModuleTransition) -> Result<ModuleState, TransitionError> {
        use ModuleState::*;
        use ModuleTransition::*;

        match (self, transition) {
            (Uninstalled, Install) => Ok(Available),
            (Available | Activated | Deactivated, Install) => Ok(self),
            (Available | Deactivated | Activated, Activate) => Ok(Activated),
            (Activated, Deactivate) => Ok(Deactivated),
            (Available | Deactivated, Deactivate) => Ok(self),
            (Uninstalled, _) => Err(TransitionError {
                from: self,
                transition,
            }),
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, ModuleState::Activated)
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleState::*;
    use super::ModuleTransition::*;
    use super::*;

    #[test]
    fn full_lifecycle() {
        let s = Uninstalled.transition(Install).unwrap();
        assert_eq!(s, Available);
        let s = s.transition(Activate).unwrap();
        assert_eq!(s, Activated);
        let s = s.transition(Deactivate).unwrap();
        assert_eq!(s, Deactivated);
        assert_eq!(s.transition(Activate).unwrap(), Activated);
    }

    #[test]
    fn uninstalled_cannot_jump_to_activated() {
        assert_eq!(
            Uninstalled.transition(Activate),
            Err(TransitionError {
                from: Uninstalled,
                transition: Activate
            })
        );
    }

    #[test]
    fn repeated_transitions_are_no_ops() {
        assert_eq!(Activated.transition(Activate).unwrap(), Activated);
        assert_eq!(Available.transition(Deactivate).unwrap(), Available);
    }
}
