//! Controller lifecycle state machine.

use std::fmt;


use crate::Error;

/// Lifecycle of one controller version.
///
/// `uninstalled -> installing -> installed -> activating -> active`, with
/// `redundant` reached when a newer version supersedes this one or install
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    Active,
    Redundant,
}

impl LifecycleState {
    /// Whether fetch interception is allowed.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Redundant)
    }

    /// Validate a transition and return the new state.
    pub fn transition(self, to: LifecycleState) -> Result<LifecycleState, Error> {
        use LifecycleState::*;
        let allowed = match (self, to) {
            (Uninstalled, Installing) => true,
            // Install failed; a later registration attempt retries from scratch.
            (Installing, Uninstalled) => true,
            (Installing, Installed) => true,
            (Installed, Activating) => true,
            (Activating, Active) => true,
            (s, Redundant) => !s.is_terminal(),
            _ => false,
        };
        if allowed { Ok(to) } else { Err(Error::InvalidTransition { from: self, to }) }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Uninstalled => "uninstalled",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}
