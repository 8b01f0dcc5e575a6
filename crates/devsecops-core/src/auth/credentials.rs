//! Password rotation for re-runnable provisioning.
//!
//! A provisioning run may be asked to change the admin password. The next
//! run is handed the same pair again, but by then the server only accepts
//! the new one. `PasswordSlots` keeps three slots (current, pending,
//! fallback) and a swap that moves between them so sign-in can try both.

/// Which password the current slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// The password given at construction; a change may be pending.
    UsingCurrent,
    /// The pending password was promoted; the initial one is the fallback.
    UsingPending,
    /// Reverted to the initial password; the other one is pending again.
    UsingFallback,
}

/// Pure transition function for `PasswordSlots::swapped`.
pub fn next_state(state: SlotState, has_pending: bool, has_fallback: bool) -> SlotState {
    if !has_fallback && has_pending {
        SlotState::UsingPending
    } else if !has_pending && has_fallback {
        SlotState::UsingFallback
    } else {
        state
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordSlots {
    current: String,
    pending: Option<String>,
    fallback: Option<String>,
    state: SlotState,
}

impl PasswordSlots {
    pub fn new(password: impl Into<String>, new_password: Option<String>) -> Self {
        Self {
            current: password.into(),
            pending: new_password.filter(|p| !p.is_empty()),
            fallback: None,
            state: SlotState::UsingCurrent,
        }
    }

    /// Rotate the slots:
    /// - nothing to fall back to and a pending password: promote it
    /// - nothing pending and a fallback recorded: revert to it
    /// - otherwise unchanged
    pub fn swapped(self) -> Self {
        let state = next_state(self.state, self.pending.is_some(), self.fallback.is_some());
        match (self.pending, self.fallback) {
            (Some(pending), None) => Self {
                fallback: Some(self.current),
                current: pending,
                pending: None,
                state,
            },
            (None, Some(fallback)) => Self {
                pending: Some(self.current),
                current: fallback,
                fallback: None,
                state,
            },
            (pending, fallback) => Self {
                current: self.current,
                pending,
                fallback,
                state,
            },
        }
    }

    pub fn swap(&mut self) {
        let slots = std::mem::replace(self, Self::new(String::new(), None));
        *self = slots.swapped();
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
