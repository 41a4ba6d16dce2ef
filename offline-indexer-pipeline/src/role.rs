//! Lifecycle state shared by the producer and consumer roles.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::errors::PipelineError;

/// Where a role is in its lifecycle. A role runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    /// Created, not yet run.
    Idle,
    /// Inside `run`.
    Running,
    /// Finished normally: bound reached, shutdown requested or channel closed.
    Stopped,
    /// Finished with a fatal error.
    Failed,
}

impl RoleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RoleState::Idle,
            1 => RoleState::Running,
            2 => RoleState::Stopped,
            _ => RoleState::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RoleState::Idle => 0,
            RoleState::Running => 1,
            RoleState::Stopped => 2,
            RoleState::Failed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoleState::Stopped | RoleState::Failed)
    }
}

pub(crate) struct AtomicRoleState(AtomicU8);

impl AtomicRoleState {
    pub fn new() -> Self {
        Self(AtomicU8::new(RoleState::Idle.as_u8()))
    }

    pub fn load(&self) -> RoleState {
        RoleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move from `Idle` to `Running`.
    pub fn begin(&self, role: &str) -> Result<(), PipelineError> {
        self.0
            .compare_exchange(
                RoleState::Idle.as_u8(),
                RoleState::Running.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|current| {
                PipelineError::invalid_state(format!(
                    "{} cannot run from state {:?}",
                    role,
                    RoleState::from_u8(current)
                ))
            })
    }

    pub fn finish<T>(&self, result: &Result<T, PipelineError>) {
        let state = if result.is_ok() {
            RoleState::Stopped
        } else {
            RoleState::Failed
        };
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_runs_once() {
        let state = AtomicRoleState::new();
        assert_eq!(state.load(), RoleState::Idle);

        state.begin("producer").unwrap();
        assert_eq!(state.load(), RoleState::Running);
        assert!(state.begin("producer").is_err());

        state.finish::<()>(&Ok(()));
        assert_eq!(state.load(), RoleState::Stopped);
        assert!(state.load().is_terminal());

        let err = state.begin("producer").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState(_)));
    }

    #[test]
    fn test_failed_result_marks_role_failed() {
        let state = AtomicRoleState::new();
        state.begin("consumer").unwrap();
        state.finish::<()>(&Err(PipelineError::fault("gone")));
        assert_eq!(state.load(), RoleState::Failed);
    }
}
