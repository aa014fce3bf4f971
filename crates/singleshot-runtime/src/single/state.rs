use crate::error::{MlError, MlResult};

/// Worker thread state. Guarded by the engine's slot lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum WorkerState {
    #[default]
    Idle,
    Running,
    /// Terminal. The worker finishes the job at hand, if any, then exits.
    JoinRequested,
}

impl WorkerState {
    /// `IDLE -> RUNNING`. At most one invocation is in flight.
    pub(crate) fn submit(&mut self) -> MlResult<()> {
        match self {
            WorkerState::Idle => {
                *self = WorkerState::Running;
                Ok(())
            }
            WorkerState::Running => Err(MlError::TryAgain),
            WorkerState::JoinRequested => Err(MlError::InvalidHandle),
        }
    }

    /// `RUNNING -> IDLE`, leaving a join request in place.
    pub(crate) fn complete(&mut self) {
        if *self == WorkerState::Running {
            *self = WorkerState::Idle;
        }
    }

    pub(crate) fn request_join(&mut self) {
        *self = WorkerState::JoinRequested;
    }

    pub(crate) fn is_running(self) -> bool {
        self == WorkerState::Running
    }

    pub(crate) fn is_join_requested(self) -> bool {
        self == WorkerState::JoinRequested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_accepts_work() {
        let mut state = WorkerState::default();
        state.submit().unwrap();
        assert!(state.is_running());
        assert!(matches!(state.submit(), Err(MlError::TryAgain)));

        state.complete();
        assert_eq!(state, WorkerState::Idle);
    }

    #[test]
    fn join_request_is_terminal() {
        let mut state = WorkerState::Running;
        state.request_join();
        state.complete();
        assert!(state.is_join_requested());
        assert!(matches!(state.submit(), Err(MlError::InvalidHandle)));
        assert_eq!(state.to_string(), "JOIN_REQUESTED");
    }
}
