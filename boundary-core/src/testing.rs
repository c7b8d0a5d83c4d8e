//! A given/when/then harness for testing command decisions against a
//! projected state, without a database.
//!
//! Mirrors the shape of fixture-based decision testing this crate's
//! closest sibling in the event-sourcing space uses: set up a history of
//! typed events, fold them into a projection, run the decision, assert on
//! the events it produces or the error it returns.
use std::fmt::Debug;

use crate::projector::Projection;

/// A pure decision over a projected state: the non-transactional half of
/// a [`crate::command::CommandHandler`], useful to unit test without a
/// store.
pub trait Decision {
    type Event;
    type State: Projection<Event = Self::Event>;
    type Error;

    fn process(&self, state: &Self::State) -> Result<Vec<Self::Event>, Self::Error>;
}

/// Entry point for the harness.
pub struct TestHarness;

impl TestHarness {
    /// Sets up a history of events to fold into the decision's state
    /// before running it.
    pub fn given<E: Clone>(history: impl Into<Vec<E>>) -> TestHarnessStep<E, Given> {
        TestHarnessStep {
            history: history.into(),
            _step: Given,
        }
    }
}

pub struct Given;

pub struct When<R, Err> {
    result: Result<Vec<R>, Err>,
}

pub struct TestHarnessStep<E: Clone, St> {
    history: Vec<E>,
    _step: St,
}

impl<E: Clone> TestHarnessStep<E, Given> {
    /// Folds the history into the decision's state and runs it.
    pub fn when<D, S, R, Err>(self, decision: D) -> TestHarnessStep<E, When<R, Err>>
    where
        D: Decision<Event = R, Error = Err, State = S>,
        S: Projection<Event = E>,
    {
        let mut state = S::initial_state();
        for event in self.history.iter().cloned() {
            state.apply(event);
        }
        let result = decision.process(&state);
        TestHarnessStep {
            history: self.history,
            _step: When { result },
        }
    }
}

impl<R, E, Err> TestHarnessStep<E, When<R, Err>>
where
    E: Clone,
    R: Debug + PartialEq,
    Err: Debug + PartialEq,
{
    /// Asserts the decision produced exactly `expected` events.
    #[track_caller]
    pub fn then(self, expected: impl Into<Vec<R>>) {
        assert_eq!(self._step.result, Ok(expected.into()));
    }

    /// Asserts the decision failed with exactly `expected`.
    #[track_caller]
    pub fn then_err(self, expected: Err) {
        let err = self._step.result.expect_err("expected the decision to fail");
        assert_eq!(err, expected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum SampleEvent {
        Opened,
        Closed,
    }

    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    struct SampleState {
        opened: bool,
        closed: bool,
    }

    impl Projection for SampleState {
        type Event = SampleEvent;

        fn initial_state() -> Self {
            Self::default()
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                SampleEvent::Opened => self.opened = true,
                SampleEvent::Closed => self.closed = true,
            }
        }
    }

    struct CloseAccount;

    #[derive(Debug, PartialEq, Eq)]
    enum SampleError {
        NotOpened,
        AlreadyClosed,
    }

    impl Decision for CloseAccount {
        type Event = SampleEvent;
        type State = SampleState;
        type Error = SampleError;

        fn process(&self, state: &Self::State) -> Result<Vec<SampleEvent>, Self::Error> {
            if !state.opened {
                return Err(SampleError::NotOpened);
            }
            if state.closed {
                return Err(SampleError::AlreadyClosed);
            }
            Ok(vec![SampleEvent::Closed])
        }
    }

    #[test]
    fn it_folds_history_and_asserts_produced_events() {
        TestHarness::given([SampleEvent::Opened])
            .when(CloseAccount)
            .then([SampleEvent::Closed]);
    }

    #[test]
    fn it_asserts_the_expected_error() {
        TestHarness::given([])
            .when(CloseAccount)
            .then_err(SampleError::NotOpened);
    }

    #[test]
    #[should_panic(expected = "expected the decision to fail")]
    fn then_err_panics_when_the_decision_succeeded() {
        TestHarness::given([SampleEvent::Opened])
            .when(CloseAccount)
            .then_err(SampleError::NotOpened);
    }
}
