//! Cooperative pause and stop

use std::sync::{Arc, OnceLock};

use super::support::ScriptedModel;
use crate::analysis::{ControlHandle, ControllerState};

fn parameters() -> Vec<(&'static str, f64)> {
    vec![("A", 1.0), ("B", 2.0), ("C", 3.0), ("D", 4.0)]
}

/// A model whose hook can reach the session's control handle
fn hooked(
    hook: impl Fn(usize, &ControlHandle) + Send + Sync + 'static,
) -> (ScriptedModel, Arc<OnceLock<ControlHandle>>) {
    let handle: Arc<OnceLock<ControlHandle>> = Arc::new(OnceLock::new());
    let shared = Arc::clone(&handle);
    let model = ScriptedModel::new(&parameters(), &[("Out", 10.0)]).on_solve(move |call| {
        if let Some(handle) = shared.get() {
            hook(call, handle);
        }
    });
    (model, handle)
}

#[test]
fn test_indices_gapless_across_pause_cycles() {
    let model = ScriptedModel::new(&parameters(), &[("Out", 10.0)]);
    let mut session = model.session();
    session.start().unwrap();

    while session.state() != ControllerState::Completed {
        session.step(&model).unwrap();
        if session.state() == ControllerState::Running {
            session.pause().unwrap();
            session.step(&model).unwrap();
            assert_eq!(session.state(), ControllerState::Paused);
            session.start().unwrap();
        }
    }

    let indices: Vec<_> = session.ledger().iter().map(|run| run.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert_eq!(model.solve_calls(), 5);
}

/// A pause issued during run i's solve lets run i finish and be recorded
#[test]
fn test_pause_during_solve_never_truncates_run() {
    let (model, slot) = hooked(|call, handle| {
        if call == 2 {
            handle.request_pause();
        }
    });
    let mut session = model.session();
    let _ = slot.set(session.handle());

    session.start().unwrap();
    assert_eq!(session.run(&model).unwrap(), ControllerState::Paused);

    assert_eq!(session.ledger().len(), 3);
    let last = session.ledger().last().unwrap();
    assert_eq!(last.index, 2);
    assert!(!last.is_failed());
    assert_eq!(session.controller().last_completed(), Some(2));
    assert_eq!(session.progress(), "Paused after run 3 of 5");

    session.start().unwrap();
    assert_eq!(session.run(&model).unwrap(), ControllerState::Completed);
    assert_eq!(session.ledger().len(), 5);
}

#[test]
fn test_stop_during_solve_keeps_run() {
    let (model, slot) = hooked(|call, handle| {
        if call == 1 {
            handle.request_stop();
        }
    });
    let mut session = model.session();
    let _ = slot.set(session.handle());

    session.start().unwrap();
    assert_eq!(session.run(&model).unwrap(), ControllerState::Stopped);
    assert_eq!(session.ledger().len(), 2);
    assert_eq!(session.progress(), "Stopped after run 2 of 5");
    assert!(session.start().is_err());
}

/// Pause and stop are rejected where they make no sense
#[test]
fn test_pause_and_stop_outside_a_sequence() {
    let model = ScriptedModel::new(&parameters(), &[("Out", 10.0)]);
    let mut session = model.session();
    assert!(session.pause().is_err());
    assert!(session.stop().is_err());

    session.start().unwrap();
    session.run(&model).unwrap();
    assert!(session.pause().is_err());
    assert!(session.stop().is_err());
}

/// Requests left over from a finished sequence do not leak into the next one
#[test]
fn test_stale_requests_are_reset_on_start() {
    let model = ScriptedModel::new(&parameters(), &[("Out", 10.0)]);
    let mut session = model.session();
    let handle = session.handle();
    handle.request_pause();

    session.start().unwrap();
    assert!(!handle.is_pause_requested());
    assert_eq!(session.run(&model).unwrap(), ControllerState::Completed);
}
