//! Solve failures are recorded and the sequence carries on

use super::support::{ScriptedModel, r};
use crate::analysis::{Cell, ControllerState, Statistic};
use crate::error::SolveFailure;

#[test]
fn test_failure_on_second_run_continues() {
    let model = ScriptedModel::new(
        &[("A", 1.0), ("B", 2.0), ("C", 3.0)],
        &[("Profit", 100.0), ("Cost", 40.0)],
    )
    .failing_on(1);
    let mut session = model.session();

    session.start().unwrap();
    assert_eq!(session.run(&model).unwrap(), ControllerState::Completed);

    let ledger = session.ledger();
    assert_eq!(ledger.len(), 4);
    assert!(!ledger.get(0).unwrap().is_failed());
    assert!(matches!(
        ledger.get(1).unwrap().failure(),
        Some(SolveFailure::Infeasible(_))
    ));
    assert!(!ledger.get(2).unwrap().is_failed());
    assert!(!ledger.get(3).unwrap().is_failed());
    assert_eq!(ledger.failure_count(), 1);
    assert!(session.progress().ends_with(" (1 failed)"));

    let matrix = session.compute_matrix(Statistic::Mean);
    for row in matrix.rows() {
        assert!(matches!(row[0], Cell::Value(_)));
        assert_eq!(row[1], Cell::Failed);
    }
    assert!(matrix.columns[1].failed);
    assert_eq!(matrix.row_for(&r("Cost")).unwrap()[3], Cell::Value(43.0));
}

#[test]
fn test_failed_baseline_propagates_in_relative_mode() {
    let model = ScriptedModel::new(&[("A", 1.0)], &[("Profit", 100.0)]).failing_on(0);
    let mut session = model.session();
    session.start().unwrap();
    session.run(&model).unwrap();

    let relative = session.relative_matrix(Statistic::Final);
    assert_eq!(relative.row(0).unwrap(), &[Cell::Failed, Cell::Failed]);
}

#[test]
fn test_every_run_failing_still_completes() {
    let model = ScriptedModel::new(&[("A", 1.0)], &[("Profit", 100.0)])
        .failing_on(0)
        .failing_on(1);
    let mut session = model.session();
    session.start().unwrap();
    assert_eq!(session.run(&model).unwrap(), ControllerState::Completed);
    assert_eq!(session.snapshot().failures, 2);
}
