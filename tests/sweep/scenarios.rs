//! BDD scenarios for volume group sweeps.

use rstest_bdd_macros::scenario;

use super::test_helpers::{SweepContext, sweep_context};

#[scenario(
    path = "tests/features/sweep.feature",
    name = "Detach-only run records the detached volume groups"
)]
fn scenario_detach_only(sweep_context: SweepContext) {
    drop(sweep_context);
}

#[scenario(
    path = "tests/features/sweep.feature",
    name = "Declining the prompt changes nothing"
)]
fn scenario_declined(sweep_context: SweepContext) {
    drop(sweep_context);
}

#[scenario(
    path = "tests/features/sweep.feature",
    name = "A running cluster has nothing to do"
)]
fn scenario_nothing_to_do(sweep_context: SweepContext) {
    drop(sweep_context);
}

#[scenario(
    path = "tests/features/sweep.feature",
    name = "Transient delete errors are retried until the budget runs out"
)]
fn scenario_delete_retries(sweep_context: SweepContext) {
    drop(sweep_context);
}

#[scenario(
    path = "tests/features/sweep.feature",
    name = "Deleting from a work-list skips groups that are already detached"
)]
fn scenario_delete_from_worklist(sweep_context: SweepContext) {
    drop(sweep_context);
}
