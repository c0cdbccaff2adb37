//! BDD step definitions for sweep behaviour.

use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use vgsweep::prism::Method;
use vgsweep::sweep::is_confirmed;
use vgsweep::test_support::{
    FixedConfirmation, complete_json, list_json, message_list_json, vg_json, vm_json,
};
use vgsweep::{
    AttachmentTarget, RunContext, SweepMode, SweepOrchestrator, SweepOutcome, SweepSummary,
    worklist,
};

use super::test_helpers::{
    SentCall, SweepContext, SweepResult, VM_ID, VOLUME_GROUP_ID, instant_settings,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("cluster \"{cluster}\" has a powered-off VM holding volume group \"{name}\"")]
fn powered_off_vm_with_group(
    sweep_context: SweepContext,
    cluster: String,
    name: String,
) -> SweepContext {
    sweep_context
        .reply_json(&list_json(vec![vm_json(
            VM_ID,
            "worker-0",
            "OFF",
            cluster.trim(),
            &[VOLUME_GROUP_ID],
        )]))
        .reply_json(&list_json(vec![vg_json(VOLUME_GROUP_ID, name.trim(), &[VM_ID])]))
}

#[given("cluster \"{cluster}\" has only running VMs")]
fn running_vms(sweep_context: SweepContext, cluster: String) -> SweepContext {
    sweep_context.reply_json(&list_json(vec![vm_json(
        VM_ID,
        "worker-0",
        "ON",
        cluster.trim(),
        &[VOLUME_GROUP_ID],
    )]))
}

#[given("the detach API accepts the first strategy")]
fn detach_accepted(sweep_context: SweepContext) -> SweepContext {
    sweep_context.reply_json(&complete_json())
}

#[given("every delete fails with \"{message}\"")]
fn delete_always_fails(sweep_context: SweepContext, message: String) -> SweepContext {
    (0..3).fold(sweep_context, |ctx, _| {
        ctx.reply(500, message_list_json(message.trim()).to_string())
            .reply(503, "")
    })
}

#[given("a work-list recording volume group \"{name}\"")]
fn recorded_worklist(sweep_context: SweepContext, name: String) -> SweepContext {
    let target = AttachmentTarget {
        volume_group_id: String::from(VOLUME_GROUP_ID),
        volume_group_name: name.trim().to_owned(),
        attached_vm: Some(String::from(VM_ID)),
        attached_vm_name: Some(String::from("worker-0")),
    };
    worklist::write(&sweep_context.worklist, &[target])
        .unwrap_or_else(|err| panic!("seed work-list: {err}"));
    sweep_context
}

#[given("the volume group is no longer attached")]
fn group_detached(sweep_context: SweepContext) -> SweepContext {
    sweep_context.reply_json(&list_json(vec![vg_json(VOLUME_GROUP_ID, "pvc-data", &[])]))
}

#[given("the delete API accepts the newer generation")]
fn delete_accepted(sweep_context: SweepContext) -> SweepContext {
    sweep_context.reply(202, r#"{"data":{"extId":"task-1"}}"#)
}

fn run_sweep(
    mut sweep_context: SweepContext,
    mode: SweepMode,
    answer: &str,
) -> Result<SweepContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let context = RunContext {
        mode,
        settings: instant_settings(),
        fail_on_target_errors: false,
    };
    let api = sweep_context.transport();
    let mut confirmation = FixedConfirmation::new(is_confirmed(answer));
    let mut out = Vec::new();

    let result = runtime.block_on(
        SweepOrchestrator::new(&api, &context).run(&mut confirmation, &mut out),
    );

    sweep_context.capture(&api);
    sweep_context.outcome = Some(match result {
        Ok(outcome) => SweepResult::Finished(outcome),
        Err(err) => SweepResult::Failed(err.to_string()),
    });
    Ok(sweep_context)
}

#[when("I run a detach-only sweep for cluster \"{cluster}\" answering \"{answer}\"")]
fn run_detach_only(
    sweep_context: SweepContext,
    cluster: String,
    answer: String,
) -> Result<SweepContext, StepError> {
    let mode = SweepMode::DetachOnly {
        cluster: cluster.trim().to_owned(),
        worklist: sweep_context.worklist.clone(),
    };
    run_sweep(sweep_context, mode, &answer)
}

#[when("I run a detach-and-delete sweep for cluster \"{cluster}\" answering \"{answer}\"")]
fn run_detach_and_delete(
    sweep_context: SweepContext,
    cluster: String,
    answer: String,
) -> Result<SweepContext, StepError> {
    let mode = SweepMode::DetachAndDelete {
        cluster: cluster.trim().to_owned(),
    };
    run_sweep(sweep_context, mode, &answer)
}

#[when("I run a delete sweep from the work-list answering \"{answer}\"")]
fn run_delete_from_file(
    sweep_context: SweepContext,
    answer: String,
) -> Result<SweepContext, StepError> {
    let mode = SweepMode::DeleteFromFile {
        path: sweep_context.worklist.clone(),
    };
    run_sweep(sweep_context, mode, &answer)
}

fn outcome(sweep_context: &SweepContext) -> Result<&SweepOutcome, StepError> {
    match sweep_context.outcome.as_ref() {
        Some(SweepResult::Finished(outcome)) => Ok(outcome),
        Some(SweepResult::Failed(err)) => Err(StepError::Assertion(format!(
            "sweep failed unexpectedly: {err}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

fn summary(sweep_context: &SweepContext) -> Result<&SweepSummary, StepError> {
    match outcome(sweep_context)? {
        SweepOutcome::Completed(summary) => Ok(summary),
        other => Err(StepError::Assertion(format!(
            "expected a completed run, got {other:?}"
        ))),
    }
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), StepError> {
    if condition {
        Ok(())
    } else {
        Err(StepError::Assertion(message()))
    }
}

#[then("{count} volume group is detached")]
fn detached_count(sweep_context: &SweepContext, count: usize) -> Result<(), StepError> {
    let summary = summary(sweep_context)?;
    check(summary.detached == count, || {
        format!("expected {count} detached, got {summary:?}")
    })
}

#[then("{count} volume group is deleted")]
fn deleted_count(sweep_context: &SweepContext, count: usize) -> Result<(), StepError> {
    let summary = summary(sweep_context)?;
    check(summary.deleted == count, || {
        format!("expected {count} deleted, got {summary:?}")
    })
}

#[then("the work-list records \"{name}\"")]
fn worklist_records(sweep_context: &SweepContext, name: String) -> Result<(), StepError> {
    let targets = worklist::load(&sweep_context.worklist)
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    check(
        targets
            .iter()
            .any(|target| target.volume_group_name == name.trim()),
        || format!("work-list does not record {name}: {targets:?}"),
    )
}

#[then("the run is cancelled")]
fn run_cancelled(sweep_context: &SweepContext) -> Result<(), StepError> {
    let outcome = outcome(sweep_context)?;
    check(*outcome == SweepOutcome::Cancelled, || {
        format!("expected cancellation, got {outcome:?}")
    })
}

#[then("the run reports nothing to do")]
fn nothing_to_do(sweep_context: &SweepContext) -> Result<(), StepError> {
    let outcome = outcome(sweep_context)?;
    check(matches!(outcome, SweepOutcome::NothingToDo(_)), || {
        format!("expected nothing to do, got {outcome:?}")
    })
}

#[then("no mutating request is sent")]
fn no_mutation(sweep_context: &SweepContext) -> Result<(), StepError> {
    let mutating: Vec<String> = sweep_context
        .sent
        .iter()
        .filter(|call| call.mutating)
        .map(SentCall::label)
        .collect();
    check(mutating.is_empty(), || {
        format!("unexpected mutating requests: {mutating:?}")
    })
}

#[then("no detach request is sent")]
fn no_detach(sweep_context: &SweepContext) -> Result<(), StepError> {
    let calls: Vec<String> = sweep_context.sent.iter().map(SentCall::label).collect();
    check(!calls.iter().any(|call| call.contains("detach")), || {
        format!("unexpected detach requests: {calls:?}")
    })
}

#[then("{count} delete failure is reported with \"{message}\"")]
fn delete_failures(
    sweep_context: &SweepContext,
    count: usize,
    message: String,
) -> Result<(), StepError> {
    let summary = summary(sweep_context)?;
    check(
        summary.delete_failures == count
            && summary
                .failures
                .iter()
                .all(|failure| failure.message == message.trim()),
        || format!("expected {count} delete failure(s) with {message}, got {summary:?}"),
    )
}

#[then("{count} delete requests were sent")]
fn delete_requests(sweep_context: &SweepContext, count: usize) -> Result<(), StepError> {
    let sent = sweep_context
        .sent
        .iter()
        .filter(|call| call.method == Method::Delete)
        .count();
    check(sent == count, || format!("expected {count} DELETE calls, got {sent}"))
}
