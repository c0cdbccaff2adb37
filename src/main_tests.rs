//! Unit tests for the `vgsweep` CLI binary implementation.

use super::*;
use rstest::{fixture, rstest};
use std::time::Duration;
use vgsweep::{EmptyReason, FailureStage, SweepSummary, TargetFailure};
use vgsweep::inventory::AttachmentTarget;

#[fixture]
fn config() -> PrismConfig {
    PrismConfig {
        endpoint: String::from("prism.example.test"),
        username: String::from("admin"),
        password: String::from("secret"),
        timeout_secs: 90,
        delete_retries: 3,
        retry_backoff_secs: String::from("2,5,10"),
        inter_target_delay_secs: 3,
        post_detach_wait_secs: 30,
        page_size: 500,
        pvc_prefix: String::from("pvc-"),
        worklist_path: String::from("saved.jsonl"),
        fail_on_target_errors: false,
    }
}

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("vgsweep").chain(args.iter().copied()))
        .expect("arguments should parse")
}

fn failed_summary() -> SweepSummary {
    SweepSummary {
        targets: 1,
        detach_failures: 1,
        failures: vec![TargetFailure {
            stage: FailureStage::Detach,
            target: AttachmentTarget {
                volume_group_id: String::from("vg-1"),
                volume_group_name: String::from("pvc-a"),
                attached_vm: None,
                attached_vm_name: None,
            },
            message: String::from("busy"),
        }],
        ..SweepSummary::default()
    }
}

#[rstest]
fn detach_only_uses_configured_worklist(config: PrismConfig) {
    let context = build_context(&parse(&["--cluster", "mgmt", "--detach-only"]), &config)
        .expect("context");

    assert_eq!(
        context.mode,
        SweepMode::DetachOnly {
            cluster: String::from("mgmt"),
            worklist: Utf8PathBuf::from("saved.jsonl"),
        }
    );
    assert_eq!(context.settings.post_detach_wait, Duration::from_secs(30));
}

#[rstest]
fn worklist_flag_overrides_config(config: PrismConfig) {
    let cli = parse(&["--cluster", "mgmt", "--detach-only", "--worklist", "/tmp/x.jsonl"]);
    let context = build_context(&cli, &config).expect("context");

    assert!(matches!(
        context.mode,
        SweepMode::DetachOnly { ref worklist, .. } if worklist == "/tmp/x.jsonl"
    ));
}

#[rstest]
#[case(
    &["--cluster", "mgmt"],
    SweepMode::DetachAndDelete { cluster: String::from("mgmt") }
)]
#[case(
    &["--volumes", "saved.jsonl"],
    SweepMode::DeleteFromFile { path: Utf8PathBuf::from("saved.jsonl") }
)]
fn selects_mode_from_source(
    config: PrismConfig,
    #[case] args: &[&str],
    #[case] expected: SweepMode,
) {
    let context = build_context(&parse(args), &config).expect("context");
    assert_eq!(context.mode, expected);
}

#[rstest]
fn blank_cluster_is_rejected(config: PrismConfig) {
    let err = build_context(&parse(&["--cluster", "  "]), &config).expect_err("blank cluster");
    assert!(matches!(err, CliError::Usage(_)), "unexpected error: {err}");
}

#[rstest]
fn missing_credentials_are_reported(mut config: PrismConfig) {
    config.password = String::new();
    let err = build_context(&parse(&["--cluster", "mgmt"]), &config).expect_err("no password");
    assert!(err.to_string().contains("PRISM_PASSWORD"), "unexpected error: {err}");
}

#[rstest]
#[case(&["--cluster", "a", "--volumes", "b"])]
#[case(&["--volumes", "b", "--detach-only"])]
#[case(&["--cluster", "a", "--worklist", "w.jsonl"])]
#[case(&["--strict"])]
fn conflicting_arguments_are_rejected(#[case] args: &[&str]) {
    assert!(Cli::try_parse_from(std::iter::once("vgsweep").chain(args.iter().copied())).is_err());
}

#[rstest]
fn strict_flag_or_config_enables_failure_exit(mut config: PrismConfig) {
    let strict =
        build_context(&parse(&["--cluster", "mgmt", "--strict"]), &config).expect("context");
    assert!(strict.fail_on_target_errors);

    config.fail_on_target_errors = true;
    let configured = build_context(&parse(&["--cluster", "mgmt"]), &config).expect("context");
    assert!(configured.fail_on_target_errors);
}

#[rstest]
#[case(SweepOutcome::Cancelled, true, 0)]
#[case(SweepOutcome::NothingToDo(EmptyReason::NoPoweredOffVms { tagged_vms: 0 }), true, 0)]
#[case(SweepOutcome::Completed(SweepSummary::default()), true, 0)]
#[case(SweepOutcome::Completed(failed_summary()), false, 0)]
#[case(SweepOutcome::Completed(failed_summary()), true, TARGET_FAILURE_EXIT)]
fn exit_code_reflects_policy(
    #[case] outcome: SweepOutcome,
    #[case] strict: bool,
    #[case] expected: i32,
) {
    assert_eq!(exit_code(&outcome, strict), expected);
}

#[test]
fn write_error_prefixes_binary_name() {
    let mut buf = Vec::new();
    write_error(&mut buf, &CliError::Usage(String::from("bad")));
    let rendered = String::from_utf8(buf).expect("utf8");
    assert_eq!(rendered, "vgsweep: invalid arguments: bad\n");
}
