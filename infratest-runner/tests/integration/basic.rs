// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use infratest_metadata::InfratestExitCode;
use infratest_runner::{
    Status,
    addrs::Address,
    config::ReporterFormat,
    diagnostics::Severity,
    engine::PlanMode,
    reporter::{ReporterOutput, TestReporterBuilder},
    suite::{ProviderMapping, RunConfig, TestCommand, TestFileConfig, TestMode},
    variables::{UnparsedVariables, ValueSource},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

#[test]
fn setup_then_check() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let config = module("main", json!({ "resources": ["fake_thing.a"] }));
    let suite = suite(vec![(
        "main.tftest",
        file(vec![
            apply_run("setup", &["exists fake_thing.a"]),
            plan_run("check", &["exists fake_thing.a"]),
        ]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        config,
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert_eq!(
        collected.names(),
        [
            "suite-started",
            "file-finished",
            "run-finished",
            "run-finished",
            "destroy-summary",
            "suite-finished",
        ]
    );
    assert_eq!(
        engine.log(),
        [
            "plan normal main",
            "apply main",
            "plan normal main",
            "plan destroy main",
            "destroy main: fake_thing.a",
        ]
    );
    assert_eq!(engine.contexts_created(), 5, "plan and apply each get a context");

    assert_eq!(
        collected.statuses("main.tftest"),
        [("setup", Status::Pass), ("check", Status::Pass)]
    );
    assert_eq!(collected.file("main.tftest").status, Status::Pass);
    assert_eq!(collected.destroy_summaries(), [(None, vec![], false)]);
    assert_eq!(collected.outcome.exit_code(), InfratestExitCode::OK);
    Ok(())
}

#[test]
fn plan_runs_check_planned_state() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let suite = suite(vec![(
        "plan.tftest",
        file(vec![plan_run("check", &["exists fake_thing.a"])]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        module("main", json!({ "resources": ["fake_thing.a"] })),
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    // Nothing was applied, yet the assertion sees the resource the plan would create.
    assert_eq!(collected.statuses("plan.tftest"), [("check", Status::Pass)]);
    assert_eq!(engine.log(), ["plan normal main"]);
    assert_eq!(engine.contexts_created(), 1);
    assert_eq!(collected.destroy_summaries(), [(None, vec![], false)]);
    Ok(())
}

#[test]
fn check_block_warnings_dropped_before_apply() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let suite = suite(vec![(
        "checks.tftest",
        file(vec![apply_run("apply", &[]), plan_run("plan", &[])]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        module(
            "main",
            json!({ "resources": ["fake_thing.a"], "failing-checks": ["check.health"] }),
        ),
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert_eq!(
        collected.statuses("checks.tftest"),
        [("apply", Status::Pass), ("plan", Status::Pass)]
    );
    let runs = &collected.file("checks.tftest").runs;
    assert!(
        runs[0].diagnostics.is_empty(),
        "apply kept stale check warnings: {:?}",
        runs[0].diagnostics
    );
    let plan_diags: Vec<_> = runs[1]
        .diagnostics
        .iter()
        .map(|diag| (diag.severity, diag.summary.as_str()))
        .collect();
    assert_eq!(
        plan_diags,
        [(Severity::Warning, "Check block assertion failed")]
    );
    Ok(())
}

#[test]
fn failures_continue_and_errors_skip() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let config = module("main", json!({ "resources": ["fake_thing.a"] }));
    let suite = suite(vec![(
        "status.tftest",
        file(vec![
            apply_run("fails", &["absent fake_thing.a"]),
            apply_run("passes", &["exists fake_thing.a"]),
            apply_run("errors", &["frobnicate fake_thing.a"]),
            apply_run("skipped", &[]),
        ]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        config,
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert_eq!(
        collected.statuses("status.tftest"),
        [
            ("fails", Status::Fail),
            ("passes", Status::Pass),
            ("errors", Status::Error),
            ("skipped", Status::Skip),
        ]
    );
    assert_eq!(collected.file("status.tftest").status, Status::Error);
    assert_eq!(collected.suite().status, Status::Error);
    assert_eq!(
        collected.outcome.exit_code(),
        InfratestExitCode::TEST_RUN_FAILED
    );

    let skipped = &collected.file("status.tftest").runs[3];
    assert!(skipped.diagnostics.is_empty(), "skipped runs say nothing");

    // The skipped run never reached the engine, but the state is still destroyed.
    let applies = engine
        .log()
        .iter()
        .filter(|entry| entry.starts_with("apply"))
        .count();
    assert_eq!(applies, 3);
    assert_eq!(collected.destroy_summaries(), [(None, vec![], false)]);
    Ok(())
}

#[test]
fn nothing_to_destroy() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let suite = suite(vec![(
        "plan.tftest",
        file(vec![plan_run("plan-only", &["absent fake_thing.a"])]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        module("main", json!({})),
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert_eq!(collected.statuses("plan.tftest"), [("plan-only", Status::Pass)]);
    assert_eq!(engine.log(), ["plan normal main"]);
    assert_eq!(collected.destroy_summaries(), [(None, vec![], false)]);
    Ok(())
}

#[test]
fn modules_are_destroyed_in_reverse() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let config = module("main", json!({ "resources": ["fake_thing.main"] }));
    let suite = suite(vec![(
        "modules.tftest",
        file(vec![
            module_run(
                "first",
                module("mod-one", json!({ "resources": ["fake_thing.one"] })),
            ),
            module_run(
                "second",
                module("mod-two", json!({ "resources": ["fake_thing.two"] })),
            ),
            apply_run("main", &["exists fake_thing.main", "absent fake_thing.one"]),
        ]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        config,
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert_eq!(
        collected.statuses("modules.tftest"),
        [
            ("first", Status::Pass),
            ("second", Status::Pass),
            ("main", Status::Pass),
        ]
    );

    let destroys: Vec<_> = engine
        .log()
        .into_iter()
        .filter(|entry| entry.starts_with("destroy"))
        .collect();
    assert_eq!(
        destroys,
        [
            "destroy main: fake_thing.main",
            "destroy mod-two: fake_thing.two",
            "destroy mod-one: fake_thing.one",
        ]
    );
    assert_eq!(
        collected.destroy_summaries(),
        [
            (None, vec![], false),
            (Some("second".to_owned()), vec![], false),
            (Some("first".to_owned()), vec![], false),
        ]
    );
    Ok(())
}

#[test]
fn module_runs_start_from_empty_state() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let shared = module("shared", json!({ "resources": ["fake_thing.x"] }));
    let suite = suite(vec![(
        "isolation.tftest",
        file(vec![
            module_run("one", shared.clone()),
            module_run("two", shared),
            plan_run("main-check", &["absent fake_thing.x"]),
        ]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        module("main", json!({})),
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert_eq!(
        collected.statuses("isolation.tftest"),
        [
            ("one", Status::Pass),
            ("two", Status::Pass),
            ("main-check", Status::Pass),
        ]
    );

    // Each run planned a create from scratch, so each has its own state to destroy.
    let destroys: Vec<_> = engine
        .log()
        .into_iter()
        .filter(|entry| entry.starts_with("destroy"))
        .collect();
    assert_eq!(
        destroys,
        ["destroy shared: fake_thing.x", "destroy shared: fake_thing.x"]
    );
    Ok(())
}

#[test]
fn expected_failures() -> Result<()> {
    test_init();

    let failing = module(
        "failing",
        json!({ "failing-checks": ["fake_thing.a", "check.health"] }),
    );
    let expecting = |name: &str, expected: &[&str]| RunConfig {
        command: TestCommand::Plan,
        expect_failures: expected
            .iter()
            .map(|addr| Address::parse_checkable(addr).expect("valid checkable"))
            .collect(),
        ..module_run(name, failing.clone())
    };

    let engine = FakeEngine::new();
    let suite = suite(vec![(
        "expect.tftest",
        file(vec![
            expecting("expected", &["fake_thing.a"]),
            expecting("missing", &["fake_thing.a", "fake_thing.b"]),
        ]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        module("main", json!({})),
        engine,
        UnparsedVariables::new(),
    )?;

    assert_eq!(
        collected.statuses("expect.tftest"),
        [("expected", Status::Pass), ("missing", Status::Error)]
    );

    let expected = &collected.file("expect.tftest").runs[0];
    ensure!(
        expected
            .diagnostics
            .iter()
            .all(|diag| diag.severity == Severity::Warning),
        "expected failures are downgraded: {:?}",
        expected.diagnostics
    );

    let missing = &collected.file("expect.tftest").runs[1];
    let errors: Vec<_> = missing
        .diagnostics
        .iter()
        .filter(|diag| diag.is_error())
        .map(|diag| (diag.summary.as_str(), diag.address.as_ref().map(Address::as_str)))
        .collect();
    assert_eq!(
        errors,
        [("Missing expected failure", Some("fake_thing.b"))]
    );
    Ok(())
}

#[test]
fn variable_precedence() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let config = module_with_variables(
        "main",
        &[
            ("region", Some(json!("default-region"))),
            ("size", None),
            ("name", Some(json!("default-name"))),
            ("zone", Some(json!("default-zone"))),
        ],
        json!({}),
    );
    let file_config = TestFileConfig {
        variables: vars(&[("region", "file-region")]),
        ..file(vec![RunConfig {
            variables: vars(&[("name", "run-name")]),
            ..plan_run(
                "vars",
                &[
                    r#"var region "file-region""#,
                    "var size 3",
                    r#"var name "run-name""#,
                    r#"var zone "default-zone""#,
                ],
            )
        }])
    };
    let suite = suite(vec![("vars.tftest", file_config)]);

    let collected = execute_collect(
        builder(),
        suite,
        config,
        engine.clone(),
        vars(&[("size", "3"), ("region", "global-region")]),
    )?;

    assert_eq!(collected.statuses("vars.tftest"), [("vars", Status::Pass)]);

    let plans = engine.plans();
    assert_eq!(plans.len(), 1);
    let sources: Vec<_> = plans[0]
        .1
        .set_variables
        .iter()
        .map(|(name, input)| (name.as_str(), input.source))
        .collect();
    assert_eq!(
        sources,
        [
            ("name", ValueSource::Run),
            ("region", ValueSource::File),
            ("size", ValueSource::Global),
            ("zone", ValueSource::Default),
        ]
    );
    Ok(())
}

#[test]
fn missing_required_variable() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let config = module_with_variables("main", &[("size", None)], json!({}));
    let suite = suite(vec![(
        "vars.tftest",
        file(vec![apply_run("unset", &[]), apply_run("after", &[])]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        config,
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert_eq!(
        collected.statuses("vars.tftest"),
        [("unset", Status::Error), ("after", Status::Skip)]
    );
    assert!(collected.file("vars.tftest").runs[0].diagnostics.has_errors());
    assert_eq!(engine.contexts_created(), 0, "nothing was planned");
    Ok(())
}

#[test]
fn missing_provider_definition() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let run = RunConfig {
        providers: vec![ProviderMapping {
            in_child: "aws".to_owned(),
            in_parent: "aws.nope".to_owned(),
        }],
        ..apply_run("mapped", &[])
    };
    let suite = suite(vec![("providers.tftest", file(vec![run]))]);

    let collected = execute_collect(
        builder(),
        suite,
        module("main", json!({})),
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    let run = &collected.file("providers.tftest").runs[0];
    assert_eq!(run.status, Status::Error);
    let summaries: Vec<_> = run.diagnostics.iter().map(|diag| diag.summary.as_str()).collect();
    assert_eq!(summaries, ["Missing provider definition for aws.nope"]);
    assert_eq!(engine.contexts_created(), 0);
    Ok(())
}

#[test]
fn plan_errors_skip_apply() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let suite = suite(vec![(
        "broken.tftest",
        file(vec![apply_run("broken", &["exists fake_thing.a"])]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        module("main", json!({ "resources": ["fake_thing.a"], "plan-error": true })),
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert_eq!(collected.statuses("broken.tftest"), [("broken", Status::Error)]);
    assert_eq!(engine.log(), ["plan normal main"]);
    Ok(())
}

#[test]
fn failed_destroy_is_reported() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let suite = suite(vec![(
        "leak.tftest",
        file(vec![apply_run("create", &[])]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        module(
            "main",
            json!({ "resources": ["fake_thing.a"], "destroy-error": true }),
        ),
        engine,
        UnparsedVariables::new(),
    )?;

    // The runs passed, so the suite did too. Leftovers are reported separately.
    assert_eq!(collected.suite().status, Status::Pass);
    assert_eq!(
        collected.destroy_summaries(),
        [(None, vec!["fake_thing.a".to_owned()], true)]
    );
    Ok(())
}

#[test_case(false ; "quiet")]
#[test_case(true ; "verbose")]
fn verbose_output(verbose: bool) -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let suite = suite(vec![(
        "verbose.tftest",
        file(vec![
            apply_run("main", &[]),
            module_run("no-schemas", module("broken", json!({ "schema-error": true }))),
        ]),
    )]);

    let mut builder = builder();
    builder.set_verbose(verbose);
    let collected = execute_collect(
        builder,
        suite,
        module("main", json!({ "resources": ["fake_thing.a"] })),
        engine,
        UnparsedVariables::new(),
    )?;

    assert_eq!(
        collected.statuses("verbose.tftest"),
        [("main", Status::Pass), ("no-schemas", Status::Pass)]
    );

    let runs = &collected.file("verbose.tftest").runs;
    if !verbose {
        assert!(runs.iter().all(|run| run.verbose.is_none()));
        assert!(runs.iter().all(|run| run.diagnostics.is_empty()));
        return Ok(());
    }

    let recorded = runs[0].verbose.as_ref().expect("verbose output recorded");
    assert_eq!(recorded.config.source, "main");
    assert!(recorded.providers.contains_key("fake"));
    assert_eq!(
        recorded.state.addresses().map(Address::as_str).collect::<Vec<_>>(),
        ["fake_thing.a"]
    );

    // A schema failure only produces warnings.
    assert!(runs[1].verbose.is_none());
    let diags: Vec<_> = runs[1]
        .diagnostics
        .iter()
        .map(|diag| (diag.severity, diag.summary.as_str()))
        .collect();
    assert_eq!(
        diags,
        [
            (Severity::Warning, "Failed to load schemas"),
            (Severity::Warning, "Failed to print verbose output"),
        ]
    );
    Ok(())
}

#[test]
fn refresh_only_runs() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let mut refresh = plan_run("refresh", &["exists fake_thing.a"]);
    refresh.options.mode = TestMode::RefreshOnly;
    let suite = suite(vec![(
        "refresh.tftest",
        file(vec![apply_run("setup", &[]), refresh]),
    )]);

    let collected = execute_collect(
        builder(),
        suite,
        module("main", json!({ "resources": ["fake_thing.a"] })),
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert_eq!(
        collected.statuses("refresh.tftest"),
        [("setup", Status::Pass), ("refresh", Status::Pass)]
    );
    let modes: Vec<_> = engine.plans().iter().map(|(_, opts)| opts.mode).collect();
    assert_eq!(
        modes,
        [PlanMode::Normal, PlanMode::RefreshOnly, PlanMode::Destroy]
    );
    Ok(())
}

#[test]
fn json_reporter_end_to_end() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let suite = suite(vec![(
        "json.tftest",
        file(vec![apply_run("only", &["exists fake_thing.a"])]),
    )]);
    let runner = builder().build(
        suite,
        module("main", json!({ "resources": ["fake_thing.a"] })),
        engine,
        UnparsedVariables::new(),
    )?;

    let mut out = Vec::new();
    let mut reporter_builder = TestReporterBuilder::default();
    reporter_builder.set_format(ReporterFormat::Json);
    let mut reporter = reporter_builder.build(ReporterOutput::Buffer(&mut out));
    let outcome = runner.try_execute(|event| reporter.report_event(&event))?;
    drop(reporter);
    assert_eq!(outcome.exit_code(), InfratestExitCode::OK);

    let lines: Vec<serde_json::Value> = String::from_utf8(out)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    let types: Vec<_> = lines
        .iter()
        .map(|line| line["type"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(
        types,
        [
            "suite-started",
            "file-finished",
            "run-finished",
            "destroy-summary",
            "suite-finished",
        ]
    );

    let conclusion = &lines[4];
    assert_eq!(conclusion["summary"]["status"], "pass");
    assert_eq!(conclusion["summary"]["files"][0]["runs"][0]["name"], "only");
    for line in &lines {
        ensure!(line["elapsed"].is_f64(), "elapsed is a number: {line}");
        ensure!(line["timestamp"].is_string(), "timestamp is a string: {line}");
    }
    Ok(())
}
