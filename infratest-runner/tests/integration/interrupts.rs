// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use infratest_metadata::InfratestExitCode;
use infratest_runner::{
    Status,
    engine::ChangeAction,
    errors::TestRunnerExecuteError,
    interrupt::InterruptTokens,
    reporter::TestEventKind,
    signal::SignalHandlerKind,
    variables::UnparsedVariables,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{thread, time::Duration};

#[test]
fn first_interrupt_skips_remaining_runs() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let tokens = InterruptTokens::new();
    let (interrupts, kind) = SignalHandlerKind::simulated();
    let mut builder = builder();
    builder
        .set_signal_handler(kind)
        .set_interrupt_tokens(tokens.clone());

    let suite = suite(vec![
        (
            "a.tftest",
            file(vec![
                module_run(
                    "gated",
                    module("gated", json!({ "resources": ["fake_thing.m"], "gate": true })),
                ),
                apply_run("second", &[]),
                apply_run("third", &[]),
            ]),
        ),
        ("b.tftest", file(vec![apply_run("other", &[])])),
    ]);

    let helper = {
        let engine = engine.clone();
        thread::spawn(move || {
            engine.gate().wait_entered(1);
            assert!(interrupts.interrupt());
            wait_until(|| tokens.is_stopped());
            // A soft stop lets the in-flight apply finish.
            engine.gate().release();
        })
    };

    let collected = execute_collect(
        builder,
        suite,
        module("main", json!({ "resources": ["fake_thing.main"] })),
        engine.clone(),
        UnparsedVariables::new(),
    )?;
    helper.join().expect("helper thread panicked");

    assert_eq!(
        collected.names(),
        [
            "suite-started",
            "interrupted",
            "file-finished",
            "run-finished",
            "run-finished",
            "run-finished",
            "destroy-summary",
            "destroy-summary",
            "file-finished",
            "run-finished",
            "destroy-summary",
            "suite-finished",
        ]
    );
    assert_eq!(
        collected.statuses("a.tftest"),
        [
            ("gated", Status::Skip),
            ("second", Status::Skip),
            ("third", Status::Skip),
        ]
    );
    assert_eq!(collected.statuses("b.tftest"), [("other", Status::Skip)]);
    assert!(!collected.outcome.cancelled);
    assert_eq!(
        collected.outcome.exit_code(),
        InfratestExitCode::TEST_RUN_FAILED
    );

    // The completed apply is still cleaned up, and nothing else touched the engine.
    assert_eq!(
        engine.log(),
        [
            "plan normal gated",
            "apply gated",
            "plan destroy gated",
            "destroy gated: fake_thing.m",
        ]
    );
    assert_eq!(engine.gate().stop_requests(), 0, "a soft stop doesn't stop the engine");
    Ok(())
}

#[test]
fn second_interrupt_cancels() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let (interrupts, kind) = SignalHandlerKind::simulated();
    let mut builder = builder();
    builder.set_signal_handler(kind);

    let suite = suite(vec![
        (
            "a.tftest",
            file(vec![
                apply_run("setup", &[]),
                module_run(
                    "gated",
                    module("gated", json!({ "resources": ["fake_thing.m"], "gate": true })),
                ),
                apply_run("after", &[]),
            ]),
        ),
        ("b.tftest", file(vec![apply_run("untouched", &[])])),
    ]);

    let helper = {
        let engine = engine.clone();
        thread::spawn(move || {
            engine.gate().wait_entered(1);
            assert!(interrupts.interrupt());
            assert!(interrupts.interrupt());
        })
    };

    let collected = execute_collect(
        builder,
        suite,
        module("main", json!({ "resources": ["fake_thing.main"] })),
        engine.clone(),
        UnparsedVariables::new(),
    )?;
    helper.join().expect("helper thread panicked");

    assert!(collected.outcome.cancelled);
    assert_eq!(
        collected.outcome.exit_code(),
        InfratestExitCode::TEST_RUN_FAILED
    );

    let names = collected.names();
    for unexpected in ["file-finished", "destroy-summary", "suite-finished"] {
        assert!(!names.contains(&unexpected), "{unexpected} in {names:?}");
    }
    assert!(names.contains(&"interrupted"));
    assert!(names.contains(&"fatal-interrupt"));

    let summary = collected
        .events
        .iter()
        .find_map(|event| match event {
            TestEventKind::FatalInterruptSummary {
                file,
                run,
                module,
                states,
                created,
            } => Some((file, run, module, states, created)),
            _ => None,
        })
        .expect("fatal interrupt summary sent");
    let (file, run, module, states, created) = summary;
    assert_eq!(file, "a.tftest");
    assert_eq!(run.as_ref().map(|run| run.name.as_str()), Some("gated"));
    assert_eq!(module.as_deref(), Some("gated"));
    let states: Vec<_> = states
        .iter()
        .map(|(run, state)| {
            (
                run.is_none(),
                state.addresses().map(|a| a.to_string()).collect::<Vec<_>>(),
            )
        })
        .collect();
    assert_eq!(states, [(true, vec!["fake_thing.main".to_owned()])]);
    let created: Vec<_> = created
        .iter()
        .map(|change| (change.address.to_string(), change.action))
        .collect();
    assert_eq!(created, [("fake_thing.m".to_owned(), ChangeAction::Create)]);

    let run_diags = collected
        .events
        .iter()
        .find_map(|event| match event {
            TestEventKind::RunDiagnostics { run, diagnostics } => Some((run, diagnostics)),
            _ => None,
        })
        .expect("run diagnostics sent");
    assert_eq!(run_diags.0.name, "gated");
    assert!(run_diags.1.has_errors());

    assert_eq!(
        collected.statuses("a.tftest"),
        [
            ("setup", Status::Pass),
            ("gated", Status::Error),
            ("after", Status::Pending),
        ]
    );
    assert_eq!(
        collected.statuses("b.tftest"),
        [("untouched", Status::Pending)]
    );

    // Cleanup was abandoned.
    assert!(
        engine.log().iter().all(|entry| !entry.contains("destroy")),
        "log: {:?}",
        engine.log()
    );
    assert_eq!(engine.gate().stop_requests(), 1);
    Ok(())
}

/// Every fatal interrupt summary, as `(run name, created addresses)`.
fn fatal_summaries(collected: &Collected) -> Vec<(Option<String>, Vec<String>)> {
    collected
        .events
        .iter()
        .filter_map(|event| match event {
            TestEventKind::FatalInterruptSummary { run, created, .. } => Some((
                run.as_ref().map(|run| run.name.clone()),
                created.iter().map(|change| change.address.to_string()).collect(),
            )),
            _ => None,
        })
        .collect()
}

#[test]
fn cancel_during_plan() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let (interrupts, kind) = SignalHandlerKind::simulated();
    let mut builder = builder();
    builder.set_signal_handler(kind);

    let suite = suite(vec![(
        "a.tftest",
        file(vec![
            module_run(
                "planning",
                module(
                    "planning",
                    json!({ "resources": ["fake_thing.p"], "gate-plan": true }),
                ),
            ),
            apply_run("after", &[]),
        ]),
    )]);

    let helper = {
        let engine = engine.clone();
        thread::spawn(move || {
            engine.gate().wait_entered(1);
            assert!(interrupts.interrupt());
            assert!(interrupts.interrupt());
        })
    };

    let collected = execute_collect(
        builder,
        suite,
        module("main", json!({ "resources": ["fake_thing.main"] })),
        engine.clone(),
        UnparsedVariables::new(),
    )?;
    helper.join().expect("helper thread panicked");

    assert!(collected.outcome.cancelled);
    assert_eq!(
        collected.statuses("a.tftest"),
        [("planning", Status::Error), ("after", Status::Pending)]
    );
    assert_eq!(
        fatal_summaries(&collected),
        [(Some("planning".to_owned()), vec![])]
    );

    // No apply context was ever created, and nothing was cleaned up.
    assert_eq!(engine.log(), ["plan normal planning"]);
    assert_eq!(engine.contexts_created(), 1);
    assert_eq!(engine.gate().stop_requests(), 1);
    Ok(())
}

#[test]
fn cancel_after_planning_skips_apply() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let tokens = InterruptTokens::new();
    engine.cancel_after_planning(tokens.clone());
    let mut builder = builder();
    builder.set_interrupt_tokens(tokens);

    let suite = suite(vec![(
        "a.tftest",
        file(vec![apply_run("setup", &[]), apply_run("after", &[])]),
    )]);

    let collected = execute_collect(
        builder,
        suite,
        module("main", json!({ "resources": ["fake_thing.main"] })),
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    assert!(collected.outcome.cancelled);
    assert_eq!(
        collected.statuses("a.tftest"),
        [("setup", Status::Error), ("after", Status::Pending)]
    );
    // Whether the cancel is seen while waiting for the plan or just after it, it's reported once.
    assert_eq!(fatal_summaries(&collected), [(Some("setup".to_owned()), vec![])]);

    assert_eq!(engine.log(), ["plan normal main"]);
    assert_eq!(engine.contexts_created(), 1, "no apply context");
    Ok(())
}

#[test]
fn cancel_during_cleanup() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let (interrupts, kind) = SignalHandlerKind::simulated();
    let mut builder = builder();
    builder.set_signal_handler(kind);

    let suite = suite(vec![
        (
            "a.tftest",
            file(vec![
                module_run("first", module("mod-one", json!({ "resources": ["fake_thing.one"] }))),
                module_run(
                    "second",
                    module(
                        "mod-two",
                        json!({ "resources": ["fake_thing.two"], "gate-destroy": true }),
                    ),
                ),
            ]),
        ),
        ("b.tftest", file(vec![apply_run("untouched", &[])])),
    ]);

    let helper = {
        let engine = engine.clone();
        thread::spawn(move || {
            engine.gate().wait_entered(1);
            assert!(interrupts.interrupt());
            assert!(interrupts.interrupt());
        })
    };

    let collected = execute_collect(
        builder,
        suite,
        module("main", json!({})),
        engine.clone(),
        UnparsedVariables::new(),
    )?;
    helper.join().expect("helper thread panicked");

    assert!(collected.outcome.cancelled);
    // Every run finished before cleanup started, so the file was reported.
    assert!(collected.names().contains(&"file-finished"));
    assert_eq!(
        collected.statuses("a.tftest"),
        [("first", Status::Pass), ("second", Status::Pass)]
    );
    assert_eq!(
        collected.statuses("b.tftest"),
        [("untouched", Status::Pending)]
    );

    // The interrupted destroy is reported, and the earlier module's state is left alone.
    assert_eq!(
        collected.destroy_summaries(),
        [
            (None, vec![], false),
            (
                Some("second".to_owned()),
                vec!["fake_thing.two".to_owned()],
                true
            ),
        ]
    );
    assert_eq!(
        engine.log(),
        [
            "plan normal mod-one",
            "apply mod-one",
            "plan normal mod-two",
            "apply mod-two",
            "plan destroy mod-two",
            "destroy mod-two: fake_thing.two",
        ]
    );
    assert_eq!(engine.gate().stop_requests(), 1);
    Ok(())
}

#[test]
fn unresponsive_engine_is_abandoned() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let (interrupts, kind) = SignalHandlerKind::simulated();
    let mut builder = builder();
    builder
        .set_signal_handler(kind)
        .set_cancel_grace_period(Duration::from_millis(200));

    let suite = suite(vec![(
        "stuck.tftest",
        file(vec![module_run(
            "stuck",
            module(
                "stuck",
                json!({ "resources": ["fake_thing.s"], "gate": true, "ignore-stop": true }),
            ),
        )]),
    )]);

    let helper = {
        let engine = engine.clone();
        thread::spawn(move || {
            engine.gate().wait_entered(1);
            assert!(interrupts.interrupt());
            assert!(interrupts.interrupt());
        })
    };

    let collected = execute_collect(
        builder,
        suite,
        module("main", json!({})),
        engine.clone(),
        UnparsedVariables::new(),
    );
    helper.join().expect("helper thread panicked");
    // Unblock the abandoned apply.
    engine.gate().release();
    let collected = collected?;

    assert!(collected.outcome.suite.is_none(), "suite was abandoned");
    assert!(collected.outcome.cancelled);
    assert_eq!(
        collected.outcome.exit_code(),
        InfratestExitCode::TEST_RUN_FAILED
    );

    let names = collected.names();
    assert_eq!(&names[..3], ["suite-started", "interrupted", "fatal-interrupt"]);
    assert!(!names.contains(&"suite-finished"));
    Ok(())
}

#[test]
fn reporter_errors_stop_the_suite() -> Result<()> {
    test_init();

    let engine = FakeEngine::new();
    let suite = suite(vec![(
        "a.tftest",
        file(vec![apply_run("first", &[]), apply_run("second", &[])]),
    )]);
    let runner = builder().build(
        suite,
        module("main", json!({ "resources": ["fake_thing.a"] })),
        engine.clone(),
        UnparsedVariables::new(),
    )?;

    let mut names = Vec::new();
    let res = runner.try_execute(|event| {
        names.push(event.kind.name());
        match event.kind {
            TestEventKind::SuiteStarted { .. } => Err("output closed"),
            _ => Ok(()),
        }
    });

    match res {
        Err(TestRunnerExecuteError::ReportError(error)) => assert_eq!(error, "output closed"),
        other => panic!("expected a report error, got {other:?}"),
    }

    // Events keep flowing after the error, and every run is skipped.
    assert_eq!(
        names,
        [
            "suite-started",
            "file-finished",
            "run-finished",
            "run-finished",
            "destroy-summary",
            "suite-finished",
        ]
    );
    assert_eq!(engine.contexts_created(), 0);
    Ok(())
}
