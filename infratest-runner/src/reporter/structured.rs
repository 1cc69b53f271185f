// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Machine-readable output: one JSON object per event, one event per line.
//!
//! Every object has `type`, `timestamp` (RFC 3339) and `elapsed` (seconds) keys. The remaining
//! keys depend on the type. Suite, file and run summaries use the types from
//! [`infratest_metadata`].

use super::{
    displayer::fatal_interrupt_diagnostics,
    events::{TestEvent, TestEventKind},
};
use crate::{engine::State, errors::WriteEventError, suite::RunIdentity};
use serde_json::{Value, json};
use std::io::Write;

#[derive(Debug, Default)]
pub(super) struct JsonReporter;

impl JsonReporter {
    pub(super) fn write_event(
        &self,
        event: &TestEvent,
        writer: &mut dyn Write,
    ) -> Result<(), WriteEventError> {
        let mut object = json!({
            "type": event.kind.name(),
            "timestamp": event.timestamp.to_rfc3339(),
            "elapsed": event.elapsed.as_secs_f64(),
        });

        let fields = event_fields(&event.kind).map_err(WriteEventError::Json)?;
        if let (Value::Object(object), Value::Object(fields)) = (&mut object, fields) {
            object.extend(fields);
        }

        serde_json::to_writer(&mut *writer, &object).map_err(WriteEventError::Json)?;
        writeln!(writer)?;
        Ok(())
    }
}

fn event_fields(kind: &TestEventKind) -> Result<Value, serde_json::Error> {
    let value = match kind {
        TestEventKind::SuiteStarted { summary } | TestEventKind::SuiteFinished { summary } => {
            json!({ "summary": serde_json::to_value(summary)? })
        }
        TestEventKind::SuiteDiagnostics { diagnostics } => {
            json!({ "diagnostics": serde_json::to_value(diagnostics.to_summaries())? })
        }
        TestEventKind::RunDiagnostics { run, diagnostics } => json!({
            "file": run.file,
            "run": run.name,
            "diagnostics": serde_json::to_value(diagnostics.to_summaries())?,
        }),
        TestEventKind::FileFinished { file } => json!({
            "file": file.name,
            "status": file.status,
        }),
        TestEventKind::RunFinished { run } => json!({
            "file": run.id.file,
            "run": serde_json::to_value(run.to_summary())?,
        }),
        TestEventKind::Interrupted | TestEventKind::FatalInterrupt => json!({}),
        TestEventKind::FatalInterruptSummary {
            file,
            run,
            module,
            states,
            created,
        } => {
            let diags =
                fatal_interrupt_diagnostics(file, run.as_ref(), module.as_deref(), states, created);
            json!({
                "file": file,
                "run": run.as_ref().map(|run| &run.name),
                "states": states
                    .iter()
                    .map(|(owner, state)| json!({
                        "run": owner.as_ref().map(|owner| &owner.name),
                        "resources": resource_list(state),
                    }))
                    .collect::<Vec<_>>(),
                "created": created
                    .iter()
                    .map(|change| change.address.to_string())
                    .collect::<Vec<_>>(),
                "diagnostics": serde_json::to_value(diags.to_summaries())?,
            })
        }
        TestEventKind::DestroySummary {
            file,
            run,
            state,
            diagnostics,
        } => json!({
            "file": file,
            "run": run.as_ref().map(|run: &RunIdentity| &run.name),
            "resources": resource_list(state),
            "diagnostics": serde_json::to_value(diagnostics.to_summaries())?,
        }),
    };
    Ok(value)
}

fn resource_list(state: &State) -> Vec<String> {
    state.addresses().map(|address| address.to_string()).collect()
}
