use std::path::Path;

use serde::Serialize;

use crate::error::DocumentError;
use crate::store::{AtomicStore, ReadOutcome};

use super::parse::{REQUIRED_PRIMS, Value, parse, parse_stage};
use super::types::{MessageType, SyncStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub file_exists: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub sync_status: Option<SyncStatus>,
    pub message_type: Option<MessageType>,
}

/// Structural check of the bridge document at `path`. Never repairs.
pub fn validate_bridge_state(store: &AtomicStore, path: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();
    let text = match store.read(path) {
        ReadOutcome::Content(text) => text,
        ReadOutcome::Absent => {
            report
                .errors
                .push(format!("file not found: {}", path.display()));
            return report;
        }
        ReadOutcome::Unavailable => {
            report.file_exists = true;
            report
                .errors
                .push("could not read file (locked or permission denied)".into());
            return report;
        }
    };
    report.file_exists = true;
    validate_text(&text, &mut report);
    report
}

/// Same checks as [`validate_bridge_state`] on text already in memory.
pub fn validate_text(text: &str, report: &mut ValidationReport) {
    if !text.starts_with("#usda 1.0") {
        report.errors.push("missing or invalid USDA header".into());
    }

    let stage = match parse_stage(text) {
        Ok(stage) => stage,
        Err(e) => {
            report.errors.push(e.to_string());
            report.valid = false;
            return;
        }
    };

    let Some(root) = stage.default_prim() else {
        report
            .errors
            .push("missing defaultPrim = \"BridgeState\"".into());
        return;
    };
    if root.name != "BridgeState" {
        report.errors.push(format!(
            "defaultPrim is '{}', expected 'BridgeState'",
            root.name
        ));
    }

    for prim in REQUIRED_PRIMS {
        if root.child(prim).is_none() {
            report.errors.push(format!("missing required prim: {prim}"));
        }
    }
    if root.child("BehavioralSignals").is_none() {
        report
            .warnings
            .push("BehavioralSignals prim absent; defaults assumed".into());
    }

    let selection = |set: &str| match root.metadata.get("variants") {
        Some(Value::Dict(dict)) => match dict.get(set) {
            Some(Value::Str(s)) => Some(s.clone()),
            _ => None,
        },
        _ => None,
    };
    match selection("sync_status").map(|s| SyncStatus::parse(&s)) {
        Some(Ok(status)) => report.sync_status = Some(status),
        Some(Err(e)) => report.errors.push(e.to_string()),
        None => report
            .errors
            .push("could not parse sync_status variant".into()),
    }
    match selection("message_type").map(|s| MessageType::parse(&s)) {
        Some(Ok(kind)) => report.message_type = Some(kind),
        Some(Err(e)) => report.errors.push(e.to_string()),
        None => report
            .errors
            .push("could not parse message_type variant".into()),
    }

    if report.errors.is_empty()
        && let Err(e) = parse(text)
    {
        // Structure is fine but a section value is not (bad direction etc.)
        match e {
            DocumentError::Malformed { missing } => report
                .errors
                .extend(missing.into_iter().map(|m| format!("missing: {m}"))),
            other => report.errors.push(other.to_string()),
        }
    }

    report.valid = report.errors.is_empty();
}
