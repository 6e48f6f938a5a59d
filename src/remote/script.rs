use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix marking a structured result line in captured script output.
pub const RESULT_PREFIX: &str = "RESULT:";

/// What the wrapper script writes to its result file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptOutput {
    /// Last `RESULT:` payload, decoded as JSON when possible.
    pub result: Option<Value>,
    /// Captured stdout without the `RESULT:` lines.
    pub output: String,
    /// Formatted traceback when the script raised.
    pub error: Option<String>,
}

fn indent(code: &str, spaces: usize) -> String {
    let prefix = " ".repeat(spaces);
    let body: Vec<String> = code.lines().map(|line| format!("{prefix}{line}")).collect();
    if body.iter().all(|line| line.trim().is_empty()) {
        // An empty try block is a syntax error in the host interpreter.
        return format!("{prefix}pass");
    }
    body.join("\n")
}

/// Wrap user code so the host captures stdout and any exception into
/// `result_path` as `{"output": .., "error": ..}`.
pub fn wrap_code(code: &str, result_path: &str) -> String {
    let safe_path = result_path.replace('\\', "/").replace('"', "\\\"");
    format!(
        r#"
import sys as _sys, io as _io, traceback as _tb, json as _json

_buf = _io.StringIO()
_old_stdout = _sys.stdout
_sys.stdout = _buf
_error = None
try:
{body}
except Exception:
    _error = _tb.format_exc()
finally:
    _sys.stdout = _old_stdout
    _out = _buf.getvalue()
    with open("{safe_path}", "w", encoding="utf-8") as _rf:
        _json.dump({{"output": _out, "error": _error}}, _rf)
"#,
        body = indent(code, 4),
    )
}

/// Split `RESULT:` lines out of captured output.
pub fn parse_result(raw: RawResult) -> ScriptOutput {
    let mut result = None;
    let mut kept = Vec::new();
    for line in raw.output.lines() {
        match line.strip_prefix(RESULT_PREFIX) {
            Some(payload) => {
                result = Some(
                    serde_json::from_str(payload)
                        .unwrap_or_else(|_| Value::String(payload.to_string())),
                );
            }
            None => kept.push(line),
        }
    }
    ScriptOutput {
        result,
        output: kept.join("\n").trim().to_string(),
        error: raw.error,
    }
}
