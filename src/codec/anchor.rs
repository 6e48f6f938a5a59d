use std::fmt;

use serde::Serialize;

/// Routing metadata embedded in free text as
/// `[EXEC:checksum|expert|paradigm|altitude|verbosity|think_depth]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecAnchor {
    pub checksum: String,
    pub expert: String,
    pub paradigm: String,
    pub altitude: String,
    pub verbosity: String,
    pub think_depth: String,
}

impl ExecAnchor {
    pub fn new(checksum: impl Into<String>) -> Self {
        Self {
            checksum: checksum.into(),
            expert: "Direct".into(),
            paradigm: "Cortex".into(),
            altitude: "Ground".into(),
            verbosity: "standard".into(),
            think_depth: "standard".into(),
        }
    }

    #[must_use]
    pub fn with_expert(mut self, expert: impl Into<String>) -> Self {
        self.expert = expert.into();
        self
    }
}

impl fmt::Display for ExecAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[EXEC:{}|{}|{}|{}|{}|{}]",
            self.checksum, self.expert, self.paradigm, self.altitude, self.verbosity, self.think_depth
        )
    }
}

/// Parse an anchor at the start of `text`.
///
/// Returns `None` unless the text opens with `[EXEC:` followed by exactly six
/// non-empty `|`-separated fields and a closing `]`.
pub fn parse_exec_anchor(text: &str) -> Option<ExecAnchor> {
    let body = text.strip_prefix("[EXEC:")?;
    let end = body.find(']')?;
    let fields: Vec<&str> = body[..end].split('|').collect();
    let [checksum, expert, paradigm, altitude, verbosity, think_depth] = fields[..] else {
        return None;
    };
    if fields.iter().any(|f| f.is_empty()) {
        return None;
    }
    Some(ExecAnchor {
        checksum: checksum.into(),
        expert: expert.into(),
        paradigm: paradigm.into(),
        altitude: altitude.into(),
        verbosity: verbosity.into(),
        think_depth: think_depth.into(),
    })
}

/// Marker stamped into exported profiles.
pub fn translators_anchor(checksum: &str) -> String {
    format!("[TRANSLATORS:{checksum}]")
}
