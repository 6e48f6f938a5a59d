use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::codec::{CHECKSUM_VERSION, checksum, format_float, translators_anchor};
use crate::document::{BRIDGE_VERSION, Question, escape};
use crate::error::StoreError;
use crate::store::AtomicStore;

pub const PROFILE_FILE: &str = "cognitive_profile.usda";

/// One consumer answer as recorded by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub option_index: i32,
    pub response_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResult {
    pub version: String,
    pub dimensions: BTreeMap<String, f64>,
    pub traits: BTreeMap<String, String>,
    pub checksum: String,
    pub answers: Vec<AnswerRecord>,
}

/// Fold answers into dimension values and trait labels.
///
/// Answers are matched to questions by id; unknown ids and out-of-range
/// indexes contribute nothing.
pub fn derive_profile(questions: &[Question], answers: &[AnswerRecord]) -> ProfileResult {
    let mut dimensions = BTreeMap::new();
    let mut traits = BTreeMap::new();

    for answer in answers {
        let Some(question) = questions.iter().find(|q| q.id == answer.question_id) else {
            tracing::debug!(question_id = %answer.question_id, "answer for unknown question ignored");
            continue;
        };
        let Some(choice) = usize::try_from(answer.option_index)
            .ok()
            .and_then(|i| question.options.get(i))
        else {
            continue;
        };
        let dimension = if question.dimension.is_empty() {
            question.id.clone()
        } else {
            question.dimension.clone()
        };
        dimensions.insert(dimension, choice.value);
        traits.insert(question.id.clone(), choice.trait_label.clone());
    }

    ProfileResult {
        version: CHECKSUM_VERSION.into(),
        checksum: checksum(dimensions.iter().map(|(k, v)| (k.as_str(), *v))),
        dimensions,
        traits,
        answers: answers.to_vec(),
    }
}

impl ProfileResult {
    /// Recompute the checksum from the dimensions and compare.
    pub fn verify(&self, expected: &str) -> bool {
        let actual = checksum(self.dimensions.iter().map(|(k, v)| (k.as_str(), *v)));
        actual == self.checksum && actual == expected
    }

    pub fn anchor(&self) -> String {
        translators_anchor(&self.checksum)
    }

    /// Text document with profile, session, trait and answer layers.
    pub fn render(&self, questions: &[Question], generated: &str) -> String {
        let sum = escape(&self.checksum);
        let mut out = String::with_capacity(2048);
        let _ = write!(
            out,
            r#"#usda 1.0
(
    defaultPrim = "CognitiveSubstrate"
    doc = "Cognitive profile generated by hostbridge v{BRIDGE_VERSION} - Checksum: {sum} - Generated: {generated}"
)

def Xform "CognitiveSubstrate" (
    kind = "component"
    customData = {{
        string generator = "hostbridge"
        string version = "{version}"
        string checksum = "{sum}"
        string generated = "{generated}"
        string translators_anchor = "{anchor}"
    }}
)
{{
    def Xform "Profile" (
        doc = "Cognitive profile dimensions derived from questionnaire"
    )
    {{
"#,
            version = escape(&self.version),
            generated = escape(generated),
            anchor = escape(&self.anchor()),
        );
        for (dimension, value) in &self.dimensions {
            let _ = writeln!(out, "        float {dimension} = {}", format_float(*value));
        }
        let _ = write!(
            out,
            r#"    }}

    def Xform "Session" {{
        string session_id = "{sum}"
        int questions_answered = {answered}
        float completion = {completion}
        string checksum = "{sum}"
        string active_mode = "calibrated"
    }}

    def Xform "Traits" (
        doc = "Human-readable trait labels from questionnaire"
    )
    {{
"#,
            answered = self.answers.len(),
            completion = format_float(if questions.is_empty() {
                1.0
            } else {
                (self.answers.len() as f64 / questions.len() as f64).min(1.0)
            }),
        );
        for (question_id, label) in &self.traits {
            let _ = writeln!(out, "        string {question_id} = \"{}\"", escape(label));
        }
        out.push_str(
            "    }\n\n    def Xform \"Answers\" (\n        doc = \"Individual question responses\"\n    )\n    {\n",
        );
        for answer in &self.answers {
            let choice = questions
                .iter()
                .find(|q| q.id == answer.question_id)
                .and_then(|q| usize::try_from(answer.option_index).ok().and_then(|i| q.options.get(i)));
            let Some(choice) = choice else { continue };
            let _ = write!(
                out,
                r#"        def Xform "{id}" {{
            int option_index = {index}
            string value = "{direction}"
            string trait = "{label}"
            float response_time = {rt}
        }}
"#,
                id = escape(&answer.question_id),
                index = answer.option_index,
                direction = choice.direction,
                label = escape(&choice.trait_label),
                rt = format_float(answer.response_time_ms),
            );
        }
        out.push_str("    }\n}\n");
        out
    }

    /// Write the rendered profile once through the atomic store.
    pub fn export(
        &self,
        store: &AtomicStore,
        path: &Path,
        questions: &[Question],
    ) -> Result<(), StoreError> {
        store.write(path, &self.render(questions, &Utc::now().to_rfc3339()))?;
        tracing::info!(path = %path.display(), checksum = %self.checksum, "profile exported");
        Ok(())
    }
}
