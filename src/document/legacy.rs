//! Flat JSON files used when the structured document is unavailable:
//! `state.json` (orchestrator → consumer) and `answer.json` (consumer →
//! orchestrator).

use serde::{Deserialize, Serialize};

use super::types::{BRIDGE_VERSION, Question, UNANSWERED};
use crate::error::DocumentError;

pub const STATE_SCHEMA: &str = "translators-state-v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyOption {
    pub index: u32,
    pub label: String,
    pub direction: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LegacyState {
    Ready {
        #[serde(rename = "$schema")]
        schema: String,
        total_questions: u32,
        first_scene: String,
        timestamp: String,
        bridge_version: String,
    },
    Question {
        index: u32,
        total: u32,
        id: String,
        text: String,
        scene: String,
        #[serde(default)]
        dimension: String,
        options: Vec<LegacyOption>,
        timestamp: String,
        bridge_version: String,
    },
    Transition {
        direction: String,
        next_scene: String,
        progress: f64,
        #[serde(default)]
        from_question_id: String,
        timestamp: String,
        bridge_version: String,
    },
    Finale {
        usd_path: String,
        checksum: String,
        total_questions: u32,
        questions_answered: u32,
        message: String,
        timestamp: String,
        bridge_version: String,
    },
}

impl LegacyState {
    pub fn ready(total_questions: u32, first_scene: &str, timestamp: &str) -> Self {
        Self::Ready {
            schema: STATE_SCHEMA.into(),
            total_questions,
            first_scene: first_scene.into(),
            timestamp: timestamp.into(),
            bridge_version: BRIDGE_VERSION.into(),
        }
    }

    pub fn question(
        question: &Question,
        index: u32,
        total: u32,
        timestamp: &str,
    ) -> Result<Self, DocumentError> {
        question.check()?;
        Ok(Self::Question {
            index,
            total,
            id: question.id.clone(),
            text: question.text.clone(),
            scene: question.scene.clone(),
            dimension: question.dimension.clone(),
            options: question
                .options
                .iter()
                .enumerate()
                .map(|(i, choice)| LegacyOption {
                    index: i as u32,
                    label: choice.label.clone(),
                    direction: choice.direction.to_string(),
                    value: choice.value,
                })
                .collect(),
            timestamp: timestamp.into(),
            bridge_version: BRIDGE_VERSION.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedAnswer {
    #[serde(default)]
    pub question_id: String,
    #[serde(default = "unanswered")]
    pub option_index: i32,
    #[serde(default)]
    pub response_time_ms: f64,
}

fn unanswered() -> i32 {
    UNANSWERED
}

/// Contents of `answer.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LegacyReply {
    Ack {
        #[serde(default, rename = "ue_version", alias = "host_version")]
        host_version: String,
        #[serde(default)]
        project: String,
        #[serde(default)]
        timestamp: String,
    },
    Answer {
        #[serde(default)]
        question_id: String,
        #[serde(default = "unanswered")]
        option_index: i32,
        #[serde(default)]
        response_time_ms: f64,
        /// Some consumers nest the payload; the nested form wins.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<NestedAnswer>,
    },
}

impl LegacyReply {
    /// Flattened `(question_id, option_index, response_time_ms)` of an answer.
    pub fn answer_fields(&self) -> Option<(String, i32, f64)> {
        match self {
            Self::Answer {
                question_id,
                option_index,
                response_time_ms,
                answer,
            } => Some(match answer {
                Some(nested) => (
                    if nested.question_id.is_empty() {
                        question_id.clone()
                    } else {
                        nested.question_id.clone()
                    },
                    nested.option_index,
                    nested.response_time_ms,
                ),
                None => (question_id.clone(), *option_index, *response_time_ms),
            }),
            Self::Ack { .. } => None,
        }
    }
}
