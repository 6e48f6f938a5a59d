use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::DocumentError;

pub const BRIDGE_VERSION: &str = "2.0.0";
pub const PROTOCOL: &str = "USD-native";
pub const MAX_OPTIONS: usize = 3;
/// `Answer.option_index` value meaning "no answer yet".
pub const UNANSWERED: i32 = -1;

/// Variant governing whether a reader should act on the document.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    QuestionPending,
    AnswerReceived,
    Transition,
    Complete,
    Error,
}

/// Variant naming the typed section that is currently authoritative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    #[default]
    None,
    Question,
    Answer,
    Transition,
    Finale,
    Ack,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Low,
    Mid,
    High,
}

impl SyncStatus {
    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        raw.parse().map_err(|_| DocumentError::UnknownVariant {
            kind: "sync_status",
            value: raw.to_string(),
        })
    }

    /// Every status name, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Idle,
        Self::QuestionPending,
        Self::AnswerReceived,
        Self::Transition,
        Self::Complete,
        Self::Error,
    ];
}

impl MessageType {
    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        raw.parse().map_err(|_| DocumentError::UnknownVariant {
            kind: "message_type",
            value: raw.to_string(),
        })
    }

    pub const ALL: [Self; 7] = [
        Self::None,
        Self::Question,
        Self::Answer,
        Self::Transition,
        Self::Finale,
        Self::Ack,
        Self::Ready,
    ];
}

impl Direction {
    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        raw.parse().map_err(|_| DocumentError::UnknownVariant {
            kind: "direction",
            value: raw.to_string(),
        })
    }
}

// ── Questionnaire content ─────────────────────────────────────────

/// One selectable answer as authored in the questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub direction: Direction,
    /// Trait label recorded in the profile when this choice is picked.
    #[serde(rename = "trait")]
    pub trait_label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub dimension: String,
    pub scene: String,
    pub options: Vec<Choice>,
}

impl Question {
    /// Reject questions the wire formats cannot carry.
    pub fn check(&self) -> Result<(), DocumentError> {
        if self.options.len() > MAX_OPTIONS {
            return Err(DocumentError::TooManyOptions {
                id: self.id.clone(),
                count: self.options.len(),
                max: MAX_OPTIONS,
            });
        }
        Ok(())
    }
}

// ── Document sections ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageSection {
    pub kind: MessageType,
    pub index: u32,
    pub total: u32,
    pub timestamp: String,
    pub question_id: String,
    pub text: String,
    pub scene: String,
}

impl MessageSection {
    pub fn progress_display(&self) -> String {
        format!("{}/{}", self.index + 1, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub index: u32,
    pub label: String,
    pub direction: Direction,
    pub semantic_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSection {
    pub question_id: String,
    pub option_index: i32,
    pub response_time_ms: f64,
    pub selected_label: String,
    pub selected_direction: String,
    pub timestamp: String,
}

impl Default for AnswerSection {
    fn default() -> Self {
        Self {
            question_id: String::new(),
            option_index: UNANSWERED,
            response_time_ms: 0.0,
            selected_label: String::new(),
            selected_direction: String::new(),
            timestamp: String::new(),
        }
    }
}

impl AnswerSection {
    pub fn is_answered(&self) -> bool {
        self.option_index >= 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionSection {
    pub direction: String,
    pub next_scene: String,
    pub progress: f64,
    pub from_question_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinaleSection {
    pub message: String,
    pub usd_path: String,
    pub checksum: String,
    pub total_questions: u32,
    pub questions_answered: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadySection {
    pub total_questions: u32,
    pub first_scene: String,
    pub bridge_version: String,
    pub protocol: String,
    pub timestamp: String,
}

impl Default for ReadySection {
    fn default() -> Self {
        Self {
            total_questions: 0,
            first_scene: String::new(),
            bridge_version: BRIDGE_VERSION.into(),
            protocol: PROTOCOL.into(),
            timestamp: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AckSection {
    pub ready: bool,
    #[serde(rename = "ue_version")]
    pub host_version: String,
    pub project: String,
    pub timestamp: String,
}

/// Interaction metrics the consumer derives from the user's behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralSignals {
    pub last_response_time_ms: f64,
    pub average_response_time_ms: f64,
    pub hesitation_count: u32,
    pub long_hesitation_detected: bool,
    pub rapid_click_count: u32,
    pub skip_count: u32,
    pub back_navigation_count: u32,
    pub detected_state: String,
    pub recommended_expert: String,
    pub burnout_level: String,
    pub momentum_phase: String,
}

impl Default for BehavioralSignals {
    fn default() -> Self {
        Self {
            last_response_time_ms: 0.0,
            average_response_time_ms: 0.0,
            hesitation_count: 0,
            long_hesitation_detected: false,
            rapid_click_count: 0,
            skip_count: 0,
            back_navigation_count: 0,
            detected_state: "focused".into(),
            recommended_expert: "Direct".into(),
            burnout_level: "GREEN".into(),
            momentum_phase: "cold_start".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub code: String,
}

// ── Whole document ────────────────────────────────────────────────

/// Typed image of `bridge_state.usda`. Every write renders the whole value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeDocument {
    pub sync_status: SyncStatus,
    pub message_type: MessageType,
    pub generated_at: String,
    pub error: Option<ErrorInfo>,
    pub message: MessageSection,
    pub options: Vec<OptionEntry>,
    pub answer: AnswerSection,
    pub transition: TransitionSection,
    pub finale: FinaleSection,
    pub ready: ReadySection,
    pub ack: AckSection,
    pub signals: BehavioralSignals,
}

/// An answer as reported by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedAnswer {
    pub question_id: String,
    pub option_index: i32,
    pub response_time_ms: f64,
    pub selected_label: String,
    pub selected_direction: String,
    pub timestamp: String,
}

impl BridgeDocument {
    /// Fresh document announcing that the orchestrator is ready.
    pub fn ready(total_questions: u32, first_scene: &str, timestamp: &str) -> Self {
        Self {
            sync_status: SyncStatus::Idle,
            message_type: MessageType::Ready,
            generated_at: timestamp.into(),
            message: MessageSection {
                kind: MessageType::Ready,
                total: total_questions,
                timestamp: timestamp.into(),
                ..MessageSection::default()
            },
            finale: FinaleSection {
                total_questions,
                ..FinaleSection::default()
            },
            ready: ReadySection {
                total_questions,
                first_scene: first_scene.into(),
                timestamp: timestamp.into(),
                ..ReadySection::default()
            },
            ..Self::default()
        }
    }

    /// Install a new question. The answer section is reset in the same value
    /// so a stale answer can never be paired with the new question.
    /// A question with more than [`MAX_OPTIONS`] choices is rejected and the
    /// document is left as it was.
    pub fn install_question(
        &mut self,
        question: &Question,
        index: u32,
        total: u32,
        timestamp: &str,
    ) -> Result<(), DocumentError> {
        question.check()?;
        self.sync_status = SyncStatus::QuestionPending;
        self.message_type = MessageType::Question;
        self.generated_at = timestamp.into();
        self.error = None;
        self.message = MessageSection {
            kind: MessageType::Question,
            index,
            total,
            timestamp: timestamp.into(),
            question_id: question.id.clone(),
            text: question.text.clone(),
            scene: question.scene.clone(),
        };
        self.options = question
            .options
            .iter()
            .enumerate()
            .map(|(i, choice)| OptionEntry {
                index: i as u32,
                label: choice.label.clone(),
                direction: choice.direction,
                semantic_tag: choice.trait_label.clone(),
            })
            .collect();
        self.answer = AnswerSection::default();
        self.finale.total_questions = total;
        Ok(())
    }

    /// Record the consumer's selection, resolving label and direction from
    /// the posted options.
    pub fn record_answer(
        &mut self,
        question_id: &str,
        option_index: i32,
        response_time_ms: f64,
        timestamp: &str,
    ) {
        let selected = usize::try_from(option_index)
            .ok()
            .and_then(|i| self.options.get(i));
        self.answer = AnswerSection {
            question_id: question_id.into(),
            option_index,
            response_time_ms,
            selected_label: selected.map(|o| o.label.clone()).unwrap_or_default(),
            selected_direction: selected.map(|o| o.direction.to_string()).unwrap_or_default(),
            timestamp: timestamp.into(),
        };
        self.sync_status = SyncStatus::AnswerReceived;
        self.message_type = MessageType::Answer;
    }

    /// Reset the answer after the orchestrator has consumed it.
    pub fn clear_answer(&mut self) {
        self.answer = AnswerSection::default();
    }

    pub fn install_transition(
        &mut self,
        direction: &str,
        next_scene: &str,
        progress: f64,
        from_question_id: &str,
        timestamp: &str,
    ) {
        self.sync_status = SyncStatus::Transition;
        self.message_type = MessageType::Transition;
        self.generated_at = timestamp.into();
        self.transition = TransitionSection {
            direction: direction.into(),
            next_scene: next_scene.into(),
            progress: progress.clamp(0.0, 1.0),
            from_question_id: from_question_id.into(),
        };
    }

    pub fn install_finale(&mut self, finale: FinaleSection, timestamp: &str) {
        self.sync_status = SyncStatus::Complete;
        self.message_type = MessageType::Finale;
        self.generated_at = timestamp.into();
        self.finale = finale;
    }

    pub fn record_ack(&mut self, host_version: &str, project: &str, timestamp: &str) {
        self.ack = AckSection {
            ready: true,
            host_version: host_version.into(),
            project: project.into(),
            timestamp: timestamp.into(),
        };
        self.message_type = MessageType::Ack;
    }

    pub fn mark_error(&mut self, message: &str, code: &str) {
        self.sync_status = SyncStatus::Error;
        self.error = Some(ErrorInfo {
            message: message.into(),
            code: code.into(),
        });
    }

    /// The answer to the pending question, if the consumer has written one.
    pub fn received_answer(&self) -> Option<ReceivedAnswer> {
        if !self.answer.is_answered() {
            return None;
        }
        Some(ReceivedAnswer {
            question_id: self.answer.question_id.clone(),
            option_index: self.answer.option_index,
            response_time_ms: self.answer.response_time_ms,
            selected_label: self.answer.selected_label.clone(),
            selected_direction: self.answer.selected_direction.clone(),
            timestamp: self.answer.timestamp.clone(),
        })
    }
}
