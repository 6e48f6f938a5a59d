//! Consumer side of the bridge: what the host writes back, plus a simulator
//! that stands in for the host during development.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::channel::{ANSWER_FILE, STATE_FILE};
use crate::config::BridgeMode;
use crate::document::legacy::{LegacyReply, LegacyState};
use crate::document::{
    BRIDGE_FILE, BehavioralSignals, BridgeDocument, Direction, MessageType, OptionEntry,
    SyncStatus, parse, render,
};
use crate::error::DocumentError;
use crate::poll::AdaptivePoller;
use crate::store::{AtomicStore, ReadOutcome};

/// Question the consumer has been asked and not yet answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingQuestion {
    pub question_id: String,
    pub index: u32,
    pub total: u32,
    pub text: String,
    pub scene: String,
    pub options: Vec<OptionEntry>,
}

/// What the consumer currently sees in the bridge directory.
#[derive(Debug, Clone, PartialEq)]
pub enum HostView {
    Waiting,
    Ready { total_questions: u32 },
    Question(PendingQuestion),
    Complete { checksum: String },
}

pub struct Consumer {
    dir: PathBuf,
    mode: BridgeMode,
    store: AtomicStore,
}

impl Consumer {
    pub fn new(dir: impl Into<PathBuf>, mode: BridgeMode, store: AtomicStore) -> Self {
        Self {
            dir: dir.into(),
            mode,
            store,
        }
    }

    pub fn mode(&self) -> BridgeMode {
        self.mode
    }

    fn document_path(&self) -> PathBuf {
        self.dir.join(BRIDGE_FILE)
    }

    fn reply_path(&self) -> PathBuf {
        self.dir.join(ANSWER_FILE)
    }

    pub fn view(&self) -> Result<HostView, DocumentError> {
        match self.mode {
            BridgeMode::Document => self.document_view(),
            BridgeMode::LegacyJson => self.legacy_view(),
        }
    }

    pub fn pending_question(&self) -> Result<Option<PendingQuestion>, DocumentError> {
        Ok(match self.view()? {
            HostView::Question(question) => Some(question),
            _ => None,
        })
    }

    fn document_view(&self) -> Result<HostView, DocumentError> {
        let ReadOutcome::Content(text) = self.store.read(&self.document_path()) else {
            return Ok(HostView::Waiting);
        };
        let doc = parse(&text)?;
        Ok(match (doc.sync_status, doc.message_type) {
            (SyncStatus::Complete, _) => HostView::Complete {
                checksum: doc.finale.checksum,
            },
            (SyncStatus::QuestionPending, MessageType::Question) => {
                HostView::Question(PendingQuestion {
                    question_id: doc.message.question_id,
                    index: doc.message.index,
                    total: doc.message.total,
                    text: doc.message.text,
                    scene: doc.message.scene,
                    options: doc.options,
                })
            }
            (_, MessageType::Ready) => HostView::Ready {
                total_questions: doc.ready.total_questions,
            },
            _ => HostView::Waiting,
        })
    }

    fn legacy_view(&self) -> Result<HostView, DocumentError> {
        let ReadOutcome::Content(text) = self.store.read(&self.dir.join(STATE_FILE)) else {
            return Ok(HostView::Waiting);
        };
        let state: LegacyState = match serde_json::from_str(&text) {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(error = %e, "state file not decodable yet");
                return Ok(HostView::Waiting);
            }
        };
        Ok(match state {
            LegacyState::Ready {
                total_questions, ..
            } => HostView::Ready { total_questions },
            // An unconsumed reply means the question is already answered.
            LegacyState::Question { .. } if self.reply_path().exists() => HostView::Waiting,
            LegacyState::Question {
                index,
                total,
                id,
                text,
                scene,
                options,
                ..
            } => HostView::Question(PendingQuestion {
                question_id: id,
                index,
                total,
                text,
                scene,
                options: options
                    .into_iter()
                    .map(|o| OptionEntry {
                        index: o.index,
                        direction: Direction::parse(&o.direction).unwrap_or(Direction::Mid),
                        label: o.label,
                        semantic_tag: String::new(),
                    })
                    .collect(),
            }),
            LegacyState::Finale { checksum, .. } => HostView::Complete { checksum },
            LegacyState::Transition { .. } => HostView::Waiting,
        })
    }

    fn update_document(
        &self,
        apply: impl FnOnce(&mut BridgeDocument),
    ) -> Result<(), DocumentError> {
        self.store.update(&self.document_path(), |current| {
            let Some(text) = current else {
                return Err(DocumentError::NotFound(self.document_path()));
            };
            let mut doc = parse(text)?;
            apply(&mut doc);
            Ok((render(&doc), ()))
        })
    }

    fn write_reply(&self, reply: &LegacyReply) -> Result<(), DocumentError> {
        let json = serde_json::to_string_pretty(reply)?;
        self.store.write(&self.reply_path(), &json)?;
        Ok(())
    }

    pub fn write_ack(&self, host_version: &str, project: &str) -> Result<(), DocumentError> {
        let timestamp = Utc::now().to_rfc3339();
        match self.mode {
            BridgeMode::Document => {
                self.update_document(|doc| doc.record_ack(host_version, project, &timestamp))
            }
            BridgeMode::LegacyJson => self.write_reply(&LegacyReply::Ack {
                host_version: host_version.into(),
                project: project.into(),
                timestamp,
            }),
        }
    }

    pub fn write_answer(
        &self,
        question_id: &str,
        option_index: i32,
        response_time_ms: f64,
    ) -> Result<(), DocumentError> {
        match self.mode {
            BridgeMode::Document => self.update_document(|doc| {
                doc.record_answer(question_id, option_index, response_time_ms, &Utc::now().to_rfc3339());
            }),
            BridgeMode::LegacyJson => self.write_reply(&LegacyReply::Answer {
                question_id: question_id.into(),
                option_index,
                response_time_ms,
                answer: None,
            }),
        }
    }

    /// Publish interaction signals. The flat-file format has no slot for
    /// them, so this is a no-op in legacy mode.
    pub fn write_signals(&self, signals: &BehavioralSignals) -> Result<(), DocumentError> {
        match self.mode {
            BridgeMode::Document => self.update_document(|doc| doc.signals = signals.clone()),
            BridgeMode::LegacyJson => {
                tracing::debug!("behavioral signals not carried by the legacy format");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub acked: bool,
    pub answered: Vec<String>,
    pub completed: bool,
    pub checksum: Option<String>,
}

enum Step {
    Ack,
    Answer(PendingQuestion),
    Done(String),
}

/// Act as the host: acknowledge readiness, then answer every question with
/// `answer_index` (clamped to the options offered) until the finale arrives
/// or nothing changes within `step_timeout`.
pub async fn simulate(
    consumer: &Consumer,
    poller: &AdaptivePoller,
    answer_index: usize,
    step_timeout: Duration,
) -> Result<SimulationReport, DocumentError> {
    let mut report = SimulationReport::default();
    let mut last_answered: Option<String> = None;

    loop {
        let acked = report.acked;
        let step = poller
            .poll_until(step_timeout, || match consumer.view() {
                Ok(HostView::Ready { .. }) if !acked => Some(Ok(Step::Ack)),
                Ok(HostView::Question(q)) if last_answered.as_deref() != Some(q.question_id.as_str()) => {
                    Some(Ok(Step::Answer(q)))
                }
                Ok(HostView::Complete { checksum }) => Some(Ok(Step::Done(checksum))),
                Ok(_) => None,
                Err(e @ DocumentError::Malformed { .. }) => Some(Err(e)),
                Err(e) => {
                    tracing::debug!(error = %e, "bridge not readable yet");
                    None
                }
            })
            .await;

        match step {
            None => {
                tracing::warn!(
                    answered = report.answered.len(),
                    "simulator saw no change within {}s",
                    step_timeout.as_secs()
                );
                return Ok(report);
            }
            Some(Err(e)) => return Err(e),
            Some(Ok(Step::Ack)) => {
                consumer.write_ack("simulated", "hostbridge")?;
                report.acked = true;
                tracing::info!("simulator acknowledged ready");
            }
            Some(Ok(Step::Answer(question))) => {
                let index = answer_index.min(question.options.len().saturating_sub(1));
                let response_time_ms = 500.0;
                consumer.write_signals(&BehavioralSignals {
                    last_response_time_ms: response_time_ms,
                    average_response_time_ms: response_time_ms,
                    ..BehavioralSignals::default()
                })?;
                consumer.write_answer(&question.question_id, index as i32, response_time_ms)?;
                tracing::info!(
                    question_id = %question.question_id,
                    progress = %format!("{}/{}", question.index + 1, question.total),
                    option_index = index,
                    "simulator answered"
                );
                report.answered.push(question.question_id.clone());
                last_answered = Some(question.question_id);
            }
            Some(Ok(Step::Done(checksum))) => {
                report.completed = true;
                report.checksum = Some(checksum);
                return Ok(report);
            }
        }
    }
}

/// Whether `dir` contains any bridge file.
pub fn bridge_present(dir: &Path) -> bool {
    [BRIDGE_FILE, STATE_FILE].iter().any(|f| dir.join(f).exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BridgeChannel, DocumentChannel, LegacyJsonChannel};
    use crate::document::test_support::sample_question;
    use tempfile::TempDir;

    #[test]
    fn document_view_follows_orchestrator() {
        let tmp = TempDir::new().unwrap();
        let channel = DocumentChannel::new(tmp.path(), AtomicStore::default());
        let consumer = Consumer::new(tmp.path(), BridgeMode::Document, AtomicStore::default());
        assert_eq!(consumer.view().unwrap(), HostView::Waiting);

        channel.post_ready(8, "forest_edge").unwrap();
        assert_eq!(consumer.view().unwrap(), HostView::Ready { total_questions: 8 });

        channel.post_question(&sample_question("load"), 0, 8).unwrap();
        let pending = consumer.pending_question().unwrap().unwrap();
        assert_eq!(pending.question_id, "load");
        assert_eq!(pending.options.len(), 3);
    }

    #[test]
    fn document_answer_reaches_channel_with_label() {
        let tmp = TempDir::new().unwrap();
        let channel = DocumentChannel::new(tmp.path(), AtomicStore::default());
        let consumer = Consumer::new(tmp.path(), BridgeMode::Document, AtomicStore::default());
        channel.post_question(&sample_question("load"), 0, 8).unwrap();

        consumer.write_answer("load", 1, 820.0).unwrap();
        let answer = channel.read_answer().unwrap().unwrap();
        assert_eq!(answer.option_index, 1);
        assert_eq!(answer.selected_direction, "mid");
        assert!(consumer.pending_question().unwrap().is_none());
    }

    #[test]
    fn document_ack_and_signals_are_visible() {
        let tmp = TempDir::new().unwrap();
        let channel = DocumentChannel::new(tmp.path(), AtomicStore::default());
        let consumer = Consumer::new(tmp.path(), BridgeMode::Document, AtomicStore::default());
        channel.post_ready(8, "forest_edge").unwrap();

        consumer.write_ack("5.4", "Translators").unwrap();
        consumer
            .write_signals(&BehavioralSignals {
                rapid_click_count: 5,
                ..BehavioralSignals::default()
            })
            .unwrap();
        assert_eq!(channel.read_ack().unwrap().unwrap().project, "Translators");
        assert_eq!(channel.read_signals().unwrap().rapid_click_count, 5);
    }

    #[test]
    fn writing_without_document_fails_cleanly() {
        let tmp = TempDir::new().unwrap();
        let consumer = Consumer::new(tmp.path(), BridgeMode::Document, AtomicStore::default());
        assert!(matches!(
            consumer.write_answer("load", 0, 1.0),
            Err(DocumentError::NotFound(_))
        ));
    }

    #[test]
    fn legacy_question_hidden_while_reply_pending() {
        let tmp = TempDir::new().unwrap();
        let channel = LegacyJsonChannel::new(tmp.path(), AtomicStore::default());
        let consumer = Consumer::new(tmp.path(), BridgeMode::LegacyJson, AtomicStore::default());
        channel.post_question(&sample_question("load"), 0, 8).unwrap();
        assert!(consumer.pending_question().unwrap().is_some());

        consumer.write_answer("load", 2, 300.0).unwrap();
        assert!(consumer.pending_question().unwrap().is_none());
        let answer = channel.read_answer().unwrap().unwrap();
        assert_eq!(answer.selected_direction, "high");
    }

    #[tokio::test(start_paused = true)]
    async fn simulate_stops_when_nothing_changes() {
        let tmp = TempDir::new().unwrap();
        let consumer = Consumer::new(tmp.path(), BridgeMode::Document, AtomicStore::default());
        let report = simulate(&consumer, &AdaptivePoller::default(), 1, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!report.completed);
        assert!(report.answered.is_empty());
    }

    #[test]
    fn bridge_present_detects_either_format() {
        let tmp = TempDir::new().unwrap();
        assert!(!bridge_present(tmp.path()));
        std::fs::write(tmp.path().join(STATE_FILE), "{}").unwrap();
        assert!(bridge_present(tmp.path()));
    }
}
