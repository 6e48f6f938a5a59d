use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::config::BridgeMode;
use crate::document::legacy::{LegacyReply, LegacyState};
use crate::document::{AckSection, FinaleSection, Question, ReceivedAnswer};
use crate::error::DocumentError;
use crate::store::{AtomicStore, ReadOutcome};

use super::{BridgeChannel, now};

pub const STATE_FILE: &str = "state.json";
pub const ANSWER_FILE: &str = "answer.json";

/// Flat-file channel. The consumer replies through `answer.json`, which is
/// deleted once consumed.
pub struct LegacyJsonChannel {
    state_path: PathBuf,
    answer_path: PathBuf,
    store: AtomicStore,
    pending: Mutex<Option<Question>>,
}

impl LegacyJsonChannel {
    pub fn new(dir: &Path, store: AtomicStore) -> Self {
        Self {
            state_path: dir.join(STATE_FILE),
            answer_path: dir.join(ANSWER_FILE),
            store,
            pending: Mutex::new(None),
        }
    }

    pub fn answer_path(&self) -> &Path {
        &self.answer_path
    }

    fn write_state(&self, state: &LegacyState) -> Result<(), DocumentError> {
        let json = serde_json::to_string_pretty(state)?;
        self.store.write(&self.state_path, &json)?;
        Ok(())
    }

    /// Current reply, or `None` while absent or still being written.
    fn read_reply(&self) -> Option<LegacyReply> {
        let ReadOutcome::Content(text) = self.store.read(&self.answer_path) else {
            return None;
        };
        match serde_json::from_str(&text) {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::debug!(path = %self.answer_path.display(), error = %e, "answer file not decodable yet");
                None
            }
        }
    }
}

impl BridgeChannel for LegacyJsonChannel {
    fn mode(&self) -> BridgeMode {
        BridgeMode::LegacyJson
    }

    fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn post_ready(&self, total_questions: u32, first_scene: &str) -> Result<(), DocumentError> {
        self.write_state(&LegacyState::ready(total_questions, first_scene, &now()))
    }

    fn post_question(
        &self,
        question: &Question,
        index: u32,
        total: u32,
    ) -> Result<(), DocumentError> {
        let state = LegacyState::question(question, index, total, &now())?;
        // A reply left over from the previous question must not be read as
        // the answer to this one.
        self.store.remove(&self.answer_path)?;
        self.write_state(&state)?;
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(question.clone());
        Ok(())
    }

    fn read_answer(&self) -> Result<Option<ReceivedAnswer>, DocumentError> {
        let Some((question_id, option_index, response_time_ms)) =
            self.read_reply().as_ref().and_then(LegacyReply::answer_fields)
        else {
            return Ok(None);
        };
        if option_index < 0 {
            return Ok(None);
        }
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let selected = pending
            .as_ref()
            .and_then(|q| usize::try_from(option_index).ok().and_then(|i| q.options.get(i)));
        Ok(Some(ReceivedAnswer {
            question_id,
            option_index,
            response_time_ms,
            selected_label: selected.map(|c| c.label.clone()).unwrap_or_default(),
            selected_direction: selected.map(|c| c.direction.to_string()).unwrap_or_default(),
            timestamp: now(),
        }))
    }

    fn acknowledge_answer(&self) -> Result<(), DocumentError> {
        self.store.remove(&self.answer_path)?;
        Ok(())
    }

    fn post_transition(
        &self,
        direction: &str,
        next_scene: &str,
        progress: f64,
        from_question_id: &str,
    ) -> Result<(), DocumentError> {
        self.write_state(&LegacyState::Transition {
            direction: direction.into(),
            next_scene: next_scene.into(),
            progress: progress.clamp(0.0, 1.0),
            from_question_id: from_question_id.into(),
            timestamp: now(),
            bridge_version: crate::document::BRIDGE_VERSION.into(),
        })
    }

    fn post_finale(&self, finale: FinaleSection) -> Result<(), DocumentError> {
        self.write_state(&LegacyState::Finale {
            usd_path: finale.usd_path,
            checksum: finale.checksum,
            total_questions: finale.total_questions,
            questions_answered: finale.questions_answered,
            message: finale.message,
            timestamp: now(),
            bridge_version: crate::document::BRIDGE_VERSION.into(),
        })
    }

    /// Consumes an ack reply; answers are left in place.
    fn read_ack(&self) -> Result<Option<AckSection>, DocumentError> {
        let Some(LegacyReply::Ack {
            host_version,
            project,
            timestamp,
        }) = self.read_reply()
        else {
            return Ok(None);
        };
        self.store.remove(&self.answer_path)?;
        Ok(Some(AckSection {
            ready: true,
            host_version,
            project,
            timestamp,
        }))
    }

    fn reset(&self) -> Result<(), DocumentError> {
        self.store.remove(&self.state_path)?;
        self.store.remove(&self.answer_path)?;
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::test_support::sample_question;
    use serde_json::json;
    use tempfile::TempDir;

    fn channel() -> (TempDir, LegacyJsonChannel) {
        let tmp = TempDir::new().unwrap();
        let channel = LegacyJsonChannel::new(tmp.path(), AtomicStore::default());
        (tmp, channel)
    }

    fn reply(channel: &LegacyJsonChannel, value: &serde_json::Value) {
        std::fs::write(channel.answer_path(), value.to_string()).unwrap();
    }

    fn state(channel: &LegacyJsonChannel) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(channel.state_path()).unwrap()).unwrap()
    }

    #[test]
    fn ready_carries_schema_tag() {
        let (_tmp, channel) = channel();
        channel.post_ready(8, "forest_edge").unwrap();
        let value = state(&channel);
        assert_eq!(value["type"], "ready");
        assert_eq!(value["$schema"], "translators-state-v1");
        assert_eq!(value["total_questions"], 8);
    }

    #[test]
    fn question_is_written_with_options() {
        let (_tmp, channel) = channel();
        channel.post_question(&sample_question("load"), 0, 8).unwrap();
        let value = state(&channel);
        assert_eq!(value["type"], "question");
        assert_eq!(value["id"], "load");
        assert_eq!(value["options"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn oversized_question_is_refused_before_touching_files() {
        let (_tmp, channel) = channel();
        channel.post_question(&sample_question("load"), 0, 8).unwrap();
        let before = state(&channel);

        let mut question = sample_question("pace");
        question.options.push(question.options[2].clone());
        let err = channel.post_question(&question, 1, 8).unwrap_err();

        assert!(matches!(err, DocumentError::TooManyOptions { count: 4, .. }));
        assert_eq!(state(&channel), before);
    }

    #[test]
    fn flat_answer_is_resolved_against_pending_question() {
        let (_tmp, channel) = channel();
        channel.post_question(&sample_question("load"), 0, 8).unwrap();
        reply(
            &channel,
            &json!({"type": "answer", "question_id": "load", "option_index": 2, "response_time_ms": 640.0}),
        );
        let answer = channel.read_answer().unwrap().unwrap();
        assert_eq!(answer.option_index, 2);
        assert_eq!(answer.selected_direction, "high");
    }

    #[test]
    fn nested_answer_wins_and_file_is_deleted_on_acknowledge() {
        let (_tmp, channel) = channel();
        channel.post_question(&sample_question("load"), 0, 8).unwrap();
        reply(
            &channel,
            &json!({
                "type": "answer",
                "option_index": 0,
                "answer": {"question_id": "load", "option_index": 1, "response_time_ms": 10.0}
            }),
        );
        assert_eq!(channel.read_answer().unwrap().unwrap().option_index, 1);
        channel.acknowledge_answer().unwrap();
        assert!(!channel.answer_path().exists());
        assert!(channel.read_answer().unwrap().is_none());
    }

    #[test]
    fn partial_answer_file_reads_as_none() {
        let (_tmp, channel) = channel();
        std::fs::write(channel.answer_path(), "{\"type\": \"ans").unwrap();
        assert!(channel.read_answer().unwrap().is_none());
    }

    #[test]
    fn stale_reply_is_dropped_when_next_question_is_posted() {
        let (_tmp, channel) = channel();
        channel.post_question(&sample_question("load"), 0, 8).unwrap();
        reply(&channel, &json!({"type": "answer", "question_id": "load", "option_index": 0}));
        channel.post_question(&sample_question("pace"), 1, 8).unwrap();
        assert!(channel.read_answer().unwrap().is_none());
    }

    #[test]
    fn ack_is_consumed() {
        let (_tmp, channel) = channel();
        reply(&channel, &json!({"type": "ack", "ue_version": "5.4", "project": "Translators"}));
        let ack = channel.read_ack().unwrap().unwrap();
        assert_eq!(ack.host_version, "5.4");
        assert!(!channel.answer_path().exists());
        assert!(channel.read_ack().unwrap().is_none());
    }

    #[test]
    fn answer_is_not_mistaken_for_ack() {
        let (_tmp, channel) = channel();
        reply(&channel, &json!({"type": "answer", "question_id": "load", "option_index": 0}));
        assert!(channel.read_ack().unwrap().is_none());
        assert!(channel.answer_path().exists());
    }

    #[test]
    fn finale_and_transition_are_tagged() {
        let (_tmp, channel) = channel();
        channel.post_transition("mid", "forest_path", 1.4, "load").unwrap();
        let value = state(&channel);
        assert_eq!(value["type"], "transition");
        assert_eq!(value["progress"], 1.0);

        channel
            .post_finale(FinaleSection {
                checksum: "cafebabe".into(),
                ..FinaleSection::default()
            })
            .unwrap();
        assert_eq!(state(&channel)["checksum"], "cafebabe");
    }
}
