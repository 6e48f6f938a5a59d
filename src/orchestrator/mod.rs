//! Drives one questionnaire session over the bridge.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::channel::{ANSWER_FILE, BridgeChannel, STATE_FILE, open_channel};
use crate::codec::ExecAnchor;
use crate::config::{BridgeMode, Config};
use crate::document::{FinaleSection, Question, ReceivedAnswer, validate_bridge_state};
use crate::error::DocumentError;
use crate::heartbeat::{HEARTBEAT_FILE, spawn_heartbeat};
use crate::poll::AdaptivePoller;
use crate::profile::{AnswerRecord, PROFILE_FILE, ProfileResult, default_questions, derive_profile};
use crate::routing::{Expert, route};
use crate::security::BridgePathPolicy;
use crate::store::AtomicStore;

pub const ACK_FILE: &str = "ack.json";

const FINALE_MESSAGE: &str = "Cognitive profile complete! Your profile is ready for AI consumption.";

#[derive(Debug, Clone, Serialize)]
pub struct RoutedAnswer {
    pub question_id: String,
    pub option_index: i32,
    pub response_time_ms: f64,
    pub direction: String,
    pub expert: Expert,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub mode: BridgeMode,
    /// The structured document failed validation and the session ran on
    /// the flat-file format instead.
    pub downgraded: bool,
    pub acked: bool,
    pub bridge_dir: PathBuf,
    pub answers: Vec<RoutedAnswer>,
    pub profile: ProfileResult,
    pub profile_path: PathBuf,
    pub anchor: String,
}

pub struct Orchestrator {
    config: Config,
    store: AtomicStore,
    poller: AdaptivePoller,
    questions: Vec<Question>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            store: AtomicStore::from_config(&config.store),
            poller: AdaptivePoller::from_config(&config.polling),
            questions: default_questions(),
            config,
        }
    }

    #[must_use]
    pub fn with_questions(mut self, questions: Vec<Question>) -> Self {
        self.questions = questions;
        self
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Resolve the configured bridge directory inside the allowed root and
    /// create it.
    pub fn bridge_dir(&self) -> Result<PathBuf> {
        let policy = BridgePathPolicy::new(self.config.bridge.allowed_root_path());
        let dir = policy
            .ensure_dir(&self.config.bridge.dir_path())
            .context("bridge directory rejected")?;
        Ok(dir)
    }

    /// Run the whole questionnaire in `mode`.
    ///
    /// Ack timeout is logged and tolerated; answer timeout ends the run.
    pub async fn run(&self, mode: BridgeMode) -> Result<SessionReport> {
        if self.questions.is_empty() {
            bail!("questionnaire has no questions");
        }
        let dir = self.bridge_dir()?;
        let (store, stale_dir) = (self.store.clone(), dir.clone());
        tokio::task::spawn_blocking(move || clear_stale_files(&store, &stale_dir)).await?;

        let heartbeat = self.config.heartbeat.enabled.then(|| {
            spawn_heartbeat(
                self.store.clone(),
                dir.join(HEARTBEAT_FILE),
                std::time::Duration::from_secs(self.config.heartbeat.interval_secs),
            )
        });

        let result = self.drive(mode, &dir).await;
        if let Some(handle) = heartbeat {
            handle.stop().await;
        }
        result
    }

    /// Post Ready in `mode`; a structured document that does not validate
    /// afterwards downgrades the session to the flat-file channel.
    pub fn initialize(&self, mode: BridgeMode, dir: &Path) -> Result<(Box<dyn BridgeChannel>, bool)> {
        let first_scene = self.questions.first().map_or("", |q| q.scene.as_str());
        initialize_channel(&self.store, mode, dir, self.total(), first_scene)
    }

    async fn drive(&self, mode: BridgeMode, dir: &Path) -> Result<SessionReport> {
        let total = self.total();
        let (channel, downgraded) = {
            let (store, dir) = (self.store.clone(), dir.to_path_buf());
            let first_scene = self.questions.first().map(|q| q.scene.clone()).unwrap_or_default();
            tokio::task::spawn_blocking(move || {
                initialize_channel(&store, mode, &dir, total, &first_scene)
            })
            .await??
        };
        let channel: Arc<dyn BridgeChannel> = Arc::from(channel);

        let ack_timeout = self.config.bridge.ack_timeout();
        let reader = Arc::clone(&channel);
        let acked = match self
            .poller
            .poll_blocking_until(ack_timeout, move || reader.read_ack().ok().flatten())
            .await
        {
            Some(ack) => {
                tracing::info!(host_version = %ack.host_version, project = %ack.project, "consumer acknowledged");
                true
            }
            None => {
                tracing::warn!("no ack within {}s, proceeding", ack_timeout.as_secs());
                false
            }
        };

        let mut answers = Vec::with_capacity(self.questions.len());
        for (i, question) in self.questions.iter().enumerate() {
            let index = i as u32;
            let posted = question.clone();
            on_channel(&channel, move |ch| ch.post_question(&posted, index, total))
                .await?
                .with_context(|| format!("failed to post question '{}'", question.id))?;
            tracing::info!(question_id = %question.id, progress = %format!("{}/{total}", index + 1), "question posted");

            let answer = self.await_answer(&channel, question).await?;
            on_channel(&channel, |ch| ch.acknowledge_answer())
                .await?
                .context("failed to clear consumed answer")?;

            let signals = on_channel(&channel, |ch| ch.read_signals())
                .await?
                .unwrap_or_default();
            let expert = route(&signals);
            tracing::info!(
                question_id = %question.id,
                option_index = answer.option_index,
                response_time_ms = answer.response_time_ms,
                expert = %expert,
                "answer received"
            );

            if let Some(next) = self.questions.get(i + 1) {
                let progress = f64::from(index + 1) / f64::from(total);
                let (direction, scene, from) =
                    (answer.selected_direction.clone(), next.scene.clone(), question.id.clone());
                on_channel(&channel, move |ch| ch.post_transition(&direction, &scene, progress, &from))
                    .await?
                    .context("failed to post transition")?;
            }

            answers.push(RoutedAnswer {
                question_id: answer.question_id,
                option_index: answer.option_index,
                response_time_ms: answer.response_time_ms,
                direction: answer.selected_direction,
                expert,
            });
        }

        let records: Vec<AnswerRecord> = answers
            .iter()
            .map(|a| AnswerRecord {
                question_id: a.question_id.clone(),
                option_index: a.option_index,
                response_time_ms: a.response_time_ms,
            })
            .collect();
        let profile = derive_profile(&self.questions, &records);
        let profile_path = dir.join(PROFILE_FILE);
        {
            let (store, path) = (self.store.clone(), profile_path.clone());
            let (exported, questions) = (profile.clone(), self.questions.clone());
            tokio::task::spawn_blocking(move || exported.export(&store, &path, &questions))
                .await?
                .context("failed to export profile")?;
        }

        let expert = answers.last().map_or(Expert::Direct, |a| a.expert);
        let anchor = ExecAnchor::new(&profile.checksum)
            .with_expert(expert.to_string())
            .to_string();
        let finale = FinaleSection {
            message: format!("{FINALE_MESSAGE} {anchor}"),
            usd_path: profile_path.display().to_string(),
            checksum: profile.checksum.clone(),
            total_questions: total,
            questions_answered: answers.len() as u32,
        };
        on_channel(&channel, move |ch| ch.post_finale(finale))
            .await?
            .context("failed to post finale")?;
        tracing::info!(checksum = %profile.checksum, path = %profile_path.display(), "session complete");

        Ok(SessionReport {
            mode: channel.mode(),
            downgraded,
            acked,
            bridge_dir: dir.to_path_buf(),
            answers,
            profile,
            profile_path,
            anchor,
        })
    }

    /// Post a single `question` and wait for its answer. Used to check a
    /// consumer's wiring without running a full session.
    pub async fn ask_single(&self, mode: BridgeMode, question: &Question) -> Result<ReceivedAnswer> {
        let dir = self.bridge_dir()?;
        let channel: Arc<dyn BridgeChannel> = Arc::from(open_channel(mode, &dir, self.store.clone()));
        let posted = question.clone();
        on_channel(&channel, move |ch| ch.post_question(&posted, 0, 1))
            .await?
            .with_context(|| format!("failed to post question '{}'", question.id))?;
        tracing::info!(question_id = %question.id, path = %channel.state_path().display(), "test question posted");

        let answer = self.await_answer(&channel, question).await?;
        on_channel(&channel, |ch| ch.acknowledge_answer())
            .await?
            .context("failed to clear consumed answer")?;
        Ok(answer)
    }

    /// Poll for the answer to `question`. Answers echoing another question
    /// id are ignored and polling continues.
    async fn await_answer(
        &self,
        channel: &Arc<dyn BridgeChannel>,
        question: &Question,
    ) -> Result<ReceivedAnswer> {
        let timeout = self.config.bridge.answer_timeout();
        let (reader, expected) = (Arc::clone(channel), question.id.clone());
        let outcome = self
            .poller
            .poll_blocking_until(timeout, move || match reader.read_answer() {
                Ok(Some(answer)) if answer.question_id == expected => Some(Ok(answer)),
                Ok(Some(answer)) => {
                    tracing::debug!(
                        expected = %expected,
                        received = %answer.question_id,
                        "discarding answer for another question"
                    );
                    None
                }
                Ok(None) => None,
                Err(e @ DocumentError::Malformed { .. }) => Some(Err(e)),
                Err(e) => {
                    tracing::debug!(error = %e, "answer not readable yet");
                    None
                }
            })
            .await;

        match outcome {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(e)) => {
                let reason = e.to_string();
                match on_channel(channel, move |ch| ch.report_malformed(&reason)).await? {
                    Ok(()) => {}
                    Err(mark) => tracing::warn!(error = %mark, "could not mark bridge document as error"),
                }
                Err(e).with_context(|| format!("bridge document malformed while waiting on '{}'", question.id))
            }
            None => bail!(
                "no answer for question '{}' within {}s",
                question.id,
                timeout.as_secs()
            ),
        }
    }

    fn total(&self) -> u32 {
        u32::try_from(self.questions.len()).unwrap_or(u32::MAX)
    }
}

/// Run one channel call on the blocking pool. Channel calls go through the
/// atomic store, which may sleep while another writer holds the lock.
async fn on_channel<T, F>(channel: &Arc<dyn BridgeChannel>, call: F) -> Result<T>
where
    F: FnOnce(&dyn BridgeChannel) -> T + Send + 'static,
    T: Send + 'static,
{
    let channel = Arc::clone(channel);
    Ok(tokio::task::spawn_blocking(move || call(channel.as_ref())).await?)
}

fn clear_stale_files(store: &AtomicStore, dir: &Path) {
    for name in [STATE_FILE, ANSWER_FILE, ACK_FILE, HEARTBEAT_FILE] {
        let path = dir.join(name);
        match store.remove(&path) {
            Ok(true) => tracing::debug!(path = %path.display(), "removed stale bridge file"),
            Ok(false) => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove stale bridge file"),
        }
    }
}

fn initialize_channel(
    store: &AtomicStore,
    mode: BridgeMode,
    dir: &Path,
    total: u32,
    first_scene: &str,
) -> Result<(Box<dyn BridgeChannel>, bool)> {
    let channel = open_channel(mode, dir, store.clone());

    let usable = match channel.post_ready(total, first_scene) {
        Ok(()) if mode == BridgeMode::LegacyJson => true,
        Ok(()) => {
            let report = validate_bridge_state(store, channel.state_path());
            if !report.valid {
                tracing::warn!(errors = ?report.errors, "bridge document failed validation");
            }
            report.valid
        }
        Err(e) if mode == BridgeMode::Document => {
            tracing::warn!(error = %e, "bridge document could not be written");
            false
        }
        Err(e) => return Err(e).context("failed to post ready state"),
    };
    if usable {
        tracing::info!(mode = ?mode, path = %channel.state_path().display(), "bridge initialized");
        return Ok((channel, false));
    }

    tracing::warn!("falling back to legacy JSON bridge");
    let legacy = open_channel(BridgeMode::LegacyJson, dir, store.clone());
    legacy
        .post_ready(total, first_scene)
        .context("failed to post ready state")?;
    Ok((legacy, true))
}
