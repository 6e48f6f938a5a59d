//! How the orchestrator talks to the consumer through the bridge directory.
//!
//! The wire format is a capability chosen at startup and carried as a
//! value: [`DocumentChannel`] speaks the structured bridge document,
//! [`LegacyJsonChannel`] the flat `state.json` / `answer.json` pair.

mod document;
mod legacy;

use std::path::Path;

use crate::config::BridgeMode;
use crate::document::{AckSection, BehavioralSignals, FinaleSection, Question, ReceivedAnswer};
use crate::error::DocumentError;
use crate::store::AtomicStore;

pub use document::DocumentChannel;
pub use legacy::{ANSWER_FILE, LegacyJsonChannel, STATE_FILE};

/// Orchestrator side of the bridge.
///
/// Every `post_*` is one atomic write. `read_*` calls never block and
/// return `Ok(None)` while the consumer has not produced anything.
pub trait BridgeChannel: Send + Sync {
    fn mode(&self) -> BridgeMode;

    /// Path of the file the consumer watches.
    fn state_path(&self) -> &Path;

    fn post_ready(&self, total_questions: u32, first_scene: &str) -> Result<(), DocumentError>;

    /// Install a question and reset any previous answer in the same write.
    fn post_question(&self, question: &Question, index: u32, total: u32)
    -> Result<(), DocumentError>;

    fn read_answer(&self) -> Result<Option<ReceivedAnswer>, DocumentError>;

    /// Mark the current answer consumed.
    fn acknowledge_answer(&self) -> Result<(), DocumentError>;

    fn post_transition(
        &self,
        direction: &str,
        next_scene: &str,
        progress: f64,
        from_question_id: &str,
    ) -> Result<(), DocumentError>;

    fn post_finale(&self, finale: FinaleSection) -> Result<(), DocumentError>;

    fn read_ack(&self) -> Result<Option<AckSection>, DocumentError>;

    fn read_signals(&self) -> Option<BehavioralSignals> {
        None
    }

    /// Flag the shared state as errored after a malformed read.
    fn report_malformed(&self, _reason: &str) -> Result<(), DocumentError> {
        Ok(())
    }

    /// Remove the files this channel owns.
    fn reset(&self) -> Result<(), DocumentError>;
}

/// Build the channel for `mode` rooted at `dir`.
pub fn open_channel(mode: BridgeMode, dir: &Path, store: AtomicStore) -> Box<dyn BridgeChannel> {
    match mode {
        BridgeMode::Document => Box::new(DocumentChannel::new(dir, store)),
        BridgeMode::LegacyJson => Box::new(LegacyJsonChannel::new(dir, store)),
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
