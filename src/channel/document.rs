use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::config::BridgeMode;
use crate::document::{
    AckSection, BRIDGE_FILE, BehavioralSignals, BridgeDocument, FinaleSection, Question,
    ReceivedAnswer, parse, render,
};
use crate::error::DocumentError;
use crate::store::{AtomicStore, ReadOutcome};

use super::{BridgeChannel, now};

/// Channel over the single structured bridge document.
///
/// The orchestrator keeps its last written document so a mutation can
/// proceed when the file is missing. Consumer-owned sections (answer, ack,
/// signals) are always taken from disk, and a document on disk that does
/// not parse is never overwritten by a mutation.
pub struct DocumentChannel {
    path: PathBuf,
    store: AtomicStore,
    last: Mutex<BridgeDocument>,
}

impl DocumentChannel {
    pub fn new(dir: &Path, store: AtomicStore) -> Self {
        Self {
            path: dir.join(BRIDGE_FILE),
            store,
            last: Mutex::new(BridgeDocument::default()),
        }
    }

    /// Parse the current document without taking the lock.
    pub fn snapshot(&self) -> Result<Option<BridgeDocument>, DocumentError> {
        match self.store.read(&self.path) {
            ReadOutcome::Content(text) => parse(&text).map(Some),
            ReadOutcome::Absent | ReadOutcome::Unavailable => Ok(None),
        }
    }

    fn mutate(
        &self,
        apply: impl FnOnce(&mut BridgeDocument) -> Result<(), DocumentError>,
    ) -> Result<(), DocumentError> {
        let fallback = self.last.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let path = &self.path;
        let written = self.store.update(path, |current| {
            let mut doc = match current.map(parse) {
                Some(Ok(doc)) => doc,
                Some(Err(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "refusing to mutate malformed bridge document");
                    return Err(e);
                }
                None => fallback,
            };
            apply(&mut doc)?;
            Ok::<_, DocumentError>((render(&doc), doc))
        })?;
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = written;
        Ok(())
    }
}

impl BridgeChannel for DocumentChannel {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Document
    }

    fn state_path(&self) -> &Path {
        &self.path
    }

    fn post_ready(&self, total_questions: u32, first_scene: &str) -> Result<(), DocumentError> {
        let doc = BridgeDocument::ready(total_questions, first_scene, &now());
        self.store.write(&self.path, &render(&doc))?;
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = doc;
        tracing::debug!(path = %self.path.display(), total_questions, "ready posted");
        Ok(())
    }

    fn post_question(
        &self,
        question: &Question,
        index: u32,
        total: u32,
    ) -> Result<(), DocumentError> {
        self.mutate(|doc| doc.install_question(question, index, total, &now()))
    }

    fn read_answer(&self) -> Result<Option<ReceivedAnswer>, DocumentError> {
        Ok(self.snapshot()?.and_then(|doc| doc.received_answer()))
    }

    /// Clears the answer block only. The status stays `answer_received`
    /// until the next post moves it on.
    fn acknowledge_answer(&self) -> Result<(), DocumentError> {
        self.mutate(|doc| {
            doc.clear_answer();
            Ok(())
        })
    }

    fn post_transition(
        &self,
        direction: &str,
        next_scene: &str,
        progress: f64,
        from_question_id: &str,
    ) -> Result<(), DocumentError> {
        self.mutate(|doc| {
            doc.install_transition(direction, next_scene, progress, from_question_id, &now());
            Ok(())
        })
    }

    fn post_finale(&self, finale: FinaleSection) -> Result<(), DocumentError> {
        self.mutate(|doc| {
            doc.install_finale(finale, &now());
            Ok(())
        })
    }

    fn read_ack(&self) -> Result<Option<AckSection>, DocumentError> {
        Ok(self
            .snapshot()?
            .map(|doc| doc.ack)
            .filter(|ack| ack.ready))
    }

    fn read_signals(&self) -> Option<BehavioralSignals> {
        self.snapshot().ok().flatten().map(|doc| doc.signals)
    }

    fn report_malformed(&self, reason: &str) -> Result<(), DocumentError> {
        let mut doc = self.last.lock().unwrap_or_else(PoisonError::into_inner).clone();
        doc.mark_error(reason, "malformed_document");
        self.store.write(&self.path, &render(&doc))?;
        tracing::warn!(path = %self.path.display(), reason, "bridge document marked as error");
        Ok(())
    }

    fn reset(&self) -> Result<(), DocumentError> {
        self.store.remove(&self.path)?;
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = BridgeDocument::default();
        Ok(())
    }
}
