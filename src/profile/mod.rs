//! Questionnaire catalogue and the derived, checksummed profile result.

mod catalogue;
mod result;

pub use catalogue::{default_questions, sample_question};
pub use result::{AnswerRecord, PROFILE_FILE, ProfileResult, derive_profile};
