//! The shared bridge document: typed model, text rendering and parsing,
//! validation, and the legacy flat-file format.

pub mod legacy;
mod parse;
#[cfg(test)]
pub(crate) mod test_support;
mod types;
mod usda;
mod validate;

pub use parse::{Prim, REQUIRED_PRIMS, Stage, Value, parse, parse_stage};
pub use types::{
    AckSection, AnswerSection, BRIDGE_VERSION, BehavioralSignals, BridgeDocument, Choice,
    Direction, ErrorInfo, FinaleSection, MAX_OPTIONS, MessageSection, MessageType, OptionEntry,
    PROTOCOL, Question, ReadySection, ReceivedAnswer, SyncStatus, TransitionSection, UNANSWERED,
};
pub use usda::{escape, render};
pub use validate::{ValidationReport, validate_bridge_state, validate_text};

pub const BRIDGE_FILE: &str = "bridge_state.usda";
