#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::return_self_not_must_use
)]

pub mod channel;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod document;
pub mod error;
pub mod heartbeat;
#[doc(hidden)]
pub mod observability;
pub mod orchestrator;
pub mod poll;
pub mod profile;
pub mod remote;
pub mod routing;
pub mod security;
pub mod store;

pub use config::Config;
pub use error::{BridgeError, Result};
