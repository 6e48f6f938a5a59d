//! Deterministic profile fingerprints and the compact routing anchor.

mod anchor;
mod checksum;

pub use anchor::{ExecAnchor, parse_exec_anchor, translators_anchor};
pub use checksum::{CHECKSUM_VERSION, canonical_form, checksum, format_float};
