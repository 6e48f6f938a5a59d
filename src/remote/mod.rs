//! Resilient execution of ad hoc commands on the consumer's host over HTTP.

mod breaker;
mod client;
mod executor;
mod script;

pub use breaker::{CircuitBreaker, CircuitState};
pub use client::{CONSOLE_FUNCTION, CONSOLE_OBJECT_PATH, RemoteClient};
pub use executor::{RemoteExecutor, RemoteHealth};
pub use script::{RESULT_PREFIX, RawResult, ScriptOutput, parse_result, wrap_code};
