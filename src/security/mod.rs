mod path;

pub use path::{BridgePathPolicy, resolve_lexically};
