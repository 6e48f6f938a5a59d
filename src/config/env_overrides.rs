use super::{BridgeMode, Config};

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("HOSTBRIDGE_DIR")
            && !dir.is_empty()
        {
            self.bridge.dir = dir;
        }

        if let Ok(mode) = std::env::var("HOSTBRIDGE_MODE") {
            match mode.trim().to_ascii_lowercase().as_str() {
                "document" => self.bridge.mode = BridgeMode::Document,
                "legacy_json" | "json" => self.bridge.mode = BridgeMode::LegacyJson,
                "" => {}
                other => tracing::warn!(mode = other, "ignoring unknown HOSTBRIDGE_MODE"),
            }
        }

        if let Ok(url) =
            std::env::var("HOSTBRIDGE_REMOTE_URL").or_else(|_| std::env::var("UE_REMOTE_URL"))
            && !url.is_empty()
        {
            self.remote.base_url = url;
        }

        if let Ok(timeout) = std::env::var("HOSTBRIDGE_ANSWER_TIMEOUT")
            && let Ok(secs) = timeout.parse::<u64>()
            && secs > 0
        {
            self.bridge.answer_timeout_secs = secs;
        }
    }
}
