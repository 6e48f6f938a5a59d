//! Fixed-priority classification of behavioral signals into a handling mode.

use serde::Serialize;
use strum::{Display, EnumString};

use crate::document::BehavioralSignals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
pub enum Expert {
    Validator,
    Scaffolder,
    Restorer,
    Refocuser,
    Celebrator,
    Socratic,
    Direct,
}

const RAPID_CLICK_LIMIT: u32 = 3;
const HESITATION_LIMIT: u32 = 2;

/// Map signals to an expert. Rules are evaluated in order and the first
/// match wins; reordering them changes behavior.
pub fn route(signals: &BehavioralSignals) -> Expert {
    let state = signals.detected_state.as_str();
    let burnout = signals.burnout_level.as_str();

    if state == "frustrated" || burnout == "RED" || signals.rapid_click_count > RAPID_CLICK_LIMIT {
        return Expert::Validator;
    }
    if matches!(state, "stuck" | "overwhelmed") || signals.hesitation_count > HESITATION_LIMIT {
        return Expert::Scaffolder;
    }
    if state == "depleted" || burnout == "ORANGE" {
        return Expert::Restorer;
    }
    match state {
        "distracted" => Expert::Refocuser,
        "completing" => Expert::Celebrator,
        "exploring" => Expert::Socratic,
        _ => Expert::Direct,
    }
}
