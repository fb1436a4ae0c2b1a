//! Intent names understood by the host platform, plus classification helpers.

pub const TURN_ON: &str = "HassTurnOn";
pub const TURN_OFF: &str = "HassTurnOff";
pub const LIGHT_SET: &str = "HassLightSet";
pub const SET_POSITION: &str = "HassSetPosition";
pub const GET_STATE: &str = "HassGetState";
pub const CLIMATE_SET_TEMPERATURE: &str = "HassClimateSetTemperature";
pub const TEMPORARY_CONTROL: &str = "HassTemporaryControl";
pub const DELAYED_CONTROL: &str = "HassDelayedControl";
pub const TIMER_SET: &str = "HassTimerSet";
pub const START_TIMER: &str = "HassStartTimer";
pub const CALENDAR_CREATE: &str = "HassCalendarCreate";
pub const CREATE_EVENT: &str = "HassCreateEvent";
pub const VACUUM_START: &str = "HassVacuumStart";

/// Intents whose execution must never be replayed from the cache.
///
/// Timers and calendar entries carry one-shot context, and temporary/delayed
/// control embeds wall-clock state that a replay would get wrong.
pub fn is_non_repeatable(intent: &str) -> bool {
    matches!(
        intent,
        CALENDAR_CREATE | CREATE_EVENT | TIMER_SET | START_TIMER | TEMPORARY_CONTROL
            | DELAYED_CONTROL
    )
}

/// Intents whose candidate set is filtered by current entity state before
/// execution (don't turn on what is already on).
pub fn is_state_dependent(intent: &str) -> bool {
    matches!(intent, TURN_ON | TURN_OFF | SET_POSITION)
}

/// Intents the NLU probe may execute directly without LLM involvement.
pub fn is_host_intent(intent: &str) -> bool {
    intent.starts_with("Hass")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_repeatable_classification() {
        assert!(is_non_repeatable(TIMER_SET));
        assert!(is_non_repeatable(TEMPORARY_CONTROL));
        assert!(is_non_repeatable(CALENDAR_CREATE));
        assert!(!is_non_repeatable(TURN_ON));
        assert!(!is_non_repeatable(LIGHT_SET));
    }

    #[test]
    fn test_state_dependent() {
        assert!(is_state_dependent(TURN_ON));
        assert!(is_state_dependent(SET_POSITION));
        assert!(!is_state_dependent(GET_STATE));
    }
}
