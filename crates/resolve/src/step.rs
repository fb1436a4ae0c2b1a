//! Relative step computation (heller/dunkler, wärmer/kälter).
//!
//! Steps are computed from the entity's *current* state at execution time
//! and are never cached; a replayed "dunkler" dims further instead of
//! jumping back to the first result.

use heim_agent_config::domain::{domain_config, StepConfig};
use heim_agent_core::HomePlatform;

/// Computed step: which attribute to set and to what.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub attribute: &'static str,
    pub new_value: f64,
    pub current_value: f64,
    pub step_applied: f64,
}

pub struct StepController;

impl StepController {
    /// Compute the step for an entity, `None` when the domain has no step
    /// support, the entity is unknown, or a `step_down` hits an off entity.
    pub fn compute(
        home: &dyn HomePlatform,
        entity_id: &str,
        command: &str,
    ) -> Option<StepResult> {
        if !matches!(command, "step_up" | "step_down") {
            return None;
        }
        let domain = entity_id.split('.').next()?;
        let step = domain_config(domain)?.step?;
        let state = home.state(entity_id)?;

        match step {
            StepConfig::Percent {
                attribute,
                step_percent,
                min_step,
                off_to_on,
            } => {
                let current = match domain {
                    // Light brightness is stored 0..255.
                    "light" => {
                        let raw = state.num_attr(attribute).unwrap_or(0.0);
                        (raw / 255.0 * 100.0).round()
                    }
                    "cover" => state.num_attr("current_position").unwrap_or(0.0),
                    _ => state.num_attr(attribute).unwrap_or(0.0),
                };
                let is_off =
                    matches!(state.state.as_str(), "off" | "closed" | "unavailable")
                        || current == 0.0;

                if command == "step_up" {
                    if is_off {
                        return Some(StepResult {
                            attribute,
                            new_value: off_to_on as f64,
                            current_value: 0.0,
                            step_applied: off_to_on as f64,
                        });
                    }
                    let applied = (min_step as f64)
                        .max((current * step_percent as f64 / 100.0).floor());
                    Some(StepResult {
                        attribute,
                        new_value: (current + applied).min(100.0),
                        current_value: current,
                        step_applied: applied,
                    })
                } else {
                    if is_off {
                        // Nothing to dim further.
                        return None;
                    }
                    let applied = (min_step as f64)
                        .max((current * step_percent as f64 / 100.0).floor());
                    Some(StepResult {
                        attribute,
                        new_value: (current - applied).max(0.0),
                        current_value: current,
                        step_applied: applied,
                    })
                }
            }
            StepConfig::Absolute {
                attribute,
                step,
                min,
                max,
            } => {
                let current = state
                    .num_attr(attribute)
                    .or_else(|| state.num_attr("current_temperature"))?;
                let new_value = if command == "step_up" {
                    (current + step).min(max)
                } else {
                    (current - step).max(min)
                };
                Some(StepResult {
                    attribute,
                    new_value,
                    current_value: current,
                    step_applied: step,
                })
            }
        }
    }
}
