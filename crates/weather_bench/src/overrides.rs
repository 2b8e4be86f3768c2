use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use weather_core::{WeatherContent, WeatherId};

const VALID_KEYS: &[&str] = &[
    "clear_state",
    "default_step_frequency_secs",
    "max_simulated_duration_secs",
    "shutdown_grace_secs",
    "random_initial_state",
];

/// Applies scenario overrides to loaded content. `random_initial_state`
/// applies to every region.
pub fn apply_overrides(
    content: &mut WeatherContent,
    overrides: &HashMap<String, serde_json::Value>,
) -> Result<()> {
    let constants = &mut content.constants;
    for (key, value) in overrides {
        match key.as_str() {
            "clear_state" => constants.clear_state = WeatherId::new(as_str(key, value)?),
            "default_step_frequency_secs" => {
                constants.default_step_frequency_secs = as_u64(key, value)?;
            }
            "max_simulated_duration_secs" => {
                constants.max_simulated_duration_secs = as_u64(key, value)?;
            }
            "shutdown_grace_secs" => constants.shutdown_grace_secs = as_u64(key, value)?,
            "random_initial_state" => {
                let enabled = as_bool(key, value)?;
                for region in &mut content.regions {
                    region.random_initial_state = enabled;
                }
            }
            _ => bail!(
                "unknown override key '{key}'. Valid keys: {}",
                VALID_KEYS.join(", ")
            ),
        }
    }
    Ok(())
}

fn as_u64(key: &str, value: &serde_json::Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| anyhow!("override '{key}': expected a positive integer, got {value}"))
}

fn as_bool(key: &str, value: &serde_json::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| anyhow!("override '{key}': expected true or false, got {value}"))
}

fn as_str<'a>(key: &str, value: &'a serde_json::Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| anyhow!("override '{key}': expected a string, got {value}"))
}
