use crate::infrastructure::error::CoreError;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const APP_JSON: &str = "app.json";
const SCHEDULER_JSON: &str = "scheduler.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub tick_interval_seconds: u64,
    pub lookback_hours: i64,
    pub horizon_count: usize,
    pub snooze_minutes: i64,
    pub min_gap_minutes: i64,
    pub timezone: Tz,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
            lookback_hours: 24,
            horizon_count: 30,
            snooze_minutes: 10,
            min_gap_minutes: 1,
            timezone: Tz::UTC,
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "TaskBell",
                "timezone": "UTC"
            }),
        ),
        (
            SCHEDULER_JSON,
            serde_json::json!({
                "schema": 1,
                "tickIntervalSeconds": 60,
                "lookbackHours": 24,
                "generationHorizonCount": 30,
                "snoozeMinutes": 10,
                "minGapMinutes": 1
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), CoreError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, CoreError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| CoreError::InvalidInput(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(CoreError::InvalidInput(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn read_timezone(config_dir: &Path) -> Result<Tz, CoreError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let name = app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("UTC");
    Tz::from_str(name)
        .map_err(|_| CoreError::InvalidInput(format!("unknown timezone in app.json: {name}")))
}

/// Reads the scheduler config leniently, falling back to defaults for any
/// missing or unreadable field.
pub fn load_monitor_config(config_dir: &Path) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    if let Ok(timezone) = read_timezone(config_dir) {
        config.timezone = timezone;
    }

    let path = config_dir.join(SCHEDULER_JSON);
    let Ok(raw) = fs::read_to_string(path) else {
        return config;
    };
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return config;
    };

    if let Some(value) = parsed
        .get("tickIntervalSeconds")
        .and_then(serde_json::Value::as_u64)
    {
        config.tick_interval_seconds = value.max(1);
    }
    if let Some(value) = parsed.get("lookbackHours").and_then(serde_json::Value::as_u64) {
        config.lookback_hours = value.max(1) as i64;
    }
    if let Some(value) = parsed
        .get("generationHorizonCount")
        .and_then(serde_json::Value::as_u64)
    {
        config.horizon_count = value.max(1) as usize;
    }
    if let Some(value) = parsed.get("snoozeMinutes").and_then(serde_json::Value::as_u64) {
        config.snooze_minutes = value.max(1) as i64;
    }
    if let Some(value) = parsed.get("minGapMinutes").and_then(serde_json::Value::as_u64) {
        config.min_gap_minutes = value as i64;
    }

    config
}
