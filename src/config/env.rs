use super::MonitorConfig;
use tracing::warn;

pub const HOST_ENV: &str = "PRESENCE_MONITOR_HOST";
pub const SECURE_ENV: &str = "PRESENCE_MONITOR_SECURE";
pub const RECONNECT_INCREMENT_ENV: &str = "PRESENCE_MONITOR_RECONNECT_INCREMENT_MS";
pub const MAX_RECONNECT_DELAY_ENV: &str = "PRESENCE_MONITOR_MAX_RECONNECT_DELAY_MS";

/// Apply environment overrides on top of file/default values.
///
/// `lookup` is `std::env::var` in production; unparsable values are
/// ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut MonitorConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(HOST_ENV) {
        if !host.trim().is_empty() {
            config.feed.host = host.trim().to_string();
        }
    }
    if let Some(v) = lookup(SECURE_ENV) {
        match v.parse::<bool>() {
            Ok(b) => config.feed.secure = b,
            Err(_) => warn!(var = SECURE_ENV, value = %v, "Ignoring invalid boolean"),
        }
    }
    if let Some(v) = lookup(RECONNECT_INCREMENT_ENV) {
        match v.parse::<u64>() {
            Ok(n) => config.reconnect.increment_ms = n,
            Err(_) => warn!(var = RECONNECT_INCREMENT_ENV, value = %v, "Ignoring invalid number"),
        }
    }
    if let Some(v) = lookup(MAX_RECONNECT_DELAY_ENV) {
        match v.parse::<u64>() {
            Ok(n) => config.reconnect.max_delay_ms = n,
            Err(_) => warn!(var = MAX_RECONNECT_DELAY_ENV, value = %v, "Ignoring invalid number"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            (HOST_ENV, "feed.local:9999"),
            (SECURE_ENV, "true"),
            (RECONNECT_INCREMENT_ENV, "2000"),
            (MAX_RECONNECT_DELAY_ENV, "20000"),
        ]
        .into_iter()
        .collect();

        let mut config = MonitorConfig::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.feed.ws_url(), "wss://feed.local:9999/ws/status");
        assert_eq!(config.reconnect.increment_ms, 2_000);
        assert_eq!(config.reconnect.max_delay_ms, 20_000);
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let mut config = MonitorConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            SECURE_ENV => Some("maybe".to_string()),
            RECONNECT_INCREMENT_ENV => Some("fast".to_string()),
            _ => None,
        });

        assert!(!config.feed.secure);
        assert_eq!(config.reconnect.increment_ms, 5_000);
    }
}
