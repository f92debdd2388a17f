//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{MeetspaceSettings, SuggesterKind};

/// Resolve the path to the settings file (`~/.meetspace/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".meetspace").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MeetspaceSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<MeetspaceSettings> {
    let defaults = serde_json::to_value(MeetspaceSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MeetspaceSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Reject values the server cannot run with. Env overrides are range-checked
/// on the way in; this covers whatever came from the file.
pub fn validate(settings: &MeetspaceSettings) -> Result<()> {
    let server = &settings.server;
    let positive = [
        ("server.broadcastIntervalMs", server.broadcast_interval_ms),
        ("server.heartbeatIntervalMs", server.heartbeat_interval_ms),
        ("server.clientTimeoutMs", server.client_timeout_ms),
        ("server.maxSendQueue", server.max_send_queue as u64),
        ("suggest.timeoutMs", settings.suggest.timeout_ms),
    ];
    if let Some(&(key, _)) = positive.iter().find(|(_, value)| *value == 0) {
        return Err(SettingsError::InvalidValue {
            key,
            reason: "must be greater than zero".into(),
        });
    }
    if server.client_timeout_ms < server.heartbeat_interval_ms {
        return Err(SettingsError::InvalidValue {
            key: "server.clientTimeoutMs",
            reason: format!(
                "{} is shorter than the heartbeat interval ({})",
                server.client_timeout_ms, server.heartbeat_interval_ms
            ),
        });
    }
    Ok(())
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut MeetspaceSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning (falling back to file/default).
/// `GEMINI_API_KEY` wins over the bare `API_KEY`.
pub fn apply_overrides_from(
    settings: &mut MeetspaceSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("MEETSPACE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("MEETSPACE_PORT", 1, 65_535) {
        settings.server.port = v as u16;
    }
    if let Some(v) = env.u64_in("MEETSPACE_BROADCAST_INTERVAL_MS", 10, 60_000) {
        settings.server.broadcast_interval_ms = v;
    }
    if let Some(v) = env.u64_in("MEETSPACE_MAX_SEND_QUEUE", 1, 65_536) {
        settings.server.max_send_queue = v as usize;
    }

    // ── Suggest ─────────────────────────────────────────────────────
    if let Some(v) = env.string("MEETSPACE_SUGGESTER") {
        match serde_json::from_value::<SuggesterKind>(Value::String(v.to_lowercase())) {
            Ok(kind) => settings.suggest.provider = kind,
            Err(_) => tracing::warn!(key = "MEETSPACE_SUGGESTER", value = %v, "unknown suggester, ignoring"),
        }
    }
    if let Some(v) = env.string("MEETSPACE_SUGGEST_MODEL") {
        settings.suggest.model = v;
    }
    if let Some(v) = env.u64_in("MEETSPACE_SUGGEST_TIMEOUT_MS", 100, 600_000) {
        settings.suggest.timeout_ms = v;
    }
    if let Some(v) = env.string("GEMINI_API_KEY").or_else(|| env.string("API_KEY")) {
        settings.suggest.gemini_api_key = Some(v);
    }
    if let Some(v) = env.string("BRAVE_SEARCH_API_KEY") {
        settings.suggest.search_api_key = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("MEETSPACE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("MEETSPACE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server.broadcast_interval_ms, 100);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server":{{"broadcastIntervalMs":250}},"logging":{{"modules":{{"meetspace_server":"debug"}}}}}}"#
        )
        .unwrap();

        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.server.broadcast_interval_ms, 250);
        assert_eq!(settings.server.max_send_queue, 256);
        assert_eq!(
            settings.logging.modules.get("meetspace_server").map(String::as_str),
            Some("debug")
        );
    }

    #[test]
    fn zero_broadcast_interval_in_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server":{{"broadcastIntervalMs":0}}}}"#).unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue { key: "server.broadcastIntervalMs", .. }
        ));
    }

    #[test]
    fn zero_values_are_rejected() {
        let cases: [(&str, fn(&mut MeetspaceSettings)); 4] = [
            ("server.heartbeatIntervalMs", |s| s.server.heartbeat_interval_ms = 0),
            ("server.clientTimeoutMs", |s| s.server.client_timeout_ms = 0),
            ("server.maxSendQueue", |s| s.server.max_send_queue = 0),
            ("suggest.timeoutMs", |s| s.suggest.timeout_ms = 0),
        ];
        for (expected, mutate) in cases {
            let mut settings = MeetspaceSettings::default();
            mutate(&mut settings);
            match validate(&settings) {
                Err(SettingsError::InvalidValue { key, .. }) => assert_eq!(key, expected),
                other => panic!("{expected}: expected InvalidValue, got {other:?}"),
            }
        }
    }

    #[test]
    fn client_timeout_below_heartbeat_is_rejected() {
        let mut settings = MeetspaceSettings::default();
        settings.server.heartbeat_interval_ms = 30_000;
        settings.server.client_timeout_ms = 500;
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue { key: "server.clientTimeoutMs", .. })
        ));
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&MeetspaceSettings::default()).is_ok());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut settings = MeetspaceSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("MEETSPACE_HOST", "127.0.0.1"),
                ("MEETSPACE_PORT", "9100"),
                ("MEETSPACE_BROADCAST_INTERVAL_MS", "50"),
                ("MEETSPACE_SUGGESTER", "Search"),
                ("BRAVE_SEARCH_API_KEY", "brave"),
                ("MEETSPACE_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.broadcast_interval_ms, 50);
        assert_eq!(settings.suggest.provider, SuggesterKind::Search);
        assert_eq!(settings.suggest.search_api_key.as_deref(), Some("brave"));
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = MeetspaceSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("MEETSPACE_PORT", "0"),
                ("MEETSPACE_BROADCAST_INTERVAL_MS", "fast"),
                ("MEETSPACE_SUGGESTER", "oracle"),
                ("MEETSPACE_LOG_JSON", "maybe"),
                ("MEETSPACE_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.broadcast_interval_ms, 100);
        assert_eq!(settings.suggest.provider, SuggesterKind::Gemini);
        assert!(!settings.logging.json);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn gemini_key_preferred_over_bare_api_key() {
        let mut settings = MeetspaceSettings::default();
        apply_overrides_from(&mut settings, env(&[("API_KEY", "legacy")]));
        assert_eq!(settings.suggest.gemini_api_key.as_deref(), Some("legacy"));

        apply_overrides_from(
            &mut settings,
            env(&[("API_KEY", "legacy"), ("GEMINI_API_KEY", "gemini")]),
        );
        assert_eq!(settings.suggest.gemini_api_key.as_deref(), Some("gemini"));
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("perhaps"), None);
        assert_eq!(parse_u64_range("42", 1, 100), Some(42));
        assert_eq!(parse_u64_range("420", 1, 100), None);
        assert_eq!(parse_u64_range("-1", 1, 100), None);
    }
}
