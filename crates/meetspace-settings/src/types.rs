//! Settings types. Every struct deserializes with `default`, so a settings
//! file only needs the keys it overrides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeetspaceSettings {
    pub server: ServerSettings,
    pub suggest: SuggestSettings,
    pub logging: LoggingSettings,
}

/// Network and broadcast settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port.
    pub port: u16,
    /// Period of the full-state `peers`/`usernames` push.
    pub broadcast_interval_ms: u64,
    /// Per-connection outbound queue depth before messages are dropped.
    pub max_send_queue: usize,
    /// WebSocket ping period.
    pub heartbeat_interval_ms: u64,
    /// A connection without a pong for this long is closed.
    pub client_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            broadcast_interval_ms: 100,
            max_send_queue: 256,
            heartbeat_interval_ms: 30_000,
            client_timeout_ms: 90_000,
        }
    }
}

/// Which Prompt-to-URL adapter to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggesterKind {
    /// Two generative calls: interest summary, then URL.
    #[default]
    Gemini,
    /// Generative keyword extraction chained into a web search.
    Search,
    /// Every request answers null.
    Disabled,
}

/// Prompt-to-URL adapter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuggestSettings {
    pub provider: SuggesterKind,
    pub model: String,
    /// Upper bound for one `generateURL` request, all upstream calls included.
    pub timeout_ms: u64,
    pub gemini_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    pub search_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for SuggestSettings {
    fn default() -> Self {
        Self {
            provider: SuggesterKind::Gemini,
            model: "gemini-2.0-flash".to_string(),
            timeout_ms: 20_000,
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            gemini_api_key: None,
            search_base_url: "https://api.search.brave.com".to_string(),
            search_api_key: None,
            max_output_tokens: 200,
            temperature: 0.95,
            top_p: 0.1,
            top_k: 16,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level name (`trace` … `error`).
    pub level: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = MeetspaceSettings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.broadcast_interval_ms, 100);
        assert_eq!(settings.suggest.provider, SuggesterKind::Gemini);
        assert_eq!(settings.suggest.max_output_tokens, 200);
        assert!(settings.suggest.gemini_api_key.is_none());
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: MeetspaceSettings =
            serde_json::from_str(r#"{"server":{"port":9000},"suggest":{"provider":"search"}}"#)
                .unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.suggest.provider, SuggesterKind::Search);
        assert_eq!(settings.suggest.top_k, 16);
    }

    #[test]
    fn api_keys_not_serialized_when_absent() {
        let json = serde_json::to_string(&MeetspaceSettings::default()).unwrap();
        assert!(!json.contains("geminiApiKey"));
        assert!(!json.contains("searchApiKey"));
    }
}
