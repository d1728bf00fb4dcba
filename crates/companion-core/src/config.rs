use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CompanionError, Result};

/// Top-level configuration for the companion engine.
///
/// Loaded from `~/.companion/config.toml` by default. Each section corresponds
/// to one engine component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanionConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub conversations: ConversationConfig,
    #[serde(default)]
    pub widget: WidgetConfig,
}

impl CompanionConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CompanionConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CompanionError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the durable key-value store.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.companion/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the generation backend. Also the health probe target.
    pub base_url: String,
    /// Path of the chat endpoint, appended to `base_url`.
    pub chat_path: String,
    /// Upper bound on a single generation call.
    pub request_timeout_secs: u64,
    /// Upper bound on a single health probe.
    pub health_timeout_secs: u64,
    /// How long a probe result is reused before probing again.
    pub health_cache_secs: u64,
    /// Identity tag attached to outbound requests.
    pub user_id: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            chat_path: "/api/chat".to_string(),
            request_timeout_secs: 10,
            health_timeout_secs: 5,
            health_cache_secs: 30,
            user_id: None,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn health_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.health_cache_secs)
    }

    /// Full URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.chat_path.trim_start_matches('/')
        )
    }
}

/// Conversation repository and turn pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Upper bound on conversations written to the store.
    pub max_conversations: usize,
    /// Quiet period before a burst of mutations is written out.
    pub persist_debounce_ms: u64,
    /// Number of trailing prior messages sent as generation context.
    pub context_window: usize,
    /// Character budget for derived titles.
    pub title_max_chars: usize,
    /// Assistant message seeded into the first conversation.
    pub welcome_message: String,
    /// Store key under which the conversation list lives.
    pub storage_key: String,
    /// Byte quota of the durable store.
    pub store_quota_bytes: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_conversations: 50,
            persist_debounce_ms: 500,
            context_window: 10,
            title_max_chars: 25,
            welcome_message: "# Welcome to ALU Student Companion\n\nI'm here to help! I'll remember our conversation and provide relevant context-aware responses. Feel free to ask any questions!".to_string(),
            storage_key: "alu_chat_conversations".to_string(),
            store_quota_bytes: 5 * 1024 * 1024,
        }
    }
}

impl ConversationConfig {
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

/// Guided-assistance widget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Simulated latency of an appointment booking.
    pub booking_latency_ms: u64,
    /// Simulated latency of sending an email inquiry.
    pub email_latency_ms: u64,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            booking_latency_ms: 1500,
            email_latency_ms: 1500,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = CompanionConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.backend.base_url, "http://localhost:8080");
        assert_eq!(config.backend.request_timeout_secs, 10);
        assert_eq!(config.conversations.max_conversations, 50);
        assert_eq!(config.conversations.persist_debounce_ms, 500);
        assert_eq!(config.conversations.context_window, 10);
        assert_eq!(config.conversations.title_max_chars, 25);
        assert_eq!(config.widget.booking_latency_ms, 1500);
    }

    #[test]
    fn test_chat_url_joins_without_double_slash() {
        let mut backend = BackendConfig::default();
        backend.base_url = "https://example.org/".to_string();
        assert_eq!(backend.chat_url(), "https://example.org/api/chat");

        backend.chat_path = "chat".to_string();
        assert_eq!(backend.chat_url(), "https://example.org/chat");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[conversations]
max_conversations = 5
"#;
        let config: CompanionConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.conversations.max_conversations, 5);
        assert_eq!(config.conversations.context_window, 10);
        assert_eq!(config.backend.chat_path, "/api/chat");
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: CompanionConfig = toml::from_str("").unwrap();
        assert_eq!(config.conversations.storage_key, "alu_chat_conversations");
        assert!(config.backend.user_id.is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CompanionConfig::default();
        config.backend.user_id = Some("user1".to_string());
        config.conversations.title_max_chars = 30;
        config.save(&path).unwrap();

        let loaded = CompanionConfig::load(&path).unwrap();
        assert_eq!(loaded.backend.user_id.as_deref(), Some("user1"));
        assert_eq!(loaded.conversations.title_max_chars, 30);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompanionConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config.conversations.max_conversations, 50);
    }

    #[test]
    fn test_load_or_default_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is [[ not toml").unwrap();
        let config = CompanionConfig::load_or_default(&path);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_duration_helpers() {
        let config = CompanionConfig::default();
        assert_eq!(config.backend.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.backend.health_timeout(), Duration::from_secs(5));
        assert_eq!(config.backend.health_cache_ttl(), Duration::from_secs(30));
        assert_eq!(
            config.conversations.persist_debounce(),
            Duration::from_millis(500)
        );
    }
}
