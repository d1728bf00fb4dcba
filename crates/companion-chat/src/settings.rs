//! Engine settings read from the durable store.
//!
//! The settings screen writes these keys; the engine only reads them. Each
//! key is decoded on its own, so one corrupt value does not hide the others.

use serde::{Deserialize, Serialize};
use tracing::debug;

use companion_core::types::{Persona, PersonaPreset, PersonaTraits};
use companion_store::DurableStore;

/// Store keys consumed by the engine.
pub mod keys {
    pub const CONTEXT_WINDOW: &str = "CONTEXT_WINDOW";
    pub const FEATURES: &str = "FEATURES";
    pub const USER_ROLE: &str = "USER_ROLE";
    pub const AI_PERSONA: &str = "AI_PERSONA";
    pub const AI_TRAITS: &str = "AI_TRAITS";
    pub const USE_NYPTHO: &str = "USE_NYPTHO";
    pub const BACKEND_URL: &str = "BACKEND_URL";
    pub const COLLECT_FEEDBACK: &str = "COLLECT_FEEDBACK";
    pub const DETAILED_NEGATIVE_FEEDBACK: &str = "DETAILED_NEGATIVE_FEEDBACK";
    pub const FEEDBACK: &str = "FEEDBACK";
    pub const ANALYTICS: &str = "ALU_CHATBOT_ANALYTICS";
}

/// Feature that gates whether prior messages are sent as context.
pub const CHAT_HISTORY_FEATURE: &str = "chat_history";

// =============================================================================
// Roles and Features
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Student,
    Faculty,
    Admin,
}

/// Who may use a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureAccess {
    Public,
    Beta,
    Admin,
    Developer,
}

impl FeatureAccess {
    pub fn visible_to(&self, role: UserRole) -> bool {
        match role {
            UserRole::Admin => true,
            UserRole::Faculty => matches!(self, FeatureAccess::Public | FeatureAccess::Beta),
            UserRole::Student => matches!(self, FeatureAccess::Public),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub access: FeatureAccess,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub beta: bool,
}

impl FeatureFlag {
    fn new(id: &str, name: &str, description: &str, access: FeatureAccess) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            access,
            enabled: true,
            beta: access == FeatureAccess::Beta,
        }
    }
}

/// Features assumed when the store holds no `FEATURES` list.
pub fn default_features() -> Vec<FeatureFlag> {
    vec![
        FeatureFlag::new(
            "contextual_search",
            "Contextual Search",
            "Enhanced search with academic context awareness",
            FeatureAccess::Public,
        ),
        FeatureFlag::new(
            CHAT_HISTORY_FEATURE,
            "Conversation History",
            "Save and reference previous conversations",
            FeatureAccess::Public,
        ),
        FeatureFlag::new(
            "responsive_ui",
            "Responsive Interface",
            "Adaptive design for all devices",
            FeatureAccess::Public,
        ),
        FeatureFlag::new(
            "semantic_search",
            "Semantic Search",
            "Advanced meaning-based search capabilities",
            FeatureAccess::Beta,
        ),
        FeatureFlag::new(
            "analytics_dashboard",
            "Analytics Dashboard",
            "View detailed usage statistics and patterns",
            FeatureAccess::Admin,
        ),
    ]
}

// =============================================================================
// EngineSettings
// =============================================================================

/// Snapshot of the settings keys.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub context_window: Option<usize>,
    pub features: Vec<FeatureFlag>,
    pub role: UserRole,
    pub persona_preset: PersonaPreset,
    pub traits: PersonaTraits,
    pub use_learning_model: bool,
    pub backend_url: Option<String>,
    /// Whether assistant replies can be rated.
    pub collect_feedback: bool,
    /// Whether a negative rating keeps its free-text details.
    pub detailed_negative_feedback: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            context_window: None,
            features: default_features(),
            role: UserRole::default(),
            persona_preset: PersonaPreset::default(),
            traits: PersonaTraits::default(),
            use_learning_model: false,
            backend_url: None,
            collect_feedback: true,
            detailed_negative_feedback: true,
        }
    }
}

impl EngineSettings {
    /// Read every settings key, falling back to defaults for absent or
    /// undecodable values.
    pub fn load(store: &DurableStore) -> Self {
        let defaults = Self::default();
        let persona_preset = store
            .load::<String>(keys::AI_PERSONA)
            .map(|key| PersonaPreset::from_key(&key))
            .unwrap_or(defaults.persona_preset);
        let use_learning_model = store
            .load::<bool>(keys::USE_NYPTHO)
            .unwrap_or(false)
            || persona_preset.uses_learning_model();

        let settings = Self {
            context_window: store
                .load::<usize>(keys::CONTEXT_WINDOW)
                .filter(|&window| window > 0),
            features: store
                .load::<Vec<FeatureFlag>>(keys::FEATURES)
                .unwrap_or(defaults.features),
            role: store.load::<UserRole>(keys::USER_ROLE).unwrap_or_default(),
            persona_preset,
            traits: store
                .load::<PersonaTraits>(keys::AI_TRAITS)
                .unwrap_or(defaults.traits),
            use_learning_model,
            backend_url: store
                .load::<String>(keys::BACKEND_URL)
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            collect_feedback: store
                .load::<bool>(keys::COLLECT_FEEDBACK)
                .unwrap_or(defaults.collect_feedback),
            detailed_negative_feedback: store
                .load::<bool>(keys::DETAILED_NEGATIVE_FEEDBACK)
                .unwrap_or(defaults.detailed_negative_feedback),
        };
        debug!(
            role = ?settings.role,
            persona = ?settings.persona_preset,
            context_window = ?settings.context_window,
            "Engine settings loaded"
        );
        settings
    }

    /// Whether `id` names an enabled feature visible to the current role.
    /// Unknown features are disabled.
    pub fn is_feature_enabled(&self, id: &str) -> bool {
        self.features
            .iter()
            .find(|f| f.id == id)
            .is_some_and(|f| f.enabled && f.access.visible_to(self.role))
    }

    pub fn history_enabled(&self) -> bool {
        self.is_feature_enabled(CHAT_HISTORY_FEATURE)
    }

    /// Context window to use, given the configured default.
    pub fn context_window_or(&self, default: usize) -> usize {
        self.context_window.unwrap_or(default)
    }

    pub fn persona(&self) -> Persona {
        Persona::from_preset(self.persona_preset, self.traits.clone())
    }
}
