//! Persisted UI preferences
//!
//! A flat JSON document holding presentation choices (theme, avatars) and an
//! optional model-name override for the code generator. Read and written as a
//! whole document, last writer wins; load errors degrade to defaults rather
//! than failing a session over a corrupt preference file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// User preferences persisted between sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    /// UI theme name
    pub theme: String,

    /// Avatar shown for the user
    pub user_avatar: String,

    /// Avatar shown for the agent
    pub agent_avatar: String,

    /// Optional override of the generator model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            theme: "Warm Peach".to_string(),
            user_avatar: "👤".to_string(),
            agent_avatar: "🤖".to_string(),
            model: None,
        }
    }
}

impl Prefs {
    /// Load preferences from the given path
    ///
    /// A missing file is seeded with defaults; unknown or missing keys fall
    /// back to their defaults via `#[serde(default)]`.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            let prefs = Self::default();
            prefs.save(path);
            return prefs;
        }

        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), "Unreadable preference file, using defaults: {e}");
                Self::default()
            }),
            Err(e) => {
                warn!(path = %path.display(), "Failed to read preference file: {e}");
                Self::default()
            }
        }
    }

    /// Save preferences to the given path (whole document, last writer wins)
    pub fn save(&self, path: &Path) {
        let Ok(text) = serde_json::to_string_pretty(self) else {
            return;
        };
        if let Err(e) = std::fs::write(path, text) {
            warn!(path = %path.display(), "Failed to save preferences: {e}");
        }
    }
}
