//! Model profiles and prefix lookup.

use serde::{Deserialize, Serialize};

/// Speed and limits of one simulated model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub id: String,
    #[serde(alias = "token_speed")]
    pub tokens_per_second: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Serve the thinking-style default response instead of the plain one.
    #[serde(default)]
    pub thinking: bool,
}

fn default_max_tokens() -> u32 {
    4096
}

impl ModelProfile {
    pub fn new(id: impl Into<String>, tokens_per_second: f64, max_tokens: u32) -> Self {
        Self {
            id: id.into(),
            tokens_per_second,
            max_tokens,
            thinking: false,
        }
    }

    /// Id advertised on `/v1/models`, e.g. `gpt-4o-30tps`.
    pub fn listed_id(&self) -> String {
        format!("{}-{}tps", self.id, self.tokens_per_second)
    }
}

/// Built-in profiles, always present ahead of user-configured ones.
pub fn default_profiles() -> Vec<ModelProfile> {
    vec![
        ModelProfile::new("deepseek-r1-1.5B", 140.0, 4096),
        ModelProfile::new("llama-3-8b", 70.0, 4096),
        ModelProfile::new("gpt-4o", 30.0, 8192),
        ModelProfile::new("deepseek-v3", 10.0, 64 * 1024),
    ]
}

/// Read-only set of model profiles.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    profiles: Vec<ModelProfile>,
}

impl ModelRegistry {
    pub fn new(profiles: Vec<ModelProfile>) -> Self {
        Self { profiles }
    }

    /// First profile whose id is a prefix of `model`.
    ///
    /// Requests for `gpt-4o-2024-08-06` resolve to the `gpt-4o` profile.
    pub fn find(&self, model: &str) -> Option<&ModelProfile> {
        self.profiles.iter().find(|p| model.starts_with(&p.id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
