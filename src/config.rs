//! Configuration management for streampace.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::ConfigError;
use crate::planner::StrategyConfig;
use crate::registry::{default_profiles, ModelProfile, ModelRegistry};

const DEFAULT_TEXT: &str = r"This is a mock response from streampace. It imitates a chat model streaming tokens at a configured speed.
---
Inline math: \( E = mc^2 \) and a display block:
\[ \int_0^\infty e^{-x^2} dx = \frac{\sqrt{\pi}}{2} \]

```rust
fn fib(n: u64) -> u64 {
    match n {
        0 | 1 => n,
        _ => fib(n - 1) + fib(n - 2),
    }
}
```

```sql
SELECT id, COUNT(*) AS total FROM orders GROUP BY id HAVING COUNT(*) > 5;
```

Symbols: ⏳ ∞ ≠ ≥ ←→ 🚀 ✓
Currency: $4.99 ¥1000 €8.50 £25.00
Formula: C₆H₁₂O₆ → 2C₂H₅OH + 2CO₂↑
Greetings: 你好世界! नमस्ते! こんにちは! 😊
Brackets: ⟨⟩⟪⟫《》【】
---
That covers markdown, code fences, LaTeX, emoji and mixed scripts.";

const DEFAULT_THINKING: &str = r"<think>
The user wants a reply. This is a simulated reasoning trace, streamed before the answer so clients can exercise thinking-block handling.
</think>

This is a mock response from a thinking model. The reasoning section above arrives first, then this answer.";

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    /// Extra profiles, looked up after the built-in ones.
    pub models: Vec<ModelProfile>,
    pub responses: ResponseConfig,
    pub token_strategy: StrategyConfig,
    pub usage: UsageConfig,
    pub content: ContentConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    pub default_text: String,
    pub default_thinking: String,
    /// Exact last-message content to canned response.
    pub custom: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Placeholder prompt token count reported on every response.
    pub prompt_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub deterministic: bool,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            models: Vec::new(),
            responses: ResponseConfig::default(),
            token_strategy: StrategyConfig::default(),
            usage: UsageConfig::default(),
            content: ContentConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8787 }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            default_text: DEFAULT_TEXT.to_string(),
            default_thinking: DEFAULT_THINKING.to_string(),
            custom: HashMap::new(),
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self { prompt_tokens: 10 }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            deterministic: false,
            seed: 42,
        }
    }
}

impl ResponseConfig {
    /// Fallback text for a profile when no custom response matches.
    pub fn default_for(&self, profile: &ModelProfile) -> &str {
        if profile.thinking {
            &self.default_thinking
        } else {
            &self.default_text
        }
    }
}

impl Config {
    /// Load config from a specific path. A missing file yields defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file found at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Built-in profiles followed by configured ones.
    pub fn profiles(&self) -> Vec<ModelProfile> {
        let mut profiles = default_profiles();
        profiles.extend(self.models.iter().cloned());
        profiles
    }

    /// Reject settings that would make a profile unservable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for profile in &self.models {
            if profile.id.is_empty() {
                return Err(ConfigError::EmptyModelId);
            }
            if !(profile.tokens_per_second.is_finite() && profile.tokens_per_second > 0.0) {
                return Err(ConfigError::InvalidTokenSpeed {
                    id: profile.id.clone(),
                    value: profile.tokens_per_second,
                });
            }
        }
        self.token_strategy.validate()
    }
}

/// Shared, read-only server state plus the id counter.
#[derive(Debug)]
pub struct RuntimeState {
    pub config: Config,
    pub registry: ModelRegistry,
    next_id: AtomicU64,
}

impl RuntimeState {
    pub fn new(config: Config) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;

        let registry = ModelRegistry::new(config.profiles());
        let start_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);

        Ok(Arc::new(Self {
            config,
            registry,
            next_id: AtomicU64::new(start_ms),
        }))
    }

    /// Next `chatcmpl-` id. Ids increase monotonically for the process.
    pub fn next_completion_id(&self) -> String {
        format!("chatcmpl-{:x}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Jitter source for one request.
    pub fn request_rng(&self) -> fastrand::Rng {
        if self.config.content.deterministic {
            fastrand::Rng::with_seed(self.config.content.seed)
        } else {
            fastrand::Rng::new()
        }
    }
}
