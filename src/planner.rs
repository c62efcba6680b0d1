//! Chunk planning: turns a response string into timed fragments.
//!
//! A model's `tokens_per_second` is converted into a chunk size and an
//! inter-emission delay by one of two policies:
//!
//! - **Adaptive**: chunk size is fixed, the delay is derived from speed.
//!   Smoother pacing for slow models.
//! - **FixedInterval**: the delay is fixed, chunk size is derived from speed.
//!   Fewer wake-ups for fast models.
//!
//! In `auto` mode the policy is picked by comparing the model speed to a
//! configured cutoff.

use std::time::Duration;

use fastrand::Rng;
use serde::Deserialize;

use crate::errors::ConfigError;
use crate::registry::ModelProfile;

/// Which policy to use, as written in configuration.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Auto,
    Adaptive,
    Fixed,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdaptiveParams {
    pub base_chunk_size: usize,
    pub random_jitter_range: usize,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixedIntervalParams {
    pub delay_ms: u64,
    pub random_jitter_range: usize,
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        Self {
            base_chunk_size: 1,
            random_jitter_range: 2,
        }
    }
}

impl Default for FixedIntervalParams {
    fn default() -> Self {
        Self {
            delay_ms: 50,
            random_jitter_range: 2,
        }
    }
}

/// `[token_strategy]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Models strictly faster than this use FixedInterval in `auto` mode.
    pub auto_cutoff_tps: f64,
    pub adaptive: AdaptiveParams,
    pub fixed: FixedIntervalParams,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::Auto,
            auto_cutoff_tps: 100.0,
            adaptive: AdaptiveParams::default(),
            fixed: FixedIntervalParams::default(),
        }
    }
}

impl StrategyConfig {
    /// Resolve the concrete policy for a model speed.
    pub fn select(&self, tokens_per_second: f64) -> Policy {
        match self.kind {
            StrategyKind::Adaptive => Policy::Adaptive(self.adaptive),
            StrategyKind::Fixed => Policy::FixedInterval(self.fixed),
            StrategyKind::Auto if tokens_per_second > self.auto_cutoff_tps => {
                Policy::FixedInterval(self.fixed)
            }
            StrategyKind::Auto => Policy::Adaptive(self.adaptive),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adaptive.base_chunk_size == 0 {
            return Err(ConfigError::InvalidStrategy {
                details: "adaptive.base_chunk_size must be at least 1".to_string(),
            });
        }
        if self.fixed.delay_ms == 0 {
            return Err(ConfigError::InvalidStrategy {
                details: "fixed.delay_ms must be at least 1".to_string(),
            });
        }
        if self.kind == StrategyKind::Auto
            && !(self.auto_cutoff_tps.is_finite() && self.auto_cutoff_tps > 0.0)
        {
            return Err(ConfigError::InvalidStrategy {
                details: format!(
                    "auto_cutoff_tps must be a positive number, got {}",
                    self.auto_cutoff_tps
                ),
            });
        }
        Ok(())
    }
}

/// A resolved sizing/delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Adaptive(AdaptiveParams),
    FixedInterval(FixedIntervalParams),
}

impl Policy {
    /// Base chunk size in characters and the delay between emissions.
    pub fn chunk_size_and_delay(&self, tokens_per_second: f64) -> (usize, Duration) {
        match self {
            Self::Adaptive(params) => {
                let chunk_size = params.base_chunk_size.max(1);
                let emissions_per_sec = (tokens_per_second / chunk_size as f64).ceil().max(1.0);
                let delay_nanos = (1_000_000_000.0 / emissions_per_sec).round() as u64;
                (chunk_size, Duration::from_nanos(delay_nanos))
            }
            Self::FixedInterval(params) => {
                let chunk_size =
                    ((params.delay_ms as f64 * tokens_per_second / 1000.0).floor() as usize).max(1);
                (chunk_size, Duration::from_millis(params.delay_ms))
            }
        }
    }

    pub fn jitter_range(&self) -> usize {
        match self {
            Self::Adaptive(params) => params.random_jitter_range,
            Self::FixedInterval(params) => params.random_jitter_range,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Adaptive(_) => "adaptive",
            Self::FixedInterval(_) => "fixed_interval",
        }
    }
}

/// One contiguous slice of the response text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// 1-based position in the sequence.
    pub index: usize,
    pub text: String,
}

/// Fragments to emit and the constant pause between them.
#[derive(Debug, Clone)]
pub struct Plan {
    pub fragments: Vec<Fragment>,
    pub delay: Duration,
    pub chunk_size: usize,
    pub policy: Policy,
}

impl Plan {
    pub fn delay_ms(&self) -> f64 {
        self.delay.as_secs_f64() * 1000.0
    }

    /// Total characters across all fragments.
    pub fn char_count(&self) -> usize {
        self.fragments.iter().map(|f| f.text.chars().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Partition `text` into fragments paced for `profile`.
///
/// Jitter only varies fragment size; the delay is the same for every
/// fragment. Slicing counts Unicode scalar values, so fragments are always
/// valid UTF-8 and concatenate back to `text`.
pub fn plan(text: &str, profile: &ModelProfile, strategy: &StrategyConfig, rng: &mut Rng) -> Plan {
    let policy = strategy.select(profile.tokens_per_second);
    let (chunk_size, delay) = policy.chunk_size_and_delay(profile.tokens_per_second);
    let jitter_range = policy.jitter_range();

    let mut fragments = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let take = chunk_size.saturating_add(rng.usize(0..=jitter_range)).max(1);
        let end = rest
            .char_indices()
            .nth(take)
            .map_or(rest.len(), |(offset, _)| offset);

        let (head, tail) = rest.split_at(end);
        fragments.push(Fragment {
            index: fragments.len() + 1,
            text: head.to_string(),
        });
        rest = tail;
    }

    Plan {
        fragments,
        delay,
        chunk_size,
        policy,
    }
}
