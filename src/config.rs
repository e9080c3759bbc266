//! Retrieval tuning knobs and their persisted form.

use std::{str::FromStr, time::Duration};

use tracing::warn;

use crate::{
    config_db::ConfigDb,
    error::{Error, Result},
};

/// A recognised `lexbert config` key.
#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub key: &'static str,
    pub default: &'static str,
    pub description: &'static str,
}

pub const MODEL_KEY: &str = "model";

/// Every key `lexbert config set` accepts, with its default.
pub const SETTINGS: &[SettingSpec] = &[
    SettingSpec {
        key: MODEL_KEY,
        default: crate::model_manager::DEFAULT_MODEL_ID,
        description: "embedding model (HuggingFace id or local directory)",
    },
    SettingSpec {
        key: "top_k",
        default: "5",
        description: "default number of chunks to retrieve",
    },
    SettingSpec {
        key: "max_top_k",
        default: "20",
        description: "upper bound for a per-query top-k override",
    },
    SettingSpec {
        key: "max_distance",
        default: "0.65",
        description: "cosine distance cutoff for vector matches",
    },
    SettingSpec {
        key: "max_context_chars",
        default: "3000",
        description: "character budget of an assembled context",
    },
    SettingSpec {
        key: "max_query_chars",
        default: "500",
        description: "longer queries are truncated",
    },
    SettingSpec {
        key: "store_timeout_ms",
        default: "5000",
        description: "per-attempt chunk store timeout",
    },
    SettingSpec {
        key: "encoder_timeout_ms",
        default: "30000",
        description: "per-attempt encoder timeout (includes model loading)",
    },
    SettingSpec {
        key: "retry_backoff_ms",
        default: "200",
        description: "pause before the single retry of a failed call",
    },
];

pub fn setting_spec(key: &str) -> Option<&'static SettingSpec> {
    SETTINGS.iter().find(|s| s.key == key)
}

/// Check that `value` is acceptable for `key` before it is persisted.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    let Some(spec) = setting_spec(key) else {
        let known: Vec<_> = SETTINGS.iter().map(|s| s.key).collect();
        return Err(Error::Config(format!(
            "unknown setting '{key}' (known: {})",
            known.join(", ")
        )));
    };

    // Round-trip through the same parser `load` uses.
    let mut config = RetrievalConfig::default();
    config.apply(spec.key, value)?;
    config.check()
}

/// Settings for one retriever.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Result size when the caller gives no override.
    pub top_k: usize,
    /// Overrides above this are clamped.
    pub max_top_k: usize,
    /// Vector matches farther than this cosine distance are dropped.
    pub max_distance: f32,
    pub max_context_chars: usize,
    pub max_query_chars: usize,
    pub store_timeout: Duration,
    pub encoder_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_top_k: 20,
            max_distance: 0.65,
            max_context_chars: 3000,
            max_query_chars: 500,
            store_timeout: Duration::from_millis(5000),
            encoder_timeout: Duration::from_millis(30_000),
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl RetrievalConfig {
    /// Build the config from stored settings, defaulting missing keys.
    pub fn load(db: &ConfigDb) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in db.settings()? {
            if setting_spec(&key).is_none() {
                warn!(key = %key, "ignoring unknown stored setting");
                continue;
            }
            config.apply(&key, &value)?;
        }
        config.check()?;
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            MODEL_KEY => {
                if value.trim().is_empty() {
                    return Err(Error::Config("model must not be empty".into()));
                }
            }
            "top_k" => self.top_k = parse(key, value)?,
            "max_top_k" => self.max_top_k = parse(key, value)?,
            "max_distance" => self.max_distance = parse(key, value)?,
            "max_context_chars" => self.max_context_chars = parse(key, value)?,
            "max_query_chars" => self.max_query_chars = parse(key, value)?,
            "store_timeout_ms" => {
                self.store_timeout = Duration::from_millis(parse(key, value)?)
            }
            "encoder_timeout_ms" => {
                self.encoder_timeout = Duration::from_millis(parse(key, value)?)
            }
            "retry_backoff_ms" => {
                self.retry_backoff = Duration::from_millis(parse(key, value)?)
            }
            _ => {}
        }
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.top_k == 0 || self.max_top_k == 0 {
            return Err(Error::Config(
                "top_k and max_top_k must be at least 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.max_distance) {
            return Err(Error::Config(format!(
                "max_distance must be within 0.0..=2.0, got {}",
                self.max_distance
            )));
        }
        if self.max_query_chars == 0 {
            return Err(Error::Config(
                "max_query_chars must be at least 1".into(),
            ));
        }
        if self.store_timeout.is_zero() || self.encoder_timeout.is_zero() {
            return Err(Error::Config("timeouts must be positive".into()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        Error::Config(format!("invalid value '{value}' for {key}: {e}"))
    })
}
