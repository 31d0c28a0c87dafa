//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Retry budget for transient sync failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per step, including the first. Must be at least 1.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Configuration for one session.
///
/// ```json
/// { "kinds": ["VisionProcessor", "LanguageProcessor"], "retry": { "max_attempts": 5 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Processor kinds requested from the backend, one per input.
    pub kinds: Vec<String>,
    /// Explicit input count; defaults to `kinds.len()`.
    pub entity_count: Option<usize>,
    /// Description sent with FINALIZE.
    pub finalize_payload: String,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kinds: Vec::new(),
            entity_count: None,
            finalize_payload: "Final combined gist".into(),
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// One input per kind.
    pub fn with_kinds(kinds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { kinds: kinds.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    /// `k` inputs of the default kind.
    pub fn with_count(k: usize) -> Self {
        Self { entity_count: Some(k), ..Self::default() }
    }

    pub fn with_retry(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn requested_count(&self) -> usize {
        self.entity_count.unwrap_or(self.kinds.len())
    }

    pub fn validate(&self) -> Result<()> {
        let count = self.requested_count();
        if count < 1 {
            return Err(Error::InvalidEntityCount(count));
        }
        if !self.kinds.is_empty() && self.kinds.len() != count {
            return Err(Error::Config(format!(
                "entity_count {count} disagrees with {} kinds",
                self.kinds.len()
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_defaults() {
        let cfg = SessionConfig::from_json(r#"{"kinds": ["VisionProcessor", "AudioProcessor"]}"#).unwrap();
        assert_eq!(cfg.requested_count(), 2);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.finalize_payload, "Final combined gist");
    }

    #[test]
    fn test_validate_rejects_empty() {
        let err = SessionConfig::from_json("{}").unwrap_err();
        assert!(matches!(err, Error::InvalidEntityCount(0)));
    }

    #[test]
    fn test_validate_rejects_mismatch_and_zero_retry() {
        let err = SessionConfig::from_json(r#"{"kinds": ["a"], "entity_count": 2}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(SessionConfig::with_count(2).with_retry(0).validate().is_err());
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(SessionConfig::from_json("{"), Err(Error::Json(_))));
    }
}
