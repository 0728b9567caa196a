use serde::{Deserialize, Serialize};

/// Configuration for the invocation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of invocations executing concurrently on the worker
    /// pool. `0` means unbounded.
    #[serde(default)]
    pub max_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { max_concurrency: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        assert_eq!(EngineConfig::default().max_concurrency, 0);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_concurrency, 0);
        let config: EngineConfig = serde_json::from_str(r#"{"max_concurrency": 8}"#).unwrap();
        assert_eq!(config.max_concurrency, 8);
    }
}
