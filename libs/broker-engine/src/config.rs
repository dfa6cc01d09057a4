use serde::Deserialize;

use crate::error::BrokerError;

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Topics created at bootstrap.
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
}

/// Limits applied by the engine to every call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Largest accepted key + value size, in bytes.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,

    #[serde(default = "default_max_topic_name_len")]
    pub max_topic_name_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: default_max_record_bytes(),
            max_topic_name_len: default_max_topic_name_len(),
        }
    }
}

fn default_max_record_bytes() -> usize {
    1_048_576
}

fn default_max_topic_name_len() -> usize {
    249
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default = "default_partitions")]
    pub partitions: u32,
}

fn default_partitions() -> u32 {
    1
}

impl BrokerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, BrokerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BrokerError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, BrokerError> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| BrokerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject duplicate topic declarations and zero partition counts.
    pub fn validate(&self) -> Result<(), BrokerError> {
        let mut seen = std::collections::HashSet::new();
        for topic in &self.topics {
            if !seen.insert(topic.name.as_str()) {
                return Err(BrokerError::Config(format!(
                    "topic '{}' declared more than once",
                    topic.name
                )));
            }
            if topic.partitions == 0 {
                return Err(BrokerError::Config(format!(
                    "topic '{}': partitions must be at least 1",
                    topic.name
                )));
            }
        }
        Ok(())
    }
}
