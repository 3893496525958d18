//! Configuration types.
//!
//! Configuration is loaded once at run start and passed by value into the
//! engine; nothing re-reads it mid-run.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Channel, LetterCategory};
use crate::planning::cost::{CostScenario, REALISTIC};

/// Business rule parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSetConfig {
    /// Segments that get vulnerable-customer protection.
    pub vulnerable_segments: BTreeSet<String>,
    /// Minimum channel allowance for vulnerable customers.
    pub vulnerable_min_channels: usize,
    /// Channels accepted as a durable medium for regulatory letters.
    pub durable_channels: BTreeSet<Channel>,
    /// Maximum channels per letter category.
    pub category_caps: BTreeMap<LetterCategory, usize>,
    /// Optional tighter caps per customer segment.
    pub segment_caps: BTreeMap<String, usize>,
}

impl Default for RuleSetConfig {
    fn default() -> Self {
        Self {
            vulnerable_segments: BTreeSet::from(["Vulnerable".to_string()]),
            vulnerable_min_channels: 2,
            durable_channels: BTreeSet::from([Channel::Letter, Channel::Email]),
            category_caps: BTreeMap::from([
                (LetterCategory::Regulatory, 2),
                (LetterCategory::Promotional, 4),
                (LetterCategory::Information, 2),
            ]),
            segment_caps: BTreeMap::new(),
        }
    }
}

impl RuleSetConfig {
    /// Check the parameters can produce a valid constraint for every customer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let channel_count = Channel::ALL.len();

        if self.durable_channels.is_empty() {
            return Err(ConfigError::InvalidRuleConfiguration(
                "durable channel set is empty".into(),
            ));
        }
        if self.vulnerable_min_channels == 0 || self.vulnerable_min_channels > channel_count {
            return Err(ConfigError::InvalidRuleConfiguration(format!(
                "vulnerable_min_channels must be between 1 and {channel_count}, got {}",
                self.vulnerable_min_channels
            )));
        }
        for category in LetterCategory::ALL {
            match self.category_caps.get(&category) {
                None => {
                    return Err(ConfigError::InvalidRuleConfiguration(format!(
                        "no channel cap for {category}"
                    )));
                }
                Some(&cap) if cap > channel_count => {
                    return Err(ConfigError::InvalidRuleConfiguration(format!(
                        "cap for {category} is {cap}, more than the {channel_count} channels available"
                    )));
                }
                Some(_) => {}
            }
        }
        if let Some((segment, cap)) = self.segment_caps.iter().find(|(_, c)| **c > channel_count) {
            return Err(ConfigError::InvalidRuleConfiguration(format!(
                "cap for segment {segment} is {cap}, more than the {channel_count} channels available"
            )));
        }
        Ok(())
    }
}

/// How the channel selector fills optional slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Highest unit cost at which a non-mandatory channel is still added.
    /// `None` means any channel is affordable.
    pub cost_ceiling: Option<Decimal>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cost_ceiling: Some(dec!(0.10)),
        }
    }
}

/// Batch execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum customers planned concurrently.
    pub concurrency: usize,
    /// Timeout for one external classifier call, in seconds.
    pub classify_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            classify_timeout_secs: 30,
        }
    }
}

impl BatchConfig {
    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }
}

/// Everything a planning run needs, loaded once at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Name of the active cost scenario.
    pub scenario: String,
    /// Extra or overriding cost scenarios.
    pub scenarios: Vec<CostScenario>,
    pub rules: RuleSetConfig,
    pub selector: SelectorConfig,
    pub batch: BatchConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            scenario: REALISTIC.to_string(),
            scenarios: Vec::new(),
            rules: RuleSetConfig::default(),
            selector: SelectorConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }

    /// Load configuration from `COMMS_PLANNER_CONFIG` (if set), then apply
    /// individual environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("COMMS_PLANNER_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(scenario) = std::env::var("COMMS_PLANNER_SCENARIO") {
            config.scenario = scenario.trim().to_string();
        }
        if let Some(concurrency) = parse_env::<usize>("COMMS_PLANNER_CONCURRENCY")? {
            config.batch.concurrency = concurrency;
        }
        if let Some(secs) = parse_env::<u64>("COMMS_PLANNER_CLASSIFY_TIMEOUT_SECS")? {
            config.batch.classify_timeout_secs = secs;
        }
        if let Ok(list) = std::env::var("COMMS_PLANNER_DURABLE_CHANNELS") {
            config.rules.durable_channels = parse_channel_list(&list).map_err(|message| {
                ConfigError::InvalidValue {
                    key: "COMMS_PLANNER_DURABLE_CHANNELS".into(),
                    message,
                }
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.concurrency".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.batch.classify_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.classify_timeout_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        self.rules.validate()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Parse a comma-separated channel list such as `letter, email`.
pub fn parse_channel_list(raw: &str) -> Result<BTreeSet<Channel>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scenario, "realistic");
        assert_eq!(config.rules.category_caps[&LetterCategory::Promotional], 4);
    }

    #[test]
    fn empty_durable_set_is_rejected() {
        let rules = RuleSetConfig {
            durable_channels: BTreeSet::new(),
            ..RuleSetConfig::default()
        };
        assert!(matches!(
            rules.validate(),
            Err(ConfigError::InvalidRuleConfiguration(_))
        ));
    }

    #[test]
    fn missing_category_cap_is_rejected() {
        let mut rules = RuleSetConfig::default();
        rules.category_caps.remove(&LetterCategory::Information);
        let err = rules.validate().unwrap_err();
        assert!(err.to_string().contains("INFORMATION"));
    }

    #[test]
    fn oversized_caps_are_rejected() {
        let mut rules = RuleSetConfig::default();
        rules.category_caps.insert(LetterCategory::Promotional, 9);
        assert!(rules.validate().is_err());

        let mut rules = RuleSetConfig::default();
        rules.segment_caps.insert("Digital-First".into(), 6);
        assert!(rules.validate().is_err());

        let rules = RuleSetConfig {
            vulnerable_min_channels: 0,
            ..RuleSetConfig::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = PlannerConfig::default();
        config.batch.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn channel_list_parsing() {
        let set = parse_channel_list("letter, email,,in_app").unwrap();
        assert_eq!(
            set,
            BTreeSet::from([Channel::Letter, Channel::Email, Channel::InApp])
        );
        assert!(parse_channel_list("letter, pigeon").is_err());
    }

    #[test]
    fn loads_partial_file_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "scenario": "conservative",
                "rules": {{ "segment_caps": {{ "Digital-First": 3 }} }},
                "selector": {{ "cost_ceiling": null }},
                "batch": {{ "concurrency": 2 }}
            }}"#
        )
        .unwrap();

        let config = PlannerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scenario, "conservative");
        assert_eq!(config.rules.segment_caps["Digital-First"], 3);
        assert_eq!(config.rules.vulnerable_min_channels, 2);
        assert_eq!(config.selector.cost_ceiling, None);
        assert_eq!(config.batch.concurrency, 2);
        assert_eq!(config.batch.classify_timeout_secs, 30);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            PlannerConfig::from_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
