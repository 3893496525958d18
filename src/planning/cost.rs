//! Per-channel unit costs under named scenarios.
//!
//! Costs are additive and independent: the cost of a channel set is the
//! sum of its channels' unit costs, with no bundling or volume effects.

use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::Add;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PlanError};
use crate::model::Channel;

pub const REALISTIC: &str = "realistic";
pub const CONSERVATIVE: &str = "conservative";
pub const OPTIMISTIC: &str = "optimistic";

/// Monetary (GBP) and environmental (grams CO2e) cost of one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCost {
    pub monetary: Decimal,
    pub environmental_g: Decimal,
}

impl ChannelCost {
    pub const ZERO: ChannelCost = ChannelCost {
        monetary: Decimal::ZERO,
        environmental_g: Decimal::ZERO,
    };

    pub fn new(monetary: Decimal, environmental_g: Decimal) -> Self {
        Self {
            monetary,
            environmental_g,
        }
    }

    /// Cost of `n` identical deliveries.
    pub fn times(self, n: usize) -> Self {
        let n = Decimal::from(n);
        Self {
            monetary: self.monetary * n,
            environmental_g: self.environmental_g * n,
        }
    }
}

impl Add for ChannelCost {
    type Output = ChannelCost;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            monetary: self.monetary + rhs.monetary,
            environmental_g: self.environmental_g + rhs.environmental_g,
        }
    }
}

impl Sum for ChannelCost {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ChannelCost::ZERO, Add::add)
    }
}

/// Unvalidated scenario shape as it appears in configuration files.
#[derive(Debug, Clone, Deserialize)]
struct RawScenario {
    name: String,
    #[serde(default)]
    description: String,
    costs: BTreeMap<Channel, ChannelCost>,
}

/// A named, total mapping from every channel to its unit cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScenario")]
pub struct CostScenario {
    name: String,
    description: String,
    costs: BTreeMap<Channel, ChannelCost>,
}

impl TryFrom<RawScenario> for CostScenario {
    type Error = ConfigError;

    fn try_from(raw: RawScenario) -> Result<Self, Self::Error> {
        CostScenario::new(raw.name, raw.description, raw.costs)
    }
}

impl CostScenario {
    /// Build a scenario, rejecting any that leaves a channel without a cost
    /// or carries a negative cost.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        costs: BTreeMap<Channel, ChannelCost>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidScenario {
                scenario: name,
                reason: "scenario name is empty".into(),
            });
        }

        let missing: Vec<&str> = Channel::ALL
            .iter()
            .filter(|c| !costs.contains_key(c))
            .map(|c| c.label())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::InvalidScenario {
                scenario: name,
                reason: format!("no cost entry for {}", missing.join(", ")),
            });
        }

        if let Some((channel, _)) = costs
            .iter()
            .find(|(_, c)| c.monetary.is_sign_negative() || c.environmental_g.is_sign_negative())
        {
            return Err(ConfigError::InvalidScenario {
                scenario: name,
                reason: format!("negative cost for {channel}"),
            });
        }

        Ok(Self {
            name,
            description: description.into(),
            costs,
        })
    }

    /// Current UK market rates. Letter is postage 0.85 + printing 0.08 +
    /// envelope 0.03 + two minutes of staff time at £15/hour.
    pub fn realistic() -> Self {
        Self::builtin(
            REALISTIC,
            "Realistic costs based on current UK market rates",
            [dec!(1.46), dec!(0.002), dec!(0.05), dec!(0.001), dec!(0.02)],
        )
    }

    /// Worst-case planning: dearer postage, five minutes of staff time per letter.
    pub fn conservative() -> Self {
        Self::builtin(
            CONSERVATIVE,
            "Higher costs for worst-case planning",
            [dec!(2.65), dec!(0.005), dec!(0.08), dec!(0.003), dec!(0.035)],
        )
    }

    /// Bulk postage and automated letter handling.
    pub fn optimistic() -> Self {
        Self::builtin(
            OPTIMISTIC,
            "Lower costs with automation and bulk discounts",
            [dec!(0.96), dec!(0.001), dec!(0.03), dec!(0.0005), dec!(0.015)],
        )
    }

    /// Monetary costs are given in `Channel::ALL` order; carbon figures are
    /// shared across the built-in scenarios.
    fn builtin(name: &str, description: &str, monetary: [Decimal; 5]) -> Self {
        let carbon_g = [dec!(25.0), dec!(0.3), dec!(0.1), dec!(0.05), dec!(0.3)];
        let costs = Channel::ALL
            .into_iter()
            .zip(monetary.into_iter().zip(carbon_g))
            .map(|(channel, (m, g))| (channel, ChannelCost::new(m, g)))
            .collect();
        Self {
            name: name.to_string(),
            description: description.to_string(),
            costs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Unit cost of one channel.
    pub fn cost(&self, channel: Channel) -> Result<ChannelCost, PlanError> {
        self.costs
            .get(&channel)
            .copied()
            .ok_or_else(|| PlanError::UnknownChannel {
                channel,
                scenario: self.name.clone(),
            })
    }

    /// Sum of unit costs over a channel set.
    pub fn total_cost<'a>(
        &self,
        channels: impl IntoIterator<Item = &'a Channel>,
    ) -> Result<ChannelCost, PlanError> {
        channels
            .into_iter()
            .map(|c| self.cost(*c))
            .sum::<Result<ChannelCost, PlanError>>()
    }
}

/// The set of scenarios available to a run. Exactly one is active per run;
/// the engine never switches scenario itself.
#[derive(Debug, Clone)]
pub struct CostModel {
    scenarios: BTreeMap<String, CostScenario>,
}

impl CostModel {
    /// The three built-in scenarios.
    pub fn with_defaults() -> Self {
        let scenarios = [
            CostScenario::realistic(),
            CostScenario::conservative(),
            CostScenario::optimistic(),
        ]
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect();
        Self { scenarios }
    }

    /// Built-in scenarios plus `extra`, which replace built-ins of the same name.
    pub fn from_scenarios(extra: impl IntoIterator<Item = CostScenario>) -> Self {
        let mut model = Self::with_defaults();
        for scenario in extra {
            model.scenarios.insert(scenario.name.clone(), scenario);
        }
        model
    }

    pub fn scenario(&self, name: &str) -> Result<&CostScenario, ConfigError> {
        self.scenarios
            .get(name)
            .ok_or_else(|| ConfigError::UnknownScenario(name.to_string()))
    }

    pub fn scenario_names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    /// Unit cost of `channel` under the named scenario.
    pub fn cost(&self, channel: Channel, scenario: &str) -> Result<ChannelCost, PlanError> {
        match self.scenarios.get(scenario) {
            Some(s) => s.cost(channel),
            None => Err(PlanError::UnknownChannel {
                channel,
                scenario: scenario.to_string(),
            }),
        }
    }

    /// Sum of unit costs over `channels` under the named scenario.
    pub fn total_cost(
        &self,
        channels: &[Channel],
        scenario: &str,
    ) -> Result<ChannelCost, PlanError> {
        channels.iter().map(|c| self.cost(*c, scenario)).sum()
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realistic_letter_matches_component_sum() {
        let letter = CostScenario::realistic().cost(Channel::Letter).unwrap();
        assert_eq!(letter.monetary, dec!(0.85) + dec!(0.08) + dec!(0.03) + dec!(0.50));
        assert_eq!(letter.environmental_g, dec!(25.0));
    }

    #[test]
    fn total_cost_is_additive() {
        let scenario = CostScenario::realistic();
        let total = scenario
            .total_cost(&[Channel::Email, Channel::Sms, Channel::InApp])
            .unwrap();
        assert_eq!(total.monetary, dec!(0.053));
        assert_eq!(total.environmental_g, dec!(0.45));
        assert_eq!(
            scenario.total_cost(Vec::<Channel>::new().iter()).unwrap(),
            ChannelCost::ZERO
        );
    }

    #[test]
    fn scenario_missing_channel_is_rejected() {
        let mut costs: BTreeMap<Channel, ChannelCost> = BTreeMap::new();
        costs.insert(Channel::Letter, ChannelCost::new(dec!(1), dec!(25)));
        costs.insert(Channel::Email, ChannelCost::new(dec!(0.01), dec!(0.3)));
        let err = CostScenario::new("partial", "", costs).unwrap_err();
        match err {
            ConfigError::InvalidScenario { scenario, reason } => {
                assert_eq!(scenario, "partial");
                assert!(reason.contains("sms"));
                assert!(reason.contains("voice"));
            }
            other => panic!("Expected InvalidScenario, got {other:?}"),
        }
    }

    #[test]
    fn negative_cost_is_rejected() {
        let costs = Channel::ALL
            .into_iter()
            .map(|c| {
                let m = if c == Channel::Sms { dec!(-0.01) } else { dec!(0.01) };
                (c, ChannelCost::new(m, dec!(1)))
            })
            .collect();
        assert!(matches!(
            CostScenario::new("neg", "", costs),
            Err(ConfigError::InvalidScenario { .. })
        ));
    }

    #[test]
    fn conservative_never_cheaper_than_optimistic() {
        let conservative = CostScenario::conservative();
        let optimistic = CostScenario::optimistic();
        for channel in Channel::ALL {
            assert!(
                conservative.cost(channel).unwrap().monetary
                    >= optimistic.cost(channel).unwrap().monetary,
                "{channel}"
            );
        }
    }

    #[test]
    fn model_lookup_unknown_scenario() {
        let model = CostModel::with_defaults();
        assert!(model.cost(Channel::Email, REALISTIC).is_ok());
        assert!(matches!(
            model.cost(Channel::Email, "pessimistic"),
            Err(PlanError::UnknownChannel { .. })
        ));
        assert!(matches!(
            model.scenario("pessimistic"),
            Err(ConfigError::UnknownScenario(_))
        ));
        assert_eq!(model.scenario_names().count(), 3);
    }

    #[test]
    fn scenario_deserializes_with_validation() {
        let ok = r#"{
            "name": "flat",
            "costs": {
                "letter": {"monetary": "1.00", "environmental_g": "20"},
                "email": {"monetary": "0.01", "environmental_g": "0.3"},
                "sms": {"monetary": "0.02", "environmental_g": "0.1"},
                "in_app": {"monetary": "0", "environmental_g": "0"},
                "voice": {"monetary": "0.03", "environmental_g": "0.3"}
            }
        }"#;
        let scenario: CostScenario = serde_json::from_str(ok).unwrap();
        assert_eq!(scenario.name(), "flat");

        let missing = r#"{"name": "broken", "costs": {"letter": {"monetary": "1", "environmental_g": "1"}}}"#;
        assert!(serde_json::from_str::<CostScenario>(missing).is_err());
    }

    #[test]
    fn custom_scenario_replaces_builtin() {
        let costs = Channel::ALL
            .into_iter()
            .map(|c| (c, ChannelCost::new(dec!(0.5), dec!(1))))
            .collect();
        let custom = CostScenario::new(REALISTIC, "overridden", costs).unwrap();
        let model = CostModel::from_scenarios([custom]);
        assert_eq!(
            model.cost(Channel::Letter, REALISTIC).unwrap().monetary,
            dec!(0.5)
        );
    }
}
