//! Business rules: customer + letter category → channel constraint.
//!
//! Rules form an override chain, highest precedence first:
//! 1. Vulnerable-customer protection (Letter mandatory, allowance floored)
//! 2. Regulatory durable medium
//! 3. Volume caps (letter category, then segment)
//! 4. Opt-outs
//!
//! An opt-out that hits a mandatory channel is never resolved here; it is
//! surfaced as `IrreconcilableConstraint`.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::RuleSetConfig;
use crate::error::{ConfigError, PlanError};
use crate::model::{Channel, Customer, LetterCategory};
use crate::planning::types::{AppliedRule, Constraint};

/// Evaluates customers against a validated rule configuration.
#[derive(Debug, Clone)]
pub struct BusinessRuleSet {
    config: RuleSetConfig,
}

impl BusinessRuleSet {
    /// Build a rule set, rejecting configuration that cannot yield a valid
    /// constraint.
    pub fn new(config: RuleSetConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RuleSetConfig {
        &self.config
    }

    pub fn is_vulnerable(&self, customer: &Customer) -> bool {
        self.config
            .vulnerable_segments
            .contains(customer.segment.as_str())
    }

    /// Evaluate the rule chain for one customer.
    pub fn evaluate(
        &self,
        customer: &Customer,
        category: LetterCategory,
    ) -> Result<Constraint, PlanError> {
        let mut applied = Vec::new();
        let mut mandatory = BTreeSet::new();

        // Caps are computed first so protection can floor them afterwards.
        let category_cap = self
            .config
            .category_caps
            .get(&category)
            .copied()
            .ok_or_else(|| {
                ConfigError::InvalidRuleConfiguration(format!("no channel cap for {category}"))
            })?;
        let mut max_channels = category_cap;
        let mut cap_rules = vec![AppliedRule::VolumeCap {
            category,
            cap: category_cap,
        }];
        if let Some(&segment_cap) = self.config.segment_caps.get(customer.segment.as_str()) {
            if segment_cap < max_channels {
                max_channels = segment_cap;
                cap_rules.push(AppliedRule::SegmentCap { cap: segment_cap });
            }
        }

        if self.is_vulnerable(customer) {
            mandatory.insert(Channel::Letter);
            max_channels = max_channels.max(self.config.vulnerable_min_channels);
            applied.push(AppliedRule::VulnerableProtection {
                floor: self.config.vulnerable_min_channels,
            });
        }

        let requires_durable_medium = category == LetterCategory::Regulatory;
        if requires_durable_medium {
            applied.push(AppliedRule::RegulatoryDurableMedium);
        }

        applied.extend(cap_rules);

        let forbidden: BTreeSet<Channel> = customer.opt_outs.clone();
        if !forbidden.is_empty() {
            applied.push(AppliedRule::OptOut {
                channels: forbidden.iter().copied().collect(),
            });
        }

        let conflicting: Vec<Channel> = mandatory.intersection(&forbidden).copied().collect();
        if !conflicting.is_empty() {
            debug!(
                customer_id = %customer.id,
                channels = ?conflicting,
                "Opt-out conflicts with mandatory channel"
            );
            return Err(PlanError::IrreconcilableConstraint {
                customer_id: customer.id.clone(),
                channels: conflicting,
            });
        }

        let constraint = Constraint {
            mandatory,
            forbidden,
            max_channels,
            requires_durable_medium,
            durable: self.config.durable_channels.clone(),
            applied,
        };
        check_invariants(&constraint)?;

        debug!(
            customer_id = %customer.id,
            category = %category,
            mandatory = ?constraint.mandatory,
            forbidden = ?constraint.forbidden,
            max_channels = constraint.max_channels,
            "Rules evaluated"
        );
        Ok(constraint)
    }
}

/// Violations here mean the rule configuration is wrong for everyone, not
/// that one customer is unplannable.
fn check_invariants(constraint: &Constraint) -> Result<(), ConfigError> {
    if !constraint.mandatory.is_disjoint(&constraint.forbidden) {
        return Err(ConfigError::InvalidRuleConfiguration(
            "mandatory and forbidden channels overlap".into(),
        ));
    }
    if constraint.mandatory.len() > constraint.max_channels {
        return Err(ConfigError::InvalidRuleConfiguration(format!(
            "{} mandatory channels exceed cap of {}",
            constraint.mandatory.len(),
            constraint.max_channels
        )));
    }
    Ok(())
}
