//! Cheapest compliant channel selection.
//!
//! Two phases: greedy fill by ascending unit cost, then a compliance patch
//! that forces in the cheapest durable channel when a regulatory letter
//! would otherwise go out on transient channels only. The patch may cost
//! more than the pure greedy answer.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::SelectorConfig;
use crate::error::PlanError;
use crate::model::{Channel, Customer, LetterCategory};
use crate::planning::cost::{ChannelCost, CostScenario};
use crate::planning::types::{ChannelLine, CommunicationPlan, Constraint};

/// Picks channels for one customer under a constraint.
#[derive(Debug, Clone, Default)]
pub struct ChannelSelector {
    config: SelectorConfig,
}

impl ChannelSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    fn affordable(&self, cost: &ChannelCost) -> bool {
        self.config
            .cost_ceiling
            .is_none_or(|ceiling| cost.monetary <= ceiling)
    }

    /// Select channels for `customer` under `constraint`, pricing them with
    /// the active `scenario`.
    pub fn select(
        &self,
        customer: &Customer,
        letter_category: LetterCategory,
        constraint: Constraint,
        scenario: &CostScenario,
    ) -> Result<CommunicationPlan, PlanError> {
        let available = &customer.reachable;

        if let Some(&channel) = constraint
            .mandatory
            .iter()
            .find(|c| !available.contains(*c))
        {
            return Err(PlanError::UnreachableMandatoryChannel {
                customer_id: customer.id.clone(),
                channel,
            });
        }

        // Mandatory channels come first, in priority order.
        let mut selected: Vec<Channel> = constraint.mandatory.iter().copied().collect();

        if selected.len() < constraint.max_channels {
            let candidates = self.candidates(&constraint, available, scenario)?;

            for (channel, cost) in &candidates {
                if selected.len() >= constraint.max_channels {
                    break;
                }
                if !self.affordable(cost) {
                    // Sorted ascending, so nothing further is affordable either.
                    break;
                }
                selected.push(*channel);
            }

            // Every customer with a reachable channel gets the letter somehow.
            if selected.is_empty() {
                if let Some(&(channel, _)) = candidates.first() {
                    debug!(
                        customer_id = %customer.id,
                        channel = %channel,
                        "No channel within ceiling, using cheapest reachable"
                    );
                    selected.push(channel);
                }
            }

            if !constraint.durable_satisfied(&selected) {
                patch_durable(&constraint, &candidates, &mut selected);
            }
        }

        let degraded = !constraint.durable_satisfied(&selected);
        if degraded {
            warn!(
                customer_id = %customer.id,
                channels = ?selected,
                "No durable channel could be selected for regulatory letter"
            );
        }

        let breakdown = selected
            .iter()
            .map(|&channel| {
                scenario
                    .cost(channel)
                    .map(|cost| ChannelLine { channel, cost })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let total = scenario.total_cost(&selected)?;

        debug!(
            customer_id = %customer.id,
            channels = ?selected,
            total = %total.monetary,
            degraded,
            "Channels selected"
        );

        Ok(CommunicationPlan {
            customer_id: customer.id.clone(),
            segment: customer.segment.clone(),
            letter_category,
            channels: selected,
            breakdown,
            total,
            constraint,
            degraded,
        })
    }

    /// Allowed, reachable, non-mandatory channels by ascending monetary cost.
    /// `Channel`'s ordering breaks ties.
    fn candidates(
        &self,
        constraint: &Constraint,
        available: &BTreeSet<Channel>,
        scenario: &CostScenario,
    ) -> Result<Vec<(Channel, ChannelCost)>, PlanError> {
        let mut candidates = Channel::ALL
            .into_iter()
            .filter(|c| {
                available.contains(c)
                    && !constraint.forbidden.contains(c)
                    && !constraint.mandatory.contains(c)
            })
            .map(|c| scenario.cost(c).map(|cost| (c, cost)))
            .collect::<Result<Vec<_>, _>>()?;
        candidates.sort_by(|(a, ac), (b, bc)| ac.monetary.cmp(&bc.monetary).then(a.cmp(b)));
        Ok(candidates)
    }
}

/// Force the cheapest durable candidate into the selection. Uses a free slot
/// if there is one, otherwise evicts the dearest optional pick. Mandatory
/// channels are never evicted.
fn patch_durable(
    constraint: &Constraint,
    candidates: &[(Channel, ChannelCost)],
    selected: &mut Vec<Channel>,
) {
    let Some(&(durable, _)) = candidates
        .iter()
        .find(|(c, _)| constraint.is_durable(*c) && !selected.contains(c))
    else {
        return;
    };

    if selected.len() < constraint.max_channels {
        debug!(channel = %durable, "Adding durable channel for regulatory letter");
        selected.push(durable);
        return;
    }

    let cost_of = |channel: Channel| -> Decimal {
        candidates
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, cost)| cost.monetary)
            .unwrap_or_default()
    };
    let evict = selected
        .iter()
        .enumerate()
        .filter(|(_, c)| !constraint.mandatory.contains(*c))
        .max_by(|(_, a), (_, b)| cost_of(**a).cmp(&cost_of(**b)).then(b.cmp(a)))
        .map(|(i, _)| i);

    if let Some(index) = evict {
        debug!(
            evicted = %selected[index],
            channel = %durable,
            "Replacing optional channel with durable channel"
        );
        selected[index] = durable;
    }
}
