//! Batch summary: channel usage, segment mix and plain-language
//! recommendations derived from a `BatchResult`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::Channel;
use crate::planning::types::{BatchResult, Savings};

/// Savings above this share of the baseline count as excellent.
const EXCELLENT_SAVINGS_PCT: u32 = 70;
/// Savings above this share count as good.
const GOOD_SAVINGS_PCT: u32 = 50;
const HIGH_CARBON_REDUCTION_PCT: u32 = 70;
const HIGH_DIGITAL_SHARE_PCT: u32 = 70;
const LOW_DIGITAL_SHARE_PCT: u32 = 30;

/// How much one channel was used across the planned customers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUsage {
    pub customers: usize,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub scenario: String,
    pub total_customers: usize,
    pub planned: usize,
    pub skipped_constraint: usize,
    pub skipped_classification: usize,
    pub degraded: usize,
    pub unprocessed: usize,
    pub savings: Savings,
    pub channel_usage: BTreeMap<Channel, ChannelUsage>,
    /// Planned customers per segment.
    pub segments: BTreeMap<String, usize>,
    pub most_popular_channel: Option<Channel>,
    pub average_channels_per_customer: Decimal,
    /// Share of selected channel slots that went to digital channels.
    pub digital_share_pct: Decimal,
    pub recommendations: Vec<String>,
}

impl BatchSummary {
    pub fn from_result(result: &BatchResult) -> Self {
        let mut channel_usage: BTreeMap<Channel, ChannelUsage> = BTreeMap::new();
        let mut segments: BTreeMap<String, usize> = BTreeMap::new();
        let mut slots = 0usize;
        let mut digital_slots = 0usize;

        for plan in result.plans() {
            *segments.entry(plan.segment.as_str().to_string()).or_default() += 1;
            for line in &plan.breakdown {
                let usage = channel_usage.entry(line.channel).or_default();
                usage.customers += 1;
                usage.cost += line.cost.monetary;
                slots += 1;
                if line.channel.is_digital() {
                    digital_slots += 1;
                }
            }
        }

        // Ties go to the channel that sorts first.
        let most_popular_channel = channel_usage
            .iter()
            .max_by(|(a_ch, a), (b_ch, b)| a.customers.cmp(&b.customers).then(b_ch.cmp(a_ch)))
            .map(|(channel, _)| *channel);

        let totals = &result.totals;
        let average_channels_per_customer = ratio(slots, totals.planned).round_dp(2);
        let digital_share_pct = (ratio(digital_slots, slots) * Decimal::ONE_HUNDRED).round_dp(2);

        let mut summary = Self {
            scenario: result.scenario.clone(),
            total_customers: result.entries.len(),
            planned: totals.planned,
            skipped_constraint: totals.skipped_constraint,
            skipped_classification: totals.skipped_classification,
            degraded: totals.degraded,
            unprocessed: result.unprocessed,
            savings: totals.savings,
            channel_usage,
            segments,
            most_popular_channel,
            average_channels_per_customer,
            digital_share_pct,
            recommendations: Vec::new(),
        };
        summary.recommendations = recommendations(&summary);
        summary
    }
}

fn ratio(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(part) / Decimal::from(whole)
    }
}

fn recommendations(summary: &BatchSummary) -> Vec<String> {
    let mut out = Vec::new();

    if summary.planned > 0 {
        let pct = summary.savings.monetary_pct;
        if pct > Decimal::from(EXCELLENT_SAVINGS_PCT) {
            out.push(format!(
                "Excellent cost optimisation: {}% saved against letter-only delivery.",
                pct.round_dp(1)
            ));
        } else if pct > Decimal::from(GOOD_SAVINGS_PCT) {
            out.push(format!(
                "Good savings of {}%. Consider further digital adoption.",
                pct.round_dp(1)
            ));
        } else {
            out.push(format!(
                "Limited savings of {}%. Review customer segmentation and channel reachability.",
                pct.round_dp(1)
            ));
        }

        if summary.savings.environmental_pct > Decimal::from(HIGH_CARBON_REDUCTION_PCT) {
            out.push(format!(
                "Significant environmental impact: {}% carbon reduction.",
                summary.savings.environmental_pct.round_dp(1)
            ));
        }

        if summary.digital_share_pct > Decimal::from(HIGH_DIGITAL_SHARE_PCT) {
            out.push(format!(
                "High digital adoption ({}%): customers are well served by digital channels.",
                summary.digital_share_pct.round_dp(1)
            ));
        } else if summary.digital_share_pct < Decimal::from(LOW_DIGITAL_SHARE_PCT) {
            out.push(
                "High traditional channel usage: invest in digital onboarding for letter-reliant customers."
                    .to_string(),
            );
        }

        match summary.most_popular_channel {
            Some(Channel::Letter) => out.push(
                "Letter-heavy batch: consider digital coaching programmes.".to_string(),
            ),
            Some(channel) if channel.is_digital() => out.push(format!(
                "{}-first approach working well: maintain the digital strategy.",
                channel
            )),
            _ => {}
        }
    }

    if summary.degraded > 0 {
        out.push(format!(
            "{} regulatory plan(s) lack a durable channel: arrange manual delivery.",
            summary.degraded
        ));
    }
    if summary.skipped_constraint > 0 {
        out.push(format!(
            "{} customer(s) skipped for constraint conflicts: review opt-outs against mandatory channels.",
            summary.skipped_constraint
        ));
    }
    if summary.skipped_classification > 0 {
        out.push(format!(
            "{} customer(s) skipped because the letter could not be classified.",
            summary.skipped_classification
        ));
    }
    if summary.unprocessed > 0 {
        out.push(format!(
            "Run stopped early: {} customer(s) not processed.",
            summary.unprocessed
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Customer, LetterCategory};
    use crate::planning::cost::{ChannelCost, CostScenario};
    use crate::planning::types::{
        BatchEntry, BatchTotals, ChannelLine, CommunicationPlan, Constraint, CustomerError,
        FailureKind, SkipReason,
    };
    use crate::model::{Classification, ClassificationSource};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn plan(customer: &Customer, channels: &[Channel], degraded: bool) -> BatchEntry {
        let scenario = CostScenario::realistic();
        let breakdown: Vec<ChannelLine> = channels
            .iter()
            .map(|&channel| ChannelLine {
                channel,
                cost: scenario.cost(channel).unwrap(),
            })
            .collect();
        let total = breakdown.iter().map(|l| l.cost).sum();
        BatchEntry::Planned {
            plan: CommunicationPlan {
                customer_id: customer.id.clone(),
                segment: customer.segment.clone(),
                letter_category: LetterCategory::Information,
                channels: channels.to_vec(),
                breakdown,
                total,
                constraint: Constraint {
                    mandatory: BTreeSet::new(),
                    forbidden: BTreeSet::new(),
                    max_channels: 2,
                    requires_durable_medium: false,
                    durable: BTreeSet::from([Channel::Letter, Channel::Email]),
                    applied: Vec::new(),
                },
                degraded,
            },
            classification: Classification {
                category: LetterCategory::Information,
                confidence: 8,
                source: ClassificationSource::Supplied,
            },
        }
    }

    fn result(entries: Vec<BatchEntry>) -> BatchResult {
        let scenario = CostScenario::realistic();
        let baseline = scenario.cost(Channel::Letter).unwrap().times(entries.len());
        let actual: ChannelCost = entries.iter().filter_map(BatchEntry::plan).map(|p| p.total).sum();
        let mut totals = BatchTotals {
            actual,
            baseline,
            savings: Savings::between(baseline, actual),
            ..BatchTotals::default()
        };
        for entry in &entries {
            match entry {
                BatchEntry::Planned { plan, .. } => {
                    totals.planned += 1;
                    if plan.degraded {
                        totals.degraded += 1;
                    }
                }
                BatchEntry::Skipped { error } => match error.reason {
                    SkipReason::ConstraintConflict => totals.skipped_constraint += 1,
                    SkipReason::ClassificationFailure => totals.skipped_classification += 1,
                },
            }
        }
        BatchResult {
            run_id: Uuid::new_v4(),
            scenario: "realistic".into(),
            generated_at: Utc::now(),
            entries,
            totals,
            truncated: false,
            unprocessed: 0,
        }
    }

    #[test]
    fn digital_batch_summary() {
        let a = Customer::new("A", "Digital-First");
        let b = Customer::new("B", "Standard");
        let summary = BatchSummary::from_result(&result(vec![
            plan(&a, &[Channel::Email, Channel::InApp], false),
            plan(&b, &[Channel::Email], false),
        ]));

        assert_eq!(summary.planned, 2);
        assert_eq!(summary.most_popular_channel, Some(Channel::Email));
        assert_eq!(summary.channel_usage[&Channel::Email].customers, 2);
        assert_eq!(summary.channel_usage[&Channel::Email].cost, dec!(0.004));
        assert_eq!(summary.average_channels_per_customer, dec!(1.5));
        assert_eq!(summary.digital_share_pct, dec!(100));
        assert_eq!(summary.segments["Digital-First"], 1);
        assert!(summary.recommendations[0].starts_with("Excellent cost optimisation"));
        assert!(summary.recommendations.iter().any(|r| r.starts_with("High digital adoption")));
        assert!(summary.recommendations.iter().any(|r| r.starts_with("email-first")));
    }

    #[test]
    fn letter_heavy_batch_summary() {
        let a = Customer::new("A", "Vulnerable");
        let b = Customer::new("B", "Vulnerable");
        let summary = BatchSummary::from_result(&result(vec![
            plan(&a, &[Channel::Letter], false),
            plan(&b, &[Channel::Letter, Channel::InApp], false),
        ]));

        assert_eq!(summary.most_popular_channel, Some(Channel::Letter));
        assert!(summary.recommendations[0].starts_with("Limited savings"));
        assert!(summary.recommendations.iter().any(|r| r.starts_with("Letter-heavy")));
    }

    #[test]
    fn popularity_tie_prefers_first_channel() {
        let a = Customer::new("A", "Standard");
        let summary =
            BatchSummary::from_result(&result(vec![plan(&a, &[Channel::Sms, Channel::Email], false)]));
        assert_eq!(summary.most_popular_channel, Some(Channel::Email));
    }

    #[test]
    fn failures_and_degraded_plans_are_reported() {
        let a = Customer::new("A", "Standard");
        let skipped = BatchEntry::Skipped {
            error: CustomerError {
                customer_id: "B".into(),
                kind: FailureKind::IrreconcilableConstraint,
                reason: SkipReason::ConstraintConflict,
                message: "opted out of letter".into(),
            },
        };
        let summary = BatchSummary::from_result(&result(vec![
            plan(&a, &[Channel::InApp], true),
            skipped,
        ]));

        assert_eq!(summary.total_customers, 2);
        assert_eq!(summary.degraded, 1);
        assert_eq!(summary.skipped_constraint, 1);
        assert!(summary.recommendations.iter().any(|r| r.contains("durable channel")));
        assert!(summary.recommendations.iter().any(|r| r.contains("constraint conflicts")));
    }

    #[test]
    fn empty_result_has_no_savings_advice() {
        let summary = BatchSummary::from_result(&result(Vec::new()));
        assert_eq!(summary.most_popular_channel, None);
        assert_eq!(summary.average_channels_per_customer, dec!(0));
        assert!(summary.recommendations.is_empty());
    }
}
