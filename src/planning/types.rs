//! Shared types for the planning engine.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClassifyError, PlanError};
use crate::model::{Channel, Classification, CustomerSegment, LetterCategory};
use crate::planning::cost::ChannelCost;

// ── Constraint ──────────────────────────────────────────────────────

/// A business rule that contributed to a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AppliedRule {
    /// Letter forced in and channel allowance floored.
    VulnerableProtection { floor: usize },
    /// At least one durable channel must be delivered.
    RegulatoryDurableMedium,
    /// Channel cap from the letter category.
    VolumeCap { category: LetterCategory, cap: usize },
    /// Tighter channel cap from the customer segment.
    SegmentCap { cap: usize },
    /// Customer opt-outs added to the forbidden set.
    OptOut { channels: Vec<Channel> },
}

/// What the business rules allow for one customer and letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub mandatory: BTreeSet<Channel>,
    pub forbidden: BTreeSet<Channel>,
    pub max_channels: usize,
    pub requires_durable_medium: bool,
    /// Channels that satisfy the durable-medium requirement.
    pub durable: BTreeSet<Channel>,
    /// Rules that fired, in precedence order.
    pub applied: Vec<AppliedRule>,
}

impl Constraint {
    pub fn is_durable(&self, channel: Channel) -> bool {
        self.durable.contains(&channel)
    }

    /// Whether `channels` meets the durable-medium post-condition.
    pub fn durable_satisfied(&self, channels: &[Channel]) -> bool {
        !self.requires_durable_medium || channels.iter().any(|c| self.is_durable(*c))
    }
}

// ── Plan ────────────────────────────────────────────────────────────

/// Cost of one selected channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLine {
    pub channel: Channel,
    pub cost: ChannelCost,
}

/// The channels chosen for one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationPlan {
    pub customer_id: String,
    pub segment: CustomerSegment,
    pub letter_category: LetterCategory,
    /// Selected channels: mandatory first, then in the order they were added.
    pub channels: Vec<Channel>,
    pub breakdown: Vec<ChannelLine>,
    pub total: ChannelCost,
    pub constraint: Constraint,
    /// Set when the durable-medium post-condition could not be met.
    pub degraded: bool,
}

impl CommunicationPlan {
    pub fn contains(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }
}

// ── Per-customer errors ─────────────────────────────────────────────

/// Why a customer was skipped, at the granularity an operator reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ConstraintConflict,
    ClassificationFailure,
}

/// Exact failure kind recorded for a skipped customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    IrreconcilableConstraint,
    UnreachableMandatoryChannel,
    UnknownChannel,
    ClassificationTimeout,
    ClassificationFailed,
}

impl FailureKind {
    pub fn reason(&self) -> SkipReason {
        match self {
            Self::IrreconcilableConstraint
            | Self::UnreachableMandatoryChannel
            | Self::UnknownChannel => SkipReason::ConstraintConflict,
            Self::ClassificationTimeout | Self::ClassificationFailed => {
                SkipReason::ClassificationFailure
            }
        }
    }
}

/// A customer that could not be planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerError {
    pub customer_id: String,
    pub kind: FailureKind,
    pub reason: SkipReason,
    pub message: String,
}

impl CustomerError {
    fn new(customer_id: &str, kind: FailureKind, message: String) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            kind,
            reason: kind.reason(),
            message,
        }
    }

    /// Record a per-customer planning error. Returns `None` for fatal
    /// configuration errors, which must abort the run instead.
    pub fn from_plan_error(customer_id: &str, err: &PlanError) -> Option<Self> {
        let kind = match err {
            PlanError::IrreconcilableConstraint { .. } => FailureKind::IrreconcilableConstraint,
            PlanError::UnreachableMandatoryChannel { .. } => {
                FailureKind::UnreachableMandatoryChannel
            }
            PlanError::UnknownChannel { .. } => FailureKind::UnknownChannel,
            PlanError::Config(_) => return None,
        };
        Some(Self::new(customer_id, kind, err.to_string()))
    }

    pub fn from_classify_error(customer_id: &str, err: &ClassifyError) -> Self {
        let kind = match err {
            ClassifyError::Timeout { .. } => FailureKind::ClassificationTimeout,
            ClassifyError::Failed { .. } | ClassifyError::InvalidVerdict(_) => {
                FailureKind::ClassificationFailed
            }
        };
        Self::new(customer_id, kind, err.to_string())
    }
}

// ── Batch result ────────────────────────────────────────────────────

/// Outcome for one customer, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchEntry {
    Planned {
        plan: CommunicationPlan,
        classification: Classification,
    },
    Skipped {
        error: CustomerError,
    },
}

impl BatchEntry {
    pub fn customer_id(&self) -> &str {
        match self {
            Self::Planned { plan, .. } => &plan.customer_id,
            Self::Skipped { error } => &error.customer_id,
        }
    }

    pub fn plan(&self) -> Option<&CommunicationPlan> {
        match self {
            Self::Planned { plan, .. } => Some(plan),
            Self::Skipped { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&CustomerError> {
        match self {
            Self::Planned { .. } => None,
            Self::Skipped { error } => Some(error),
        }
    }
}

/// Savings of the planned batch against the letter-only baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Savings {
    pub monetary: Decimal,
    pub monetary_pct: Decimal,
    pub environmental_g: Decimal,
    pub environmental_pct: Decimal,
}

impl Savings {
    pub fn between(baseline: ChannelCost, actual: ChannelCost) -> Self {
        let monetary = baseline.monetary - actual.monetary;
        let environmental_g = baseline.environmental_g - actual.environmental_g;
        Self {
            monetary,
            monetary_pct: percentage(monetary, baseline.monetary),
            environmental_g,
            environmental_pct: percentage(environmental_g, baseline.environmental_g),
        }
    }
}

fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

/// Aggregate figures for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    /// Sum over successful plans.
    pub actual: ChannelCost,
    /// Letter-only cost for every processed customer, failed ones included.
    pub baseline: ChannelCost,
    pub savings: Savings,
    pub planned: usize,
    pub skipped_constraint: usize,
    pub skipped_classification: usize,
    pub degraded: usize,
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub run_id: Uuid,
    pub scenario: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<BatchEntry>,
    pub totals: BatchTotals,
    /// Set when a stop signal ended the run early.
    pub truncated: bool,
    /// Customers never dispatched because the run was stopped.
    pub unprocessed: usize,
}

impl BatchResult {
    pub fn plans(&self) -> impl Iterator<Item = &CommunicationPlan> {
        self.entries.iter().filter_map(BatchEntry::plan)
    }

    pub fn errors(&self) -> impl Iterator<Item = &CustomerError> {
        self.entries.iter().filter_map(BatchEntry::error)
    }
}
