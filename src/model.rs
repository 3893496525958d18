//! Domain data supplied by collaborators: customers, letters, channels.
//!
//! Everything here is read-only to the planning engine for the duration
//! of a run.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classify::cache::Fingerprint;

// ── Channel ─────────────────────────────────────────────────────────

/// A delivery channel.
///
/// Variant order is the tie-break priority used when two channels cost
/// the same: the most universally reachable channel sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Letter,
    Email,
    Sms,
    InApp,
    Voice,
}

impl Channel {
    /// Every channel, in tie-break priority order.
    pub const ALL: [Channel; 5] = [
        Channel::Letter,
        Channel::Email,
        Channel::Sms,
        Channel::InApp,
        Channel::Voice,
    ];

    /// Short label for logging and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Letter => "letter",
            Self::Email => "email",
            Self::Sms => "sms",
            Self::InApp => "in_app",
            Self::Voice => "voice",
        }
    }

    pub fn is_digital(&self) -> bool {
        !matches!(self, Self::Letter)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "letter" | "post" | "postal" => Ok(Self::Letter),
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "in_app" | "inapp" => Ok(Self::InApp),
            "voice" | "voice_note" => Ok(Self::Voice),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

// ── Letter category ─────────────────────────────────────────────────

/// Classification of a letter, set once by the external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LetterCategory {
    Regulatory,
    Promotional,
    Information,
}

impl LetterCategory {
    pub const ALL: [LetterCategory; 3] = [
        LetterCategory::Regulatory,
        LetterCategory::Promotional,
        LetterCategory::Information,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Regulatory => "REGULATORY",
            Self::Promotional => "PROMOTIONAL",
            Self::Information => "INFORMATION",
        }
    }
}

impl fmt::Display for LetterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LetterCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REGULATORY" => Ok(Self::Regulatory),
            "PROMOTIONAL" => Ok(Self::Promotional),
            "INFORMATION" | "INFORMATIONAL" => Ok(Self::Information),
            other => Err(format!("unknown letter category '{other}'")),
        }
    }
}

// ── Customer ────────────────────────────────────────────────────────

/// Customer segment label, e.g. `Standard`, `Digital-First`, `Vulnerable`.
///
/// The set of segments is configuration, not code: only the segments
/// listed as vulnerable in the rule configuration get special treatment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerSegment(pub String);

impl CustomerSegment {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CustomerSegment {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CustomerSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn all_channels() -> BTreeSet<Channel> {
    Channel::ALL.into_iter().collect()
}

/// How actively a customer engages with digital channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

/// A bank customer as seen by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub segment: CustomerSegment,
    /// Channels the customer has explicitly opted out of.
    #[serde(default)]
    pub opt_outs: BTreeSet<Channel>,
    /// Channels the customer can actually receive (has an address, app, phone).
    #[serde(default = "all_channels")]
    pub reachable: BTreeSet<Channel>,
    /// Descriptive profile data. No built-in rule reads these; they travel
    /// with the customer for segment-specific configuration and reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<EngagementLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_tier: Option<String>,
}

impl Customer {
    /// A customer reachable on every channel with no opt-outs.
    pub fn new(id: impl Into<String>, segment: impl Into<CustomerSegment>) -> Self {
        Self {
            id: id.into(),
            name: None,
            segment: segment.into(),
            opt_outs: BTreeSet::new(),
            reachable: all_channels(),
            engagement: None,
            balance_tier: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_opt_out(mut self, channel: Channel) -> Self {
        self.opt_outs.insert(channel);
        self
    }

    pub fn with_reachable(mut self, channels: impl IntoIterator<Item = Channel>) -> Self {
        self.reachable = channels.into_iter().collect();
        self
    }

    pub fn with_engagement(mut self, engagement: EngagementLevel) -> Self {
        self.engagement = Some(engagement);
        self
    }

    pub fn with_balance_tier(mut self, tier: impl Into<String>) -> Self {
        self.balance_tier = Some(tier.into());
        self
    }
}

// ── Letter ──────────────────────────────────────────────────────────

/// Where a letter's classification came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Provided with the letter by the caller.
    #[default]
    Supplied,
    /// Served from the classification cache.
    Cached,
    /// Freshly computed by the external classifier.
    Fresh,
}

/// A letter's category with the classifier's confidence (1-10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: LetterCategory,
    pub confidence: u8,
    #[serde(default)]
    pub source: ClassificationSource,
}

/// A letter to be delivered. Content is already extracted plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Letter {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

impl Letter {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            classification: None,
        }
    }

    /// Attach a classification decided outside the planner.
    pub fn with_category(mut self, category: LetterCategory, confidence: u8) -> Self {
        self.classification = Some(Classification {
            category,
            confidence,
            source: ClassificationSource::Supplied,
        });
        self
    }

    /// Content fingerprint used as the classification cache key.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.content)
    }
}
