//! Classification cache keyed by content fingerprint.
//!
//! Byte-identical letter text always maps to the same fingerprint, so a
//! re-uploaded letter never goes back to the external classifier. Entries
//! are never evicted; only an explicit invalidation removes one.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::model::LetterCategory;

/// SHA-256 of letter content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        self.to_string()[..8].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// A cached classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedClassification {
    pub category: LetterCategory,
    pub confidence: u8,
    pub classified_at: DateTime<Utc>,
}

/// Shared, concurrently readable classification cache.
pub struct ClassificationCache {
    entries: RwLock<HashMap<Fingerprint, CachedClassification>>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<CachedClassification> {
        self.entries.read().await.get(fingerprint).copied()
    }

    /// Store a verdict unless one is already cached, and return the entry
    /// that is cached afterwards. Entries are immutable once written; only
    /// `invalidate` clears one. Two workers racing on the same new
    /// fingerprint both call this and both get the first write back.
    pub async fn put(
        &self,
        fingerprint: Fingerprint,
        category: LetterCategory,
        confidence: u8,
    ) -> CachedClassification {
        let mut entries = self.entries.write().await;
        let stored = *entries.entry(fingerprint).or_insert(CachedClassification {
            category,
            confidence,
            classified_at: Utc::now(),
        });
        if stored.category != category {
            debug!(
                fingerprint = %fingerprint.short(),
                cached = %stored.category,
                rejected = %category,
                "Cache entry already present, keeping first verdict"
            );
        }
        stored
    }

    /// Drop one entry so the next lookup re-classifies. Returns whether an
    /// entry was present.
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.entries.write().await.remove(fingerprint).is_some();
        if removed {
            info!(fingerprint = %fingerprint.short(), "Classification invalidated");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new()
    }
}
