//! Letter classification collaborators.
//!
//! The planner never calls an external classifier directly: every call goes
//! through `CachedClassifier`, which checks the content-fingerprint cache
//! first and bounds the external call with a timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::classify::cache::ClassificationCache;
use crate::error::ClassifyError;
use crate::model::{Classification, ClassificationSource, Letter, LetterCategory};

/// Raw answer from an external classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub category: LetterCategory,
    /// 1 (guess) to 10 (certain).
    pub confidence: u8,
}

/// External classifier contract: plain text in, category out. May fail or
/// hang; the caller enforces the timeout.
#[async_trait]
pub trait LetterClassifier: Send + Sync {
    /// Classifier name for logging.
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> Result<Verdict, ClassifyError>;
}

/// Cache-checked, time-bounded access to a `LetterClassifier`.
pub struct CachedClassifier {
    inner: Arc<dyn LetterClassifier>,
    cache: Arc<ClassificationCache>,
    timeout: Duration,
}

impl CachedClassifier {
    pub fn new(
        inner: Arc<dyn LetterClassifier>,
        cache: Arc<ClassificationCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner,
            cache,
            timeout,
        }
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    /// Classify a letter. The cache is authoritative per content: a
    /// classification supplied with the letter is recorded on a miss and
    /// must agree with the cached category on a hit. Unclassified letters
    /// go to the external classifier on a miss.
    pub async fn classify(&self, letter: &Letter) -> Result<Classification, ClassifyError> {
        let fingerprint = letter.fingerprint();

        if let Some(supplied) = letter.classification {
            let stored = match self.cache.get(&fingerprint).await {
                Some(hit) => hit,
                None => {
                    self.cache
                        .put(fingerprint, supplied.category, supplied.confidence)
                        .await
                }
            };
            if stored.category != supplied.category {
                warn!(
                    letter_id = %letter.id,
                    fingerprint = %fingerprint.short(),
                    supplied = %supplied.category,
                    cached = %stored.category,
                    "Supplied classification conflicts with cached verdict"
                );
                return Err(ClassifyError::InvalidVerdict(format!(
                    "letter {} supplied as {} but its content is classified {}",
                    letter.id, supplied.category, stored.category
                )));
            }
            return Ok(supplied);
        }

        if let Some(hit) = self.cache.get(&fingerprint).await {
            debug!(
                letter_id = %letter.id,
                fingerprint = %fingerprint.short(),
                category = %hit.category,
                "Classification cache hit"
            );
            return Ok(Classification {
                category: hit.category,
                confidence: hit.confidence,
                source: ClassificationSource::Cached,
            });
        }

        let verdict = tokio::time::timeout(self.timeout, self.inner.classify(&letter.content))
            .await
            .map_err(|_| {
                warn!(
                    letter_id = %letter.id,
                    classifier = self.inner.name(),
                    timeout = ?self.timeout,
                    "Classifier timed out"
                );
                ClassifyError::Timeout {
                    after: self.timeout,
                }
            })??;

        if !(1..=10).contains(&verdict.confidence) {
            return Err(ClassifyError::InvalidVerdict(format!(
                "confidence {} outside 1-10",
                verdict.confidence
            )));
        }

        info!(
            letter_id = %letter.id,
            classifier = self.inner.name(),
            category = %verdict.category,
            confidence = verdict.confidence,
            "Letter classified"
        );
        // A concurrent worker may have cached this content first; its verdict stands.
        let stored = self
            .cache
            .put(fingerprint, verdict.category, verdict.confidence)
            .await;

        Ok(Classification {
            category: stored.category,
            confidence: stored.confidence,
            source: ClassificationSource::Fresh,
        })
    }
}

// ── Keyword classifier ──────────────────────────────────────────────

/// A category pattern with the confidence it earns on a match.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub regex: Regex,
    pub category: LetterCategory,
    pub confidence: u8,
}

/// Offline classifier using regex keyword rules. Rules are checked in order;
/// regulatory rules come first so a promotional letter that also carries a
/// legal notice is treated as regulatory.
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
    fallback: Verdict,
}

impl KeywordClassifier {
    pub fn default_rules() -> Result<Self, regex::Error> {
        let rules = vec![
            KeywordRule {
                regex: Regex::new(
                    r"(?i)\b(terms and conditions|regulat\w*|financial conduct authority|fca|required by law|legal(ly)? requir\w*|statutory)\b",
                )?,
                category: LetterCategory::Regulatory,
                confidence: 8,
            },
            KeywordRule {
                regex: Regex::new(
                    r"(?i)\b(interest rate (change|increase|decrease)|fee changes?|annual statement|right to (cancel|switch))\b",
                )?,
                category: LetterCategory::Regulatory,
                confidence: 7,
            },
            KeywordRule {
                regex: Regex::new(
                    r"(?i)\b(special offer|exclusive|upgrade|limited time|reward|cashback|pre-approved|apply now)\b",
                )?,
                category: LetterCategory::Promotional,
                confidence: 7,
            },
        ];

        Ok(Self {
            rules,
            fallback: Verdict {
                category: LetterCategory::Information,
                confidence: 5,
            },
        })
    }

    pub fn add_rule(
        &mut self,
        pattern: &str,
        category: LetterCategory,
        confidence: u8,
    ) -> Result<(), regex::Error> {
        self.rules.push(KeywordRule {
            regex: Regex::new(pattern)?,
            category,
            confidence,
        });
        Ok(())
    }

    fn evaluate(&self, text: &str) -> Verdict {
        for rule in &self.rules {
            if rule.regex.is_match(text) {
                debug!(
                    category = %rule.category,
                    pattern = %rule.regex.as_str(),
                    "Letter matched keyword rule"
                );
                return Verdict {
                    category: rule.category,
                    confidence: rule.confidence,
                };
            }
        }
        self.fallback.clone()
    }
}

#[async_trait]
impl LetterClassifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, text: &str) -> Result<Verdict, ClassifyError> {
        if text.trim().is_empty() {
            return Err(ClassifyError::Failed {
                classifier: self.name().to_string(),
                reason: "letter text is empty".into(),
            });
        }
        Ok(self.evaluate(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and always answers with the same verdict.
    struct CountingClassifier {
        calls: AtomicUsize,
        verdict: Verdict,
    }

    #[async_trait]
    impl LetterClassifier for CountingClassifier {
        fn name(&self) -> &str {
            "counting"
        }
        async fn classify(&self, _text: &str) -> Result<Verdict, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict.clone())
        }
    }

    struct HangingClassifier;

    #[async_trait]
    impl LetterClassifier for HangingClassifier {
        fn name(&self) -> &str {
            "hanging"
        }
        async fn classify(&self, _text: &str) -> Result<Verdict, ClassifyError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("timeout fires first")
        }
    }

    fn counting(category: LetterCategory, confidence: u8) -> Arc<CountingClassifier> {
        Arc::new(CountingClassifier {
            calls: AtomicUsize::new(0),
            verdict: Verdict {
                category,
                confidence,
            },
        })
    }

    #[tokio::test]
    async fn second_call_served_from_cache() {
        let inner = counting(LetterCategory::Promotional, 9);
        let classifier = CachedClassifier::new(
            inner.clone(),
            Arc::new(ClassificationCache::new()),
            Duration::from_secs(5),
        );

        let first = classifier.classify(&Letter::new("L1", "Exclusive offer")).await.unwrap();
        assert_eq!(first.source, ClassificationSource::Fresh);

        // Same bytes under a different letter id still hit the cache.
        let second = classifier.classify(&Letter::new("L2", "Exclusive offer")).await.unwrap();
        assert_eq!(second.source, ClassificationSource::Cached);
        assert_eq!(second.category, first.category);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn supplied_classification_skips_classifier() {
        let inner = counting(LetterCategory::Promotional, 9);
        let classifier = CachedClassifier::new(
            inner.clone(),
            Arc::new(ClassificationCache::new()),
            Duration::from_secs(5),
        );
        let letter = Letter::new("L1", "text").with_category(LetterCategory::Regulatory, 10);
        let result = classifier.classify(&letter).await.unwrap();
        assert_eq!(result.category, LetterCategory::Regulatory);
        assert_eq!(result.source, ClassificationSource::Supplied);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn supplied_classification_is_cached_for_its_content() {
        let inner = counting(LetterCategory::Promotional, 9);
        let classifier = CachedClassifier::new(
            inner.clone(),
            Arc::new(ClassificationCache::new()),
            Duration::from_secs(5),
        );
        let supplied = Letter::new("L1", "Same body").with_category(LetterCategory::Regulatory, 10);
        classifier.classify(&supplied).await.unwrap();

        let twin = classifier.classify(&Letter::new("L2", "Same body")).await.unwrap();
        assert_eq!(twin.category, LetterCategory::Regulatory);
        assert_eq!(twin.source, ClassificationSource::Cached);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn supplied_classification_conflicting_with_cache_is_rejected() {
        let cache = Arc::new(ClassificationCache::new());
        let classifier = CachedClassifier::new(
            counting(LetterCategory::Promotional, 9),
            cache.clone(),
            Duration::from_secs(5),
        );
        classifier.classify(&Letter::new("L1", "Same body")).await.unwrap();

        let supplied = Letter::new("L2", "Same body").with_category(LetterCategory::Regulatory, 10);
        let err = classifier.classify(&supplied).await.unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidVerdict(_)));
        assert_eq!(
            cache.get(&supplied.fingerprint()).await.unwrap().category,
            LetterCategory::Promotional
        );

        let agreeing = Letter::new("L3", "Same body").with_category(LetterCategory::Promotional, 4);
        let ok = classifier.classify(&agreeing).await.unwrap();
        assert_eq!(ok.source, ClassificationSource::Supplied);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_classifier_times_out() {
        let cache = Arc::new(ClassificationCache::new());
        let classifier = CachedClassifier::new(
            Arc::new(HangingClassifier),
            cache.clone(),
            Duration::from_secs(2),
        );
        let err = classifier.classify(&Letter::new("L1", "text")).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Timeout { .. }));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn out_of_range_confidence_rejected() {
        let classifier = CachedClassifier::new(
            counting(LetterCategory::Information, 0),
            Arc::new(ClassificationCache::new()),
            Duration::from_secs(5),
        );
        let err = classifier.classify(&Letter::new("L1", "text")).await.unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidVerdict(_)));
    }

    #[tokio::test]
    async fn invalidation_forces_reclassification() {
        let inner = counting(LetterCategory::Information, 6);
        let cache = Arc::new(ClassificationCache::new());
        let classifier = CachedClassifier::new(inner.clone(), cache.clone(), Duration::from_secs(5));
        let letter = Letter::new("L1", "Branch opening hours");

        classifier.classify(&letter).await.unwrap();
        cache.invalidate(&letter.fingerprint()).await;
        let again = classifier.classify(&letter).await.unwrap();
        assert_eq!(again.source, ClassificationSource::Fresh);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keyword_classifier_categories() {
        let classifier = KeywordClassifier::default_rules().unwrap();
        let regulatory = classifier
            .classify("We are updating our Terms and Conditions as required by the FCA.")
            .await
            .unwrap();
        assert_eq!(regulatory.category, LetterCategory::Regulatory);

        let promotional = classifier
            .classify("Upgrade today and earn cashback on every purchase.")
            .await
            .unwrap();
        assert_eq!(promotional.category, LetterCategory::Promotional);

        let info = classifier
            .classify("Our Leeds branch will have new opening hours from May.")
            .await
            .unwrap();
        assert_eq!(info.category, LetterCategory::Information);
        assert_eq!(info.confidence, 5);
    }

    #[tokio::test]
    async fn keyword_classifier_prefers_regulatory() {
        let classifier = KeywordClassifier::default_rules().unwrap();
        let verdict = classifier
            .classify("Exclusive offer inside. Please read the enclosed terms and conditions.")
            .await
            .unwrap();
        assert_eq!(verdict.category, LetterCategory::Regulatory);
    }

    #[tokio::test]
    async fn keyword_classifier_custom_rule_and_empty_text() {
        let mut classifier = KeywordClassifier::default_rules().unwrap();
        classifier
            .add_rule(r"(?i)\bmortgage holiday\b", LetterCategory::Promotional, 6)
            .unwrap();
        let verdict = classifier.classify("Ask about a mortgage holiday").await.unwrap();
        assert_eq!(verdict.category, LetterCategory::Promotional);

        assert!(matches!(
            classifier.classify("   ").await,
            Err(ClassifyError::Failed { .. })
        ));
    }
}
