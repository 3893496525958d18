//! Letter classification: the external classifier seam and the
//! content-fingerprint cache in front of it.

pub mod cache;
pub mod classifier;

pub use cache::{ClassificationCache, Fingerprint};
pub use classifier::{CachedClassifier, KeywordClassifier, LetterClassifier, Verdict};
