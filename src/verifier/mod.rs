//! Pluggable fact-checkers for candidate locations.
//!
//! A verifier is a pure, side-effect-free check that scores one candidate
//! against the session's clues. Verifiers are collected into an explicit
//! name-to-instance registry; the verification stage resolves the enabled
//! names against it at run time. A verifier failure is never fatal, it just
//! contributes zero evidence for that candidate.

mod language_prior;
mod ocr_place;
mod road_topology;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{Clues, EvidenceOutcome, PlaceCandidate};

pub use language_prior::LanguagePriorVerifier;
pub use ocr_place::OcrPlaceVerifier;
pub use road_topology::RoadTopologyVerifier;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VerifierError {
    #[error("verifier check failed: {0}")]
    CheckFailed(String),
}

/// One finding a verifier made about a candidate. The verification stage
/// attaches the candidate identity and the verifier name when it converts
/// findings into session evidence.
#[derive(Debug, Clone)]
pub struct Finding {
    /// Human-readable summary of the finding
    pub value: String,
    pub outcome: EvidenceOutcome,
    /// Finding confidence in `[0, 1]`
    pub confidence: f64,
    pub details: BTreeMap<String, serde_json::Value>,
}

/// A verifier's overall result for one candidate.
///
/// An empty findings list means the check was not applicable (for example
/// no OCR text to match); it leaves the candidate's score untouched.
#[derive(Debug, Clone, Default)]
pub struct Verdict {
    pub findings: Vec<Finding>,
}

impl Verdict {
    pub fn inapplicable() -> Self {
        Self::default()
    }

    pub fn single(finding: Finding) -> Self {
        Self {
            findings: vec![finding],
        }
    }
}

/// A pluggable, side-effect-free check of one candidate against the clues
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Registry name, also recorded as the evidence kind
    fn name(&self) -> &'static str;

    async fn verify(
        &self,
        candidate: &PlaceCandidate,
        clues: &Clues,
    ) -> Result<Verdict, VerifierError>;
}

/// Explicit name-to-instance map of verifiers
#[derive(Clone, Default)]
pub struct VerifierRegistry {
    verifiers: HashMap<String, Arc<dyn Verifier>>,
}

impl VerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in verifiers
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OcrPlaceVerifier::default()));
        registry.register(Arc::new(LanguagePriorVerifier::default()));
        registry.register(Arc::new(RoadTopologyVerifier::default()));
        registry
    }

    /// Insert a verifier under its own name, replacing any previous entry
    pub fn register(&mut self, verifier: Arc<dyn Verifier>) {
        self.verifiers
            .insert(verifier.name().to_string(), verifier);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Verifier>> {
        self.verifiers.get(name).cloned()
    }

    /// Resolve the enabled names, warning about any that are unknown
    pub fn resolve(&self, names: &[String]) -> Vec<Arc<dyn Verifier>> {
        names
            .iter()
            .filter_map(|name| {
                let found = self.get(name);
                if found.is_none() {
                    tracing::warn!(verifier = %name, "Enabled verifier not found in registry");
                }
                found
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.verifiers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_contains_all_three() {
        let registry = VerifierRegistry::builtin();
        assert!(registry.get("ocr_place").is_some());
        assert!(registry.get("language_prior").is_some());
        assert!(registry.get("road_topology").is_some());
    }

    #[test]
    fn resolve_skips_unknown_names() {
        let registry = VerifierRegistry::builtin();
        let resolved = registry.resolve(&[
            "ocr_place".to_string(),
            "nonexistent".to_string(),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name(), "ocr_place");
    }
}
