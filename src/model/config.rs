//! Pipeline configuration.
//!
//! An explicit struct handed to constructors; nothing here is process-global,
//! so concurrent sessions with different settings never interfere.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

const ENV_CONFIG_PATH: &str = "GEOINFER_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "geoinfer.yaml";

const ENV_CONFIDENCE_THRESHOLD: &str = "GEOINFER_CONFIDENCE_THRESHOLD";
const ENV_MAX_ITERATIONS: &str = "GEOINFER_MAX_ITERATIONS";
const ENV_RETRIEVAL_STRATEGY: &str = "GEOINFER_RETRIEVAL_STRATEGY";

/// Candidate retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Single image+text pass
    Direct,
    /// Image+text, degrading to text-only on failure
    Fallback,
    /// City/region/country sweeps deduplicated by grid cell
    MultiScale,
    /// Two independent passes merged by grid cell
    Ensemble,
}

impl RetrievalStrategy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "direct" => Some(Self::Direct),
            "fallback" => Some(Self::Fallback),
            "multi_scale" | "multiscale" => Some(Self::MultiScale),
            "ensemble" => Some(Self::Ensemble),
            _ => None,
        }
    }
}

/// Blend weights for the evidence scoring rule:
/// `new = old * prior + mean(evidence) * evidence`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScoringWeights {
    pub prior: f64,
    pub evidence: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            prior: 0.6,
            evidence: 0.4,
        }
    }
}

impl ScoringWeights {
    /// Weights are valid when both lie in `[0, 1]` and sum to at most 1,
    /// which keeps blended scores inside `[0, 1]`.
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.prior)
            && (0.0..=1.0).contains(&self.evidence)
            && self.prior + self.evidence <= 1.0 + f64::EPSILON
    }
}

/// Pipeline options
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Whether the confidence-gated refinement loop is enabled
    pub enable_refinement: bool,
    /// Maximum number of refinement loop-backs, at least 1
    pub max_iterations: u32,
    /// Final-prediction confidence below this triggers a loop-back
    pub confidence_threshold: f64,
    /// Cap on hypotheses kept per round
    pub max_hypotheses: usize,
    /// Floor applied by the validating hypothesis wrapper
    pub min_hypothesis_confidence: f64,
    pub retrieval_strategy: RetrievalStrategy,
    /// Cap on candidates surviving retrieval
    pub top_k: usize,
    /// Names of verifiers to run, resolved against the registry
    pub verifiers: Vec<String>,
    /// Whether the LLM judge reviews the ranking
    pub use_judge: bool,
    /// How many top candidates the judge sees
    pub judge_top_n: usize,
    pub weights: ScoringWeights,
    /// Per-collaborator-call timeout; a timed-out call counts as failed
    pub call_timeout: Duration,
    /// Degrade perception to EXIF-only clues when the vision model fails
    pub perception_fallback: bool,
    /// Region label of the placeholder hypothesis for signal-free images
    pub placeholder_region: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enable_refinement: false,
            max_iterations: 2,
            confidence_threshold: 0.8,
            max_hypotheses: 5,
            min_hypothesis_confidence: 0.3,
            retrieval_strategy: RetrievalStrategy::Fallback,
            top_k: 5,
            verifiers: vec!["ocr_place".to_string(), "language_prior".to_string()],
            use_judge: false,
            judge_top_n: 3,
            weights: ScoringWeights::default(),
            call_timeout: Duration::from_secs(30),
            perception_fallback: true,
            placeholder_region: "Unknown".to_string(),
        }
    }
}

/// YAML configuration file structure; every field optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub enable_refinement: Option<bool>,
    pub max_iterations: Option<u32>,
    pub confidence_threshold: Option<f64>,
    pub max_hypotheses: Option<usize>,
    pub min_hypothesis_confidence: Option<f64>,
    pub retrieval_strategy: Option<RetrievalStrategy>,
    pub top_k: Option<usize>,
    pub verifiers: Option<Vec<String>>,
    pub use_judge: Option<bool>,
    pub judge_top_n: Option<usize>,
    pub weights: Option<ScoringWeights>,
    pub call_timeout_secs: Option<u64>,
    pub perception_fallback: Option<bool>,
    pub placeholder_region: Option<String>,
}

impl AgentConfig {
    /// Load configuration: defaults, overridden by an optional YAML file,
    /// overridden by environment variables.
    pub fn from_env() -> Self {
        let config_path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = Self::load_config_file(&config_path)
            .map(|cf| Self::default().merged(cf))
            .unwrap_or_default();

        if let Some(threshold) = std::env::var(ENV_CONFIDENCE_THRESHOLD)
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
        {
            config.confidence_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(iters) = std::env::var(ENV_MAX_ITERATIONS)
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.max_iterations = iters.max(1);
        }
        if let Ok(raw) = std::env::var(ENV_RETRIEVAL_STRATEGY) {
            match RetrievalStrategy::parse(&raw) {
                Some(strategy) => config.retrieval_strategy = strategy,
                None => {
                    tracing::warn!(value = %raw, "Unknown retrieval strategy, keeping current")
                }
            }
        }

        config.validated()
    }

    fn merged(mut self, file: ConfigFile) -> Self {
        if let Some(v) = file.enable_refinement {
            self.enable_refinement = v;
        }
        if let Some(v) = file.max_iterations {
            self.max_iterations = v;
        }
        if let Some(v) = file.confidence_threshold {
            self.confidence_threshold = v;
        }
        if let Some(v) = file.max_hypotheses {
            self.max_hypotheses = v;
        }
        if let Some(v) = file.min_hypothesis_confidence {
            self.min_hypothesis_confidence = v;
        }
        if let Some(v) = file.retrieval_strategy {
            self.retrieval_strategy = v;
        }
        if let Some(v) = file.top_k {
            self.top_k = v;
        }
        if let Some(v) = file.verifiers {
            self.verifiers = v;
        }
        if let Some(v) = file.use_judge {
            self.use_judge = v;
        }
        if let Some(v) = file.judge_top_n {
            self.judge_top_n = v;
        }
        if let Some(v) = file.weights {
            self.weights = v;
        }
        if let Some(v) = file.call_timeout_secs {
            self.call_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.perception_fallback {
            self.perception_fallback = v;
        }
        if let Some(v) = file.placeholder_region {
            self.placeholder_region = v;
        }
        self
    }

    /// Clamp out-of-range values back to safe defaults
    pub fn validated(mut self) -> Self {
        if self.max_iterations == 0 {
            tracing::warn!("max_iterations must be at least 1, using 1");
            self.max_iterations = 1;
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            tracing::warn!(
                threshold = self.confidence_threshold,
                "confidence_threshold outside [0, 1], using default"
            );
            self.confidence_threshold = Self::default().confidence_threshold;
        }
        if !self.weights.is_valid() {
            tracing::warn!(
                prior = self.weights.prior,
                evidence = self.weights.evidence,
                "Invalid scoring weights, using defaults"
            );
            self.weights = ScoringWeights::default();
        }
        if self.top_k == 0 {
            tracing::warn!("top_k must be at least 1, using 1");
            self.top_k = 1;
        }
        self
    }

    fn load_config_file(path: &str) -> Option<ConfigFile> {
        let path = Path::new(path);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                let contents = contents.trim();
                if contents.is_empty() {
                    tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
                    return Some(ConfigFile::default());
                }
                match serde_yaml::from_str(contents) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Loaded configuration from file");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }
}
