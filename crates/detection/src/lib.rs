mod analyzer;
mod combiner;
mod detector;
pub mod features;
mod history;
mod math;
mod oracle;
mod registry;
mod session;
mod transform;
mod window;

pub use analyzer::{SubScores, WindowAnalyzer, ANALYZER_NAME};
pub use combiner::{
    combine, RecommendationTemplates, StageOutputs, Verdict, FALLBACK_RECOMMENDATION,
    NO_ACTION_RECOMMENDATION, URGENT_RECOMMENDATION,
};
pub use detector::{DetectorModel, LinearDetector, ModelError, DETECTOR_NAME};
pub use features::{FeatureVector, MESSAGE_FEATURES, SUMMARY_FEATURES, SUMMARY_FEATURE_NAMES};
pub use history::{NodeHistory, Observation};
pub use oracle::{AnalysisInput, OracleError, OracleScore, ScoringOracle, SequenceInput};
pub use registry::{HistoryConfig, RegistryError, SenderHandle, SenderRegistry, SenderState};
pub use session::Session;
pub use transform::{RiskLevel, SequenceTransform, TRANSFORM_NAME};
pub use window::SlidingWindow;

#[cfg(test)]
mod tests;
