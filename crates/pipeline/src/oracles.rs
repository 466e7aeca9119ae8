use std::sync::Arc;

use detection::{
    AnalysisInput, FeatureVector, LinearDetector, ScoringOracle, SequenceInput, SequenceTransform,
    WindowAnalyzer,
};

/// The three scoring stages, cheapest first.
#[derive(Clone)]
pub struct Oracles {
    pub detector: Arc<dyn ScoringOracle<FeatureVector>>,
    pub analyzer: Arc<dyn ScoringOracle<AnalysisInput>>,
    pub transform: Arc<dyn ScoringOracle<SequenceInput>>,
}

impl Oracles {
    pub fn new(
        detector: Arc<dyn ScoringOracle<FeatureVector>>,
        analyzer: Arc<dyn ScoringOracle<AnalysisInput>>,
        transform: Arc<dyn ScoringOracle<SequenceInput>>,
    ) -> Self {
        Self {
            detector,
            analyzer,
            transform,
        }
    }

    /// Built-in stages around the given detector.
    pub fn builtin(detector: LinearDetector, anomaly_threshold: f64) -> Self {
        Self::new(
            Arc::new(detector),
            Arc::new(WindowAnalyzer::new(anomaly_threshold)),
            Arc::new(SequenceTransform::new()),
        )
    }
}

impl Default for Oracles {
    fn default() -> Self {
        Self::builtin(LinearDetector::new(), 0.8)
    }
}

impl std::fmt::Debug for Oracles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oracles")
            .field("detector", &self.detector.name())
            .field("analyzer", &self.analyzer.name())
            .field("transform", &self.transform.name())
            .finish()
    }
}
