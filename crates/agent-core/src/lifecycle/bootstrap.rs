use std::path::Path;
use std::sync::Arc;

use admission::{KeyringTrustStore, MessageValidator, PatternSet, SecurityGate};
use anyhow::{Context, Result};
use detection::{DetectorModel, LinearDetector};
use pipeline::{EscalationPipeline, Oracles, PipelineParts};
use protocol::Clock;
use tracing::{info, warn};

use crate::config::AgentConfig;

pub(super) fn build_pipeline(
    config: &AgentConfig,
    clock: Arc<dyn Clock>,
) -> Result<EscalationPipeline> {
    let keyring = load_keyring(config.keyring_path.as_deref())?;
    if keyring.trusted_count() == 0 && config.security.require_trusted_sender {
        warn!("no trusted sender keys loaded; every message will fail authentication");
    }
    let patterns = load_patterns(config.patterns_path.as_deref())?;
    let detector = load_detector(config.model_path.as_deref())?;

    Ok(EscalationPipeline::new(PipelineParts {
        config: config.pipeline.clone(),
        queue: config.queue.clone(),
        history: config.history.clone(),
        validator: MessageValidator::new(config.validator.clone()),
        gate: SecurityGate::with_store(config.security.clone(), keyring, patterns),
        oracles: Oracles::builtin(detector, config.pipeline.threat_threshold),
        templates: config.recommendations.clone(),
        clock,
    }))
}

fn load_keyring(path: Option<&str>) -> Result<Arc<KeyringTrustStore>> {
    let Some(path) = path else {
        return Ok(Arc::new(KeyringTrustStore::new()));
    };
    let store = KeyringTrustStore::load(Path::new(path))
        .with_context(|| format!("failed loading sender keyring {path}"))?;
    Ok(Arc::new(store))
}

fn load_patterns(path: Option<&str>) -> Result<PatternSet> {
    let Some(path) = path else {
        return Ok(PatternSet::default());
    };
    let patterns = PatternSet::load(Path::new(path))
        .with_context(|| format!("failed loading attack patterns {path}"))?;
    info!(path, patterns = patterns.len(), "attack patterns loaded");
    Ok(patterns)
}

fn load_detector(path: Option<&str>) -> Result<LinearDetector> {
    let Some(path) = path else {
        let detector = LinearDetector::new();
        info!(
            model_id = %detector.model().model_id,
            "using built-in detector model"
        );
        return Ok(detector);
    };
    let model = DetectorModel::from_file(Path::new(path))
        .with_context(|| format!("failed loading detector model {path}"))?;
    let detector = LinearDetector::with_model(model)
        .with_context(|| format!("detector model {path} rejected"))?;
    info!(
        path,
        model_id = %detector.model().model_id,
        model_version = %detector.model().model_version,
        "detector model loaded"
    );
    Ok(detector)
}
