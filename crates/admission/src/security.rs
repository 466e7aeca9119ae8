use std::sync::Arc;

use protocol::Message;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{SecurityCode, SecurityError};
use crate::patterns::PatternSet;
use crate::rate_limit::SenderRateLimiter;
use crate::trust::{SignatureVerifier, TrustStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub require_signature: bool,
    pub require_trusted_sender: bool,
    pub rate_limit_messages: usize,
    pub rate_limit_window_ms: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_signature: true,
            require_trusted_sender: true,
            rate_limit_messages: 50,
            rate_limit_window_ms: 1_000,
        }
    }
}

/// Authentication, integrity, known-pattern and rate checks, in that order.
pub struct SecurityGate {
    config: SecurityConfig,
    trust: Arc<dyn TrustStore>,
    verifier: Arc<dyn SignatureVerifier>,
    patterns: PatternSet,
    limiter: SenderRateLimiter,
}

impl SecurityGate {
    pub fn new(
        config: SecurityConfig,
        trust: Arc<dyn TrustStore>,
        verifier: Arc<dyn SignatureVerifier>,
        patterns: PatternSet,
    ) -> Self {
        let limiter =
            SenderRateLimiter::new(config.rate_limit_messages, config.rate_limit_window_ms);
        Self {
            config,
            trust,
            verifier,
            patterns,
            limiter,
        }
    }

    /// Convenience for stores that verify their own signatures.
    pub fn with_store<S>(config: SecurityConfig, store: Arc<S>, patterns: PatternSet) -> Self
    where
        S: TrustStore + SignatureVerifier + 'static,
    {
        let trust: Arc<dyn TrustStore> = store.clone();
        let verifier: Arc<dyn SignatureVerifier> = store;
        Self::new(config, trust, verifier, patterns)
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn authorize(&mut self, message: &Message, now_ms: i64) -> Result<(), SecurityError> {
        let outcome = self.evaluate(message, now_ms);
        if let Err(err) = &outcome {
            warn!(
                security_event = true,
                code = err.code.as_str(),
                message_id = message.id(),
                sender = message.sender(),
                detail = %err.detail,
                "message rejected by security gate"
            );
        }
        outcome
    }

    fn evaluate(&mut self, message: &Message, now_ms: i64) -> Result<(), SecurityError> {
        let sender = message.sender();
        if self.trust.is_revoked(sender) {
            return Err(SecurityError::new(
                SecurityCode::AuthFailed,
                format!("sender {sender} is revoked"),
            ));
        }
        if self.config.require_trusted_sender && !self.trust.is_trusted(sender) {
            return Err(SecurityError::new(
                SecurityCode::AuthFailed,
                format!("sender {sender} is not trusted"),
            ));
        }

        match message.metadata.signature.as_deref() {
            None if self.config.require_signature => {
                return Err(SecurityError::new(
                    SecurityCode::AuthFailed,
                    "signature required but missing",
                ));
            }
            None => {}
            Some(signature) => {
                let digest = message.content_digest();
                if !self.verifier.verify(&digest, signature, sender) {
                    return Err(SecurityError::new(
                        SecurityCode::IntegrityFailed,
                        format!("signature does not match content digest {}", message.content_digest_hex()),
                    ));
                }
            }
        }

        if let Some(pattern) = self.patterns.first_match(message) {
            return Err(SecurityError::new(
                SecurityCode::SuspiciousPattern,
                format!("matched attack pattern {}", pattern.name),
            ));
        }

        if !self.limiter.allow(sender, now_ms) {
            return Err(SecurityError::new(
                SecurityCode::RateLimited,
                format!(
                    "more than {} messages within {}ms",
                    self.config.rate_limit_messages, self.config.rate_limit_window_ms
                ),
            ));
        }

        Ok(())
    }

    pub fn sweep(&mut self, now_ms: i64) -> usize {
        self.limiter.sweep(now_ms)
    }

    pub fn tracked_senders(&self) -> usize {
        self.limiter.tracked_senders()
    }
}
