mod constraints;
mod errors;
mod patterns;
mod rate_limit;
mod security;
mod trust;
mod validator;

pub use errors::{
    LoadError, LoadResult, SecurityCode, SecurityError, ValidationCode, ValidationError, Violation,
};
pub use patterns::{AttackPattern, PatternMatcher, PatternSet};
pub use rate_limit::{RateWindow, SenderRateLimiter};
pub use security::{SecurityConfig, SecurityGate};
pub use trust::{
    decode_hex_bytes, encode_hex, parse_ed25519_key_material, parse_ed25519_signature_material,
    KeyringTrustStore, SignatureVerifier, TrustStore,
};
pub use validator::{MessageValidator, ValidatorConfig};

#[cfg(test)]
mod tests;
