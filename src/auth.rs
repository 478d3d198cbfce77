use sha2::{Digest, Sha256};

/// Decides whether a caller may run the pipeline.
pub trait Authorizer {
    fn authorize(&self, credential: &str) -> bool;
}

/// Used when no secret is configured.
pub struct OpenGate;

impl Authorizer for OpenGate {
    fn authorize(&self, _credential: &str) -> bool {
        true
    }
}

/// Compares SHA-256 digests so the check does not depend on where the
/// credential first differs.
pub struct SharedSecretGate {
    expected: [u8; 32],
}

impl SharedSecretGate {
    pub fn new(secret: &str) -> Self {
        Self {
            expected: Sha256::digest(secret.as_bytes()).into(),
        }
    }
}

impl Authorizer for SharedSecretGate {
    fn authorize(&self, credential: &str) -> bool {
        let offered: [u8; 32] = Sha256::digest(credential.as_bytes()).into();
        self.expected
            .iter()
            .zip(offered.iter())
            .fold(0_u8, |acc, (left, right)| acc | (left ^ right))
            == 0
    }
}

pub fn gate_for(secret: Option<&str>) -> Box<dyn Authorizer> {
    match secret.filter(|value| !value.is_empty()) {
        Some(value) => Box::new(SharedSecretGate::new(value)),
        None => Box::new(OpenGate),
    }
}
