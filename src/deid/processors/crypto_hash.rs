//! `cryptohash`: keyed HMAC of a string value, hex-encoded

use super::{is_string_like, ProcessContext, Processor};
use crate::deid::config::settings::{CryptoHashSettings, HashAlgorithm};
use crate::deid::crypto::hmac_hex;
use crate::deid::result::ProcessResult;
use crate::domain::{Node, ProcessingError};
use secrecy::ExposeSecret;

#[derive(Debug, Clone)]
pub struct CryptoHashProcessor {
    algorithm: HashAlgorithm,
}

impl CryptoHashProcessor {
    pub fn new(settings: CryptoHashSettings) -> Self {
        Self {
            algorithm: settings.algorithm,
        }
    }
}

impl Processor for CryptoHashProcessor {
    fn name(&self) -> &str {
        "cryptohash"
    }

    fn applies_to(&self, node: &Node, _ctx: &ProcessContext<'_>) -> bool {
        is_string_like(&node.instance_type)
    }

    fn process(&self, node: &mut Node, ctx: &ProcessContext<'_>) -> Result<ProcessResult, ProcessingError> {
        let Some(value) = node.value.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(ProcessResult::default());
        };
        let key = ctx.params.crypto_hash_key.expose_secret();
        node.value = Some(hmac_hex(self.algorithm, key.as_bytes(), value.as_bytes())?);
        Ok(ProcessResult::crypto_hashed())
    }
}
