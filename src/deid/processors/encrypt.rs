//! `encrypt`: reversible AES encryption of a string value

use super::{is_string_like, ProcessContext, Processor};
use crate::deid::crypto;
use crate::deid::result::ProcessResult;
use crate::domain::{Node, ProcessingError};
use secrecy::ExposeSecret;

#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptProcessor;

impl Processor for EncryptProcessor {
    fn name(&self) -> &str {
        "encrypt"
    }

    fn applies_to(&self, node: &Node, _ctx: &ProcessContext<'_>) -> bool {
        is_string_like(&node.instance_type)
    }

    fn process(&self, node: &mut Node, ctx: &ProcessContext<'_>) -> Result<ProcessResult, ProcessingError> {
        let Some(value) = node.value.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(ProcessResult::default());
        };
        let key = ctx.params.encrypt_key.expose_secret();
        node.value = Some(crypto::encrypt(key.as_bytes(), value.as_bytes())?);
        Ok(ProcessResult::encrypted())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::params;
    use super::*;
    use crate::domain::RecordFamily;

    #[test]
    fn test_encrypt_is_reversible_by_key_holder() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Path, "p1");
        let mut node = Node::leaf("text", "string", "Peter James Chalmers");

        let result = EncryptProcessor.process(&mut node, &ctx).unwrap();
        assert!(result.encrypted);

        let ciphertext = node.value.unwrap();
        assert_ne!(ciphertext, "Peter James Chalmers");
        let key = params.encrypt_key.expose_secret();
        let plain = crypto::decrypt(key.as_bytes(), &ciphertext).unwrap();
        assert_eq!(plain, b"Peter James Chalmers");
    }
}
