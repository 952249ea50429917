//! `regenerate_id`: replace a tag-family UID with a freshly generated one

use super::{ProcessContext, Processor};
use crate::deid::result::ProcessResult;
use crate::domain::{Node, ProcessingError};

/// Root of UIDs derived from UUIDs
const UUID_DERIVED_ROOT: &str = "2.25";

#[derive(Debug, Clone, Copy, Default)]
pub struct RegenerateIdProcessor;

/// A new `2.25.<decimal uuid>` UID
pub fn generate_uid() -> String {
    format!("{UUID_DERIVED_ROOT}.{}", uuid::Uuid::new_v4().as_u128())
}

impl Processor for RegenerateIdProcessor {
    fn name(&self) -> &str {
        "regenerate_id"
    }

    fn applies_to(&self, node: &Node, _ctx: &ProcessContext<'_>) -> bool {
        node.instance_type == "UI"
    }

    fn process(&self, node: &mut Node, _ctx: &ProcessContext<'_>) -> Result<ProcessResult, ProcessingError> {
        if node.value.is_none() {
            return Ok(ProcessResult::default());
        }
        node.value = Some(generate_uid());
        Ok(ProcessResult::substituted())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::params;
    use super::*;
    use crate::domain::RecordFamily;

    #[test]
    fn test_generates_fresh_uids() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Tag, "p1");
        let mut a = Node::leaf("(0020,000D)", "UI", "1.2.840.113619.2.55.3");
        let mut b = a.clone();

        RegenerateIdProcessor.process(&mut a, &ctx).unwrap();
        RegenerateIdProcessor.process(&mut b, &ctx).unwrap();

        let a = a.value.unwrap();
        assert!(a.starts_with("2.25."));
        assert!(a.len() <= 64);
        assert_ne!(Some(a), b.value);
    }

    #[test]
    fn test_only_for_uid_elements() {
        let params = params();
        let ctx = ProcessContext::new(&params, RecordFamily::Tag, "p1");
        let node = Node::leaf("(0010,0010)", "PN", "Doe^John");
        assert!(!RegenerateIdProcessor.applies_to(&node, &ctx));
    }
}
