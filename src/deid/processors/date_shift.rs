//! `dateshift`: move dates by a keyed, deterministic number of days

use super::{is_date_type, parse_node_date, ProcessContext, Processor};
use crate::deid::config::settings::DateShiftSettings;
use crate::deid::crypto::keyed_offset;
use crate::deid::result::ProcessResult;
use crate::domain::{Node, ProcessingError};
use secrecy::ExposeSecret;

#[derive(Debug, Clone)]
pub struct DateShiftProcessor {
    settings: DateShiftSettings,
}

impl DateShiftProcessor {
    pub fn new(settings: DateShiftSettings) -> Result<Self, String> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Offset in days for a resource scope
    pub fn offset(&self, ctx: &ProcessContext<'_>) -> Result<i64, ProcessingError> {
        let range = self.settings.range.unwrap_or(ctx.params.date_shift_range);
        keyed_offset(
            ctx.params.date_shift_key.expose_secret().as_bytes(),
            &ctx.params.date_shift_scope_key(ctx.scope_id),
            range,
        )
    }
}

impl Processor for DateShiftProcessor {
    fn name(&self) -> &str {
        "dateshift"
    }

    fn applies_to(&self, node: &Node, _ctx: &ProcessContext<'_>) -> bool {
        is_date_type(&node.instance_type)
    }

    fn process(&self, node: &mut Node, ctx: &ProcessContext<'_>) -> Result<ProcessResult, ProcessingError> {
        if node.value.is_none() {
            return Ok(ProcessResult::default());
        }
        let date = parse_node_date(node).ok_or_else(|| ProcessingError::TypeMismatch {
            method: self.name().to_string(),
            location: node.location.clone(),
            instance_type: node.instance_type.clone(),
        })?;

        let offset = self.offset(ctx)?;
        node.value = Some(date.shift_days(offset).to_string());
        Ok(ProcessResult::perturbed())
    }
}
