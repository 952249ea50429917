//! `perturb`: add bounded random noise to a numeric value

use super::{is_integer_type, is_numeric_type, ProcessContext, Processor};
use crate::deid::config::settings::{PerturbSettings, RangeType};
use crate::deid::result::ProcessResult;
use crate::domain::{Node, ProcessingError};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct PerturbProcessor {
    settings: PerturbSettings,
}

impl PerturbProcessor {
    pub fn new(settings: PerturbSettings) -> Result<Self, String> {
        settings.validate()?;
        Ok(Self { settings })
    }

    fn half_width(&self, value: f64) -> f64 {
        match self.settings.range_type {
            RangeType::Fixed => self.settings.span,
            RangeType::Proportional => self.settings.span * value.abs(),
        }
    }
}

impl Processor for PerturbProcessor {
    fn name(&self) -> &str {
        "perturb"
    }

    fn applies_to(&self, node: &Node, _ctx: &ProcessContext<'_>) -> bool {
        is_numeric_type(&node.instance_type)
    }

    fn process(&self, node: &mut Node, _ctx: &ProcessContext<'_>) -> Result<ProcessResult, ProcessingError> {
        let Some(raw) = node.value.as_deref() else {
            return Ok(ProcessResult::default());
        };
        let mismatch = || ProcessingError::TypeMismatch {
            method: self.name().to_string(),
            location: node.location.clone(),
            instance_type: node.instance_type.clone(),
        };
        let value: f64 = raw.trim().parse().map_err(|_| mismatch())?;
        if !value.is_finite() {
            return Err(mismatch());
        }

        let half_width = self.half_width(value);
        if half_width <= 0.0 {
            return Ok(ProcessResult::default());
        }
        // The sampled range spans 2 * half_width and the result must stay finite
        if !(2.0 * half_width).is_finite() || !(value.abs() + half_width).is_finite() {
            return Err(mismatch());
        }

        let noisy = value + rand::thread_rng().gen_range(-half_width..=half_width);
        node.value = Some(if is_integer_type(&node.instance_type) {
            format!("{}", noisy.round() as i64)
        } else {
            format!("{:.*}", self.settings.round_to as usize, noisy)
        });
        Ok(ProcessResult::perturbed())
    }
}
