//! `generalize`: replace a value by the first matching case's expression

use super::{BuildError, ProcessContext, Processor};
use crate::deid::config::settings::{GeneralizeSettings, OtherValues};
use crate::deid::expression::CompiledExpression;
use crate::deid::result::ProcessResult;
use crate::domain::{Node, ProcessingError};

#[derive(Debug, Clone)]
struct Case {
    when: CompiledExpression,
    then: CompiledExpression,
}

#[derive(Debug, Clone)]
pub struct GeneralizeProcessor {
    cases: Vec<Case>,
    other_values: OtherValues,
}

impl GeneralizeProcessor {
    /// Compiles every case; a bad expression fails the configuration load
    pub fn new(settings: GeneralizeSettings) -> Result<Self, BuildError> {
        settings.validate().map_err(BuildError::Setting)?;
        let cases = settings
            .cases
            .into_iter()
            .map(|case| {
                let compile = |text: String| {
                    CompiledExpression::compile(text.clone())
                        .map_err(|e| BuildError::Expression(format!("'{text}': {e}")))
                };
                Ok(Case {
                    when: compile(case.when)?,
                    then: compile(case.then)?,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok(Self {
            cases,
            other_values: settings.other_values,
        })
    }
}

impl Processor for GeneralizeProcessor {
    fn name(&self) -> &str {
        "generalize"
    }

    fn applies_to(&self, _node: &Node, _ctx: &ProcessContext<'_>) -> bool {
        true
    }

    fn process(&self, node: &mut Node, _ctx: &ProcessContext<'_>) -> Result<ProcessResult, ProcessingError> {
        if node.value.is_none() {
            return Ok(ProcessResult::default());
        }

        let expression_err = |e: crate::deid::expression::ExpressionError| ProcessingError::Expression {
            location: node.location.clone(),
            message: e.to_string(),
        };

        for case in &self.cases {
            if case.when.test(node).map_err(expression_err)? {
                let replacement = case.then.value_of(node).map_err(expression_err)?;
                node.value = replacement.map(|v| v.to_string());
                return Ok(ProcessResult::abstracted());
            }
        }

        match self.other_values {
            OtherValues::Keep => Ok(ProcessResult::default()),
            OtherValues::Redact => {
                node.value = None;
                Ok(ProcessResult::redacted())
            }
        }
    }
}
