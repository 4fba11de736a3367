pub mod anomaly;
pub mod promql;
pub mod threshold;

use crate::definition::RuleDefinition;
use crate::error::Result;
use crate::{RuleEvaluator, RuleType};
use anomaly::AnomalyRule;
use promql::PromRule;
use threshold::ThresholdRule;

/// Builds the evaluator matching the definition's rule type.
pub fn build_evaluator(definition: &RuleDefinition) -> Result<Box<dyn RuleEvaluator>> {
    let condition = &definition.condition;
    Ok(match definition.effective_rule_type() {
        RuleType::Threshold => Box::new(ThresholdRule::from_condition(condition)?),
        RuleType::Prom => Box::new(PromRule::from_condition(condition)?),
        RuleType::Anomaly => Box::new(AnomalyRule::from_condition(condition)?),
    })
}
