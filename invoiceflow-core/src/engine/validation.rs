//! Validation engine: non-mutating rule sweep over a completed document.
//!
//! The context is built once — validation never writes, so there is nothing
//! to rebuild. A failing check records an error; a check that cannot be
//! evaluated (or does not yield a boolean) records a warning instead.
//! The engine always returns the complete error and warning sets rather
//! than stopping at the first violation.

use crate::config::{RuleStore, ValidationRule};
use crate::context::ContextBuilder;
use crate::expr::ExpressionEvaluator;
use crate::types::{Invoice, ValidationIssue, ValidationReport};
use serde_json::Value;

pub struct ValidationEngine<'a> {
    store: &'a RuleStore,
    evaluator: &'a ExpressionEvaluator,
    company: Option<Value>,
}

impl<'a> ValidationEngine<'a> {
    pub fn new(store: &'a RuleStore, evaluator: &'a ExpressionEvaluator) -> Self {
        Self {
            store,
            evaluator,
            company: None,
        }
    }

    pub fn with_company(mut self, company: Option<Value>) -> Self {
        self.company = company;
        self
    }

    pub fn validate(&self, invoice: &Invoice) -> ValidationReport {
        let mut errors: Vec<ValidationIssue> = Vec::new();
        let mut warnings: Vec<ValidationIssue> = Vec::new();
        let mut builder = ContextBuilder::with_company(self.company.clone());
        let ctx = builder.context(invoice, 0);

        println!(
            "🔍 Business validation: {} rules for invoice {}",
            self.store.validation_rules().len(),
            invoice.invoice_number
        );

        for rule in self.store.validation_rules() {
            match self.evaluator.evaluate_condition(&rule.apply_to, ctx) {
                Err(e) => {
                    warnings.push(issue(rule, format!("rule execution error: {e}")));
                    continue;
                }
                Ok(false) => continue,
                Ok(true) => {}
            }

            match self.evaluator.evaluate(&rule.rule_expression, ctx) {
                Ok(Value::Bool(true)) => {}
                Ok(Value::Bool(false)) => {
                    let message = if rule.error_message.is_empty() {
                        format!("validation failed: {}", rule.rule_name)
                    } else {
                        rule.error_message.clone()
                    };
                    println!("   ❌ {} - {message}", rule.rule_name);
                    errors.push(issue(rule, message));
                }
                Ok(other) => {
                    warnings.push(issue(
                        rule,
                        format!(
                            "rule expression must yield a boolean, got {}",
                            crate::expr::eval::type_name(&other)
                        ),
                    ));
                }
                Err(e) => {
                    warnings.push(issue(rule, format!("rule execution error: {e}")));
                }
            }
        }

        let valid = errors.is_empty();
        let summary = if valid {
            "all validation rules passed".to_string()
        } else {
            format!("{} validation error(s) found", errors.len())
        };
        println!("   📋 {summary}");

        ValidationReport {
            valid,
            errors,
            warnings,
            summary,
        }
    }
}

fn issue(rule: &ValidationRule, message: String) -> ValidationIssue {
    ValidationIssue {
        rule_id: rule.id.clone(),
        rule_name: rule.rule_name.clone(),
        message,
        field_path: if rule.field_path.is_empty() {
            None
        } else {
            Some(rule.field_path.clone())
        },
    }
}
