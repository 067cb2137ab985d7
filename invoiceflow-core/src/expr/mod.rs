//! Expression compilation and evaluation.
//!
//! One call to [`ExpressionEvaluator::evaluate`] runs the full pipeline:
//! lookup-macro preprocessing (text rewrite), lexing, parsing, then AST
//! evaluation against the supplied context. Compile failures and runtime
//! failures are reported as distinct [`ExprError`] variants, both carrying
//! the offending expression text; neither can panic the caller.

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod preprocess;

pub use eval::{is_present, is_truthy};

use crate::classifier::{KeywordClassifier, ProductClassifier};
use crate::error::ExprError;
use crate::lookup::{InMemoryLookup, LookupProvider};
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

pub struct ExpressionEvaluator {
    classifier: Arc<dyn ProductClassifier>,
    lookup: Arc<dyn LookupProvider>,
    lookup_pattern: Regex,
}

impl ExpressionEvaluator {
    pub fn new(classifier: Arc<dyn ProductClassifier>, lookup: Arc<dyn LookupProvider>) -> Self {
        Self {
            classifier,
            lookup,
            lookup_pattern: Regex::new(preprocess::LOOKUP_PATTERN)
                .expect("lookup macro pattern is a valid regex"),
        }
    }

    /// Default classifier, no lookup tables. Useful for tests and for rule
    /// sets that never touch `db.` or classification functions.
    pub fn basic() -> Self {
        Self::new(
            Arc::new(KeywordClassifier::default()),
            Arc::new(InMemoryLookup::empty()),
        )
    }

    /// Evaluate one expression against a context tree
    /// (`{"invoice": .., "item": .., "company": ..}`).
    pub fn evaluate(&self, expression: &str, ctx: &Value) -> Result<Value, ExprError> {
        let rewritten = preprocess::rewrite_lookups(
            &self.lookup_pattern,
            expression,
            ctx,
            self.lookup.as_ref(),
        );
        let tokens =
            lexer::tokenize(&rewritten).map_err(|msg| ExprError::compile(expression, msg))?;
        let ast = parser::parse(&tokens).map_err(|msg| ExprError::compile(expression, msg))?;
        eval::eval(&ast, ctx, self.classifier.as_ref())
            .map_err(|msg| ExprError::eval(expression, msg))
    }

    /// Evaluate a condition: empty text counts as true (a rule without an
    /// `apply_to` applies everywhere).
    pub fn evaluate_condition(&self, condition: &str, ctx: &Value) -> Result<bool, ExprError> {
        if condition.trim().is_empty() {
            return Ok(true);
        }
        Ok(is_truthy(&self.evaluate(condition, ctx)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupTableDef;
    use serde_json::json;

    fn ctx() -> Value {
        json!({"invoice": {"country": "CN", "supplier": {"name": "Acme Travel"}}})
    }

    #[test]
    fn compile_error_carries_expression_text() {
        let evaluator = ExpressionEvaluator::basic();
        let err = evaluator.evaluate("1 +* 2", &ctx()).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("1 +* 2"), "got: {text}");
        assert!(matches!(err, ExprError::Compile { .. }));
    }

    #[test]
    fn eval_error_carries_expression_text() {
        let evaluator = ExpressionEvaluator::basic();
        let err = evaluator.evaluate("invoice.country - 1", &ctx()).unwrap_err();
        assert!(matches!(err, ExprError::Eval { .. }));
        assert!(err.to_string().contains("invoice.country - 1"));
    }

    #[test]
    fn empty_condition_is_true() {
        let evaluator = ExpressionEvaluator::basic();
        assert!(evaluator.evaluate_condition("", &ctx()).unwrap());
        assert!(evaluator.evaluate_condition("   ", &ctx()).unwrap());
        assert!(evaluator.evaluate_condition("country == 'CN'", &ctx()).unwrap());
        assert!(!evaluator.evaluate_condition("country == 'DE'", &ctx()).unwrap());
    }

    #[test]
    fn lookup_macro_feeds_the_compiled_expression() {
        let lookup = InMemoryLookup::new(vec![LookupTableDef {
            table: "companies".to_string(),
            rows: vec![[
                ("name".to_string(), json!("Acme Travel")),
                ("tax_number".to_string(), json!("91440101234567890A")),
            ]
            .into_iter()
            .collect()],
            defaults: [("tax_number".to_string(), json!(""))].into_iter().collect(),
        }]);
        let evaluator = ExpressionEvaluator::new(
            Arc::new(KeywordClassifier::default()),
            Arc::new(lookup),
        );
        let result = evaluator
            .evaluate("db.companies.tax_number[name=invoice.supplier.name]", &ctx())
            .unwrap();
        assert_eq!(result, json!("91440101234567890A"));
    }

    #[test]
    fn lookup_default_keeps_expression_valid() {
        let evaluator = ExpressionEvaluator::new(
            Arc::new(KeywordClassifier::default()),
            Arc::new(InMemoryLookup::empty()),
        );
        // Unknown table resolves to null; the surrounding expression still
        // compiles and evaluates.
        let result = evaluator
            .evaluate("db.companies.tax_number[name=invoice.supplier.name] == null", &ctx())
            .unwrap();
        assert_eq!(result, json!(true));
    }
}
