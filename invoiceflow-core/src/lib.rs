// Invoiceflow Core Library
//
// Rule-driven invoice processing: declarative completion rules compute and
// write missing fields, validation rules check business constraints, and an
// embedded sandboxed expression language drives both — no code changes when
// rules change.

pub mod classifier;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod expr;
pub mod lookup;
pub mod paths;
pub mod types;

// Re-export main types for easy use
pub use types::*;

pub use classifier::{KeywordClassifier, ProductClassifier, ProductInfo};
pub use config::{CompletionRule, RuleStore, ValidationRule, WriteMode};
pub use context::ContextBuilder;
pub use engine::{CompletionEngine, InvoiceProcessor, ValidationEngine};
pub use error::{ConfigError, ExprError, PathError};
pub use expr::ExpressionEvaluator;
pub use lookup::{CachedLookup, InMemoryLookup, LookupProvider, LookupTableDef};
pub use paths::TargetPath;
