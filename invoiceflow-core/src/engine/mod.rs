//! Processing facade: rule store + classifier + lookup wired into a ready
//! engine pair.
//!
//! One processor instance is safe to reuse across many documents — each run
//! owns its working copy, context cache and log buffer. Concurrency belongs
//! across documents (one run per task), never across rules within one
//! document.

pub mod completion;
pub mod validation;

pub use completion::CompletionEngine;
pub use validation::ValidationEngine;

use crate::classifier::{KeywordClassifier, ProductClassifier};
use crate::config::RuleStore;
use crate::expr::ExpressionEvaluator;
use crate::lookup::{CachedLookup, InMemoryLookup, LookupProvider};
use crate::types::{CompletionReport, Invoice, ProcessOutcome, ValidationReport};
use anyhow::Result;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

pub struct InvoiceProcessor {
    store: RuleStore,
    evaluator: ExpressionEvaluator,
    company: Option<Value>,
}

impl InvoiceProcessor {
    /// Wire up the default implementations from the store's own declared
    /// data: keyword classifier and TTL-cached in-memory lookup tables.
    pub fn new(store: RuleStore) -> Self {
        let classifier = if store.classifier_keywords().is_empty() {
            KeywordClassifier::default()
        } else {
            KeywordClassifier::new(
                store.classifier_keywords().to_vec(),
                store.classifier_defaults().clone(),
            )
        };
        let lookup =
            CachedLookup::with_defaults(InMemoryLookup::new(store.lookup_tables().to_vec()));
        Self::with_dependencies(store, Arc::new(classifier), Arc::new(lookup))
    }

    /// Full dependency injection: swap in a real classification service or
    /// a database-backed lookup adapter without touching rule text.
    pub fn with_dependencies(
        store: RuleStore,
        classifier: Arc<dyn ProductClassifier>,
        lookup: Arc<dyn LookupProvider>,
    ) -> Self {
        Self {
            evaluator: ExpressionEvaluator::new(classifier, lookup),
            store,
            company: None,
        }
    }

    /// Convenience constructor: load the rule configuration from a YAML
    /// file and wire up defaults.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let store = RuleStore::load_from_file(path)?;
        Ok(Self::new(store))
    }

    /// Attach an optional secondary context, visible to expressions as
    /// `company`.
    pub fn with_company_context(mut self, company: Value) -> Self {
        self.company = Some(company);
        self
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn complete(&self, invoice: &Invoice) -> CompletionReport {
        CompletionEngine::new(&self.store, &self.evaluator)
            .with_company(self.company.clone())
            .complete(invoice)
    }

    pub fn validate(&self, invoice: &Invoice) -> ValidationReport {
        ValidationEngine::new(&self.store, &self.evaluator)
            .with_company(self.company.clone())
            .validate(invoice)
    }

    /// Completion first, then validation of the completed document.
    pub fn process(&self, invoice: &Invoice) -> ProcessOutcome {
        let completion = self.complete(invoice);
        let validation = self.validate(&completion.invoice);
        ProcessOutcome {
            invoice: completion.invoice,
            completion_log: completion.log,
            validation,
        }
    }
}
