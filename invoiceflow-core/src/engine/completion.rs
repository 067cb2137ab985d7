//! Completion engine: executes completion rules against a working copy of
//! the document, in store order, failing forward.
//!
//! Every rule lands in exactly one terminal state — SKIPPED, SUCCESS,
//! FAILED or ERROR — and whatever the outcome the engine proceeds to the
//! next rule. Broadcast rules (`items[].<f>`) fan out to one outcome per
//! line item. After any successful write the context revision is bumped so
//! the next rule evaluates against the mutated document; this dependency is
//! what rule priorities exist for, and it is why execution within one
//! document is sequential by design.

use crate::config::{CompletionRule, RuleStore, WriteMode};
use crate::context::ContextBuilder;
use crate::expr::ExpressionEvaluator;
use crate::paths::{self, ItemField, TargetPath};
use crate::types::{CompletionReport, ExecutionLogEntry, Invoice, RuleStatus};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

pub struct CompletionEngine<'a> {
    store: &'a RuleStore,
    evaluator: &'a ExpressionEvaluator,
    company: Option<Value>,
}

impl<'a> CompletionEngine<'a> {
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

    /// Run all completion rules against a working copy. The input invoice is
    /// never mutated; the report owns the completed copy and the full log.
    pub fn complete(&self, invoice: &Invoice) -> CompletionReport {
        let mut working = invoice.clone();
        let mut log: Vec<ExecutionLogEntry> = Vec::new();
        let mut builder = ContextBuilder::with_company(self.company.clone());
        let mut revision: u64 = 0;

        println!(
            "🧾 Field completion: {} rules for invoice {}",
            self.store.completion_rules().len(),
            working.invoice_number
        );

        for rule in self.store.completion_rules() {
            match TargetPath::parse(&rule.target_field) {
                Ok(TargetPath::ItemBroadcast(field)) => {
                    self.run_broadcast(rule, &field, &mut working, &mut builder, &mut revision, &mut log);
                }
                Ok(path) => {
                    self.run_scalar(rule, &path, &mut working, &mut builder, &mut revision, &mut log);
                }
                Err(e) => {
                    push(&mut log, entry(rule, RuleStatus::Failed)
                        .path(rule.target_field.clone())
                        .error(e.to_string())
                        .message(format!(
                            "field completion failed: {} - {e}",
                            rule.rule_name
                        )));
                }
            }
        }

        println!(
            "✅ Field completion done: {} log entries",
            log.len()
        );

        CompletionReport {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            invoice: working,
            log,
        }
    }

    fn run_scalar(
        &self,
        rule: &CompletionRule,
        path: &TargetPath,
        working: &mut Invoice,
        builder: &mut ContextBuilder,
        revision: &mut u64,
        log: &mut Vec<ExecutionLogEntry>,
    ) {
        let resolved = path.describe();
        let ctx = builder.context(working, *revision);

        match self.evaluator.evaluate_condition(&rule.apply_to, ctx) {
            Err(e) => {
                push(log, entry(rule, RuleStatus::Error)
                    .path(resolved)
                    .error(e.to_string())
                    .message(format!("completion error: {} - {e}", rule.rule_name)));
                return;
            }
            Ok(false) => {
                push(log, entry(rule, RuleStatus::Skipped)
                    .path(resolved)
                    .message(format!(
                        "rule skipped: {} - condition not met: {}",
                        rule.rule_name, rule.apply_to
                    )));
                return;
            }
            Ok(true) => {}
        }

        let value = match self.evaluator.evaluate(&rule.rule_expression, ctx) {
            Ok(value) => value,
            Err(e) => {
                push(log, entry(rule, RuleStatus::Error)
                    .path(resolved)
                    .error(e.to_string())
                    .message(format!("completion error: {} - {e}", rule.rule_name)));
                return;
            }
        };

        if value.is_null() {
            push(log, entry(rule, RuleStatus::Failed)
                .path(resolved.clone())
                .error("expression produced no value".to_string())
                .message(format!(
                    "field completion failed: {} - expression produced no value for {resolved}",
                    rule.rule_name
                )));
            return;
        }

        if rule.write_mode == WriteMode::IfEmpty && !paths::is_empty(working, path) {
            push(log, entry(rule, RuleStatus::Skipped)
                .path(resolved.clone())
                .message(format!(
                    "rule skipped: {} - {resolved} already set",
                    rule.rule_name
                )));
            return;
        }

        match paths::write(working, path, &value) {
            Ok(()) => {
                *revision += 1;
                push(log, entry(rule, RuleStatus::Success)
                    .path(resolved.clone())
                    .value(value.clone())
                    .message(format!(
                        "field completion succeeded: {} - {resolved} = {value}",
                        rule.rule_name
                    )));
            }
            Err(e) => {
                push(log, entry(rule, RuleStatus::Failed)
                    .path(resolved)
                    .error(e.to_string())
                    .message(format!("field completion failed: {} - {e}", rule.rule_name)));
            }
        }
    }

    fn run_broadcast(
        &self,
        rule: &CompletionRule,
        field: &ItemField,
        working: &mut Invoice,
        builder: &mut ContextBuilder,
        revision: &mut u64,
        log: &mut Vec<ExecutionLogEntry>,
    ) {
        // Each item gets its own context with `item` bound, its own
        // condition check and its own log entry. Zero items, zero entries.
        for index in 0..working.items.len() {
            let resolved = paths::item_path(index, field);
            let ctx = builder.item_context(working, index, *revision);

            match self.evaluator.evaluate_condition(&rule.apply_to, ctx) {
                Err(e) => {
                    push(log, entry(rule, RuleStatus::Error)
                        .path(resolved)
                        .item(index)
                        .error(e.to_string())
                        .message(format!(
                            "completion error: {} - item {index}: {e}",
                            rule.rule_name
                        )));
                    continue;
                }
                Ok(false) => {
                    push(log, entry(rule, RuleStatus::Skipped)
                        .path(resolved)
                        .item(index)
                        .message(format!(
                            "rule skipped: {} - item {index} condition not met: {}",
                            rule.rule_name, rule.apply_to
                        )));
                    continue;
                }
                Ok(true) => {}
            }

            let value = match self.evaluator.evaluate(&rule.rule_expression, ctx) {
                Ok(value) => value,
                Err(e) => {
                    push(log, entry(rule, RuleStatus::Error)
                        .path(resolved)
                        .item(index)
                        .error(e.to_string())
                        .message(format!(
                            "completion error: {} - item {index}: {e}",
                            rule.rule_name
                        )));
                    continue;
                }
            };

            if value.is_null() {
                push(log, entry(rule, RuleStatus::Failed)
                    .path(resolved.clone())
                    .item(index)
                    .error("expression produced no value".to_string())
                    .message(format!(
                        "field completion failed: {} - expression produced no value for {resolved}",
                        rule.rule_name
                    )));
                continue;
            }

            if rule.write_mode == WriteMode::IfEmpty
                && !paths::item_field_is_empty(&working.items[index], field)
            {
                push(log, entry(rule, RuleStatus::Skipped)
                    .path(resolved.clone())
                    .item(index)
                    .message(format!(
                        "rule skipped: {} - {resolved} already set",
                        rule.rule_name
                    )));
                continue;
            }

            match paths::write_item(&mut working.items[index], field, &value) {
                Ok(()) => {
                    *revision += 1;
                    push(log, entry(rule, RuleStatus::Success)
                        .path(resolved.clone())
                        .item(index)
                        .value(value.clone())
                        .message(format!(
                            "field completion succeeded: {} - {resolved} = {value}",
                            rule.rule_name
                        )));
                }
                Err(e) => {
                    push(log, entry(rule, RuleStatus::Failed)
                        .path(resolved)
                        .item(index)
                        .error(e.to_string())
                        .message(format!(
                            "field completion failed: {} - {e}",
                            rule.rule_name
                        )));
                }
            }
        }
    }
}

// Small builder so log construction stays readable at the call sites.
struct EntryBuilder {
    entry: ExecutionLogEntry,
}

fn entry(rule: &CompletionRule, status: RuleStatus) -> EntryBuilder {
    EntryBuilder {
        entry: ExecutionLogEntry {
            rule_id: rule.id.clone(),
            rule_name: rule.rule_name.clone(),
            status,
            field_path: None,
            item_index: None,
            value: None,
            error: None,
            message: String::new(),
        },
    }
}

impl EntryBuilder {
    fn path(mut self, path: String) -> Self {
        self.entry.field_path = Some(path);
        self
    }

    fn item(mut self, index: usize) -> Self {
        self.entry.item_index = Some(index);
        self
    }

    fn value(mut self, value: Value) -> Self {
        self.entry.value = Some(value);
        self
    }

    fn error(mut self, error: String) -> Self {
        self.entry.error = Some(error);
        self
    }

    fn message(mut self, message: String) -> Self {
        self.entry.message = message;
        self
    }
}

fn push(log: &mut Vec<ExecutionLogEntry>, builder: EntryBuilder) {
    println!("   {}", builder.entry.message);
    log.push(builder.entry);
}
