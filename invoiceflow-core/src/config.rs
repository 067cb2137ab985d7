//! Rule configuration loading and the Rule Store.
//!
//! Rules, lookup tables and classifier keywords all live in one YAML file so
//! behavior changes never require code changes. Individual malformed rule
//! records are dropped with a warning — a load only fails when the source
//! itself cannot be read or is not YAML at all. The loaded store is
//! immutable and reused read-only across document runs.

use crate::classifier::{ClassifierDefaults, KeywordEntry};
use crate::error::ConfigError;
use crate::lookup::LookupTableDef;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fs;
use std::path::Path;

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    50
}

/// Whether a completion rule overwrites existing data or only fills gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Always write the computed value.
    #[default]
    Override,
    /// Write only when the target is currently empty.
    IfEmpty,
}

/// Computes and writes one field when its condition holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRule {
    pub id: String,
    pub rule_name: String,
    /// Condition expression; empty means the rule always applies.
    #[serde(default)]
    pub apply_to: String,
    pub target_field: String,
    pub rule_expression: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub write_mode: WriteMode,
}

/// Checks one boolean fact and records an error when it fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    pub id: String,
    pub rule_name: String,
    #[serde(default)]
    pub apply_to: String,
    /// Diagnostic only — names the field the check is about.
    #[serde(default)]
    pub field_path: String,
    pub rule_expression: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Raw configuration file shape. Rule records are kept as raw YAML values so
/// one bad record cannot poison the rest of the file.
#[derive(Debug, Default, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub completion_rules: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub validation_rules: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub lookup_tables: Vec<LookupTableDef>,
    #[serde(default)]
    pub classifier_keywords: Vec<KeywordEntry>,
    #[serde(default)]
    pub classifier_defaults: ClassifierDefaults,
}

/// The ordered, active rule lists for a processing run, plus the declared
/// lookup/classifier data that travels with them.
#[derive(Debug, Default)]
pub struct RuleStore {
    completion: Vec<CompletionRule>,
    validation: Vec<ValidationRule>,
    lookup_tables: Vec<LookupTableDef>,
    classifier_keywords: Vec<KeywordEntry>,
    classifier_defaults: ClassifierDefaults,
}

impl RuleStore {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<RuleStore> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read rule configuration {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("failed to parse rule configuration {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<RuleStore> {
        let config: RulesConfig = serde_yaml::from_str(content)?;
        Ok(Self::from_config(config))
    }

    /// Build the store from a parsed configuration. Malformed individual
    /// records are dropped with a warning; inactive rules are excluded here,
    /// before ordering, not skipped at run time.
    pub fn from_config(config: RulesConfig) -> RuleStore {
        let completion = parse_records::<CompletionRule>(config.completion_rules, "completion");
        let validation = parse_records::<ValidationRule>(config.validation_rules, "validation");
        Self::from_rules(completion, validation)
            .with_lookup_tables(config.lookup_tables)
            .with_classifier(config.classifier_keywords, config.classifier_defaults)
    }

    /// Programmatic construction (tests, embedding hosts).
    pub fn from_rules(
        completion: Vec<CompletionRule>,
        validation: Vec<ValidationRule>,
    ) -> RuleStore {
        let mut completion: Vec<_> = completion.into_iter().filter(|r| r.active).collect();
        let mut validation: Vec<_> = validation.into_iter().filter(|r| r.active).collect();
        // Higher priority runs first; the sort is stable so ties keep their
        // configuration order.
        completion.sort_by_key(|r| Reverse(r.priority));
        validation.sort_by_key(|r| Reverse(r.priority));
        RuleStore {
            completion,
            validation,
            ..RuleStore::default()
        }
    }

    pub fn with_lookup_tables(mut self, tables: Vec<LookupTableDef>) -> RuleStore {
        self.lookup_tables = tables;
        self
    }

    pub fn with_classifier(
        mut self,
        keywords: Vec<KeywordEntry>,
        defaults: ClassifierDefaults,
    ) -> RuleStore {
        self.classifier_keywords = keywords;
        self.classifier_defaults = defaults;
        self
    }

    pub fn completion_rules(&self) -> &[CompletionRule] {
        &self.completion
    }

    pub fn validation_rules(&self) -> &[ValidationRule] {
        &self.validation
    }

    pub fn lookup_tables(&self) -> &[LookupTableDef] {
        &self.lookup_tables
    }

    pub fn classifier_keywords(&self) -> &[KeywordEntry] {
        &self.classifier_keywords
    }

    pub fn classifier_defaults(&self) -> &ClassifierDefaults {
        &self.classifier_defaults
    }

    pub fn is_empty(&self) -> bool {
        self.completion.is_empty() && self.validation.is_empty()
    }
}

fn parse_records<T: serde::de::DeserializeOwned>(
    records: Vec<serde_yaml::Value>,
    kind: &str,
) -> Vec<T> {
    let mut parsed = Vec::with_capacity(records.len());
    for record in records {
        let id = record
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        match serde_yaml::from_value::<T>(record) {
            Ok(rule) => parsed.push(rule),
            Err(e) => {
                let err = ConfigError {
                    id,
                    message: e.to_string(),
                };
                eprintln!("⚠️  Dropping {kind} rule: {err}");
            }
        }
    }
    parsed
}
