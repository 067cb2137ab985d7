use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

// ===== DOMAIN DOCUMENT MODEL =====
// The in-memory invoice representation that rules read and mutate.
// Field names are the rule vocabulary: the context builder exposes them
// under exactly these snake_case names, so what you see here is what rule
// authors write in expressions.

/// Postal address of a party.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Supplier or customer on an invoice.
/// All fields optional — completion rules fill the gaps, and the party
/// object itself is created on first write when a rule targets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Party {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// One invoice line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub description: String,
    pub quantity: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    pub unit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Free-form per-item attributes, writable by rules.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, ExtValue>,
}

fn default_unit() -> String {
    "EA".to_string()
}

/// The invoice itself: header scalars, two parties, ordered line items and
/// the open extensions bag.
///
/// Monetary fields are f64 throughout. Rules compare field values against
/// numeric literals, so the model, the evaluation context and expression
/// literals must share one numeric representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<Party>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<Party>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, ExtValue>,
}

/// Tagged scalar stored in the `extensions` / item `attributes` bags.
/// Keeps the bags dynamically extensible without opening the model up to
/// arbitrary nested structures (which would also make reference cycles
/// representable).
///
/// Variant order matters: serde tries untagged variants top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl ExtValue {
    /// Convert a JSON scalar into a tagged value. Composite values (arrays,
    /// objects) are not representable and return None — callers decide
    /// whether to stringify or reject.
    pub fn from_scalar(value: &Value) -> Option<ExtValue> {
        match value {
            Value::Null => Some(ExtValue::Null),
            Value::Bool(b) => Some(ExtValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(ExtValue::Number),
            Value::String(s) => Some(ExtValue::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ExtValue::Null => Value::Null,
            ExtValue::Bool(b) => Value::Bool(*b),
            ExtValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ExtValue::String(s) => Value::String(s.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ExtValue::Null) || matches!(self, ExtValue::String(s) if s.is_empty())
    }
}

// ===== EXECUTION LOG & REPORTS =====

/// Terminal outcome of one completion rule (or one item of a broadcast rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Success,
    Failed,
    Skipped,
    Error,
}

/// One entry per rule outcome. Broadcast rules produce one entry per line
/// item, carrying the item index and the resolved path (`items[2].tax_rate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub rule_id: String,
    pub rule_name: String,
    pub status: RuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

/// Result of one completion run: the mutated working copy plus the full
/// execution log. The caller's input invoice is never touched.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub invoice: Invoice,
    pub log: Vec<ExecutionLogEntry>,
}

/// A single validation finding, error or warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule_id: String,
    pub rule_name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
}

/// Aggregate validation result. Evaluation failures become warnings, not
/// errors — inability to check a fact is a different failure class from the
/// fact actually failing.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub summary: String,
}

/// Combined outcome of a full processing run (completion, then validation of
/// the completed document).
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub invoice: Invoice,
    pub completion_log: Vec<ExecutionLogEntry>,
    pub validation: ValidationReport,
}

impl Invoice {
    pub fn supplier_mut(&mut self) -> &mut Party {
        self.supplier.get_or_insert_with(Party::default)
    }

    pub fn customer_mut(&mut self) -> &mut Party {
        self.customer.get_or_insert_with(Party::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_value_untagged_roundtrip() {
        let values = vec![
            ExtValue::Null,
            ExtValue::Bool(true),
            ExtValue::Number(12.5),
            ExtValue::String("food".to_string()),
        ];
        for v in values {
            let json = serde_json::to_string(&v).unwrap();
            let back: ExtValue = serde_json::from_str(&json).unwrap();
            assert_eq!(v, back, "round-trip changed {json}");
        }
    }

    #[test]
    fn ext_value_rejects_composites() {
        assert!(ExtValue::from_scalar(&serde_json::json!([1, 2])).is_none());
        assert!(ExtValue::from_scalar(&serde_json::json!({"a": 1})).is_none());
        assert_eq!(
            ExtValue::from_scalar(&serde_json::json!(3.5)),
            Some(ExtValue::Number(3.5))
        );
    }

    #[test]
    fn invoice_json_omits_absent_fields() {
        let invoice = Invoice {
            invoice_number: "INV-1".to_string(),
            ..Invoice::default()
        };
        let json = serde_json::to_value(&invoice).unwrap();
        assert!(json.get("total_amount").is_none());
        assert!(json.get("supplier").is_none());
        assert_eq!(json["invoice_number"], "INV-1");
    }

    #[test]
    fn party_created_on_first_access() {
        let mut invoice = Invoice::default();
        assert!(invoice.supplier.is_none());
        invoice.supplier_mut().tax_no = Some("91000X".to_string());
        assert_eq!(invoice.supplier.as_ref().unwrap().tax_no.as_deref(), Some("91000X"));
    }
}
