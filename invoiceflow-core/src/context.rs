//! Context construction: Invoice → generic string-keyed value tree.
//!
//! Expressions never see the domain structs — they see a map shaped exactly
//! like the rule vocabulary: header scalars at the top of `invoice`,
//! `supplier`/`customer` as nested maps, `items` as a list of maps,
//! `extensions` as a map, plus an `item` binding when a broadcast rule is
//! being evaluated per line.
//!
//! Absent optional fields are omitted (not emitted as null) so `has()` is a
//! key-presence check. All numeric fields surface as f64 — the one numeric
//! representation shared with expression literals.
//!
//! Building the tree walks the whole document, so it is memoized per
//! (revision, bound item). The revision is an explicit counter the engine
//! bumps after every successful write; there is no identity- or hash-based
//! staleness guessing.

use crate::types::{Address, ExtValue, Invoice, LineItem, Party};
use chrono::NaiveDate;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    revision: u64,
    item: Option<usize>,
}

/// Per-run context cache. One instance per engine run — never shared across
/// documents.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    company: Option<Value>,
    cached: Option<(CacheKey, Value)>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an optional secondary `company` context, visible to
    /// expressions under the `company` variable.
    pub fn with_company(company: Option<Value>) -> Self {
        Self {
            company,
            cached: None,
        }
    }

    /// Document-level context (`item` bound to null).
    pub fn context(&mut self, invoice: &Invoice, revision: u64) -> &Value {
        self.build(invoice, None, revision)
    }

    /// Per-item context for broadcast rules.
    pub fn item_context(&mut self, invoice: &Invoice, item_index: usize, revision: u64) -> &Value {
        self.build(invoice, Some(item_index), revision)
    }

    fn build(&mut self, invoice: &Invoice, item: Option<usize>, revision: u64) -> &Value {
        let key = CacheKey { revision, item };
        let stale = self.cached.as_ref().map_or(true, |(k, _)| *k != key);
        if stale {
            let ctx = build_context(invoice, item, self.company.as_ref());
            self.cached = Some((key, ctx));
        }
        let (_, ctx) = self.cached.as_ref().expect("context cache populated above");
        ctx
    }
}

fn build_context(invoice: &Invoice, item_index: Option<usize>, company: Option<&Value>) -> Value {
    let mut root = Map::new();
    root.insert("invoice".to_string(), invoice_value(invoice));
    let item = item_index
        .and_then(|i| invoice.items.get(i))
        .map(item_value)
        .unwrap_or(Value::Null);
    root.insert("item".to_string(), item);
    if let Some(company) = company {
        root.insert("company".to_string(), company.clone());
    }
    Value::Object(root)
}

fn invoice_value(invoice: &Invoice) -> Value {
    let mut map = Map::new();
    map.insert(
        "invoice_number".to_string(),
        Value::String(invoice.invoice_number.clone()),
    );
    put_date(&mut map, "issue_date", &invoice.issue_date);
    put_date(&mut map, "due_date", &invoice.due_date);
    put_str(&mut map, "invoice_type", &invoice.invoice_type);
    put_str(&mut map, "country", &invoice.country);
    put_str(&mut map, "currency", &invoice.currency);
    put_str(&mut map, "status", &invoice.status);
    put_str(&mut map, "reference_number", &invoice.reference_number);
    put_str(&mut map, "payment_terms", &invoice.payment_terms);
    put_str(&mut map, "notes", &invoice.notes);
    put_num(&mut map, "total_amount", &invoice.total_amount);
    put_num(&mut map, "tax_amount", &invoice.tax_amount);
    put_num(&mut map, "net_amount", &invoice.net_amount);
    put_num(&mut map, "tax_rate", &invoice.tax_rate);
    if let Some(supplier) = &invoice.supplier {
        map.insert("supplier".to_string(), party_value(supplier));
    }
    if let Some(customer) = &invoice.customer {
        map.insert("customer".to_string(), party_value(customer));
    }
    map.insert(
        "items".to_string(),
        Value::Array(invoice.items.iter().map(item_value).collect()),
    );
    map.insert(
        "extensions".to_string(),
        bag_value(&invoice.extensions),
    );
    Value::Object(map)
}

fn party_value(party: &Party) -> Value {
    let mut map = Map::new();
    put_str(&mut map, "name", &party.name);
    put_str(&mut map, "tax_no", &party.tax_no);
    put_str(&mut map, "email", &party.email);
    put_str(&mut map, "phone", &party.phone);
    put_str(&mut map, "bank_account", &party.bank_account);
    put_str(&mut map, "bank_name", &party.bank_name);
    if let Some(address) = &party.address {
        map.insert("address".to_string(), address_value(address));
    }
    Value::Object(map)
}

fn address_value(address: &Address) -> Value {
    let mut map = Map::new();
    put_str(&mut map, "street", &address.street);
    put_str(&mut map, "city", &address.city);
    put_str(&mut map, "postal_code", &address.postal_code);
    put_str(&mut map, "country", &address.country);
    Value::Object(map)
}

fn item_value(item: &LineItem) -> Value {
    let mut map = Map::new();
    put_str(&mut map, "name", &item.name);
    map.insert(
        "description".to_string(),
        Value::String(item.description.clone()),
    );
    insert_num(&mut map, "quantity", item.quantity);
    map.insert("unit".to_string(), Value::String(item.unit.clone()));
    insert_num(&mut map, "unit_price", item.unit_price);
    put_num(&mut map, "line_total", &item.line_total);
    put_num(&mut map, "tax_rate", &item.tax_rate);
    put_num(&mut map, "tax_amount", &item.tax_amount);
    put_str(&mut map, "tax_category", &item.tax_category);
    put_str(&mut map, "category", &item.category);
    put_str(&mut map, "product_code", &item.product_code);
    put_str(&mut map, "note", &item.note);
    map.insert("attributes".to_string(), bag_value(&item.attributes));
    Value::Object(map)
}

fn bag_value(bag: &BTreeMap<String, ExtValue>) -> Value {
    Value::Object(
        bag.iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

fn put_str(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(s) = value {
        map.insert(key.to_string(), Value::String(s.clone()));
    }
}

fn put_num(map: &mut Map<String, Value>, key: &str, value: &Option<f64>) {
    if let Some(n) = value {
        insert_num(map, key, *n);
    }
}

fn insert_num(map: &mut Map<String, Value>, key: &str, n: f64) {
    // Non-finite amounts cannot be represented in the tree; omit the key so
    // they read as absent rather than poisoning comparisons.
    if let Some(num) = Number::from_f64(n) {
        map.insert(key.to_string(), Value::Number(num));
    }
}

fn put_date(map: &mut Map<String, Value>, key: &str, value: &Option<NaiveDate>) {
    if let Some(date) = value {
        map.insert(key.to_string(), Value::String(date.to_string()));
    }
}
