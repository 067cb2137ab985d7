//! External lookup adapter — the read-only key/value resolver addressed from
//! rule text through the `db.table.field[...]` macro.
//!
//! Tables are declared data, not code: new lookup sources are added by
//! configuration. Misses never propagate — unknown tables, unknown fields
//! and unmatched conditions all resolve to the table's declared per-field
//! default (or null), so a lookup can never turn into a compile failure in
//! the expression that embeds it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Read-only resolver consumed by the expression preprocessor.
/// Conditions are exact-match equality only.
pub trait LookupProvider: Send + Sync {
    fn lookup(&self, table: &str, field: &str, conditions: &BTreeMap<String, Value>) -> Value;
}

/// One declared lookup table: rows plus per-field fallback values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupTableDef {
    pub table: String,
    #[serde(default)]
    pub rows: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,
}

/// In-memory implementation over the declared table registry. The first row
/// matching every condition wins.
#[derive(Debug, Default)]
pub struct InMemoryLookup {
    tables: HashMap<String, LookupTableDef>,
}

impl InMemoryLookup {
    pub fn new(tables: Vec<LookupTableDef>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.table.clone(), t)).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl LookupProvider for InMemoryLookup {
    fn lookup(&self, table: &str, field: &str, conditions: &BTreeMap<String, Value>) -> Value {
        let Some(def) = self.tables.get(table) else {
            return Value::Null;
        };
        for row in &def.rows {
            let matches = conditions
                .iter()
                .all(|(key, expected)| row.get(key).is_some_and(|v| values_match(v, expected)));
            if matches {
                if let Some(value) = row.get(field) {
                    return value.clone();
                }
                break;
            }
        }
        def.defaults.get(field).cloned().unwrap_or(Value::Null)
    }
}

/// Exact-match comparison; numbers compare numerically so a condition value
/// coerced to f64 still matches an integer-spelled row value.
fn values_match(row_value: &Value, condition: &Value) -> bool {
    match (row_value.as_f64(), condition.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => row_value == condition,
    }
}

/// TTL cache wrapper. Caching lives in the adapter, not the engine: the
/// engine must see every lookup as a plain synchronous call. Capacity is
/// bounded; when full, the oldest entry is evicted.
pub struct CachedLookup<P: LookupProvider> {
    inner: P,
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, (Value, Instant)>,
    order: VecDeque<String>,
}

impl<P: LookupProvider> CachedLookup<P> {
    pub fn new(inner: P, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            ttl,
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// 5 minute TTL, 1000 entries.
    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, Duration::from_secs(300), 1000)
    }

    fn cache_key(table: &str, field: &str, conditions: &BTreeMap<String, Value>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(table.as_bytes());
        hasher.update(b".");
        hasher.update(field.as_bytes());
        hasher.update(b":");
        // BTreeMap serializes in key order, so equal condition sets always
        // produce the same digest.
        hasher.update(serde_json::to_string(conditions).unwrap_or_default().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl<P: LookupProvider> LookupProvider for CachedLookup<P> {
    fn lookup(&self, table: &str, field: &str, conditions: &BTreeMap<String, Value>) -> Value {
        let key = Self::cache_key(table, field, conditions);

        if let Ok(mut state) = self.state.lock() {
            match state.entries.get(&key) {
                Some((value, stored)) if stored.elapsed() < self.ttl => {
                    return value.clone();
                }
                Some(_) => {
                    state.entries.remove(&key);
                }
                None => {}
            }
        }

        let value = self.inner.lookup(table, field, conditions);

        if let Ok(mut state) = self.state.lock() {
            while state.entries.len() >= self.max_entries {
                match state.order.pop_front() {
                    Some(oldest) => {
                        state.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            state.entries.insert(key.clone(), (value.clone(), Instant::now()));
            state.order.push_back(key);
        }

        value
    }
}
