//! Symbolic lookup preprocessing.
//!
//! Rule text may embed `db.<table>.<field>[k1=v1, k2=v2]` occurrences.
//! Before an expression is compiled, every occurrence is resolved through
//! the lookup adapter and textually replaced with a quoted literal of the
//! answer. The `db` namespace therefore never reaches the interpreter.
//!
//! Condition values are either quoted literals or dotted context paths
//! (`name=invoice.supplier.name`); paths resolve against the same context
//! the surrounding expression will be evaluated in.

use crate::lookup::LookupProvider;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Replacement literals are themselves scanned on the next pass; the bound
/// stops pathological configurations (a lookup answer that contains macro
/// text) from rewriting forever.
const MAX_REWRITE_PASSES: usize = 8;

pub const LOOKUP_PATTERN: &str =
    r"db\.([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)\[([^\]]*)\]";

pub fn rewrite_lookups(
    pattern: &Regex,
    expression: &str,
    ctx: &Value,
    provider: &dyn LookupProvider,
) -> String {
    let mut current = expression.to_string();
    for _ in 0..MAX_REWRITE_PASSES {
        if !pattern.is_match(&current) {
            break;
        }
        current = pattern
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                let table = &caps[1];
                let field = &caps[2];
                let conditions = parse_conditions(&caps[3], ctx);
                let answer = provider.lookup(table, field, &conditions);
                to_literal(&answer)
            })
            .into_owned();
    }
    current
}

/// Split `k1=v1, k2=v2` into an exact-match condition map. Pairs that do not
/// contain `=` are ignored, matching the tolerant behavior of the rest of
/// the rule pipeline.
fn parse_conditions(raw: &str, ctx: &Value) -> BTreeMap<String, Value> {
    let mut conditions = BTreeMap::new();
    for pair in raw.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        conditions.insert(key.to_string(), resolve_condition_value(value.trim(), ctx));
    }
    conditions
}

/// A condition value is a quoted string, a number, a boolean/null keyword,
/// or a dotted context path.
fn resolve_condition_value(raw: &str, ctx: &Value) -> Value {
    if raw.len() >= 2 {
        let bytes = raw.as_bytes();
        if (bytes[0] == b'"' && bytes[raw.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[raw.len() - 1] == b'\'')
        {
            return Value::String(raw[1..raw.len() - 1].to_string());
        }
    }
    if let Ok(n) = raw.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return Value::Number(num);
        }
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    resolve_path(ctx, raw)
}

/// Resolve a dotted path against the context root, falling back into the
/// invoice map for unprefixed header fields — same rules as the evaluator.
fn resolve_path(ctx: &Value, path: &str) -> Value {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Value::Null;
    };
    let mut current = match ctx.get(first) {
        Some(value) => value.clone(),
        None => ctx
            .get("invoice")
            .and_then(|invoice| invoice.get(first))
            .cloned()
            .unwrap_or(Value::Null),
    };
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

/// Render a lookup answer as expression source text. Strings are quoted and
/// escaped; composites are embedded as their JSON text in string form.
fn to_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
