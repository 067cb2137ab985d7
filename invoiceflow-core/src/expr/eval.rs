//! AST evaluation against a context tree.
//!
//! Values are `serde_json::Value`. Path resolution is lenient — a missing
//! field yields null so conditions like `!has(item.tax_rate)` and
//! `invoice.country == 'CN'` work on sparse documents. Operations on values
//! of the wrong shape (ordering null, arithmetic on strings, method calls on
//! null) are runtime errors reported as strings; the caller wraps them with
//! the offending expression text.

use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::classifier::ProductClassifier;
use serde_json::{Number, Value};

const MAX_RECURSION_DEPTH: usize = 64;

pub fn eval(expr: &Expr, ctx: &Value, classifier: &dyn ProductClassifier) -> Result<Value, String> {
    eval_depth(expr, ctx, classifier, 0)
}

fn eval_depth(
    expr: &Expr,
    ctx: &Value,
    classifier: &dyn ProductClassifier,
    depth: usize,
) -> Result<Value, String> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(format!("expression nesting exceeds {MAX_RECURSION_DEPTH} levels"));
    }
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Var(name) => Ok(resolve_var(ctx, name)),

        Expr::Field { target, name } => {
            let value = eval_depth(target, ctx, classifier, depth + 1)?;
            match value {
                // Lenient: missing parents read as null so presence checks
                // and equality against sparse documents do not blow up.
                Value::Null => Ok(Value::Null),
                Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
                other => Err(format!(
                    "cannot access field `{name}` on {}",
                    type_name(&other)
                )),
            }
        }

        Expr::Index { target, index } => {
            let value = eval_depth(target, ctx, classifier, depth + 1)?;
            let index = eval_depth(index, ctx, classifier, depth + 1)?;
            let list = match value {
                Value::Array(list) => list,
                other => return Err(format!("cannot index into {}", type_name(&other))),
            };
            let i = as_index(&index)?;
            list.get(i)
                .cloned()
                .ok_or_else(|| format!("index {i} out of bounds (length {})", list.len()))
        }

        Expr::Unary { op, operand } => {
            let value = eval_depth(operand, ctx, classifier, depth + 1)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                UnaryOp::Neg => match value.as_f64() {
                    Some(n) => number(-n),
                    None => Err(format!("cannot negate {}", type_name(&value))),
                },
            }
        }

        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let lhs = eval_depth(left, ctx, classifier, depth + 1)?;
                if !is_truthy(&lhs) {
                    return Ok(Value::Bool(false));
                }
                let rhs = eval_depth(right, ctx, classifier, depth + 1)?;
                Ok(Value::Bool(is_truthy(&rhs)))
            }
            BinaryOp::Or => {
                let lhs = eval_depth(left, ctx, classifier, depth + 1)?;
                if is_truthy(&lhs) {
                    return Ok(Value::Bool(true));
                }
                let rhs = eval_depth(right, ctx, classifier, depth + 1)?;
                Ok(Value::Bool(is_truthy(&rhs)))
            }
            _ => {
                let lhs = eval_depth(left, ctx, classifier, depth + 1)?;
                let rhs = eval_depth(right, ctx, classifier, depth + 1)?;
                eval_binary(*op, &lhs, &rhs)
            }
        },

        Expr::Ternary { cond, then, otherwise } => {
            let cond = eval_depth(cond, ctx, classifier, depth + 1)?;
            if is_truthy(&cond) {
                eval_depth(then, ctx, classifier, depth + 1)
            } else {
                eval_depth(otherwise, ctx, classifier, depth + 1)
            }
        }

        Expr::Call { name, args } => eval_call(name, args, ctx, classifier, depth),

        Expr::Method { target, name, args } => {
            let target = eval_depth(target, ctx, classifier, depth + 1)?;
            let subject = match target {
                Value::String(s) => s,
                Value::Null => return Err(format!("cannot call `{name}` on null")),
                other => {
                    return Err(format!("cannot call `{name}` on {}", type_name(&other)));
                }
            };
            if args.len() != 1 {
                return Err(format!("`{name}` takes exactly 1 argument"));
            }
            let arg = eval_depth(&args[0], ctx, classifier, depth + 1)?;
            let needle = match arg {
                Value::String(s) => s,
                other => {
                    return Err(format!("`{name}` argument must be a string, got {}", type_name(&other)));
                }
            };
            let result = match name.as_str() {
                "contains" => subject.contains(&needle),
                "startsWith" => subject.starts_with(&needle),
                "endsWith" => subject.ends_with(&needle),
                other => return Err(format!("unknown method `{other}`")),
            };
            Ok(Value::Bool(result))
        }
    }
}

fn eval_call(
    name: &str,
    args: &[Expr],
    ctx: &Value,
    classifier: &dyn ProductClassifier,
    depth: usize,
) -> Result<Value, String> {
    match name {
        // Special form: the parser guarantees a single path argument.
        "has" => {
            let value = resolve_lenient(&args[0], ctx);
            Ok(Value::Bool(is_present(&value)))
        }
        "size" => {
            if args.len() != 1 {
                return Err("size() takes exactly 1 argument".to_string());
            }
            let value = eval_depth(&args[0], ctx, classifier, depth + 1)?;
            let n = match &value {
                Value::String(s) => s.chars().count(),
                Value::Array(list) => list.len(),
                Value::Object(map) => map.len(),
                other => return Err(format!("size() not defined for {}", type_name(other))),
            };
            number(n as f64)
        }
        "get_standard_name" | "get_tax_rate" | "get_tax_category" | "get_product_info" => {
            if args.len() != 1 {
                return Err(format!("{name}() takes exactly 1 argument"));
            }
            let arg = eval_depth(&args[0], ctx, classifier, depth + 1)?;
            let description = to_display(&arg)?;
            match name {
                "get_standard_name" => Ok(Value::String(classifier.standard_name(&description))),
                "get_tax_rate" => number(classifier.tax_rate(&description)),
                "get_tax_category" => Ok(Value::String(classifier.tax_category(&description))),
                _ => serde_json::to_value(classifier.product_info(&description))
                    .map_err(|e| format!("product info not representable: {e}")),
            }
        }
        other => Err(format!("unknown function `{other}`")),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => number(to_f64(a) + to_f64(b)),
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", to_display(lhs)?, to_display(rhs)?)))
            }
            _ => Err(arith_error("+", lhs, rhs)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(arith_error(op_symbol(op), lhs, rhs)),
            };
            match op {
                BinaryOp::Sub => number(a - b),
                BinaryOp::Mul => number(a * b),
                BinaryOp::Div => {
                    if b == 0.0 {
                        Err("division by zero".to_string())
                    } else {
                        number(a / b)
                    }
                }
                _ => {
                    if b == 0.0 {
                        Err("modulo by zero".to_string())
                    } else {
                        number(a % b)
                    }
                }
            }
        }
        BinaryOp::Eq => Ok(Value::Bool(values_equal(lhs, rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(lhs, rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Value::Number(a), Value::Number(b)) => to_f64(a)
                    .partial_cmp(&to_f64(b))
                    .ok_or_else(|| "cannot order non-finite numbers".to_string())?,
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => {
                    return Err(format!(
                        "cannot compare {} with {}",
                        type_name(lhs),
                        type_name(rhs)
                    ));
                }
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops handled in eval_depth"),
    }
}

/// Equality never errors: mismatched types are simply unequal. Numbers
/// compare as f64 regardless of integer/decimal spelling.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => to_f64(a) == to_f64(b),
        (a, b) => a == b,
    }
}

/// Resolve a bare identifier: context root first, then the invoice map, so
/// unprefixed header fields keep working.
fn resolve_var(ctx: &Value, name: &str) -> Value {
    if let Some(value) = ctx.get(name) {
        return value.clone();
    }
    ctx.get("invoice")
        .and_then(|invoice| invoice.get(name))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Path resolution for `has()`: never errors, any structural mismatch reads
/// as absent.
fn resolve_lenient(expr: &Expr, ctx: &Value) -> Value {
    match expr {
        Expr::Var(name) => resolve_var(ctx, name),
        Expr::Field { target, name } => match resolve_lenient(target, ctx) {
            Value::Object(map) => map.get(name.as_str()).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        },
        Expr::Index { target, index } => {
            let list = match resolve_lenient(target, ctx) {
                Value::Array(list) => list,
                _ => return Value::Null,
            };
            match &**index {
                Expr::Literal(idx) => match as_index(idx) {
                    Ok(i) => list.get(i).cloned().unwrap_or(Value::Null),
                    Err(_) => Value::Null,
                },
                _ => Value::Null,
            }
        }
        _ => Value::Null,
    }
}

/// Presence as rule authors expect it: null, a missing key and an empty
/// string all count as absent. Numeric zero is present.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Truthiness for `apply_to` conditions and ternaries.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => to_f64(n) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(list) => !list.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Render a scalar for string concatenation and classifier arguments.
/// Null renders as an error — concatenating a missing field is a rule bug
/// worth surfacing, not something to paper over with "null" text.
pub fn to_display(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(format_number(to_f64(n))),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err("cannot convert null to a string".to_string()),
        other => Err(format!("cannot convert {} to a string", type_name(other))),
    }
}

/// Whole numbers print without a trailing `.0` so concatenated identifiers
/// look like identifiers.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn number(n: f64) -> Result<Value, String> {
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| format!("arithmetic produced a non-finite number ({n})"))
}

fn to_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

fn as_index(value: &Value) -> Result<usize, String> {
    let n = value
        .as_f64()
        .ok_or_else(|| format!("index must be a number, got {}", type_name(value)))?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(format!("index must be a non-negative integer, got {n}"));
    }
    Ok(n as usize)
}

fn arith_error(op: &str, lhs: &Value, rhs: &Value) -> String {
    format!(
        "cannot apply `{op}` to {} and {}",
        type_name(lhs),
        type_name(rhs)
    )
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
