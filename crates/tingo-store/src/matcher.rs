//! Filter evaluation
//!
//! Filters are compiled once into a [`Predicate`] tree (regexes built,
//! operators checked) and then evaluated against every candidate document.

use crate::error::{Result, StoreError};
use bson::{Bson, Document};
use regex::Regex;
use std::cmp::Ordering;

/// Compiled form of a filter document
#[derive(Debug, Clone)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Field {
        path: Vec<String>,
        conditions: Vec<Condition>,
    },
}

/// A single condition applied to the values found at a field path
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Regex(Regex),
    Exists(bool),
    Not(Vec<Condition>),
}

impl Predicate {
    /// Compile a filter document
    ///
    /// # Errors
    /// Returns `StoreError::Query` for unknown operators or operands of the
    /// wrong shape.
    pub fn compile(filter: &Document) -> Result<Self> {
        let mut clauses = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            let clause = match key.as_str() {
                "$and" => Predicate::And(compile_list(key, value)?),
                "$or" => Predicate::Or(compile_list(key, value)?),
                "$not" => match value {
                    Bson::Document(inner) => Predicate::Not(Box::new(Predicate::compile(inner)?)),
                    _ => return Err(query_error("$not expects a filter document")),
                },
                op if op.starts_with('$') => {
                    return Err(query_error(format!("unknown top-level operator '{}'", op)))
                }
                field => Predicate::Field {
                    path: field.split('.').map(str::to_string).collect(),
                    conditions: compile_conditions(value)?,
                },
            };
            clauses.push(clause);
        }

        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(Predicate::And(clauses))
        }
    }

    /// Evaluate against a document
    pub fn matches(&self, doc: &Document, search_in_array: bool) -> bool {
        match self {
            Predicate::And(children) => children.iter().all(|p| p.matches(doc, search_in_array)),
            Predicate::Or(children) => children.iter().any(|p| p.matches(doc, search_in_array)),
            Predicate::Not(inner) => !inner.matches(doc, search_in_array),
            Predicate::Field { path, conditions } => {
                let values = resolve_path(doc, path, search_in_array);
                conditions
                    .iter()
                    .all(|c| c.matches(&values, search_in_array))
            }
        }
    }
}

impl Condition {
    fn matches(&self, values: &[&Bson], expand: bool) -> bool {
        match self {
            Condition::Eq(target) => matches_eq(values, target, expand),
            Condition::Ne(target) => !matches_eq(values, target, expand),
            Condition::Gt(target) => any_value(values, expand, |v| {
                compare_values(v, target) == Some(Ordering::Greater)
            }),
            Condition::Gte(target) => any_value(values, expand, |v| {
                matches!(
                    compare_values(v, target),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            }),
            Condition::Lt(target) => any_value(values, expand, |v| {
                compare_values(v, target) == Some(Ordering::Less)
            }),
            Condition::Lte(target) => any_value(values, expand, |v| {
                matches!(
                    compare_values(v, target),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }),
            Condition::In(targets) => targets.iter().any(|t| matches_eq(values, t, expand)),
            Condition::Nin(targets) => !targets.iter().any(|t| matches_eq(values, t, expand)),
            Condition::Regex(re) => any_value(values, expand, |v| match v {
                Bson::String(s) | Bson::Symbol(s) => re.is_match(s),
                _ => false,
            }),
            Condition::Exists(expected) => values.is_empty() != *expected,
            Condition::Not(inner) => !inner.iter().all(|c| c.matches(values, expand)),
        }
    }
}

fn query_error(msg: impl Into<String>) -> StoreError {
    StoreError::Query(msg.into())
}

fn compile_list(op: &str, value: &Bson) -> Result<Vec<Predicate>> {
    let items = match value {
        Bson::Array(items) => items,
        _ => return Err(query_error(format!("{} expects an array", op))),
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Predicate::compile(doc),
            _ => Err(query_error(format!("{} entries must be filter documents", op))),
        })
        .collect()
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().map(|k| k.starts_with('$')).unwrap_or(false)
}

fn compile_conditions(value: &Bson) -> Result<Vec<Condition>> {
    match value {
        Bson::Document(doc) if is_operator_document(doc) => compile_operator_document(doc),
        Bson::RegularExpression(re) => Ok(vec![Condition::Regex(build_regex(
            &re.pattern,
            &re.options,
        )?)]),
        other => Ok(vec![Condition::Eq(other.clone())]),
    }
}

fn compile_operator_document(doc: &Document) -> Result<Vec<Condition>> {
    let mut conditions = Vec::with_capacity(doc.len());
    let options = match doc.get("$options") {
        Some(Bson::String(options)) => Some(options.as_str()),
        Some(_) => return Err(query_error("$options must be a string")),
        None => None,
    };

    for (op, operand) in doc {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(operand.clone()),
            "$ne" => Condition::Ne(operand.clone()),
            "$gt" => Condition::Gt(operand.clone()),
            "$gte" => Condition::Gte(operand.clone()),
            "$lt" => Condition::Lt(operand.clone()),
            "$lte" => Condition::Lte(operand.clone()),
            "$in" => Condition::In(expect_array(op, operand)?),
            "$nin" => Condition::Nin(expect_array(op, operand)?),
            "$exists" => Condition::Exists(is_truthy(operand)),
            "$regex" => Condition::Regex(compile_regex_operand(operand, options)?),
            "$options" => {
                if !doc.contains_key("$regex") {
                    return Err(query_error("$options requires $regex"));
                }
                continue;
            }
            "$not" => match operand {
                Bson::Document(inner) if is_operator_document(inner) => {
                    Condition::Not(compile_operator_document(inner)?)
                }
                Bson::RegularExpression(re) => {
                    Condition::Not(vec![Condition::Regex(build_regex(&re.pattern, &re.options)?)])
                }
                _ => return Err(query_error("$not expects an operator document or regex")),
            },
            other if other.starts_with('$') => {
                return Err(query_error(format!("unknown operator '{}'", other)))
            }
            other => {
                return Err(query_error(format!(
                    "cannot mix operators and field '{}' in one condition",
                    other
                )))
            }
        };
        conditions.push(condition);
    }

    Ok(conditions)
}

fn expect_array(op: &str, operand: &Bson) -> Result<Vec<Bson>> {
    match operand {
        Bson::Array(items) => Ok(items.clone()),
        _ => Err(query_error(format!("{} expects an array", op))),
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn compile_regex_operand(operand: &Bson, options: Option<&str>) -> Result<Regex> {
    match operand {
        Bson::String(pattern) => build_regex(pattern, options.unwrap_or("")),
        Bson::RegularExpression(re) => build_regex(&re.pattern, options.unwrap_or(&re.options)),
        _ => Err(query_error("$regex expects a string or regular expression")),
    }
}

fn build_regex(pattern: &str, options: &str) -> Result<Regex> {
    let flags: String = options
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
        .collect();
    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };
    Regex::new(&source).map_err(|e| query_error(format!("invalid regex '{}': {}", pattern, e)))
}

/// Collect the values found at `path`
///
/// Numeric path components index into arrays. With `expand`, arrays of
/// sub-documents met along the way are searched element by element.
pub fn resolve_path<'a>(doc: &'a Document, path: &[String], expand: bool) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    if let Some((head, rest)) = path.split_first() {
        if let Some(value) = doc.get(head) {
            collect_path(value, rest, expand, &mut out);
        }
    }
    out
}

fn collect_path<'a>(value: &'a Bson, rest: &[String], expand: bool, out: &mut Vec<&'a Bson>) {
    let (head, tail) = match rest.split_first() {
        Some(parts) => parts,
        None => {
            out.push(value);
            return;
        }
    };

    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(head) {
                collect_path(next, tail, expand, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    collect_path(next, tail, expand, out);
                }
            } else if expand {
                for item in items {
                    if matches!(item, Bson::Document(_)) {
                        collect_path(item, rest, expand, out);
                    }
                }
            }
        }
        _ => {}
    }
}

fn matches_eq(values: &[&Bson], target: &Bson, expand: bool) -> bool {
    if values.is_empty() {
        // A missing field equals null
        return matches!(target, Bson::Null);
    }
    any_value(values, expand, |v| values_equal(v, target))
}

fn any_value(values: &[&Bson], expand: bool, pred: impl Fn(&Bson) -> bool) -> bool {
    values.iter().any(|value| {
        pred(value)
            || (expand && matches!(value, Bson::Array(items) if items.iter().any(|item| pred(item))))
    })
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(f) => Some(*f),
        other => as_i64(other).map(|n| n as f64),
    }
}

/// Numeric ordering across widths; integers never go through `f64`
///
/// `None` when either side is not a number, or when NaN is involved.
fn compare_numbers(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (as_i64(a), as_i64(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
    }
}

/// Equality with numeric values compared across widths
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if as_f64(a).is_some() && as_f64(b).is_some() {
        return compare_numbers(a, b) == Some(Ordering::Equal);
    }
    a == b
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Ordering used by range operators: values of different types never compare
pub fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if type_rank(a) != type_rank(b) {
        return None;
    }
    Some(canonical_cmp(a, b))
}

/// Total order over BSON values used for sorting
pub fn canonical_cmp(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(x) | Bson::Symbol(x), Bson::String(y) | Bson::Symbol(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        (Bson::Array(x), Bson::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = canonical_cmp(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match (as_f64(a), as_f64(b)) {
            (Some(_), Some(_)) => compare_numbers(a, b).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// Compare two documents by `(field, direction)` sort keys
///
/// Missing fields sort as null; a negative direction reverses a key.
pub fn compare_documents(a: &Document, b: &Document, keys: &[(String, i32)]) -> Ordering {
    for (field, direction) in keys {
        let path: Vec<String> = field.split('.').map(str::to_string).collect();
        let left = resolve_path(a, &path, false).first().copied().unwrap_or(&Bson::Null);
        let right = resolve_path(b, &path, false).first().copied().unwrap_or(&Bson::Null);

        let mut ord = canonical_cmp(left, right);
        if *direction < 0 {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
