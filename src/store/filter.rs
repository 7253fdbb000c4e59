//! 过滤链求值
//!
//! 按顺序对候选对象执行 filter / exclude / 聚合 / 排序 / 切片操作。
//! 键的形式为 `path[__lookup]`，路径中的关系名以 `__` 相连。

use super::memory::StoreState;
use crate::error::{Error, Result};
use crate::query::{FilterMethod, FilterOp};
use crate::types::{ObjectId, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// 支持的字段查找
pub const LOOKUPS: &[&str] = &[
    "exact",
    "iexact",
    "contains",
    "icontains",
    "startswith",
    "istartswith",
    "endswith",
    "iendswith",
    "gt",
    "gte",
    "lt",
    "lte",
    "in",
    "isnull",
];

/// 候选对象及其聚合注解
struct Candidate {
    id: ObjectId,
    annotations: HashMap<String, Value>,
}

/// 排序键：路径与是否降序
struct OrderKey {
    path: String,
    descending: bool,
}

impl OrderKey {
    fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(path) => Self {
                path: path.to_string(),
                descending: true,
            },
            None => Self {
                path: spec.to_string(),
                descending: false,
            },
        }
    }
}

/// 过滤链求值器
pub(crate) struct FilterChain<'a> {
    state: &'a StoreState,
    model: &'a str,
}

impl<'a> FilterChain<'a> {
    pub(crate) fn new(state: &'a StoreState, model: &'a str) -> Self {
        Self { state, model }
    }

    /// 对 `ids` 依次执行 `filters`，返回保留的对象（保持结果顺序）
    pub(crate) fn apply(&self, ids: Vec<ObjectId>, filters: &[FilterOp]) -> Result<Vec<ObjectId>> {
        let mut candidates: Vec<Candidate> = ids
            .into_iter()
            .map(|id| Candidate {
                id,
                annotations: HashMap::new(),
            })
            .collect();
        let mut order = OrderKey::parse("id");

        for op in filters {
            candidates = match op.method {
                FilterMethod::Filter | FilterMethod::Exclude => {
                    let keep_matching = op.method == FilterMethod::Filter;
                    let kwargs = self.kwargs(op)?;
                    let mut kept = Vec::with_capacity(candidates.len());
                    for c in candidates {
                        if self.matches_all(&c, kwargs)? == keep_matching {
                            kept.push(c);
                        }
                    }
                    kept
                }
                FilterMethod::Count
                | FilterMethod::Sum
                | FilterMethod::Avg
                | FilterMethod::Min
                | FilterMethod::Max => {
                    let path = self.field(op)?;
                    let key = format!("{}__{}", path, op.method);
                    for c in candidates.iter_mut() {
                        let values = self.values(c, path)?;
                        c.annotations.insert(key.clone(), aggregate(op.method, values));
                    }
                    candidates
                }
                FilterMethod::Order => {
                    order = OrderKey::parse(self.field(op)?);
                    self.sorted(candidates, &order, false)?
                }
                FilterMethod::Start => candidates.into_iter().skip(self.count(op)?).collect(),
                FilterMethod::Limit => candidates.into_iter().take(self.count(op)?).collect(),
                FilterMethod::First => {
                    let n = self.count(op)?;
                    self.sorted(candidates, &order, false)?.into_iter().take(n).collect()
                }
                FilterMethod::Last => {
                    let n = self.count(op)?;
                    self.sorted(candidates, &order, true)?.into_iter().take(n).collect()
                }
            };
        }

        Ok(candidates.into_iter().map(|c| c.id).collect())
    }

    fn kwargs<'f>(&self, op: &'f FilterOp) -> Result<&'f [(String, Value)]> {
        op.kwargs().ok_or_else(|| self.bad_args(op))
    }

    fn field<'f>(&self, op: &'f FilterOp) -> Result<&'f str> {
        op.field_arg().ok_or_else(|| self.bad_args(op))
    }

    fn count(&self, op: &FilterOp) -> Result<usize> {
        op.count_arg().ok_or_else(|| self.bad_args(op))
    }

    fn bad_args(&self, op: &FilterOp) -> Error {
        Error::Provider(format!("invalid arguments for {} on {}", op, self.model))
    }

    fn matches_all(&self, c: &Candidate, kwargs: &[(String, Value)]) -> Result<bool> {
        for (key, expected) in kwargs {
            let (path, lookup) = split_lookup(key);
            let values = self.values(c, path)?;
            if !matches(lookup, &values, expected)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 路径的所有取值；注解优先于字段
    fn values(&self, c: &Candidate, path: &str) -> Result<Vec<Value>> {
        if let Some(v) = c.annotations.get(path) {
            return Ok(vec![v.clone()]);
        }
        let segments: Vec<&str> = path.split("__").collect();
        self.path_values(self.model, c.id, &segments)
    }

    fn path_values(&self, model: &str, id: ObjectId, segments: &[&str]) -> Result<Vec<Value>> {
        let (head, rest) = match segments.split_first() {
            Some(split) => split,
            None => return Ok(vec![Value::from(id)]),
        };

        if *head == "id" || *head == "pk" {
            if rest.is_empty() {
                return Ok(vec![Value::from(id)]);
            }
        } else if let Some(rel) = self.state.relation(model, head) {
            let mut values = Vec::new();
            for related in rel.related(id) {
                values.extend(self.path_values(&rel.target, related, rest)?);
            }
            return Ok(values);
        } else if rest.is_empty() {
            if let Some(table) = self.state.table(model) {
                if table.has_column(head) {
                    let value = table
                        .records
                        .get(&id)
                        .and_then(|r| r.get(head))
                        .cloned()
                        .unwrap_or(Value::Null);
                    return Ok(vec![value]);
                }
            }
        }

        Err(Error::Provider(format!(
            "cannot resolve keyword '{}' into field of {}",
            segments.join("__"),
            model
        )))
    }

    fn sorted(&self, candidates: Vec<Candidate>, order: &OrderKey, reverse: bool) -> Result<Vec<Candidate>> {
        let mut keyed = Vec::with_capacity(candidates.len());
        for c in candidates {
            let key = self.values(&c, &order.path)?.into_iter().next().unwrap_or(Value::Null);
            keyed.push((key, c));
        }
        let descending = order.descending != reverse;
        keyed.sort_by(|(a, _), (b, _)| {
            let ord = compare_keys(a, b);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(keyed.into_iter().map(|(_, c)| c).collect())
    }
}

/// 空值排在最前
fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

/// 拆分 `path__lookup`；没有查找后缀时为 `exact`
fn split_lookup(key: &str) -> (&str, &str) {
    match key.rsplit_once("__") {
        Some((path, lookup)) if LOOKUPS.contains(&lookup) => (path, lookup),
        _ => (key, "exact"),
    }
}

/// 任一取值满足查找即匹配
fn matches(lookup: &str, values: &[Value], expected: &Value) -> Result<bool> {
    if lookup == "isnull" {
        let want = expected
            .as_bool()
            .ok_or_else(|| Error::Provider(format!("isnull expects a boolean, got {}", expected)))?;
        let is_null = values.iter().all(Value::is_null);
        return Ok(is_null == want);
    }
    if lookup == "in" {
        let options = match expected {
            Value::List(items) => items,
            other => return Err(Error::Provider(format!("in expects a list, got {}", other))),
        };
        return Ok(values
            .iter()
            .any(|v| options.iter().any(|o| v.loosely_equals(o))));
    }
    Ok(values.iter().any(|v| matches_one(lookup, v, expected)))
}

fn matches_one(lookup: &str, value: &Value, expected: &Value) -> bool {
    if lookup == "exact" {
        return match (value, expected) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => value.loosely_equals(expected),
        };
    }
    let ord = value.compare(expected);
    match lookup {
        "gt" => ord == Some(Ordering::Greater),
        "gte" => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        "lt" => ord == Some(Ordering::Less),
        "lte" => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        _ => {
            let (Some(text), Some(pattern)) = (value.as_str(), expected.as_str()) else {
                return false;
            };
            let insensitive = lookup.starts_with('i');
            let (text, pattern) = if insensitive {
                (text.to_lowercase(), pattern.to_lowercase())
            } else {
                (text.to_string(), pattern.to_string())
            };
            match lookup.trim_start_matches('i') {
                "exact" => text == pattern,
                "contains" => text.contains(&pattern),
                "startswith" => text.starts_with(&pattern),
                "endswith" => text.ends_with(&pattern),
                _ => false,
            }
        }
    }
}

fn aggregate(method: FilterMethod, values: Vec<Value>) -> Value {
    let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    match method {
        FilterMethod::Count => Value::Int(values.len() as i64),
        FilterMethod::Sum | FilterMethod::Avg => {
            if values.is_empty() {
                return Value::Null;
            }
            let all_ints = values.iter().all(|v| matches!(v, Value::Int(_)));
            let total: f64 = values.iter().filter_map(Value::as_f64).sum();
            match method {
                FilterMethod::Sum if all_ints => {
                    Value::Int(values.iter().filter_map(Value::as_i64).sum())
                }
                FilterMethod::Sum => Value::Float(total),
                _ => Value::Float(total / values.len() as f64),
            }
        }
        _ => {
            let want = if method == FilterMethod::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            values
                .into_iter()
                .reduce(|best, v| if v.compare(&best) == Some(want) { v } else { best })
                .unwrap_or(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lookup() {
        assert_eq!(split_lookup("headline"), ("headline", "exact"));
        assert_eq!(split_lookup("headline__icontains"), ("headline", "icontains"));
        assert_eq!(split_lookup("authors__count__gt"), ("authors__count", "gt"));
        assert_eq!(split_lookup("blog__name"), ("blog__name", "exact"));
    }

    #[test]
    fn test_string_lookups() {
        let v = Value::from("Graph Queries");
        assert!(matches_one("icontains", &v, &Value::from("graph")));
        assert!(!matches_one("contains", &v, &Value::from("graph")));
        assert!(matches_one("startswith", &v, &Value::from("Graph")));
        assert!(matches_one("iendswith", &v, &Value::from("QUERIES")));
        assert!(matches_one("iexact", &v, &Value::from("graph queries")));
        assert!(!matches_one("icontains", &Value::Int(3), &Value::from("3")));
    }

    #[test]
    fn test_comparison_lookups() {
        assert!(matches_one("gt", &Value::Int(5), &Value::Float(4.5)));
        assert!(matches_one("lte", &Value::Int(5), &Value::Int(5)));
        assert!(!matches_one("lt", &Value::from("abc"), &Value::Int(5)));
        assert!(matches_one(
            "gte",
            &Value::from("2014-08-22 10:00:00"),
            &Value::DateTime(crate::types::parse_datetime("2014-08-20").unwrap())
        ));
    }

    #[test]
    fn test_multi_value_lookups() {
        let values = vec![Value::Int(1), Value::Int(3)];
        assert!(matches("exact", &values, &Value::Int(3)).unwrap());
        assert!(matches("in", &values, &Value::from(vec![2, 3])).unwrap());
        assert!(!matches("in", &values, &Value::from(vec![2])).unwrap());
        assert!(matches("isnull", &[], &Value::Bool(true)).unwrap());
        assert!(matches("isnull", &[Value::Null], &Value::Bool(true)).unwrap());
        assert!(!matches("isnull", &values, &Value::Bool(true)).unwrap());
        assert!(matches("in", &values, &Value::Int(1)).is_err());
    }

    #[test]
    fn test_aggregates() {
        let values = || vec![Value::Int(2), Value::Null, Value::Int(7), Value::Int(3)];
        assert_eq!(aggregate(FilterMethod::Count, values()), Value::Int(3));
        assert_eq!(aggregate(FilterMethod::Sum, values()), Value::Int(12));
        assert_eq!(aggregate(FilterMethod::Avg, values()), Value::Float(4.0));
        assert_eq!(aggregate(FilterMethod::Min, values()), Value::Int(2));
        assert_eq!(aggregate(FilterMethod::Max, values()), Value::Int(7));
        assert_eq!(aggregate(FilterMethod::Sum, vec![]), Value::Null);
    }
}
