use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::{CollectionPath, DocumentSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    In,
    Lt,
    Lte,
    Gt,
    Gte,
    ArrayContains,
    ArrayContainsAny,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// 查询构建器
///
/// Filters combine with AND. Documents missing a filtered or ordered field
/// never match.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Vec<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    fn filter(mut self, field: &str, op: Operator, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value,
        });
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Eq, value.into())
    }

    pub fn where_in(self, field: &str, values: Vec<Value>) -> Self {
        self.filter(field, Operator::In, Value::Array(values))
    }

    pub fn where_lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Lt, value.into())
    }

    pub fn where_lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Lte, value.into())
    }

    pub fn where_gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Gt, value.into())
    }

    pub fn where_gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::Gte, value.into())
    }

    pub fn where_array_contains(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, Operator::ArrayContains, value.into())
    }

    pub fn where_array_contains_any(self, field: &str, values: Vec<Value>) -> Self {
        self.filter(field, Operator::ArrayContainsAny, Value::Array(values))
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        self.filters.iter().all(|f| filter_matches(f, data))
            && self.order_by.iter().all(|(field, _)| data.contains_key(field))
    }

    /// Filters, orders and truncates a candidate set drawn from the collection.
    pub fn apply(&self, mut docs: Vec<DocumentSnapshot>) -> Vec<DocumentSnapshot> {
        docs.retain(|d| self.matches(&d.data));
        docs.sort_by(|a, b| {
            for (field, direction) in &self.order_by {
                let ord = match (a.data.get(field), b.data.get(field)) {
                    (Some(x), Some(y)) => compare_values(x, y),
                    _ => Ordering::Equal,
                };
                let ord = match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.id().cmp(b.id())
        });
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn filter_matches(filter: &Filter, data: &Map<String, Value>) -> bool {
    let Some(actual) = data.get(&filter.field) else {
        return false;
    };
    match filter.op {
        Operator::Eq => compare_values(actual, &filter.value) == Ordering::Equal,
        Operator::In => match &filter.value {
            Value::Array(candidates) => candidates
                .iter()
                .any(|c| compare_values(actual, c) == Ordering::Equal),
            _ => false,
        },
        Operator::Lt => same_kind(actual, &filter.value) && compare_values(actual, &filter.value) == Ordering::Less,
        Operator::Lte => same_kind(actual, &filter.value) && compare_values(actual, &filter.value) != Ordering::Greater,
        Operator::Gt => same_kind(actual, &filter.value) && compare_values(actual, &filter.value) == Ordering::Greater,
        Operator::Gte => same_kind(actual, &filter.value) && compare_values(actual, &filter.value) != Ordering::Less,
        Operator::ArrayContains => match actual {
            Value::Array(items) => items
                .iter()
                .any(|item| compare_values(item, &filter.value) == Ordering::Equal),
            _ => false,
        },
        Operator::ArrayContainsAny => match (actual, &filter.value) {
            (Value::Array(items), Value::Array(candidates)) => items.iter().any(|item| {
                candidates
                    .iter()
                    .any(|c| compare_values(item, c) == Ordering::Equal)
            }),
            _ => false,
        },
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

// 范围过滤只匹配同类型的值
fn same_kind(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(0.0);
                let y = y.as_f64().unwrap_or(0.0);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
