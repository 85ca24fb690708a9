//! Query model: which runs, which page.
//!
//! A [`Filter`] is an AND-only tree of field predicates. It is plain data
//! (`Eq + Hash`) so a [`Query`] can serve as the identity of a fetch.

use crate::model::Run;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunField {
    Id,
    ParentId,
    RootId,
    FunctionPath,
    Name,
    FutureState,
    CreatedAt,
}

impl RunField {
    pub fn as_str(self) -> &'static str {
        match self {
            RunField::Id => "id",
            RunField::ParentId => "parent_id",
            RunField::RootId => "root_id",
            RunField::FunctionPath => "function_path",
            RunField::Name => "name",
            RunField::FutureState => "future_state",
            RunField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Gt => "gt",
            Comparison::Gte => "gte",
            Comparison::Lt => "lt",
            Comparison::Lte => "lte",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            Comparison::Eq => ord == Ordering::Equal,
            Comparison::Gt => ord == Ordering::Greater,
            Comparison::Gte => ord != Ordering::Less,
            Comparison::Lt => ord == Ordering::Less,
            Comparison::Lte => ord != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    Null,
    Str(String),
    Int(i64),
    Bool(bool),
}

impl FilterValue {
    fn to_json(&self) -> serde_json::Value {
        match self {
            FilterValue::Null => serde_json::Value::Null,
            FilterValue::Str(s) => serde_json::Value::String(s.clone()),
            FilterValue::Int(i) => serde_json::Value::from(*i),
            FilterValue::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Str(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Str(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Int(i)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FilterValue::Null, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    And(Vec<Filter>),
    Predicate {
        field: RunField,
        op: Comparison,
        value: FilterValue,
    },
}

impl Default for Filter {
    fn default() -> Self {
        Filter::all()
    }
}

impl Filter {
    /// Matches every run.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn compare(field: RunField, op: Comparison, value: impl Into<FilterValue>) -> Self {
        Filter::Predicate {
            field,
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: RunField, value: impl Into<FilterValue>) -> Self {
        Self::compare(field, Comparison::Eq, value)
    }

    /// Conjunction with nested ANDs flattened, so `and([and([a]), b]) == and([a, b])`.
    pub fn and(parts: impl IntoIterator<Item = Filter>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Filter::And(inner) => flat.extend(inner),
                p @ Filter::Predicate { .. } => flat.push(p),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Filter::And(flat)
        }
    }

    /// Root runs of one pipeline: `parent_id = null AND function_path = <path>`.
    pub fn root_runs_of(function_path: &str) -> Self {
        Filter::and([
            Filter::eq(RunField::ParentId, FilterValue::Null),
            Filter::eq(RunField::FunctionPath, function_path),
        ])
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::And(parts) if parts.is_empty())
    }

    /// Wire shape: `{"AND": [...]}` / `{"<field>": {"<op>": <value>}}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        match self {
            Filter::And(parts) => {
                map.insert(
                    "AND".to_string(),
                    serde_json::Value::Array(parts.iter().map(Filter::to_json).collect()),
                );
            }
            Filter::Predicate { field, op, value } => {
                let mut cond = serde_json::Map::new();
                cond.insert(op.as_str().to_string(), value.to_json());
                map.insert(field.as_str().to_string(), serde_json::Value::Object(cond));
            }
        }
        serde_json::Value::Object(map)
    }

    /// Client-side evaluation, mirroring the server's semantics for the supported fields.
    pub fn matches(&self, run: &Run) -> bool {
        match self {
            Filter::And(parts) => parts.iter().all(|p| p.matches(run)),
            Filter::Predicate { field, op, value } => predicate_holds(run, *field, *op, value),
        }
    }
}

impl serde::Serialize for Filter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

enum Cell<'a> {
    Null,
    Text(&'a str),
    Time(DateTime<Utc>),
}

fn cell<'a>(run: &'a Run, field: RunField) -> Cell<'a> {
    let opt = |v: &'a Option<String>| v.as_deref().map_or(Cell::Null, Cell::Text);
    match field {
        RunField::Id => Cell::Text(&run.id),
        RunField::ParentId => opt(&run.parent_id),
        RunField::RootId => opt(&run.root_id),
        RunField::FunctionPath => Cell::Text(&run.function_path),
        RunField::Name => Cell::Text(&run.name),
        RunField::FutureState => Cell::Text(run.future_state.as_str()),
        RunField::CreatedAt => run.created_at.map_or(Cell::Null, Cell::Time),
    }
}

fn predicate_holds(run: &Run, field: RunField, op: Comparison, value: &FilterValue) -> bool {
    match (cell(run, field), value) {
        (Cell::Null, FilterValue::Null) => op == Comparison::Eq,
        (Cell::Null, _) | (_, FilterValue::Null) => false,
        (Cell::Text(actual), FilterValue::Str(expected)) => op.holds(actual.cmp(expected.as_str())),
        (Cell::Time(actual), FilterValue::Str(expected)) => expected
            .parse::<DateTime<Utc>>()
            .is_ok_and(|expected| op.holds(actual.cmp(&expected))),
        _ => false,
    }
}

/// One fetch key: filter, 0-based page and page size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    pub filter: Filter,
    pub page: u32,
    pub limit: u32,
}

impl Query {
    /// `limit` is raised to 1 if zero.
    pub fn new(filter: Filter, page: u32, limit: u32) -> Self {
        Self {
            filter,
            page,
            limit: limit.max(1),
        }
    }
}
