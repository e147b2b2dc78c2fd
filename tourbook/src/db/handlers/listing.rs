//! Query-string driven list filters shared by every resource repository.
//!
//! A [`ListFilter`] is parsed from the raw query pairs of a list request against an
//! [`EntitySchema`], which whitelists the wire names that may be filtered or sorted on and maps
//! them to columns. Repositories then splice the filter into their own `QueryBuilder`:
//!
//! ```text
//! ?difficulty=easy&price[lt]=1500&sort=-ratingsAverage,price&fields=name,price&page=2&limit=10
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;
use uuid::Uuid;

/// Number of items returned per page when `limit` is not given.
pub const DEFAULT_LIMIT: i64 = 100;

/// Query keys that control the listing rather than filter it.
const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
    Boolean,
    Timestamp,
    Id,
}

/// A filterable, sortable field: its wire name and the qualified column behind it.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind }
    }
}

/// The list surface of one resource.
#[derive(Debug)]
pub struct EntitySchema {
    /// Base table, used to qualify the default ordering
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("Invalid field: {0}")]
    UnknownField(String),

    #[error("Invalid operator '{operator}' for field {field}")]
    UnknownOperator { field: String, operator: String },

    #[error("Invalid value '{value}' for field {field}")]
    InvalidValue { field: String, value: String },

    #[error("Invalid {0} parameter: must be a positive integer")]
    InvalidPaging(&'static str),
}

impl From<FilterError> for crate::errors::Error {
    fn from(err: FilterError) -> Self {
        crate::errors::Error::BadRequest { message: err.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gte,
    Gt,
    Lte,
    Lt,
}

impl Comparison {
    fn parse(operator: &str) -> Option<Self> {
        match operator {
            "gte" => Some(Self::Gte),
            "gt" => Some(Self::Gt),
            "lte" => Some(Self::Lte),
            "lt" => Some(Self::Lt),
            _ => None,
        }
    }

    fn to_sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Gte => " >= ",
            Self::Gt => " > ",
            Self::Lte => " <= ",
            Self::Lt => " < ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Id(Uuid),
}

impl FilterValue {
    fn parse(kind: FieldKind, raw: &str) -> Option<Self> {
        match kind {
            FieldKind::Text => Some(Self::Text(raw.to_string())),
            FieldKind::Integer => raw.parse().ok().map(Self::Integer),
            FieldKind::Number => raw.parse::<f64>().ok().filter(|n| n.is_finite()).map(Self::Number),
            FieldKind::Boolean => match raw {
                "true" => Some(Self::Boolean(true)),
                "false" => Some(Self::Boolean(false)),
                _ => None,
            },
            FieldKind::Timestamp => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|dt| dt.and_utc())
                })
                .map(Self::Timestamp),
            FieldKind::Id => Uuid::parse_str(raw).ok().map(Self::Id),
        }
    }

    fn push_bind(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Self::Text(v) => qb.push_bind(v.clone()),
            Self::Integer(v) => qb.push_bind(*v),
            Self::Number(v) => qb.push_bind(*v),
            Self::Boolean(v) => qb.push_bind(*v),
            Self::Timestamp(v) => qb.push_bind(*v),
            Self::Id(v) => qb.push_bind(*v),
        };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: &'static str,
    pub comparison: Comparison,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: &'static str,
    pub descending: bool,
}

/// Field selection applied to the serialized entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    fn parse(raw: &str) -> Self {
        let names: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        if names.is_empty() {
            return Self::All;
        }
        if names.iter().all(|n| n.starts_with('-')) {
            Self::Exclude(names.iter().map(|n| n.trim_start_matches('-').to_string()).collect())
        } else {
            Self::Include(names.iter().filter(|n| !n.starts_with('-')).map(|n| n.to_string()).collect())
        }
    }

    /// Apply to a serialized entity. `id` survives every inclusion list.
    pub fn apply(&self, value: Value) -> Value {
        let Value::Object(mut map) = value else {
            return value;
        };
        match self {
            Self::All => {}
            Self::Include(names) => map.retain(|key, _| key == "id" || names.iter().any(|n| n == key)),
            Self::Exclude(names) => map.retain(|key, _| !names.iter().any(|n| n == key)),
        }
        Value::Object(map)
    }
}

/// Parsed list request: filters, ordering, projection and page window.
#[derive(Debug, Clone, PartialEq)]
pub struct ListFilter {
    pub conditions: Vec<Condition>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub page: i64,
    pub limit: i64,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            sort: Vec::new(),
            projection: Projection::All,
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ListFilter {
    /// Parse raw query pairs against a schema.
    pub fn from_query(schema: &EntitySchema, params: &[(String, String)]) -> Result<Self, FilterError> {
        let mut filter = Self::default();

        for (key, raw) in params {
            match key.as_str() {
                "page" => filter.page = parse_positive(raw).ok_or(FilterError::InvalidPaging("page"))?,
                "limit" => filter.limit = parse_positive(raw).ok_or(FilterError::InvalidPaging("limit"))?,
                "sort" => filter.sort = parse_sort(schema, raw)?,
                "fields" => filter.projection = Projection::parse(raw),
                _ => filter.conditions.push(parse_condition(schema, key, raw)?),
            }
        }

        Ok(filter)
    }

    /// Restrict the listing to rows whose column equals `value` (e.g. reviews of one tour).
    pub fn with_prefilter(mut self, column: &'static str, value: FilterValue) -> Self {
        self.conditions.push(Condition {
            column,
            comparison: Comparison::Eq,
            value,
        });
        self
    }

    /// Rows before this page. Saturates, so an absurd page lands past the end instead of overflowing.
    pub fn skip(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Append `AND <condition>` for every condition. The caller has already opened a WHERE clause.
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for condition in &self.conditions {
            qb.push(" AND ");
            qb.push(condition.column);
            qb.push(condition.comparison.to_sql());
            condition.value.push_bind(qb);
        }
    }

    /// Append ORDER BY, LIMIT and OFFSET. Without an explicit sort the newest rows come first.
    pub fn push_order_and_page(&self, schema: &EntitySchema, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" ORDER BY ");
        if self.sort.is_empty() {
            qb.push(format!("{0}.created_at DESC, {0}.rowid DESC", schema.table));
        } else {
            for key in &self.sort {
                qb.push(key.column);
                qb.push(if key.descending { " DESC, " } else { " ASC, " });
            }
            qb.push(format!("{}.rowid ASC", schema.table));
        }
        qb.push(" LIMIT ");
        qb.push_bind(self.limit);
        qb.push(" OFFSET ");
        qb.push_bind(self.skip());
    }
}

fn parse_positive(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|n| *n >= 1)
}

fn parse_sort(schema: &EntitySchema, raw: &str) -> Result<Vec<SortKey>, FilterError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|token| {
            let (name, descending) = match token.strip_prefix('-') {
                Some(name) => (name, true),
                None => (token, false),
            };
            let field = schema.field(name).ok_or_else(|| FilterError::UnknownField(name.to_string()))?;
            Ok(SortKey {
                column: field.column,
                descending,
            })
        })
        .collect()
}

fn parse_condition(schema: &EntitySchema, key: &str, raw: &str) -> Result<Condition, FilterError> {
    let (name, comparison) = match key.split_once('[') {
        Some((name, rest)) => {
            let operator = rest.strip_suffix(']').unwrap_or(rest);
            let comparison = Comparison::parse(operator).ok_or_else(|| FilterError::UnknownOperator {
                field: name.to_string(),
                operator: operator.to_string(),
            })?;
            (name, comparison)
        }
        None => (key, Comparison::Eq),
    };

    if RESERVED_KEYS.contains(&name) {
        return Err(FilterError::UnknownField(key.to_string()));
    }
    let field = schema.field(name).ok_or_else(|| FilterError::UnknownField(name.to_string()))?;

    if field.kind == FieldKind::Boolean && comparison != Comparison::Eq {
        return Err(FilterError::UnknownOperator {
            field: name.to_string(),
            operator: format!("{comparison:?}").to_lowercase(),
        });
    }

    let value = FilterValue::parse(field.kind, raw).ok_or_else(|| FilterError::InvalidValue {
        field: name.to_string(),
        value: raw.to_string(),
    })?;

    Ok(Condition {
        column: field.column,
        comparison,
        value,
    })
}
