#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! SQL composition for the air-quality aggregation queries.
//!
//! [`QueryBuilder`] only accepts three kinds of text: `'static` SQL written
//! in this crate, [`SqlToken`]s from closed enums, and operator-configured
//! [`Identifier`]s. Everything a client sends ends up in a [`SqlValue`]
//! bound to a positional `$n` slot, so a literal can never change the shape
//! of the statement.

pub mod aggregation;

use std::borrow::Cow;
use std::sync::LazyLock;

use airquality_measurement_models::{MeasurementVariable, StatisticalAggregate, TimeStep};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

pub use aggregation::{TableConfig, measurements_query, station_ids_query, timeseries_query};

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .unwrap_or_else(|_| unreachable!())
});

/// Errors that can occur while preparing a query.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    /// A configured table or column name is not a plain SQL identifier.
    #[error("Invalid SQL identifier: {name:?}")]
    InvalidIdentifier {
        /// The rejected name.
        name: String,
    },
}

/// A table or column name, optionally schema-qualified
/// (`schema.table`), checked to contain no quoting or punctuation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Cow<'static, str>);

impl Identifier {
    /// Validates a runtime-supplied name.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidIdentifier`] if `name` is not of the form
    /// `name` or `schema.name` made of ASCII letters, digits and `_`.
    pub fn new(name: impl Into<String>) -> Result<Self, QueryError> {
        let name = name.into();
        if IDENTIFIER_RE.is_match(&name) {
            Ok(Self(Cow::Owned(name)))
        } else {
            Err(QueryError::InvalidIdentifier { name })
        }
    }

    /// Wraps a compile-time constant name.
    #[must_use]
    pub fn from_static(name: &'static str) -> Self {
        debug_assert!(IDENTIFIER_RE.is_match(name), "bad identifier {name:?}");
        Self(Cow::Borrowed(name))
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value from a closed set that may be written straight into query text.
pub trait SqlToken {
    /// The exact SQL text of this token.
    fn sql_token(&self) -> &'static str;
}

impl SqlToken for MeasurementVariable {
    fn sql_token(&self) -> &'static str {
        match self {
            Self::So2 => "so2",
            Self::No2 => "no2",
            Self::Co => "co",
            Self::O3 => "o3",
            Self::Pm10 => "pm10",
            Self::Pm25 => "pm2_5",
        }
    }
}

impl SqlToken for StatisticalAggregate {
    fn sql_token(&self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Max => "max",
            Self::Min => "min",
            Self::Sum => "sum",
            Self::Count => "count",
        }
    }
}

impl SqlToken for TimeStep {
    fn sql_token(&self) -> &'static str {
        match self {
            Self::Hour => "'hour'",
            Self::Day => "'day'",
            Self::Week => "'week'",
        }
    }
}

/// A literal bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// An instant compared against the measurement timestamp column.
    Timestamp(DateTime<Utc>),
    /// Free text (station ids).
    Text(String),
    /// `GeoJSON` geometry text passed to `ST_GeomFromGeoJSON`.
    GeoJson(String),
}

impl SqlValue {
    /// Encodes the value as a SQL literal.
    ///
    /// Single quotes are doubled, which is the only escaping a standard
    /// conforming string literal needs.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Self::Timestamp(instant) => {
                format!(
                    "'{}'::timestamptz",
                    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
                )
            }
            Self::Text(text) | Self::GeoJson(text) => quote_literal(text),
        }
    }
}

fn quote_literal(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        if c == '\'' {
            quoted.push('\'');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Fragment {
    Sql(Cow<'static, str>),
    Param(usize),
}

/// Incrementally assembles a [`SqlQuery`].
#[derive(Debug, Default)]
pub struct QueryBuilder {
    fragments: Vec<Fragment>,
    params: Vec<SqlValue>,
}

impl QueryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends fixed SQL text.
    pub fn sql(&mut self, sql: &'static str) -> &mut Self {
        self.fragments.push(Fragment::Sql(Cow::Borrowed(sql)));
        self
    }

    /// Appends a closed-set token.
    pub fn token<T: SqlToken>(&mut self, token: &T) -> &mut Self {
        self.sql(token.sql_token())
    }

    /// Appends a configured identifier.
    pub fn ident(&mut self, ident: &Identifier) -> &mut Self {
        self.fragments.push(Fragment::Sql(ident.0.clone()));
        self
    }

    /// Binds `value` to the next placeholder and appends that placeholder.
    pub fn bind(&mut self, value: SqlValue) -> &mut Self {
        self.params.push(value);
        self.fragments.push(Fragment::Param(self.params.len()));
        self
    }

    /// Binds each value, separated by `", "`.
    pub fn bind_list(&mut self, values: impl IntoIterator<Item = SqlValue>) -> &mut Self {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.sql(", ");
            }
            self.bind(value);
        }
        self
    }

    #[must_use]
    pub fn build(self) -> SqlQuery {
        SqlQuery {
            fragments: self.fragments,
            params: self.params,
        }
    }
}

/// A composed statement: SQL text with positional placeholders plus the
/// values bound to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    fragments: Vec<Fragment>,
    params: Vec<SqlValue>,
}

impl SqlQuery {
    /// The statement with `$1`, `$2`, ... placeholders.
    #[must_use]
    pub fn text(&self) -> String {
        self.render(|index, _| format!("${index}"))
    }

    /// Values bound to the placeholders, `$1` first.
    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// The statement with every placeholder replaced by its escaped literal,
    /// for endpoints that only accept a single query string.
    #[must_use]
    pub fn to_inline_sql(&self) -> String {
        self.render(|_, value| value.to_literal())
    }

    fn render(&self, mut param: impl FnMut(usize, &SqlValue) -> String) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Sql(sql) => out.push_str(sql),
                Fragment::Param(index) => {
                    out.push_str(&param(*index, &self.params[index - 1]));
                }
            }
        }
        out
    }
}
