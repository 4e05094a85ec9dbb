//! Projections: what a criteria query selects.
//!
//! ```
//! use rdbms_client::{Dialect, Projections};
//!
//! let p = Projections::count("job_id");
//! assert_eq!(p.to_sql(Dialect::MySql), "count(job_id) as `count_job_id`");
//!
//! let list = Projections::list()
//!     .add(Projections::property("name"))
//!     .add_as(Projections::max("salary"), "top");
//! assert_eq!(list.to_sql(Dialect::PostgreSql), "name, max(salary) as \"top\"");
//! ```

use std::fmt;

use crate::dialect::Dialect;

/// Aggregate functions without a default alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// `avg(column)`
    Avg,
    /// `sum(column)`
    Sum,
    /// `min(column)`
    Min,
    /// `max(column)`
    Max,
}

impl Aggregate {
    fn name(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// A projected expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `count(*)` or `count(column)`.
    Count {
        /// Counted column; `None` counts rows.
        column: Option<String>,
        /// Explicit alias.
        alias: Option<String>,
    },
    /// An aggregate over one column.
    Aggregate {
        /// Function.
        function: Aggregate,
        /// Aggregated column.
        column: String,
        /// Explicit alias.
        alias: Option<String>,
    },
    /// A plain column.
    Property {
        /// Column name.
        column: String,
        /// Explicit alias.
        alias: Option<String>,
    },
    /// Several projections separated by commas.
    List(ProjectionList),
}

impl Projection {
    /// Copy with an explicit alias.
    ///
    /// Has no effect on a list; alias its entries instead.
    #[must_use]
    pub fn alias(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Self::Count { alias, .. }
            | Self::Aggregate { alias, .. }
            | Self::Property { alias, .. } => *alias = Some(name.into()),
            Self::List(_) => {}
        }
        self
    }

    /// The expression without any alias.
    #[must_use]
    pub fn expression(&self, dialect: Dialect) -> String {
        match self {
            Self::Count { column, .. } => {
                format!("count({})", column.as_deref().unwrap_or("*"))
            }
            Self::Aggregate {
                function, column, ..
            } => format!("{}({column})", function.name()),
            Self::Property { column, .. } => column.clone(),
            Self::List(list) => list.to_sql(dialect),
        }
    }

    /// Alias to render: the explicit one, else the default for counts.
    #[must_use]
    pub fn effective_alias(&self) -> Option<String> {
        match self {
            Self::Count { alias: Some(a), .. }
            | Self::Aggregate { alias: Some(a), .. }
            | Self::Property { alias: Some(a), .. } => Some(a.clone()),
            Self::Count { column: None, .. } => Some("count".to_owned()),
            Self::Count {
                column: Some(column),
                ..
            } => Some(format!("count_{column}")),
            _ => None,
        }
    }

    /// Render as a select list fragment.
    #[must_use]
    pub fn to_sql(&self, dialect: Dialect) -> String {
        render(self, self.effective_alias().as_deref(), dialect)
    }
}

fn render(projection: &Projection, alias: Option<&str>, dialect: Dialect) -> String {
    let expression = projection.expression(dialect);
    match alias {
        Some(alias) => format!("{expression} as {}", dialect.quote_alias(alias)),
        None => expression,
    }
}

/// An ordered list of projections, each optionally aliased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionList {
    entries: Vec<(Projection, Option<String>)>,
}

impl ProjectionList {
    /// Append a projection with its own alias, if any.
    #[must_use]
    pub fn add(mut self, projection: Projection) -> Self {
        self.entries.push((projection, None));
        self
    }

    /// Append a projection under `alias`.
    #[must_use]
    pub fn add_as(mut self, projection: Projection, alias: impl Into<String>) -> Self {
        self.entries.push((projection, Some(alias.into())));
        self
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the entries joined by `, `.
    #[must_use]
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.entries
            .iter()
            .map(|(projection, alias)| {
                let alias = alias.clone().or_else(|| projection.effective_alias());
                render(projection, alias.as_deref(), dialect)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<ProjectionList> for Projection {
    fn from(list: ProjectionList) -> Self {
        Self::List(list)
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression(Dialect::Sybase))
    }
}

/// Factory for [`Projection`]s.
#[derive(Debug, Clone, Copy)]
pub struct Projections;

impl Projections {
    /// `count(*) as <q>count<q>`
    #[must_use]
    pub fn count_all() -> Projection {
        Projection::Count {
            column: None,
            alias: None,
        }
    }

    /// `count(column) as <q>count_column<q>`
    #[must_use]
    pub fn count(column: impl Into<String>) -> Projection {
        Projection::Count {
            column: Some(column.into()),
            alias: None,
        }
    }

    /// `avg(column)`
    #[must_use]
    pub fn avg(column: impl Into<String>) -> Projection {
        Self::aggregate(Aggregate::Avg, column)
    }

    /// `sum(column)`
    #[must_use]
    pub fn sum(column: impl Into<String>) -> Projection {
        Self::aggregate(Aggregate::Sum, column)
    }

    /// `min(column)`
    #[must_use]
    pub fn min(column: impl Into<String>) -> Projection {
        Self::aggregate(Aggregate::Min, column)
    }

    /// `max(column)`
    #[must_use]
    pub fn max(column: impl Into<String>) -> Projection {
        Self::aggregate(Aggregate::Max, column)
    }

    /// The column itself.
    #[must_use]
    pub fn property(column: impl Into<String>) -> Projection {
        Projection::Property {
            column: column.into(),
            alias: None,
        }
    }

    /// An empty projection list.
    #[must_use]
    pub fn list() -> ProjectionList {
        ProjectionList::default()
    }

    fn aggregate(function: Aggregate, column: impl Into<String>) -> Projection {
        Projection::Aggregate {
            function,
            column: column.into(),
            alias: None,
        }
    }
}
