//! Criteria: a portable select statement.
//!
//! A [`Criteria`] collects restrictions, an optional projection, ordering
//! and grouping for one table, and renders them for a [`Dialect`]:
//!
//! ```
//! use rdbms_client::{Criteria, Dialect, Order, Projections, Restrictions};
//!
//! let criteria = Criteria::new("job")
//!     .add(Restrictions::equal("valid", 1))
//!     .add(Restrictions::like("title", "Dev%"))
//!     .add_order_by(Order::desc("expire_at"))
//!     .with_projection(Projections::count_all());
//!
//! assert_eq!(
//!     criteria.to_sql(Dialect::MySql),
//!     "select count(*) as `count` from job where valid = 1 and title like 'Dev%' order by expire_at desc"
//! );
//! ```

use rdbms_types::SqlValue;

use crate::dialect::Dialect;
use crate::projection::Projection;

// =============================================================================
// Restrictions
// =============================================================================

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessThanOrEqual,
    /// `>=`
    GreaterThanOrEqual,
    /// `like`
    Like,
}

impl Operator {
    /// SQL spelling.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThanOrEqual => ">=",
            Self::Like => "like",
        }
    }
}

/// One condition of a where clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    /// `column <op> value`
    Compare {
        /// Column name.
        column: String,
        /// Operator.
        op: Operator,
        /// Right-hand side.
        value: SqlValue,
    },
    /// `lower(column) like lower(value)`
    ILike {
        /// Column name.
        column: String,
        /// Pattern.
        pattern: String,
    },
    /// `column is null`
    IsNull(String),
    /// `column is not null`
    IsNotNull(String),
    /// `column in (...)` or `column not in (...)`
    In {
        /// Column name.
        column: String,
        /// Candidates.
        values: Vec<SqlValue>,
        /// Render as `not in`.
        negated: bool,
    },
    /// `column between low and high`
    Between {
        /// Column name.
        column: String,
        /// Lower bound.
        low: SqlValue,
        /// Upper bound.
        high: SqlValue,
    },
    /// `(a or b ...)`
    AnyOf(Vec<Restriction>),
    /// `(a and b ...)`
    AllOf(Vec<Restriction>),
    /// `not (a)`
    Not(Box<Restriction>),
}

impl Restriction {
    /// Render for `dialect`.
    #[must_use]
    pub fn to_sql(&self, dialect: Dialect) -> String {
        match self {
            Self::Compare {
                column,
                op: Operator::Equal,
                value: SqlValue::Null,
            } => format!("{column} is null"),
            Self::Compare {
                column,
                op: Operator::NotEqual,
                value: SqlValue::Null,
            } => format!("{column} is not null"),
            Self::Compare { column, op, value } => {
                format!("{column} {} {}", op.as_sql(), dialect.literal(value))
            }
            Self::ILike { column, pattern } => format!(
                "lower({column}) like lower({})",
                dialect.string_literal(pattern)
            ),
            Self::IsNull(column) => format!("{column} is null"),
            Self::IsNotNull(column) => format!("{column} is not null"),
            Self::In {
                column,
                values,
                negated,
            } => {
                let list = values
                    .iter()
                    .map(|v| dialect.literal(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                let keyword = if *negated { "not in" } else { "in" };
                format!("{column} {keyword} ({list})")
            }
            Self::Between { column, low, high } => format!(
                "{column} between {} and {}",
                dialect.literal(low),
                dialect.literal(high)
            ),
            Self::AnyOf(parts) => format!("({})", join(parts, " or ", dialect)),
            Self::AllOf(parts) => format!("({})", join(parts, " and ", dialect)),
            Self::Not(inner) => format!("not ({})", inner.to_sql(dialect)),
        }
    }
}

fn join(parts: &[Restriction], separator: &str, dialect: Dialect) -> String {
    parts
        .iter()
        .map(|r| r.to_sql(dialect))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Factory for [`Restriction`]s.
#[derive(Debug, Clone, Copy)]
pub struct Restrictions;

impl Restrictions {
    fn compare(column: impl Into<String>, op: Operator, value: impl Into<SqlValue>) -> Restriction {
        Restriction::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// `column = value`, or `column is null` when `value` is NULL.
    pub fn equal(column: impl Into<String>, value: impl Into<SqlValue>) -> Restriction {
        Self::compare(column, Operator::Equal, value)
    }

    /// `column != value`, or `column is not null` when `value` is NULL.
    pub fn not_equal(column: impl Into<String>, value: impl Into<SqlValue>) -> Restriction {
        Self::compare(column, Operator::NotEqual, value)
    }

    /// `column < value`
    pub fn less_than(column: impl Into<String>, value: impl Into<SqlValue>) -> Restriction {
        Self::compare(column, Operator::LessThan, value)
    }

    /// `column > value`
    pub fn greater_than(column: impl Into<String>, value: impl Into<SqlValue>) -> Restriction {
        Self::compare(column, Operator::GreaterThan, value)
    }

    /// `column <= value`
    pub fn less_than_or_equal_to(
        column: impl Into<String>,
        value: impl Into<SqlValue>,
    ) -> Restriction {
        Self::compare(column, Operator::LessThanOrEqual, value)
    }

    /// `column >= value`
    pub fn greater_than_or_equal_to(
        column: impl Into<String>,
        value: impl Into<SqlValue>,
    ) -> Restriction {
        Self::compare(column, Operator::GreaterThanOrEqual, value)
    }

    /// `column like pattern`
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Restriction {
        Self::compare(column, Operator::Like, SqlValue::String(pattern.into()))
    }

    /// Case-insensitive `like`.
    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Restriction {
        Restriction::ILike {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    /// `column is null`
    pub fn is_null(column: impl Into<String>) -> Restriction {
        Restriction::IsNull(column.into())
    }

    /// `column is not null`
    pub fn is_not_null(column: impl Into<String>) -> Restriction {
        Restriction::IsNotNull(column.into())
    }

    /// `column in (values)`
    pub fn in_list<I, V>(column: impl Into<String>, values: I) -> Restriction
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Restriction::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// `column not in (values)`
    pub fn not_in<I, V>(column: impl Into<String>, values: I) -> Restriction
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Restriction::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// `column between low and high`
    pub fn between(
        column: impl Into<String>,
        low: impl Into<SqlValue>,
        high: impl Into<SqlValue>,
    ) -> Restriction {
        Restriction::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    /// Any of the restrictions holds.
    pub fn any_of(parts: impl IntoIterator<Item = Restriction>) -> Restriction {
        Restriction::AnyOf(parts.into_iter().collect())
    }

    /// All of the restrictions hold.
    pub fn all_of(parts: impl IntoIterator<Item = Restriction>) -> Restriction {
        Restriction::AllOf(parts.into_iter().collect())
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Restriction) -> Restriction {
        Restriction::Not(Box::new(inner))
    }
}

// =============================================================================
// Ordering
// =============================================================================

/// Sort direction of one `order by` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    column: String,
    ascending: bool,
}

impl Order {
    /// Ascending by `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    /// Descending by `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }

    /// Render as `column asc|desc`.
    #[must_use]
    pub fn to_sql(&self) -> String {
        format!(
            "{} {}",
            self.column,
            if self.ascending { "asc" } else { "desc" }
        )
    }
}

// =============================================================================
// Criteria
// =============================================================================

/// A select over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    table: String,
    restrictions: Vec<Restriction>,
    projection: Option<Projection>,
    order: Vec<Order>,
    group: Vec<String>,
}

impl Criteria {
    /// Empty criteria selecting from `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            restrictions: Vec::new(),
            projection: None,
            order: Vec::new(),
            group: Vec::new(),
        }
    }

    /// Source table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add a restriction; all restrictions must hold.
    #[must_use]
    pub fn add(mut self, restriction: Restriction) -> Self {
        self.restrictions.push(restriction);
        self
    }

    /// Append an ordering.
    #[must_use]
    pub fn add_order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    /// Append a grouping column.
    #[must_use]
    pub fn add_group_by(mut self, column: impl Into<String>) -> Self {
        self.group.push(column.into());
        self
    }

    /// Replace the projection; `None` selects all columns again.
    pub fn set_projection(&mut self, projection: Option<Projection>) {
        self.projection = projection;
    }

    /// Copy with `projection` set; the receiver is unchanged.
    #[must_use]
    pub fn with_projection(&self, projection: impl Into<Projection>) -> Self {
        let mut copy = self.clone();
        copy.projection = Some(projection.into());
        copy
    }

    /// Whether a projection is set.
    #[must_use]
    pub fn is_projection(&self) -> bool {
        self.projection.is_some()
    }

    /// The projection, if any.
    #[must_use]
    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    /// Restrictions in insertion order.
    #[must_use]
    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    /// Everything after the `from` clause, with a leading space when
    /// non-empty.
    #[must_use]
    pub fn where_clause(&self, dialect: Dialect) -> String {
        let mut sql = String::new();
        if !self.restrictions.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&join(&self.restrictions, " and ", dialect));
        }
        if !self.group.is_empty() {
            sql.push_str(" group by ");
            sql.push_str(&self.group.join(", "));
        }
        if !self.order.is_empty() {
            sql.push_str(" order by ");
            let order: Vec<String> = self.order.iter().map(Order::to_sql).collect();
            sql.push_str(&order.join(", "));
        }
        sql
    }

    /// The full select statement.
    #[must_use]
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let columns = self
            .projection
            .as_ref()
            .map_or_else(|| "*".to_owned(), |p| p.to_sql(dialect));
        format!(
            "select {columns} from {}{}",
            self.table,
            self.where_clause(dialect)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Projections;

    #[test]
    fn test_plain_select() {
        assert_eq!(
            Criteria::new("person").to_sql(Dialect::Sybase),
            "select * from person"
        );
    }

    #[test]
    fn test_restrictions_join_with_and() {
        let c = Criteria::new("person")
            .add(Restrictions::equal("name", "O'Neil"))
            .add(Restrictions::greater_than("age", 30))
            .add(Restrictions::is_not_null("email"));
        assert_eq!(
            c.where_clause(Dialect::Sybase),
            " where name = 'O''Neil' and age > 30 and email is not null"
        );
    }

    #[test]
    fn test_compound_restrictions() {
        let r = Restrictions::any_of([
            Restrictions::in_list("id", [1, 2, 3]),
            Restrictions::not(Restrictions::between("age", 18, 65)),
        ]);
        assert_eq!(
            r.to_sql(Dialect::PostgreSql),
            "(id in (1, 2, 3) or not (age between 18 and 65))"
        );
        assert_eq!(
            Restrictions::all_of([
                Restrictions::ilike("name", "tim%"),
                Restrictions::not_in("id", ["a"]),
            ])
            .to_sql(Dialect::MySql),
            "(lower(name) like lower('tim%') and id not in ('a'))"
        );
    }

    #[test]
    fn test_group_and_order() {
        let c = Criteria::new("job")
            .add_group_by("title")
            .add_order_by(Order::asc("title"))
            .add_order_by(Order::desc("id"))
            .with_projection(Projections::count("id"));
        assert_eq!(
            c.to_sql(Dialect::PostgreSql),
            "select count(id) as \"count_id\" from job group by title order by title asc, id desc"
        );
    }

    #[test]
    fn test_projection_toggles() {
        let mut c = Criteria::new("job");
        assert!(!c.is_projection());

        let projected = c.with_projection(Projections::property("id"));
        assert!(projected.is_projection());
        assert!(!c.is_projection());

        c.set_projection(Some(Projections::max("id")));
        assert!(c.is_projection());
        c.set_projection(None);
        assert!(!c.is_projection());
        assert_eq!(c.to_sql(Dialect::MySql), "select * from job");
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let r = Restrictions::equal("deleted", SqlValue::Null);
        assert_eq!(r.to_sql(Dialect::MsSql), "deleted is null");

        let r = Restrictions::not_equal("deleted", None::<i64>);
        assert_eq!(r.to_sql(Dialect::MySql), "deleted is not null");

        // ordering against NULL keeps the literal
        let r = Restrictions::less_than("deleted", SqlValue::Null);
        assert_eq!(r.to_sql(Dialect::Sybase), "deleted < NULL");
    }
}
