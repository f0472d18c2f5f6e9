//! Predicate expressions for WHERE clauses
//!
//! Supports:
//! - eq, ne (equals, not equals)
//! - lt, lte, gt, gte (comparisons)
//! - like (pattern matching)
//! - in (list membership)
//! - is null / is not null
//! - and / or grouping and raw SQL fragments

use crate::orm::Value;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl Operator {
    /// Convert to SQL operator string
    pub fn to_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
        }
    }
}

/// A WHERE clause expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    IsNull(String),
    NotNull(String),
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    /// Caller-supplied SQL, inserted verbatim.
    Raw(String),
}

impl Criteria {
    fn compare(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Criteria::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Lte, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Gte, value)
    }

    /// LIKE with a caller-supplied pattern (`%` wildcards included as given).
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, Operator::Like, pattern.into())
    }

    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Criteria::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Criteria::IsNull(column.into())
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Criteria::NotNull(column.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Criteria::Raw(sql.into())
    }

    /// All conditions must hold.
    pub fn all(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Criteria::And(criteria.into_iter().collect())
    }

    /// At least one condition must hold.
    pub fn any(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Criteria::Or(criteria.into_iter().collect())
    }

    /// Combine with another condition using AND, flattening nested ANDs.
    pub fn and(self, other: Criteria) -> Self {
        match self {
            Criteria::And(mut items) => {
                items.push(other);
                Criteria::And(items)
            }
            first => Criteria::And(vec![first, other]),
        }
    }

    /// Whether the expression renders to nothing (blank raw SQL).
    pub fn is_empty(&self) -> bool {
        matches!(self, Criteria::Raw(sql) if sql.trim().is_empty())
    }

    /// Render the expression, appending bound values in placeholder order.
    pub fn render(&self, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Criteria::Compare { column, op, value } => {
                sql.push_str(&format!("{} {} ?", column, op.to_sql()));
                binds.push(value.clone());
            }
            Criteria::In { column, values } => {
                if values.is_empty() {
                    sql.push_str("1 = 0");
                    return;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!("{} IN ({})", column, placeholders));
                binds.extend(values.iter().cloned());
            }
            Criteria::IsNull(column) => sql.push_str(&format!("{} IS NULL", column)),
            Criteria::NotNull(column) => sql.push_str(&format!("{} IS NOT NULL", column)),
            Criteria::And(items) => render_group(items, " AND ", "1 = 1", sql, binds),
            Criteria::Or(items) => render_group(items, " OR ", "1 = 0", sql, binds),
            Criteria::Raw(raw) => sql.push_str(raw.trim()),
        }
    }
}

fn render_group(
    items: &[Criteria],
    separator: &str,
    empty: &str,
    sql: &mut String,
    binds: &mut Vec<Value>,
) {
    let items: Vec<&Criteria> = items.iter().filter(|c| !c.is_empty()).collect();
    if items.is_empty() {
        sql.push_str(empty);
        return;
    }

    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            sql.push_str(separator);
        }
        sql.push('(');
        item.render(sql, binds);
        sql.push(')');
    }
}
