//! SQL query intent
//!
//! A `Query` records what the ORM wants done (select/insert/update/delete,
//! target table, columns, values, predicate, join, ordering, paging) and
//! renders it as parameterized SQL with positional `?` placeholders. The
//! adapter decides how to execute it.

use super::criteria::Criteria;
use crate::orm::Value;

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Order direction for sorting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending (A-Z, 0-9, oldest-newest)
    #[default]
    Asc,
    /// Descending (Z-A, 9-0, newest-oldest)
    Desc,
}

impl SortDirection {
    /// Convert to SQL order string
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: SortDirection,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn to_sql(&self) -> String {
        order_by_clause(&self.column, self.direction)
    }
}

/// A bare column name orders ascending.
impl From<&str> for Order {
    fn from(column: &str) -> Self {
        Order::asc(column)
    }
}

/// Helper to add simple order by without constructing the full Order type
pub fn order_by_clause(field: &str, direction: SortDirection) -> String {
    format!("{} {}", field, direction.to_sql())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub on: String,
}

/// Chainable description of one SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    kind: QueryKind,
    table: String,
    columns: Vec<String>,
    assignments: Vec<(String, Value)>,
    criteria: Option<Criteria>,
    joins: Vec<Join>,
    order_by: Vec<Order>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Query {
    fn new(kind: QueryKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            columns: Vec::new(),
            assignments: Vec::new(),
            criteria: None,
            joins: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn select(table: impl Into<String>) -> Self {
        Self::new(QueryKind::Select, table)
    }

    pub fn insert(table: impl Into<String>) -> Self {
        Self::new(QueryKind::Insert, table)
    }

    pub fn update(table: impl Into<String>) -> Self {
        Self::new(QueryKind::Update, table)
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(QueryKind::Delete, table)
    }

    /// Add a selected column or expression (e.g. `"*"`, `"COUNT(*) AS total"`).
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Set a column value for INSERT/UPDATE.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    /// Add a predicate. Repeated calls are combined with AND.
    pub fn filter(mut self, criteria: Criteria) -> Self {
        if criteria.is_empty() {
            return self;
        }
        self.criteria = Some(match self.criteria.take() {
            Some(existing) => existing.and(criteria),
            None => criteria,
        });
        self
    }

    pub fn filter_opt(self, criteria: Option<Criteria>) -> Self {
        match criteria {
            Some(criteria) => self.filter(criteria),
            None => self,
        }
    }

    pub fn join(mut self, kind: JoinKind, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins.push(Join {
            kind,
            table: table.into(),
            on: on.into(),
        });
        self
    }

    pub fn order_by(mut self, order: impl Into<Order>) -> Self {
        self.order_by.push(order.into());
        self
    }

    /// Set limit directly.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set offset directly.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn assignments(&self) -> &[(String, Value)] {
        &self.assignments
    }

    pub fn criteria(&self) -> Option<&Criteria> {
        self.criteria.as_ref()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn get_limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn get_offset(&self) -> Option<i64> {
        self.offset
    }

    /// Build the SQL string and the values to bind, in placeholder order.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut binds = Vec::new();
        let sql = match self.kind {
            QueryKind::Select => self.build_select(&mut binds),
            QueryKind::Insert => self.build_insert(&mut binds),
            QueryKind::Update => self.build_update(&mut binds),
            QueryKind::Delete => {
                let mut sql = format!("DELETE FROM {}", self.table);
                self.push_where(&mut sql, &mut binds);
                sql
            }
        };
        (sql, binds)
    }

    fn build_select(&self, binds: &mut Vec<Value>) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, self.table);

        for join in &self.joins {
            sql.push_str(&format!(" {} {} ON {}", join.kind.to_sql(), join.table, join.on));
        }

        self.push_where(&mut sql, binds);

        if !self.order_by.is_empty() {
            let terms: Vec<String> = self.order_by.iter().map(Order::to_sql).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(offset)) if offset > 0 => sql.push_str(" LIMIT -1"),
            _ => {}
        }

        if let Some(offset) = self.offset {
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        sql
    }

    fn build_insert(&self, binds: &mut Vec<Value>) -> String {
        if self.assignments.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", self.table);
        }

        let columns: Vec<&str> = self.assignments.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        binds.extend(self.assignments.iter().map(|(_, v)| v.clone()));

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders
        )
    }

    fn build_update(&self, binds: &mut Vec<Value>) -> String {
        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect();
        binds.extend(self.assignments.iter().map(|(_, v)| v.clone()));

        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        self.push_where(&mut sql, binds);
        sql
    }

    fn push_where(&self, sql: &mut String, binds: &mut Vec<Value>) {
        if let Some(ref criteria) = self.criteria {
            sql.push_str(" WHERE ");
            criteria.render(sql, binds);
        }
    }
}
