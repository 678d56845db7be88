//! SQL builder scoped to this application's four tables.
//!
//! Clauses and values are tracked together as data and rendered in one pass,
//! so the `?` placeholders in the SQL text and the ordered parameter list can
//! never fall out of step. Values are bound, never interpolated.

use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::query::Query;
use sqlx::Sqlite;

use crate::error::{DataError, Result};

/// An owned value destined for a bound parameter slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// Bind an ordered parameter list onto an sqlx query.
pub fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

#[derive(Debug, Clone, PartialEq)]
enum Verb {
    None,
    Select { columns: Vec<String> },
    Insert { assignments: Vec<(String, SqlValue)> },
    Update { assignments: Vec<(String, SqlValue)> },
    Delete,
}

#[derive(Debug, Clone)]
struct Condition {
    joiner: &'static str,
    column: String,
    operator: String,
    value: Option<SqlValue>,
}

#[derive(Debug, Clone)]
struct Ordering {
    column: String,
    descending: bool,
}

/// Fluent builder producing (SQL with `?` placeholders, ordered values).
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    verb: Verb,
    conditions: Vec<Condition>,
    orderings: Vec<Ordering>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            verb: Verb::None,
            conditions: Vec::new(),
            orderings: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Clear all clauses for reuse against the same table.
    pub fn reset(&mut self) -> &mut Self {
        self.verb = Verb::None;
        self.conditions.clear();
        self.orderings.clear();
        self.limit = None;
        self.offset = None;
        self
    }

    /// `SELECT *` when no columns are given.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.verb = Verb::Select {
            columns: columns.iter().map(|c| c.to_string()).collect(),
        };
        self
    }

    pub fn insert(mut self, assignments: Vec<(&str, SqlValue)>) -> Self {
        self.verb = Verb::Insert {
            assignments: assignments
                .into_iter()
                .map(|(c, v)| (c.to_string(), v))
                .collect(),
        };
        self
    }

    pub fn update(mut self, assignments: Vec<(&str, SqlValue)>) -> Self {
        self.verb = Verb::Update {
            assignments: assignments
                .into_iter()
                .map(|(c, v)| (c.to_string(), v))
                .collect(),
        };
        self
    }

    pub fn delete(mut self) -> Self {
        self.verb = Verb::Delete;
        self
    }

    /// First condition; further calls behave like `and`.
    pub fn where_(self, column: &str, operator: &str, value: impl Into<SqlValue>) -> Self {
        self.condition("AND", column, operator, Some(value.into()))
    }

    pub fn and(self, column: &str, operator: &str, value: impl Into<SqlValue>) -> Self {
        self.condition("AND", column, operator, Some(value.into()))
    }

    pub fn or(self, column: &str, operator: &str, value: impl Into<SqlValue>) -> Self {
        self.condition("OR", column, operator, Some(value.into()))
    }

    /// A complete predicate with no bound value, e.g. `is_active = 1`.
    pub fn where_raw(self, predicate: &str) -> Self {
        self.condition("AND", predicate, "", None)
    }

    fn condition(
        mut self,
        joiner: &'static str,
        column: &str,
        operator: &str,
        value: Option<SqlValue>,
    ) -> Self {
        self.conditions.push(Condition {
            joiner,
            column: column.to_string(),
            operator: operator.to_string(),
            value,
        });
        self
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.orderings.push(Ordering {
            column: column.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn offset(mut self, count: i64) -> Self {
        self.offset = Some(count);
        self
    }

    /// Render the SQL text and the matching ordered parameter list.
    pub fn build(&self) -> Result<(String, Vec<SqlValue>)> {
        let mut sql = String::new();
        let mut params: Vec<SqlValue> = Vec::new();

        match &self.verb {
            Verb::None => {
                return Err(DataError::validation(
                    "query builder has no statement: call select/insert/update/delete first",
                ))
            }
            Verb::Select { columns } => {
                sql.push_str("SELECT ");
                if columns.is_empty() {
                    sql.push('*');
                } else {
                    sql.push_str(&columns.join(", "));
                }
                sql.push_str(" FROM ");
                sql.push_str(&self.table);
            }
            Verb::Insert { assignments } => {
                if assignments.is_empty() {
                    return Err(DataError::validation("insert requires at least one column"));
                }
                let columns: Vec<&str> = assignments.iter().map(|(c, _)| c.as_str()).collect();
                let placeholders = vec!["?"; assignments.len()].join(", ");
                sql.push_str("INSERT INTO ");
                sql.push_str(&self.table);
                sql.push_str(" (");
                sql.push_str(&columns.join(", "));
                sql.push_str(") VALUES (");
                sql.push_str(&placeholders);
                sql.push(')');
                params.extend(assignments.iter().map(|(_, v)| v.clone()));
            }
            Verb::Update { assignments } => {
                if assignments.is_empty() {
                    return Err(DataError::validation("update requires at least one column"));
                }
                sql.push_str("UPDATE ");
                sql.push_str(&self.table);
                sql.push_str(" SET ");
                let set_parts: Vec<String> =
                    assignments.iter().map(|(c, _)| format!("{c} = ?")).collect();
                sql.push_str(&set_parts.join(", "));
                params.extend(assignments.iter().map(|(_, v)| v.clone()));
            }
            Verb::Delete => {
                sql.push_str("DELETE FROM ");
                sql.push_str(&self.table);
            }
        }

        for (i, cond) in self.conditions.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { "" });
            if i > 0 {
                sql.push(' ');
                sql.push_str(cond.joiner);
                sql.push(' ');
            }
            match &cond.value {
                Some(value) => {
                    sql.push_str(&cond.column);
                    sql.push(' ');
                    sql.push_str(&cond.operator);
                    sql.push_str(" ?");
                    params.push(value.clone());
                }
                None => sql.push_str(&cond.column),
            }
        }

        if !self.orderings.is_empty() {
            sql.push_str(" ORDER BY ");
            let parts: Vec<String> = self
                .orderings
                .iter()
                .map(|o| {
                    format!(
                        "{} {}",
                        o.column,
                        if o.descending { "DESC" } else { "ASC" }
                    )
                })
                .collect();
            sql.push_str(&parts.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::Integer(limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(" OFFSET ?");
            params.push(SqlValue::Integer(offset));
        }

        Ok((sql, params))
    }
}

// Re-exported so repository mappers share one row type.
pub type Row = SqliteRow;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_star_with_conditions_and_ordering() {
        let (sql, params) = QueryBuilder::new("atm_transactions")
            .select(&[])
            .where_("atm_id", "=", 3_i64)
            .and("reconciliation_status", "=", "Pending")
            .order_by("transaction_date", true)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM atm_transactions WHERE atm_id = ? AND reconciliation_status = ? \
             ORDER BY transaction_date DESC"
        );
        assert_eq!(
            params,
            vec![SqlValue::Integer(3), SqlValue::Text("Pending".into())]
        );
    }

    #[test]
    fn select_specific_columns() {
        let (sql, params) = QueryBuilder::new("supervisors")
            .select(&["id", "username"])
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT id, username FROM supervisors");
        assert!(params.is_empty());
    }

    #[test]
    fn insert_renders_placeholders_in_column_order() {
        let (sql, params) = QueryBuilder::new("atms")
            .insert(vec![
                ("atm_number", "ATM-0001".into()),
                ("branch_code", "707".into()),
                ("is_active", true.into()),
            ])
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO atms (atm_number, branch_code, is_active) VALUES (?, ?, ?)"
        );
        assert_eq!(params.len(), 3);
        assert_eq!(params[2], SqlValue::Bool(true));
    }

    #[test]
    fn update_keeps_set_params_before_where_params() {
        let (sql, params) = QueryBuilder::new("supervisors")
            .update(vec![("display_name", "New Name".into())])
            .where_("username", "=", "admin")
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE supervisors SET display_name = ? WHERE username = ?"
        );
        assert_eq!(
            params,
            vec![
                SqlValue::Text("New Name".into()),
                SqlValue::Text("admin".into())
            ]
        );
    }

    #[test]
    fn delete_with_raw_predicate() {
        let (sql, params) = QueryBuilder::new("atms")
            .delete()
            .where_("id", "=", 9_i64)
            .build()
            .unwrap();
        assert_eq!(sql, "DELETE FROM atms WHERE id = ?");
        assert_eq!(params, vec![SqlValue::Integer(9)]);

        let (sql, params) = QueryBuilder::new("atms")
            .select(&[])
            .where_raw("is_active = 1")
            .and("branch_code", "=", "707")
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM atms WHERE is_active = 1 AND branch_code = ?"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn limit_and_offset_are_bound_not_interpolated() {
        let (sql, params) = QueryBuilder::new("atm_transactions")
            .select(&[])
            .order_by("created_at", true)
            .limit(10)
            .offset(20)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM atm_transactions ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            params,
            vec![SqlValue::Integer(10), SqlValue::Integer(20)]
        );
    }

    #[test]
    fn placeholder_and_param_counts_always_match() {
        let (sql, params) = QueryBuilder::new("atm_transactions")
            .select(&[])
            .where_("atm_id", "=", 1_i64)
            .or("variance", ">=", 100.0)
            .and("notes", "!=", "skip")
            .limit(5)
            .build()
            .unwrap();
        assert_eq!(sql.matches('?').count(), params.len());
    }

    #[test]
    fn empty_insert_or_update_is_a_validation_error() {
        let err = QueryBuilder::new("atms").insert(vec![]).build().unwrap_err();
        assert!(err.is_validation());
        let err = QueryBuilder::new("atms").update(vec![]).build().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn missing_verb_is_a_validation_error() {
        assert!(QueryBuilder::new("atms").build().is_err());
    }

    #[test]
    fn reset_clears_for_reuse() {
        let mut builder = QueryBuilder::new("supervisors")
            .select(&[])
            .where_("username", "=", "admin");
        builder.reset();
        let (sql, params) = builder.select(&["id"]).build().unwrap();
        assert_eq!(sql, "SELECT id FROM supervisors");
        assert!(params.is_empty());
    }

    #[test]
    fn null_option_binds_as_null() {
        let value: SqlValue = Option::<String>::None.into();
        assert_eq!(value, SqlValue::Null);
        let value: SqlValue = Some(5_i64).into();
        assert_eq!(value, SqlValue::Integer(5));
    }
}
