//! Column-ordered row tables returned to collaborators.

use serde::{Deserialize, Serialize};

use crate::Value;

/// One fixed-arity result row; values line up with the table's columns.
pub type Row = Vec<Value>;

/// A column-ordered table of query results.
///
/// Columns are named by the requested fields, in the requested order, and
/// every row has exactly one value per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowTable {
    /// Column names, in request order.
    pub columns: Vec<String>,
    /// Result rows; each row's arity matches `columns`.
    pub rows: Vec<Row>,
}

impl RowTable {
    /// Create a table with the given columns and no rows.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a table with columns and rows.
    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find the index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index() {
        let table = RowTable::new(vec!["date".into(), "medium".into()]);
        assert_eq!(table.column_index("medium"), Some(1));
        assert_eq!(table.column_index("headline"), None);
    }

    #[test]
    fn test_json_round_trip() {
        let table = RowTable::with_rows(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Int64(1), Value::String("nrc".into())],
                vec![Value::Int64(2), Value::Null],
            ],
        );

        let json = serde_json::to_string(&table).unwrap();
        let back: RowTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
