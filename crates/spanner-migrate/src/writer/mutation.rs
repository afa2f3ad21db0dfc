//! The unit of data handed to the commit callback.

use crate::convert::ConvertedRow;
use crate::core::value::Value;

/// Insert-or-update of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Mutation {
    pub fn new(table: impl Into<String>, columns: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            table: table.into(),
            columns,
            values,
        }
    }

    /// Approximate serialized size: table and column names plus values.
    pub fn encoded_size(&self) -> usize {
        self.table.len()
            + self.columns.iter().map(String::len).sum::<usize>()
            + self.values.iter().map(Value::encoded_len).sum::<usize>()
    }

    /// Cells written, as counted against the per-commit mutation limit.
    /// A row with no columns still costs one.
    pub fn cell_count(&self) -> usize {
        self.columns.len().max(1)
    }
}

impl From<ConvertedRow> for Mutation {
    fn from(row: ConvertedRow) -> Self {
        Mutation::new(row.table, row.columns, row.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_and_cells() {
        let m = Mutation::new(
            "users",
            vec!["id".into(), "name".into()],
            vec![Value::Int64(1), Value::String("ada".into())],
        );
        assert_eq!(m.encoded_size(), 5 + 6 + 8 + 3);
        assert_eq!(m.cell_count(), 2);
        assert_eq!(Mutation::new("t", vec![], vec![]).cell_count(), 1);
    }
}
