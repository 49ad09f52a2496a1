//! Query result types.
//!
//! Results are kept in the text format the simple query protocol returns;
//! converting values into host types is the binding layer's job.

/// A result column.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Type OID.
    pub type_oid: u32,
}

impl Column {
    /// Create a new column.
    pub fn new(name: impl Into<String>, type_oid: u32) -> Self {
        Self {
            name: name.into(),
            type_oid,
        }
    }
}

/// A result row in text format. `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Row {
    values: Vec<Option<String>>,
}

impl Row {
    /// Create a row from its values.
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Get a value by index. Returns `None` for NULL or out-of-range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// Check if the value at `index` is NULL.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(None))
    }

    /// Number of values in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values.
    #[must_use]
    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }
}

impl<S: Into<String>> FromIterator<Option<S>> for Row {
    fn from_iter<I: IntoIterator<Item = Option<S>>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|v| v.map(Into::into)).collect())
    }
}

/// The result of one SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResultSet {
    /// Column descriptions. Empty for commands that return no rows.
    pub columns: Vec<Column>,
    /// Rows, in server order.
    pub rows: Vec<Row>,
    /// Command tag (`SELECT 1`, `INSERT 0 3`, ...).
    pub command_tag: String,
}

impl ResultSet {
    /// Create a row-returning result.
    pub fn rows(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        let command_tag = format!("SELECT {}", rows.len());
        Self {
            columns,
            rows,
            command_tag,
        }
    }

    /// Create a result for a command that returns no rows.
    pub fn command(tag: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            command_tag: tag.into(),
        }
    }

    /// Number of rows affected, parsed from the command tag.
    ///
    /// `INSERT` tags carry an OID before the count; all other tags end with
    /// the count. Tags without a count (`CREATE TABLE`) return `None`.
    #[must_use]
    pub fn rows_affected(&self) -> Option<u64> {
        self.command_tag
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
    }

    /// Look up a column index by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Everything a query string produced.
///
/// A simple query may contain several statements separated by `;`; each
/// yields one [`ResultSet`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryOutcome {
    /// Per-statement results, in order.
    pub results: Vec<ResultSet>,
}

impl QueryOutcome {
    /// Create an outcome from a single result set.
    pub fn single(result: ResultSet) -> Self {
        Self {
            results: vec![result],
        }
    }

    /// The last statement's result, which is what most callers want.
    #[must_use]
    pub fn last(&self) -> Option<&ResultSet> {
        self.results.last()
    }

    /// Rows of the last statement.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        self.last().map(|r| r.rows.as_slice()).unwrap_or(&[])
    }
}
