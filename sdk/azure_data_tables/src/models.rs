//! Request and response types shared by the table and entity operations.

use azure_data_tables_core::client::encode_component;
use azure_data_tables_core::error::{TablesError, TablesResult};
use serde::Deserialize;

/// Resource path of the table collection.
pub(crate) const TABLES_PATH: &str = "Tables";

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Whether a write merges into or replaces the stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Partial update: properties not sent are kept.
    #[default]
    Merge,
    /// Full update: properties not sent are removed.
    Replace,
}

/// Options for listing entities or tables.
///
/// ```rust
/// use azure_data_tables::models::QueryParams;
///
/// let query = QueryParams::new()
///     .filter("PartitionKey eq 'markers'")
///     .select(["Color", "Price"])
///     .top(50);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    /// Maximum number of items per page.
    pub top: Option<u32>,
    /// Properties to return. The keys are always available.
    pub select: Option<Vec<String>>,
    /// OData filter expression, passed through unparsed.
    pub filter: Option<String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size hint sent as `$top`.
    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    /// Set the projection sent as a comma-joined `$select`.
    pub fn select<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Set the `$filter` expression.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(filter) = &self.filter {
            pairs.push(("$filter", filter.clone()));
        }
        if let Some(select) = &self.select {
            pairs.push(("$select", select.join(",")));
        }
        if let Some(top) = self.top {
            pairs.push(("$top", top.to_string()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A table in the storage account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Table {
    /// The table name.
    #[serde(rename = "TableName")]
    pub name: String,
}

/// Outcome of an update or upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    /// The entity's new ETag, when the service returned one.
    pub etag: Option<String>,
}

/// Body of a table listing response.
#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

// ---------------------------------------------------------------------------
// Validation and paths
// ---------------------------------------------------------------------------

/// Check a table name: 3 to 63 ASCII letters or digits, starting with a letter.
///
/// # Errors
///
/// Returns [`TablesError::InvalidArgument`] describing the first violated rule.
pub fn validate_table_name(name: &str) -> TablesResult<()> {
    if !(3..=63).contains(&name.len()) {
        return Err(TablesError::invalid_argument(format!(
            "table name '{name}' must be 3 to 63 characters long"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(TablesError::invalid_argument(format!(
            "table name '{name}' may only contain letters and digits"
        )));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(TablesError::invalid_argument(format!(
            "table name '{name}' must not start with a digit"
        )));
    }
    Ok(())
}

/// Check that a partition or row key holds no characters the service rejects.
pub(crate) fn validate_key(kind: &str, key: &str) -> TablesResult<()> {
    match key
        .chars()
        .find(|&c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control())
    {
        Some(c) => Err(TablesError::invalid_argument(format!(
            "{kind} contains a disallowed character {c:?}"
        ))),
        None => Ok(()),
    }
}

/// Quote a key for use inside an entity address: single quotes are doubled,
/// then the whole key is percent-encoded.
pub(crate) fn escape_key(key: &str) -> String {
    encode_component(&key.replace('\'', "''"))
}

/// `{table}(PartitionKey='..',RowKey='..')`
pub(crate) fn entity_path(table: &str, partition_key: &str, row_key: &str) -> String {
    format!(
        "{table}(PartitionKey='{}',RowKey='{}')",
        escape_key(partition_key),
        escape_key(row_key)
    )
}

/// `Tables('{table}')`
pub(crate) fn table_path(table: &str) -> String {
    format!("{TABLES_PATH}('{}')", escape_key(table))
}
