//! Table creation and deletion.
//!
//! Listing tables lives in [`crate::paging`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use azure_data_tables::table;
//! use azure_data_tables_core::client::TablesPipeline;
//!
//! # async fn example(pipeline: &TablesPipeline) -> azure_data_tables_core::TablesResult<()> {
//! let created = table::create(pipeline, "OfficeSupplies", None).await?;
//! table::delete(pipeline, &created.name, None).await?;
//! # Ok(())
//! # }
//! ```

use azure_data_tables_core::client::{TablesPipeline, TablesRequest};
use azure_data_tables_core::error::TablesResult;
use azure_data_tables_core::models::headers;
use serde_json::json;
use std::time::Duration;

use crate::classify::{classify, Target};
use crate::models::{table_path, validate_table_name, Table, TABLES_PATH};

const RETURN_NO_CONTENT: &str = "return-no-content";

/// Create a table.
///
/// # Errors
///
/// - [`TablesError::InvalidArgument`](azure_data_tables_core::TablesError::InvalidArgument) if the name is not a valid table name
/// - [`TablesError::TableAlreadyExists`](azure_data_tables_core::TablesError::TableAlreadyExists) if the table exists
///
/// # Tracing
///
/// Emits a span named `tables::tables::create` with field `table`.
#[tracing::instrument(name = "tables::tables::create", skip(pipeline), fields(table = %name))]
pub async fn create(
    pipeline: &TablesPipeline,
    name: &str,
    timeout: Option<Duration>,
) -> TablesResult<Table> {
    validate_table_name(name)?;
    tracing::debug!("creating table");

    let request = TablesRequest::post(TABLES_PATH)
        .header(headers::PREFER, RETURN_NO_CONTENT)
        .json(json!({ "TableName": name }))
        .timeout(timeout);
    pipeline
        .send(&request)
        .await
        .map_err(|e| classify(e, Target::Table))?;

    tracing::debug!("table created");
    Ok(Table {
        name: name.to_string(),
    })
}

/// Delete a table and every entity in it.
///
/// # Errors
///
/// [`TablesError::TableNotFound`](azure_data_tables_core::TablesError::TableNotFound) if the table does not exist.
///
/// # Tracing
///
/// Emits a span named `tables::tables::delete` with field `table`.
#[tracing::instrument(name = "tables::tables::delete", skip(pipeline), fields(table = %name))]
pub async fn delete(
    pipeline: &TablesPipeline,
    name: &str,
    timeout: Option<Duration>,
) -> TablesResult<()> {
    validate_table_name(name)?;
    tracing::debug!("deleting table");

    let request = TablesRequest::delete(table_path(name)).timeout(timeout);
    pipeline
        .send(&request)
        .await
        .map_err(|e| classify(e, Target::Table))?;

    tracing::debug!("table deleted");
    Ok(())
}
