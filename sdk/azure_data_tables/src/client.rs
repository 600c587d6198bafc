//! Asynchronous service and table clients.
//!
//! [`TableServiceClient`] manages tables in an account and hands out
//! [`TableClient`]s, which work with the entities of one table. Both are thin
//! handles over a shared [`TablesPipeline`] and are cheap to clone.
//!
//! ## Example
//!
//! ```rust,no_run
//! use azure_data_tables::client::TableServiceClient;
//! use azure_data_tables::entity::Entity;
//! use azure_data_tables::models::{QueryParams, UpdateMode};
//! use futures::TryStreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = TableServiceClient::from_connection_string("UseDevelopmentStorage=true")?;
//! let supplies = service.create_table("OfficeSupplies").await?;
//!
//! let table = service.table_client(&supplies.name)?;
//! let marker = table
//!     .create_entity(&Entity::new("markers", "crayola").with("Color", "red"))
//!     .await?;
//!
//! table
//!     .update_entity(&marker.with("Price", 1.25), UpdateMode::Merge, true)
//!     .await?;
//!
//! let markers: Vec<Entity> = table
//!     .list_entities(QueryParams::new().filter("PartitionKey eq 'markers'"))
//!     .try_collect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use azure_data_tables_core::client::TablesPipeline;
use azure_data_tables_core::error::TablesResult;
use futures::stream::BoxStream;
use std::time::Duration;

use crate::entity::Entity;
use crate::models::{validate_table_name, QueryParams, Table, UpdateMode, WriteResponse};
use crate::paging::{
    self, EntityContinuationToken, EntityPage, TableContinuationToken, TablePage,
};
use crate::{table, write};

// ---------------------------------------------------------------------------
// Service client
// ---------------------------------------------------------------------------

/// Client for the tables of one storage account.
#[derive(Debug, Clone)]
pub struct TableServiceClient {
    pipeline: TablesPipeline,
    timeout: Option<Duration>,
}

impl TableServiceClient {
    /// Create a client over an existing pipeline.
    pub fn new(pipeline: TablesPipeline) -> Self {
        Self {
            pipeline,
            timeout: None,
        }
    }

    /// Create a client from a storage connection string with default pipeline settings.
    pub fn from_connection_string(connection_string: &str) -> TablesResult<Self> {
        let pipeline = TablesPipeline::builder()
            .connection_string(connection_string)
            .build()?;
        Ok(Self::new(pipeline))
    }

    /// A copy of this client whose operations each time out after `timeout`.
    ///
    /// The bound applies to every request separately; listings get no overall budget.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            timeout: Some(timeout),
        }
    }

    pub fn pipeline(&self) -> &TablesPipeline {
        &self.pipeline
    }

    /// A client for the entities of `name`, sharing this client's pipeline and timeout.
    ///
    /// The table is not contacted.
    pub fn table_client(&self, name: &str) -> TablesResult<TableClient> {
        validate_table_name(name)?;
        Ok(TableClient {
            pipeline: self.pipeline.clone(),
            table: name.to_string(),
            timeout: self.timeout,
        })
    }

    /// Create a table. Fails with `TableAlreadyExists` if it exists.
    pub async fn create_table(&self, name: &str) -> TablesResult<Table> {
        table::create(&self.pipeline, name, self.timeout).await
    }

    /// Delete a table. Fails with `TableNotFound` if it does not exist.
    pub async fn delete_table(&self, name: &str) -> TablesResult<()> {
        table::delete(&self.pipeline, name, self.timeout).await
    }

    /// Stream all tables matching `query`.
    pub fn list_tables(&self, query: QueryParams) -> BoxStream<'static, TablesResult<Table>> {
        paging::tables(self.pipeline.clone(), query, self.timeout)
    }

    /// Stream table pages, resuming at `token` when given.
    pub fn list_tables_pages(
        &self,
        query: QueryParams,
        token: Option<TableContinuationToken>,
    ) -> BoxStream<'static, TablesResult<TablePage>> {
        paging::table_pages(self.pipeline.clone(), query, token, self.timeout)
    }

    /// Fetch a single page of tables.
    pub async fn list_tables_page(
        &self,
        query: &QueryParams,
        token: Option<&TableContinuationToken>,
    ) -> TablesResult<TablePage> {
        paging::tables_page(&self.pipeline, query, token, self.timeout).await
    }
}

// ---------------------------------------------------------------------------
// Table client
// ---------------------------------------------------------------------------

/// Client for the entities of one table.
#[derive(Debug, Clone)]
pub struct TableClient {
    pipeline: TablesPipeline,
    table: String,
    timeout: Option<Duration>,
}

impl TableClient {
    /// Create a client for table `name` over an existing pipeline.
    pub fn new(pipeline: TablesPipeline, name: &str) -> TablesResult<Self> {
        TableServiceClient::new(pipeline).table_client(name)
    }

    /// A copy of this client whose operations each time out after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self.clone()
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Create this client's table.
    pub async fn create(&self) -> TablesResult<Table> {
        table::create(&self.pipeline, &self.table, self.timeout).await
    }

    /// Delete this client's table.
    pub async fn delete(&self) -> TablesResult<()> {
        table::delete(&self.pipeline, &self.table, self.timeout).await
    }

    /// Insert an entity; see [`write::create`].
    pub async fn create_entity(&self, entity: &Entity) -> TablesResult<Entity> {
        write::create(&self.pipeline, &self.table, entity, self.timeout).await
    }

    /// Insert or update an entity; see [`write::upsert`].
    pub async fn upsert_entity(
        &self,
        entity: &Entity,
        mode: UpdateMode,
        if_match: bool,
    ) -> TablesResult<WriteResponse> {
        write::upsert(&self.pipeline, &self.table, entity, mode, if_match, self.timeout).await
    }

    /// Update an existing entity; see [`write::update`].
    pub async fn update_entity(
        &self,
        entity: &Entity,
        mode: UpdateMode,
        if_match: bool,
    ) -> TablesResult<WriteResponse> {
        write::update(&self.pipeline, &self.table, entity, mode, if_match, self.timeout).await
    }

    /// Delete an entity; see [`write::delete`].
    pub async fn delete_entity(&self, entity: &Entity, if_match: bool) -> TablesResult<()> {
        write::delete(&self.pipeline, &self.table, entity, if_match, self.timeout).await
    }

    /// Read an entity by its keys.
    pub async fn get_entity(&self, partition_key: &str, row_key: &str) -> TablesResult<Entity> {
        write::get(&self.pipeline, &self.table, partition_key, row_key, None, self.timeout).await
    }

    /// Read selected properties of an entity by its keys.
    pub async fn get_entity_with_select(
        &self,
        partition_key: &str,
        row_key: &str,
        select: &[String],
    ) -> TablesResult<Entity> {
        write::get(
            &self.pipeline,
            &self.table,
            partition_key,
            row_key,
            Some(select),
            self.timeout,
        )
        .await
    }

    /// Stream all entities matching `query`.
    pub fn list_entities(&self, query: QueryParams) -> BoxStream<'static, TablesResult<Entity>> {
        paging::entities(self.pipeline.clone(), self.table.clone(), query, self.timeout)
    }

    /// Stream entity pages, resuming at `token` when given.
    pub fn list_entities_pages(
        &self,
        query: QueryParams,
        token: Option<EntityContinuationToken>,
    ) -> BoxStream<'static, TablesResult<EntityPage>> {
        paging::entity_pages(
            self.pipeline.clone(),
            self.table.clone(),
            query,
            token,
            self.timeout,
        )
    }

    /// Fetch a single page of entities.
    pub async fn list_entities_page(
        &self,
        query: &QueryParams,
        token: Option<&EntityContinuationToken>,
    ) -> TablesResult<EntityPage> {
        paging::entities_page(&self.pipeline, &self.table, query, token, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_mock_service;
    use azure_data_tables_core::TablesError;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn table_client_validates_name() {
        let server = MockServer::start().await;
        let service = setup_mock_service(&server);

        assert!(service.table_client("supplies").is_ok());
        assert!(matches!(
            service.table_client("no"),
            Err(TablesError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn table_client_inherits_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/supplies(PartitionKey='p',RowKey='r')"))
            .and(query_param("timeout", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "PartitionKey": "p", "RowKey": "r"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let table = setup_mock_service(&server)
            .with_timeout(Duration::from_secs(7))
            .table_client("supplies")
            .unwrap();
        table.get_entity("p", "r").await.expect("should succeed");
    }

    #[tokio::test]
    async fn with_timeout_leaves_original_untouched() {
        let server = MockServer::start().await;
        let table = setup_mock_service(&server).table_client("supplies").unwrap();

        let bounded = table.with_timeout(Duration::from_secs(1));

        assert_eq!(bounded.timeout, Some(Duration::from_secs(1)));
        assert_eq!(table.timeout, None);
        assert_eq!(bounded.table_name(), "supplies");
    }

    #[tokio::test]
    async fn list_tables_collects_all_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/Tables"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"TableName": "a1b"}, {"TableName": "c2d"}]
            })))
            .mount(&server)
            .await;

        let tables: Vec<Table> = setup_mock_service(&server)
            .list_tables(QueryParams::new())
            .try_collect()
            .await
            .expect("should succeed");

        assert_eq!(tables.len(), 2);
    }

    #[tokio::test]
    async fn table_client_create_and_delete_address_own_table() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/Tables"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/Tables('supplies')"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let table = setup_mock_service(&server).table_client("supplies").unwrap();
        assert_eq!(table.create().await.unwrap().name, "supplies");
        table.delete().await.unwrap();
    }
}
