//! Blocking counterparts of the clients in [`crate::client`].
//!
//! Each method runs the asynchronous operation to completion on a runtime
//! owned by the client. Do not call these from inside an async context;
//! use the asynchronous clients there.
//!
//! ```rust,no_run
//! use azure_data_tables::blocking::TableServiceClient;
//! use azure_data_tables::entity::Entity;
//! use azure_data_tables::models::QueryParams;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = TableServiceClient::from_connection_string("UseDevelopmentStorage=true")?;
//! let table = service.table_client("OfficeSupplies")?;
//!
//! table.create_entity(&Entity::new("markers", "crayola"))?;
//! for entity in table.list_entities(QueryParams::new()) {
//!     println!("{}", entity?.row_key());
//! }
//! # Ok(())
//! # }
//! ```

use azure_data_tables_core::client::TablesPipeline;
use azure_data_tables_core::error::TablesResult;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::client;
use crate::entity::Entity;
use crate::models::{QueryParams, Table, UpdateMode, WriteResponse};
use crate::paging::{EntityContinuationToken, EntityPage, TableContinuationToken, TablePage};

fn new_runtime() -> TablesResult<Arc<Runtime>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(Arc::new(runtime))
}

/// Iterator over a listing, fetching pages as it advances.
pub struct BlockingIter<T> {
    stream: BoxStream<'static, TablesResult<T>>,
    runtime: Arc<Runtime>,
}

impl<T> Iterator for BlockingIter<T> {
    type Item = TablesResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}

impl<T> std::fmt::Debug for BlockingIter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingIter").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Service client
// ---------------------------------------------------------------------------

/// Blocking client for the tables of one storage account.
#[derive(Debug, Clone)]
pub struct TableServiceClient {
    inner: client::TableServiceClient,
    runtime: Arc<Runtime>,
}

impl TableServiceClient {
    /// Create a client over an existing pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`TablesError::Io`](azure_data_tables_core::TablesError::Io) if
    /// the runtime cannot be started.
    pub fn new(pipeline: TablesPipeline) -> TablesResult<Self> {
        Ok(Self {
            inner: client::TableServiceClient::new(pipeline),
            runtime: new_runtime()?,
        })
    }

    /// Create a client from a storage connection string.
    pub fn from_connection_string(connection_string: &str) -> TablesResult<Self> {
        Ok(Self {
            inner: client::TableServiceClient::from_connection_string(connection_string)?,
            runtime: new_runtime()?,
        })
    }

    /// A copy of this client whose operations each time out after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: self.inner.with_timeout(timeout),
            runtime: Arc::clone(&self.runtime),
        }
    }

    /// A blocking client for table `name`, sharing this client's runtime.
    pub fn table_client(&self, name: &str) -> TablesResult<TableClient> {
        Ok(TableClient {
            inner: self.inner.table_client(name)?,
            runtime: Arc::clone(&self.runtime),
        })
    }

    pub fn create_table(&self, name: &str) -> TablesResult<Table> {
        self.runtime.block_on(self.inner.create_table(name))
    }

    pub fn delete_table(&self, name: &str) -> TablesResult<()> {
        self.runtime.block_on(self.inner.delete_table(name))
    }

    pub fn list_tables(&self, query: QueryParams) -> BlockingIter<Table> {
        BlockingIter {
            stream: self.inner.list_tables(query),
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn list_tables_pages(
        &self,
        query: QueryParams,
        token: Option<TableContinuationToken>,
    ) -> BlockingIter<TablePage> {
        BlockingIter {
            stream: self.inner.list_tables_pages(query, token),
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn list_tables_page(
        &self,
        query: &QueryParams,
        token: Option<&TableContinuationToken>,
    ) -> TablesResult<TablePage> {
        self.runtime.block_on(self.inner.list_tables_page(query, token))
    }
}

// ---------------------------------------------------------------------------
// Table client
// ---------------------------------------------------------------------------

/// Blocking client for the entities of one table.
#[derive(Debug, Clone)]
pub struct TableClient {
    inner: client::TableClient,
    runtime: Arc<Runtime>,
}

impl TableClient {
    /// Create a client for table `name` over an existing pipeline.
    pub fn new(pipeline: TablesPipeline, name: &str) -> TablesResult<Self> {
        Ok(Self {
            inner: client::TableClient::new(pipeline, name)?,
            runtime: new_runtime()?,
        })
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: self.inner.with_timeout(timeout),
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn table_name(&self) -> &str {
        self.inner.table_name()
    }

    pub fn create(&self) -> TablesResult<Table> {
        self.runtime.block_on(self.inner.create())
    }

    pub fn delete(&self) -> TablesResult<()> {
        self.runtime.block_on(self.inner.delete())
    }

    pub fn create_entity(&self, entity: &Entity) -> TablesResult<Entity> {
        self.runtime.block_on(self.inner.create_entity(entity))
    }

    pub fn upsert_entity(
        &self,
        entity: &Entity,
        mode: UpdateMode,
        if_match: bool,
    ) -> TablesResult<WriteResponse> {
        self.runtime
            .block_on(self.inner.upsert_entity(entity, mode, if_match))
    }

    pub fn update_entity(
        &self,
        entity: &Entity,
        mode: UpdateMode,
        if_match: bool,
    ) -> TablesResult<WriteResponse> {
        self.runtime
            .block_on(self.inner.update_entity(entity, mode, if_match))
    }

    pub fn delete_entity(&self, entity: &Entity, if_match: bool) -> TablesResult<()> {
        self.runtime
            .block_on(self.inner.delete_entity(entity, if_match))
    }

    pub fn get_entity(&self, partition_key: &str, row_key: &str) -> TablesResult<Entity> {
        self.runtime
            .block_on(self.inner.get_entity(partition_key, row_key))
    }

    pub fn get_entity_with_select(
        &self,
        partition_key: &str,
        row_key: &str,
        select: &[String],
    ) -> TablesResult<Entity> {
        self.runtime
            .block_on(self.inner.get_entity_with_select(partition_key, row_key, select))
    }

    pub fn list_entities(&self, query: QueryParams) -> BlockingIter<Entity> {
        BlockingIter {
            stream: self.inner.list_entities(query),
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn list_entities_pages(
        &self,
        query: QueryParams,
        token: Option<EntityContinuationToken>,
    ) -> BlockingIter<EntityPage> {
        BlockingIter {
            stream: self.inner.list_entities_pages(query, token),
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn list_entities_page(
        &self,
        query: &QueryParams,
        token: Option<&EntityContinuationToken>,
    ) -> TablesResult<EntityPage> {
        self.runtime
            .block_on(self.inner.list_entities_page(query, token))
    }
}
