//! # Azure Data Tables
//!
//! Table and entity clients for Azure Table Storage and the Cosmos DB Table API.
//!
//! Entities are schema-less: each carries a `PartitionKey`, a `RowKey`, an
//! optional ETag, and any number of typed properties. Writes use the ETag for
//! optimistic concurrency, and listings page through continuation tokens.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use azure_data_tables::client::TableServiceClient;
//! use azure_data_tables::entity::Entity;
//! use azure_data_tables::models::UpdateMode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = TableServiceClient::from_connection_string(
//!         "DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=<key>",
//!     )?;
//!     let table = service.table_client("OfficeSupplies")?;
//!
//!     let marker = table
//!         .create_entity(&Entity::new("markers", "crayola").with("Color", "red"))
//!         .await?;
//!     println!("created with ETag {:?}", marker.etag());
//!
//!     // Fails with PreconditionFailed if someone else changed the entity meanwhile.
//!     table
//!         .update_entity(&marker.with("Color", "blue"), UpdateMode::Replace, true)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`] - Asynchronous service and table clients
//! - [`blocking`] - Blocking counterparts of the clients
//! - [`entity`] - Entities and typed property values
//! - [`codec`] - Entity to OData JSON mapping
//! - [`write`] - Create, read, update, upsert and delete entities
//! - [`paging`] - Continuation-token paging for entities and tables
//! - [`table`] - Create and delete tables
//! - [`models`] - Query options, update modes, and response types

pub mod blocking;
mod classify;
pub mod client;
pub mod codec;
pub mod entity;
pub mod models;
pub mod paging;
pub mod table;
pub mod write;

pub use azure_data_tables_core::{TablesError, TablesResult};

/// Test utilities shared across modules.
#[cfg(test)]
pub(crate) mod test_utils {
    use crate::client::TableServiceClient;
    use azure_data_tables_core::test_support::mock_pipeline;
    use wiremock::MockServer;

    /// Create a service client connected to a mock server.
    pub fn setup_mock_service(server: &MockServer) -> TableServiceClient {
        TableServiceClient::new(mock_pipeline(server))
    }
}
